use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use focusframe_core::capture::{self, Frame, PixelLayout, X11Connection};
use focusframe_core::config::{Config, ImageFormat};
use focusframe_core::select::{self, Selection};
use focusframe_core::session::{CaptureSession, SessionConfig};
use focusframe_core::{clipboard, sink};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// How often the CLI polls the session, standing in for a UI refresh.
const STATUS_POLL: Duration = Duration::from_millis(100);

#[derive(Parser)]
#[command(name = "focusframe", about = "Live capture of a window region", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pick a window and a region inside it, and print them
    Pick,

    /// Capture a window region live, then save the last frame
    Watch {
        #[command(flatten)]
        target: TargetOpts,

        /// Seconds to keep capturing
        #[arg(short, long, default_value = "10")]
        duration: u64,

        #[command(flatten)]
        output: OutputOpts,
    },

    /// Capture one frame of a window region
    Snap {
        #[command(flatten)]
        target: TargetOpts,

        /// Seconds to wait for a frame before giving up
        #[arg(short, long, default_value = "5")]
        timeout: u64,

        #[command(flatten)]
        output: OutputOpts,
    },

    /// Show or modify configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Args, Clone)]
struct TargetOpts {
    /// Window id (decimal, 0x hex, or "active"); omit to click one
    #[arg(short, long)]
    window: Option<String>,

    /// Region relative to the window: X,Y,W,H or WxH+X+Y; omit to drag one
    #[arg(short, long)]
    geometry: Option<String>,

    /// Capture period in milliseconds (overrides config)
    #[arg(short, long)]
    period_ms: Option<u64>,

    /// Frame layout: rgb or rgba (overrides config)
    #[arg(short, long)]
    layout: Option<PixelLayout>,
}

#[derive(Args, Clone)]
struct OutputOpts {
    /// Save to specific path instead of the storage directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Snapshot format: png or webp (overrides config)
    #[arg(short, long)]
    format: Option<ImageFormat>,

    /// Copy the frame to the clipboard
    #[arg(short, long)]
    clipboard: bool,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Open config file in $EDITOR
    Edit,
    /// Set a config value
    Set {
        /// Key=value pair (e.g. period_ms=100)
        pair: String,
    },
    /// Reset config to defaults
    Reset,
    /// Show config file path
    Path,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    let cli = Cli::parse();
    let config = Config::load_or_create().context("failed to load config")?;

    match cli.command {
        Commands::Pick => cmd_pick(),
        Commands::Watch {
            target,
            duration,
            output,
        } => cmd_watch(config, target, Duration::from_secs(duration), output),
        Commands::Snap {
            target,
            timeout,
            output,
        } => cmd_snap(config, target, Duration::from_secs(timeout), output),
        Commands::Config { action } => cmd_config(config, action),
    }
}

fn open_display() -> Result<Arc<X11Connection>> {
    let display = X11Connection::open().context("cannot capture without an X server")?;
    Ok(Arc::new(display))
}

/// Fill in whatever the flags left out with the interactive pickers.
fn resolve_target(display: &X11Connection, opts: &TargetOpts) -> Result<Selection> {
    let window = match opts.window.as_deref() {
        Some("active") => display
            .active_window()?
            .context("no active window found")?,
        Some(id) => capture::parse_window_id(id).map_err(anyhow::Error::msg)?,
        None => {
            eprintln!("click the window to capture (Esc to cancel)...");
            select::pick_window()?
        }
    };

    let region = match &opts.geometry {
        Some(g) => capture::parse_region(g).map_err(anyhow::Error::msg)?,
        None => {
            eprintln!("drag the region to capture (Esc to cancel)...");
            select::pick_region(display, window)?
        }
    };

    Ok(Selection { window, region })
}

fn describe(display: &X11Connection, selection: &Selection) {
    let name = display
        .window_name(selection.window)
        .ok()
        .flatten()
        .unwrap_or_default();
    eprintln!("window: {} {name}", selection.window);
    eprintln!("region: {}", selection.region);
}

fn session_config(config: &Config, opts: &TargetOpts) -> SessionConfig {
    let mut session = config.session_config();
    if let Some(ms) = opts.period_ms.filter(|ms| *ms > 0) {
        session.period = Duration::from_millis(ms);
    }
    if let Some(layout) = opts.layout {
        session.layout = layout;
    }
    session
}

fn start_session(
    config: &Config,
    opts: &TargetOpts,
) -> Result<(Arc<X11Connection>, CaptureSession)> {
    let display = open_display()?;
    let selection = resolve_target(&display, opts)?;
    describe(&display, &selection);

    let session = CaptureSession::new(display.clone(), session_config(config, opts));
    if !session.start(selection.window, selection.region) {
        anyhow::bail!("capture did not start: {}", session.status());
    }
    Ok((display, session))
}

fn cmd_pick() -> Result<()> {
    let display = open_display()?;
    let selection = select::pick(&display)?;
    describe(&display, &selection);
    println!(
        "--window {} --geometry {}",
        selection.window, selection.region
    );
    display.close();
    Ok(())
}

fn cmd_watch(config: Config, target: TargetOpts, duration: Duration, output: OutputOpts) -> Result<()> {
    let (display, session) = start_session(&config, &target)?;
    eprintln!("capturing for {}s...", duration.as_secs());

    let deadline = Instant::now() + duration;
    let mut last = session.last_status();
    let mut last_sequence = 0;
    while Instant::now() < deadline {
        thread::sleep(STATUS_POLL);

        let status = session.status();
        if status.kind != last {
            eprintln!("status: {status}");
            last = status.kind;
        }
        if let Some(frame) = session.latest_frame() {
            if frame.sequence() != last_sequence {
                debug!(sequence = frame.sequence(), "new frame");
                last_sequence = frame.sequence();
            }
        }
    }

    session.stop();
    let frame = session
        .latest_frame()
        .context("no frame was captured (window hidden or region outside it?)")?;
    deliver(&config, &frame, &output)?;
    display.close();
    Ok(())
}

fn cmd_snap(config: Config, target: TargetOpts, timeout: Duration, output: OutputOpts) -> Result<()> {
    let (display, session) = start_session(&config, &target)?;

    let deadline = Instant::now() + timeout;
    while session.latest_frame().is_none() && Instant::now() < deadline {
        thread::sleep(STATUS_POLL);
    }
    session.stop();

    let Some(frame) = session.latest_frame() else {
        let status = session.status();
        anyhow::bail!("no frame within {}s (last status: {status})", timeout.as_secs());
    };
    deliver(&config, &frame, &output)?;
    display.close();
    Ok(())
}

fn deliver(config: &Config, frame: &Frame, opts: &OutputOpts) -> Result<()> {
    eprintln!(
        "captured {}x{} (frame #{})",
        frame.width(),
        frame.height(),
        frame.sequence()
    );

    if let Some(path) = &opts.output {
        sink::save_frame(frame, path).context("failed to save frame")?;
        eprintln!("saved: {}", path.display());
    } else {
        let format = opts.format.unwrap_or(config.format);
        let path = sink::save_snapshot(frame, &config.storage_dir, format)
            .context("failed to save snapshot")?;
        eprintln!("saved: {}", path.display());
    }

    if opts.clipboard || config.copy_to_clipboard {
        clipboard::copy_frame(frame).context("failed to copy to clipboard")?;
        eprintln!("copied to clipboard");
    }

    Ok(())
}

fn cmd_config(mut config: Config, action: Option<ConfigAction>) -> Result<()> {
    let action = action.unwrap_or(ConfigAction::Show);
    match action {
        ConfigAction::Show => {
            println!("{}", config.display());
        }
        ConfigAction::Edit => {
            let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());
            let config_path = Config::config_path();
            if !config_path.exists() {
                config.save()?;
            }
            std::process::Command::new(&editor)
                .arg(&config_path)
                .status()
                .context(format!("failed to open editor: {editor}"))?;
        }
        ConfigAction::Set { pair } => {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow::anyhow!("invalid format. use: key=value"))?;
            config
                .set_value(key.trim(), value.trim())
                .map_err(|e| anyhow::anyhow!(e))?;
            config.save()?;
            eprintln!("set {key} = {value}");
        }
        ConfigAction::Reset => {
            let config = Config::default();
            config.save()?;
            eprintln!("config reset to defaults");
        }
        ConfigAction::Path => {
            println!("{}", Config::config_path().display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_override_config() {
        let cli = Cli::parse_from([
            "focusframe",
            "watch",
            "--window",
            "0x400007",
            "--geometry",
            "10,10,200,150",
            "--period-ms",
            "50",
            "--layout",
            "rgba",
        ]);
        let Commands::Watch { target, duration, .. } = cli.command else {
            panic!("expected watch");
        };
        assert_eq!(duration, 10);

        let session = session_config(&Config::default(), &target);
        assert_eq!(session.period, Duration::from_millis(50));
        assert_eq!(session.layout, PixelLayout::Rgba);
    }

    #[test]
    fn zero_period_flag_is_ignored() {
        let target = TargetOpts {
            window: None,
            geometry: None,
            period_ms: Some(0),
            layout: None,
        };
        let session = session_config(&Config::default(), &target);
        assert_eq!(session.period, Duration::from_millis(200));
    }
}
