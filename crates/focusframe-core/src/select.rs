use crate::capture::{DisplayError, Region, WindowRef, X11Connection, parse_region, parse_window_id};
use std::process::Command;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum SelectionError {
    #[error("{0} not found (install it with your package manager, e.g. sudo apt install {0})")]
    ToolNotFound(&'static str),
    #[error("selection cancelled")]
    Cancelled,
    #[error("malformed picker output: {0}")]
    Malformed(String),
    #[error("{0} failed: {1}")]
    Tool(&'static str, String),
    #[error(transparent)]
    Display(#[from] DisplayError),
}

/// A window plus a region relative to it, handed to the session in one piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub window: WindowRef,
    pub region: Region,
}

fn run_picker(tool: &'static str, args: &[&str]) -> Result<String, SelectionError> {
    let output = Command::new(tool).args(args).output().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            SelectionError::ToolNotFound(tool)
        } else {
            SelectionError::Tool(tool, e.to_string())
        }
    })?;

    // Both tools exit non-zero when the user presses Esc.
    if !output.status.success() {
        return Err(SelectionError::Cancelled);
    }

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if text.is_empty() {
        return Err(SelectionError::Cancelled);
    }
    debug!(tool, output = %text, "picker finished");
    Ok(text)
}

/// Let the user click a window with `xdotool selectwindow`.
pub fn pick_window() -> Result<WindowRef, SelectionError> {
    let output = run_picker("xdotool", &["selectwindow"])?;
    parse_window_id(&output).map_err(SelectionError::Malformed)
}

/// Let the user drag a rectangle with `slop`, returned relative to `window`.
pub fn pick_region(display: &X11Connection, window: WindowRef) -> Result<Region, SelectionError> {
    let output = run_picker("slop", &["-f", "%x,%y,%w,%h"])?;
    let absolute = parse_region(&output).map_err(SelectionError::Malformed)?;
    let origin = display.window_origin(window)?;
    relative_to(absolute, origin)
}

/// Pick a window, then a region inside it.
pub fn pick(display: &X11Connection) -> Result<Selection, SelectionError> {
    let window = pick_window()?;
    let region = pick_region(display, window)?;
    Ok(Selection { window, region })
}

/// Translate an absolute screen rectangle into window-relative coordinates.
pub fn relative_to(absolute: Region, origin: (i32, i32)) -> Result<Region, SelectionError> {
    if absolute.is_empty() {
        return Err(SelectionError::Malformed(format!(
            "empty region {absolute}"
        )));
    }
    Ok(Region {
        x: absolute.x - origin.0,
        y: absolute.y - origin.1,
        ..absolute
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_becomes_window_relative() {
        let absolute = Region {
            x: 310,
            y: 220,
            width: 200,
            height: 150,
        };
        let region = relative_to(absolute, (300, 210)).unwrap();
        assert_eq!(
            region,
            Region {
                x: 10,
                y: 10,
                width: 200,
                height: 150
            }
        );
    }

    #[test]
    fn selection_left_of_window_goes_negative() {
        let absolute = Region {
            x: 0,
            y: 0,
            width: 5,
            height: 5,
        };
        let region = relative_to(absolute, (40, 40)).unwrap();
        assert_eq!((region.x, region.y), (-40, -40));
    }

    #[test]
    fn zero_sized_selection_is_malformed() {
        let absolute = Region {
            x: 10,
            y: 10,
            width: 0,
            height: 20,
        };
        assert!(matches!(
            relative_to(absolute, (0, 0)),
            Err(SelectionError::Malformed(_))
        ));
    }

    #[test]
    fn missing_tool_is_reported() {
        let err = run_picker("focusframe-no-such-picker", &[]).unwrap_err();
        assert!(matches!(
            err,
            SelectionError::ToolNotFound("focusframe-no-such-picker")
        ));
    }
}
