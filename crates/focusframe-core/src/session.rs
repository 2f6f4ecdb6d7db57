use crate::capture::{
    DisplayConnection, FetchError, Frame, GeometryError, PixelLayout, Region, WindowRef, convert,
    fetch, resolve,
};
use arc_swap::{ArcSwap, ArcSwapOption};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded, select, tick};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_PERIOD: Duration = Duration::from_millis(200);
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Time between ticks.
    pub period: Duration,
    pub layout: PixelLayout,
    /// How long `stop` waits for the worker to acknowledge before detaching it.
    pub stop_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            period: DEFAULT_PERIOD,
            layout: PixelLayout::default(),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
}

/// Stable status identifiers. Display text may change; these do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusKind {
    Ready,
    WindowNotVisible,
    RegionOutOfBounds,
    FetchError,
    Stopped,
    Idle,
}

impl StatusKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusKind::Ready => "ready",
            StatusKind::WindowNotVisible => "window-not-visible",
            StatusKind::RegionOutOfBounds => "region-out-of-bounds",
            StatusKind::FetchError => "fetch-error",
            StatusKind::Stopped => "stopped",
            StatusKind::Idle => "idle",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            StatusKind::WindowNotVisible | StatusKind::RegionOutOfBounds | StatusKind::FetchError
        )
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub kind: StatusKind,
    /// Error text of the failure behind `kind`, if any.
    pub detail: Option<String>,
}

impl Status {
    fn new(kind: StatusKind) -> Self {
        Self { kind, detail: None }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{}: {detail}", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

#[derive(Error, Debug)]
enum TickError {
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl TickError {
    fn kind(&self) -> StatusKind {
        match self {
            TickError::Geometry(GeometryError::WindowNotVisible(_)) => StatusKind::WindowNotVisible,
            TickError::Geometry(GeometryError::RegionOutOfBounds { .. }) => {
                StatusKind::RegionOutOfBounds
            }
            TickError::Geometry(GeometryError::Display(_)) | TickError::Fetch(_) => {
                StatusKind::FetchError
            }
        }
    }
}

/// State shared between the session handle and its worker thread.
struct Shared {
    latest: ArcSwapOption<Frame>,
    status: ArcSwap<Status>,
    /// Generation of the run allowed to publish. `start` and `stop` bump it,
    /// and publication happens with this lock held.
    gate: Mutex<u64>,
    sequence: AtomicU64,
}

impl Shared {
    /// Publish a tick's outcome if `generation` is still current.
    /// Returns false once the run has been stopped.
    fn publish(&self, generation: u64, outcome: Result<Frame, TickError>) -> bool {
        let gate = self.gate.lock();
        if *gate != generation {
            debug!(generation, current = *gate, "discarding tick from stopped run");
            return false;
        }

        match outcome {
            Ok(frame) => {
                let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(
                    sequence,
                    width = frame.width(),
                    height = frame.height(),
                    "frame published"
                );
                self.latest.store(Some(Arc::new(frame.with_sequence(sequence))));
                self.set_status(Status::new(StatusKind::Ready));
            }
            Err(e) => {
                self.set_status(Status {
                    kind: e.kind(),
                    detail: Some(e.to_string()),
                });
            }
        }
        true
    }

    fn set_status(&self, status: Status) {
        let previous = self.status.swap(Arc::new(status.clone()));
        if previous.kind != status.kind {
            if status.kind.is_failure() {
                warn!(status = %status, "capture status changed");
            } else {
                info!(status = %status.kind, "capture status changed");
            }
        }
    }
}

/// Everything one run's worker needs, owned by the worker thread.
struct Job {
    display: Arc<dyn DisplayConnection>,
    window: WindowRef,
    region: Region,
    layout: PixelLayout,
    generation: u64,
    shared: Arc<Shared>,
}

impl Job {
    fn capture(&self) -> Result<Frame, TickError> {
        let display = self.display.as_ref();
        let rect = resolve(display, self.window, self.region)?;
        let raw = fetch(display, self.window, rect)?;
        Ok(convert(
            &raw.data,
            u32::from(raw.width),
            u32::from(raw.height),
            self.layout,
        ))
    }

    fn run(self, period: Duration, stop_rx: Receiver<()>) {
        let ticker = tick(period);
        loop {
            select! {
                recv(stop_rx) -> _ => break,
                recv(ticker) -> _ => {
                    if !self.shared.publish(self.generation, self.capture()) {
                        break;
                    }
                }
            }
        }
        debug!(generation = self.generation, "capture worker exiting");
    }
}

struct Worker {
    stop_tx: Sender<()>,
    done_rx: Receiver<()>,
    handle: JoinHandle<()>,
}

/// Live capture of one window region at a fixed period.
///
/// While running, a background thread resolves the region against the
/// window's current size each tick, reads and converts the pixels, and swaps
/// the result into the latest-frame slot. Readers only ever load whole
/// `Arc<Frame>`s out of that slot.
///
/// All methods take `&self` and can be called from any thread.
pub struct CaptureSession {
    display: Arc<dyn DisplayConnection>,
    config: SessionConfig,
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
}

impl CaptureSession {
    pub fn new(display: Arc<dyn DisplayConnection>, config: SessionConfig) -> Self {
        Self {
            display,
            config,
            shared: Arc::new(Shared {
                latest: ArcSwapOption::empty(),
                status: ArcSwap::from_pointee(Status::new(StatusKind::Idle)),
                gate: Mutex::new(0),
                sequence: AtomicU64::new(0),
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        if self.worker.lock().is_some() {
            SessionState::Running
        } else {
            SessionState::Idle
        }
    }

    /// Begin capturing `region` of `window` every period.
    ///
    /// Returns true if this call started capture. Already running is a no-op.
    /// A missing window or empty region leaves the session idle with status
    /// `Idle`.
    pub fn start(&self, window: WindowRef, region: Region) -> bool {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            debug!("capture already running");
            return false;
        }

        if !window.is_set() || region.is_empty() {
            warn!(%window, %region, "capture not started: window or region not selected");
            let _gate = self.shared.gate.lock();
            self.shared.set_status(Status::new(StatusKind::Idle));
            return false;
        }

        let generation = {
            let mut gate = self.shared.gate.lock();
            *gate += 1;
            self.shared.set_status(Status::new(StatusKind::Ready));
            *gate
        };

        let job = Job {
            display: Arc::clone(&self.display),
            window,
            region,
            layout: self.config.layout,
            generation,
            shared: Arc::clone(&self.shared),
        };
        let period = self.config.period;
        let (stop_tx, stop_rx) = bounded(1);
        let (done_tx, done_rx) = bounded(1);

        let spawned = thread::Builder::new()
            .name("focusframe-capture".to_string())
            .spawn(move || {
                job.run(period, stop_rx);
                let _ = done_tx.send(());
            });

        match spawned {
            Ok(handle) => {
                *worker = Some(Worker {
                    stop_tx,
                    done_rx,
                    handle,
                });
                info!(
                    %window,
                    %region,
                    period_ms = period.as_millis() as u64,
                    "capture started"
                );
                true
            }
            Err(e) => {
                let mut gate = self.shared.gate.lock();
                *gate += 1;
                self.shared.set_status(Status {
                    kind: StatusKind::Idle,
                    detail: Some(format!("failed to spawn capture thread: {e}")),
                });
                false
            }
        }
    }

    /// Stop capturing. Already idle is a no-op.
    ///
    /// Once this returns, the stopped run publishes nothing more: a tick that
    /// finished before the call may already have published (at most one
    /// frame), and any tick still in flight is discarded. The worker checks
    /// for stop once per tick boundary, so it normally exits within one
    /// period; if it is stuck in a reply for longer than `stop_timeout` it is
    /// detached and exits on its own when the reply arrives.
    pub fn stop(&self) {
        let mut slot = self.worker.lock();
        let Some(worker) = slot.take() else {
            debug!("capture already stopped");
            return;
        };

        // Retire the generation before a concurrent `start` can claim the slot.
        {
            let mut gate = self.shared.gate.lock();
            *gate += 1;
            self.shared.set_status(Status::new(StatusKind::Stopped));
        }
        drop(slot);

        let _ = worker.stop_tx.send(());
        match worker.done_rx.recv_timeout(self.config.stop_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if worker.handle.join().is_err() {
                    warn!("capture thread panicked");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    timeout_ms = self.config.stop_timeout.as_millis() as u64,
                    "capture thread did not stop in time, detaching it"
                );
            }
        }
        info!("capture stopped");
    }

    /// The most recently published frame, kept across stop/start.
    pub fn latest_frame(&self) -> Option<Arc<Frame>> {
        self.shared.latest.load_full()
    }

    pub fn last_status(&self) -> StatusKind {
        self.shared.status.load().kind
    }

    pub fn status(&self) -> Status {
        Status::clone(&self.shared.status.load())
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop();
    }
}
