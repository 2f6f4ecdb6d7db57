pub mod capture;
pub mod clipboard;
pub mod config;
pub mod select;
pub mod session;
pub mod sink;

pub use image;

pub use capture::{Frame, Region, WindowRef, X11Connection};
pub use config::Config;
pub use session::{CaptureSession, SessionConfig, StatusKind};
