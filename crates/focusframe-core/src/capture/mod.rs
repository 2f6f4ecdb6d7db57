pub mod convert;
pub mod fetch;
pub mod geometry;
pub mod x11;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub use convert::{Frame, PixelLayout, convert};
pub use fetch::{FetchError, fetch};
pub use geometry::{GeometryError, resolve};
pub use x11::X11Connection;

#[derive(Error, Debug)]
pub enum DisplayError {
    #[error("failed to connect to X server: {0}")]
    Connect(String),
    #[error("display connection is closed")]
    ConnectionClosed,
    #[error("lost connection to X server: {0}")]
    Connection(String),
    #[error("X11 request failed: {0}")]
    Request(String),
}

/// Opaque id of the target window. Zero means "no window selected".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct WindowRef(pub u32);

impl WindowRef {
    pub const NONE: WindowRef = WindowRef(0);

    pub fn is_set(&self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for WindowRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// Capture region, relative to the target window's top-left corner as it was
/// when the region was selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    /// A zero-sized region means nothing has been selected yet.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

/// A region clamped against the window's live size, in protocol units.
/// Only valid for the tick that computed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveRegion {
    pub x: i16,
    pub y: i16,
    pub width: u16,
    pub height: u16,
}

impl EffectiveRegion {
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Live state of a window as reported by the display server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowGeometry {
    pub viewable: bool,
    pub width: u16,
    pub height: u16,
}

/// Raw reply of a pixel read.
#[derive(Debug, Clone)]
pub struct RawImage {
    pub depth: u8,
    pub data: Vec<u8>,
}

/// The queries the capture pipeline needs from a display server.
///
/// Implementations must be callable from the capture worker thread while the
/// owner keeps using them from the control thread.
pub trait DisplayConnection: Send + Sync {
    fn query_window(&self, window: WindowRef) -> Result<WindowGeometry, DisplayError>;

    fn get_image(&self, window: WindowRef, rect: EffectiveRegion)
    -> Result<RawImage, DisplayError>;
}

/// Parse a region string like "100,200,800,600" or "800x600+100+200"
pub fn parse_region(s: &str) -> Result<Region, String> {
    let s = s.trim();
    // Try WxH+X+Y format
    if s.contains('x') && s.contains('+') {
        let parts: Vec<&str> = s.split(['x', '+']).collect();
        if parts.len() == 4 {
            let width: u32 = parts[0].parse().map_err(|_| "invalid width")?;
            let height: u32 = parts[1].parse().map_err(|_| "invalid height")?;
            let x: i32 = parts[2].parse().map_err(|_| "invalid x")?;
            let y: i32 = parts[3].parse().map_err(|_| "invalid y")?;
            return Ok(Region {
                x,
                y,
                width,
                height,
            });
        }
    }
    // Try X,Y,W,H format
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() == 4 {
        let x: i32 = parts[0].trim().parse().map_err(|_| "invalid x")?;
        let y: i32 = parts[1].trim().parse().map_err(|_| "invalid y")?;
        let width: u32 = parts[2].trim().parse().map_err(|_| "invalid width")?;
        let height: u32 = parts[3].trim().parse().map_err(|_| "invalid height")?;
        return Ok(Region {
            x,
            y,
            width,
            height,
        });
    }
    Err(format!(
        "invalid region format: '{s}'. use: X,Y,W,H or WxH+X+Y"
    ))
}

/// Parse a window id given in decimal or as 0x-prefixed hex.
pub fn parse_window_id(s: &str) -> Result<WindowRef, String> {
    let s = s.trim();
    let id = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    }
    .map_err(|_| format!("invalid window id: '{s}'"))?;
    if id == 0 {
        return Err("window id must be non-zero".to_string());
    }
    Ok(WindowRef(id))
}
