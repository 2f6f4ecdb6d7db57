use super::{DisplayConnection, DisplayError, EffectiveRegion, Region, WindowRef};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum GeometryError {
    #[error("window {0} is not visible for capture")]
    WindowNotVisible(WindowRef),
    #[error("region {region} is outside the {width}x{height} window")]
    RegionOutOfBounds {
        region: Region,
        width: u16,
        height: u16,
    },
    #[error(transparent)]
    Display(DisplayError),
}

/// Compute the rectangle that can be captured right now.
///
/// The region was recorded once at selection time, so it is clamped against
/// the window's live size on every call. A window the server refuses to
/// describe (destroyed, or a stale id) is reported as not visible; losing the
/// connection itself is a display error.
pub fn resolve<D>(
    display: &D,
    window: WindowRef,
    region: Region,
) -> Result<EffectiveRegion, GeometryError>
where
    D: DisplayConnection + ?Sized,
{
    let geometry = match display.query_window(window) {
        Ok(geometry) => geometry,
        Err(DisplayError::Request(e)) => {
            debug!(%window, error = %e, "window query failed");
            return Err(GeometryError::WindowNotVisible(window));
        }
        Err(e) => return Err(GeometryError::Display(e)),
    };

    if !geometry.viewable {
        return Err(GeometryError::WindowNotVisible(window));
    }

    clamp(region, geometry.width, geometry.height)
}

/// Clamp `region` to a window of `width` x `height`.
///
/// `effective = min(requested, window - offset)`; any non-positive result or a
/// negative offset is out of bounds.
pub fn clamp(region: Region, width: u16, height: u16) -> Result<EffectiveRegion, GeometryError> {
    let out_of_bounds = || GeometryError::RegionOutOfBounds {
        region,
        width,
        height,
    };

    if region.x < 0 || region.y < 0 {
        return Err(out_of_bounds());
    }

    let effective_width = i64::from(region.width).min(i64::from(width) - i64::from(region.x));
    let effective_height = i64::from(region.height).min(i64::from(height) - i64::from(region.y));
    if effective_width <= 0 || effective_height <= 0 {
        return Err(out_of_bounds());
    }

    // Both effective sizes are bounded by the window's u16 size here.
    Ok(EffectiveRegion {
        x: i16::try_from(region.x).map_err(|_| out_of_bounds())?,
        y: i16::try_from(region.y).map_err(|_| out_of_bounds())?,
        width: u16::try_from(effective_width).map_err(|_| out_of_bounds())?,
        height: u16::try_from(effective_height).map_err(|_| out_of_bounds())?,
    })
}
