use super::{DisplayConnection, DisplayError, EffectiveRegion, WindowRef};
use thiserror::Error;

/// Bytes per pixel of a 24/32-bit ZPixmap: blue, green, red, unused.
pub const BYTES_PER_PIXEL: usize = 4;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("get_image failed: {0}")]
    Request(String),
    #[error("unsupported pixel depth {0}, expected 24 or 32")]
    UnsupportedDepth(u8),
    #[error("get_image returned {actual} bytes, expected {expected}")]
    ShortReply { expected: usize, actual: usize },
    #[error(transparent)]
    Display(DisplayError),
}

/// Pixel bytes of one rectangle, 4 bytes per pixel in BGRx order, no row padding.
#[derive(Debug, Clone)]
pub struct RawPixels {
    pub width: u16,
    pub height: u16,
    pub data: Vec<u8>,
}

/// Read exactly `rect` from the window's drawable.
///
/// The window can disappear between the geometry check and this call; that
/// shows up here as a request error.
pub fn fetch<D>(display: &D, window: WindowRef, rect: EffectiveRegion) -> Result<RawPixels, FetchError>
where
    D: DisplayConnection + ?Sized,
{
    let reply = display.get_image(window, rect).map_err(|e| match e {
        DisplayError::Request(msg) => FetchError::Request(msg),
        other => FetchError::Display(other),
    })?;

    if reply.depth != 24 && reply.depth != 32 {
        return Err(FetchError::UnsupportedDepth(reply.depth));
    }

    let expected = rect.pixel_count() * BYTES_PER_PIXEL;
    let mut data = reply.data;
    if data.len() < expected {
        return Err(FetchError::ShortReply {
            expected,
            actual: data.len(),
        });
    }
    data.truncate(expected);

    Ok(RawPixels {
        width: rect.width,
        height: rect.height,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{RawImage, WindowGeometry};

    struct Reply(u8, usize);

    impl DisplayConnection for Reply {
        fn query_window(&self, _: WindowRef) -> Result<WindowGeometry, DisplayError> {
            Err(DisplayError::Request("unused".to_string()))
        }

        fn get_image(&self, _: WindowRef, _: EffectiveRegion) -> Result<RawImage, DisplayError> {
            Ok(RawImage {
                depth: self.0,
                data: vec![0xAB; self.1],
            })
        }
    }

    struct Gone;

    impl DisplayConnection for Gone {
        fn query_window(&self, _: WindowRef) -> Result<WindowGeometry, DisplayError> {
            Err(DisplayError::Request("BadWindow".to_string()))
        }

        fn get_image(&self, _: WindowRef, _: EffectiveRegion) -> Result<RawImage, DisplayError> {
            Err(DisplayError::Request("BadDrawable".to_string()))
        }
    }

    struct Dropped;

    impl DisplayConnection for Dropped {
        fn query_window(&self, _: WindowRef) -> Result<WindowGeometry, DisplayError> {
            Err(DisplayError::Connection("broken pipe".to_string()))
        }

        fn get_image(&self, _: WindowRef, _: EffectiveRegion) -> Result<RawImage, DisplayError> {
            Err(DisplayError::Connection("broken pipe".to_string()))
        }
    }

    const RECT: EffectiveRegion = EffectiveRegion {
        x: 1,
        y: 2,
        width: 3,
        height: 2,
    };

    #[test]
    fn returns_exactly_four_bytes_per_pixel() {
        let raw = fetch(&Reply(24, 3 * 2 * 4), WindowRef(1), RECT).unwrap();
        assert_eq!((raw.width, raw.height), (3, 2));
        assert_eq!(raw.data.len(), 24);

        // Trailing bytes beyond the rectangle are dropped.
        let raw = fetch(&Reply(32, 3 * 2 * 4 + 8), WindowRef(1), RECT).unwrap();
        assert_eq!(raw.data.len(), 24);
    }

    #[test]
    fn short_reply_is_an_error() {
        let err = fetch(&Reply(24, 10), WindowRef(1), RECT).unwrap_err();
        assert!(matches!(
            err,
            FetchError::ShortReply {
                expected: 24,
                actual: 10
            }
        ));
    }

    #[test]
    fn rejects_16_bit_visuals() {
        let err = fetch(&Reply(16, 24), WindowRef(1), RECT).unwrap_err();
        assert!(matches!(err, FetchError::UnsupportedDepth(16)));
    }

    #[test]
    fn destroyed_window_is_a_request_error() {
        let err = fetch(&Gone, WindowRef(1), RECT).unwrap_err();
        assert!(matches!(err, FetchError::Request(_)));
    }

    #[test]
    fn lost_connection_is_not_a_request_error() {
        let err = fetch(&Dropped, WindowRef(1), RECT).unwrap_err();
        assert!(matches!(
            err,
            FetchError::Display(DisplayError::Connection(_))
        ));
    }
}
