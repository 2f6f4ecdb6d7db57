use image::{DynamicImage, Rgb, RgbImage, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Channel layout of published frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelLayout {
    #[default]
    Rgb,
    Rgba,
}

impl PixelLayout {
    pub fn channels(&self) -> usize {
        match self {
            PixelLayout::Rgb => 3,
            PixelLayout::Rgba => 4,
        }
    }
}

impl fmt::Display for PixelLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PixelLayout::Rgb => write!(f, "rgb"),
            PixelLayout::Rgba => write!(f, "rgba"),
        }
    }
}

impl std::str::FromStr for PixelLayout {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rgb" => Ok(PixelLayout::Rgb),
            "rgba" => Ok(PixelLayout::Rgba),
            _ => Err(format!("unknown layout: {s}. use: rgb, rgba")),
        }
    }
}

/// One captured image. Immutable once published.
#[derive(Debug, Clone)]
pub struct Frame {
    sequence: u64,
    image: DynamicImage,
}

impl Frame {
    /// Publication number within the owning session, starting at 1. Zero for
    /// frames that were never published.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn layout(&self) -> PixelLayout {
        match self.image {
            DynamicImage::ImageRgba8(_) => PixelLayout::Rgba,
            _ => PixelLayout::Rgb,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Row-major pixel bytes, stride `width * channels`.
    pub fn as_bytes(&self) -> &[u8] {
        self.image.as_bytes()
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn to_rgba8(&self) -> RgbaImage {
        self.image.to_rgba8()
    }

    pub(crate) fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }
}

/// Repack BGRx pixels into an RGB or RGBA frame.
///
/// Pure byte reordering: no color-space or gamma work. Alpha is always opaque.
/// Pixels missing from a short `raw` buffer come out black.
pub fn convert(raw: &[u8], width: u32, height: u32, layout: PixelLayout) -> Frame {
    let stride = width as usize;
    let bgr = |x: u32, y: u32| {
        let offset = (y as usize * stride + x as usize) * 4;
        match raw.get(offset..offset + 3) {
            Some(p) => [p[2], p[1], p[0]],
            None => [0, 0, 0],
        }
    };

    let image = match layout {
        PixelLayout::Rgb => {
            DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| Rgb(bgr(x, y))))
        }
        PixelLayout::Rgba => DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, y| {
            let [r, g, b] = bgr(x, y);
            Rgba([r, g, b, u8::MAX])
        })),
    };

    Frame { sequence: 0, image }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 251) as u8).collect()
    }

    #[test]
    fn single_pixel_bgrx_to_rgb() {
        let frame = convert(&[0x10, 0x20, 0x30, 0xFF], 1, 1, PixelLayout::Rgb);
        assert_eq!(frame.as_bytes(), &[0x30, 0x20, 0x10]);
    }

    #[test]
    fn rgb_channels_are_swapped_per_pixel() {
        let (w, h) = (5, 3);
        let raw = ramp(w * h * 4);
        let frame = convert(&raw, w as u32, h as u32, PixelLayout::Rgb);
        let out = frame.as_bytes();

        assert_eq!(out.len(), 3 * w * h);
        for i in 0..w * h {
            for c in 0..3 {
                assert_eq!(out[3 * i + c], raw[4 * i + (2 - c)], "pixel {i} channel {c}");
            }
        }
    }

    #[test]
    fn rgba_alpha_is_opaque_and_padding_byte_ignored() {
        let raw = [1, 2, 3, 0, 4, 5, 6, 0x7F];
        let frame = convert(&raw, 2, 1, PixelLayout::Rgba);
        assert_eq!(frame.layout(), PixelLayout::Rgba);
        assert_eq!(frame.as_bytes(), &[3, 2, 1, 255, 6, 5, 4, 255]);
    }

    #[test]
    fn keeps_row_major_order() {
        // 2x2: top row red, blue; bottom row green, white (in BGRx)
        let raw = [
            0, 0, 255, 0, 255, 0, 0, 0, //
            0, 255, 0, 0, 255, 255, 255, 0,
        ];
        let frame = convert(&raw, 2, 2, PixelLayout::Rgb);
        let img = frame.image().to_rgb8();
        assert_eq!(img.get_pixel(0, 0).0, [255, 0, 0]);
        assert_eq!(img.get_pixel(1, 0).0, [0, 0, 255]);
        assert_eq!(img.get_pixel(0, 1).0, [0, 255, 0]);
        assert_eq!(img.get_pixel(1, 1).0, [255, 255, 255]);
    }

    #[test]
    fn zero_area_gives_empty_frame() {
        let frame = convert(&[], 0, 10, PixelLayout::Rgb);
        assert!(frame.is_empty());
        assert!(frame.as_bytes().is_empty());

        let frame = convert(&[], 0, 0, PixelLayout::Rgba);
        assert!(frame.as_bytes().is_empty());
    }

    #[test]
    fn layout_parses_case_insensitively() {
        assert_eq!("RGBA".parse::<PixelLayout>().unwrap(), PixelLayout::Rgba);
        assert_eq!("rgb".parse::<PixelLayout>().unwrap(), PixelLayout::Rgb);
        assert!("bgr".parse::<PixelLayout>().is_err());
        assert_eq!(PixelLayout::Rgba.channels(), 4);
    }
}
