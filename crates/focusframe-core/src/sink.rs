use crate::capture::Frame;
use crate::config::ImageFormat;
use chrono::Local;
use rand::Rng;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("frame is empty")]
    EmptyFrame,
}

/// File name for a snapshot: `<YYYYmmdd-HHMMSS>-<4 hex>.<ext>`
fn snapshot_name(format: ImageFormat) -> String {
    let now = Local::now();
    let random: u16 = rand::rng().random();
    format!(
        "{}-{:04x}.{}",
        now.format("%Y%m%d-%H%M%S"),
        random,
        format.extension()
    )
}

/// Encode a frame to `path`; the container follows the file extension.
pub fn save_frame(frame: &Frame, path: &Path) -> Result<(), SinkError> {
    if frame.is_empty() {
        return Err(SinkError::EmptyFrame);
    }
    frame.image().save(path)?;
    info!(path = %path.display(), width = frame.width(), height = frame.height(), "frame saved");
    Ok(())
}

/// Save a frame into `dir` under a fresh timestamped name.
pub fn save_snapshot(frame: &Frame, dir: &Path, format: ImageFormat) -> Result<PathBuf, SinkError> {
    if frame.is_empty() {
        return Err(SinkError::EmptyFrame);
    }
    std::fs::create_dir_all(dir)?;
    let path = dir.join(snapshot_name(format));
    frame
        .image()
        .save_with_format(&path, format.to_image_format())?;
    info!(path = %path.display(), "snapshot saved");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{PixelLayout, convert};

    fn frame(width: u32, height: u32) -> Frame {
        let raw: Vec<u8> = (0..width * height * 4).map(|i| i as u8).collect();
        convert(&raw, width, height, PixelLayout::Rgb)
    }

    #[test]
    fn snapshot_name_shape() {
        let name = snapshot_name(ImageFormat::Webp);
        let (stem, ext) = name.rsplit_once('.').unwrap();
        assert_eq!(ext, "webp");
        let parts: Vec<&str> = stem.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 8);
        assert_eq!(parts[1].len(), 6);
        assert_eq!(parts[2].len(), 4);
        assert!(u16::from_str_radix(parts[2], 16).is_ok());
    }

    #[test]
    fn snapshot_is_written_as_png() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested");
        let source = frame(6, 4);

        let path = save_snapshot(&source, &target, ImageFormat::Png).unwrap();
        assert!(path.starts_with(&target));
        assert_eq!(path.extension().unwrap(), "png");

        let decoded = image::open(&path).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (6, 4));
        assert_eq!(decoded.as_raw().as_slice(), source.as_bytes());
    }

    #[test]
    fn save_frame_uses_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.png");
        save_frame(&frame(3, 3), &path).unwrap();
        assert_eq!(
            image::ImageFormat::from_path(&path).unwrap(),
            image::ImageFormat::Png
        );
        assert!(path.metadata().unwrap().len() > 0);
    }

    #[test]
    fn empty_frame_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let err = save_snapshot(&frame(0, 0), dir.path(), ImageFormat::Png).unwrap_err();
        assert!(matches!(err, SinkError::EmptyFrame));
    }
}
