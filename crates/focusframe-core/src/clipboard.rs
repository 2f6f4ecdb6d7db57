use crate::capture::Frame;
use arboard::Clipboard;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClipboardError {
    #[error("clipboard error: {0}")]
    Arboard(#[from] arboard::Error),
    #[error("failed to create clipboard context")]
    Init,
    #[error("frame is empty")]
    EmptyFrame,
}

/// Put a frame on the clipboard. arboard only takes RGBA.
pub fn copy_frame(frame: &Frame) -> Result<(), ClipboardError> {
    if frame.is_empty() {
        return Err(ClipboardError::EmptyFrame);
    }
    let rgba = frame.to_rgba8();
    let mut clipboard = Clipboard::new().map_err(|_| ClipboardError::Init)?;
    let img_data = arboard::ImageData {
        width: rgba.width() as usize,
        height: rgba.height() as usize,
        bytes: std::borrow::Cow::Borrowed(rgba.as_raw()),
    };
    clipboard.set_image(img_data)?;
    Ok(())
}
