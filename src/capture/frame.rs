//! Frame data structures for captured camera content

use std::path::PathBuf;

/// A captured photo frame, stored as an image file the OCR program reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    /// Image file holding the frame
    pub path: PathBuf,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
}

impl CapturedFrame {
    /// Create a new captured frame
    pub fn new(path: impl Into<PathBuf>, width: u32, height: u32) -> Self {
        Self {
            path: path.into(),
            width,
            height,
        }
    }
}
