//! Capture Layer
//!
//! Camera frames are supplied by an external collaborator on demand. This
//! module defines that boundary, a directory-backed frame source for replaying
//! stills, and the fixed-cadence scan loop that feeds OCR text into a session.

pub mod frame;
pub mod scan_loop;
pub mod transcript;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::capture::frame::CapturedFrame;

pub use scan_loop::{CameraSource, SampleSource, ScanLoop};
pub use transcript::TranscriptSource;

const FRAME_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "webp"];

/// Supplies photo frames on demand
pub trait FrameSource: Send {
    /// Take one frame. `Ok(None)` means the source has no more frames.
    fn capture(&mut self) -> Result<Option<CapturedFrame>>;
}

/// Frame source that reads still images from a directory in name order
pub struct DirectoryFrameSource {
    frames: Vec<PathBuf>,
    next: usize,
    cycle: bool,
}

impl DirectoryFrameSource {
    /// Collect the image files in `dir`
    pub fn new(dir: &Path) -> Result<Self> {
        let mut frames = Vec::new();
        for entry in std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read frame directory {:?}", dir))?
        {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| FRAME_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if is_image {
                frames.push(path);
            }
        }
        frames.sort();

        info!("Found {} frames in {:?}", frames.len(), dir);
        Ok(Self {
            frames,
            next: 0,
            cycle: false,
        })
    }

    /// Start over from the first frame after the last one
    pub fn cycling(mut self, cycle: bool) -> Self {
        self.cycle = cycle;
        self
    }

    /// Number of frames found
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether the directory had no frames
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FrameSource for DirectoryFrameSource {
    fn capture(&mut self) -> Result<Option<CapturedFrame>> {
        if self.frames.is_empty() {
            return Ok(None);
        }
        if self.next >= self.frames.len() {
            if !self.cycle {
                return Ok(None);
            }
            self.next = 0;
        }

        let path = self.frames[self.next].clone();
        self.next += 1;

        // Only the header is read; the OCR program decodes the image itself
        let (width, height) = image::image_dimensions(&path)
            .with_context(|| format!("Failed to read frame {:?}", path))?;
        debug!("Captured frame {:?} ({}x{})", path, width, height);

        Ok(Some(CapturedFrame::new(path, width, height)))
    }
}
