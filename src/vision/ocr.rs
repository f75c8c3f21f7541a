//! OCR (Optical Character Recognition) module
//!
//! The OCR engine is an external collaborator: it maps a frame to raw text.
//! `CommandOcr` drives any command-line engine (tesseract by default) that
//! reads an image path and prints recognized text to stdout.

use anyhow::{bail, Context, Result};
use std::process::Command;
use tracing::debug;

use crate::capture::frame::CapturedFrame;
use crate::config::OcrSettings;

/// Placeholder in configured arguments that is replaced with the frame path
pub const FRAME_PLACEHOLDER: &str = "{frame}";

/// Maps a captured frame to recognized text
pub trait TextRecognizer: Send {
    /// Recognize text in a frame. An empty string means nothing was read.
    fn recognize(&mut self, frame: &CapturedFrame) -> Result<String>;
}

/// OCR engine backed by an external program
#[derive(Debug, Clone)]
pub struct CommandOcr {
    program: String,
    args: Vec<String>,
}

impl CommandOcr {
    /// Create an engine that runs `program` with `args`
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Create an engine from configuration
    pub fn from_settings(settings: &OcrSettings) -> Self {
        Self::new(settings.program.clone(), settings.args.clone())
    }

    /// Arguments with the frame placeholder substituted
    fn resolved_args(&self, frame_path: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.replace(FRAME_PLACEHOLDER, frame_path))
            .collect()
    }
}

impl TextRecognizer for CommandOcr {
    fn recognize(&mut self, frame: &CapturedFrame) -> Result<String> {
        let path = frame.path.to_string_lossy();
        debug!("Running OCR on {} ({}x{})", path, frame.width, frame.height);

        let output = Command::new(&self.program)
            .args(self.resolved_args(&path))
            .output()
            .with_context(|| format!("Failed to run OCR program '{}'", self.program))?;

        if !output.status.success() {
            bail!(
                "OCR program '{}' exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!("OCR read {} chars from {}", text.len(), path);
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolved_args_substitutes_frame() {
        let ocr = CommandOcr::new("tesseract", vec!["{frame}".into(), "stdout".into()]);
        assert_eq!(
            ocr.resolved_args("/tmp/a.png"),
            vec!["/tmp/a.png".to_string(), "stdout".to_string()]
        );
    }

    #[test]
    fn test_missing_program_fails() {
        let mut ocr = CommandOcr::new("card-scanner-no-such-ocr-binary", vec![]);
        let frame = CapturedFrame::new("frame.png", 1, 1);
        assert!(ocr.recognize(&frame).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_program_stdout_is_returned() {
        let mut ocr = CommandOcr::new("echo", vec!["OP05-060".into(), "{frame}".into()]);
        let frame = CapturedFrame::new("f.png", 1, 1);
        let text = ocr.recognize(&frame).unwrap();
        assert_eq!(text.trim(), "OP05-060 f.png");
    }
}
