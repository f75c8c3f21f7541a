//! Recorded OCR output
//!
//! A transcript is a text file of OCR samples separated by lines containing
//! only `---`. Replaying one drives the scan loop exactly as a live camera
//! would, minus the camera.

use anyhow::{Context, Result};
use std::collections::VecDeque;
use std::path::Path;

use crate::capture::scan_loop::SampleSource;

const SAMPLE_SEPARATOR: &str = "---";

/// Sample source that replays recorded OCR text
#[derive(Debug, Clone, Default)]
pub struct TranscriptSource {
    samples: VecDeque<String>,
}

impl TranscriptSource {
    /// Replay the given samples in order
    pub fn new<I, S>(samples: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            samples: samples.into_iter().map(Into::into).collect(),
        }
    }

    /// Split transcript text into samples
    pub fn parse(content: &str) -> Self {
        let mut samples = Vec::new();
        let mut current: Vec<&str> = Vec::new();

        for line in content.lines() {
            if line.trim() == SAMPLE_SEPARATOR {
                samples.push(current.join("\n"));
                current.clear();
            } else {
                current.push(line);
            }
        }
        if !current.is_empty() {
            samples.push(current.join("\n"));
        }

        Self::new(samples)
    }

    /// Load a transcript file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read transcript {:?}", path))?;
        Ok(Self::parse(&content))
    }

    /// Samples left to replay
    pub fn remaining(&self) -> usize {
        self.samples.len()
    }
}

impl SampleSource for TranscriptSource {
    fn next_sample(&mut self) -> Option<String> {
        self.samples.pop_front()
    }
}
