//! Fixed-cadence capture loop
//!
//! Every tick runs capture -> OCR -> feed once. If the previous tick's work is
//! still in flight the tick is skipped, so camera and OCR calls never overlap
//! and slow OCR never queues up.

use crossbeam_channel::{bounded, select, tick, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::capture::FrameSource;
use crate::shared::LoopCommand;
use crate::vision::TextRecognizer;

/// Produces one OCR text sample per call
pub trait SampleSource: Send {
    /// Next sample, or `None` once the source is exhausted
    fn next_sample(&mut self) -> Option<String>;
}

/// Consumes OCR text samples
pub trait SampleSink: Send + Sync {
    /// Feed one sample
    fn feed(&self, text: &str, is_alt_art: bool);
    /// Drop all accumulated detection state
    fn reset(&self);
}

/// Camera frames run through an OCR engine
pub struct CameraSource<F, R> {
    frames: F,
    ocr: R,
}

impl<F: FrameSource, R: TextRecognizer> CameraSource<F, R> {
    pub fn new(frames: F, ocr: R) -> Self {
        Self { frames, ocr }
    }
}

impl<F: FrameSource, R: TextRecognizer> SampleSource for CameraSource<F, R> {
    fn next_sample(&mut self) -> Option<String> {
        // Capture and OCR failures read as "no text"; the next tick tries again.
        let frame = match self.frames.capture() {
            Ok(Some(frame)) => frame,
            Ok(None) => return None,
            Err(e) => {
                warn!("Frame capture failed: {:#}", e);
                return Some(String::new());
            }
        };

        match self.ocr.recognize(&frame) {
            Ok(text) => Some(text),
            Err(e) => {
                warn!("OCR failed: {:#}", e);
                Some(String::new())
            }
        }
    }
}

/// Counters reported when a loop finishes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// Timer ticks observed
    pub ticks: u64,
    /// Ticks skipped because work was still in flight
    pub skipped: u64,
    /// Samples fed to the sink
    pub samples: u64,
}

/// Loop configuration
#[derive(Debug, Clone)]
pub struct ScanLoop {
    interval: Duration,
    max_ticks: Option<u64>,
    is_alt_art: bool,
}

impl ScanLoop {
    /// Create a loop ticking every `interval`
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            max_ticks: None,
            is_alt_art: false,
        }
    }

    /// Stop after this many ticks
    pub fn with_max_ticks(mut self, max_ticks: Option<u64>) -> Self {
        self.max_ticks = max_ticks;
        self
    }

    /// Initial alt-art mode
    pub fn with_alt_art(mut self, is_alt_art: bool) -> Self {
        self.is_alt_art = is_alt_art;
        self
    }

    /// Run the loop on a background thread
    pub fn spawn<S: SampleSink + 'static>(
        self,
        sink: Arc<S>,
        source: Box<dyn SampleSource>,
    ) -> ScanLoopHandle {
        let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
        let thread = std::thread::spawn(move || self.run(sink, source, cmd_rx));
        ScanLoopHandle { cmd_tx, thread }
    }

    fn run<S: SampleSink + 'static>(
        self,
        sink: Arc<S>,
        mut source: Box<dyn SampleSource>,
        commands: Receiver<LoopCommand>,
    ) -> LoopStats {
        info!("Scan loop starting ({:?} interval)", self.interval);

        let in_flight = Arc::new(AtomicBool::new(false));
        let (work_tx, work_rx) = bounded::<bool>(1);
        let (done_tx, done_rx) = bounded::<()>(1);

        let worker = {
            let sink = sink.clone();
            let in_flight = in_flight.clone();
            std::thread::spawn(move || {
                let mut samples = 0u64;
                for is_alt_art in work_rx {
                    match source.next_sample() {
                        Some(text) => {
                            sink.feed(&text, is_alt_art);
                            samples += 1;
                            in_flight.store(false, Ordering::SeqCst);
                        }
                        None => {
                            let _ = done_tx.send(());
                            break;
                        }
                    }
                }
                samples
            })
        };

        let ticker = tick(self.interval);
        let mut stats = LoopStats::default();
        let mut is_alt_art = self.is_alt_art;

        loop {
            select! {
                recv(ticker) -> _ => {
                    stats.ticks += 1;
                    if in_flight.swap(true, Ordering::SeqCst) {
                        stats.skipped += 1;
                        debug!("Capture still in flight, skipping tick {}", stats.ticks);
                    } else if work_tx.send(is_alt_art).is_err() {
                        break;
                    }
                    if self.max_ticks.is_some_and(|max| stats.ticks >= max) {
                        debug!("Reached {} ticks", stats.ticks);
                        break;
                    }
                }
                recv(commands) -> cmd => match cmd {
                    Ok(LoopCommand::Stop) | Err(_) => break,
                    Ok(LoopCommand::Reset) => sink.reset(),
                    Ok(LoopCommand::SetAltArt(value)) => {
                        info!("Alt-art mode {}", if value { "on" } else { "off" });
                        is_alt_art = value;
                    }
                },
                recv(done_rx) -> _ => {
                    info!("Sample source exhausted");
                    break;
                }
            }
        }

        drop(work_tx);
        stats.samples = worker.join().unwrap_or_else(|_| {
            error!("Capture worker panicked");
            0
        });

        info!(
            "Scan loop stopped: {} ticks, {} skipped, {} samples",
            stats.ticks, stats.skipped, stats.samples
        );
        stats
    }
}

/// Handle to a running scan loop
pub struct ScanLoopHandle {
    cmd_tx: Sender<LoopCommand>,
    thread: JoinHandle<LoopStats>,
}

impl ScanLoopHandle {
    /// Sender for controlling the loop from another thread
    pub fn commands(&self) -> Sender<LoopCommand> {
        self.cmd_tx.clone()
    }

    /// Wait for the loop to exit
    pub fn join(self) -> LoopStats {
        let stats = self.thread.join().unwrap_or_else(|_| {
            error!("Scan loop thread panicked");
            LoopStats::default()
        });
        drop(self.cmd_tx);
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::TranscriptSource;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        fed: Mutex<Vec<(String, bool)>>,
        resets: Mutex<usize>,
        delay: Duration,
    }

    impl SampleSink for Recorder {
        fn feed(&self, text: &str, is_alt_art: bool) {
            std::thread::sleep(self.delay);
            self.fed.lock().push((text.to_string(), is_alt_art));
        }

        fn reset(&self) {
            *self.resets.lock() += 1;
        }
    }

    struct Endless;

    impl SampleSource for Endless {
        fn next_sample(&mut self) -> Option<String> {
            Some("OP05-060".to_string())
        }
    }

    #[test]
    fn test_loop_feeds_every_sample_then_stops() {
        let sink = Arc::new(Recorder::default());
        let source = TranscriptSource::new(["a", "OP05-060", "b"]);

        let handle = ScanLoop::new(Duration::from_millis(5)).spawn(sink.clone(), Box::new(source));
        let stats = handle.join();

        let fed = sink.fed.lock();
        let texts: Vec<&str> = fed.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(texts, vec!["a", "OP05-060", "b"]);
        assert_eq!(stats.samples, 3);
    }

    #[test]
    fn test_slow_work_skips_ticks() {
        let sink = Arc::new(Recorder {
            delay: Duration::from_millis(40),
            ..Default::default()
        });

        let handle = ScanLoop::new(Duration::from_millis(5))
            .with_max_ticks(Some(30))
            .spawn(sink.clone(), Box::new(Endless));
        let stats = handle.join();

        assert_eq!(stats.ticks, 30);
        assert!(stats.skipped > 0);
        assert!(stats.samples < stats.ticks);
        assert_eq!(sink.fed.lock().len() as u64, stats.samples);
    }

    #[test]
    fn test_alt_art_flag_is_forwarded() {
        let sink = Arc::new(Recorder::default());
        let source = TranscriptSource::new(["OP05-060"]);

        let handle = ScanLoop::new(Duration::from_millis(5))
            .with_alt_art(true)
            .spawn(sink.clone(), Box::new(source));
        handle.join();

        assert_eq!(sink.fed.lock().as_slice(), &[("OP05-060".to_string(), true)]);
    }

    #[test]
    fn test_stop_and_reset_commands() {
        let sink = Arc::new(Recorder::default());

        let handle = ScanLoop::new(Duration::from_millis(5)).spawn(sink.clone(), Box::new(Endless));
        let commands = handle.commands();
        commands.send(LoopCommand::Reset).unwrap();
        std::thread::sleep(Duration::from_millis(30));
        commands.send(LoopCommand::Stop).unwrap();
        handle.join();

        assert_eq!(*sink.resets.lock(), 1);
        assert!(!sink.fed.lock().is_empty());
    }

    #[test]
    fn test_alt_art_can_be_switched_while_running() {
        let sink = Arc::new(Recorder::default());

        let handle = ScanLoop::new(Duration::from_millis(5)).spawn(sink.clone(), Box::new(Endless));
        std::thread::sleep(Duration::from_millis(30));
        let commands = handle.commands();
        std::thread::spawn(move || {
            commands.send(LoopCommand::SetAltArt(true)).unwrap();
            std::thread::sleep(Duration::from_millis(30));
            commands.send(LoopCommand::Stop).unwrap();
        });
        handle.join();

        let fed = sink.fed.lock();
        assert!(!fed.first().unwrap().1);
        assert!(fed.last().unwrap().1);
    }

    #[test]
    fn test_camera_source_turns_ocr_failure_into_empty_text() {
        struct OneFrame(bool);
        impl FrameSource for OneFrame {
            fn capture(&mut self) -> anyhow::Result<Option<crate::capture::frame::CapturedFrame>> {
                if std::mem::replace(&mut self.0, false) {
                    Ok(Some(crate::capture::frame::CapturedFrame::new("frame.png", 1, 1)))
                } else {
                    Ok(None)
                }
            }
        }

        struct FailingOcr;
        impl TextRecognizer for FailingOcr {
            fn recognize(&mut self, _frame: &crate::capture::frame::CapturedFrame) -> anyhow::Result<String> {
                anyhow::bail!("camera glitch")
            }
        }

        let mut source = CameraSource::new(OneFrame(true), FailingOcr);
        assert_eq!(source.next_sample().as_deref(), Some(""));
        assert!(source.next_sample().is_none());
    }
}
