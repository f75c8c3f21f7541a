//! Scanning Session Coordinator
//!
//! Owns one debouncer and wires it to the rest of the system: confirmed
//! codes go to a save worker thread, the success display is cleared by a
//! timer thread, and every visible change is broadcast as a `ScanEvent`.

use crossbeam_channel::{at, never, select, unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::analysis::{
    Confirmation, DebounceConfig, DetectionDebouncer, DetectionState, EventEmitter, ScanEvent,
    TimestampedEvent, Transition,
};
use crate::capture::scan_loop::SampleSink;
use crate::config::ScannerSettings;
use crate::shared::{DisplayTimerCommand, RecentScan, RuntimeState, SaveRequest};
use crate::storage::PersistenceBridge;

/// State shared by the session and its worker threads
struct SessionInner {
    debouncer: Mutex<DetectionDebouncer>,
    runtime: RwLock<RuntimeState>,
    events: EventEmitter,
    user_id: String,
    retry_on_failed_save: bool,
}

impl SessionInner {
    /// Mirror and broadcast `state`. Callers hold the debouncer lock so
    /// publications happen in the same order as the transitions.
    fn publish_state(&self, state: &DetectionState) {
        self.runtime.write().detection = state.clone();
        self.events.emit(ScanEvent::StateChanged(state.clone()));
    }

    fn clear_display(&self, confirmation: &Confirmation) {
        let mut debouncer = self.debouncer.lock();
        if !debouncer.clear_saved(confirmation) {
            debug!("Display clear for {} is stale", confirmation.full_code);
            return;
        }
        self.events.emit(ScanEvent::DisplayCleared {
            full_code: confirmation.full_code.clone(),
        });
        self.publish_state(debouncer.state());
    }
}

/// One scanning session
pub struct ScanSession {
    inner: Arc<SessionInner>,
    started: Instant,
    save_tx: Mutex<Option<Sender<SaveRequest>>>,
    timer_tx: Mutex<Option<Sender<DisplayTimerCommand>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ScanSession {
    /// Start a session saving confirmed cards for `user_id` through `bridge`
    pub fn new(settings: &ScannerSettings, bridge: PersistenceBridge, user_id: impl Into<String>) -> Self {
        let config = DebounceConfig::from(settings);
        let inner = Arc::new(SessionInner {
            debouncer: Mutex::new(DetectionDebouncer::new(config)),
            runtime: RwLock::new(RuntimeState::new(settings.recent_cards_limit)),
            events: EventEmitter::new(),
            user_id: user_id.into(),
            retry_on_failed_save: settings.retry_on_failed_save,
        });

        let (save_tx, save_rx) = unbounded();
        let (timer_tx, timer_rx) = unbounded();
        let display = Duration::from_millis(config.success_display_ms);

        let save_worker = {
            let inner = inner.clone();
            std::thread::spawn(move || run_save_worker(inner, bridge, save_rx))
        };
        let display_timer = {
            let inner = inner.clone();
            std::thread::spawn(move || run_display_timer(inner, timer_rx, display))
        };

        info!(
            "Scan session started (threshold {}, throttle {}ms, cooldown {}ms)",
            config.confirmation_threshold, config.throttle_ms, config.cooldown_ms
        );

        Self {
            inner,
            started: Instant::now(),
            save_tx: Mutex::new(Some(save_tx)),
            timer_tx: Mutex::new(Some(timer_tx)),
            workers: Mutex::new(vec![save_worker, display_timer]),
        }
    }

    /// Feed one OCR sample taken now
    pub fn feed(&self, text: &str, is_alt_art: bool) -> Transition {
        let now_ms = self.started.elapsed().as_millis() as u64;
        self.feed_at(text, is_alt_art, now_ms)
    }

    /// Feed one OCR sample taken at session time `now_ms`
    pub fn feed_at(&self, text: &str, is_alt_art: bool, now_ms: u64) -> Transition {
        let transition = {
            let mut debouncer = self.inner.debouncer.lock();
            let transition = debouncer.process(text, is_alt_art, now_ms);
            if transition.changes_state() {
                self.inner.publish_state(debouncer.state());
            }
            transition
        };

        if let Transition::Confirmed(confirmation) = &transition {
            self.inner.events.emit(ScanEvent::Confirmed {
                full_code: confirmation.full_code.clone(),
                is_alt_art: confirmation.is_alt_art,
            });
            self.dispatch_save(confirmation);
            self.send_timer(DisplayTimerCommand::Schedule(confirmation.clone()));
        }

        transition
    }

    /// Drop all detection state. A pending display clear is cancelled.
    pub fn reset(&self) {
        {
            let mut debouncer = self.inner.debouncer.lock();
            debouncer.reset();
            self.inner.publish_state(debouncer.state());
        }
        self.send_timer(DisplayTimerCommand::Cancel);
        info!("Scan session reset");
    }

    /// Current detection state
    #[cfg(test)]
    pub fn detection_state(&self) -> DetectionState {
        self.inner.debouncer.lock().state().clone()
    }

    /// Snapshot of the runtime state
    pub fn runtime(&self) -> RuntimeState {
        self.inner.runtime.read().clone()
    }

    /// Mark whether a scan loop is feeding this session
    pub fn set_scanning(&self, is_scanning: bool) {
        self.inner.runtime.write().is_scanning = is_scanning;
    }

    /// Receive every event from now on
    pub fn subscribe(&self) -> Receiver<TimestampedEvent> {
        self.inner.events.subscribe()
    }

    /// Finish pending saves and stop the worker threads
    pub fn shutdown(&self) {
        self.save_tx.lock().take();
        self.timer_tx.lock().take();

        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        if workers.is_empty() {
            return;
        }
        for handle in workers {
            if handle.join().is_err() {
                error!("Session worker panicked");
            }
        }
        info!("Scan session stopped");
    }

    fn dispatch_save(&self, confirmation: &Confirmation) {
        match self.save_tx.lock().as_ref() {
            Some(tx) if tx.send(SaveRequest::from(confirmation)).is_ok() => {}
            _ => warn!("Session is shut down, {} not saved", confirmation.full_code),
        }
    }

    fn send_timer(&self, command: DisplayTimerCommand) {
        if let Some(tx) = self.timer_tx.lock().as_ref() {
            let _ = tx.send(command);
        }
    }
}

impl SampleSink for ScanSession {
    fn feed(&self, text: &str, is_alt_art: bool) {
        ScanSession::feed(self, text, is_alt_art);
    }

    fn reset(&self) {
        ScanSession::reset(self);
    }
}

impl Drop for ScanSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_save_worker(inner: Arc<SessionInner>, bridge: PersistenceBridge, requests: Receiver<SaveRequest>) {
    for request in requests {
        match bridge.add_to_collection(&inner.user_id, &request.full_code, request.is_alt_art) {
            Ok(entry) => {
                inner.runtime.write().record_saved(RecentScan {
                    full_code: request.full_code.clone(),
                    is_alt_art: request.is_alt_art,
                    entry_id: entry.id.clone(),
                });
                inner.events.emit(ScanEvent::SaveSucceeded {
                    full_code: request.full_code,
                    entry_id: entry.id,
                });
            }
            Err(e) => {
                let reason = e.to_string();
                warn!("Failed to save {}: {}", request.full_code, reason);
                inner.runtime.write().record_failed(reason.clone());

                if inner.retry_on_failed_save && inner.debouncer.lock().release_cooldown(&request.full_code) {
                    info!("{} can be scanned again", request.full_code);
                }
                inner.events.emit(ScanEvent::SaveFailed {
                    full_code: request.full_code,
                    reason,
                });
            }
        }
    }
}

fn run_display_timer(inner: Arc<SessionInner>, commands: Receiver<DisplayTimerCommand>, display: Duration) {
    let mut pending: Option<(Confirmation, Instant)> = None;

    loop {
        let deadline = match &pending {
            Some((_, due)) => at(*due),
            None => never(),
        };

        select! {
            recv(commands) -> cmd => match cmd {
                Ok(DisplayTimerCommand::Schedule(confirmation)) => {
                    pending = Some((confirmation, Instant::now() + display));
                }
                Ok(DisplayTimerCommand::Cancel) => pending = None,
                Err(_) => break,
            },
            recv(deadline) -> _ => {
                if let Some((confirmation, _)) = pending.take() {
                    inner.clear_display(&confirmation);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{CatalogPolicy, CollectionStore, Database};

    const USER: &str = "user-1";
    const WAIT: Duration = Duration::from_secs(2);

    fn settings(threshold: u32, display_ms: u64) -> ScannerSettings {
        ScannerSettings {
            confirmation_threshold: threshold,
            throttle_ms: 0,
            cooldown_ms: 3000,
            success_display_ms: display_ms,
            recent_cards_limit: 5,
            retry_on_failed_save: true,
        }
    }

    fn session(settings: &ScannerSettings, policy: CatalogPolicy) -> (ScanSession, Arc<Database>) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let bridge = PersistenceBridge::new(db.clone(), policy);
        (ScanSession::new(settings, bridge, USER), db)
    }

    fn wait_for(rx: &Receiver<TimestampedEvent>, pred: impl Fn(&ScanEvent) -> bool) -> ScanEvent {
        loop {
            let stamped = rx.recv_timeout(WAIT).expect("timed out waiting for event");
            if pred(&stamped.event) {
                return stamped.event;
            }
        }
    }

    #[test]
    fn test_confirmed_code_is_saved_once() {
        let (session, db) = session(&settings(1, 10_000), CatalogPolicy::Permissive);
        let events = session.subscribe();

        assert!(matches!(session.feed_at("OP05-060", false, 0), Transition::Confirmed(_)));
        for t in 1..5 {
            assert!(matches!(
                session.feed_at("OP05-060", false, t * 10),
                Transition::CoolingDown { .. }
            ));
        }

        let event = wait_for(&events, |e| matches!(e, ScanEvent::SaveSucceeded { .. }));
        assert!(matches!(event, ScanEvent::SaveSucceeded { full_code, .. } if full_code == "OP05-060"));

        session.shutdown();
        assert_eq!(db.stats(USER).unwrap().total_cards, 1);

        let runtime = session.runtime();
        assert_eq!(runtime.saved_count, 1);
        assert_eq!(runtime.recent[0].full_code, "OP05-060");
        assert_eq!(runtime.detection.last_saved_code.as_deref(), Some("OP05-060"));
    }

    #[test]
    fn test_events_follow_accumulation() {
        let (session, _db) = session(&settings(2, 10_000), CatalogPolicy::Permissive);
        let events = session.subscribe();

        session.feed_at("OP01-001", true, 0);
        let first = wait_for(&events, |e| matches!(e, ScanEvent::StateChanged(_)));
        assert!(matches!(first, ScanEvent::StateChanged(s) if s.confirmation_count == 1));

        session.feed_at("OP01-001", true, 10);
        let confirmed = wait_for(&events, |e| matches!(e, ScanEvent::Confirmed { .. }));
        assert_eq!(
            confirmed,
            ScanEvent::Confirmed {
                full_code: "OP01-001".into(),
                is_alt_art: true
            }
        );
    }

    #[test]
    fn test_failed_save_releases_cooldown() {
        let (session, db) = session(&settings(1, 10_000), CatalogPolicy::Strict);
        let events = session.subscribe();

        session.feed_at("OP05-060", false, 0);
        let failed = wait_for(&events, |e| matches!(e, ScanEvent::SaveFailed { .. }));
        assert!(matches!(failed, ScanEvent::SaveFailed { reason, .. } if reason.contains("not in the catalog")));

        let runtime = session.runtime();
        assert_eq!(runtime.failed_count, 1);
        assert!(runtime.last_error.is_some());

        // The card can be confirmed again without waiting out the cooldown
        assert!(matches!(session.feed_at("OP05-060", false, 10), Transition::Confirmed(_)));
        session.shutdown();
        assert!(db.list_collection(USER).unwrap().is_empty());
    }

    #[test]
    fn test_failed_save_keeps_cooldown_when_retry_disabled() {
        let mut settings = settings(1, 10_000);
        settings.retry_on_failed_save = false;
        let (session, _db) = session(&settings, CatalogPolicy::Strict);
        let events = session.subscribe();

        session.feed_at("OP05-060", false, 0);
        wait_for(&events, |e| matches!(e, ScanEvent::SaveFailed { .. }));
        assert!(matches!(
            session.feed_at("OP05-060", false, 10),
            Transition::CoolingDown { .. }
        ));
    }

    #[test]
    fn test_display_clears_after_timeout() {
        let (session, _db) = session(&settings(1, 50), CatalogPolicy::Permissive);
        let events = session.subscribe();

        session.feed_at("ST01-001", false, 0);
        let cleared = wait_for(&events, |e| matches!(e, ScanEvent::DisplayCleared { .. }));
        assert_eq!(cleared, ScanEvent::DisplayCleared { full_code: "ST01-001".into() });
        assert_eq!(session.detection_state(), DetectionState::default());
        assert_eq!(session.runtime().detection, DetectionState::default());
    }

    #[test]
    fn test_reset_cancels_pending_clear() {
        let (session, _db) = session(&settings(2, 50), CatalogPolicy::Permissive);
        let events = session.subscribe();

        session.feed_at("OP01-001", false, 0);
        session.feed_at("OP01-001", false, 10);
        session.reset();
        session.feed_at("OP01-002", false, 20);

        std::thread::sleep(Duration::from_millis(200));
        let state = session.detection_state();
        assert_eq!(state.current_code.as_deref(), Some("OP01-002"));
        assert_eq!(state.confirmation_count, 1);
        assert!(events
            .try_iter()
            .all(|e| !matches!(e.event, ScanEvent::DisplayCleared { .. })));
    }

    #[test]
    fn test_published_state_matches_debouncer_under_concurrent_clears() {
        let mut settings = settings(1, 1);
        settings.cooldown_ms = 0;
        let (session, _db) = session(&settings, CatalogPolicy::Permissive);
        let session = Arc::new(session);
        let events = session.subscribe();

        let feeder = {
            let session = session.clone();
            std::thread::spawn(move || {
                for i in 0..300 {
                    let text = match i % 3 {
                        0 => "OP01-001",
                        1 => "OP01-002",
                        _ => "garbage",
                    };
                    session.feed(text, false);
                    std::thread::sleep(Duration::from_micros(300));
                }
            })
        };
        feeder.join().unwrap();

        // Let the last display clear fire
        std::thread::sleep(Duration::from_millis(100));
        session.shutdown();

        let final_state = session.detection_state();
        assert_eq!(session.runtime().detection, final_state);

        let last_published = events
            .try_iter()
            .filter_map(|e| match e.event {
                ScanEvent::StateChanged(state) => Some(state),
                _ => None,
            })
            .last()
            .unwrap();
        assert_eq!(last_published, final_state);
    }

    #[test]
    fn test_feed_after_shutdown_does_not_panic() {
        let (session, db) = session(&settings(1, 10_000), CatalogPolicy::Permissive);
        session.shutdown();
        assert!(matches!(session.feed_at("OP01-001", false, 0), Transition::Confirmed(_)));
        assert!(db.list_collection(USER).unwrap().is_empty());
    }
}
