//! Scan cycle state machine
//!
//! A cycle moves `Idle → Capturing → Recognizing → Idle`. Triggers that arrive
//! while a cycle is in flight are coalesced. `Stopped` is terminal: once the
//! controller stops, late completions from an in-flight cycle are discarded
//! and the continuous-scan timer is cancelled.

use crate::errors::ScanError;
use crate::recognition::RecognitionService;
use crate::session::CaptureSession;
use crate::snapshot::FrameSnapshotter;
use crate::types::RecognitionResult;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Buffered events per receiver before it starts lagging
pub const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanState {
    Idle,
    Capturing,
    Recognizing,
    Stopped,
}

/// When cycles run and when scanning ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanPolicy {
    /// Re-trigger interval; `None` means one cycle per manual trigger
    pub continuous: Option<Duration>,
    /// Stop after the first cycle that recognizes non-empty text
    pub stop_on_first_match: bool,
}

/// Events published to the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScanEvent {
    StateChanged { state: ScanState },
    Recognized { result: RecognitionResult },
    CycleSkipped { reason: String },
    CycleFailed { reason: String },
}

/// Result of a single trigger
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Recognized(RecognitionResult),
    /// No frame yet; try again on the next trigger
    Skipped(ScanError),
    /// The engine failed; the cycle produced nothing
    Failed(ScanError),
    /// Another cycle was already in flight
    Coalesced,
    /// The controller stopped before or during the cycle; any late result was dropped
    Stopped,
}

struct ControllerInner {
    session: Arc<CaptureSession>,
    snapshotter: FrameSnapshotter,
    recognizer: RecognitionService,
    policy: ScanPolicy,
    state: Mutex<ScanState>,
    events: broadcast::Sender<ScanEvent>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

/// Drives snapshot → recognize → report cycles for one capture session
pub struct ScanController {
    inner: Arc<ControllerInner>,
}

impl ScanController {
    pub fn new(
        session: Arc<CaptureSession>,
        snapshotter: FrameSnapshotter,
        recognizer: RecognitionService,
        policy: ScanPolicy,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self::with_events(session, snapshotter, recognizer, policy, events)
    }

    /// Publish into an existing channel, so receivers subscribed before the
    /// controller existed see its very first cycle.
    pub fn with_events(
        session: Arc<CaptureSession>,
        snapshotter: FrameSnapshotter,
        recognizer: RecognitionService,
        policy: ScanPolicy,
        events: broadcast::Sender<ScanEvent>,
    ) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                session,
                snapshotter,
                recognizer,
                policy,
                state: Mutex::new(ScanState::Idle),
                events,
                timer: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> ScanState {
        self.inner.state()
    }

    pub fn policy(&self) -> ScanPolicy {
        self.inner.policy
    }

    pub fn session(&self) -> &Arc<CaptureSession> {
        &self.inner.session
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.inner.events.subscribe()
    }

    /// Run one cycle unless one is already in flight.
    pub async fn trigger(&self) -> CycleOutcome {
        self.inner.run_cycle().await
    }

    /// Start re-triggering on the policy's interval. Returns `false` when the
    /// policy has no interval or the controller is stopped.
    pub fn start_continuous(&self) -> bool {
        let Some(interval) = self.inner.policy.continuous else {
            return false;
        };
        if self.inner.state() == ScanState::Stopped {
            return false;
        }

        let mut timer = self.inner.lock_timer();
        if timer.is_some() {
            return true;
        }

        log::info!("Starting continuous scanning every {:?}", interval);
        *timer = Some(tokio::spawn(continuous_loop(
            Arc::downgrade(&self.inner),
            interval,
        )));
        true
    }

    pub fn is_continuous(&self) -> bool {
        self.inner.lock_timer().is_some()
    }

    /// Enter the terminal state and cancel the re-trigger timer.
    pub fn stop(&self) {
        self.inner.stop();
    }
}

impl Drop for ScanController {
    fn drop(&mut self) {
        self.inner.stop();
    }
}

impl ControllerInner {
    fn state(&self) -> ScanState {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_timer(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.timer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Move `from → to` atomically; fails if the state changed meanwhile
    fn transition(&self, from: ScanState, to: ScanState) -> bool {
        {
            let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if *state != from {
                return false;
            }
            *state = to;
        }
        log::debug!("Scan state {:?} -> {:?}", from, to);
        self.publish(ScanEvent::StateChanged { state: to });
        true
    }

    fn publish(&self, event: ScanEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn stop(&self) {
        let previous = {
            let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            std::mem::replace(&mut *state, ScanState::Stopped)
        };

        if let Some(timer) = self.lock_timer().take() {
            timer.abort();
        }

        if previous != ScanState::Stopped {
            log::info!("Scan controller for session {} stopped", self.session.id());
            self.publish(ScanEvent::StateChanged {
                state: ScanState::Stopped,
            });
        }
    }

    async fn run_cycle(&self) -> CycleOutcome {
        match self.state() {
            ScanState::Stopped => return CycleOutcome::Stopped,
            ScanState::Capturing | ScanState::Recognizing => {
                log::debug!("Cycle already in flight, trigger coalesced");
                return CycleOutcome::Coalesced;
            }
            ScanState::Idle => {}
        }
        if !self.transition(ScanState::Idle, ScanState::Capturing) {
            return match self.state() {
                ScanState::Stopped => CycleOutcome::Stopped,
                _ => CycleOutcome::Coalesced,
            };
        }

        let image = match self.snapshotter.snapshot(&self.session).await {
            Ok(image) => image,
            Err(ScanError::SessionReleased) => {
                self.stop();
                return CycleOutcome::Stopped;
            }
            Err(error) => {
                if !self.transition(ScanState::Capturing, ScanState::Idle) {
                    return CycleOutcome::Stopped;
                }
                log::debug!("Snapshot skipped: {}", error);
                self.publish(ScanEvent::CycleSkipped {
                    reason: error.to_string(),
                });
                return CycleOutcome::Skipped(error);
            }
        };

        if !self.transition(ScanState::Capturing, ScanState::Recognizing) {
            return CycleOutcome::Stopped;
        }

        let recognized = self.recognizer.recognize(&image).await;

        // Late completion after teardown: drop it silently.
        if self.state() != ScanState::Recognizing || !self.session.is_live() {
            log::debug!("Discarding recognition result for stopped session {}", self.session.id());
            self.stop();
            return CycleOutcome::Stopped;
        }

        match recognized {
            Ok(result) => {
                log::info!("Recognized text: {:?}", result.text);
                self.publish(ScanEvent::Recognized {
                    result: result.clone(),
                });
                if self.policy.stop_on_first_match && result.is_match() {
                    self.stop();
                } else {
                    self.transition(ScanState::Recognizing, ScanState::Idle);
                }
                CycleOutcome::Recognized(result)
            }
            Err(error) => {
                log::warn!("Recognition cycle failed: {}", error);
                self.transition(ScanState::Recognizing, ScanState::Idle);
                self.publish(ScanEvent::CycleFailed {
                    reason: error.to_string(),
                });
                CycleOutcome::Failed(error)
            }
        }
    }
}

async fn continuous_loop(inner: Weak<ControllerInner>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let Some(inner) = inner.upgrade() else {
            break;
        };
        if inner.run_cycle().await == CycleOutcome::Stopped {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::TrackCapabilities;
    use crate::recognition::RecognitionOptions;
    use crate::session::CaptureSourceManager;
    use crate::testing::{FakeMediaDevices, FakeStream, ScriptedEngineFactory};
    use crate::types::{ImageEncoding, Viewport};

    async fn controller_with(
        stream: FakeStream,
        factory: Arc<ScriptedEngineFactory>,
        policy: ScanPolicy,
    ) -> (CaptureSourceManager, ScanController) {
        let manager =
            CaptureSourceManager::new(Arc::new(FakeMediaDevices::with_stream("cam0", stream)));
        let session = manager.acquire("cam0").await.unwrap();
        let controller = ScanController::new(
            session,
            FrameSnapshotter::new(Viewport::new(32, 24), ImageEncoding::Png),
            RecognitionService::new(factory, RecognitionOptions::default()),
            policy,
        );
        (manager, controller)
    }

    #[tokio::test]
    async fn test_cycle_emits_result_and_returns_to_idle() {
        let factory = Arc::new(ScriptedEngineFactory::replying(["HELLO"]));
        let (_manager, controller) =
            controller_with(FakeStream::new(TrackCapabilities::default()), factory, ScanPolicy::default()).await;
        let mut events = controller.subscribe();

        let outcome = controller.trigger().await;

        match outcome {
            CycleOutcome::Recognized(result) => assert_eq!(result.text, "HELLO"),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(controller.state(), ScanState::Idle);

        let mut recognized = None;
        while let Ok(event) = events.try_recv() {
            if let ScanEvent::Recognized { result } = event {
                recognized = Some(result.text);
            }
        }
        assert_eq!(recognized.as_deref(), Some("HELLO"));
    }

    #[tokio::test]
    async fn test_missing_frame_skips_cycle() {
        let factory = Arc::new(ScriptedEngineFactory::replying(["unused"]));
        let stream = FakeStream::new(TrackCapabilities::default()).without_frame();
        let (_manager, controller) =
            controller_with(stream, factory.clone(), ScanPolicy::default()).await;

        let outcome = controller.trigger().await;

        assert_eq!(outcome, CycleOutcome::Skipped(ScanError::NoFrameAvailable));
        assert_eq!(controller.state(), ScanState::Idle);
        assert_eq!(factory.calls(), 0);
    }

    #[tokio::test]
    async fn test_recognition_failure_returns_to_idle() {
        let factory = Arc::new(ScriptedEngineFactory::failing("engine crashed"));
        let (_manager, controller) =
            controller_with(FakeStream::new(TrackCapabilities::default()), factory, ScanPolicy::default()).await;

        let outcome = controller.trigger().await;

        assert!(matches!(outcome, CycleOutcome::Failed(ScanError::RecognitionFailed(_))));
        assert_eq!(controller.state(), ScanState::Idle);
    }

    #[tokio::test]
    async fn test_stop_on_first_match() {
        let factory = Arc::new(ScriptedEngineFactory::replying(["", "MATCH"]));
        let policy = ScanPolicy {
            continuous: None,
            stop_on_first_match: true,
        };
        let (_manager, controller) =
            controller_with(FakeStream::new(TrackCapabilities::default()), factory, policy).await;

        assert!(matches!(controller.trigger().await, CycleOutcome::Recognized(_)));
        assert_eq!(controller.state(), ScanState::Idle);

        assert!(matches!(controller.trigger().await, CycleOutcome::Recognized(_)));
        assert_eq!(controller.state(), ScanState::Stopped);
        assert_eq!(controller.trigger().await, CycleOutcome::Stopped);
    }

    #[tokio::test]
    async fn test_trigger_after_release_stops() {
        let factory = Arc::new(ScriptedEngineFactory::replying(["HELLO"]));
        let (manager, controller) =
            controller_with(FakeStream::new(TrackCapabilities::default()), factory.clone(), ScanPolicy::default()).await;

        manager.release_current();

        assert_eq!(controller.trigger().await, CycleOutcome::Stopped);
        assert_eq!(controller.state(), ScanState::Stopped);
        assert_eq!(factory.calls(), 0);
    }
}
