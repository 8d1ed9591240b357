//! Scan loop
//!
//! Owns the camera stream and the active detection strategy for one scan
//! lifecycle (`Starting` → `Scanning` → `Stopped`). Detected text is gated
//! (one submission in flight, no consecutive repeats), parsed into an intent
//! and handed to the submitter.
//!
//! The background worker owns every acquired resource. Whichever way it ends
//! (stop, fatal decode error, abort), the detection strategy is stopped and
//! the camera is released before the state reads `Stopped`.

pub mod dedup;
pub mod strategy;
pub mod wedge;

use attend_common::events::{AttendanceEvent, EventBus, IgnoreReason, ScanState};
use attend_common::{time, AttendanceIntent, SubjectType};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::backend::CampusContext;
use crate::parser::PayloadParser;
use crate::submitter::AttendanceSubmitter;

pub use dedup::{DedupWindow, DetectionGate};
pub use strategy::{
    Camera, ContinuousDecoder, DecoderLoader, DetectError, Detection, DetectionSink,
    DetectionStrategy, DetectorSet, FallbackDecoderStrategy, Frame, NativeDetector,
    NativePollStrategy, VideoStream,
};

/// Reasons a scan lifecycle could not start or had to end
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Scanner is already running")]
    AlreadyActive,

    #[error("Camera permission denied")]
    PermissionDenied,

    #[error("Camera unavailable: {0}")]
    CameraUnavailable(String),

    #[error("QR decoder could not be loaded: {0}")]
    DecoderUnavailable(String),

    #[error("No QR detection capability available")]
    NoDetector,

    #[error("QR decoding failed: {0}")]
    Decode(String),
}

/// Everything needed to turn detected text into a submitted mark
#[derive(Clone)]
pub struct ScanPipeline {
    pub parser: Arc<PayloadParser>,
    pub submitter: Arc<AttendanceSubmitter>,
    pub campus: Arc<dyn CampusContext>,
    /// Subject type assumed when a code does not name one
    pub fallback_subject: SubjectType,
}

impl ScanPipeline {
    /// Gate and parse one detection
    pub fn route(&self, gate: &mut DetectionGate, text: &str) -> Result<AttendanceIntent, IgnoreReason> {
        gate.admit(text)?;
        match self.parser.parse(text, self.fallback_subject) {
            Some(intent) if intent.has_person() => Ok(intent),
            _ => Err(IgnoreReason::Unusable),
        }
    }

    async fn submit(self, intent: AttendanceIntent) {
        let campus = self.campus.active_campus();
        // Outcome is reported by the submitter on the event bus
        let _ = self.submitter.submit(&intent, campus.as_ref()).await;
    }
}

fn transition(
    state: &watch::Sender<ScanState>,
    events: &EventBus,
    session_id: Uuid,
    new_state: ScanState,
) {
    let mut old_state = new_state;
    let changed = state.send_if_modified(|current| {
        if *current == new_state {
            return false;
        }
        old_state = *current;
        *current = new_state;
        true
    });

    if changed {
        info!(%session_id, "Scan state: {} -> {}", old_state, new_state);
        events.emit_lossy(AttendanceEvent::ScanStateChanged {
            session_id,
            old_state,
            new_state,
            timestamp: time::now(),
        });
    }
}

fn report_failure(events: &EventBus, session_id: Uuid, message: String) {
    events.emit_lossy(AttendanceEvent::ScanFailed {
        session_id,
        message,
        timestamp: time::now(),
    });
}

/// Resources held by a running lifecycle; released on drop
struct ScanResources {
    strategy: Option<Box<dyn DetectionStrategy>>,
    stream: Option<Arc<dyn VideoStream>>,
}

impl ScanResources {
    fn release(&mut self) {
        if let Some(mut strategy) = self.strategy.take() {
            strategy.stop();
            debug!("Stopped {} detection", strategy.name());
        }
        if let Some(stream) = self.stream.take() {
            stream.release();
            debug!("Camera released");
        }
    }
}

impl Drop for ScanResources {
    fn drop(&mut self) {
        self.release();
    }
}

struct Worker {
    pipeline: ScanPipeline,
    events: EventBus,
    session_id: Uuid,
    state: Arc<watch::Sender<ScanState>>,
}

/// Resolves when the pending submission finishes; never resolves without one
async fn wait_submission(pending: &mut Option<JoinHandle<()>>) {
    match pending {
        Some(handle) => {
            if let Err(e) = handle.await {
                warn!("Submission task ended abnormally: {}", e);
            }
        }
        None => std::future::pending().await,
    }
}

impl Worker {
    fn ignore(&self, reason: IgnoreReason) {
        debug!(session_id = %self.session_id, ?reason, "Detection ignored");
        self.events.emit_lossy(AttendanceEvent::DetectionIgnored {
            session_id: self.session_id,
            reason,
            timestamp: time::now(),
        });
    }

    async fn run(
        self,
        mut resources: ScanResources,
        mut detections: mpsc::UnboundedReceiver<Detection>,
        cancel: CancellationToken,
    ) {
        let mut gate = DetectionGate::default();
        let mut pending: Option<JoinHandle<()>> = None;

        let failure = loop {
            tokio::select! {
                _ = cancel.cancelled() => break None,

                _ = wait_submission(&mut pending), if pending.is_some() => {
                    pending = None;
                    gate.finish_submission();
                }

                detection = detections.recv() => match detection {
                    Some(Detection::Text(text)) => match self.pipeline.route(&mut gate, &text) {
                        Ok(intent) => {
                            gate.begin_submission();
                            pending = Some(tokio::spawn(self.pipeline.clone().submit(intent)));
                        }
                        Err(reason) => self.ignore(reason),
                    },
                    Some(Detection::Fatal(message)) => break Some(message),
                    None => break Some("detection source closed".to_string()),
                },
            }
        };

        resources.release();

        // Let an outstanding submission report its outcome before the
        // lifecycle is declared over
        if let Some(handle) = pending.take() {
            if let Err(e) = handle.await {
                warn!("Submission task ended abnormally: {}", e);
            }
        }

        if let Some(message) = failure {
            let err = ScanError::Decode(message);
            error!(session_id = %self.session_id, "Scanning stopped: {}", err);
            report_failure(&self.events, self.session_id, err.to_string());
        }
        transition(&self.state, &self.events, self.session_id, ScanState::Stopped);
    }
}

/// Camera-driven detection loop
pub struct ScanLoop {
    camera: Arc<dyn Camera>,
    detectors: DetectorSet,
    pipeline: ScanPipeline,
    events: EventBus,
    session_id: Uuid,
    state: Arc<watch::Sender<ScanState>>,
    worker: Option<(CancellationToken, JoinHandle<()>)>,
}

impl ScanLoop {
    pub fn new(
        camera: Arc<dyn Camera>,
        detectors: DetectorSet,
        pipeline: ScanPipeline,
        events: EventBus,
    ) -> Self {
        let (state, _) = watch::channel(ScanState::Idle);
        Self {
            camera,
            detectors,
            pipeline,
            events,
            session_id: Uuid::new_v4(),
            state: Arc::new(state),
            worker: None,
        }
    }

    pub fn state(&self) -> ScanState {
        *self.state.borrow()
    }

    /// Receiver that observes every lifecycle transition
    pub fn subscribe_state(&self) -> watch::Receiver<ScanState> {
        self.state.subscribe()
    }

    /// Identifier of the current (or most recent) lifecycle
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Begin a new scan lifecycle
    ///
    /// Acquires the camera, selects a detection strategy and starts the
    /// background worker. Any failure leaves the loop `Stopped` with nothing
    /// held.
    pub async fn start(&mut self) -> Result<(), ScanError> {
        if self.state().is_active() {
            return Err(ScanError::AlreadyActive);
        }

        // A lifecycle that ended on its own still has a finished worker to reap
        if let Some((_, handle)) = self.worker.take() {
            let _ = handle.await;
        }

        self.session_id = Uuid::new_v4();
        transition(&self.state, &self.events, self.session_id, ScanState::Starting);

        let stream = match self.camera.acquire().await {
            Ok(stream) => stream,
            Err(e) => return Err(self.abort_start(e)),
        };

        let strategy = match self.detectors.select() {
            Ok(strategy) => strategy,
            Err(e) => {
                stream.release();
                return Err(self.abort_start(e));
            }
        };

        let mut resources = ScanResources {
            strategy: Some(strategy),
            stream: Some(Arc::clone(&stream)),
        };

        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(strategy) = resources.strategy.as_mut() {
            if let Err(e) = strategy.start(stream, DetectionSink::new(tx)).await {
                resources.release();
                return Err(self.abort_start(e));
            }
            info!(session_id = %self.session_id, "Scanning with {} detection", strategy.name());
        }

        transition(&self.state, &self.events, self.session_id, ScanState::Scanning);

        let cancel = CancellationToken::new();
        let worker = Worker {
            pipeline: self.pipeline.clone(),
            events: self.events.clone(),
            session_id: self.session_id,
            state: Arc::clone(&self.state),
        };
        let handle = tokio::spawn(worker.run(resources, rx, cancel.clone()));
        self.worker = Some((cancel, handle));

        Ok(())
    }

    fn abort_start(&self, err: ScanError) -> ScanError {
        error!(session_id = %self.session_id, "Failed to start scanning: {}", err);
        report_failure(&self.events, self.session_id, err.to_string());
        transition(&self.state, &self.events, self.session_id, ScanState::Stopped);
        err
    }

    /// End the current lifecycle and wait until its resources are released
    ///
    /// Safe to call in any state, repeatedly.
    pub async fn stop(&mut self) {
        if let Some((cancel, handle)) = self.worker.take() {
            cancel.cancel();
            if let Err(e) = handle.await {
                warn!(session_id = %self.session_id, "Scan worker ended abnormally: {}", e);
            }
        }
        transition(&self.state, &self.events, self.session_id, ScanState::Stopped);
    }
}

impl Drop for ScanLoop {
    fn drop(&mut self) {
        if let Some((cancel, _)) = self.worker.take() {
            cancel.cancel();
        }
    }
}
