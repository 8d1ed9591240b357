//! Test Helper Utilities
//!
//! In-memory collaborators for exercising attend-qr without a camera or a
//! network.

#![allow(dead_code)]

pub mod backends;
pub mod camera;

pub use backends::{DelayedDirectory, RecordingBackend};
pub use camera::{FailingLoader, MockCamera, MockStream, ScriptedDetector, ScriptedLoader, Step};

use attend_common::events::{AttendanceEvent, EventBus};
use attend_common::{CampusId, SubjectType};
use attend_qr::scan::DetectorSet;
use attend_qr::{AttendanceSubmitter, PayloadParser, ScanLoop, ScanPipeline, StaticCampus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

pub const POLL: Duration = Duration::from_millis(500);

pub fn pipeline(backend: Arc<RecordingBackend>, campus: Option<&str>, events: &EventBus) -> ScanPipeline {
    ScanPipeline {
        parser: Arc::new(PayloadParser::default()),
        submitter: Arc::new(AttendanceSubmitter::new(backend, events.clone())),
        campus: Arc::new(StaticCampus::new(campus.and_then(CampusId::new))),
        fallback_subject: SubjectType::Student,
    }
}

/// Scan loop over a granted mock camera polling `detector`
pub fn native_scan_loop(
    camera: Arc<MockCamera>,
    detector: Arc<ScriptedDetector>,
    backend: Arc<RecordingBackend>,
    campus: Option<&str>,
    events: &EventBus,
) -> ScanLoop {
    ScanLoop::new(
        camera,
        DetectorSet::native(detector, POLL),
        pipeline(backend, campus, events),
        events.clone(),
    )
}

/// Everything currently buffered on a bus receiver
pub fn drain(rx: &mut broadcast::Receiver<AttendanceEvent>) -> Vec<AttendanceEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn count_type(events: &[AttendanceEvent], event_type: &str) -> usize {
    events.iter().filter(|e| e.event_type() == event_type).count()
}
