//! Event types for the attendance event system
//!
//! Provides shared event definitions and the EventBus. Front ends subscribe to
//! the bus to surface lifecycle changes, successes and failures to the user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::types::SubjectType;

/// Scan session lifecycle state
///
/// `Stopped` is reachable from any state and is terminal until a fresh
/// `Starting` transition begins a new lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanState {
    Idle,
    Starting,
    Scanning,
    Stopped,
}

impl ScanState {
    /// True while the session holds (or is acquiring) the camera
    pub fn is_active(&self) -> bool {
        matches!(self, ScanState::Starting | ScanState::Scanning)
    }
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanState::Idle => write!(f, "idle"),
            ScanState::Starting => write!(f, "starting"),
            ScanState::Scanning => write!(f, "scanning"),
            ScanState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Why a detection was not turned into a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    /// A submission from a prior detection is still outstanding
    SubmissionInFlight,
    /// Same text as the most recently admitted detection
    Duplicate,
    /// Parsed, but carries nothing a mark can be recorded against
    Unusable,
}

/// Attendance event types
///
/// Events are broadcast via EventBus and can be serialized for transmission
/// to a display client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AttendanceEvent {
    /// Scan session moved between lifecycle states
    ScanStateChanged {
        /// Lifecycle the transition belongs to
        session_id: Uuid,
        old_state: ScanState,
        new_state: ScanState,
        timestamp: DateTime<Utc>,
    },

    /// A detection was dropped before submission
    DetectionIgnored {
        session_id: Uuid,
        reason: IgnoreReason,
        timestamp: DateTime<Utc>,
    },

    /// Scanning could not start or stopped on a fatal error
    ScanFailed {
        session_id: Uuid,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// An attendance mark was accepted by the attendance backend
    AttendanceMarked {
        subject_type: SubjectType,
        person_id: i64,
        person_name: Option<String>,
        raw_code: String,
        timestamp: DateTime<Utc>,
    },

    /// An attendance mark was rejected locally or by the backend
    SubmissionFailed {
        raw_code: String,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// A new session descriptor replaced the held one
    SessionIssued {
        subject_type: SubjectType,
        expires_at: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },

    /// A debounced directory lookup produced the current result set
    LookupCompleted {
        sequence: u64,
        term: String,
        result_count: usize,
        timestamp: DateTime<Utc>,
    },
}

impl AttendanceEvent {
    /// Short event name for logging and display routing
    pub fn event_type(&self) -> &'static str {
        match self {
            AttendanceEvent::ScanStateChanged { .. } => "ScanStateChanged",
            AttendanceEvent::DetectionIgnored { .. } => "DetectionIgnored",
            AttendanceEvent::ScanFailed { .. } => "ScanFailed",
            AttendanceEvent::AttendanceMarked { .. } => "AttendanceMarked",
            AttendanceEvent::SubmissionFailed { .. } => "SubmissionFailed",
            AttendanceEvent::SessionIssued { .. } => "SessionIssued",
            AttendanceEvent::LookupCompleted { .. } => "LookupCompleted",
        }
    }
}

/// Central event distribution bus
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use attend_common::events::{AttendanceEvent, EventBus, ScanState};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(AttendanceEvent::ScanStateChanged {
///     session_id: uuid::Uuid::new_v4(),
///     old_state: ScanState::Idle,
///     new_state: ScanState::Starting,
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AttendanceEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<AttendanceEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: AttendanceEvent) {
        let _ = self.tx.send(event);
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("capacity", &self.capacity)
            .field("subscribers", &self.tx.receiver_count())
            .finish()
    }
}
