//! Attendance submitter
//!
//! Validates a resolved intent against the active campus and records one
//! `Present` mark with the attendance backend. Failures are surfaced to the
//! caller and on the event bus; nothing is retried automatically.

use attend_common::events::{AttendanceEvent, EventBus};
use attend_common::types::{AttendanceStatus, MarkRequest};
use attend_common::{time, AttendanceIntent, CampusId, SubjectType};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::backend::{AttendanceBackend, BackendError};

/// Why a submission did not record a mark
///
/// The first three variants are user-actionable validation failures, each
/// with its own message. None of them reach the network.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("Select a campus before marking attendance")]
    MissingCampus,

    #[error("A valid person ID is required to mark attendance")]
    MissingPersonId,

    #[error("Attendance code is empty")]
    EmptyCode,

    #[error("Attendance submission failed: {0}")]
    Backend(#[from] BackendError),
}

impl SubmitError {
    pub fn is_validation(&self) -> bool {
        !matches!(self, SubmitError::Backend(_))
    }
}

/// Confirmation of a recorded mark
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkReceipt {
    pub subject_type: SubjectType,
    pub person_id: i64,
    pub raw_code: String,
    pub marked_at: DateTime<Utc>,
}

/// Check the submission preconditions in order: campus, person id, code
pub fn validate<'a>(
    intent: &AttendanceIntent,
    campus: Option<&'a CampusId>,
) -> Result<(&'a CampusId, i64), SubmitError> {
    let campus = campus.ok_or(SubmitError::MissingCampus)?;
    let person_id = intent.person_id.ok_or(SubmitError::MissingPersonId)?;
    if intent.raw_code.trim().is_empty() {
        return Err(SubmitError::EmptyCode);
    }
    Ok((campus, person_id))
}

pub struct AttendanceSubmitter {
    backend: Arc<dyn AttendanceBackend>,
    events: EventBus,
    last_marked_at: RwLock<Option<DateTime<Utc>>>,
}

impl AttendanceSubmitter {
    pub fn new(backend: Arc<dyn AttendanceBackend>, events: EventBus) -> Self {
        Self {
            backend,
            events,
            last_marked_at: RwLock::new(None),
        }
    }

    /// Record a `Present` mark for the intent
    pub async fn submit(
        &self,
        intent: &AttendanceIntent,
        campus: Option<&CampusId>,
    ) -> Result<MarkReceipt, SubmitError> {
        let result = self.try_submit(intent, campus).await;

        match &result {
            Ok(receipt) => {
                *self.last_marked_at.write().await = Some(receipt.marked_at);
                info!(
                    subject_type = %receipt.subject_type,
                    person_id = receipt.person_id,
                    "Attendance marked"
                );
                self.events.emit_lossy(AttendanceEvent::AttendanceMarked {
                    subject_type: receipt.subject_type,
                    person_id: receipt.person_id,
                    person_name: intent.person_name.clone(),
                    raw_code: receipt.raw_code.clone(),
                    timestamp: receipt.marked_at,
                });
            }
            Err(e) => {
                warn!(raw_code = %intent.raw_code, "Attendance not marked: {}", e);
                self.events.emit_lossy(AttendanceEvent::SubmissionFailed {
                    raw_code: intent.raw_code.clone(),
                    message: e.to_string(),
                    timestamp: time::now(),
                });
            }
        }

        result
    }

    async fn try_submit(
        &self,
        intent: &AttendanceIntent,
        campus: Option<&CampusId>,
    ) -> Result<MarkReceipt, SubmitError> {
        let (campus, person_id) = validate(intent, campus)?;

        let mark = MarkRequest {
            subject_type: intent.subject_type,
            person_id,
            person_name: intent.person_name.clone(),
            raw_code: intent.raw_code.clone(),
            status: AttendanceStatus::Present,
            timestamp: time::now(),
        };

        self.backend.mark_person(campus, &mark).await?;

        Ok(MarkReceipt {
            subject_type: mark.subject_type,
            person_id,
            raw_code: mark.raw_code,
            marked_at: mark.timestamp,
        })
    }

    /// When the last successful mark was recorded, for UI feedback
    pub async fn last_marked_at(&self) -> Option<DateTime<Utc>> {
        *self.last_marked_at.read().await
    }
}
