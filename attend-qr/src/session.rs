//! Session issuer
//!
//! Requests a short-lived QR session descriptor from the attendance backend
//! and holds the latest one for display. The payload is opaque here: it is
//! handed unchanged to whatever renders it as a scannable image.
//!
//! Expiry is enforced by the backend, never locally.

use attend_common::events::{AttendanceEvent, EventBus};
use attend_common::types::QrSessionDescriptor;
use attend_common::{time, SubjectType};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{error, info};

use crate::backend::{AttendanceBackend, BackendError, SessionRequest};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session creation failed: {0}")]
    Backend(#[from] BackendError),
}

/// Parse a user-supplied lifetime; non-numeric input yields `None`
pub fn parse_lifetime_input(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(minutes) = raw.parse::<i64>() {
        return Some(minutes);
    }
    raw.parse::<f64>()
        .ok()
        .filter(|m| m.is_finite())
        .map(|m| m.trunc() as i64)
}

pub struct SessionIssuer {
    backend: Arc<dyn AttendanceBackend>,
    default_lifetime_minutes: u32,
    current: RwLock<Option<QrSessionDescriptor>>,
    events: EventBus,
}

impl SessionIssuer {
    pub fn new(
        backend: Arc<dyn AttendanceBackend>,
        default_lifetime_minutes: u32,
        events: EventBus,
    ) -> Self {
        Self {
            backend,
            default_lifetime_minutes: default_lifetime_minutes.max(1),
            current: RwLock::new(None),
            events,
        }
    }

    /// Lifetime actually requested: absent or non-positive values use the default
    pub fn resolve_lifetime(&self, requested: Option<i64>) -> u32 {
        match requested {
            Some(minutes) if minutes > 0 => u32::try_from(minutes).unwrap_or(u32::MAX),
            _ => self.default_lifetime_minutes,
        }
    }

    /// Issue a new session, replacing the held descriptor on success
    ///
    /// One backend call, no automatic retry. On failure the previously held
    /// descriptor is left untouched.
    pub async fn create_session(
        &self,
        subject: SubjectType,
        requested_minutes: Option<i64>,
    ) -> Result<QrSessionDescriptor, SessionError> {
        let request = SessionRequest {
            subject_type: subject,
            expires_in_minutes: self.resolve_lifetime(requested_minutes),
        };

        let grant = match self.backend.create_session(&request).await {
            Ok(grant) => grant,
            Err(e) => {
                error!(subject_type = %subject, "QR session creation failed: {}", e);
                return Err(e.into());
            }
        };

        let descriptor = QrSessionDescriptor {
            subject_type: subject,
            payload: grant.payload,
            expires_at: grant.expires_at,
        };

        *self.current.write().await = Some(descriptor.clone());

        info!(
            subject_type = %subject,
            expires_in_minutes = request.expires_in_minutes,
            expires_at = %descriptor.expires_at,
            "QR session issued"
        );
        self.events.emit_lossy(AttendanceEvent::SessionIssued {
            subject_type: subject,
            expires_at: descriptor.expires_at,
            timestamp: time::now(),
        });

        Ok(descriptor)
    }

    /// Issue a session from free-form lifetime input (e.g. a text field)
    pub async fn create_session_from_input(
        &self,
        subject: SubjectType,
        raw_minutes: Option<&str>,
    ) -> Result<QrSessionDescriptor, SessionError> {
        self.create_session(subject, raw_minutes.and_then(parse_lifetime_input))
            .await
    }

    /// Latest successfully issued descriptor, if any
    pub async fn current(&self) -> Option<QrSessionDescriptor> {
        self.current.read().await.clone()
    }
}
