//! External collaborators at their interface boundary
//!
//! The attendance backend, the person directory and the campus context are
//! owned elsewhere. This module defines what the capture core needs from
//! them; [`http::HttpBackend`] is the production implementation.

pub mod http;

use async_trait::async_trait;
use attend_common::types::{AttendanceLog, LogFilters, MarkRequest};
use attend_common::{CampusId, SubjectType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use http::HttpBackend;

/// Collaborator call failures
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Not authorized")]
    Unauthorized,
}

/// Body of a session issuance request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest {
    pub subject_type: SubjectType,
    pub expires_in_minutes: u32,
}

/// What the attendance backend returns for a new session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionGrant {
    pub payload: String,
    pub expires_at: DateTime<Utc>,
}

/// One page of raw directory records
///
/// Records are kept as loose JSON objects; the lookup projects them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectoryPage {
    #[serde(default)]
    pub rows: Vec<Value>,
}

/// Attendance service: sessions, marks and logs
#[async_trait]
pub trait AttendanceBackend: Send + Sync {
    async fn create_session(&self, request: &SessionRequest) -> Result<SessionGrant, BackendError>;

    async fn mark_person(&self, campus: &CampusId, mark: &MarkRequest) -> Result<(), BackendError>;

    async fn list_logs(&self, filters: &LogFilters) -> Result<Vec<AttendanceLog>, BackendError>;
}

/// Student and staff directories, independently queryable
#[async_trait]
pub trait DirectoryBackend: Send + Sync {
    async fn search(&self, subject: SubjectType, query: &str) -> Result<DirectoryPage, BackendError>;
}

/// Supplies the active campus; `None` blocks submission
pub trait CampusContext: Send + Sync {
    fn active_campus(&self) -> Option<CampusId>;
}

/// Campus fixed at startup from configuration or the command line
#[derive(Debug, Clone, Default)]
pub struct StaticCampus(Option<CampusId>);

impl StaticCampus {
    pub fn new(campus: Option<CampusId>) -> Self {
        Self(campus)
    }
}

impl CampusContext for StaticCampus {
    fn active_campus(&self) -> Option<CampusId> {
        self.0.clone()
    }
}
