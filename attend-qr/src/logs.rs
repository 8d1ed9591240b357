//! Attendance log listing

use attend_common::types::{AttendanceLog, LogFilters};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::backend::{AttendanceBackend, BackendError};

#[derive(Debug, Error)]
pub enum LogsError {
    #[error(transparent)]
    InvalidFilters(#[from] attend_common::Error),

    #[error("Log listing failed: {0}")]
    Backend(#[from] BackendError),
}

pub struct AttendanceLogs {
    backend: Arc<dyn AttendanceBackend>,
}

impl AttendanceLogs {
    pub fn new(backend: Arc<dyn AttendanceBackend>) -> Self {
        Self { backend }
    }

    /// List recorded marks in backend order
    ///
    /// Invalid filters are rejected before any request is made.
    pub async fn list(&self, filters: &LogFilters) -> Result<Vec<AttendanceLog>, LogsError> {
        filters.validate()?;
        let logs = self.backend.list_logs(filters).await?;
        debug!(count = logs.len(), "Listed attendance logs");
        Ok(logs)
    }
}
