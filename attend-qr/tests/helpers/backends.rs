//! Recording attendance backend and scripted directory

use async_trait::async_trait;
use attend_common::types::{AttendanceLog, LogFilters, MarkRequest};
use attend_common::{time, CampusId, SubjectType};
use attend_qr::backend::{
    AttendanceBackend, BackendError, DirectoryBackend, DirectoryPage, SessionGrant, SessionRequest,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Attendance backend that records every call
#[derive(Default)]
pub struct RecordingBackend {
    marks: Mutex<Vec<(CampusId, MarkRequest)>>,
    sessions: Mutex<Vec<SessionRequest>>,
    log_queries: AtomicUsize,
    mark_delay: Mutex<Duration>,
    fail_marks: AtomicBool,
    fail_sessions: AtomicBool,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every mark takes `delay` to be acknowledged
    pub fn with_mark_delay(delay: Duration) -> Self {
        let backend = Self::default();
        *backend.mark_delay.lock().unwrap() = delay;
        backend
    }

    pub fn fail_marks(&self, fail: bool) {
        self.fail_marks.store(fail, Ordering::SeqCst);
    }

    pub fn fail_sessions(&self, fail: bool) {
        self.fail_sessions.store(fail, Ordering::SeqCst);
    }

    pub fn marks(&self) -> Vec<(CampusId, MarkRequest)> {
        self.marks.lock().unwrap().clone()
    }

    pub fn marked_ids(&self) -> Vec<i64> {
        self.marks().into_iter().map(|(_, m)| m.person_id).collect()
    }

    pub fn session_requests(&self) -> Vec<SessionRequest> {
        self.sessions.lock().unwrap().clone()
    }

    pub fn log_queries(&self) -> usize {
        self.log_queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AttendanceBackend for RecordingBackend {
    async fn create_session(&self, request: &SessionRequest) -> Result<SessionGrant, BackendError> {
        if self.fail_sessions.load(Ordering::SeqCst) {
            return Err(BackendError::Api(503, "session service down".to_string()));
        }
        let mut sessions = self.sessions.lock().unwrap();
        sessions.push(request.clone());
        Ok(SessionGrant {
            payload: format!("qr-session-{}", sessions.len()),
            expires_at: time::now() + chrono::Duration::minutes(i64::from(request.expires_in_minutes)),
        })
    }

    async fn mark_person(&self, campus: &CampusId, mark: &MarkRequest) -> Result<(), BackendError> {
        let delay = *self.mark_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_marks.load(Ordering::SeqCst) {
            return Err(BackendError::Network("connection refused".to_string()));
        }
        self.marks.lock().unwrap().push((campus.clone(), mark.clone()));
        Ok(())
    }

    async fn list_logs(&self, filters: &LogFilters) -> Result<Vec<AttendanceLog>, BackendError> {
        self.log_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .marks()
            .into_iter()
            .map(|(_, m)| m)
            .filter(|m| filters.subject_type.map_or(true, |s| s == m.subject_type))
            .filter(|m| filters.person_id.map_or(true, |id| id == m.person_id))
            .map(|m| AttendanceLog {
                id: None,
                subject_type: m.subject_type,
                person_id: m.person_id,
                person_name: m.person_name,
                raw_code: Some(m.raw_code),
                status: m.status,
                timestamp: m.timestamp,
            })
            .collect())
    }
}

/// Directory whose replies take a per-term delay
#[derive(Default)]
pub struct DelayedDirectory {
    replies: HashMap<String, (Duration, Vec<Value>)>,
    calls: Mutex<Vec<(SubjectType, String)>>,
    fail: AtomicBool,
}

impl DelayedDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, term: &str, delay: Duration, rows: Vec<Value>) -> Self {
        self.replies.insert(term.to_string(), (delay, rows));
        self
    }

    pub fn failing() -> Self {
        let directory = Self::default();
        directory.fail.store(true, Ordering::SeqCst);
        directory
    }

    pub fn calls(&self) -> Vec<(SubjectType, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DirectoryBackend for DelayedDirectory {
    async fn search(&self, subject: SubjectType, query: &str) -> Result<DirectoryPage, BackendError> {
        self.calls.lock().unwrap().push((subject, query.to_string()));
        if self.fail.load(Ordering::SeqCst) {
            return Err(BackendError::Api(500, "directory unavailable".to_string()));
        }

        let (delay, rows) = self.replies.get(query).cloned().unwrap_or_default();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(DirectoryPage { rows })
    }
}
