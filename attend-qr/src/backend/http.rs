//! HTTP client for the attendance and directory backends

use async_trait::async_trait;
use attend_common::config::BackendConfig;
use attend_common::types::{AttendanceLog, LogFilters, MarkRequest};
use attend_common::{CampusId, SubjectType};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use super::{
    AttendanceBackend, BackendError, DirectoryBackend, DirectoryPage, SessionGrant, SessionRequest,
};

const USER_AGENT: &str = concat!("attend-qr/", env!("CARGO_PKG_VERSION"));
const CAMPUS_HEADER: &str = "X-Campus-Id";

#[derive(Debug, Deserialize)]
struct LogPage {
    #[serde(default)]
    rows: Vec<AttendanceLog>,
}

/// reqwest-backed implementation of both collaborator traits
pub struct HttpBackend {
    http_client: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BackendError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config
                .api_token
                .as_ref()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, BackendError> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(BackendError::Unauthorized);
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(BackendError::Api(status.as_u16(), error_text));
        }
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, BackendError> {
        self.send(request)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::Parse(e.to_string()))
    }
}

/// Directory endpoint for a subject type
fn directory_path(subject: SubjectType) -> &'static str {
    match subject {
        SubjectType::Student => "/api/students",
        SubjectType::Staff => "/api/staff",
    }
}

/// Query-string pairs for the log listing
fn log_query(filters: &LogFilters) -> Vec<(&'static str, String)> {
    let mut query = Vec::new();
    if let Some(subject) = filters.subject_type {
        query.push(("subjectType", subject.to_string()));
    }
    if let Some(person_id) = filters.person_id {
        query.push(("personId", person_id.to_string()));
    }
    if let Some(from) = filters.from {
        query.push(("from", from.format("%Y-%m-%d").to_string()));
    }
    if let Some(to) = filters.to {
        query.push(("to", to.format("%Y-%m-%d").to_string()));
    }
    if let Some(limit) = filters.limit {
        query.push(("limit", limit.to_string()));
    }
    query
}

#[async_trait]
impl AttendanceBackend for HttpBackend {
    async fn create_session(&self, request: &SessionRequest) -> Result<SessionGrant, BackendError> {
        tracing::debug!(
            subject_type = %request.subject_type,
            expires_in_minutes = request.expires_in_minutes,
            "Requesting QR session"
        );
        let builder = self
            .http_client
            .post(self.url("/api/attendance/qr-sessions"))
            .json(request);
        self.send_json(builder).await
    }

    async fn mark_person(&self, campus: &CampusId, mark: &MarkRequest) -> Result<(), BackendError> {
        tracing::debug!(
            campus = %campus,
            subject_type = %mark.subject_type,
            person_id = mark.person_id,
            "Posting attendance mark"
        );
        let builder = self
            .http_client
            .post(self.url("/api/attendance/mark"))
            .header(CAMPUS_HEADER, campus.as_str())
            .json(mark);
        self.send(builder).await.map(|_| ())
    }

    async fn list_logs(&self, filters: &LogFilters) -> Result<Vec<AttendanceLog>, BackendError> {
        let builder = self
            .http_client
            .get(self.url("/api/attendance/logs"))
            .query(&log_query(filters));
        let page: LogPage = self.send_json(builder).await?;
        Ok(page.rows)
    }
}

#[async_trait]
impl DirectoryBackend for HttpBackend {
    async fn search(&self, subject: SubjectType, query: &str) -> Result<DirectoryPage, BackendError> {
        let builder = self
            .http_client
            .get(self.url(directory_path(subject)))
            .query(&[("search", query)]);
        self.send_json(builder).await
    }
}
