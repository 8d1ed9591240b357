//! Domain types shared across the attendance crates

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Whether the scanned or marked entity is a student or a staff member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectType {
    Student,
    Staff,
}

impl SubjectType {
    /// Normalize a free-form role token using the built-in vocabulary
    ///
    /// `student` maps to Student; `teacher`, `staff` and `employee` map to
    /// Staff. Anything else yields `None` so callers can apply their own
    /// fallback.
    pub fn from_role_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "student" => Some(SubjectType::Student),
            "teacher" | "staff" | "employee" => Some(SubjectType::Staff),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectType::Student => "student",
            SubjectType::Staff => "staff",
        }
    }
}

impl fmt::Display for SubjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubjectType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_role_token(s)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown subject type: {}", s)))
    }
}

/// Identifier of the active campus (tenant)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CampusId(String);

impl CampusId {
    /// Build a campus id, rejecting blank values
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CampusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Structured attendance intent produced by the payload parser
///
/// Ephemeral: consumed immediately by the directory lookup or the submitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceIntent {
    pub subject_type: SubjectType,
    pub person_id: Option<i64>,
    pub person_name: Option<String>,
    /// Trimmed scanned text, kept for audit and de-duplication
    pub raw_code: String,
}

impl AttendanceIntent {
    pub fn has_person(&self) -> bool {
        self.person_id.is_some()
    }
}

/// Attendance status recorded with a mark
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
}

/// Body of a single attendance mark
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkRequest {
    pub subject_type: SubjectType,
    pub person_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub person_name: Option<String>,
    pub raw_code: String,
    pub status: AttendanceStatus,
    pub timestamp: DateTime<Utc>,
}

/// Server-issued, short-lived session payload meant to be rendered and scanned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrSessionDescriptor {
    pub subject_type: SubjectType,
    /// Opaque to the client; rendered and scanned unchanged
    pub payload: String,
    pub expires_at: DateTime<Utc>,
}

impl QrSessionDescriptor {
    /// Display-only check; enforcement belongs to the attendance backend
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Remaining lifetime, clamped at zero
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        let left = self.expires_at - now;
        if left < Duration::zero() {
            Duration::zero()
        } else {
            left
        }
    }
}

/// One ranked directory search candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonCandidate {
    pub id: Option<i64>,
    pub name: Option<String>,
    /// Roll number or class/section for students; employee id, designation
    /// or department for staff
    pub secondary_label: Option<String>,
}

/// A recorded attendance event as returned by the attendance backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceLog {
    #[serde(default)]
    pub id: Option<i64>,
    pub subject_type: SubjectType,
    pub person_id: i64,
    #[serde(default)]
    pub person_name: Option<String>,
    #[serde(default)]
    pub raw_code: Option<String>,
    pub status: AttendanceStatus,
    pub timestamp: DateTime<Utc>,
}

/// Filters accepted by the attendance log listing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_type: Option<SubjectType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub person_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl LogFilters {
    /// Reject filter combinations the backend cannot satisfy
    pub fn validate(&self) -> Result<()> {
        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from > to {
                return Err(Error::InvalidInput(format!(
                    "Date range start {} is after end {}",
                    from, to
                )));
            }
        }
        if self.limit == Some(0) {
            return Err(Error::InvalidInput("Limit must be positive".to_string()));
        }
        Ok(())
    }
}
