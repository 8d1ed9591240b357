//! Directory lookup
//!
//! Debounced, cancelable person search used to correct or complete an
//! intent. Every keystroke gets a sequence number; a response is published
//! only if its sequence number is still the latest issued, so a slow reply to
//! an older query can never overwrite the result of a newer one.
//!
//! Lookup is advisory: backend failures are logged and read as "no results".

use attend_common::events::{AttendanceEvent, EventBus};
use attend_common::types::PersonCandidate;
use attend_common::{time, SubjectType};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::backend::DirectoryBackend;
use crate::parser::extract_person_id;

/// Published result set of the most recent query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupResult {
    /// Sequence number of the query that produced this result
    pub sequence: u64,
    pub subject_type: Option<SubjectType>,
    pub term: String,
    /// Backend relevance order, not re-sorted
    pub candidates: Vec<PersonCandidate>,
}

const STUDENT_ID_KEYS: [&str; 3] = ["id", "personId", "studentId"];
const STAFF_ID_KEYS: [&str; 4] = ["id", "personId", "teacherId", "staffId"];
const STUDENT_LABEL_KEYS: [&str; 3] = ["rollNumber", "rollNo", "roll_no"];
const STAFF_LABEL_KEYS: [&str; 4] = ["employeeId", "employee_id", "designation", "department"];
const CLASS_KEYS: [&str; 3] = ["className", "class", "grade"];

/// Non-blank text of a string or number field
fn field_text(record: &Value, key: &str) -> Option<String> {
    match record.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn first_text(record: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| field_text(record, key))
}

fn record_name(record: &Value) -> Option<String> {
    first_text(record, &["name", "fullName"]).or_else(|| {
        let parts: Vec<String> = ["firstName", "lastName"]
            .iter()
            .filter_map(|key| field_text(record, key))
            .collect();
        (!parts.is_empty()).then(|| parts.join(" "))
    })
}

fn secondary_label(subject: SubjectType, record: &Value) -> Option<String> {
    match subject {
        SubjectType::Student => first_text(record, &STUDENT_LABEL_KEYS).or_else(|| {
            let class = first_text(record, &CLASS_KEYS);
            let section = field_text(record, "section");
            match (class, section) {
                (Some(class), Some(section)) => Some(format!("{}-{}", class, section)),
                (class, section) => class.or(section),
            }
        }),
        SubjectType::Staff => first_text(record, &STAFF_LABEL_KEYS),
    }
}

/// Project one backend record; records with neither id nor name are dropped
pub fn project_record(subject: SubjectType, record: &Value) -> Option<PersonCandidate> {
    let id_keys: &[&str] = match subject {
        SubjectType::Student => &STUDENT_ID_KEYS,
        SubjectType::Staff => &STAFF_ID_KEYS,
    };
    let id = id_keys
        .iter()
        .find_map(|key| record.get(*key).and_then(extract_person_id));
    let name = record_name(record);

    if id.is_none() && name.is_none() {
        return None;
    }

    Some(PersonCandidate {
        id,
        name,
        secondary_label: secondary_label(subject, record),
    })
}

/// Immediate (non-debounced) directory search
///
/// Blank terms return nothing without touching the backend.
pub async fn search_directory(
    backend: &dyn DirectoryBackend,
    subject: SubjectType,
    term: &str,
) -> Vec<PersonCandidate> {
    let term = term.trim();
    if term.is_empty() {
        return Vec::new();
    }

    match backend.search(subject, term).await {
        Ok(page) => page
            .rows
            .iter()
            .filter_map(|record| project_record(subject, record))
            .collect(),
        Err(e) => {
            warn!(subject_type = %subject, term, "Directory lookup failed: {}", e);
            Vec::new()
        }
    }
}

/// Publish `result` only if it belongs to the latest issued query
fn publish(
    latest: &AtomicU64,
    results: &watch::Sender<LookupResult>,
    events: &EventBus,
    result: LookupResult,
) -> bool {
    let sequence = result.sequence;
    let term = result.term.clone();
    let count = result.candidates.len();

    let applied = results.send_if_modified(|current| {
        if sequence != latest.load(Ordering::SeqCst) || sequence <= current.sequence {
            return false;
        }
        *current = result;
        true
    });

    if applied {
        events.emit_lossy(AttendanceEvent::LookupCompleted {
            sequence,
            term,
            result_count: count,
            timestamp: time::now(),
        });
    } else {
        debug!(sequence, term = %term, "Dropping stale lookup result");
    }
    applied
}

/// Debounced lookup owning its in-flight query token
pub struct DirectoryLookup {
    backend: Arc<dyn DirectoryBackend>,
    debounce: Duration,
    latest: Arc<AtomicU64>,
    pending: Option<CancellationToken>,
    results: Arc<watch::Sender<LookupResult>>,
    events: EventBus,
}

impl DirectoryLookup {
    pub fn new(backend: Arc<dyn DirectoryBackend>, debounce: Duration, events: EventBus) -> Self {
        let (tx, _) = watch::channel(LookupResult::default());
        Self {
            backend,
            debounce,
            latest: Arc::new(AtomicU64::new(0)),
            pending: None,
            results: Arc::new(tx),
            events,
        }
    }

    /// Receiver that observes every published result set
    pub fn subscribe(&self) -> watch::Receiver<LookupResult> {
        self.results.subscribe()
    }

    pub fn current(&self) -> LookupResult {
        self.results.borrow().clone()
    }

    /// Handle a keystroke in the search field
    ///
    /// Cancels the pending debounce timer, if any, and restarts the delay
    /// for the new term. A request already sent is not aborted; its reply is
    /// simply not published once a newer query exists. Returns the sequence
    /// number assigned to this query.
    pub fn on_input(&mut self, subject: SubjectType, term: &str) -> u64 {
        if let Some(token) = self.pending.take() {
            token.cancel();
        }

        let sequence = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        let term = term.trim().to_string();

        if term.is_empty() {
            publish(
                &self.latest,
                &self.results,
                &self.events,
                LookupResult {
                    sequence,
                    subject_type: Some(subject),
                    term,
                    candidates: Vec::new(),
                },
            );
            return sequence;
        }

        let token = CancellationToken::new();
        self.pending = Some(token.clone());

        let backend = Arc::clone(&self.backend);
        let latest = Arc::clone(&self.latest);
        let results = Arc::clone(&self.results);
        let events = self.events.clone();
        let debounce = self.debounce;

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!(sequence, "Lookup superseded during debounce");
                    return;
                }
                _ = tokio::time::sleep(debounce) => {}
            }

            let candidates = search_directory(backend.as_ref(), subject, &term).await;
            publish(
                &latest,
                &results,
                &events,
                LookupResult {
                    sequence,
                    subject_type: Some(subject),
                    term,
                    candidates,
                },
            );
        });

        sequence
    }

    /// Abandon the current query: cancel its timer and drop any late reply
    pub fn cancel(&mut self) {
        if let Some(token) = self.pending.take() {
            token.cancel();
        }
        self.latest.fetch_add(1, Ordering::SeqCst);
    }

    /// Search immediately, bypassing debounce and result publication
    pub async fn search_now(&self, subject: SubjectType, term: &str) -> Vec<PersonCandidate> {
        search_directory(self.backend.as_ref(), subject, term).await
    }
}

impl Drop for DirectoryLookup {
    fn drop(&mut self) {
        if let Some(token) = self.pending.take() {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_project_student_record() {
        let record = json!({"id": 7, "name": " Ali Raza ", "rollNumber": "R-12", "className": "5"});
        let candidate = project_record(SubjectType::Student, &record).unwrap();
        assert_eq!(candidate.id, Some(7));
        assert_eq!(candidate.name.as_deref(), Some("Ali Raza"));
        assert_eq!(candidate.secondary_label.as_deref(), Some("R-12"));
    }

    #[test]
    fn test_student_label_falls_back_to_class_section() {
        let record = json!({"studentId": "STU-0009", "firstName": "Sara", "lastName": "Iqbal", "class": "7", "section": "B"});
        let candidate = project_record(SubjectType::Student, &record).unwrap();
        assert_eq!(candidate.id, Some(9));
        assert_eq!(candidate.name.as_deref(), Some("Sara Iqbal"));
        assert_eq!(candidate.secondary_label.as_deref(), Some("7-B"));
    }

    #[test]
    fn test_project_staff_record_label_order() {
        let record = json!({"id": "31", "fullName": "Maria Lopez", "designation": "Lecturer", "department": "Physics"});
        let candidate = project_record(SubjectType::Staff, &record).unwrap();
        assert_eq!(candidate.id, Some(31));
        assert_eq!(candidate.secondary_label.as_deref(), Some("Lecturer"));

        let record = json!({"id": 32, "name": "R. Das", "employeeId": 1001, "designation": "Clerk"});
        let candidate = project_record(SubjectType::Staff, &record).unwrap();
        assert_eq!(candidate.secondary_label.as_deref(), Some("1001"));
    }

    #[test]
    fn test_records_without_id_and_name_dropped() {
        assert!(project_record(SubjectType::Staff, &json!({"department": "Physics"})).is_none());
        assert!(project_record(SubjectType::Student, &json!({"name": "  "})).is_none());

        let name_only = project_record(SubjectType::Student, &json!({"name": "Guest"})).unwrap();
        assert_eq!(name_only.id, None);
        assert_eq!(name_only.secondary_label, None);
    }

    #[test]
    fn test_publish_rejects_superseded_sequence() {
        let latest = AtomicU64::new(2);
        let (tx, rx) = watch::channel(LookupResult::default());
        let events = EventBus::new(10);

        let stale = LookupResult {
            sequence: 1,
            term: "Al".to_string(),
            ..Default::default()
        };
        assert!(!publish(&latest, &tx, &events, stale));
        assert_eq!(rx.borrow().sequence, 0);

        let fresh = LookupResult {
            sequence: 2,
            term: "Ali".to_string(),
            ..Default::default()
        };
        assert!(publish(&latest, &tx, &events, fresh));
        assert_eq!(rx.borrow().term, "Ali");
    }
}
