//! Attendance submission, manual entry and log listing

mod helpers;

use attend_common::events::{AttendanceEvent, EventBus};
use attend_common::types::{AttendanceStatus, LogFilters};
use attend_common::{CampusId, SubjectType};
use attend_qr::{AttendanceLogs, AttendanceSubmitter, LogsError, ManualEntry, PayloadParser, SubmitError};
use chrono::NaiveDate;
use helpers::{drain, RecordingBackend};
use std::sync::Arc;

fn north() -> CampusId {
    CampusId::new("north").unwrap()
}

#[tokio::test]
async fn test_structured_teacher_payload_is_recorded() {
    let backend = Arc::new(RecordingBackend::new());
    let events = EventBus::new(10);
    let mut rx = events.subscribe();
    let submitter = AttendanceSubmitter::new(Arc::clone(&backend) as _, events);

    let intent = PayloadParser::default()
        .parse(r#"{"type":"teacher","id":42,"name":"A. Khan"}"#, SubjectType::Student)
        .unwrap();
    let receipt = submitter.submit(&intent, Some(&north())).await.unwrap();

    assert_eq!(receipt.subject_type, SubjectType::Staff);
    assert_eq!(receipt.person_id, 42);
    assert_eq!(submitter.last_marked_at().await, Some(receipt.marked_at));

    let marks = backend.marks();
    assert_eq!(marks.len(), 1);
    let (campus, mark) = &marks[0];
    assert_eq!(campus.as_str(), "north");
    assert_eq!(mark.status, AttendanceStatus::Present);
    assert_eq!(mark.person_name.as_deref(), Some("A. Khan"));

    let marked = drain(&mut rx).into_iter().any(|e| {
        matches!(e, AttendanceEvent::AttendanceMarked { person_id: 42, .. })
    });
    assert!(marked);
}

#[tokio::test]
async fn test_blank_manual_entry_rejected_without_network() {
    let backend = Arc::new(RecordingBackend::new());
    let events = EventBus::new(10);
    let mut rx = events.subscribe();
    let submitter = AttendanceSubmitter::new(Arc::clone(&backend) as _, events);

    let intent = ManualEntry::default().to_intent(&PayloadParser::default(), SubjectType::Student);
    let result = submitter.submit(&intent, Some(&north())).await;

    assert!(matches!(result, Err(SubmitError::MissingPersonId)));
    assert!(backend.marks().is_empty());
    assert!(submitter.last_marked_at().await.is_none());

    let failure = drain(&mut rx).into_iter().find_map(|e| match e {
        AttendanceEvent::SubmissionFailed { message, .. } => Some(message),
        _ => None,
    });
    assert_eq!(failure.as_deref(), Some("A valid person ID is required to mark attendance"));
}

#[tokio::test]
async fn test_missing_campus_checked_first() {
    let backend = Arc::new(RecordingBackend::new());
    let submitter = AttendanceSubmitter::new(Arc::clone(&backend) as _, EventBus::new(10));

    let intent = PayloadParser::default().parse("S-7", SubjectType::Student).unwrap();
    let result = submitter.submit(&intent, None).await;

    assert!(matches!(result, Err(SubmitError::MissingCampus)));
    assert!(backend.marks().is_empty());
}

#[tokio::test]
async fn test_manual_id_without_code_is_auditable() {
    let backend = Arc::new(RecordingBackend::new());
    let submitter = AttendanceSubmitter::new(Arc::clone(&backend) as _, EventBus::new(10));

    let entry = ManualEntry {
        subject_type: Some(SubjectType::Student),
        person_id: "STU-0042".to_string(),
        person_name: "Sara Iqbal".to_string(),
        code: String::new(),
    };
    let intent = entry.to_intent(&PayloadParser::default(), SubjectType::Staff);
    submitter.submit(&intent, Some(&north())).await.unwrap();

    let (_, mark) = &backend.marks()[0];
    assert_eq!(mark.person_id, 42);
    assert_eq!(mark.subject_type, SubjectType::Student);
    assert_eq!(mark.raw_code, "student:42");
}

#[tokio::test]
async fn test_backend_failure_surfaces_and_is_not_retried() {
    let backend = Arc::new(RecordingBackend::new());
    backend.fail_marks(true);
    let submitter = AttendanceSubmitter::new(Arc::clone(&backend) as _, EventBus::new(10));

    let intent = PayloadParser::default().parse("T-4", SubjectType::Student).unwrap();
    let err = submitter.submit(&intent, Some(&north())).await.unwrap_err();

    assert!(!err.is_validation());
    assert!(submitter.last_marked_at().await.is_none());
}

#[tokio::test]
async fn test_inverted_date_range_rejected_locally() {
    let backend = Arc::new(RecordingBackend::new());
    let logs = AttendanceLogs::new(Arc::clone(&backend) as _);

    let filters = LogFilters {
        from: NaiveDate::from_ymd_opt(2024, 3, 10),
        to: NaiveDate::from_ymd_opt(2024, 3, 1),
        ..Default::default()
    };
    assert!(matches!(logs.list(&filters).await, Err(LogsError::InvalidFilters(_))));
    assert_eq!(backend.log_queries(), 0);
}

#[tokio::test]
async fn test_logs_list_recorded_marks() {
    let backend = Arc::new(RecordingBackend::new());
    let submitter = AttendanceSubmitter::new(Arc::clone(&backend) as _, EventBus::new(10));
    let parser = PayloadParser::default();
    for code in ["S-7", "T-4", "S-9"] {
        let intent = parser.parse(code, SubjectType::Student).unwrap();
        submitter.submit(&intent, Some(&north())).await.unwrap();
    }

    let logs = AttendanceLogs::new(Arc::clone(&backend) as _);
    let students = logs
        .list(&LogFilters {
            subject_type: Some(SubjectType::Student),
            ..Default::default()
        })
        .await
        .unwrap();

    let ids: Vec<i64> = students.iter().map(|l| l.person_id).collect();
    assert_eq!(ids, vec![7, 9]);
    assert_eq!(backend.log_queries(), 1);
}
