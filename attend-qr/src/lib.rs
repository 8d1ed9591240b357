//! QR attendance capture core
//!
//! Issues short-lived QR sessions, turns scanned or typed codes into
//! attendance intents, and records them with the attendance backend.

pub mod backend;
pub mod logs;
pub mod lookup;
pub mod manual;
pub mod parser;
pub mod scan;
pub mod session;
pub mod submitter;

pub use backend::{AttendanceBackend, BackendError, CampusContext, DirectoryBackend, HttpBackend, StaticCampus};
pub use logs::{AttendanceLogs, LogsError};
pub use lookup::{DirectoryLookup, LookupResult};
pub use manual::ManualEntry;
pub use parser::{PayloadFormat, PayloadParser, RoleVocabulary};
pub use scan::{ScanError, ScanLoop, ScanPipeline};
pub use session::{SessionError, SessionIssuer};
pub use submitter::{AttendanceSubmitter, MarkReceipt, SubmitError};
