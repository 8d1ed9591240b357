//! Manual attendance entry
//!
//! Builds an intent from typed form fields instead of a camera detection.
//! Explicitly typed values override whatever the code text carries.

use attend_common::{AttendanceIntent, SubjectType};

use crate::parser::{extract_person_id_text, normalize_name, PayloadFormat, PayloadParser};

/// Raw form fields as typed by the operator
#[derive(Debug, Clone, Default)]
pub struct ManualEntry {
    pub subject_type: Option<SubjectType>,
    pub person_id: String,
    pub person_name: String,
    pub code: String,
}

impl ManualEntry {
    /// Resolve the form into an intent
    ///
    /// A blank code with a typed person id gets a canonical labeled code so
    /// the mark stays auditable. A blank id and blank code leave both empty
    /// for the submitter to reject.
    pub fn to_intent(&self, parser: &PayloadParser, default_subject: SubjectType) -> AttendanceIntent {
        let fallback = self.subject_type.unwrap_or(default_subject);
        let parsed = parser.parse(&self.code, fallback);

        let subject_type = parsed.as_ref().map(|i| i.subject_type).unwrap_or(fallback);
        let person_id = extract_person_id_text(&self.person_id)
            .or_else(|| parsed.as_ref().and_then(|i| i.person_id));
        let person_name = normalize_name(&self.person_name)
            .or_else(|| parsed.as_ref().and_then(|i| i.person_name.clone()));

        let raw_code = match (&parsed, person_id) {
            (Some(intent), _) => intent.raw_code.clone(),
            (None, Some(id)) => parser.render(subject_type, id, None, PayloadFormat::Labeled),
            (None, None) => String::new(),
        };

        AttendanceIntent {
            subject_type,
            person_id,
            person_name,
            raw_code,
        }
    }
}
