//! Payload parser
//!
//! Turns raw scanned or typed text into an [`AttendanceIntent`]. Grammars are
//! tried in order and the first match wins:
//!
//! 1. Structured: a JSON object (`{"type":"teacher","id":42,"name":"A. Khan"}`)
//! 2. Labeled: `student:7 | name: A. Khan`
//! 3. Short: `S-7 | A. Khan`
//! 4. Opaque fallback: anything else becomes an intent with the caller's
//!    fallback subject type and no person id
//!
//! Only empty or whitespace-only input yields no intent.

mod rules;
mod vocabulary;

pub use rules::{extract_person_id, extract_person_id_text, normalize_name};
pub use vocabulary::RoleVocabulary;

use attend_common::{AttendanceIntent, SubjectType};
use serde_json::json;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use rules::ParseRule;

/// Text grammar a payload is rendered in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFormat {
    Structured,
    Labeled,
    Short,
}

impl FromStr for PayloadFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" | "structured" => Ok(PayloadFormat::Structured),
            "labeled" | "long" => Ok(PayloadFormat::Labeled),
            "short" => Ok(PayloadFormat::Short),
            other => Err(format!("unknown payload format: {}", other)),
        }
    }
}

impl fmt::Display for PayloadFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadFormat::Structured => write!(f, "json"),
            PayloadFormat::Labeled => write!(f, "labeled"),
            PayloadFormat::Short => write!(f, "short"),
        }
    }
}

/// Tolerant multi-grammar payload parser
#[derive(Debug, Clone)]
pub struct PayloadParser {
    vocabulary: RoleVocabulary,
    rules: Vec<ParseRule>,
}

impl PayloadParser {
    pub fn new(vocabulary: RoleVocabulary) -> Result<Self, regex::Error> {
        let rules = ParseRule::ordered(&vocabulary)?;
        Ok(Self { vocabulary, rules })
    }

    pub fn vocabulary(&self) -> &RoleVocabulary {
        &self.vocabulary
    }

    /// Parse raw text into an intent
    ///
    /// Returns `None` only for empty or whitespace-only input. Everything
    /// else yields an intent, at worst the opaque fallback with no person id.
    pub fn parse(&self, raw: &str, fallback: SubjectType) -> Option<AttendanceIntent> {
        let input = raw.trim();
        if input.is_empty() {
            return None;
        }

        for rule in &self.rules {
            if let Some(intent) = rule.apply(input, &self.vocabulary, fallback) {
                debug!(rule = rule.name(), person_id = ?intent.person_id, "Payload matched");
                return Some(intent);
            }
        }

        debug!("Payload matched no grammar, using opaque fallback");
        Some(AttendanceIntent {
            subject_type: fallback,
            person_id: None,
            person_name: None,
            raw_code: input.to_string(),
        })
    }

    /// Render a person's code text in the given grammar
    ///
    /// The output is canonical: parsing it back yields the same subject, id,
    /// name and raw code.
    pub fn render(
        &self,
        subject: SubjectType,
        person_id: i64,
        person_name: Option<&str>,
        format: PayloadFormat,
    ) -> String {
        let name = person_name.and_then(normalize_name);
        match format {
            PayloadFormat::Structured => {
                let mut value = json!({
                    "type": self.vocabulary.canonical_role(subject),
                    "id": person_id,
                });
                if let Some(name) = name {
                    value["name"] = json!(name);
                }
                value.to_string()
            }
            PayloadFormat::Labeled => {
                let role = self.vocabulary.canonical_role(subject);
                match name {
                    Some(name) => format!("{}:{} | name: {}", role, person_id, name),
                    None => format!("{}:{}", role, person_id),
                }
            }
            PayloadFormat::Short => {
                let code = self.vocabulary.canonical_short(subject);
                match name {
                    Some(name) => format!("{}-{} | {}", code, person_id, name),
                    None => format!("{}-{}", code, person_id),
                }
            }
        }
    }
}

impl Default for PayloadParser {
    fn default() -> Self {
        Self::new(RoleVocabulary::default()).expect("default vocabulary compiles")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attend_common::config::VocabularyConfig;

    fn parser() -> PayloadParser {
        PayloadParser::default()
    }

    #[test]
    fn test_blank_input_yields_no_intent() {
        let p = parser();
        assert_eq!(p.parse("", SubjectType::Student), None);
        assert_eq!(p.parse("   ", SubjectType::Student), None);
        assert_eq!(p.parse("\t\n", SubjectType::Staff), None);
    }

    #[test]
    fn test_structured_teacher_payload() {
        let raw = r#"{"type":"teacher","id":42,"name":"A. Khan"}"#;
        let intent = parser().parse(raw, SubjectType::Student).unwrap();
        assert_eq!(intent.subject_type, SubjectType::Staff);
        assert_eq!(intent.person_id, Some(42));
        assert_eq!(intent.person_name.as_deref(), Some("A. Khan"));
        assert_eq!(intent.raw_code, raw);
    }

    #[test]
    fn test_structured_alternate_keys() {
        let raw = r#"{"subjectType":"employee","personId":"EMP-0007","fullName":"  "}"#;
        let intent = parser().parse(raw, SubjectType::Student).unwrap();
        assert_eq!(intent.subject_type, SubjectType::Staff);
        assert_eq!(intent.person_id, Some(7));
        assert_eq!(intent.person_name, None);
    }

    #[test]
    fn test_structured_unknown_role_keeps_fallback() {
        let raw = r#"{"role":"visitor","id":3}"#;
        let intent = parser().parse(raw, SubjectType::Staff).unwrap();
        assert_eq!(intent.subject_type, SubjectType::Staff);
        assert_eq!(intent.person_id, Some(3));
    }

    #[test]
    fn test_malformed_json_falls_through() {
        let raw = r#"{"type":"teacher","id":42"#;
        let intent = parser().parse(raw, SubjectType::Student).unwrap();
        assert_eq!(intent.subject_type, SubjectType::Student);
        assert_eq!(intent.person_id, None);
        assert_eq!(intent.raw_code, raw);
    }

    #[test]
    fn test_labeled_form() {
        let intent = parser()
            .parse("Teacher-15 | name: Maria Lopez", SubjectType::Student)
            .unwrap();
        assert_eq!(intent.subject_type, SubjectType::Staff);
        assert_eq!(intent.person_id, Some(15));
        assert_eq!(intent.person_name.as_deref(), Some("Maria Lopez"));

        let intent = parser().parse("STUDENT : 0099", SubjectType::Staff).unwrap();
        assert_eq!(intent.subject_type, SubjectType::Student);
        assert_eq!(intent.person_id, Some(99));
        assert_eq!(intent.person_name, None);
    }

    #[test]
    fn test_short_form() {
        let intent = parser().parse("S-7", SubjectType::Student).unwrap();
        assert_eq!(
            intent,
            AttendanceIntent {
                subject_type: SubjectType::Student,
                person_id: Some(7),
                person_name: None,
                raw_code: "S-7".to_string(),
            }
        );

        let intent = parser().parse("t:12 | R. Das", SubjectType::Student).unwrap();
        assert_eq!(intent.subject_type, SubjectType::Staff);
        assert_eq!(intent.person_id, Some(12));
        assert_eq!(intent.person_name.as_deref(), Some("R. Das"));
    }

    #[test]
    fn test_surrounding_whitespace_is_ignored() {
        let p = parser();
        assert_eq!(
            p.parse(" S-7 ", SubjectType::Student),
            p.parse("S-7", SubjectType::Student)
        );
    }

    #[test]
    fn test_opaque_fallback_never_rejects() {
        let p = parser();
        for raw in [
            "hello world",
            "X-12",
            "student-",
            "S-",
            "{",
            "[]",
            "https://school.example/attend?token=abc",
            "student:99999999999999999999999",
        ] {
            let intent = p.parse(raw, SubjectType::Staff).unwrap();
            assert_eq!(intent.subject_type, SubjectType::Staff, "input {:?}", raw);
            assert_eq!(intent.person_id, None, "input {:?}", raw);
            assert_eq!(intent.person_name, None, "input {:?}", raw);
            assert_eq!(intent.raw_code, raw.trim(), "input {:?}", raw);
        }
    }

    #[test]
    fn test_labeled_and_short_round_trip() {
        let p = parser();
        for raw in [
            "student:7",
            "student:7 | name: A. Khan",
            "teacher:42 | name: Maria Lopez",
            "S-7",
            "T-42 | R. Das",
        ] {
            let first = p.parse(raw, SubjectType::Student).unwrap();
            let format = if raw.contains(':') {
                PayloadFormat::Labeled
            } else {
                PayloadFormat::Short
            };
            let rendered = p.render(
                first.subject_type,
                first.person_id.unwrap(),
                first.person_name.as_deref(),
                format,
            );
            let second = p.parse(&rendered, SubjectType::Student).unwrap();
            assert_eq!(first, second, "round trip of {:?}", raw);
        }
    }

    #[test]
    fn test_render_structured_parses_back() {
        let p = parser();
        let rendered = p.render(SubjectType::Staff, 42, Some("A. Khan"), PayloadFormat::Structured);
        let intent = p.parse(&rendered, SubjectType::Student).unwrap();
        assert_eq!(intent.subject_type, SubjectType::Staff);
        assert_eq!(intent.person_id, Some(42));
        assert_eq!(intent.person_name.as_deref(), Some("A. Khan"));
    }

    #[test]
    fn test_custom_vocabulary() {
        let vocab = RoleVocabulary::from_config(&VocabularyConfig {
            student: vec!["pupil".to_string()],
            staff: vec!["faculty".to_string()],
            short_student: vec!["P".to_string()],
            short_staff: vec!["F".to_string()],
        });
        let p = PayloadParser::new(vocab).unwrap();

        let intent = p.parse("faculty:3", SubjectType::Student).unwrap();
        assert_eq!(intent.subject_type, SubjectType::Staff);
        assert_eq!(intent.person_id, Some(3));

        let intent = p.parse("P-8", SubjectType::Staff).unwrap();
        assert_eq!(intent.subject_type, SubjectType::Student);

        // Built-in tokens are no longer part of the grammar
        let intent = p.parse("S-7", SubjectType::Staff).unwrap();
        assert_eq!(intent.person_id, None);
    }

    #[test]
    fn test_non_ascii_role_in_other_case() {
        let vocab = RoleVocabulary::from_config(&VocabularyConfig {
            student: vec!["élève".to_string()],
            staff: vec!["enseignant".to_string()],
            short_student: vec!["E".to_string()],
            short_staff: vec!["N".to_string()],
        });
        let p = PayloadParser::new(vocab).unwrap();

        let intent = p.parse("ÉLÈVE: 12 | Chloé", SubjectType::Staff).unwrap();
        assert_eq!(intent.subject_type, SubjectType::Student);
        assert_eq!(intent.person_id, Some(12));
        assert_eq!(intent.person_name.as_deref(), Some("Chloé"));
    }

    #[test]
    fn test_payload_format_from_str() {
        assert_eq!("json".parse::<PayloadFormat>(), Ok(PayloadFormat::Structured));
        assert_eq!("Labeled".parse::<PayloadFormat>(), Ok(PayloadFormat::Labeled));
        assert_eq!("short".parse::<PayloadFormat>(), Ok(PayloadFormat::Short));
        assert!("qr".parse::<PayloadFormat>().is_err());
    }
}
