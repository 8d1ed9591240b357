//! Ordered parse rules for scanned payload text
//!
//! Each rule either recognises the whole input and returns an intent, or
//! returns `None` so the next rule gets a turn. No rule panics or errors on
//! malformed input.

use attend_common::{AttendanceIntent, SubjectType};
use regex::Regex;
use serde_json::{Map, Value};

use super::vocabulary::RoleVocabulary;

const TYPE_KEYS: [&str; 3] = ["subjectType", "type", "role"];
const ID_KEYS: [&str; 4] = ["personId", "id", "studentId", "teacherId"];
const NAME_KEYS: [&str; 3] = ["personName", "name", "fullName"];

/// One grammar of the tolerant payload format
#[derive(Debug, Clone)]
pub(crate) enum ParseRule {
    /// JSON object with subject/id/name keys
    Structured,
    /// `<role><sep><digits>` with optional `| name: <text>`
    Labeled(Regex),
    /// `<code><sep><digits>` with optional `| <text>`
    Short(Regex),
}

impl ParseRule {
    /// Build the rule list in match order
    pub(crate) fn ordered(vocabulary: &RoleVocabulary) -> Result<Vec<ParseRule>, regex::Error> {
        let labeled = Regex::new(&format!(
            r"(?i)^({})\s*[:-]\s*(\d+)\s*(?:\|\s*(?:name\s*:\s*)?(.*))?$",
            vocabulary.role_alternation()
        ))?;
        let short = Regex::new(&format!(
            r"(?i)^({})\s*[:-]\s*(\d+)\s*(?:\|\s*(.*))?$",
            vocabulary.short_alternation()
        ))?;

        Ok(vec![
            ParseRule::Structured,
            ParseRule::Labeled(labeled),
            ParseRule::Short(short),
        ])
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            ParseRule::Structured => "structured",
            ParseRule::Labeled(_) => "labeled",
            ParseRule::Short(_) => "short",
        }
    }

    /// Try this rule against already-trimmed, non-empty input
    pub(crate) fn apply(
        &self,
        input: &str,
        vocabulary: &RoleVocabulary,
        fallback: SubjectType,
    ) -> Option<AttendanceIntent> {
        match self {
            ParseRule::Structured => parse_structured(input, vocabulary, fallback),
            ParseRule::Labeled(re) => {
                let caps = re.captures(input)?;
                let subject = vocabulary.resolve_role(caps.get(1)?.as_str())?;
                let person_id = caps.get(2)?.as_str().parse::<i64>().ok()?;
                Some(AttendanceIntent {
                    subject_type: subject,
                    person_id: Some(person_id),
                    person_name: caps.get(3).and_then(|m| normalize_name(m.as_str())),
                    raw_code: input.to_string(),
                })
            }
            ParseRule::Short(re) => {
                let caps = re.captures(input)?;
                let subject = vocabulary.resolve_short(caps.get(1)?.as_str())?;
                let person_id = caps.get(2)?.as_str().parse::<i64>().ok()?;
                Some(AttendanceIntent {
                    subject_type: subject,
                    person_id: Some(person_id),
                    person_name: caps.get(3).and_then(|m| normalize_name(m.as_str())),
                    raw_code: input.to_string(),
                })
            }
        }
    }
}

fn parse_structured(
    input: &str,
    vocabulary: &RoleVocabulary,
    fallback: SubjectType,
) -> Option<AttendanceIntent> {
    // Cheap reject before handing arbitrary camera noise to the JSON parser
    if !input.starts_with('{') {
        return None;
    }
    let object: Map<String, Value> = match serde_json::from_str::<Value>(input) {
        Ok(Value::Object(map)) => map,
        _ => return None,
    };

    let mut person_id = None;
    let mut id_hint = None;
    for key in ID_KEYS {
        if let Some(id) = object.get(key).and_then(extract_person_id) {
            person_id = Some(id);
            id_hint = match key {
                "studentId" => Some(SubjectType::Student),
                "teacherId" => Some(SubjectType::Staff),
                _ => None,
            };
            break;
        }
    }

    let declared = TYPE_KEYS
        .iter()
        .filter_map(|key| object.get(*key).and_then(Value::as_str))
        .find_map(|token| {
            vocabulary
                .resolve_role(token)
                .or_else(|| vocabulary.resolve_short(token))
        });

    let person_name = NAME_KEYS
        .iter()
        .filter_map(|key| object.get(*key).and_then(Value::as_str))
        .find_map(normalize_name);

    Some(AttendanceIntent {
        subject_type: declared.or(id_hint).unwrap_or(fallback),
        person_id,
        person_name,
        raw_code: input.to_string(),
    })
}

/// Extract a person id from a JSON value given as number or string
pub fn extract_person_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => {
            if let Some(id) = n.as_i64() {
                (id >= 0).then_some(id)
            } else {
                let f = n.as_f64()?;
                (f.is_finite() && f.fract() == 0.0 && f >= 0.0 && f <= i64::MAX as f64)
                    .then_some(f as i64)
            }
        }
        Value::String(s) => extract_person_id_text(s),
        _ => None,
    }
}

/// Extract a person id from text
///
/// Accepts a bare integer (`"42"`) or the trailing digit run of a compound
/// identifier (`"STU-2024-0042"` gives 42). No digits means no id.
pub fn extract_person_id_text(text: &str) -> Option<i64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(id) = text.parse::<i64>() {
        return (id >= 0).then_some(id);
    }

    let digits_start = text
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)?;
    text[digits_start..].parse::<i64>().ok()
}

/// Trim a free-text name; blank becomes absent
pub fn normalize_name(name: &str) -> Option<String> {
    let name = name.trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}
