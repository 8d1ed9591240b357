//! Role vocabulary for the labeled and short payload grammars

use attend_common::config::VocabularyConfig;
use attend_common::SubjectType;

/// Closed set of role tokens recognised by the parser, loaded from config
///
/// Tokens are matched case-insensitively. The first token of each list is
/// the canonical spelling used when rendering payload text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleVocabulary {
    student: Vec<String>,
    staff: Vec<String>,
    short_student: Vec<String>,
    short_staff: Vec<String>,
}

fn clean(tokens: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tokens.len());
    for token in tokens {
        let token = token.trim();
        if token.is_empty() || out.iter().any(|t| same_token(t, token)) {
            continue;
        }
        out.push(token.to_string());
    }
    out
}

// Unicode folding, matching the `(?i)` grammar regexes
fn same_token(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

fn find(tokens: &[String], candidate: &str) -> bool {
    tokens.iter().any(|t| same_token(t, candidate))
}

impl RoleVocabulary {
    pub fn from_config(config: &VocabularyConfig) -> Self {
        Self {
            student: clean(&config.student),
            staff: clean(&config.staff),
            short_student: clean(&config.short_student),
            short_staff: clean(&config.short_staff),
        }
    }

    /// Resolve a full role token (`student`, `teacher`, ...)
    ///
    /// Student tokens take precedence when a token appears in both lists.
    pub fn resolve_role(&self, token: &str) -> Option<SubjectType> {
        let token = token.trim();
        if find(&self.student, token) {
            Some(SubjectType::Student)
        } else if find(&self.staff, token) {
            Some(SubjectType::Staff)
        } else {
            None
        }
    }

    /// Resolve a role named on the command line
    ///
    /// Configured role tokens first, then the fixed `student` / `staff`
    /// spellings so the defaults keep working with any vocabulary.
    pub fn resolve_subject(&self, token: &str) -> Option<SubjectType> {
        self.resolve_role(token)
            .or_else(|| SubjectType::from_role_token(token))
    }

    /// Resolve a single-letter role code (`S`, `T`, ...)
    pub fn resolve_short(&self, code: &str) -> Option<SubjectType> {
        let code = code.trim();
        if find(&self.short_student, code) {
            Some(SubjectType::Student)
        } else if find(&self.short_staff, code) {
            Some(SubjectType::Staff)
        } else {
            None
        }
    }

    /// Normalize any role token, preserving `fallback` when unrecognised
    pub fn normalize(&self, token: &str, fallback: SubjectType) -> SubjectType {
        self.resolve_role(token)
            .or_else(|| self.resolve_short(token))
            .unwrap_or(fallback)
    }

    pub fn canonical_role(&self, subject: SubjectType) -> &str {
        let tokens = match subject {
            SubjectType::Student => &self.student,
            SubjectType::Staff => &self.staff,
        };
        tokens.first().map(String::as_str).unwrap_or(subject.as_str())
    }

    pub fn canonical_short(&self, subject: SubjectType) -> &str {
        let tokens = match subject {
            SubjectType::Student => &self.short_student,
            SubjectType::Staff => &self.short_staff,
        };
        tokens.first().map(String::as_str).unwrap_or(match subject {
            SubjectType::Student => "S",
            SubjectType::Staff => "T",
        })
    }

    /// Regex alternation over all full role tokens, longest first
    pub(crate) fn role_alternation(&self) -> String {
        alternation(self.student.iter().chain(self.staff.iter()))
    }

    /// Regex alternation over all short role codes, longest first
    pub(crate) fn short_alternation(&self) -> String {
        alternation(self.short_student.iter().chain(self.short_staff.iter()))
    }
}

fn alternation<'a>(tokens: impl Iterator<Item = &'a String>) -> String {
    let mut tokens: Vec<&String> = tokens.collect();
    // Longest first so "staff" is not shadowed by a shorter prefix token
    tokens.sort_by(|a, b| b.len().cmp(&a.len()));
    tokens
        .into_iter()
        .map(|t| regex::escape(t))
        .collect::<Vec<_>>()
        .join("|")
}

impl Default for RoleVocabulary {
    fn default() -> Self {
        Self::from_config(&VocabularyConfig::default())
    }
}
