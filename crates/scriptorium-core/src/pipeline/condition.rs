//! Step conditions, a tiny boolean language over pipeline state.
//!
//! Condition strings are parsed once, when a pipeline is loaded, into a
//! [`Condition`]. Keywords are case-insensitive; the search text keeps its
//! original spelling but is matched case-insensitively.
//!
//! | form | true when |
//! |---|---|
//! | `wordCount > 3000` (`>`, `>=`, `<`, `<=`, `==`) | previous text word count compares true |
//! | `hasPreviousOutput` | some earlier step produced non-empty output |
//! | `hasLorebookEntries` | the input has matched knowledge entries |
//! | `previousOutputContains:TEXT` | the latest output contains TEXT |
//! | `previousOutputNotContains:TEXT` | negation of the above |
//! | `roleOutputContains:ROLE:TEXT` | the latest output of ROLE contains TEXT |
//! | `anyJudgeFoundIssues` | any judge output contains an issue marker |
//! | `outputContainsAnyKeyword` | the latest output contains one of the step's validation keywords |
//!
//! Anything else parses to [`Condition::Unrecognized`] and evaluates to `true`
//! with a warning, unless the orchestrator runs with `strict_conditions`.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::{AgentRole, PipelineInput, StepResult};
use crate::pipeline::step::PipelineStep;
use crate::text::{contains_ignore_case, word_count};

/// Markers that count as "a judge found something".
pub const ISSUE_MARKERS: [&str; 5] = ["ISSUE", "INCONSISTEN", "ERROR", "PROBLEM", "CONFLICT"];

static WORD_COUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^wordcount\s*(>=|<=|==|>|<)\s*(\d+)$").expect("wordCount pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
}

impl Comparison {
    fn parse(op: &str) -> Option<Self> {
        match op {
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Ge),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Le),
            "==" => Some(Self::Eq),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Eq => "==",
        }
    }

    pub fn compare(&self, lhs: usize, rhs: usize) -> bool {
        match self {
            Self::Gt => lhs > rhs,
            Self::Ge => lhs >= rhs,
            Self::Lt => lhs < rhs,
            Self::Le => lhs <= rhs,
            Self::Eq => lhs == rhs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    WordCount { op: Comparison, threshold: usize },
    HasPreviousOutput,
    HasLorebookEntries,
    PreviousOutputContains(String),
    PreviousOutputNotContains(String),
    RoleOutputContains { role: AgentRole, text: String },
    AnyJudgeFoundIssues,
    OutputContainsAnyKeyword,
    /// Kept verbatim; evaluates to `true`.
    Unrecognized(String),
}

/// Case-insensitive prefix strip that returns the remainder in original case.
fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}

impl Condition {
    /// Parse a condition string. Blank strings mean "no condition".
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }

        if let Some(text) = strip_prefix_ignore_case(trimmed, "previousOutputContains:") {
            return Some(Self::PreviousOutputContains(text.trim().to_string()));
        }
        if let Some(text) = strip_prefix_ignore_case(trimmed, "previousOutputNotContains:") {
            return Some(Self::PreviousOutputNotContains(text.trim().to_string()));
        }
        if let Some(rest) = strip_prefix_ignore_case(trimmed, "roleOutputContains:") {
            return Some(match rest.split_once(':') {
                Some((role, text)) => match AgentRole::from_str(role) {
                    Some(role) => Self::RoleOutputContains {
                        role,
                        text: text.trim().to_string(),
                    },
                    None => Self::Unrecognized(trimmed.to_string()),
                },
                None => Self::Unrecognized(trimmed.to_string()),
            });
        }

        let normalized = trimmed.to_lowercase();
        let parsed = match normalized.as_str() {
            "haspreviousoutput" => Self::HasPreviousOutput,
            "haslorebookentries" => Self::HasLorebookEntries,
            "anyjudgefoundissues" => Self::AnyJudgeFoundIssues,
            "outputcontainsanykeyword" => Self::OutputContainsAnyKeyword,
            _ => WORD_COUNT_RE
                .captures(&normalized)
                .and_then(|caps| {
                    let op = Comparison::parse(&caps[1])?;
                    let threshold = caps[2].parse().ok()?;
                    Some(Self::WordCount { op, threshold })
                })
                .unwrap_or_else(|| Self::Unrecognized(trimmed.to_string())),
        };
        Some(parsed)
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unrecognized(_))
    }

    /// Decide whether `step` should run given the input and the results so far.
    pub fn evaluate(&self, input: &PipelineInput, history: &[StepResult], step: &PipelineStep) -> bool {
        let last_output = history.last().map(|r| r.output.as_str()).unwrap_or("");

        match self {
            Self::WordCount { op, threshold } => {
                op.compare(word_count(&input.previous_text), *threshold)
            }
            Self::HasPreviousOutput => history.iter().any(|r| !r.output.is_empty()),
            Self::HasLorebookEntries => !input.matched_entries.is_empty(),
            Self::PreviousOutputContains(text) => contains_ignore_case(last_output, text),
            Self::PreviousOutputNotContains(text) => !contains_ignore_case(last_output, text),
            Self::RoleOutputContains { role, text } => history
                .iter()
                .rev()
                .find(|r| r.role == *role)
                .is_some_and(|r| contains_ignore_case(&r.output, text)),
            Self::AnyJudgeFoundIssues => history.iter().any(|r| {
                r.role.is_judge()
                    && ISSUE_MARKERS
                        .iter()
                        .any(|marker| contains_ignore_case(&r.output, marker))
            }),
            Self::OutputContainsAnyKeyword => match step.validation_keywords.as_deref() {
                Some(keywords) if !keywords.is_empty() => keywords
                    .iter()
                    .any(|k| contains_ignore_case(last_output, k)),
                _ => {
                    tracing::warn!(
                        "[Condition] outputContainsAnyKeyword on '{}' has no validation keywords; treating as false",
                        step.agent.name
                    );
                    false
                }
            },
            Self::Unrecognized(raw) => {
                tracing::warn!("[Condition] Unrecognized condition '{}'; running the step", raw);
                true
            }
        }
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WordCount { op, threshold } => write!(f, "wordCount {} {}", op.as_str(), threshold),
            Self::HasPreviousOutput => f.write_str("hasPreviousOutput"),
            Self::HasLorebookEntries => f.write_str("hasLorebookEntries"),
            Self::PreviousOutputContains(t) => write!(f, "previousOutputContains:{}", t),
            Self::PreviousOutputNotContains(t) => write!(f, "previousOutputNotContains:{}", t),
            Self::RoleOutputContains { role, text } => {
                write!(f, "roleOutputContains:{}:{}", role, text)
            }
            Self::AnyJudgeFoundIssues => f.write_str("anyJudgeFoundIssues"),
            Self::OutputContainsAnyKeyword => f.write_str("outputContainsAnyKeyword"),
            Self::Unrecognized(raw) => f.write_str(raw),
        }
    }
}
