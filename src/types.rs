//! Shared types used across modules
//!
//! This module contains types that are used by multiple modules
//! to avoid circular dependencies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An ad-hoc table: ordered column headers plus row values
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    /// Render as pipe-separated markdown, the canonical table text used
    /// in prompts and cache keys
    pub fn render_markdown(&self) -> String {
        let mut lines = Vec::with_capacity(self.rows.len() + 2);
        lines.push(self.headers.join(" | "));
        lines.push(vec!["---"; self.headers.len()].join(" | "));
        for row in &self.rows {
            lines.push(row.join(" | "));
        }
        lines.join("\n")
    }

    /// First data row, used when sampling values for type inference
    pub fn first_row(&self) -> Option<&[String]> {
        self.rows.first().map(|r| r.as_slice())
    }

    /// Values of the column at `index`, in row order
    pub fn column_values(&self, index: usize) -> Vec<&str> {
        self.rows
            .iter()
            .filter_map(|row| row.get(index).map(|v| v.as_str()))
            .collect()
    }
}

/// A reasoning strategy attached to knowledge records and tried during guidance
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Cot,
    ColumnSorting,
    SchemaLinking,
}

impl Strategy {
    /// Canonical wire string
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Cot => "cot",
            Strategy::ColumnSorting => "column_sorting",
            Strategy::SchemaLinking => "schema_linking",
        }
    }

    /// Parse a stored strategy name, tolerating historical spellings.
    /// Unknown values fall back to chain-of-thought.
    pub fn from_str_lossy(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "cot" | "chain_of_thought" => Strategy::Cot,
            "column_sorting" | "coloumn_sorting" => Strategy::ColumnSorting,
            "schema_linking" => Strategy::SchemaLinking,
            _ => Strategy::Cot,
        }
    }

    /// All strategies in fixed trial order
    pub fn all() -> [Strategy; 3] {
        [Strategy::Cot, Strategy::ColumnSorting, Strategy::SchemaLinking]
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Learning-record state for one prior question, derived from the
/// stored flag plus its teaching record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum LearningState {
    /// Never evaluated before
    NoRecord,
    /// Answered correctly unaided (flag 0)
    Correct,
    /// Answered correctly only with strategy guidance (flag 1). The
    /// strategy is `None` when the teaching record is missing.
    GuidedSuccess {
        strategy: Option<Strategy>,
        reflection: String,
    },
    /// Persistently incorrect despite guidance (flag 2)
    GuidedFailure { reflection: String },
    /// Unresolved or transient failure (flag 3)
    Unresolved,
}

impl LearningState {
    /// Stored flag value; `None` when no record exists
    pub fn flag(&self) -> Option<u8> {
        match self {
            LearningState::NoRecord => None,
            LearningState::Correct => Some(0),
            LearningState::GuidedSuccess { .. } => Some(1),
            LearningState::GuidedFailure { .. } => Some(2),
            LearningState::Unresolved => Some(3),
        }
    }
}

/// How the answer was produced
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum FlowPath {
    /// Confidence met the threshold; no guidance ran
    Direct,
    /// A guidance round ran before composing the answer
    Guidance,
    /// The pipeline failed; the outcome is an error envelope
    Error,
}

impl FlowPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowPath::Direct => "direct",
            FlowPath::Guidance => "guidance",
            FlowPath::Error => "error",
        }
    }
}

impl std::fmt::Display for FlowPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-candidate trace from the first pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateTrace {
    pub table_id: String,
    /// Composite funnel score (structural + semantic)
    pub score: f64,
    /// Flag before the first pass; `None` for fresh candidates
    pub flag_before: Option<u8>,
    /// Flag after the first pass
    pub flag_after: Option<u8>,
    /// Whether this candidate's first-pass answer graded correct
    pub correct: bool,
}

/// One strategy attempt inside a guidance trial
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyAttempt {
    pub strategy: Strategy,
    pub correct: bool,
}

/// Guidance history for one worklist candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuidanceTrial {
    pub table_id: String,
    pub recommended: Strategy,
    pub attempts: Vec<StrategyAttempt>,
    /// Why the learning record changed (or did not)
    pub update_reason: String,
    /// Flag after the trial; `None` when the record was never created
    pub flag_after: Option<u8>,
}

/// Guidance round summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuidanceTrace {
    pub session_id: String,
    pub trials: Vec<GuidanceTrial>,
    pub confidence_after: f64,
}

/// The full structured result of one answering pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerOutcome {
    /// Content-hash key under which this outcome is cached
    pub session_key: String,
    pub answer: String,
    /// Which composer contexts were present
    pub context_used: String,
    /// First-pass confidence
    pub confidence: f64,
    /// Confidence after guidance (equal to `confidence` on the direct path)
    pub final_confidence: f64,
    pub flow_path: FlowPath,
    pub candidates: Vec<CandidateTrace>,
    /// Candidate ids whose knowledge record could not be resolved
    pub not_found: Vec<String>,
    pub guidance: Option<GuidanceTrace>,
    pub question: String,
    pub table: Table,
    pub expected_answer: Option<String>,
    pub sql_skeleton: String,
    pub question_skeleton: String,
    /// Training-mode grade of the final answer
    pub graded_correct: Option<bool>,
    /// Set when `flow_path` is `Error`
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AnswerOutcome {
    /// Error envelope for a failed pipeline run
    pub fn error_envelope(question: &str, table: &Table, detail: String) -> Self {
        Self {
            session_key: String::new(),
            answer: "An error occurred while processing the question.".to_string(),
            context_used: "error".to_string(),
            confidence: 0.0,
            final_confidence: 0.0,
            flow_path: FlowPath::Error,
            candidates: Vec::new(),
            not_found: Vec::new(),
            guidance: None,
            question: question.to_string(),
            table: table.clone(),
            expected_answer: None,
            sql_skeleton: String::new(),
            question_skeleton: String::new(),
            graded_correct: None,
            error: Some(detail),
            created_at: Utc::now(),
        }
    }
}
