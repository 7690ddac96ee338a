//! Persistent record store
//!
//! The single source of truth for per-question state: immutable
//! knowledge records, mutable learning records, teaching records (one
//! per guided-success question), and the append-only error log. Backed
//! by one long-lived SQLite connection created at process start.

pub mod sqlite;

pub use sqlite::SqliteRecordStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::types::{LearningState, Strategy, Table};

/// Typed store failure. `NotFound` lets callers route a missing
/// reference to the skip/report path instead of treating it as an I/O
/// failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("storage error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("invalid stored data: {0}")]
    Corrupt(String),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Immutable reference data for one previously-seen question
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeRecord {
    pub table_id: String,
    pub question: String,
    /// Canonical answer in `<Answer>['...']</Answer>`-comparable form
    pub answer: String,
    pub table: Table,
    pub sql_skeleton: String,
    pub question_skeleton: String,
    /// Embedding of the question skeleton; empty when never computed
    pub skeleton_embedding: Vec<f32>,
    /// Canonical type-label signature, e.g. `[string, int]`
    pub structure_signature: String,
    /// Precomputed chain-of-thought breakdown
    pub cot: String,
    /// Precomputed column-priority ordering
    pub column_sorting: String,
    /// Precomputed schema-linking map
    pub schema_linking: String,
}

impl KnowledgeRecord {
    /// The stored reasoning artifact for a strategy
    pub fn strategy_artifact(&self, strategy: Strategy) -> &str {
        match strategy {
            Strategy::Cot => &self.cot,
            Strategy::ColumnSorting => &self.column_sorting,
            Strategy::SchemaLinking => &self.schema_linking,
        }
    }
}

/// Mutable per-question learning state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningRecord {
    pub table_id: String,
    /// 0 unaided-correct, 1 guided-correct, 2 persistently incorrect,
    /// 3 unresolved
    pub flag: u8,
    /// Learning reflection (flag 1) or error reflection (flag 2)
    pub rethink_summary: Option<String>,
    /// Consecutive guidance failures while at flag 1
    pub guidance_error_count: u32,
    pub first_answer_time: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl LearningRecord {
    /// Derive the state variant, joining with the teaching record for
    /// the guided-success strategy
    pub fn state(&self, teaching: Option<&TeachingRecord>) -> LearningState {
        match self.flag {
            0 => LearningState::Correct,
            1 => LearningState::GuidedSuccess {
                strategy: teaching.map(|t| t.strategy),
                reflection: self.rethink_summary.clone().unwrap_or_default(),
            },
            2 => LearningState::GuidedFailure {
                reflection: self.rethink_summary.clone().unwrap_or_default(),
            },
            _ => LearningState::Unresolved,
        }
    }
}

/// Which strategy last succeeded for a question; exists only while the
/// learning record is at flag 1
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeachingRecord {
    pub table_id: String,
    pub strategy: Strategy,
    pub session_id: String,
    pub created_at: DateTime<Utc>,
}

/// One entry in the append-only error log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub id: i64,
    pub question: String,
    /// Markdown snapshot of the table at record time
    pub table_text: String,
    pub model_answer: String,
    pub true_answer: String,
    pub error_reflection: String,
    pub created_at: DateTime<Utc>,
}

/// An error record before insertion
#[derive(Debug, Clone)]
pub struct NewErrorRecord {
    pub question: String,
    pub table_text: String,
    pub model_answer: String,
    pub true_answer: String,
    pub error_reflection: String,
}

/// Per-collection counts for the stats command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStatistics {
    pub knowledge_count: u64,
    pub learning_by_flag: BTreeMap<u8, u64>,
    pub teaching_by_strategy: BTreeMap<String, u64>,
    pub error_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn learning(flag: u8, rethink: Option<&str>) -> LearningRecord {
        LearningRecord {
            table_id: "t1".to_string(),
            flag,
            rethink_summary: rethink.map(String::from),
            guidance_error_count: 0,
            first_answer_time: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_state_derivation() {
        assert_eq!(learning(0, None).state(None), LearningState::Correct);
        assert_eq!(learning(3, None).state(None), LearningState::Unresolved);
        assert_eq!(
            learning(2, Some("err")).state(None),
            LearningState::GuidedFailure {
                reflection: "err".to_string()
            }
        );

        let teaching = TeachingRecord {
            table_id: "t1".to_string(),
            strategy: Strategy::SchemaLinking,
            session_id: "s".to_string(),
            created_at: Utc::now(),
        };
        assert_eq!(
            learning(1, Some("learned")).state(Some(&teaching)),
            LearningState::GuidedSuccess {
                strategy: Some(Strategy::SchemaLinking),
                reflection: "learned".to_string()
            }
        );
        // teaching record missing: strategy unknown
        assert_eq!(
            learning(1, Some("learned")).state(None),
            LearningState::GuidedSuccess {
                strategy: None,
                reflection: "learned".to_string()
            }
        );
    }

    #[test]
    fn test_strategy_artifact() {
        let record = KnowledgeRecord {
            table_id: "t1".to_string(),
            question: "q".to_string(),
            answer: "a".to_string(),
            table: Table::new(vec![], vec![]),
            sql_skeleton: String::new(),
            question_skeleton: String::new(),
            skeleton_embedding: vec![],
            structure_signature: String::new(),
            cot: "cot text".to_string(),
            column_sorting: "cs text".to_string(),
            schema_linking: "sl text".to_string(),
        };
        assert_eq!(record.strategy_artifact(Strategy::Cot), "cot text");
        assert_eq!(record.strategy_artifact(Strategy::ColumnSorting), "cs text");
        assert_eq!(record.strategy_artifact(Strategy::SchemaLinking), "sl text");
    }
}
