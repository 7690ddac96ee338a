//! tabletutor - Adaptive Table Question Answering Library
//!
//! An experience-driven table QA engine with:
//! - Question fingerprinting (SQL skeleton, question skeleton, table structure)
//! - A three-stage similarity funnel over past questions
//! - Flag-dispatched first-pass answering against accumulated experience
//! - Confidence-gated guidance with strategy recommendation and escalation
//! - A final composer that folds learning and error context into the answer
//!
//! # Example
//!
//! ```ignore
//! use tabletutor::config::Config;
//! use tabletutor::engine::{AnswerRequest, Engine};
//! use tabletutor::types::Table;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let engine = Engine::new(Config::load()?).await?;
//!     let outcome = engine
//!         .answer(AnswerRequest {
//!             question: "which country won the most gold medals?".to_string(),
//!             table: Table::new(
//!                 vec!["country".into(), "gold".into()],
//!                 vec![vec!["norway".into(), "14".into()]],
//!             ),
//!             expected_answer: None,
//!         })
//!         .await;
//!     println!("{}", outcome.answer);
//!     Ok(())
//! }
//! ```

// Core modules (order matters for cross-module dependencies)
pub mod types;
pub mod config;
pub mod textsim;
pub mod llm;
pub mod embedding;
pub mod classify;
pub mod fingerprint;
pub mod store;
pub mod funnel;
pub mod engine;
pub mod cache;
pub mod graph;
pub mod cli;

// Re-export commonly used types for convenience
pub use config::Config;

pub use engine::{
    AnswerRequest,
    BatchReport,
    Engine,
    IngestEntry,
};

pub use store::{
    ErrorRecord,
    KnowledgeRecord,
    LearningRecord,
    SqliteRecordStore,
    TeachingRecord,
};

pub use fingerprint::QuestionFingerprint;

pub use types::{
    AnswerOutcome,
    FlowPath,
    Strategy,
    Table,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get the library info
pub fn info() -> String {
    format!("{} v{} - Adaptive Table QA Library", NAME, VERSION)
}
