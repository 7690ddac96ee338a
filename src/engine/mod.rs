//! The answering pipeline.
//!
//! One question flows fingerprint → similarity funnel → first pass →
//! guidance (when confidence falls short) → final composition. Every
//! stage leaves its trace on the returned [`AnswerOutcome`]; a failure
//! anywhere collapses the run into an error envelope instead of
//! surfacing an `Err` to the caller.

pub mod grading;

mod composer;
mod first_pass;
mod guidance;
mod prompts;

pub use composer::{AnswerComposer, ComposedAnswer};
pub use first_pass::{FirstPassEngine, FirstPassReport};
pub use guidance::GuidanceEngine;

use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::cache::{self, SessionCache};
use crate::config::Config;
use crate::fingerprint::FingerprintExtractor;
use crate::funnel::SimilarityFunnel;
use crate::llm::ChatClient;
use crate::store::{KnowledgeRecord, SqliteRecordStore};
use crate::types::{AnswerOutcome, FlowPath, Table};

/// One question to answer. An expected answer switches on training
/// mode: the final answer is graded and misses feed the error log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRequest {
    pub question: String,
    pub table: Table,
    #[serde(default)]
    pub expected_answer: Option<String>,
}

/// One knowledge record to ingest; fingerprints are derived on the way in
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestEntry {
    pub table_id: String,
    pub question: String,
    pub answer: String,
    pub table: Table,
    #[serde(default)]
    pub cot: String,
    #[serde(default)]
    pub column_sorting: String,
    #[serde(default)]
    pub schema_linking: String,
}

/// Batch run summary
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub outcomes: Vec<AnswerOutcome>,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

pub struct Engine {
    config: Config,
    store: Arc<SqliteRecordStore>,
    fingerprints: FingerprintExtractor,
    funnel: SimilarityFunnel,
    first_pass: FirstPassEngine,
    guidance: GuidanceEngine,
    composer: AnswerComposer,
    cache: SessionCache,
}

impl Engine {
    /// Open the configured record store and build the pipeline
    pub async fn new(config: Config) -> Result<Self> {
        let db_path = config.storage.resolve_db_path()?;
        let store = Arc::new(SqliteRecordStore::new(&db_path).await?);
        Self::with_store(config, store)
    }

    /// Build the pipeline over an already-open store
    pub fn with_store(config: Config, store: Arc<SqliteRecordStore>) -> Result<Self> {
        let chat = ChatClient::from_config(&config)?;
        let fingerprints = FingerprintExtractor::from_config(&config)?;
        let funnel = SimilarityFunnel::new(Arc::clone(&store), &config.pipeline);
        let first_pass = FirstPassEngine::new(
            Arc::clone(&store),
            chat.clone(),
            config.pipeline.confidence_threshold,
        );
        let guidance = GuidanceEngine::new(Arc::clone(&store), chat.clone());
        let composer = AnswerComposer::new(Arc::clone(&store), chat);
        let cache = SessionCache::new(&config.cache);

        Ok(Self {
            config,
            store,
            fingerprints,
            funnel,
            first_pass,
            guidance,
            composer,
            cache,
        })
    }

    /// Answer one question. Pipeline failures are folded into an error
    /// envelope, so this never returns `Err`.
    pub async fn answer(&self, request: AnswerRequest) -> AnswerOutcome {
        match self.answer_inner(&request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("answer pipeline failed: {:#}", e);
                AnswerOutcome::error_envelope(&request.question, &request.table, format!("{:#}", e))
            }
        }
    }

    async fn answer_inner(&self, request: &AnswerRequest) -> Result<AnswerOutcome> {
        let key = cache::session_key(&request.question, &request.table);
        if let Some(cached) = self.cache.get(&key).await {
            debug!("session cache hit");
            return Ok(cached);
        }

        let fingerprint = self
            .fingerprints
            .extract(&request.question, &request.table)
            .await;

        let ranked = self.funnel.rank(&fingerprint).await;
        let scored: Vec<(String, f64)> = ranked
            .iter()
            .map(|c| (c.record.table_id.clone(), c.total()))
            .collect();
        let candidate_ids: Vec<String> = scored.iter().map(|(id, _)| id.clone()).collect();

        let report = self.first_pass.run(&scored).await?;

        let (guidance, flow_path) = if report.needs_guidance {
            let trace = self
                .guidance
                .run(&report.worklist, report.confidence, report.total_count)
                .await?;
            (Some(trace), FlowPath::Guidance)
        } else {
            (None, FlowPath::Direct)
        };

        let composed = self
            .composer
            .compose(
                &request.question,
                &request.table,
                &candidate_ids,
                request.expected_answer.as_deref(),
            )
            .await?;

        let outcome = AnswerOutcome {
            session_key: key.clone(),
            answer: composed.answer,
            context_used: composed.context_used,
            confidence: report.confidence,
            final_confidence: guidance
                .as_ref()
                .map(|g| g.confidence_after)
                .unwrap_or(report.confidence),
            flow_path,
            candidates: report.candidates,
            not_found: report.not_found,
            guidance,
            question: request.question.clone(),
            table: request.table.clone(),
            expected_answer: request.expected_answer.clone(),
            sql_skeleton: fingerprint.sql_skeleton,
            question_skeleton: fingerprint.question_skeleton,
            graded_correct: composed.graded_correct,
            error: None,
            created_at: Utc::now(),
        };
        self.cache.insert(key, outcome.clone()).await;
        Ok(outcome)
    }

    /// Answer a batch sequentially with per-item error envelopes.
    /// Oversized batches are rejected outright.
    pub async fn answer_batch(&self, requests: Vec<AnswerRequest>) -> Result<BatchReport> {
        let limit = self.config.pipeline.batch_limit;
        if requests.len() > limit {
            bail!(
                "batch of {} questions exceeds the limit of {}",
                requests.len(),
                limit
            );
        }

        let total = requests.len();
        let mut outcomes = Vec::with_capacity(total);
        for request in requests {
            outcomes.push(self.answer(request).await);
        }
        let failed = outcomes
            .iter()
            .filter(|o| o.flow_path == FlowPath::Error)
            .count();

        Ok(BatchReport {
            total,
            succeeded: total - failed,
            failed,
            outcomes,
        })
    }

    /// Ingest knowledge records, deriving each entry's fingerprints
    pub async fn ingest(&self, entries: Vec<IngestEntry>) -> Result<usize> {
        let mut stored = 0usize;
        for entry in entries {
            let fingerprint = self
                .fingerprints
                .extract(&entry.question, &entry.table)
                .await;
            let record = KnowledgeRecord {
                table_id: entry.table_id,
                question: entry.question,
                answer: entry.answer,
                table: entry.table,
                sql_skeleton: fingerprint.sql_skeleton,
                question_skeleton: fingerprint.question_skeleton,
                skeleton_embedding: fingerprint.skeleton_embedding,
                structure_signature: fingerprint.structure_signature,
                cot: entry.cot,
                column_sorting: entry.column_sorting,
                schema_linking: entry.schema_linking,
            };
            self.store.put_knowledge(&record).await?;
            info!("ingested knowledge record {}", record.table_id);
            stored += 1;
        }
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn offline_config(dir: &tempfile::TempDir) -> Config {
        let mut config = Config::default();
        config.llm.base_url = "http://127.0.0.1:1".to_string();
        config.llm.api_key = Some("test".to_string());
        config.storage.db_path = dir
            .path()
            .join("engine.db")
            .to_string_lossy()
            .to_string();
        config
    }

    fn request(question: &str) -> AnswerRequest {
        AnswerRequest {
            question: question.to_string(),
            table: Table::new(
                vec!["Team".to_string(), "Wins".to_string()],
                vec![vec!["Rangers".to_string(), "12".to_string()]],
            ),
            expected_answer: None,
        }
    }

    #[tokio::test]
    async fn test_batch_over_limit_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::new(offline_config(&dir)).await.unwrap();

        let requests: Vec<AnswerRequest> =
            (0..11).map(|i| request(&format!("question {}", i))).collect();
        let err = engine.answer_batch(requests).await.unwrap_err();
        assert!(err.to_string().contains("exceeds the limit"));
    }

    #[tokio::test]
    async fn test_unreachable_provider_yields_error_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::new(offline_config(&dir)).await.unwrap();

        let outcome = engine.answer(request("how many wins do the rangers have")).await;
        assert_eq!(outcome.flow_path, FlowPath::Error);
        assert_eq!(
            outcome.answer,
            "An error occurred while processing the question."
        );
        assert_eq!(outcome.context_used, "error");
        assert_eq!(outcome.confidence, 0.0);
        assert!(outcome.error.is_some());
        // failed runs are not cached
        let again = engine.answer(request("how many wins do the rangers have")).await;
        assert_eq!(again.flow_path, FlowPath::Error);
    }
}
