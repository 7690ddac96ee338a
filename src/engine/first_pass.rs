//! First answering pass over the funnel's candidate batch.
//!
//! Each candidate is dispatched on its learning state: flag-0 records
//! count as correct without an LLM call, flag-1/flag-2 records are
//! re-answered with their stored reflection, and fresh candidates are
//! answered cold and get a new learning record. The resulting
//! confidence decides whether a guidance round runs.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, warn};

use super::{grading, prompts};
use crate::llm::{ChatClient, ChatMessage};
use crate::store::{LearningRecord, SqliteRecordStore};
use crate::types::{CandidateTrace, LearningState};

/// Outcome of the first pass over one candidate batch
#[derive(Debug, Clone)]
pub struct FirstPassReport {
    /// Correct count over total count; 0.0 for an empty batch
    pub confidence: f64,
    pub correct_count: usize,
    pub total_count: usize,
    /// True when confidence fell below the configured threshold
    pub needs_guidance: bool,
    /// Candidates graded incorrect in this pass, in batch order
    pub worklist: Vec<String>,
    /// Candidate ids whose knowledge record could not be resolved
    pub not_found: Vec<String>,
    pub candidates: Vec<CandidateTrace>,
}

pub struct FirstPassEngine {
    store: Arc<SqliteRecordStore>,
    chat: ChatClient,
    confidence_threshold: f64,
}

impl FirstPassEngine {
    pub fn new(store: Arc<SqliteRecordStore>, chat: ChatClient, confidence_threshold: f64) -> Self {
        Self {
            store,
            chat,
            confidence_threshold,
        }
    }

    /// Run the first pass over `(table_id, funnel_score)` pairs in rank
    /// order. Unresolvable knowledge records are skipped but stay in the
    /// confidence denominator; LLM failures abort the pass.
    pub async fn run(&self, ranked: &[(String, f64)]) -> Result<FirstPassReport> {
        let total_count = ranked.len();
        let mut correct_count = 0usize;
        let mut worklist = Vec::new();
        let mut not_found = Vec::new();
        let mut candidates = Vec::new();

        // split the batch by existing learning state
        let mut fresh = Vec::new();
        let mut revisit = Vec::new();
        for (table_id, score) in ranked {
            match self.store.get_learning(table_id).await? {
                Some(record) if record.state(None) == LearningState::Correct => {
                    correct_count += 1;
                    candidates.push(CandidateTrace {
                        table_id: table_id.clone(),
                        score: *score,
                        flag_before: Some(0),
                        flag_after: Some(0),
                        correct: true,
                    });
                }
                Some(record) => revisit.push((table_id.clone(), *score, record)),
                None => fresh.push((table_id.clone(), *score)),
            }
        }

        // re-answer records with guidance history using their stored
        // reflection; the flag is sticky in this pass
        for (table_id, score, learning) in revisit {
            let knowledge = match self.store.get_knowledge(&table_id).await? {
                Some(knowledge) => knowledge,
                None => {
                    not_found.push(table_id);
                    continue;
                }
            };
            let table_text = knowledge.table.render_markdown();
            let prompt = match learning.state(None) {
                LearningState::GuidedSuccess { reflection, .. } => {
                    prompts::guided_learning(&knowledge.question, &table_text, &reflection)
                }
                LearningState::GuidedFailure { reflection } => {
                    prompts::error_reflection_retry(&knowledge.question, &table_text, &reflection)
                }
                _ => prompts::plain_answer(&knowledge.question, &table_text),
            };

            let answer = self.chat.complete(vec![ChatMessage::user(prompt)]).await?;
            let correct = grading::is_answer_correct(&answer, &knowledge.answer);
            if correct {
                correct_count += 1;
            } else {
                worklist.push(table_id.clone());
            }
            candidates.push(CandidateTrace {
                table_id,
                score,
                flag_before: Some(learning.flag),
                flag_after: Some(learning.flag),
                correct,
            });
        }

        // fresh candidates are answered cold and recorded as flag 0 or 3
        for (table_id, score) in fresh {
            let knowledge = match self.store.get_knowledge(&table_id).await? {
                Some(knowledge) => knowledge,
                None => {
                    not_found.push(table_id);
                    continue;
                }
            };
            let table_text = knowledge.table.render_markdown();
            let prompt = prompts::plain_answer(&knowledge.question, &table_text);

            let answer = self.chat.complete(vec![ChatMessage::user(prompt)]).await?;
            let correct = grading::is_answer_correct(&answer, &knowledge.answer);
            let flag = if correct { 0 } else { 3 };

            let record = LearningRecord {
                table_id: table_id.clone(),
                flag,
                rethink_summary: None,
                guidance_error_count: 0,
                first_answer_time: Some(Utc::now()),
                updated_at: Utc::now(),
            };
            if let Err(e) = self.store.upsert_learning(&record).await {
                warn!("failed to create learning record for {}: {}", table_id, e);
            }

            if correct {
                correct_count += 1;
            } else {
                worklist.push(table_id.clone());
            }
            candidates.push(CandidateTrace {
                table_id,
                score,
                flag_before: None,
                flag_after: Some(flag),
                correct,
            });
        }

        let confidence = if total_count > 0 {
            correct_count as f64 / total_count as f64
        } else {
            0.0
        };
        let needs_guidance = confidence < self.confidence_threshold;
        debug!(
            "first pass complete: {}/{} correct, confidence {:.3}, needs_guidance {}",
            correct_count, total_count, confidence, needs_guidance
        );

        Ok(FirstPassReport {
            confidence,
            correct_count,
            total_count,
            needs_guidance,
            worklist,
            not_found,
            candidates,
        })
    }
}
