//! Final answer composition for the user's live question.
//!
//! The composer picks up whatever history the pipeline produced: the
//! strategy reflection of the best guided candidate and the closest
//! past mistake. Both, either, or neither shape the answering prompt.
//! In training mode the answer is graded and a miss is appended to the
//! error log with a tutor analysis.

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, warn};

use super::{grading, prompts};
use crate::llm::{ChatClient, ChatMessage};
use crate::store::{NewErrorRecord, SqliteRecordStore};
use crate::textsim;
use crate::types::Table;

/// Minimum similarity for a past mistake to be pulled into the prompt
const ERROR_MATCH_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone)]
pub struct ComposedAnswer {
    pub answer: String,
    /// Which contexts shaped the prompt: `both_learning_and_error`,
    /// `learning_only`, `error_only`, or `direct_answer`
    pub context_used: String,
    /// Grade against the expected answer; `None` outside training mode
    pub graded_correct: Option<bool>,
}

pub struct AnswerComposer {
    store: Arc<SqliteRecordStore>,
    chat: ChatClient,
}

impl AnswerComposer {
    pub fn new(store: Arc<SqliteRecordStore>, chat: ChatClient) -> Self {
        Self { store, chat }
    }

    /// Compose the final answer. `candidate_ids` are the funnel's
    /// survivors in rank order; `expected_answer` switches on training
    /// mode.
    pub async fn compose(
        &self,
        question: &str,
        table: &Table,
        candidate_ids: &[String],
        expected_answer: Option<&str>,
    ) -> Result<ComposedAnswer> {
        let table_text = table.render_markdown();
        let learning = self.find_learning_context(candidate_ids).await?;
        let error = self.find_error_context(question).await?;

        let (prompt, context_used) = match (&learning, &error) {
            (Some(l), Some(e)) => (
                prompts::compose_with_both(question, &table_text, l, e),
                "both_learning_and_error",
            ),
            (Some(l), None) => (
                prompts::compose_with_learning(question, &table_text, l),
                "learning_only",
            ),
            (None, Some(e)) => (
                prompts::compose_with_error(question, &table_text, e),
                "error_only",
            ),
            (None, None) => (prompts::compose_direct(question, &table_text), "direct_answer"),
        };
        debug!("composing final answer with context: {}", context_used);
        let answer = self.chat.complete(vec![ChatMessage::user(prompt)]).await?;

        let graded_correct = match expected_answer {
            Some(expected) => {
                let correct = grading::is_answer_correct(&answer, expected);
                if !correct {
                    self.record_mistake(question, &table_text, &answer, expected)
                        .await?;
                }
                Some(correct)
            }
            None => None,
        };

        Ok(ComposedAnswer {
            answer,
            context_used: context_used.to_string(),
            graded_correct,
        })
    }

    /// Learning context from the first candidate with a guided-success
    /// record. Candidates with a dangling learning record are skipped.
    async fn find_learning_context(&self, candidate_ids: &[String]) -> Result<Option<String>> {
        for table_id in candidate_ids {
            let learning = match self.store.get_learning(table_id).await? {
                Some(record) if record.flag == 1 => record,
                _ => continue,
            };
            let knowledge = match self.store.get_knowledge(table_id).await? {
                Some(knowledge) => knowledge,
                None => continue,
            };
            let teaching = self.store.get_teaching(table_id).await?;
            let strategy = teaching.map(|t| t.strategy.as_str()).unwrap_or("");
            let reflection = learning.rethink_summary.as_deref().unwrap_or("");
            return Ok(Some(prompts::learning_context(
                strategy,
                &knowledge.question,
                &knowledge.table.render_markdown(),
                reflection,
            )));
        }
        Ok(None)
    }

    /// Most similar past mistake above the match threshold; earlier
    /// records win exact ties.
    async fn find_error_context(&self, question: &str) -> Result<Option<String>> {
        let records = self.store.all_errors().await?;

        let mut best_similarity = ERROR_MATCH_THRESHOLD;
        let mut best_record = None;
        for record in &records {
            if record.question.is_empty() {
                continue;
            }
            let similarity = textsim::ratio(question, &record.question);
            if similarity > best_similarity {
                best_similarity = similarity;
                best_record = Some(record);
            }
        }

        Ok(best_record.map(|record| {
            prompts::error_context(&record.question, &record.table_text, &record.error_reflection)
        }))
    }

    /// Training-mode miss: generate a tutor analysis and append it to
    /// the error log.
    async fn record_mistake(
        &self,
        question: &str,
        table_text: &str,
        model_answer: &str,
        true_answer: &str,
    ) -> Result<()> {
        let reflection = self
            .chat
            .complete(vec![ChatMessage::user(prompts::tutor_error_analysis(
                question,
                table_text,
                model_answer,
                true_answer,
            ))])
            .await?;

        let record = NewErrorRecord {
            question: question.to_string(),
            table_text: table_text.to_string(),
            model_answer: model_answer.to_string(),
            true_answer: true_answer.to_string(),
            error_reflection: reflection,
        };
        if let Err(e) = self.store.add_error(&record).await {
            warn!("failed to save error record: {}", e);
        }
        Ok(())
    }
}
