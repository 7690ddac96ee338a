//! Strategy-guided reteaching round for candidates the first pass got
//! wrong.
//!
//! Each worklist candidate is re-answered with reasoning strategies in
//! turn, starting with the one recommended by similar teaching history.
//! A success promotes the learning record to flag 1 and stores the
//! winning strategy; three failed rounds while at flag 1 demote the
//! record to flag 2 with an error summary. Confidence is then
//! recalculated over the original batch.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{grading, prompts};
use crate::llm::{ChatClient, ChatMessage};
use crate::store::{KnowledgeRecord, LearningRecord, SqliteRecordStore, TeachingRecord};
use crate::textsim;
use crate::types::{GuidanceTrace, GuidanceTrial, LearningState, Strategy, StrategyAttempt};

/// Consecutive flag-1 guidance failures that demote a record to flag 2
const ESCALATION_LIMIT: u32 = 3;

/// How many similar teaching records vote on the recommended strategy
const RECOMMEND_POOL: usize = 5;

/// What to do with the learning record after a winning strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SuccessPlan {
    /// Same strategy already recorded with a reflection; leave untouched
    NoOp,
    Update {
        reason: &'static str,
        /// Whether `first_answer_time` is stamped to now
        stamp_first_answer: bool,
    },
}

/// What to do with the learning record after every strategy failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailurePlan {
    /// Already flag 2; no writes
    KnownHard,
    /// Flag 1 below the escalation limit; only the counter moves
    CountFailure { new_count: u32 },
    Escalate {
        reason: &'static str,
        /// Flag-1 records drop their teaching record on demotion
        delete_teaching: bool,
    },
}

fn plan_success(state: &LearningState, winning: Strategy) -> SuccessPlan {
    match state {
        LearningState::GuidedSuccess {
            strategy: Some(stored),
            reflection,
        } if *stored == winning && !reflection.is_empty() => SuccessPlan::NoOp,
        LearningState::GuidedFailure { .. } => SuccessPlan::Update {
            reason: "flag2_to_flag1",
            stamp_first_answer: true,
        },
        LearningState::NoRecord | LearningState::Unresolved => SuccessPlan::Update {
            reason: "new_success",
            stamp_first_answer: true,
        },
        LearningState::GuidedSuccess { .. } | LearningState::Correct => SuccessPlan::Update {
            reason: "strategy_change",
            stamp_first_answer: false,
        },
    }
}

fn plan_failure(state: &LearningState, guidance_error_count: u32) -> FailurePlan {
    match state {
        LearningState::GuidedFailure { .. } => FailurePlan::KnownHard,
        LearningState::GuidedSuccess { .. } => {
            let new_count = guidance_error_count + 1;
            if new_count >= ESCALATION_LIMIT {
                FailurePlan::Escalate {
                    reason: "flag1_to_flag2",
                    delete_teaching: true,
                }
            } else {
                FailurePlan::CountFailure { new_count }
            }
        }
        LearningState::NoRecord | LearningState::Correct | LearningState::Unresolved => {
            FailurePlan::Escalate {
                reason: "new_flag2",
                delete_teaching: false,
            }
        }
    }
}

struct ReteachOutcome {
    attempts: Vec<StrategyAttempt>,
    /// Winning strategy and its answer text, when any attempt graded correct
    winning: Option<(Strategy, String)>,
    /// Answer from the last attempt, used for the failure summary
    last_answer: String,
}

pub struct GuidanceEngine {
    store: Arc<SqliteRecordStore>,
    chat: ChatClient,
}

impl GuidanceEngine {
    pub fn new(store: Arc<SqliteRecordStore>, chat: ChatClient) -> Self {
        Self { store, chat }
    }

    /// Run one guidance round over the first pass's incorrect candidates
    /// and recalculate confidence over the original batch of
    /// `total_count` candidates.
    pub async fn run(
        &self,
        worklist: &[String],
        initial_confidence: f64,
        total_count: usize,
    ) -> Result<GuidanceTrace> {
        let session_id = Uuid::new_v4().to_string();
        let mut trials = Vec::with_capacity(worklist.len());
        // flags written this round, keyed by table id; records left
        // untouched are re-read from the store during recalculation
        let mut updated: HashMap<String, u8> = HashMap::new();

        for table_id in worklist {
            let knowledge = match self.store.get_knowledge(table_id).await? {
                Some(knowledge) => knowledge,
                None => {
                    warn!("guidance skipped {}: knowledge record missing", table_id);
                    trials.push(GuidanceTrial {
                        table_id: table_id.clone(),
                        recommended: Strategy::Cot,
                        attempts: Vec::new(),
                        update_reason: "knowledge_not_found".to_string(),
                        flag_after: None,
                    });
                    continue;
                }
            };
            let learning = self.store.get_learning(table_id).await?;

            let recommended = self.recommend_strategy(&knowledge.question).await;
            let outcome = self.reteach(&knowledge, recommended).await?;

            let (update_reason, flag_after) = match &outcome.winning {
                Some((strategy, answer)) => {
                    self.apply_success(
                        &session_id,
                        &knowledge,
                        learning.as_ref(),
                        *strategy,
                        answer,
                        &mut updated,
                    )
                    .await?
                }
                None => {
                    self.apply_failure(
                        &knowledge,
                        learning.as_ref(),
                        &outcome.last_answer,
                        &mut updated,
                    )
                    .await?
                }
            };

            trials.push(GuidanceTrial {
                table_id: table_id.clone(),
                recommended,
                attempts: outcome.attempts,
                update_reason: update_reason.to_string(),
                flag_after,
            });
        }

        let confidence_after = self
            .recalculate_confidence(worklist, &updated, initial_confidence, total_count)
            .await?;
        debug!(
            "guidance round {} complete: {} trials, confidence {:.3}",
            session_id,
            trials.len(),
            confidence_after
        );

        Ok(GuidanceTrace {
            session_id,
            trials,
            confidence_after,
        })
    }

    /// Recommend a strategy by majority vote over the most similar
    /// questions in the teaching history. Falls back to chain-of-thought
    /// when the history is empty or unreadable.
    pub async fn recommend_strategy(&self, question: &str) -> Strategy {
        let records = match self.store.teaching_with_questions().await {
            Ok(records) => records,
            Err(e) => {
                warn!("failed to load teaching history: {}", e);
                return Strategy::Cot;
            }
        };
        if records.is_empty() {
            return Strategy::Cot;
        }

        let mut scored: Vec<(Strategy, f64)> = records
            .iter()
            .map(|(teaching, stored_question)| {
                (teaching.strategy, textsim::ratio(question, stored_question))
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(RECOMMEND_POOL);

        // majority in first-seen order; ties keep the earlier strategy
        let mut counts: Vec<(Strategy, usize)> = Vec::new();
        for (strategy, _) in &scored {
            match counts.iter().position(|(s, _)| s == strategy) {
                Some(i) => counts[i].1 += 1,
                None => counts.push((*strategy, 1)),
            }
        }
        let mut best = Strategy::Cot;
        let mut best_count = 0;
        for (strategy, count) in counts {
            if count > best_count {
                best_count = count;
                best = strategy;
            }
        }
        best
    }

    /// Try the recommended strategy first, then the rest in fixed order,
    /// stopping at the first graded-correct answer.
    async fn reteach(
        &self,
        knowledge: &KnowledgeRecord,
        recommended: Strategy,
    ) -> Result<ReteachOutcome> {
        let table_text = knowledge.table.render_markdown();
        let mut order = vec![recommended];
        order.extend(Strategy::all().into_iter().filter(|s| *s != recommended));

        let mut attempts = Vec::new();
        let mut last_answer = String::new();
        for strategy in order {
            let prompt = prompts::strategy_answer(
                &knowledge.question,
                &table_text,
                strategy,
                knowledge.strategy_artifact(strategy),
            );
            let answer = self.chat.complete(vec![ChatMessage::user(prompt)]).await?;
            let correct = grading::is_answer_correct(&answer, &knowledge.answer);
            attempts.push(StrategyAttempt { strategy, correct });
            if correct {
                return Ok(ReteachOutcome {
                    attempts,
                    winning: Some((strategy, answer)),
                    last_answer: String::new(),
                });
            }
            last_answer = answer;
        }

        Ok(ReteachOutcome {
            attempts,
            winning: None,
            last_answer,
        })
    }

    async fn apply_success(
        &self,
        session_id: &str,
        knowledge: &KnowledgeRecord,
        learning: Option<&LearningRecord>,
        winning: Strategy,
        answer: &str,
        updated: &mut HashMap<String, u8>,
    ) -> Result<(&'static str, Option<u8>)> {
        let table_id = &knowledge.table_id;
        let teaching = self.store.get_teaching(table_id).await?;
        let state = learning
            .map(|l| l.state(teaching.as_ref()))
            .unwrap_or(LearningState::NoRecord);

        match plan_success(&state, winning) {
            SuccessPlan::NoOp => Ok(("same_strategy_no_change", Some(1))),
            SuccessPlan::Update {
                reason,
                stamp_first_answer,
            } => {
                let table_text = knowledge.table.render_markdown();
                let reflection = self
                    .chat
                    .complete(vec![ChatMessage::user(prompts::success_reflection(
                        &knowledge.question,
                        &table_text,
                        answer,
                        &knowledge.answer,
                        winning,
                    ))])
                    .await?;

                let now = Utc::now();
                let record = LearningRecord {
                    table_id: table_id.clone(),
                    flag: 1,
                    rethink_summary: Some(reflection),
                    guidance_error_count: learning.map(|l| l.guidance_error_count).unwrap_or(0),
                    first_answer_time: if stamp_first_answer {
                        Some(now)
                    } else {
                        learning.and_then(|l| l.first_answer_time)
                    },
                    updated_at: now,
                };
                if let Err(e) = self.store.upsert_learning(&record).await {
                    warn!("failed to update learning record for {}: {}", table_id, e);
                }

                let teaching_record = TeachingRecord {
                    table_id: table_id.clone(),
                    strategy: winning,
                    session_id: session_id.to_string(),
                    created_at: now,
                };
                if let Err(e) = self.store.upsert_teaching(&teaching_record).await {
                    warn!("failed to update teaching record for {}: {}", table_id, e);
                }

                updated.insert(table_id.clone(), 1);
                Ok((reason, Some(1)))
            }
        }
    }

    async fn apply_failure(
        &self,
        knowledge: &KnowledgeRecord,
        learning: Option<&LearningRecord>,
        last_answer: &str,
        updated: &mut HashMap<String, u8>,
    ) -> Result<(&'static str, Option<u8>)> {
        let table_id = &knowledge.table_id;
        let prior_count = learning.map(|l| l.guidance_error_count).unwrap_or(0);
        let state = learning
            .map(|l| l.state(None))
            .unwrap_or(LearningState::NoRecord);

        match plan_failure(&state, prior_count) {
            FailurePlan::KnownHard => Ok(("flag2_no_change", Some(2))),
            FailurePlan::CountFailure { new_count } => {
                if let Some(learning) = learning {
                    let record = LearningRecord {
                        guidance_error_count: new_count,
                        updated_at: Utc::now(),
                        ..learning.clone()
                    };
                    if let Err(e) = self.store.upsert_learning(&record).await {
                        warn!(
                            "failed to update guidance error count for {}: {}",
                            table_id, e
                        );
                    }
                }
                Ok(("flag1_error_count_increase", Some(1)))
            }
            FailurePlan::Escalate {
                reason,
                delete_teaching,
            } => {
                let table_text = knowledge.table.render_markdown();
                let summary = self
                    .chat
                    .complete(vec![ChatMessage::user(prompts::failure_summary(
                        &knowledge.question,
                        &table_text,
                        last_answer,
                        &knowledge.answer,
                        &Strategy::all(),
                    ))])
                    .await?;

                // the incremented counter is deliberately not persisted on
                // demotion; the stored value already tells the story
                let record = LearningRecord {
                    table_id: table_id.clone(),
                    flag: 2,
                    rethink_summary: Some(summary),
                    guidance_error_count: prior_count,
                    first_answer_time: learning.and_then(|l| l.first_answer_time),
                    updated_at: Utc::now(),
                };
                if let Err(e) = self.store.upsert_learning(&record).await {
                    warn!("failed to demote learning record for {}: {}", table_id, e);
                }
                if delete_teaching {
                    if let Err(e) = self.store.delete_teaching(table_id).await {
                        warn!("failed to delete teaching record for {}: {}", table_id, e);
                    }
                }

                updated.insert(table_id.clone(), 2);
                Ok((reason, Some(2)))
            }
        }
    }

    /// Confidence over the original batch after guidance: first-pass
    /// correct count plus worklist records now at flag 1 or better.
    async fn recalculate_confidence(
        &self,
        worklist: &[String],
        updated: &HashMap<String, u8>,
        initial_confidence: f64,
        total_count: usize,
    ) -> Result<f64> {
        if total_count == 0 {
            return Ok(0.0);
        }
        let initial_correct = (initial_confidence * total_count as f64) as usize;

        let mut newly_correct = 0usize;
        for table_id in worklist {
            match updated.get(table_id) {
                Some(flag) if *flag <= 1 => newly_correct += 1,
                Some(_) => {}
                None => {
                    if let Some(record) = self.store.get_learning(table_id).await? {
                        if record.flag == 0 {
                            newly_correct += 1;
                        }
                    }
                }
            }
        }

        Ok((initial_correct + newly_correct) as f64 / total_count as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ProviderConfig;
    use crate::types::Table;

    fn offline_engine(store: Arc<SqliteRecordStore>) -> GuidanceEngine {
        let chat = ChatClient::with_provider(
            ProviderConfig::new("http://127.0.0.1:1".to_string(), "test".to_string()),
            "test-model".to_string(),
        );
        GuidanceEngine::new(store, chat)
    }

    async fn temp_store(dir: &tempfile::TempDir) -> Arc<SqliteRecordStore> {
        Arc::new(
            SqliteRecordStore::new(dir.path().join("guidance.db"))
                .await
                .unwrap(),
        )
    }

    fn knowledge(table_id: &str, question: &str) -> KnowledgeRecord {
        KnowledgeRecord {
            table_id: table_id.to_string(),
            question: question.to_string(),
            answer: "['x']".to_string(),
            table: Table::new(vec!["A".to_string()], vec![]),
            sql_skeleton: String::new(),
            question_skeleton: String::new(),
            skeleton_embedding: Vec::new(),
            structure_signature: String::new(),
            cot: String::new(),
            column_sorting: String::new(),
            schema_linking: String::new(),
        }
    }

    fn learning(table_id: &str, flag: u8, count: u32) -> LearningRecord {
        LearningRecord {
            table_id: table_id.to_string(),
            flag,
            rethink_summary: None,
            guidance_error_count: count,
            first_answer_time: None,
            updated_at: Utc::now(),
        }
    }

    fn guided_success(strategy: Option<Strategy>, reflection: &str) -> LearningState {
        LearningState::GuidedSuccess {
            strategy,
            reflection: reflection.to_string(),
        }
    }

    #[test]
    fn test_success_plan_noop_needs_same_strategy_and_reflection() {
        assert_eq!(
            plan_success(&guided_success(Some(Strategy::Cot), "reflection"), Strategy::Cot),
            SuccessPlan::NoOp
        );
        // empty reflection forces a rewrite even for the same strategy
        assert_eq!(
            plan_success(&guided_success(Some(Strategy::Cot), ""), Strategy::Cot),
            SuccessPlan::Update {
                reason: "strategy_change",
                stamp_first_answer: false
            }
        );
        // a different winning strategy replaces the stored one
        assert_eq!(
            plan_success(
                &guided_success(Some(Strategy::ColumnSorting), "reflection"),
                Strategy::Cot
            ),
            SuccessPlan::Update {
                reason: "strategy_change",
                stamp_first_answer: false
            }
        );
        // missing teaching record cannot match the winning strategy
        assert_eq!(
            plan_success(&guided_success(None, "reflection"), Strategy::Cot),
            SuccessPlan::Update {
                reason: "strategy_change",
                stamp_first_answer: false
            }
        );
    }

    #[test]
    fn test_success_plan_promotions_stamp_first_answer() {
        assert_eq!(
            plan_success(
                &LearningState::GuidedFailure {
                    reflection: "old".to_string()
                },
                Strategy::Cot
            ),
            SuccessPlan::Update {
                reason: "flag2_to_flag1",
                stamp_first_answer: true
            }
        );
        assert_eq!(
            plan_success(&LearningState::Unresolved, Strategy::SchemaLinking),
            SuccessPlan::Update {
                reason: "new_success",
                stamp_first_answer: true
            }
        );
        assert_eq!(
            plan_success(&LearningState::NoRecord, Strategy::Cot),
            SuccessPlan::Update {
                reason: "new_success",
                stamp_first_answer: true
            }
        );
    }

    #[test]
    fn test_failure_plan_counts_then_escalates() {
        let hard = LearningState::GuidedFailure {
            reflection: "r".to_string(),
        };
        assert_eq!(plan_failure(&hard, 0), FailurePlan::KnownHard);

        let guided = guided_success(Some(Strategy::Cot), "r");
        assert_eq!(
            plan_failure(&guided, 0),
            FailurePlan::CountFailure { new_count: 1 }
        );
        assert_eq!(
            plan_failure(&guided, 1),
            FailurePlan::CountFailure { new_count: 2 }
        );
        assert_eq!(
            plan_failure(&guided, 2),
            FailurePlan::Escalate {
                reason: "flag1_to_flag2",
                delete_teaching: true
            }
        );
        assert_eq!(
            plan_failure(&LearningState::Unresolved, 0),
            FailurePlan::Escalate {
                reason: "new_flag2",
                delete_teaching: false
            }
        );
        assert_eq!(
            plan_failure(&LearningState::NoRecord, 5),
            FailurePlan::Escalate {
                reason: "new_flag2",
                delete_teaching: false
            }
        );
    }

    #[tokio::test]
    async fn test_recommend_strategy_majority_vote() {
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(&dir).await;
        for (id, question, strategy) in [
            ("t1", "how many goals were scored in 1999", Strategy::ColumnSorting),
            ("t2", "how many goals were scored in 2000", Strategy::ColumnSorting),
            ("t3", "which driver won the race", Strategy::SchemaLinking),
        ] {
            store.put_knowledge(&knowledge(id, question)).await.unwrap();
            store
                .upsert_teaching(&TeachingRecord {
                    table_id: id.to_string(),
                    strategy,
                    session_id: "s".to_string(),
                    created_at: Utc::now(),
                })
                .await
                .unwrap();
        }

        let engine = offline_engine(store);
        let recommended = engine
            .recommend_strategy("how many goals were scored in 2001")
            .await;
        assert_eq!(recommended, Strategy::ColumnSorting);
    }

    #[tokio::test]
    async fn test_recommend_strategy_empty_history_defaults_to_cot() {
        let dir = tempfile::tempdir().unwrap();
        let engine = offline_engine(temp_store(&dir).await);
        assert_eq!(engine.recommend_strategy("anything").await, Strategy::Cot);
    }

    #[tokio::test]
    async fn test_recommend_strategy_tie_keeps_most_similar() {
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(&dir).await;
        for (id, question, strategy) in [
            ("near", "total points scored by the home team", Strategy::SchemaLinking),
            ("far", "which country hosted the event", Strategy::Cot),
        ] {
            store.put_knowledge(&knowledge(id, question)).await.unwrap();
            store
                .upsert_teaching(&TeachingRecord {
                    table_id: id.to_string(),
                    strategy,
                    session_id: "s".to_string(),
                    created_at: Utc::now(),
                })
                .await
                .unwrap();
        }

        // one vote each; the strategy of the more similar question wins
        let engine = offline_engine(store);
        let recommended = engine
            .recommend_strategy("total points scored by the away team")
            .await;
        assert_eq!(recommended, Strategy::SchemaLinking);
    }

    #[tokio::test]
    async fn test_run_records_missing_knowledge_without_llm_calls() {
        let dir = tempfile::tempdir().unwrap();
        let engine = offline_engine(temp_store(&dir).await);
        let worklist = vec!["ghost".to_string()];

        let trace = engine.run(&worklist, 0.5, 2).await.unwrap();
        assert!(!trace.session_id.is_empty());
        assert_eq!(trace.trials.len(), 1);
        assert_eq!(trace.trials[0].update_reason, "knowledge_not_found");
        assert_eq!(trace.trials[0].flag_after, None);
        assert!(trace.trials[0].attempts.is_empty());
        // the unresolved candidate contributes nothing beyond the
        // first-pass correct count
        assert!((trace.confidence_after - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_recalculate_confidence_mixes_updated_and_stored_flags() {
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(&dir).await;
        // w3 was left untouched this round and is still unresolved
        store.upsert_learning(&learning("w3", 3, 0)).await.unwrap();
        // w4 was untouched but some earlier run already settled it
        store.upsert_learning(&learning("w4", 0, 0)).await.unwrap();

        let engine = offline_engine(store);
        let worklist: Vec<String> = ["w1", "w2", "w3", "w4"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mut updated = HashMap::new();
        updated.insert("w1".to_string(), 1u8);
        updated.insert("w2".to_string(), 2u8);

        // 6 candidates at 0.5 initial confidence: 3 initially correct,
        // plus w1 (promoted) and w4 (already flag 0)
        let confidence = engine
            .recalculate_confidence(&worklist, &updated, 0.5, 6)
            .await
            .unwrap();
        assert!((confidence - 5.0 / 6.0).abs() < 1e-9);

        let empty = engine
            .recalculate_confidence(&worklist, &updated, 0.5, 0)
            .await
            .unwrap();
        assert_eq!(empty, 0.0);
    }
}
