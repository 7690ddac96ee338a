//! Three-stage similarity funnel over stored knowledge records.
//!
//! Stage 1 pulls a candidate pool by full-text search over SQL skeletons
//! and re-scores it with an edit-distance ratio. Stage 2 re-ranks by
//! skeleton-embedding cosine similarity. Stage 3 folds in table-structure
//! similarity and cuts to the final result size.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::PipelineConfig;
use crate::embedding::cosine_similarity;
use crate::fingerprint::QuestionFingerprint;
use crate::store::{SqliteRecordStore, StoreResult};
use crate::store::KnowledgeRecord;
use crate::textsim;

/// One funnel survivor with its per-stage scores
#[derive(Debug, Clone)]
pub struct RankedCandidate {
    pub record: KnowledgeRecord,
    /// Edit ratio of stored vs query SQL skeleton
    pub lexical: f64,
    /// Cosine similarity of stored vs query skeleton embedding
    pub semantic: f64,
    /// Edit ratio of stored vs query structure signature
    pub structural: f64,
}

impl RankedCandidate {
    /// Composite score used for the final ranking
    pub fn total(&self) -> f64 {
        self.semantic + self.structural
    }
}

pub struct SimilarityFunnel {
    store: Arc<SqliteRecordStore>,
    first_stage_pool: usize,
    top_n: usize,
}

impl SimilarityFunnel {
    pub fn new(store: Arc<SqliteRecordStore>, pipeline: &PipelineConfig) -> Self {
        Self {
            store,
            first_stage_pool: pipeline.first_stage_pool,
            top_n: pipeline.top_n,
        }
    }

    /// Rank stored questions against a fingerprint, most relevant first.
    /// A failed stage degrades to the previous stage's ordering instead
    /// of aborting the pipeline.
    pub async fn rank(&self, fingerprint: &QuestionFingerprint) -> Vec<RankedCandidate> {
        let pool = match self.lexical_stage(&fingerprint.sql_skeleton).await {
            Ok(pool) => pool,
            Err(e) => {
                warn!("lexical funnel stage failed: {}", e);
                return Vec::new();
            }
        };
        if pool.is_empty() {
            return Vec::new();
        }
        debug!(pool = pool.len(), "lexical stage complete");

        let pool = semantic_rerank(pool, &fingerprint.skeleton_embedding);
        structural_cut(pool, &fingerprint.structure_signature, self.top_n)
    }

    async fn lexical_stage(&self, sql_skeleton: &str) -> StoreResult<Vec<RankedCandidate>> {
        if sql_skeleton.trim().is_empty() {
            return Ok(Vec::new());
        }

        // FTS casts a wider net than the pool; the edit-ratio re-score
        // decides the actual cut
        let fetch_limit = self.first_stage_pool.saturating_mul(4);
        let matches = self
            .store
            .search_by_sql_skeleton(sql_skeleton, fetch_limit)
            .await?;

        let mut scored: Vec<(String, f64)> = matches
            .into_iter()
            .map(|(table_id, stored)| (table_id, textsim::ratio(&stored, sql_skeleton)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

        let kept = cut_with_exact_ties(&scored, self.first_stage_pool);
        let ids: Vec<String> = kept.iter().map(|(id, _)| id.clone()).collect();
        let records = self.store.knowledge_by_ids(&ids).await?;

        // knowledge_by_ids preserves input order and drops unresolvable
        // ids, so re-pair the scores by id
        let scores: HashMap<&str, f64> = kept.iter().map(|(id, s)| (id.as_str(), *s)).collect();
        Ok(records
            .into_iter()
            .map(|record| {
                let lexical = scores.get(record.table_id.as_str()).copied().unwrap_or(0.0);
                RankedCandidate {
                    record,
                    lexical,
                    semantic: 0.0,
                    structural: 0.0,
                }
            })
            .collect())
    }
}

/// Cut a descending-sorted score list at `limit`, except when the
/// boundary entry is an exact match: then the whole leading run of
/// score-1.0 entries survives instead of being truncated.
fn cut_with_exact_ties(scored: &[(String, f64)], limit: usize) -> Vec<(String, f64)> {
    if limit == 0 {
        return Vec::new();
    }
    if scored.len() < limit {
        return scored.to_vec();
    }
    if scored[limit - 1].1 == 1.0 {
        scored
            .iter()
            .take_while(|(_, score)| *score == 1.0)
            .cloned()
            .collect()
    } else {
        scored[..limit].to_vec()
    }
}

/// Re-rank by embedding cosine similarity. An empty query embedding
/// leaves the pool untouched; candidates without a stored embedding
/// score 0.0 and keep their stage-1 relative order (stable sort).
fn semantic_rerank(mut pool: Vec<RankedCandidate>, query_embedding: &[f32]) -> Vec<RankedCandidate> {
    if query_embedding.is_empty() {
        return pool;
    }
    for candidate in &mut pool {
        candidate.semantic = if candidate.record.skeleton_embedding.is_empty() {
            0.0
        } else {
            cosine_similarity(&candidate.record.skeleton_embedding, query_embedding) as f64
        };
    }
    pool.sort_by(|a, b| b.semantic.partial_cmp(&a.semantic).unwrap_or(Ordering::Equal));
    pool
}

/// Fold structure-signature similarity into a composite score and keep
/// the best `top_n` candidates.
fn structural_cut(
    mut pool: Vec<RankedCandidate>,
    query_signature: &str,
    top_n: usize,
) -> Vec<RankedCandidate> {
    for candidate in &mut pool {
        candidate.structural =
            if query_signature.is_empty() || candidate.record.structure_signature.is_empty() {
                0.0
            } else {
                textsim::ratio(&candidate.record.structure_signature, query_signature)
            };
    }
    pool.sort_by(|a, b| b.total().partial_cmp(&a.total()).unwrap_or(Ordering::Equal));
    pool.truncate(top_n);
    pool
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Table;

    fn record(table_id: &str, skeleton: &str, embedding: Vec<f32>, signature: &str) -> KnowledgeRecord {
        KnowledgeRecord {
            table_id: table_id.to_string(),
            question: format!("question for {}", table_id),
            answer: "['x']".to_string(),
            table: Table::new(vec!["A".to_string()], vec![vec!["1".to_string()]]),
            sql_skeleton: skeleton.to_string(),
            question_skeleton: String::new(),
            skeleton_embedding: embedding,
            structure_signature: signature.to_string(),
            cot: String::new(),
            column_sorting: String::new(),
            schema_linking: String::new(),
        }
    }

    fn candidate(table_id: &str, embedding: Vec<f32>, signature: &str) -> RankedCandidate {
        RankedCandidate {
            record: record(table_id, "SELECT __ FROM __", embedding, signature),
            lexical: 0.0,
            semantic: 0.0,
            structural: 0.0,
        }
    }

    fn scored(pairs: &[(&str, f64)]) -> Vec<(String, f64)> {
        pairs.iter().map(|(id, s)| (id.to_string(), *s)).collect()
    }

    #[test]
    fn test_cut_keeps_all_exact_matches_at_boundary() {
        let input = scored(&[("a", 1.0), ("b", 1.0), ("c", 1.0), ("d", 0.9), ("e", 0.8)]);
        let kept = cut_with_exact_ties(&input, 2);
        assert_eq!(kept.len(), 3);
        assert!(kept.iter().all(|(_, s)| *s == 1.0));
    }

    #[test]
    fn test_cut_truncates_when_boundary_not_exact() {
        let input = scored(&[("a", 1.0), ("b", 0.9), ("c", 0.8), ("d", 0.7)]);
        let kept = cut_with_exact_ties(&input, 2);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].0, "a");
        assert_eq!(kept[1].0, "b");
    }

    #[test]
    fn test_cut_short_input_kept_whole() {
        let input = scored(&[("a", 0.5), ("b", 0.4)]);
        assert_eq!(cut_with_exact_ties(&input, 10).len(), 2);
        assert!(cut_with_exact_ties(&input, 0).is_empty());
    }

    #[test]
    fn test_semantic_rerank_orders_by_cosine() {
        let pool = vec![
            candidate("far", vec![0.0, 1.0], ""),
            candidate("near", vec![1.0, 0.0], ""),
        ];
        let ranked = semantic_rerank(pool, &[1.0, 0.0]);
        assert_eq!(ranked[0].record.table_id, "near");
        assert!(ranked[0].semantic > ranked[1].semantic);
    }

    #[test]
    fn test_semantic_rerank_missing_embeddings_keep_order() {
        let pool = vec![
            candidate("first", Vec::new(), ""),
            candidate("second", Vec::new(), ""),
            candidate("scored", vec![1.0, 0.0], ""),
        ];
        let ranked = semantic_rerank(pool, &[1.0, 0.0]);
        assert_eq!(ranked[0].record.table_id, "scored");
        // stage-1 relative order preserved for the unscored pair
        assert_eq!(ranked[1].record.table_id, "first");
        assert_eq!(ranked[2].record.table_id, "second");
    }

    #[test]
    fn test_semantic_rerank_empty_query_is_passthrough() {
        let pool = vec![candidate("a", vec![1.0], ""), candidate("b", vec![0.5], "")];
        let ranked = semantic_rerank(pool, &[]);
        assert_eq!(ranked[0].record.table_id, "a");
        assert_eq!(ranked[0].semantic, 0.0);
    }

    #[test]
    fn test_structural_cut_composite_and_truncate() {
        let mut a = candidate("a", Vec::new(), "[int, string]");
        a.semantic = 0.2;
        let mut b = candidate("b", Vec::new(), "[date, float]");
        b.semantic = 0.3;
        let ranked = structural_cut(vec![a, b], "[int, string]", 1);
        assert_eq!(ranked.len(), 1);
        // exact signature match outweighs the small semantic edge
        assert_eq!(ranked[0].record.table_id, "a");
        assert_eq!(ranked[0].structural, 1.0);
    }

    #[test]
    fn test_structural_cut_empty_signature_keeps_semantic_order() {
        let mut a = candidate("a", Vec::new(), "[int]");
        a.semantic = 0.9;
        let mut b = candidate("b", Vec::new(), "[int]");
        b.semantic = 0.1;
        let ranked = structural_cut(vec![a, b], "", 5);
        assert_eq!(ranked[0].record.table_id, "a");
        assert_eq!(ranked[0].structural, 0.0);
    }

    #[tokio::test]
    async fn test_rank_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            SqliteRecordStore::new(dir.path().join("funnel.db"))
                .await
                .unwrap(),
        );

        store
            .put_knowledge(&record(
                "count",
                "SELECT COUNT(__) FROM __ WHERE __ = __",
                vec![1.0, 0.0],
                "[string, int]",
            ))
            .await
            .unwrap();
        store
            .put_knowledge(&record(
                "order",
                "SELECT __ FROM __ ORDER BY __ LIMIT __",
                vec![0.0, 1.0],
                "[date, float]",
            ))
            .await
            .unwrap();

        let funnel = SimilarityFunnel {
            store,
            first_stage_pool: 100,
            top_n: 5,
        };
        let fingerprint = QuestionFingerprint {
            sql_skeleton: "SELECT COUNT(__) FROM __ WHERE __ = __".to_string(),
            question_skeleton: "how many _ ?".to_string(),
            skeleton_embedding: vec![1.0, 0.0],
            structure_labels: vec!["string".to_string(), "int".to_string()],
            structure_signature: "[string, int]".to_string(),
        };

        let ranked = funnel.rank(&fingerprint).await;
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].record.table_id, "count");
        assert_eq!(ranked[0].lexical, 1.0);
        assert!(ranked[0].total() > ranked[1].total());

        // an empty skeleton produces no candidates at all
        let empty = QuestionFingerprint {
            sql_skeleton: "  ".to_string(),
            ..fingerprint
        };
        assert!(funnel.rank(&empty).await.is_empty());
    }
}
