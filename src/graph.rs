//! Similarity neighborhood graph over stored questions.
//!
//! Starting from one question, expands up to two layers of most-similar
//! stored questions. Nodes are keyed by table id and reused across
//! layers; edges carry the similarity score and are deduplicated by
//! endpoint pair. The output feeds visualization tooling, so the shape
//! is plain nodes-and-links JSON.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use crate::store::SqliteRecordStore;
use crate::textsim;

#[derive(Debug, Clone, Serialize)]
pub struct GraphNode {
    pub id: String,
    pub content: String,
    pub table_id: String,
    pub layer: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub similarity_score: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SimilarityGraph {
    pub nodes: Vec<GraphNode>,
    pub links: Vec<GraphEdge>,
}

pub struct GraphBuilder {
    store: Arc<SqliteRecordStore>,
    max_layers: u8,
    top_n: usize,
}

impl GraphBuilder {
    pub fn new(store: Arc<SqliteRecordStore>) -> Self {
        Self::with_limits(store, 2, 5)
    }

    pub fn with_limits(store: Arc<SqliteRecordStore>, max_layers: u8, top_n: usize) -> Self {
        Self {
            store,
            max_layers,
            top_n,
        }
    }

    /// Build the neighborhood graph around a question. `table_id` names
    /// the start node when the question is a stored one; anonymous
    /// queries get the `user_query` node id.
    pub async fn build(&self, question: &str, table_id: Option<&str>) -> SimilarityGraph {
        let start_id = table_id.unwrap_or("user_query").to_string();
        let mut nodes = vec![GraphNode {
            id: start_id.clone(),
            content: question.to_string(),
            table_id: start_id.clone(),
            layer: 0,
        }];
        let mut seen: HashSet<String> = HashSet::new();
        seen.insert(start_id.clone());
        let mut edges: Vec<GraphEdge> = Vec::new();

        // newly created layer-1 nodes, expanded in the second pass
        let mut frontier: Vec<(String, String)> = Vec::new();
        for (candidate_id, score) in self.search_similar(question).await {
            if seen.contains(&candidate_id) {
                add_edge(&mut edges, &start_id, &candidate_id, score);
                continue;
            }
            let content = self.question_for(&candidate_id).await;
            nodes.push(GraphNode {
                id: candidate_id.clone(),
                content: content.clone(),
                table_id: candidate_id.clone(),
                layer: 1,
            });
            seen.insert(candidate_id.clone());
            add_edge(&mut edges, &start_id, &candidate_id, score);
            frontier.push((candidate_id, content));
        }

        if self.max_layers >= 2 {
            for (parent_id, content) in frontier {
                for (candidate_id, score) in self.search_similar(&content).await {
                    if candidate_id == parent_id {
                        continue;
                    }
                    if !seen.contains(&candidate_id) {
                        let content = self.question_for(&candidate_id).await;
                        nodes.push(GraphNode {
                            id: candidate_id.clone(),
                            content,
                            table_id: candidate_id.clone(),
                            layer: 2,
                        });
                        seen.insert(candidate_id.clone());
                    }
                    add_edge(&mut edges, &parent_id, &candidate_id, score);
                }
            }
        }

        SimilarityGraph {
            nodes,
            links: edges,
        }
    }

    /// Most similar stored questions, best first. The single best hit is
    /// dropped as the presumed self-match.
    async fn search_similar(&self, content: &str) -> Vec<(String, f64)> {
        if content.trim().is_empty() {
            return Vec::new();
        }
        let fetch_limit = (self.top_n + 1).saturating_mul(4);
        let matches = match self.store.search_by_question(content, fetch_limit).await {
            Ok(matches) => matches,
            Err(e) => {
                warn!("similar-question search failed: {}", e);
                return Vec::new();
            }
        };

        let mut scored: Vec<(String, f64)> = matches
            .into_iter()
            .map(|(table_id, question)| (table_id, textsim::ratio(content, &question)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored.truncate(self.top_n + 1);
        scored.into_iter().skip(1).collect()
    }

    async fn question_for(&self, table_id: &str) -> String {
        match self.store.get_knowledge(table_id).await {
            Ok(Some(knowledge)) => knowledge.question,
            Ok(None) => String::new(),
            Err(e) => {
                warn!("failed to load question for {}: {}", table_id, e);
                String::new()
            }
        }
    }
}

fn add_edge(edges: &mut Vec<GraphEdge>, source: &str, target: &str, score: f64) {
    if edges
        .iter()
        .any(|e| e.source == source && e.target == target)
    {
        return;
    }
    edges.push(GraphEdge {
        source: source.to_string(),
        target: target.to_string(),
        similarity_score: score,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::KnowledgeRecord;
    use crate::types::Table;

    async fn seeded_store(dir: &tempfile::TempDir) -> Arc<SqliteRecordStore> {
        let store = Arc::new(
            SqliteRecordStore::new(dir.path().join("graph.db"))
                .await
                .unwrap(),
        );
        for (id, question) in [
            ("k1", "how many gold medals did norway win"),
            ("k2", "how many gold medals did sweden win"),
            ("k3", "how many silver medals did norway win"),
            ("k4", "which country won the most medals"),
        ] {
            store
                .put_knowledge(&KnowledgeRecord {
                    table_id: id.to_string(),
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
                })
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_graph_reuses_nodes_and_dedupes_edges() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(&dir).await;
        let builder = GraphBuilder::new(store);

        let graph = builder
            .build("how many gold medals did norway win", Some("k1"))
            .await;

        assert_eq!(graph.nodes[0].id, "k1");
        assert_eq!(graph.nodes[0].layer, 0);
        // the best search hit is presumed self, so k1 never reappears
        assert_eq!(
            graph.nodes.iter().filter(|n| n.id == "k1").count(),
            1
        );

        let mut ids: Vec<&str> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), graph.nodes.len(), "node ids must be unique");

        let pairs: HashSet<(String, String)> = graph
            .links
            .iter()
            .map(|e| (e.source.clone(), e.target.clone()))
            .collect();
        assert_eq!(pairs.len(), graph.links.len(), "edges must be unique");
        assert!(graph.links.iter().all(|e| e.source != e.target));
        // layer-1 expansion found the sibling questions
        assert!(graph.nodes.len() > 1);
    }

    #[tokio::test]
    async fn test_anonymous_query_gets_user_query_node() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(&dir).await;
        let builder = GraphBuilder::new(store);

        let graph = builder.build("how many gold medals did norway win", None).await;
        assert_eq!(graph.nodes[0].id, "user_query");
        assert!(graph.nodes.iter().all(|n| n.id != "k1" || n.layer > 0));
    }

    #[tokio::test]
    async fn test_empty_question_yields_start_node_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(&dir).await;
        let builder = GraphBuilder::new(store);

        let graph = builder.build("", Some("start")).await;
        assert_eq!(graph.nodes.len(), 1);
        assert!(graph.links.is_empty());
    }

    #[tokio::test]
    async fn test_empty_store_yields_start_node_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            SqliteRecordStore::new(dir.path().join("empty.db"))
                .await
                .unwrap(),
        );
        let builder = GraphBuilder::new(store);

        let graph = builder.build("any question at all", None).await;
        assert_eq!(graph.nodes.len(), 1);
        assert_eq!(graph.nodes[0].id, "user_query");
        assert!(graph.links.is_empty());
    }
}
