//! Question/table fingerprinting
//!
//! Derives the three comparable fingerprints the similarity funnel
//! ranks on: a SQL keyword skeleton, a masked linguistic skeleton with
//! its embedding, and a per-column type signature. The derivations are
//! independent and run concurrently; a failed artifact degrades to its
//! default instead of failing the extraction.

pub mod masking;
pub mod sql_skeleton;
pub mod table_structure;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::classify::StructureClassifier;
use crate::config::Config;
use crate::embedding::EmbeddingModel;
use crate::llm::ChatClient;
use crate::types::Table;

/// The fingerprint triple for one question/table pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionFingerprint {
    /// SQL keyword template with `__` placeholders
    pub sql_skeleton: String,
    /// Masked, function-word-reduced question
    pub question_skeleton: String,
    /// Embedding of the question skeleton; empty when embedding failed
    pub skeleton_embedding: Vec<f32>,
    /// Per-column type labels
    pub structure_labels: Vec<String>,
    /// Canonical rendering of the label list
    pub structure_signature: String,
}

/// Derives fingerprints for incoming questions
pub struct FingerprintExtractor {
    chat: ChatClient,
    embedder: EmbeddingModel,
    classifier: StructureClassifier,
}

impl FingerprintExtractor {
    pub fn new(chat: ChatClient, embedder: EmbeddingModel, classifier: StructureClassifier) -> Self {
        Self {
            chat,
            embedder,
            classifier,
        }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let chat = ChatClient::from_config(config)?;
        let embedder = EmbeddingModel::from_config(config)?;
        let classifier = StructureClassifier::from_config(config, Some(chat.clone()))?;
        Ok(Self::new(chat, embedder, classifier))
    }

    /// Derive all three fingerprints concurrently. Individual failures
    /// degrade to defaults rather than failing the extraction.
    pub async fn extract(&self, question: &str, table: &Table) -> QuestionFingerprint {
        let sql_fut = sql_skeleton::generate_sql_skeleton(&self.chat, question);
        let linguistic_fut = self.derive_linguistic(question, table);
        let structure_fut = table_structure::derive_structure(&self.classifier, table);

        let (sql_result, (question_skeleton, skeleton_embedding), (structure_labels, structure_signature)) =
            tokio::join!(sql_fut, linguistic_fut, structure_fut);

        let sql_skeleton = match sql_result {
            Ok(skeleton) => skeleton,
            Err(e) => {
                warn!("SQL skeleton generation failed, using empty skeleton: {}", e);
                String::new()
            }
        };

        debug!(
            "Fingerprint: sql={:?} skeleton={:?} signature={}",
            sql_skeleton, question_skeleton, structure_signature
        );

        QuestionFingerprint {
            sql_skeleton,
            question_skeleton,
            skeleton_embedding,
            structure_labels,
            structure_signature,
        }
    }

    async fn derive_linguistic(&self, question: &str, table: &Table) -> (String, Vec<f32>) {
        let masked = masking::mask_question(question, table);
        let skeleton = masking::extract_question_skeleton(&masked);
        let embedding = match self.embedder.embed(&skeleton).await {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!("Skeleton embedding failed, semantic ranking degrades: {}", e);
                Vec::new()
            }
        };
        (skeleton, embedding)
    }
}
