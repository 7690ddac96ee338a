//! Table-structure signature derivation

use crate::classify::StructureClassifier;
use crate::types::Table;

/// Render type labels as the canonical signature string compared by the
/// funnel's structural stage
pub fn render_signature(labels: &[String]) -> String {
    format!("[{}]", labels.join(", "))
}

/// Infer per-column type labels and render their signature
pub async fn derive_structure(
    classifier: &StructureClassifier,
    table: &Table,
) -> (Vec<String>, String) {
    let labels = classifier.infer(table).await;
    let signature = render_signature(&labels);
    (labels, signature)
}
