//! Table-structure classifier client
//!
//! Infers a per-column semantic type label for a table, preferring the
//! dedicated inference endpoint and falling back to an LLM prompt when
//! the endpoint is unset or unreachable. Classification is a degraded
//! concern: when every path fails the caller gets all-string labels,
//! never an error.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::Config;
use crate::llm::{ChatClient, ChatMessage};
use crate::types::Table;

/// The closed label vocabulary the classifier may emit
pub const TYPE_LABELS: [&str; 5] = ["string", "int", "float", "date", "boolean"];

#[derive(Debug, Serialize)]
struct InferenceRequest {
    table_header: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct InferenceResponse {
    #[serde(default)]
    table_structure: Vec<String>,
}

/// Classifier over table columns
pub struct StructureClassifier {
    client: Client,
    /// Inference endpoint; `None` means the LLM fallback is used directly
    endpoint: Option<String>,
    /// Chat client for the prompt fallback
    chat: Option<ChatClient>,
}

impl StructureClassifier {
    pub fn new(endpoint: Option<String>, chat: Option<ChatClient>) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            endpoint,
            chat,
        })
    }

    pub fn from_config(config: &Config, chat: Option<ChatClient>) -> Result<Self> {
        let endpoint = if config.classifier.endpoint.is_empty() {
            None
        } else {
            Some(config.classifier.endpoint.clone())
        };
        Self::new(endpoint, chat)
    }

    /// Infer one type label per column. Falls back through endpoint →
    /// LLM prompt → all-string; never fails.
    pub async fn infer(&self, table: &Table) -> Vec<String> {
        if let Some(endpoint) = &self.endpoint {
            match self.infer_via_endpoint(endpoint, table).await {
                Ok(labels) => return normalize_labels(labels, table.headers.len()),
                Err(e) => warn!("Structure endpoint failed, trying LLM fallback: {}", e),
            }
        }

        if let Some(chat) = &self.chat {
            match self.infer_via_llm(chat, table).await {
                Ok(labels) => return normalize_labels(labels, table.headers.len()),
                Err(e) => warn!("LLM structure inference failed: {}", e),
            }
        }

        vec!["string".to_string(); table.headers.len()]
    }

    async fn infer_via_endpoint(&self, endpoint: &str, table: &Table) -> Result<Vec<String>> {
        let request = InferenceRequest {
            table_header: format_headers_for_inference(table),
        };

        let response = self
            .client
            .post(endpoint)
            .json(&request)
            .send()
            .await
            .context("Failed to reach structure inference endpoint")?;

        if !response.status().is_success() {
            anyhow::bail!("Structure inference error: {}", response.status());
        }

        let result: InferenceResponse = response
            .json()
            .await
            .context("Failed to parse structure inference response")?;

        Ok(result.table_structure)
    }

    async fn infer_via_llm(&self, chat: &ChatClient, table: &Table) -> Result<Vec<String>> {
        let prompt = build_structure_prompt(table);
        let messages = vec![
            ChatMessage::system(
                "You are a table analysis expert. Given the table headers and a few \
                 sample rows, infer the **semantic data type** of each column.",
            ),
            ChatMessage::user(prompt),
        ];
        let response = chat.complete(messages).await?;
        parse_label_array(&response)
    }
}

/// Render each column as `Header("first row value")` for the endpoint
pub fn format_headers_for_inference(table: &Table) -> Vec<String> {
    let first_row = match table.first_row() {
        Some(row) => row,
        None => return Vec::new(),
    };
    table
        .headers
        .iter()
        .zip(first_row.iter())
        .map(|(h, d)| format!("{}(\"{}\")", h, d))
        .collect()
}

fn build_structure_prompt(table: &Table) -> String {
    let headers = serde_json::to_string(&table.headers).unwrap_or_default();
    let sample: Vec<&str> = table.first_row().map(|r| r.iter().map(|v| v.as_str()).collect()).unwrap_or_default();
    let sample = serde_json::to_string(&sample).unwrap_or_default();

    format!(
        r#"You are a table analysis expert. Given the table headers and a few sample rows, infer the **semantic data type** of each column.

Please return only a JSON array of data types corresponding to the column order.

### Example 1:
- **Table Header:** ["Year", "Division", "League", "Regular Season", "PlayOffs", "Open Cup", "Avg. Attendance"]
- **Sample values for each column (first row):** ["2001", "2", "USL A-League", "4th, Western", "Quarterfinals", "Did not qualify", "7,169"]
- **table structure:** ["date", "int", "string", "string", "string", "string", "int"]

### Example 2:
- **Table Header:** ["Time", "Name", "Country", "Rank", "Promotion", "Avg. Score"]
- **Sample values for each column (first row):** ["5:02:84", "James", "UK", "3", "False", "98.3245"]
- **table structure:** ["date", "string", "string", "int", "boolean", "float"]

You can choose from the following types:
["string", "int", "float", "date", "boolean"]

**Table Header:** {headers}

**Sample values for each column (first row):** {sample}

**table structure:**
"#
    )
}

/// Extract a JSON array of labels from an LLM response
fn parse_label_array(text: &str) -> Result<Vec<String>> {
    let start = text.find('[').context("No label array in response")?;
    let end = text.rfind(']').context("No label array in response")?;
    if end <= start {
        anyhow::bail!("Malformed label array in response");
    }
    let labels: Vec<String> = serde_json::from_str(&text[start..=end])
        .context("Failed to parse label array")?;
    Ok(labels)
}

/// Lowercase, replace unknown labels with `string`, and fit to the
/// column count
fn normalize_labels(labels: Vec<String>, column_count: usize) -> Vec<String> {
    let mut out: Vec<String> = labels
        .into_iter()
        .map(|l| {
            let l = l.trim().to_lowercase();
            if TYPE_LABELS.contains(&l.as_str()) {
                l
            } else {
                "string".to_string()
            }
        })
        .collect();
    out.resize(column_count, "string".to_string());
    out
}
