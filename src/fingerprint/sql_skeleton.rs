//! Structural skeleton extraction
//!
//! Rewrites a natural-language question into a SQL keyword template
//! with `__` placeholders, via a constrained few-shot LLM prompt. The
//! skeleton is the lexical retrieval key for the similarity funnel.

use anyhow::Result;

use crate::llm::{ChatClient, ChatMessage};

fn build_sql_skeleton_prompt(question: &str) -> String {
    format!(
        r#"You are an assistant for SQL structure extraction. Your task is to convert natural language questions into **SQL keyword structure templates**.

### Instructions:

1. MUST only include the following SQL keywords:
SELECT, FROM, WHERE, GROUP BY, HAVING, ORDER BY, LIMIT,
JOIN, LEFT JOIN, RIGHT JOIN, INNER JOIN, OUTER JOIN, ON,
IN, NOT IN, EXISTS, NOT EXISTS, BETWEEN, LIKE, IS NULL, IS NOT NULL,
AND, OR, NOT, CASE, WHEN, THEN, ELSE, END,
DISTINCT, UNION, UNION ALL,
COUNT, SUM, AVG, MIN, MAX

2. Use double underscores `__` to replace **all** table names, column names, literal values, or expressions.

3. Use only uppercase for SQL keywords.

4. DO NOT include table names, column names, or any actual values. DO NOT explain your reasoning. DO NOT return anything except SQL keywords with placeholders.



### Example 1:
- **Question:** Show the total number of orders for each customer
- **Question Skeleton:** SELECT __, COUNT(__) FROM __ GROUP BY __

### Example 2:
- **Question:** List each department and the average salary of its employees, ordered by average salary descending
- **Question Skeleton:** SELECT __, AVG(__) FROM __ GROUP BY __ ORDER BY __ DESC

### Example 3:
- **Question:** Show each employee's name and categorize them as 'Senior' or 'Junior' based on years of service
- **Question Skeleton:** SELECT __, CASE WHEN __ > __ THEN __ ELSE __ END FROM __

### Example 4:
- **Question:** Find customers who have not placed any orders
- **Question Skeleton:** SELECT __ FROM __ WHERE NOT EXISTS (SELECT __ FROM __ WHERE __ = __)


**Question:** {question}

**SQL Skeleton:**"#
    )
}

/// Generate the structural skeleton for a question
pub async fn generate_sql_skeleton(chat: &ChatClient, question: &str) -> Result<String> {
    let messages = vec![
        ChatMessage::system(
            "You're an assistant that specializes in parsing the intent of table \
             queries, and you're good at translating natural language questions \
             into structured query representations.",
        ),
        ChatMessage::user(build_sql_skeleton_prompt(question)),
    ];
    let response = chat.complete(messages).await?;
    Ok(clean_skeleton(&response))
}

/// Strip code fences and label echoes the model sometimes adds
fn clean_skeleton(response: &str) -> String {
    let mut text = response.trim();
    if let Some(stripped) = text.strip_prefix("```sql") {
        text = stripped;
    } else if let Some(stripped) = text.strip_prefix("```") {
        text = stripped;
    }
    if let Some(stripped) = text.strip_suffix("```") {
        text = stripped;
    }
    let text = text.trim();
    text.strip_prefix("**SQL Skeleton:**")
        .unwrap_or(text)
        .trim()
        .to_string()
}
