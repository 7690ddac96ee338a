//! Prompt templates for every LLM call the engine makes.
//!
//! All answering prompts share the same mandatory output convention: the
//! final answer is wrapped in `<Answer>...</Answer>` tags so grading can
//! extract it reliably.

use crate::types::Strategy;

/// Output-format block appended to every answering prompt
const ANSWER_FORMAT: &str = r#"**MANDATORY FORMAT REQUIREMENT**: You MUST put the final answer in the placeholder <Answer></Answer>, DO NOT include any explanation, reasoning, or additional text outside the Answer tags

### Example Answers:

- For the question "scotland played their first match of the 1951 british home championship against which team?", the answer is <Answer>['England']</Answer> .
- For another question "are there at least 2 nationalities on the chart?", the answer is <Answer>['yes']</Answer>.

<Answer></Answer>"#;

/// First-pass prompt for a question with no prior learning context
pub fn plain_answer(question: &str, table: &str) -> String {
    format!(
        r#"### Task:
You are given a table and a question. Your goal is to answer the question using specific cell values from the table, ensuring the answer format matches the provided examples.

### Table:
{table}

### Question:
{question}

### Instructions:
1. Carefully review the table structure, including headers and rows.
2. Identify the relevant data needed to answer the question and use the exact cell value(s) from the table to answer the question.
3. Carefully read the question to understand what type of answer is expected:
   - **Value-based questions**: Extract specific data from table.
   - **Yes/No questions**: Find values, then judge with 'yes'/'no'.

{ANSWER_FORMAT}"#
    )
}

/// First-pass prompt for a flag-1 record, re-answered with its stored
/// guided-learning reflection
pub fn guided_learning(question: &str, table: &str, reflection: &str) -> String {
    format!(
        r#"### Task:
You are given a table, a question, and a guided learning reflection. Use the guided learning reflection to help you answer the question correctly.

### Table:
{table}

### Question:
{question}

### Guided Learning Reflection:
{reflection}

### Instructions:
1. Read the guided learning reflection carefully to understand the correct approach and reasoning process.
2. Apply the insights from the reflection to analyze the table and question.
3. Identify the relevant data needed to answer the question and use the exact cell value(s) from the table.
4. Carefully read the question to understand what type of answer is expected:
   - **Value-based questions**: Extract specific data from table.
   - **Yes/No questions**: Find values, then judge with 'yes'/'no'.

{ANSWER_FORMAT}"#
    )
}

/// First-pass prompt for a flag-2 record, re-answered with its stored
/// error reflection as corrective context
pub fn error_reflection_retry(question: &str, table: &str, reflection: &str) -> String {
    format!(
        r#"### Task:
You are given a table and a question. You have a self-reflection summary from your previous attempts to help you avoid the same mistakes.

### Table:
{table}

### Question:
{question}

### Self-Reflection Summary:
{reflection}

### Instructions:
1. Carefully review your previous self-reflection to understand what went wrong and how to improve.
2. Apply the lessons learned from your reflection to avoid repeating the same mistakes.
3. Pay special attention to the specific errors or misconceptions identified in your reflection.
4. Use the correct reasoning approach outlined in your self-reflection.
5. Identify the relevant data needed to answer the question and use the exact cell value(s) from the table.

{ANSWER_FORMAT}"#
    )
}

/// Guidance-round prompt answering with one named strategy and its
/// stored artifact
pub fn strategy_answer(question: &str, table: &str, strategy: Strategy, artifact: &str) -> String {
    let strategy_block = match strategy {
        Strategy::Cot => format!(
            r#"### Chain of Thought Strategy:
Chain of Thought (CoT) is a reasoning strategy that breaks down complex problems into step-by-step logical processes. This approach helps you systematically analyze the question and identify the exact operations needed to find the answer from the table.

### Knowledge of the CoT:
**Parse the CoT Structure**: The CoT provides a structured breakdown showing:
- TARGET: What specific information you need to find
- COLUMNS: Which table columns contain the relevant data
- CONDITIONS: Any filtering criteria to apply
- ORDER_BY: How to sort the results
- LIMIT: The maximum number of results to return

### The following is this question's Chain of Thought:
{artifact}"#
        ),
        Strategy::ColumnSorting => format!(
            r#"### Column Sorting Strategy:
Column sorting is a strategy that helps you understand the table structure by organizing and prioritizing columns based on their relevance to the question.

### How to Use Column Sorting Strategy:
1. Understand Column Hierarchy: The sorted columns are arranged in order of importance for answering the specific question
2. Focus on Key Columns: Start by examining the columns that appear first in the sorted list, as they are most likely to contain the answer
3. Identify Relevant Data: Look for the specific data points in these columns that directly relate to the question

### The following is this question's Column Sorting:
{artifact}"#
        ),
        Strategy::SchemaLinking => format!(
            r#"### Schema Linking Strategy:
This schema linking shows which table columns (indicated in parentheses) are directly relevant to answering the question.
For example, if you see "drivers(Driver)", it means the concept "drivers" in the question maps to the "Driver" column in the table.

### How to Use Schema Linking Strategy:
1. Identify Concept Mappings: Look for terms in parentheses that represent actual column names corresponding to concepts in the question
2. Match Question Terms to Columns: Use the schema linking to understand which table columns directly relate to the concepts mentioned in the question
3. Focus on Mapped Columns: Prioritize the columns identified in the schema linking as they are most relevant to answering the question

### The following is this question's Schema Linking:
{artifact}"#
        ),
    };

    format!(
        r#"### Task:
You are given a table and a question. Your goal is to answer the question using provided strategy, ensuring the answer format matches the provided examples.

### Table:
{table}

### Question:
{question}

{strategy_block}

### Instructions:
1. Ensure the format of the answer is similar to the provided examples.
2. {ANSWER_FORMAT}"#
    )
}

/// Reflection generated after a strategy succeeds, stored as the
/// flag-1 record's `rethink_summary`
pub fn success_reflection(
    question: &str,
    table: &str,
    model_answer: &str,
    true_answer: &str,
    strategy: Strategy,
) -> String {
    let strategy = strategy.as_str();
    format!(
        r#"As a student, generate a self-reflection summary about how you successfully solved this table-based question using the {strategy} strategy.

Table:
{table}

Question:
{question}

Your answer:
{model_answer}

Correct answer:
{true_answer}

Strategy used: {strategy}

Your self-reflection MUST include exactly three sections:

## Section 1: Strategy Understanding
Explain your understanding of the {strategy} strategy and why it was effective for this question.

## Section 2: Solution Process Reflection
Reflect on your problem-solving process:
- How did you identify the key information in the table?
- What was your logical reasoning step by step?
- How did the {strategy} strategy guide your thinking?

## Section 3: Key Learning Points
Summarize the key insights you gained from solving this question:
- What did you learn about applying the {strategy} strategy?
- What patterns or principles can you apply to similar questions?

Format your response as a structured self-reflection with the three sections clearly separated and labeled."#
    )
}

/// Error summary generated after every strategy fails, stored as the
/// flag-2 record's `rethink_summary`
pub fn failure_summary(
    question: &str,
    table: &str,
    model_answer: &str,
    true_answer: &str,
    strategies: &[Strategy],
) -> String {
    let tried = strategies
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        r#"As a student, generate a self-reflection error summary for this question that you consistently answer incorrectly despite trying multiple strategies.

Table:
{table}

Question:
{question}

Your answer:
{model_answer}

Correct answer:
{true_answer}

Strategies tried: {tried}

Your error self-reflection MUST include exactly THREE sections:

## Section 1: Error Analysis
Analyze what went wrong in your approach:
- Compare your incorrect answer to the correct answer
- Identify the specific mistakes in your reasoning

## Section 2: Root Cause Reflection
Reflect on the fundamental issues:
- What part of the question did you misunderstand?
- Which concepts or skills are you lacking?

## Section 3: Improvement Plan
Create a plan for improvement:
- What specific areas do you need to focus on?
- How will you approach similar questions differently in the future?

Format your response as a structured error self-reflection with the three sections clearly separated and labeled."#
    )
}

/// Tutor-voiced error analysis for a live question answered incorrectly
/// in training mode, stored on the new error record
pub fn tutor_error_analysis(
    question: &str,
    table: &str,
    model_answer: &str,
    true_answer: &str,
) -> String {
    format!(
        r#"As an intelligent tutor, generate a comprehensive error analysis for a student who answered a table-based question incorrectly.

Table:
{table}

Question:
{question}

Student's Answer:
{model_answer}

Correct Answer:
{true_answer}

Please provide a detailed error analysis that includes:

## Section 1: Error Identification
- What specific mistake did the student make?
- Which part of the table data was misinterpreted or overlooked?

## Section 2: Correct Approach
- What is the correct way to approach this question?
- Which table columns and rows should be focused on?
- What logical steps should be followed?

## Section 3: Learning Points
- What key concepts should the student review?
- How can similar mistakes be avoided in the future?
- What patterns or strategies should be remembered?

Format your response as a structured analysis with the three sections clearly separated."#
    )
}

/// Learning-context block embedded in the composer prompts
pub fn learning_context(
    strategy_type: &str,
    original_question: &str,
    original_table: &str,
    reflection: &str,
) -> String {
    format!(
        r#"## Strategy Type: {strategy_type}

## Original Question: {original_question}

## Original Table: {original_table}

## Learning Reflection:
{reflection}"#
    )
}

/// Error-context block embedded in the composer prompts
pub fn error_context(error_question: &str, error_table: &str, error_reflection: &str) -> String {
    format!(
        r#"## Similar Error Question: {error_question}

## Similar Error Table: {error_table}

## Error Analysis:
{error_reflection}"#
    )
}

/// Composer prompt with no historical context
pub fn compose_direct(question: &str, table: &str) -> String {
    format!(
        r#"### Task:
You are given a table and a question. Your goal is to provide accurate answers based solely on the information in the table.

### Table:
{table}

### Question:
{question}

### Instructions:
1. Carefully review the table structure, including headers and rows.
2. Identify the relevant data needed to answer the question and use the exact cell value(s) from the table to answer the question.
3. Carefully read the question to understand what type of answer is expected:
   - **Value-based questions**: Extract specific data from table.
   - **Yes/No questions**: Find values, then judge with 'yes'/'no'.

{ANSWER_FORMAT}"#
    )
}

/// Composer prompt with a learning context only
pub fn compose_with_learning(question: &str, table: &str, learning: &str) -> String {
    format!(
        r#"### Task:
You are given a table and a question. You have a learning guide from a similar question to help you apply effective strategies.

### Table:
{table}

### Question:
{question}

### Learning Guide from Similar Question:
{learning}

### Instructions:
1. Apply the strategies demonstrated in the learning guide to this question.
2. Identify the relevant columns and data in the current table.
3. Extract the specific information needed to answer the question.

{ANSWER_FORMAT}"#
    )
}

/// Composer prompt with an error context only
pub fn compose_with_error(question: &str, table: &str, error: &str) -> String {
    format!(
        r#"### Task:
You are given a table and a question. You have an error analysis from a similar question to help you avoid common mistakes.

### Table:
{table}

### Question:
{question}

### Error Analysis from Similar Question:
{error}

### Instructions:
1. Learn from the error analysis to avoid making similar mistakes.
2. Apply the correct approach suggested in the error analysis.
3. Carefully analyze the current table to find the accurate answer.

{ANSWER_FORMAT}"#
    )
}

/// Composer prompt with both learning and error contexts
pub fn compose_with_both(question: &str, table: &str, learning: &str, error: &str) -> String {
    format!(
        r#"### Task:
You are given a table and a question. You have both learning guide and error analysis from similar questions to help you answer accurately.

### Table:
{table}

### Question:
{question}

### Learning Guide from Similar Question:
{learning}

### Error Analysis from Similar Question:
{error}

### Instructions:
1. Learn from the error analysis to avoid common mistakes.
2. Apply the successful strategies demonstrated in the learning guide.
3. Analyze the current table carefully to find the exact answer for this question.

{ANSWER_FORMAT}"#
    )
}
