//! Masking and skeleton extraction over the public API

use tabletutor::fingerprint::masking::{extract_question_skeleton, mask_question};
use tabletutor::types::Table;

fn medals_table() -> Table {
    Table::new(
        vec!["country".to_string(), "gold medals".to_string()],
        vec![
            vec!["norway".to_string(), "14".to_string()],
            vec!["sweden".to_string(), "8".to_string()],
        ],
    )
}

#[test]
fn test_masking_hides_linked_spans() {
    let masked = mask_question("how many gold medals did norway win?", &medals_table());
    // "gold medals" links to the column, "norway" to a cell value
    assert!(!masked.contains("gold"));
    assert!(!masked.contains("norway"));
    assert!(masked.starts_with("how many"));
}

#[test]
fn test_skeleton_of_masked_question_keeps_function_words() {
    let masked = mask_question("how many gold medals did norway win?", &medals_table());
    let skeleton = extract_question_skeleton(&masked);
    assert!(skeleton.starts_with("how many"));
    assert!(skeleton.contains('_'));
    // noun content never survives into the retrieval key
    assert!(!skeleton.contains("win"));
}

#[test]
fn test_skeleton_is_a_fixed_point() {
    let questions = [
        "how many gold medals did norway win?",
        "which country finished above sweden in 1998?",
        "who scored the most points per game?",
    ];
    for question in questions {
        let masked = mask_question(question, &medals_table());
        let once = extract_question_skeleton(&masked);
        let twice = extract_question_skeleton(&once);
        assert_eq!(once, twice, "skeleton drifted for {:?}", question);
    }
}

#[test]
fn test_context_lines_are_ignored() {
    let with_context = mask_question(
        "Current table: medals\nhow many gold medals did norway win?",
        &medals_table(),
    );
    let without = mask_question("how many gold medals did norway win?", &medals_table());
    assert_eq!(with_context, without);
}

#[test]
fn test_unrelated_table_masks_nothing() {
    let table = Table::new(
        vec!["album".to_string()],
        vec![vec!["nevermind".to_string()]],
    );
    let masked = mask_question("how many gold medals did norway win?", &table);
    assert!(masked.contains("norway"));
    assert!(masked.contains("gold"));
}
