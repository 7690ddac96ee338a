//! Grading contract tests over the public API

use tabletutor::engine::grading::{extract_answer, is_answer_correct, normalize_answer};

#[test]
fn test_tagged_list_answers_grade_like_wtq() {
    let response = "The gold column peaks at norway.\n<Answer>['Norway']</Answer>";
    assert!(is_answer_correct(response, "['norway']"));
    assert!(!is_answer_correct(response, "['sweden']"));
}

#[test]
fn test_untagged_response_never_grades_correct() {
    assert!(extract_answer("norway, no tags").is_none());
    assert!(!is_answer_correct("norway, no tags", "['norway']"));
}

#[test]
fn test_numeric_equivalence_across_formats() {
    assert!(is_answer_correct("<Answer>['7,169']</Answer>", "['7169']"));
    assert!(is_answer_correct("<Answer>['14.0']</Answer>", "['14']"));
    assert!(is_answer_correct("<Answer>['2 km']</Answer>", "['2.0 km']"));
    assert!(!is_answer_correct("<Answer>['2 km']</Answer>", "['2 laps']"));
}

#[test]
fn test_date_equivalence_across_layouts() {
    assert!(is_answer_correct(
        "<Answer>['March 3, 1999']</Answer>",
        "['1999-03-03']"
    ));
    assert!(!is_answer_correct(
        "<Answer>['March 4, 1999']</Answer>",
        "['1999-03-03']"
    ));
}

#[test]
fn test_normalize_strips_list_syntax_only() {
    assert_eq!(normalize_answer("['a', 'b']"), "a, b");
    assert_eq!(normalize_answer("no brackets"), "no brackets");
}
