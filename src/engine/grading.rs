//! Answer extraction and grading.
//!
//! Model answers arrive wrapped in `<Answer>...</Answer>` tags. Grading
//! strips list brackets and quotes from both sides, then falls through
//! progressively looser comparisons: exact, case-insensitive, whole-string
//! numeric, number-list with matching residual text, and finally date
//! equality over a fixed set of layouts.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

static ANSWER_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<Answer>([\s\S]*?)</Answer>").unwrap());
static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-+]?[\d,]*\.?\d+").unwrap());
static NUMBER_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\d.,]+").unwrap());

/// Date layouts accepted when comparing answers as calendar dates
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
];

/// Grade a tagged model answer against the stored true answer
pub fn is_answer_correct(model_answer: &str, expected_answer: &str) -> bool {
    let extracted = match extract_answer(model_answer) {
        Some(answer) => answer,
        None => return false,
    };

    let model = normalize_answer(&extracted);
    let expected = normalize_answer(expected_answer);

    if model == expected {
        return true;
    }
    advanced_matching(&model, &expected)
}

/// Pull the content of the first `<Answer>` tag pair, trimmed
pub fn extract_answer(model_answer: &str) -> Option<String> {
    ANSWER_TAG
        .captures(model_answer)
        .map(|caps| caps[1].trim().to_string())
}

/// Strip list brackets and quotes so `['England']` and `England`
/// compare equal
pub fn normalize_answer(answer: &str) -> String {
    if answer.starts_with('[') && answer.ends_with(']') {
        answer
            .trim_matches(|c| matches!(c, '[' | ']' | '(' | ')'))
            .replace('\'', "")
            .replace('"', "")
    } else {
        answer.to_string()
    }
}

fn advanced_matching(model: &str, expected: &str) -> bool {
    if model.to_lowercase() == expected.to_lowercase() {
        return true;
    }

    // whole-string numeric comparison, thousands separators removed
    let numeric_model = model.replace(',', "");
    let numeric_expected = expected.replace(',', "");
    if let (Ok(a), Ok(b)) = (
        numeric_model.trim().parse::<f64>(),
        numeric_expected.trim().parse::<f64>(),
    ) {
        if a == b {
            return true;
        }
    }

    // number lists must agree pairwise and the leftover text must match
    let model_numbers = extract_numbers(model);
    let expected_numbers = extract_numbers(expected);
    if !model_numbers.is_empty()
        && !expected_numbers.is_empty()
        && model_numbers.len() == expected_numbers.len()
    {
        let all_close = model_numbers
            .iter()
            .zip(&expected_numbers)
            .all(|(a, b)| (a - b).abs() < 1e-4);
        if all_close {
            let model_text = NUMBER_CHARS.replace_all(model, "").trim().to_lowercase();
            let expected_text = NUMBER_CHARS.replace_all(expected, "").trim().to_lowercase();
            if model_text == expected_text {
                return true;
            }
        }
    }

    match (try_parse_date(model), try_parse_date(expected)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn extract_numbers(text: &str) -> Vec<f64> {
    NUMBER
        .find_iter(text)
        .filter_map(|m| m.as_str().replace(',', "").parse::<f64>().ok())
        .collect()
}

fn try_parse_date(text: &str) -> Option<NaiveDate> {
    let trimmed = text.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_answer() {
        assert_eq!(
            extract_answer("Reasoning...\n<Answer>['England']</Answer>"),
            Some("['England']".to_string())
        );
        assert_eq!(
            extract_answer("<Answer> ['yes'] </Answer><Answer>['no']</Answer>"),
            Some("['yes']".to_string())
        );
        assert_eq!(extract_answer("no tags here"), None);
    }

    #[test]
    fn test_normalize_answer() {
        assert_eq!(normalize_answer("['England']"), "England");
        assert_eq!(normalize_answer("[\"1,234\"]"), "1,234");
        assert_eq!(normalize_answer("['a', 'b']"), "a, b");
        assert_eq!(normalize_answer("plain text"), "plain text");
    }

    #[test]
    fn test_exact_and_case_insensitive_match() {
        assert!(is_answer_correct("<Answer>['England']</Answer>", "['England']"));
        assert!(is_answer_correct("<Answer>['england']</Answer>", "['England']"));
        assert!(!is_answer_correct("<Answer>['France']</Answer>", "['England']"));
        assert!(!is_answer_correct("England without tags", "['England']"));
    }

    #[test]
    fn test_numeric_match_ignores_thousands_separators() {
        assert!(is_answer_correct("<Answer>['1,234']</Answer>", "['1234']"));
        assert!(is_answer_correct("<Answer>['1234.0']</Answer>", "['1234']"));
        assert!(!is_answer_correct("<Answer>['1235']</Answer>", "['1234']"));
    }

    #[test]
    fn test_number_list_with_residual_text() {
        assert!(is_answer_correct(
            "<Answer>['3.00001 km']</Answer>",
            "['3 km']"
        ));
        // same numbers, different units
        assert!(!is_answer_correct("<Answer>['3 km']</Answer>", "['3 mi']"));
        // numbers off by more than the tolerance
        assert!(!is_answer_correct("<Answer>['3.1 km']</Answer>", "['3 km']"));
    }

    #[test]
    fn test_date_match_across_layouts() {
        assert!(is_answer_correct(
            "<Answer>['January 5, 2001']</Answer>",
            "['2001-01-05']"
        ));
        assert!(is_answer_correct(
            "<Answer>['5 Jan 2001']</Answer>",
            "['2001-01-05']"
        ));
        assert!(!is_answer_correct(
            "<Answer>['January 6, 2001']</Answer>",
            "['2001-01-05']"
        ));
    }

    #[test]
    fn test_try_parse_date() {
        assert!(try_parse_date("2001-01-05").is_some());
        assert!(try_parse_date("01/05/2001").is_some());
        assert!(try_parse_date("not a date").is_none());
    }
}
