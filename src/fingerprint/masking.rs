//! Question masking and linguistic skeleton extraction
//!
//! Links question tokens to table columns and cell values, masks the
//! linked spans, then reduces the masked question to a function-word
//! skeleton usable as a retrieval key. Value matches take precedence
//! over column matches, and one question token claims at most one
//! column (exact matches win over partial ones).

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::types::Table;

/// How a question n-gram matched a column name
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ColMatch {
    Exact,
    Partial,
}

/// How a question phrase matched a cell value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellMatch {
    Exact,
    Partial,
}

/// Cell-value linking result: numeric matches plus phrase matches,
/// both keyed by (question token index, column index)
#[derive(Debug, Default)]
pub struct CellLinking {
    pub num_date: BTreeSet<(usize, usize)>,
    pub cells: BTreeMap<(usize, usize), CellMatch>,
}

static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "you're",
        "you've", "you'll", "you'd", "your", "yours", "yourself", "yourselves", "he",
        "him", "his", "himself", "she", "she's", "her", "hers", "herself", "it", "it's",
        "its", "itself", "they", "them", "their", "theirs", "themselves", "what",
        "which", "who", "whom", "this", "that", "that'll", "these", "those", "am",
        "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
        "having", "do", "does", "did", "doing", "a", "an", "the", "and", "but", "if",
        "or", "because", "as", "until", "while", "of", "at", "by", "for", "with",
        "about", "against", "between", "into", "through", "during", "before", "after",
        "above", "below", "to", "from", "up", "down", "in", "out", "on", "off", "over",
        "under", "again", "further", "then", "once", "here", "there", "when", "where",
        "why", "how", "all", "any", "both", "each", "few", "more", "most", "other",
        "some", "such", "no", "nor", "not", "only", "own", "same", "so", "than", "too",
        "very", "s", "t", "can", "will", "just", "don", "don't", "should", "should've",
        "now", "d", "ll", "m", "o", "re", "ve", "y", "ain", "aren", "aren't", "couldn",
        "couldn't", "didn", "didn't", "doesn", "doesn't", "hadn", "hadn't", "hasn",
        "hasn't", "haven", "haven't", "isn", "isn't", "ma", "mightn", "mightn't",
        "mustn", "mustn't", "needn", "needn't", "shan", "shan't", "shouldn",
        "shouldn't", "wasn", "wasn't", "weren", "weren't", "won", "won't", "wouldn",
        "wouldn't",
    ]
    .into_iter()
    .collect()
});

/// Interrogatives kept verbatim in the skeleton
static QUESTION_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["what", "which", "who", "whom", "whose", "where", "when", "why", "how"]
        .into_iter()
        .collect()
});

/// Function words kept verbatim in the skeleton. Tokens outside this
/// set (and the other kept classes) are treated as noun-like and masked.
static FUNCTION_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        // determiners and quantifiers
        "a", "an", "the", "this", "that", "these", "those", "all", "any", "both",
        "each", "every", "few", "many", "more", "most", "much", "no", "other", "same",
        "some", "such", "several", "own",
        // prepositions
        "of", "in", "on", "at", "by", "for", "with", "about", "against", "between",
        "into", "through", "during", "before", "after", "above", "below", "to", "from",
        "up", "down", "out", "off", "over", "under", "per", "within", "without",
        // conjunctions and comparatives
        "and", "but", "or", "nor", "so", "yet", "if", "because", "as", "until",
        "while", "than", "whether", "though", "although",
        // auxiliaries and copulas
        "am", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
        "having", "do", "does", "did", "doing", "will", "would", "shall", "should",
        "may", "might", "must", "can", "could",
        // negation and light adverbs
        "not", "there", "here", "then", "once", "again", "further", "only", "very",
        "too", "just", "also", "ever", "never",
    ]
    .into_iter()
    .collect()
});

const PUNCTUATION: &str = "!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";

fn is_punct_char(c: char) -> bool {
    PUNCTUATION.contains(c)
}

fn is_punct_token(token: &str) -> bool {
    !token.is_empty() && token.chars().all(is_punct_char)
}

fn is_number(word: &str) -> bool {
    word.trim().parse::<f64>().is_ok()
}

/// Tokenize a question: drop context/comment lines, split on whitespace,
/// then separate trailing punctuation and interior hyphens
pub fn preprocess_question_tokens(question: &str) -> Vec<String> {
    let question_lines: Vec<&str> = question
        .trim()
        .split('\n')
        .filter(|line| {
            !line.starts_with("Current ") && !line.starts_with('#') && !line.trim().is_empty()
        })
        .collect();

    let text = if question_lines.is_empty() {
        question.to_string()
    } else {
        question_lines.join(" ")
    };

    let tokens: Vec<&str> = text.split_whitespace().collect();
    split_punctuation(&tokens)
}

fn split_punctuation(tokens: &[&str]) -> Vec<String> {
    let mut result = Vec::new();
    for token in tokens {
        let chars: Vec<char> = token.chars().collect();
        if let Some(&last) = chars.last() {
            if is_punct_char(last) {
                let head: String = chars[..chars.len() - 1].iter().collect();
                if !head.is_empty() {
                    result.push(head);
                }
                result.push(last.to_string());
                continue;
            }
        }
        if token.contains('-') && !token.starts_with('-') && !token.ends_with('-') {
            let parts: Vec<&str> = token.split('-').collect();
            for (i, part) in parts.iter().enumerate() {
                if !part.is_empty() {
                    result.push(part.to_string());
                }
                if i < parts.len() - 1 {
                    result.push("-".to_string());
                }
            }
        } else {
            result.push(token.to_string());
        }
    }
    result
}

/// Lowercase each header and split it into word tokens
pub fn preprocess_header(headers: &[String]) -> Vec<Vec<String>> {
    headers
        .iter()
        .map(|h| h.to_lowercase().split_whitespace().map(String::from).collect())
        .collect()
}

/// Link question n-grams to column names. Exact matches claim their
/// window outright; partial matches only fill positions no exact match
/// claimed. Longer n-grams (up to 5) are tried first.
pub fn compute_schema_linking(
    question_tokens: &[String],
    header_tokens: &[Vec<String>],
) -> BTreeMap<(usize, usize), ColMatch> {
    let mut q_col_match: BTreeMap<(usize, usize), ColMatch> = BTreeMap::new();

    let partial_match = |x: &str, y: &str| -> bool {
        if STOPWORDS.contains(x) || is_punct_token(x) {
            return false;
        }
        let pattern = format!(r"\b{}\b", regex::escape(x));
        Regex::new(&pattern).map(|re| re.is_match(y)).unwrap_or(false)
    };

    let mut n = question_tokens.len().min(5);
    while n > 0 {
        for i in 0..=(question_tokens.len() - n) {
            let n_gram_list: Vec<String> = question_tokens[i..i + n]
                .iter()
                .map(|t| t.to_lowercase())
                .collect();
            let n_gram = n_gram_list.join(" ");
            if n_gram.trim().is_empty() {
                continue;
            }
            for (col_id, col_tokens) in header_tokens.iter().enumerate() {
                let col_str = col_tokens.join(" ");
                if n_gram == col_str {
                    for q_id in i..i + n {
                        q_col_match.insert((q_id, col_id), ColMatch::Exact);
                    }
                }
            }
            for (col_id, col_tokens) in header_tokens.iter().enumerate() {
                let col_str = col_tokens.join(" ");
                if partial_match(&n_gram, &col_str) {
                    for q_id in i..i + n {
                        q_col_match.entry((q_id, col_id)).or_insert(ColMatch::Partial);
                    }
                }
            }
        }
        n -= 1;
    }

    q_col_match
}

/// Link question tokens to cell values. Numeric tokens match number
/// columns directly; other tokens match cells by word boundary, and
/// consecutive matched tokens are graded as one phrase.
pub fn compute_cell_value_linking(
    tokens: &[String],
    header_tokens: &[Vec<String>],
    rows: &[Vec<String>],
) -> CellLinking {
    let column_count = header_tokens.len();

    let mut column_values: Vec<Vec<String>> = vec![Vec::new(); column_count];
    for row in rows {
        for col_id in 0..column_count {
            if let Some(value) = row.get(col_id) {
                column_values[col_id].push(value.to_lowercase());
            }
        }
    }

    // A column is numeric when every non-empty value parses as a number
    let column_is_number: Vec<bool> = column_values
        .iter()
        .map(|values| {
            values
                .iter()
                .all(|val| val.is_empty() || is_number(val))
        })
        .collect();

    let cell_value_partial_match = |word: &str, value: &str| -> bool {
        let word = word.to_lowercase();
        let value = value.to_lowercase();
        format!(" {} ", value).contains(&format!(" {} ", word))
            || value.starts_with(&format!("{} ", word))
            || value.ends_with(&format!(" {}", word))
            || value == word
    };

    let mut linking = CellLinking::default();

    for col_id in 0..column_count {
        let mut match_q_ids: Vec<usize> = Vec::new();
        for (q_id, word) in tokens.iter().enumerate() {
            if word.trim().is_empty()
                || STOPWORDS.contains(word.to_lowercase().as_str())
                || is_punct_token(word)
            {
                continue;
            }
            if is_number(word) && column_is_number[col_id] {
                linking.num_date.insert((q_id, col_id));
                continue;
            }
            for value in &column_values[col_id] {
                if !value.is_empty() && cell_value_partial_match(word, value) {
                    match_q_ids.push(q_id);
                    break;
                }
            }
        }

        // Group consecutive matched tokens into phrases and grade each
        // phrase exact or partial against the column's values
        let mut f = 0;
        while f < match_q_ids.len() {
            let mut t = f + 1;
            while t < match_q_ids.len() && match_q_ids[t] == match_q_ids[t - 1] + 1 {
                t += 1;
            }
            let (q_f, q_t) = (match_q_ids[f], match_q_ids[t - 1] + 1);
            let phrase = tokens[q_f..q_t].join(" ").to_lowercase();
            let exact_match_found = column_values[col_id]
                .iter()
                .any(|value| !value.is_empty() && *value == phrase);
            for q_id in q_f..q_t {
                linking.cells.insert(
                    (q_id, col_id),
                    if exact_match_found {
                        CellMatch::Exact
                    } else {
                        CellMatch::Partial
                    },
                );
            }
            f = t;
        }
    }

    linking
}

/// Resolve multi-column conflicts: each question token keeps one
/// consistent column assignment (exact over partial, smaller ambiguity
/// first), and cell matches for tokens that claimed a column are dropped
pub fn match_shift(
    q_col_match: BTreeMap<(usize, usize), ColMatch>,
    cell_match: BTreeMap<(usize, usize), CellMatch>,
) -> (
    BTreeMap<(usize, usize), ColMatch>,
    BTreeMap<(usize, usize), CellMatch>,
) {
    let mut q_id_to_match: BTreeMap<usize, BTreeSet<(ColMatch, usize)>> = BTreeMap::new();
    for (&(q_id, col_id), &kind) in &q_col_match {
        q_id_to_match.entry(q_id).or_default().insert((kind, col_id));
    }

    let relevant_q_ids: BTreeSet<usize> = q_id_to_match.keys().copied().collect();

    let mut priority: Vec<(usize, usize)> = q_id_to_match
        .iter()
        .map(|(&q_id, candidates)| (candidates.len(), q_id))
        .collect();
    priority.sort();

    let mut claimed: BTreeSet<(ColMatch, usize)> = BTreeSet::new();
    let mut new_q_col_match: BTreeMap<(usize, usize), ColMatch> = BTreeMap::new();

    for (_, q_id) in priority {
        let candidates = &q_id_to_match[&q_id];
        let overlap: BTreeSet<(ColMatch, usize)> =
            claimed.intersection(candidates).copied().collect();

        let res: Vec<(ColMatch, usize)> = if overlap.is_empty() {
            let exact: Vec<(ColMatch, usize)> = candidates
                .iter()
                .filter(|(kind, _)| *kind == ColMatch::Exact)
                .copied()
                .collect();
            let res = if exact.is_empty() {
                candidates.iter().copied().collect()
            } else {
                exact
            };
            claimed.extend(res.iter().copied());
            res
        } else {
            overlap.into_iter().collect()
        };

        for (kind, col_id) in res {
            new_q_col_match.insert((q_id, col_id), kind);
        }
    }

    let new_cell_match: BTreeMap<(usize, usize), CellMatch> = cell_match
        .into_iter()
        .filter(|((q_id, _), _)| !relevant_q_ids.contains(q_id))
        .collect();

    (new_q_col_match, new_cell_match)
}

/// Mask the question: tokens linked to cell values or column names are
/// replaced by `_`, with consecutive masks collapsed to one. Value
/// matches take precedence over column matches.
pub fn mask_question(question: &str, table: &Table) -> String {
    let header_tokens = preprocess_header(&table.headers);
    let question_tokens = preprocess_question_tokens(question);

    let sc_link = compute_schema_linking(&question_tokens, &header_tokens);
    let cv_link = compute_cell_value_linking(&question_tokens, &header_tokens, &table.rows);

    let (q_col_match, cell_match) = match_shift(sc_link, cv_link.cells);

    let mut masked_ids: BTreeSet<usize> = BTreeSet::new();
    for &(q_id, _) in &cv_link.num_date {
        masked_ids.insert(q_id);
    }
    for &(q_id, _) in cell_match.keys() {
        masked_ids.insert(q_id);
    }
    for &(q_id, _) in q_col_match.keys() {
        masked_ids.insert(q_id);
    }

    let mut out: Vec<&str> = Vec::with_capacity(question_tokens.len());
    for (id, tok) in question_tokens.iter().enumerate() {
        if masked_ids.contains(&id) {
            if out.last() == Some(&"_") {
                continue;
            }
            out.push("_");
        } else {
            out.push(tok);
        }
    }
    out.join(" ")
}

static DOUBLE_QUOTED: Lazy<Regex> = Lazy::new(|| Regex::new(r#""[^"]*""#).unwrap());
static SINGLE_QUOTED: Lazy<Regex> = Lazy::new(|| Regex::new(r"'[^']*'").unwrap());

/// Reduce a (masked) question to its skeleton: quoted spans become
/// underscores, interrogatives and function words survive, noun-like
/// tokens become `_`, and consecutive `_` collapse. The reduction is a
/// fixed point: applying it to its own output changes nothing.
pub fn extract_question_skeleton(question: &str) -> String {
    let question = DOUBLE_QUOTED.replace_all(question, |caps: &regex::Captures| {
        "_".repeat(caps[0].chars().count())
    });
    let question = SINGLE_QUOTED.replace_all(&question, |caps: &regex::Captures| {
        "_".repeat(caps[0].chars().count())
    });

    let mut skeleton: Vec<String> = Vec::new();
    for token in question.split_whitespace() {
        let lower = token.to_lowercase();
        if !token.is_empty() && token.chars().all(|c| c == '_') {
            skeleton.push("_".to_string());
        } else if QUESTION_WORDS.contains(lower.as_str()) {
            skeleton.push(token.to_string());
        } else if is_number(token) || is_punct_token(token) {
            skeleton.push(token.to_string());
        } else if FUNCTION_WORDS.contains(lower.as_str()) {
            skeleton.push(token.to_string());
        } else {
            skeleton.push("_".to_string());
        }
    }

    let mut final_skeleton: Vec<String> = Vec::new();
    for token in skeleton {
        if token == "_" && final_skeleton.last().map(|t| t.as_str()) == Some("_") {
            continue;
        }
        final_skeleton.push(token);
    }

    final_skeleton.join(" ")
}
