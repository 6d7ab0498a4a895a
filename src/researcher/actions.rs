//! Structured model outputs — the per-turn research plan and the
//! main-question verdict — plus tolerant JSON extraction.
//!
//! Models wrap JSON in markdown fences or prose despite instructions, so the
//! extractor scans for the first balanced object instead of parsing the raw
//! reply. A reply with no parseable object fails the turn cleanly; the next
//! turn re-plans from scratch.

use serde::Deserialize;

/// Phase-1 plan proposed by the model for one turn.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ProposedActions {
    #[serde(default)]
    pub sub_questions: Vec<String>,
    #[serde(default)]
    pub web_search: bool,
    #[serde(default)]
    pub web_query: String,
    #[serde(default)]
    pub paper_query: String,
}

/// Verdict on the main research question.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct MainAnswer {
    #[serde(default)]
    pub answered: bool,
    #[serde(default)]
    pub answer: String,
}

/// Parse a [`ProposedActions`] out of a model reply.
pub fn parse_actions(reply: &str) -> Option<ProposedActions> {
    let json = extract_json(reply)?;
    serde_json::from_str(&json).ok()
}

/// Parse a [`MainAnswer`] out of a model reply.
pub fn parse_main_answer(reply: &str) -> Option<MainAnswer> {
    let json = extract_json(reply)?;
    serde_json::from_str(&json).ok()
}

/// Extract the first balanced JSON object from `text`.
///
/// Handles bare objects, ```json fences, and objects embedded in prose.
/// Brace counting is string-aware so braces inside string values do not
/// unbalance the scan.
pub fn extract_json(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[start..start + offset + ch.len_utf8()].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_object_extracts() {
        let json = extract_json(r#"{"a": 1}"#).unwrap();
        assert_eq!(json, r#"{"a": 1}"#);
    }

    #[test]
    fn fenced_object_extracts() {
        let reply = "Here is my plan:\n```json\n{\"web_search\": true}\n```\nDone.";
        let json = extract_json(reply).unwrap();
        assert_eq!(json, r#"{"web_search": true}"#);
    }

    #[test]
    fn nested_and_string_braces_balance() {
        let reply = r#"prose {"a": {"b": "with } brace and \" quote"}, "c": 2} trailing"#;
        let json = extract_json(reply).unwrap();
        assert_eq!(json, r#"{"a": {"b": "with } brace and \" quote"}, "c": 2}"#);
    }

    #[test]
    fn no_object_returns_none() {
        assert!(extract_json("no json here").is_none());
        assert!(extract_json("{unclosed").is_none());
    }

    #[test]
    fn actions_parse_with_defaults() {
        let reply = r#"{"sub_questions": ["what is the mass cutoff?"], "web_search": true, "web_query": "star formation basics", "paper_query": "low mass star formation"}"#;
        let actions = parse_actions(reply).unwrap();
        assert_eq!(actions.sub_questions.len(), 1);
        assert!(actions.web_search);
        assert_eq!(actions.paper_query, "low mass star formation");

        // Missing fields default rather than fail.
        let sparse = parse_actions(r#"{"paper_query": "q"}"#).unwrap();
        assert!(!sparse.web_search);
        assert!(sparse.sub_questions.is_empty());
    }

    #[test]
    fn main_answer_parses() {
        let verdict = parse_main_answer(
            r#"The verdict: {"answered": true, "answer": "They differ in accretion timescale."}"#,
        )
        .unwrap();
        assert!(verdict.answered);
        assert!(verdict.answer.contains("accretion"));
    }

    #[test]
    fn echo_reply_yields_none() {
        assert!(parse_actions("[echo] plan please").is_none());
    }
}
