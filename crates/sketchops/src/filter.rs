//! Validation of raw model output into line-delimited JSON records.
//!
//! The model is untrusted: it may wrap output in code fences, emit a
//! "nothing here" sentinel, or produce the occasional malformed line. Only
//! lines that parse as a single JSON object survive, in the order the model
//! produced them.

use std::fmt;

use tracing::{debug, warn};

use crate::sanitize;

/// Phrases the prompts instruct the model to emit when there is nothing to
/// extract. Matched case-sensitively as substrings.
pub const SENTINELS: &[&str] = &["Regular chat: no sketch update", "No security content found"];

/// A line that parsed as one JSON object.
///
/// Only [`filter_output`] constructs these, so anything written from a
/// `ValidatedLine` is valid artifact content by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedLine(String);

impl ValidatedLine {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ValidatedLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FilteredOutput {
    pub lines: Vec<ValidatedLine>,
    /// Non-empty lines dropped because they were not a JSON object.
    pub rejected: usize,
    /// A sentinel phrase was present in the raw output.
    pub sentinel: bool,
}

impl FilteredOutput {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Filters raw model output.
///
/// Without `force`, any sentinel short-circuits to an empty result. With
/// `force`, sentinels are stripped and the remaining lines still go
/// through per-line validation.
pub fn filter_output(raw: &str, force: bool) -> FilteredOutput {
    let sentinel = SENTINELS.iter().any(|s| raw.contains(s));
    if sentinel && !force {
        debug!("Model reported no relevant content");
        return FilteredOutput {
            sentinel,
            ..Default::default()
        };
    }

    let mut text = raw.to_string();
    for phrase in SENTINELS {
        text = text.replace(phrase, "");
    }

    let mut out = FilteredOutput {
        sentinel,
        ..Default::default()
    };

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("```") {
            continue;
        }

        match serde_json::from_str::<serde_json::Value>(line) {
            Ok(serde_json::Value::Object(_)) => out.lines.push(ValidatedLine(line.to_string())),
            Ok(_) => {
                out.rejected += 1;
                warn!("Dropping non-object JSON line: {}", sanitize::preview(line, 120));
            }
            Err(e) => {
                out.rejected += 1;
                warn!(
                    "Dropping invalid JSON line: {} ({})",
                    sanitize::preview(line, 120),
                    e
                );
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(out: &FilteredOutput) -> Vec<&str> {
        out.lines.iter().map(|l| l.as_str()).collect()
    }

    #[test]
    fn test_malformed_line_does_not_drop_siblings() {
        let out = filter_output("{\"a\":1}\ninvalid\n{\"b\":2}", false);
        assert_eq!(texts(&out), vec!["{\"a\":1}", "{\"b\":2}"]);
        assert_eq!(out.rejected, 1);
    }

    #[test]
    fn test_sentinel_alone_is_empty() {
        for phrase in SENTINELS {
            let out = filter_output(phrase, false);
            assert!(out.is_empty());
            assert!(out.sentinel);
            assert_eq!(out.rejected, 0);
        }
    }

    #[test]
    fn test_sentinel_short_circuits_even_with_valid_lines() {
        let raw = "{\"a\":1}\nRegular chat: no sketch update";
        assert!(filter_output(raw, false).is_empty());
    }

    #[test]
    fn test_force_strips_sentinel_and_keeps_lines() {
        let raw = "No security content found\n{\"message\":\"x\"}\nnot json";
        let out = filter_output(raw, true);
        assert_eq!(texts(&out), vec!["{\"message\":\"x\"}"]);
        assert_eq!(out.rejected, 1);
        assert!(out.sentinel);
    }

    #[test]
    fn test_force_with_only_sentinel_is_empty() {
        let out = filter_output("Regular chat: no sketch update", true);
        assert!(out.is_empty());
        assert_eq!(out.rejected, 0);
    }

    #[test]
    fn test_code_fences_are_stripped() {
        let raw = "```json\n{\"a\":1}\n```\n";
        assert_eq!(texts(&filter_output(raw, false)), vec!["{\"a\":1}"]);
    }

    #[test]
    fn test_arrays_and_scalars_are_rejected() {
        let raw = "[1,2]\n42\n\"str\"\nnull\n{\"ok\":true}";
        let out = filter_output(raw, false);
        assert_eq!(texts(&out), vec!["{\"ok\":true}"]);
        assert_eq!(out.rejected, 4);
    }

    #[test]
    fn test_whitespace_trimmed_and_order_preserved() {
        let raw = "   {\"n\":3}  \n\n\t{\"n\":1}\r\n{\"n\":2}";
        assert_eq!(
            texts(&filter_output(raw, false)),
            vec!["{\"n\":3}", "{\"n\":1}", "{\"n\":2}"]
        );
    }

    #[test]
    fn test_sentinel_match_is_case_sensitive() {
        let out = filter_output("regular chat: no sketch update", false);
        assert!(!out.sentinel);
        assert_eq!(out.rejected, 1);
    }
}
