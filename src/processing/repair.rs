//! Best-effort recovery of JSON from loosely formatted model output.
//!
//! Models wrap JSON in code fences or surround it with commentary. Repair strips fence lines,
//! takes the span from the first `[` or `{` through the last matching closer, and parses it.
//! Failure is a value (`None`), never an error: the caller decides whether a missing artifact
//! matters.

use serde_json::Value;

/// Strip fences and commentary from `raw` and parse what remains.
///
/// Clean JSON passes through unchanged.
pub fn repair_and_parse(raw: &str) -> Option<Value> {
    let unfenced = strip_code_fences(raw);
    let span = bracket_span(&unfenced)?;
    match serde_json::from_str(span) {
        Ok(value) => Some(value),
        Err(error) => {
            tracing::debug!(error = %error, "Model output is not valid JSON after repair");
            None
        }
    }
}

/// Remove fence markers ("```json", "```") while keeping any JSON sharing their line.
fn strip_code_fences(raw: &str) -> String {
    raw.lines()
        .map(strip_fence_markers)
        .collect::<Vec<_>>()
        .join("\n")
}

fn strip_fence_markers(line: &str) -> &str {
    let mut rest = line.trim();
    if let Some(after_fence) = rest.strip_prefix("```") {
        rest = after_fence.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    }
    if let Some(before_fence) = rest.strip_suffix("```") {
        rest = before_fence;
    }
    rest
}

/// Greedy span from the first opening bracket to the last closer of the same kind.
fn bracket_span(text: &str) -> Option<&str> {
    let start = text.find(['[', '{'])?;
    let closer = if text[start..].starts_with('[') {
        ']'
    } else {
        '}'
    };
    let end = text.rfind(closer)?;
    (end > start).then(|| &text[start..=end])
}
