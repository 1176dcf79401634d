// SPDX-License-Identifier: MIT

//! Parsing generated text into a draft

use super::EmailDraft;
use thiserror::Error;

const FENCE: &str = "```";

/// Generated text that is neither a JSON draft nor contains one in a fence
#[derive(Debug, Clone, Error, PartialEq)]
#[error("could not parse draft: {0}")]
pub struct ParseFailure(pub String);

/// Parse raw model output as `{"subject": ..., "body": ...}`.
///
/// The whole text is tried first, then the interior of the first fenced
/// block (with or without a language tag).
pub fn parse_draft(raw: &str) -> Result<EmailDraft, ParseFailure> {
    let plain_err = match serde_json::from_str::<EmailDraft>(raw.trim()) {
        Ok(draft) => return Ok(draft),
        Err(e) => e,
    };

    let interior = fenced_interior(raw).ok_or_else(|| {
        ParseFailure(format!("not JSON and no fenced block ({})", plain_err))
    })?;

    serde_json::from_str::<EmailDraft>(interior.trim())
        .map_err(|e| ParseFailure(format!("fenced block is not a draft ({})", e)))
}

/// Text between the first fence and the next one. An unterminated fence
/// runs to the end of the input.
fn fenced_interior(raw: &str) -> Option<&str> {
    let start = raw.find(FENCE)? + FENCE.len();
    let rest = &raw[start..];

    let tag_len = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
        .unwrap_or(rest.len());
    let after_tag = &rest[tag_len..];
    let content = if after_tag.starts_with(char::is_whitespace) {
        after_tag
    } else {
        rest
    };

    match content.find(FENCE) {
        Some(end) => Some(&content[..end]),
        None => Some(content),
    }
}
