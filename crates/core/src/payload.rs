//! Structured payload extraction from free-form model output.
//!
//! Meta-agents (memory generation, pruning, planning) are asked to answer with
//! JSON. Models return it either bare or wrapped in a fenced block inside
//! prose. The first fenced block wins; without a fence the whole response is
//! parsed.

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::PayloadError;

const FENCE: &str = "```";

/// Extract and parse the structured block in `text`.
pub fn extract_structured_payload(text: &str) -> Result<serde_json::Value, PayloadError> {
    let body = payload_body(text)?;
    serde_json::from_str(body).map_err(|e| {
        debug!(error = %e, chars = body.len(), "Structured payload rejected");
        PayloadError::Invalid(e.to_string())
    })
}

/// Like [`extract_structured_payload`], deserializing into `T`.
pub fn extract_as<T: DeserializeOwned>(text: &str) -> Result<T, PayloadError> {
    let value = extract_structured_payload(text)?;
    serde_json::from_value(value).map_err(|e| PayloadError::Invalid(e.to_string()))
}

/// Locate the raw payload text without parsing it.
fn payload_body(text: &str) -> Result<&str, PayloadError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(PayloadError::Empty);
    }

    let Some(open) = trimmed.find(FENCE) else {
        return Ok(trimmed);
    };

    let after_open = &trimmed[open + FENCE.len()..];
    let content = skip_info_string(after_open);

    let close = content.find(FENCE).ok_or(PayloadError::UnterminatedFence)?;
    let body = content[..close].trim();
    if body.is_empty() {
        return Err(PayloadError::Empty);
    }
    Ok(body)
}

/// Drop a leading info string ("json", "JSON", ...) from fenced content.
///
/// The tag only counts when whitespace follows it, so a fence that opens
/// straight onto its payload keeps it.
fn skip_info_string(after_open: &str) -> &str {
    let tag_len = after_open
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(after_open.len());
    let rest = &after_open[tag_len..];
    if tag_len == 0 || rest.starts_with(char::is_whitespace) {
        rest
    } else {
        after_open
    }
}
