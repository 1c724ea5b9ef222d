//! Booking details extracted from a conversation.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use cb_api::{ChatCompletion, ChatCompletionRequest, WireMessage};
use cb_core::config::LlmConfig;
use cb_core::constants::role;
use cb_models::{Addon, ChatMessage};

use super::prompt;
use crate::pricing::is_blank;

/// Keys the extractor may fill, in prompt order.
pub const SUMMARY_KEYS: &[&str] = &[
    "firstName",
    "lastName",
    "email",
    "phoneNumber",
    "address1",
    "city",
    "state",
    "zipCode",
    "squareFeet",
    "bedrooms",
    "bathrooms",
    "serviceType",
    "appointmentDateTime",
    "additionalNotes",
    "detailSummary",
];

/// Every known key with an empty value.
pub fn default_summary() -> Value {
    let mut map = Map::new();
    for key in SUMMARY_KEYS {
        map.insert((*key).to_string(), Value::String(String::new()));
    }
    for addon in Addon::ALL {
        map.insert(addon.summary_key().to_string(), Value::String(String::new()));
    }
    Value::Object(map)
}

fn is_known_key(key: &str) -> bool {
    SUMMARY_KEYS.contains(&key) || Addon::ALL.iter().any(|a| a.summary_key() == key)
}

/// Copy known, non-empty keys of `extracted` into `base`.
pub fn merge_known(base: &mut Value, extracted: &Value) -> usize {
    let (Some(target), Some(source)) = (base.as_object_mut(), extracted.as_object()) else {
        return 0;
    };
    let mut merged = 0;
    for (key, value) in source {
        if is_known_key(key) && !is_blank(Some(value)) {
            target.insert(key.clone(), value.clone());
            merged += 1;
        }
    }
    merged
}

/// Fold a fresh extraction into a stored summary. Stored keys the
/// extractor does not know about (such as `bookingId`) are kept, and blank
/// extracted values never erase stored ones.
pub fn merge_into_stored(stored: &mut Value, fresh: &Value) {
    if !stored.is_object() {
        *stored = Value::Object(Map::new());
    }
    let (Some(target), Some(source)) = (stored.as_object_mut(), fresh.as_object()) else {
        return;
    };
    for (key, value) in source {
        if !is_blank(Some(value)) || !target.contains_key(key) {
            target.insert(key.clone(), value.clone());
        }
    }
}

/// The user and assistant turns with text.
pub fn conversation_turns(messages: &[ChatMessage]) -> Vec<&ChatMessage> {
    messages
        .iter()
        .filter(|m| (m.role == role::USER || m.role == role::ASSISTANT) && !m.message.trim().is_empty())
        .collect()
}

/// `Customer:` / `Agent:` transcript, one line per turn.
pub fn transcript(turns: &[&ChatMessage]) -> String {
    let mut out = String::new();
    for m in turns {
        let speaker = if m.role == role::USER { "Customer" } else { "Agent" };
        out.push_str(speaker);
        out.push_str(": ");
        out.push_str(&m.message);
        out.push('\n');
    }
    out
}

/// Models sometimes wrap JSON in a markdown fence.
fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    text.strip_suffix("```").unwrap_or(text).trim()
}

/// Parse an extraction reply onto the default summary.
pub fn summary_from_reply(reply: &str) -> Value {
    let mut summary = default_summary();
    match serde_json::from_str::<Value>(strip_code_fence(reply)) {
        Ok(extracted) => {
            let merged = merge_known(&mut summary, &extracted);
            debug!("extracted {merged} summary fields");
        }
        Err(e) => warn!("summary extraction returned invalid JSON: {e}"),
    }
    summary
}

/// Ask the model for the booking details in a conversation.
///
/// Conversations with fewer than two turns, failed calls and unparseable
/// replies all yield the default summary.
pub async fn extract_conversation_summary(
    llm: &dyn ChatCompletion,
    config: &LlmConfig,
    messages: &[ChatMessage],
) -> Value {
    let turns = conversation_turns(messages);
    if turns.len() < 2 {
        debug!("conversation too short to summarize: {} turns", turns.len());
        return default_summary();
    }

    let request = ChatCompletionRequest::new(
        &config.model,
        vec![
            WireMessage::system(prompt::summary_extraction_prompt()),
            WireMessage::user(transcript(&turns)),
        ],
    )
    .with_temperature(config.summary_temperature)
    .with_max_tokens(config.summary_max_tokens)
    .with_json_output();

    match llm.complete(&request).await {
        Ok(resp) => match resp.first_message().and_then(|m| m.content.as_deref()) {
            Some(content) => summary_from_reply(content),
            None => {
                warn!("summary extraction returned no content");
                default_summary()
            }
        },
        Err(e) => {
            warn!("summary extraction failed: {e}");
            default_summary()
        }
    }
}
