//! Turns the latest environment observation into a transient context message.

use turnstile_core::error::EnrichError;
use turnstile_core::executor::ImageUrl;
use turnstile_core::{ContentPart, ContextMessage, Message};

/// Prefix of the text part describing the observed state.
pub const STATE_PREAMBLE: &str = "The following is the current state of the browser:\n";

/// Fields that may carry the image payload, in priority order.
pub const PAYLOAD_KEYS: &[&str] = &["screenshot_base64", "image", "image_base64"];

/// Image-shaped fields removed from the residual state (payload keys included).
pub const STRIPPED_KEYS: &[&str] = &[
    "screenshot_base64",
    "image",
    "image_base64",
    "screenshot_url",
    "screenshot_url_base64",
    "image_url",
];

const IMAGE_PLACEHOLDER: &str = "[image omitted]";

/// Builds context messages from observations.
pub struct ContextEnricher;

impl ContextEnricher {
    /// Build the context message for `observation`.
    ///
    /// Returns `Ok(None)` when the observation holds neither state nor an
    /// image.
    pub fn build(observation: &Message) -> Result<Option<ContextMessage>, EnrichError> {
        let state = parse_state(&observation.content)?;

        let payload = PAYLOAD_KEYS.iter().find_map(|key| {
            state
                .get(*key)
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        });

        let mut residual = serde_json::Value::Object(state);
        strip_image_fields(&mut residual);
        if let Some(payload) = &payload {
            redact_payload(&mut residual, payload);
        }

        let mut parts = Vec::new();

        if residual.as_object().is_some_and(|m| !m.is_empty()) {
            let text = serde_json::to_string(&residual)
                .map_err(|e| EnrichError::MalformedObservation(e.to_string()))?;
            parts.push(ContentPart::Text {
                text: format!("{STATE_PREAMBLE}{text}"),
            });
        }

        if let Some(payload) = payload {
            let url = if payload.starts_with("data:") {
                payload
            } else {
                format!("data:image/jpeg;base64,{payload}")
            };
            parts.push(ContentPart::ImageUrl {
                image_url: ImageUrl { url },
            });
        }

        if parts.is_empty() {
            return Ok(None);
        }

        Ok(Some(ContextMessage {
            role: "user".into(),
            content: parts,
        }))
    }
}

fn parse_state(
    content: &serde_json::Value,
) -> Result<serde_json::Map<String, serde_json::Value>, EnrichError> {
    let value = match content {
        serde_json::Value::String(raw) => serde_json::from_str(raw)
            .map_err(|e| EnrichError::MalformedObservation(e.to_string()))?,
        other => other.clone(),
    };
    match value {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(EnrichError::MalformedObservation(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

fn strip_image_fields(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            map.retain(|key, _| !STRIPPED_KEYS.contains(&key.as_str()));
            map.values_mut().for_each(strip_image_fields);
        }
        serde_json::Value::Array(items) => items.iter_mut().for_each(strip_image_fields),
        _ => {}
    }
}

/// Replace copies of the payload inside string values. Keys are left alone.
fn redact_payload(value: &mut serde_json::Value, payload: &str) {
    match value {
        serde_json::Value::String(s) if s.as_str() == payload => *s = IMAGE_PLACEHOLDER.to_string(),
        serde_json::Value::String(s) if s.contains(payload) => {
            *s = s.replace(payload, IMAGE_PLACEHOLDER);
        }
        serde_json::Value::Object(map) => {
            map.values_mut().for_each(|v| redact_payload(v, payload));
        }
        serde_json::Value::Array(items) => {
            items.iter_mut().for_each(|v| redact_payload(v, payload));
        }
        _ => {}
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
