//! Model-visibility sanitization (§4.2 step 1).
//!
//! Tool results may carry UI/telemetry channels a host application wants in
//! the persisted event (so a web UI can render a progress bar, say) but that
//! must never be replayed back into the model's own context. Any key
//! starting with `_ui_`, and any key exactly equal to `metadata`, is
//! stripped recursively before a `ToolResponse::result` is turned into model
//! input. Nothing else about the conversation is touched.

use agenticlaw_core::{Message, ToolResponse};
use serde_json::Value;
use std::collections::HashMap;

const UI_PREFIX: &str = "_ui_";
const METADATA_KEY: &str = "metadata";

fn should_strip(key: &str) -> bool {
    key.starts_with(UI_PREFIX) || key == METADATA_KEY
}

/// Recursively strips UI/telemetry keys from a JSON value. Recurses into
/// object values and array elements; scalars pass through unchanged.
pub fn sanitize_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (k, v) in map {
                if should_strip(k) {
                    continue;
                }
                out.insert(k.clone(), sanitize_value(v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sanitize_value).collect()),
        other => other.clone(),
    }
}

/// Sanitizes a `ToolResponse::result` map for model visibility. The map
/// itself is the top nesting level, so its own `_ui_*`/`metadata` keys are
/// stripped, in addition to anything nested inside surviving values.
pub fn sanitize_result(result: &HashMap<String, Value>) -> HashMap<String, Value> {
    result
        .iter()
        .filter(|(k, _)| !should_strip(k))
        .map(|(k, v)| (k.clone(), sanitize_value(v)))
        .collect()
}

/// Produces the model-visible copy of a message: tool responses have their
/// result map sanitized; everything else (text, reasoning, tool_calls) is
/// copied through unchanged, since only tool output carries host-defined
/// UI/telemetry channels.
pub fn sanitize_message(message: &Message) -> Message {
    let mut sanitized = message.clone();
    if let Some(response) = &message.tool_response {
        sanitized.tool_response = Some(ToolResponse {
            id: response.id.clone(),
            name: response.name.clone(),
            result: sanitize_result(&response.result),
        });
    }
    sanitized
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result_with(pairs: Vec<(&str, Value)>) -> HashMap<String, Value> {
        pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    #[test]
    fn strips_ui_prefixed_keys_at_top_level() {
        let result = result_with(vec![
            ("output", json!("hello")),
            ("_ui_progress", json!(0.5)),
        ]);
        let sanitized = sanitize_result(&result);
        assert!(!sanitized.contains_key("_ui_progress"));
        assert!(sanitized.contains_key("output"));
    }

    #[test]
    fn strips_metadata_key_exactly() {
        let result = result_with(vec![
            ("metadata", json!({"error_code": "X"})),
            ("metadatapointer", json!("kept")),
        ]);
        let sanitized = sanitize_result(&result);
        assert!(!sanitized.contains_key("metadata"));
        assert!(sanitized.contains_key("metadatapointer"));
    }

    #[test]
    fn strips_recursively_through_nested_objects_and_arrays() {
        let nested = json!({
            "items": [
                {"ok": true, "_ui_hint": "spinner"},
                {"metadata": {"trace": "abc"}, "value": 1}
            ]
        });
        let result = result_with(vec![("payload", nested)]);
        let sanitized = sanitize_result(&result);
        let payload = &sanitized["payload"];
        let items = payload["items"].as_array().unwrap();
        assert!(items[0].get("_ui_hint").is_none());
        assert!(items[0].get("ok").is_some());
        assert!(items[1].get("metadata").is_none());
        assert!(items[1].get("value").is_some());
    }

    #[test]
    fn sanitization_is_idempotent() {
        let result = result_with(vec![
            ("output", json!("hello")),
            ("_ui_progress", json!(0.5)),
            ("metadata", json!({"a": 1})),
        ]);
        let once = sanitize_result(&result);
        let twice = sanitize_result(&once);
        assert_eq!(once, twice);
    }
}
