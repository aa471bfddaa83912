//! Recovery projection (component F, §4.6): when a run is interrupted
//! between "assistant requested tool X" and "tool X responded", the next
//! run must not present a half-open state to the model. This module
//! synthesizes a closing tool event for every tool_call left dangling in
//! the current context window.

use agenticlaw_core::{Event, Message, ToolResponse};
use serde_json::json;
use std::collections::HashMap;

/// One dangling tool_call, found while scanning the window.
struct Pending {
    origin_index: usize,
    name: String,
    args: HashMap<String, serde_json::Value>,
}

/// Scans `window` (already clipped to the current context window, i.e. from
/// the most recent compaction point onward) for tool_calls with no matching
/// tool_response, and returns one recovery `Event` per dangling call, sorted
/// by originating event index then tool_call id as the contract requires.
/// Dangling calls from before the window's start are out of scope by
/// construction: the window itself already excludes them.
pub fn recovery_events(window: &[Event]) -> Vec<Event> {
    let mut pending: HashMap<String, Pending> = HashMap::new();

    for (index, event) in window.iter().enumerate() {
        for call in &event.message.tool_calls {
            if call.id.is_empty() || call.name.is_empty() {
                continue;
            }
            pending.insert(
                call.id.clone(),
                Pending {
                    origin_index: index,
                    name: call.name.clone(),
                    args: call.args.clone(),
                },
            );
        }
        if let Some(response) = &event.message.tool_response {
            pending.remove(&response.id);
        }
    }

    let mut dangling: Vec<(String, Pending)> = pending.into_iter().collect();
    dangling.sort_by(|(id_a, a), (id_b, b)| {
        a.origin_index.cmp(&b.origin_index).then_with(|| id_a.cmp(id_b))
    });

    let session_id = match window.first() {
        Some(e) => e.session_id.clone(),
        None => return Vec::new(),
    };

    dangling
        .into_iter()
        .map(|(id, p)| {
            let mut result = HashMap::new();
            result.insert(
                "error".to_string(),
                json!("tool call interrupted before completion"),
            );
            result.insert("interrupted".to_string(), json!(true));
            let response = ToolResponse {
                id: id.clone(),
                name: p.name.clone(),
                result,
            };
            Event::new(session_id.clone(), Message::tool_response(response))
                .with_meta("kind", "recovery")
                .with_meta(
                    "recovery",
                    json!({
                        "tool_call_id": id,
                        "name": p.name,
                        "args": p.args,
                    }),
                )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use agenticlaw_core::{SessionKey, ToolCall};

    fn key() -> SessionKey {
        SessionKey::new("app", "user", "s1")
    }

    fn assistant_with_call(id: &str, name: &str) -> Event {
        Event::new(
            key(),
            Message::assistant_with_tool_calls(
                "",
                vec![ToolCall {
                    id: id.to_string(),
                    name: name.to_string(),
                    args: HashMap::new(),
                }],
            ),
        )
    }

    fn tool_response_event(id: &str, name: &str) -> Event {
        Event::new(
            key(),
            Message::tool_response(ToolResponse {
                id: id.to_string(),
                name: name.to_string(),
                result: HashMap::new(),
            }),
        )
    }

    #[test]
    fn no_dangling_calls_produces_nothing() {
        let window = vec![assistant_with_call("1", "READ"), tool_response_event("1", "READ")];
        assert!(recovery_events(&window).is_empty());
    }

    #[test]
    fn a_dangling_call_produces_one_recovery_event() {
        let window = vec![assistant_with_call("1", "READ")];
        let recovered = recovery_events(&window);
        assert_eq!(recovered.len(), 1);
        assert_eq!(recovered[0].kind(), Some("recovery"));
        let response = recovered[0].message.tool_response.as_ref().unwrap();
        assert_eq!(response.id, "1");
        assert_eq!(response.result.get("interrupted"), Some(&json!(true)));
    }

    #[test]
    fn multiple_dangling_calls_are_ordered_by_origin_then_id() {
        let window = vec![
            assistant_with_call("b", "READ"),
            assistant_with_call("a", "READ"),
        ];
        let recovered = recovery_events(&window);
        assert_eq!(recovered.len(), 2);
        let ids: Vec<&str> = recovered
            .iter()
            .map(|e| e.message.tool_response.as_ref().unwrap().id.as_str())
            .collect();
        // Both calls originate from the same event index (0), so id ordering
        // breaks the tie: "a" before "b".
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn calls_with_missing_id_or_name_are_skipped() {
        let window = vec![Event::new(
            key(),
            Message::assistant_with_tool_calls(
                "",
                vec![ToolCall {
                    id: String::new(),
                    name: "READ".into(),
                    args: HashMap::new(),
                }],
            ),
        )];
        assert!(recovery_events(&window).is_empty());
    }
}
