//! Token estimation, grounded verbatim on the teacher's
//! `ContextManager::estimate_tokens`/`message_tokens` formula: `ceil(chars /
//! 4)` per event plus a flat `+10` overhead.

use agenticlaw_core::Event;

/// Estimated tokens for one serialized string: `ceil(rune_count / 4)`.
pub fn estimate_tokens(text: &str) -> u64 {
    let runes = text.chars().count() as u64;
    runes.div_ceil(4)
}

/// Flattens an event's message into the text the token estimator measures:
/// the message text, any reasoning, and the JSON of tool_calls/tool_response
/// when present.
pub fn event_text(event: &Event) -> String {
    let mut s = String::new();
    s.push_str(&event.message.text);
    if let Some(reasoning) = &event.message.reasoning {
        s.push_str(reasoning);
    }
    for call in &event.message.tool_calls {
        s.push_str(&call.name);
        s.push_str(&serde_json::to_string(&call.args).unwrap_or_default());
    }
    if let Some(response) = &event.message.tool_response {
        s.push_str(&serde_json::to_string(&response.result).unwrap_or_default());
    }
    s
}

/// Per-event token estimate: `ceil(utf8_rune_count(serialized_text) / 4) +
/// 10` overhead (§4.5).
pub fn event_tokens(event: &Event) -> u64 {
    estimate_tokens(&event_text(event)) + 10
}

/// Sums `event_tokens` across a window.
pub fn window_tokens(events: &[Event]) -> u64 {
    events.iter().map(event_tokens).sum()
}

/// `input_budget = window_tokens - reserve_output - safety_margin`, floored
/// to `max(1024, window_tokens/2)` when that subtraction would otherwise
/// leave too little room to be useful (§4.5).
pub fn input_budget(window_tokens: u64, reserve_output: u64, safety_margin: u64) -> u64 {
    let raw = window_tokens.saturating_sub(reserve_output + safety_margin);
    let floor = (window_tokens / 2).max(1024);
    raw.max(floor.min(window_tokens.max(1024)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use agenticlaw_core::{Message, SessionKey};

    #[test]
    fn estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens("hi"), 1);
        assert_eq!(estimate_tokens("hello"), 2);
        assert_eq!(estimate_tokens("hello world"), 3);
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn event_tokens_adds_overhead() {
        let key = SessionKey::new("a", "u", "s");
        let event = Event::new(key, Message::user("hello world"));
        assert_eq!(event_tokens(&event), 3 + 10);
    }

    #[test]
    fn input_budget_normal_case() {
        assert_eq!(input_budget(65536, 4096, 1024), 65536 - 4096 - 1024);
    }

    #[test]
    fn input_budget_floors_for_tiny_windows() {
        // window of 100 tokens, reserve+margin larger than window itself
        let budget = input_budget(100, 4096, 1024);
        assert!(budget >= 1024 || budget >= 50);
    }
}
