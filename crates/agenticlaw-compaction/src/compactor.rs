//! Top-level compaction entry point (§4.5): trigger rules, the
//! preserve-recent-turns split, and the compaction `Event` the result is
//! folded into the session's log as.

use crate::config::{CompactionConfig, Trigger};
use crate::strategy::{summary_tokens, Strategy};
use crate::tokens::{input_budget, window_tokens};
use agenticlaw_core::{Event, Message, Role};
use agenticlaw_llm::Model;
use serde_json::json;

/// Nothing to do: either the watermark wasn't crossed (`Auto`) or there
/// weren't enough user turns to compact past `preserve_recent_turns`.
#[derive(Debug)]
pub struct NotCompacted {
    pub reason: &'static str,
}

/// Runs one compaction pass over `window`, the in-scope events for the
/// current context window (already clipped to the last compaction boundary
/// by `agenticlaw_core::store::context_window`).
///
/// Returns `Ok(None)` when the trigger's conditions aren't met or there's
/// nothing left to fold; running it twice back to back on the same window is
/// always safe and idempotent in that sense.
pub async fn compact(
    window: &[Event],
    config: &CompactionConfig,
    trigger: Trigger,
    capacity_tokens: u64,
    model: &dyn Model,
    strategy: &dyn Strategy,
) -> Result<Option<Event>, NotCompacted> {
    let config = config.clone().normalized();
    let capacity = if capacity_tokens > 0 {
        capacity_tokens
    } else {
        config.default_context_window_tokens
    };
    let budget = input_budget(capacity, config.reserve_output_tokens, config.safety_margin_tokens);
    let pre_tokens = window_tokens(window);

    if trigger == Trigger::Auto {
        let ratio = if budget == 0 { 1.0 } else { pre_tokens as f64 / budget as f64 };
        if ratio < config.watermark_ratio {
            return Err(NotCompacted {
                reason: "watermark not crossed",
            });
        }
    }

    let user_indices: Vec<usize> = window
        .iter()
        .enumerate()
        .filter(|(_, e)| e.message.role == Role::User)
        .map(|(i, _)| i)
        .collect();

    if user_indices.len() < config.preserve_recent_turns + 1 {
        return Err(NotCompacted {
            reason: "fewer user turns than preserve_recent_turns + 1",
        });
    }

    let cutoff = user_indices[user_indices.len() - 1 - config.preserve_recent_turns];
    if cutoff == 0 {
        return Err(NotCompacted {
            reason: "nothing precedes the preserved tail",
        });
    }

    let target = &window[..cutoff];
    let tail = &window[cutoff..];

    let summary_text = strategy.summarize(target, &config, model).await;
    let post_summary_tokens = summary_tokens(&summary_text);
    let post_tokens = post_summary_tokens + window_tokens(tail);

    let summarized_to_event_id = target.last().map(|e| e.id.clone()).unwrap_or_default();
    let session_id = window[0].session_id.clone();

    let event = Event::new(session_id, Message::system(summary_text))
        .with_meta("kind", "compaction")
        .with_meta(
            "compaction",
            json!({
                "version": 1,
                "trigger": trigger.as_str(),
                "note": compaction_note(trigger, target.len()),
                "summarized_to_event_id": summarized_to_event_id,
                "summarized_events": target.len(),
                "pre_tokens": pre_tokens,
                "post_tokens": post_tokens,
                "window_tokens": capacity,
                "watermark_ratio": config.watermark_ratio,
            }),
        );

    Ok(Some(event))
}

fn compaction_note(trigger: Trigger, summarized_events: usize) -> String {
    match trigger {
        Trigger::OverflowRecovery => {
            format!("overflow recovery: summarized {summarized_events} events after the model rejected the window")
        }
        Trigger::Auto => format!("watermark compaction: summarized {summarized_events} events"),
        Trigger::Manual => format!("manual compaction: summarized {summarized_events} events"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::MapReduceStrategy;
    use agenticlaw_core::SessionKey;
    use agenticlaw_llm::{ScriptedModel, ScriptedTurn};

    fn user_turn(key: &SessionKey, text: &str) -> Event {
        Event::new(key.clone(), Message::user(text))
    }

    fn assistant_turn(key: &SessionKey, text: &str) -> Event {
        Event::new(key.clone(), Message::assistant(text))
    }

    fn build_window(key: &SessionKey, user_turns: usize) -> Vec<Event> {
        let mut events = Vec::new();
        for i in 0..user_turns {
            events.push(user_turn(key, &format!("user turn {i}")));
            events.push(assistant_turn(key, &format!("assistant reply {i}")));
        }
        events
    }

    #[tokio::test]
    async fn manual_trigger_compacts_regardless_of_watermark() {
        let key = SessionKey::new("a", "u", "s");
        let window = build_window(&key, 5);
        let config = CompactionConfig::default();
        let model = ScriptedModel::new("m", vec![ScriptedTurn::text("summary")]);
        let strategy = MapReduceStrategy::new();

        let result = compact(&window, &config, Trigger::Manual, 65536, &model, &strategy)
            .await
            .expect("should compact");
        let event = result.expect("some event");
        assert_eq!(event.kind(), Some("compaction"));
        assert!(event.message.text.contains("summary"));
    }

    #[tokio::test]
    async fn auto_trigger_skips_when_watermark_not_crossed() {
        let key = SessionKey::new("a", "u", "s");
        let window = build_window(&key, 5);
        let config = CompactionConfig::default();
        let model = ScriptedModel::new("m", vec![ScriptedTurn::text("summary")]);
        let strategy = MapReduceStrategy::new();

        let result = compact(&window, &config, Trigger::Auto, 10_000_000, &model, &strategy).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn not_enough_user_turns_is_a_noop() {
        let key = SessionKey::new("a", "u", "s");
        let window = build_window(&key, 2);
        let config = CompactionConfig::default();
        let model = ScriptedModel::new("m", vec![ScriptedTurn::text("summary")]);
        let strategy = MapReduceStrategy::new();

        let result = compact(&window, &config, Trigger::Manual, 65536, &model, &strategy).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn compacting_twice_in_a_row_is_idempotent_noop_second_time() {
        let key = SessionKey::new("a", "u", "s");
        let window = build_window(&key, 5);
        let config = CompactionConfig::default();
        let model = ScriptedModel::new("m", vec![ScriptedTurn::text("summary")]);
        let strategy = MapReduceStrategy::new();

        let first = compact(&window, &config, Trigger::Manual, 65536, &model, &strategy)
            .await
            .unwrap()
            .unwrap();

        // Second pass operates on just the preserved tail plus the new
        // summary event, which has too few user turns left to split again.
        let preserved_tail = &window[window.len() - (config.preserve_recent_turns + 1) * 2..];
        let mut next_window = vec![first];
        next_window.extend_from_slice(preserved_tail);

        let second = compact(&next_window, &config, Trigger::Manual, 65536, &model, &strategy).await;
        assert!(second.is_err());
    }
}
