//! The map-reduce summarization strategy (§4.5): the pluggable seam is the
//! `Strategy` trait; `MapReduceStrategy` is the contract's built-in default.

use crate::config::CompactionConfig;
use crate::tokens::{estimate_tokens, event_text, event_tokens};
use agenticlaw_core::{Error, Event};
use agenticlaw_llm::{GenerateRequest, Model};
use async_trait::async_trait;
use futures::StreamExt;

const MAP_SYSTEM_PROMPT: &str = "produce a concise structured summary covering goals, constraints, key facts, completed actions, pending tasks, and important artifacts";
const MERGE_SYSTEM_PROMPT: &str = "merge the following summaries of consecutive conversation segments into one concise structured summary, preserving goals, constraints, key facts, completed actions, pending tasks, and important artifacts";

const FALLBACK_HEADER: &str = "Fallback summary (heuristic, model compaction degraded)";
const FALLBACK_MAX_LINES: usize = 24;

/// Pluggable summarization policy. Implementations must always return a
/// summary, even a degraded one, rather than propagate an error: a failed
/// compaction would otherwise strand the run.
#[async_trait]
pub trait Strategy: Send + Sync {
    async fn summarize(&self, target: &[Event], config: &CompactionConfig, model: &dyn Model) -> String;
}

/// Splits `target` into chunks, summarizes each with `model`, merges
/// multiple chunk summaries with a second model call, and falls back to a
/// heuristic clip-the-tail summary when the model keeps overflowing.
#[derive(Default)]
pub struct MapReduceStrategy;

impl MapReduceStrategy {
    pub fn new() -> Self {
        Self
    }

    fn chunk(target: &[Event], chunk_budget: u64) -> Vec<Vec<Event>> {
        let mut chunks = Vec::new();
        let mut current: Vec<Event> = Vec::new();
        let mut current_tokens = 0u64;
        for event in target {
            let t = event_tokens(event);
            if !current.is_empty() && current_tokens + t > chunk_budget {
                chunks.push(std::mem::take(&mut current));
                current_tokens = 0;
            }
            current_tokens += t;
            current.push(event.clone());
        }
        if !current.is_empty() {
            chunks.push(current);
        }
        chunks
    }

    fn transcript(chunk: &[Event]) -> String {
        chunk
            .iter()
            .map(|e| format!("{:?}: {}", e.message.role, event_text(e)))
            .collect::<Vec<_>>()
            .join("\n")
    }

    async fn call_model(model: &dyn Model, system: &str, user: &str) -> Result<String, Error> {
        let messages = vec![
            agenticlaw_core::Message::system(system),
            agenticlaw_core::Message::user(user),
        ];
        let request = GenerateRequest::new(messages);
        let mut stream = model
            .generate(request, None)
            .await
            .map_err(|e| Error::model(e.to_string()))?;
        let mut text = String::new();
        while let Some(item) = stream.next().await {
            let response = item.map_err(|e| Error::model(e.to_string()))?;
            if response.partial {
                continue;
            }
            text.push_str(&response.message.text);
        }
        Ok(text)
    }

    fn fallback(target: &[Event]) -> String {
        let mut lines: Vec<String> = target
            .iter()
            .rev()
            .take(FALLBACK_MAX_LINES)
            .map(|e| {
                let text = event_text(e);
                let clipped: String = text.chars().take(160).collect();
                format!("{:?}: {}\u{2026}", e.message.role, clipped)
            })
            .collect();
        lines.reverse();
        format!("{FALLBACK_HEADER}\n\n{}", lines.join("\n"))
    }
}

#[async_trait]
impl Strategy for MapReduceStrategy {
    async fn summarize(&self, target: &[Event], config: &CompactionConfig, model: &dyn Model) -> String {
        let mut chunk_budget = config.summary_chunk_tokens;
        let mut attempts = 0u32;

        loop {
            let chunks = Self::chunk(target, chunk_budget);
            let mut summaries = Vec::with_capacity(chunks.len());
            let mut overflowed = false;

            for chunk in &chunks {
                let transcript = Self::transcript(chunk);
                match Self::call_model(model, MAP_SYSTEM_PROMPT, &transcript).await {
                    Ok(summary) => summaries.push(summary),
                    Err(e) if e.is_overflow() => {
                        overflowed = true;
                        break;
                    }
                    Err(_) => {
                        overflowed = true;
                        break;
                    }
                }
            }

            if !overflowed {
                if summaries.len() <= 1 {
                    return summaries.into_iter().next().unwrap_or_default();
                }
                let merge_input = summaries
                    .iter()
                    .enumerate()
                    .map(|(i, s)| format!("Segment {}:\n{}", i + 1, s))
                    .collect::<Vec<_>>()
                    .join("\n\n");
                match Self::call_model(model, MERGE_SYSTEM_PROMPT, &merge_input).await {
                    Ok(merged) => return merged,
                    Err(_) => overflowed = true,
                }
            }

            if overflowed {
                attempts += 1;
                if attempts > config.max_model_summary_retries {
                    tracing::warn!(
                        attempts,
                        "compaction model summarization exhausted retries, falling back to heuristic summary"
                    );
                    return Self::fallback(target);
                }
                chunk_budget = (chunk_budget / 2).max(256);
            }
        }
    }
}

/// Token count of a finished summary string, for the `post_tokens` field.
pub fn summary_tokens(summary: &str) -> u64 {
    estimate_tokens(summary) + 10
}
