//! The agent loop (component G, §4.2): the single-turn-then-tool-calls cycle
//! that drives one session's conversation forward given a projected context
//! window. Produces a lazy `Event` sequence so a caller can persist and
//! forward each event as it's produced rather than waiting for the whole
//! turn to finish.

use crate::invocation::{AgentEventStream, InvocationContext, DECISION_CONTEXT_KEY};
use crate::sanitize::sanitize_message;
use agenticlaw_core::error::codes;
use agenticlaw_core::{Effect, Error, Event, Message, ToolCall, ToolResponse};
use agenticlaw_llm::{GenerateRequest, ModelError};
use agenticlaw_policy::{ModelInput, Output, ToolInput, ToolOutput};
use agenticlaw_tools::truncate_output;
use async_stream::try_stream;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Maximum number of model-call retries after an empty-partial failure,
/// before the loop gives up and surfaces the error (§4.2 step 2).
const MAX_MODEL_RETRIES: u32 = 5;
const BASE_BACKOFF_MS: u64 = 250;
const MAX_BACKOFF_MS: u64 = 4_000;

/// A tool call is treated as a runaway repeat on its third occurrence with
/// an identical canonical signature within one run (§4.2 step 7).
const DUPLICATE_CALL_THRESHOLD: u32 = 3;

/// Canonical signature used by the duplicate-call guard: the tool name plus
/// the JSON-encoded args with keys in sorted order. `serde_json::Value`'s
/// object representation is a `BTreeMap` (this workspace never enables the
/// `preserve_order` feature), so routing the args through `Value` before
/// re-serializing gets sorted keys for free.
fn call_signature(call: &ToolCall) -> Result<String, Error> {
    let value = serde_json::to_value(&call.args)?;
    Ok(format!("{}:{}", call.name, serde_json::to_string(&value)?))
}

fn backoff_delay(attempt: u32) -> Duration {
    let ms = BASE_BACKOFF_MS.saturating_mul(1u64 << attempt.min(16)).min(MAX_BACKOFF_MS);
    Duration::from_millis(ms)
}

async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> Result<(), Error> {
    tokio::select! {
        _ = tokio::time::sleep(duration) => Ok(()),
        _ = cancel.cancelled() => Err(Error::Cancelled),
    }
}

fn build_messages(system_prompt: Option<&str>, history: &[Event]) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    if let Some(prompt) = system_prompt {
        if !prompt.is_empty() {
            messages.push(Message::system(prompt));
        }
    }
    messages.extend(history.iter().map(|event| sanitize_message(&event.message)));
    messages
}

fn error_result(message: impl Into<String>) -> HashMap<String, Value> {
    let mut result = HashMap::new();
    result.insert("error".to_string(), json!(message.into()));
    result
}

/// Runs the agent loop for one `Run` invocation: repeatedly calls the model,
/// executes whatever tool calls it requests, and feeds the tool results back
/// in until the model produces a turn with no tool calls, a policy hook
/// denies going further, or an unrecoverable error occurs. `history` is the
/// already-sanitized-of-lifecycle-events context window; the caller (the
/// runtime orchestrator) is responsible for persisting every event yielded
/// here before it is lost.
pub fn agent_loop(ctx: InvocationContext, history: Vec<Event>) -> AgentEventStream {
    Box::pin(try_stream! {
        let mut history = history;
        let mut call_counts: HashMap<String, u32> = HashMap::new();

        'turns: loop {
            if ctx.cancel.is_cancelled() {
                Err(Error::Cancelled)?;
            }

            let model_input = ctx
                .policies
                .run_before_model(ModelInput {
                    messages: build_messages(ctx.system_prompt.as_deref(), &history),
                    tool_declarations: ctx.tools.llm_declarations(),
                })
                .await?;

            let request = GenerateRequest::new(model_input.messages)
                .with_tools(model_input.tool_declarations);

            let mut saw_partial = false;
            let mut attempt: u32 = 0;
            let mut final_message: Option<Message> = None;
            let mut provider = String::new();
            let mut model_name = String::new();
            let mut usage = None;

            'attempts: loop {
                let mut stream = match ctx.model.generate(request.clone(), Some(ctx.cancel.clone())).await {
                    Ok(stream) => stream,
                    Err(e) => {
                        if saw_partial || attempt >= MAX_MODEL_RETRIES || matches!(e, ModelError::Cancelled) {
                            Err(Error::model(format!(
                                "model request failed after {attempt} retries: {e}"
                            )))?;
                        }
                        attempt += 1;
                        sleep_or_cancel(backoff_delay(attempt), &ctx.cancel).await?;
                        continue 'attempts;
                    }
                };

                let mut stream_failure: Option<ModelError> = None;
                loop {
                    tokio::select! {
                        biased;
                        _ = ctx.cancel.cancelled() => {
                            Err(Error::Cancelled)?;
                        }
                        next = futures::StreamExt::next(&mut stream) => {
                            match next {
                                None => break,
                                Some(Ok(response)) => {
                                    if response.partial {
                                        saw_partial = true;
                                        let has_content = !response.message.text.is_empty()
                                            || response.message.reasoning.is_some();
                                        if ctx.emit_partial_events && has_content {
                                            let partial_event = Event::new(ctx.session_id.clone(), response.message.clone())
                                                .with_meta("partial", true);
                                            yield partial_event;
                                        }
                                        continue;
                                    }
                                    final_message = Some(response.message.clone());
                                    usage = response.usage;
                                    provider = response.provider.clone();
                                    model_name = response.model.clone();
                                    if response.turn_complete {
                                        break;
                                    }
                                }
                                Some(Err(e)) => {
                                    stream_failure = Some(e);
                                    break;
                                }
                            }
                        }
                    }
                }

                if let Some(e) = stream_failure {
                    if saw_partial || attempt >= MAX_MODEL_RETRIES || matches!(e, ModelError::Cancelled) {
                        Err(Error::model(format!(
                            "model request failed after {attempt} retries: {e}"
                        )))?;
                    }
                    attempt += 1;
                    sleep_or_cancel(backoff_delay(attempt), &ctx.cancel).await?;
                    continue 'attempts;
                }

                break 'attempts;
            }

            let message = final_message
                .ok_or_else(|| Error::model("model produced no final response for this turn"))?;

            let output = ctx
                .policies
                .run_before_output(Output { message })
                .await?;

            let mut assistant_event = Event::new(ctx.session_id.clone(), output.message.clone());
            if !provider.is_empty() {
                assistant_event = assistant_event.with_meta("provider", provider.clone());
            }
            if !model_name.is_empty() {
                assistant_event = assistant_event.with_meta("model", model_name.clone());
            }
            if let Some(usage) = usage {
                assistant_event = assistant_event.with_meta("usage", serde_json::to_value(usage)?);
            }
            yield assistant_event.clone();
            history.push(assistant_event);

            if output.message.tool_calls.is_empty() {
                break 'turns;
            }

            for call in &output.message.tool_calls {
                if ctx.cancel.is_cancelled() {
                    Err(Error::Cancelled)?;
                }

                let signature = call_signature(call)?;
                let count = call_counts.entry(signature).or_insert(0);
                *count += 1;
                if *count >= DUPLICATE_CALL_THRESHOLD {
                    let response_event = Event::new(
                        ctx.session_id.clone(),
                        Message::tool_response(ToolResponse {
                            id: call.id.clone(),
                            name: call.name.clone(),
                            result: error_result("duplicate tool call detected"),
                        }),
                    )
                    .with_meta("kind", "duplicate_guard");
                    yield response_event.clone();
                    history.push(response_event);
                    break 'turns;
                }

                let capability = ctx
                    .tools
                    .get(&call.name)
                    .map(|tool| tool.capability())
                    .unwrap_or_default();

                let tool_input = ctx
                    .policies
                    .run_before_tool(ToolInput {
                        call: call.clone(),
                        capability: capability.clone(),
                        decision: agenticlaw_core::Decision::allow(),
                    })
                    .await?;

                if tool_input.decision.effect == Effect::Deny {
                    let response_event = Event::new(
                        ctx.session_id.clone(),
                        Message::tool_response(ToolResponse {
                            id: call.id.clone(),
                            name: call.name.clone(),
                            result: error_result(tool_input.decision.reason.clone()),
                        }),
                    );
                    yield response_event.clone();
                    history.push(response_event);
                    continue;
                }

                let mut args_value = serde_json::to_value(&call.args)?;
                if let Value::Object(map) = &mut args_value {
                    map.insert(
                        DECISION_CONTEXT_KEY.to_string(),
                        serde_json::to_value(&tool_input.decision)?,
                    );
                }

                let run_outcome = ctx
                    .tools
                    .run_cancellable(&call.name, args_value, ctx.cancel.clone())
                    .await;

                let (result, err) = match run_outcome {
                    Ok(tool_result) if !tool_result.is_error() => {
                        let mut result = HashMap::new();
                        result.insert(
                            "output".to_string(),
                            json!(truncate_output(&tool_result.to_content_string())),
                        );
                        (result, None)
                    }
                    Ok(tool_result) => {
                        let message = tool_result.to_content_string();
                        (error_result(message.clone()), Some(message))
                    }
                    Err(e) => {
                        if matches!(e.error_code(), Some(code) if code == codes::APPROVAL_REQUIRED || code == codes::APPROVAL_ABORTED)
                        {
                            Err(e)?;
                        }
                        let message = e.to_string();
                        let mut result = error_result(message.clone());
                        if let Some(code) = e.error_code() {
                            result.insert(
                                "metadata".to_string(),
                                json!({ "error_code": code }),
                            );
                        }
                        (result, Some(message))
                    }
                };

                let tool_output = ctx
                    .policies
                    .run_after_tool(ToolOutput {
                        call: call.clone(),
                        capability,
                        decision: tool_input.decision,
                        result: Some(result.clone()),
                        err,
                    })
                    .await?;

                let response_event = Event::new(
                    ctx.session_id.clone(),
                    Message::tool_response(ToolResponse {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        result: tool_output.result.unwrap_or(result),
                    }),
                );
                yield response_event.clone();
                history.push(response_event);
            }
        }
    })
}
