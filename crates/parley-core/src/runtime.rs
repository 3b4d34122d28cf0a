// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The provider-agnostic chat loop.
//!
//! One `chat()` call drives a full interaction: render the system prompt,
//! build the message array, stream completions from the vendor driver,
//! reassemble tool calls, execute them through the tool chest, and loop
//! until the model halts.  Every observable step is raised as a
//! [`RuntimeEvent`] through the streaming callback.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::json;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use parley_config::{MnemonicSlug, ReasoningEffort, RootMessageRole};
use parley_model::{
    ChatMessage, CompletionRequest, FinishReason, MediaInput, ModelProvider, ProviderError,
    ResponseFragment, Role, ToolCall, ToolResult,
};
use parley_tools::{InferenceData, ToolChest, ToolContext};

use crate::chat_session::ChatSession;
use crate::defaults::{CancelFlag, RuntimeDefaults};
use crate::events::{EventBuilder, EventKind, EventSink, RuntimeEvent};
use crate::prompt::{PromptBuilder, PromptContext};

/// Everything one `chat()` call needs.
pub struct ChatRequest<'a> {
    pub chat_session: &'a mut ChatSession,
    pub tool_chest: Arc<ToolChest>,
    pub user_message: String,
    pub prompt_metadata: HashMap<String, serde_json::Value>,
    pub client_wants_cancel: CancelFlag,
    pub streaming_callback: Arc<dyn EventSink>,
    pub tool_context: ToolContext,
    pub prompt_builder: Option<PromptBuilder>,
    /// Toolset-contributed prompt sections, rendered after the configured
    /// ones.
    pub tool_sections: Vec<String>,
    /// Tool schemas + resolved toolset names for this turn, from
    /// [`ToolChest::get_inference_data`].  `None` means a tool-free turn.
    pub inference: Option<InferenceData>,
    /// Explicit message array.  When set, the session history is left
    /// untouched and this array is used (and returned) instead.
    pub messages: Option<Vec<ChatMessage>>,
    pub images: Vec<MediaInput>,
    pub audio_clips: Vec<MediaInput>,
    pub files: Vec<MediaInput>,
    pub temperature: Option<f32>,
    pub reasoning_effort: Option<ReasoningEffort>,
    pub budget_tokens: Option<u32>,
    pub max_tokens: Option<u32>,
    /// Emit a full `history` snapshot before the interaction closes.
    pub emit_history: bool,
}

impl<'a> ChatRequest<'a> {
    /// A minimal request: just a session, a sink, and the user's text.
    pub fn basic(
        chat_session: &'a mut ChatSession,
        user_message: impl Into<String>,
        streaming_callback: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            chat_session,
            tool_chest: Arc::new(ToolChest::new()),
            user_message: user_message.into(),
            prompt_metadata: HashMap::new(),
            client_wants_cancel: CancelFlag::new(),
            streaming_callback,
            tool_context: ToolContext::default(),
            prompt_builder: None,
            tool_sections: Vec::new(),
            inference: None,
            messages: None,
            images: Vec::new(),
            audio_clips: Vec::new(),
            files: Vec::new(),
            temperature: None,
            reasoning_effort: None,
            budget_tokens: None,
            max_tokens: None,
            emit_history: false,
        }
    }
}

/// Drives `chat()` calls against one vendor driver.
pub struct AgentRuntime {
    provider: Arc<dyn ModelProvider>,
    defaults: RuntimeDefaults,
    semaphore: Arc<Semaphore>,
}

impl AgentRuntime {
    pub fn new(provider: Arc<dyn ModelProvider>, defaults: RuntimeDefaults) -> Self {
        let semaphore = Arc::new(Semaphore::new(defaults.concurrency_limit));
        Self {
            provider,
            defaults,
            semaphore,
        }
    }

    pub fn provider(&self) -> &Arc<dyn ModelProvider> {
        &self.provider
    }

    /// Tool-schema dialect of the underlying driver.
    pub fn tool_format(&self) -> &str {
        self.provider.tool_format()
    }

    /// Text in, text out: run one interaction against an explicit message
    /// array (the session is untouched) and return the final assistant
    /// text.
    pub async fn one_shot(&self, mut req: ChatRequest<'_>) -> anyhow::Result<String> {
        req.messages = Some(req.messages.take().unwrap_or_default());
        let messages = self.chat(req).await?;
        Ok(messages
            .last()
            .filter(|m| m.role == Role::Assistant)
            .and_then(|m| m.as_text())
            .unwrap_or_default()
            .to_string())
    }

    /// Run several independent one-shot prompts concurrently, results in
    /// input order.  Each prompt is its own interaction; the shared
    /// semaphore still caps in-flight provider calls.
    pub async fn parallel_one_shots(
        &self,
        session: &ChatSession,
        inputs: &[String],
        sink: Arc<dyn EventSink>,
    ) -> anyhow::Result<Vec<String>> {
        let futures = inputs.iter().map(|input| {
            let mut scratch = session.clone();
            let sink = sink.clone();
            let input = input.clone();
            async move {
                let mut req = ChatRequest::basic(&mut scratch, input, sink);
                req.messages = Some(Vec::new());
                self.one_shot(req).await
            }
        });
        futures::future::try_join_all(futures).await
    }

    /// Execute one interaction.  Returns the final message array.  Raises
    /// only for non-retryable provider errors; everything else is recovered
    /// or reported through the event stream.
    pub async fn chat(&self, req: ChatRequest<'_>) -> anyhow::Result<Vec<ChatMessage>> {
        let ChatRequest {
            chat_session,
            tool_chest,
            user_message,
            prompt_metadata,
            client_wants_cancel,
            streaming_callback,
            tool_context,
            prompt_builder,
            tool_sections,
            inference,
            messages,
            images,
            audio_clips,
            files,
            temperature,
            reasoning_effort,
            budget_tokens,
            max_tokens,
            emit_history,
        } = req;

        let events = EventBuilder::new(chat_session.session_id.clone(), "assistant");
        let sink = streaming_callback;

        // Render the system prompt against the merged prompt context.
        let prompt_ctx = PromptContext::new(chat_session.agent_config.clone(), prompt_metadata);
        let sys_prompt = match &prompt_builder {
            Some(builder) => builder.render(&prompt_ctx, &tool_sections).await?,
            None => String::new(),
        };

        // Out-of-band signals precede the interaction bracket.
        raise(
            &sink,
            events.event_as(
                "user",
                EventKind::UserRequest {
                    data: json!({ "message": user_message }),
                },
            ),
        )
        .await;
        if !sys_prompt.is_empty() {
            raise(
                &sink,
                events.event_as("system", EventKind::SystemPrompt { content: sys_prompt.clone() }),
            )
            .await;
        }

        // Construct the working message array.
        let from_session = messages.is_none();
        let mut working = match messages {
            Some(m) => m,
            None => std::mem::take(&mut chat_session.messages),
        };
        if !sys_prompt.is_empty() {
            let root_role = match self.defaults.root_message_role {
                RootMessageRole::System => Role::System,
                RootMessageRole::Developer => Role::Developer,
            };
            ensure_root(&mut working, root_role, &sys_prompt);
        }
        if !images.is_empty() || !audio_clips.is_empty() || !files.is_empty() {
            working.push(self.provider.multimodal_user_message(
                &user_message,
                &images,
                &audio_clips,
                &files,
            ));
        } else {
            working.push(ChatMessage::user(&user_message));
        }

        debug!(
            message_count = working.len(),
            approx_tokens =
                parley_model::approx_conversation_tokens(&working, &*self.defaults.token_counter),
            "message array constructed"
        );

        let model_id = chat_session.agent_config.model_id.clone();
        let interaction_id = MnemonicSlug::generate(3);
        raise(
            &sink,
            events.event(EventKind::Interaction { started: true, id: interaction_id.clone() }),
        )
        .await;

        let loop_result = self
            .provider_loop(ProviderLoop {
                working: &mut working,
                model_id,
                tool_chest,
                tool_context,
                inference,
                temperature,
                reasoning_effort,
                budget_tokens,
                max_tokens,
                cancel: client_wants_cancel,
                sink: &sink,
                events: &events,
            })
            .await;

        if emit_history && loop_result.is_ok() {
            raise(&sink, events.event(EventKind::History { messages: working.clone() })).await;
        }
        raise(
            &sink,
            events.event(EventKind::Interaction { started: false, id: interaction_id }),
        )
        .await;

        if from_session {
            chat_session.messages = working.clone();
            chat_session.touch();
        }
        loop_result?;
        Ok(working)
    }

    /// The semaphore-guarded provider request loop with retry backoff.
    async fn provider_loop(&self, mut p: ProviderLoop<'_>) -> anyhow::Result<()> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| anyhow::anyhow!("runtime semaphore closed"))?;

        let mut delay = Duration::from_secs(1);
        loop {
            // Cooperative cancel between tool-call cycles / before a call.
            if p.cancel.is_set() {
                debug!("cancel observed before provider call");
                return Ok(());
            }

            let schemas = p
                .inference
                .as_ref()
                .map(|inf| {
                    inf.schemas
                        .iter()
                        .map(|s| parley_model::ToolSchema {
                            name: s.name.clone(),
                            description: s.description.clone(),
                            parameters: s.parameters.clone(),
                        })
                        .collect()
                })
                .unwrap_or_default();
            // Strip media the selected model cannot accept; sessions may
            // carry blocks accumulated under a different agent.
            let messages = parley_model::strip_unsupported_media(
                p.working.clone(),
                &self.provider.input_modalities(),
            );
            let request = CompletionRequest {
                model_id: p.model_id.clone(),
                messages,
                tools: schemas,
                temperature: p.temperature,
                reasoning_effort: p.reasoning_effort,
                budget_tokens: p.budget_tokens,
                max_tokens: p.max_tokens,
            };
            let options = request.sanitized();

            raise(
                p.sink,
                p.events.event(EventKind::Completion {
                    running: true,
                    completion_options: options.clone(),
                    stop_reason: None,
                }),
            )
            .await;

            let stream = match self.provider.complete(request).await {
                Ok(s) => s,
                Err(e) => {
                    raise(
                        p.sink,
                        p.events.event(EventKind::Completion {
                            running: false,
                            completion_options: options.clone(),
                            stop_reason: Some("error".into()),
                        }),
                    )
                    .await;
                    self.handle_provider_error(e, &mut delay, &mut p).await?;
                    continue;
                }
            };

            match self.consume_stream(stream, &mut p).await {
                StreamOutcome::Cancelled { text } => {
                    if !text.is_empty() {
                        p.working.push(ChatMessage::assistant(text));
                    }
                    raise(
                        p.sink,
                        p.events.event(EventKind::Completion {
                            running: false,
                            completion_options: options,
                            stop_reason: Some(FinishReason::Cancel.as_str().into()),
                        }),
                    )
                    .await;
                    return Ok(());
                }
                StreamOutcome::Failed(e) => {
                    raise(
                        p.sink,
                        p.events.event(EventKind::Completion {
                            running: false,
                            completion_options: options,
                            stop_reason: Some("error".into()),
                        }),
                    )
                    .await;
                    self.handle_provider_error(e, &mut delay, &mut p).await?;
                    continue;
                }
                StreamOutcome::ToolCalls { calls } => {
                    raise(
                        p.sink,
                        p.events.event(EventKind::Completion {
                            running: false,
                            completion_options: options,
                            stop_reason: Some(FinishReason::ToolCalls.as_str().into()),
                        }),
                    )
                    .await;
                    // Zero reassembled calls means an empty batch: no
                    // tool-call events, straight to the next completion.
                    if calls.is_empty() {
                        continue;
                    }
                    self.run_tool_cycle(calls, &mut p).await;
                    continue;
                }
                StreamOutcome::Finished { reason, text } => {
                    if !text.is_empty() {
                        p.working.push(ChatMessage::assistant(text));
                    }
                    let reason = reason.unwrap_or(FinishReason::Stop);
                    raise(
                        p.sink,
                        p.events.event(EventKind::Completion {
                            running: false,
                            completion_options: options,
                            stop_reason: Some(reason.as_str().to_string()),
                        }),
                    )
                    .await;
                    return Ok(());
                }
            }
        }
    }

    /// Backoff-or-propagate for a failed provider call.
    async fn handle_provider_error(
        &self,
        error: ProviderError,
        delay: &mut Duration,
        p: &mut ProviderLoop<'_>,
    ) -> anyhow::Result<()> {
        if !error.is_retryable() || *delay >= self.defaults.max_delay {
            raise(
                p.sink,
                p.events.system_error(
                    format!("Completion failed: {error}"),
                    Some("provider_error".into()),
                ),
            )
            .await;
            return Err(error.into());
        }
        let sleep_for = match &error {
            ProviderError::RateLimited { retry_after, .. } => *retry_after,
            _ => std::cmp::min(*delay * 2, self.defaults.max_delay),
        };
        raise(
            p.sink,
            p.events.event_as(
                "system",
                EventKind::SystemMessage {
                    severity: "warning".into(),
                    content: format!(
                        "An error occurred while streaming responses. {error}. \
                         Backing off {}s before retrying.",
                        sleep_for.as_secs()
                    ),
                    error_type: Some("provider_retry".into()),
                },
            ),
        )
        .await;
        tokio::time::sleep(sleep_for).await;
        *delay *= 2;
        Ok(())
    }

    /// Consume one completion stream into text, thoughts, and reassembled
    /// tool calls.
    async fn consume_stream(
        &self,
        mut stream: parley_model::FragmentStream,
        p: &mut ProviderLoop<'_>,
    ) -> StreamOutcome {
        let mut text_buf = String::new();
        let mut thought_buf = String::new();
        let mut pending: BTreeMap<u32, PendingToolCall> = BTreeMap::new();
        let mut stop_reason: Option<FinishReason> = None;

        while let Some(item) = stream.next().await {
            // Cooperative cancel between fragments; a cancel after the
            // stream closes is ignored.
            if p.cancel.is_set() {
                if !thought_buf.is_empty() {
                    raise(
                        p.sink,
                        p.events.event(EventKind::CompleteThought {
                            content: std::mem::take(&mut thought_buf),
                        }),
                    )
                    .await;
                }
                return StreamOutcome::Cancelled { text: text_buf };
            }
            match item {
                Ok(ResponseFragment::TextDelta(delta)) => {
                    if !thought_buf.is_empty() {
                        raise(
                            p.sink,
                            p.events.event(EventKind::CompleteThought {
                                content: std::mem::take(&mut thought_buf),
                            }),
                        )
                        .await;
                    }
                    text_buf.push_str(&delta);
                    raise(p.sink, p.events.event(EventKind::TextDelta { content: delta })).await;
                }
                Ok(ResponseFragment::ThoughtDelta(delta)) => {
                    thought_buf.push_str(&delta);
                    raise(p.sink, p.events.event(EventKind::ThoughtDelta { content: delta })).await;
                }
                Ok(ResponseFragment::ThoughtDone) => {
                    raise(
                        p.sink,
                        p.events.event(EventKind::CompleteThought {
                            content: std::mem::take(&mut thought_buf),
                        }),
                    )
                    .await;
                }
                Ok(ResponseFragment::ToolCallFragment { index, id, name, arguments }) => {
                    let slot = pending.entry(index).or_default();
                    if !id.is_empty() {
                        slot.id = id;
                    }
                    if !name.is_empty() {
                        slot.name = name;
                    }
                    slot.arguments.push_str(&arguments);
                    let snapshot: Vec<ToolCall> =
                        pending.values().map(PendingToolCall::snapshot).collect();
                    raise(
                        p.sink,
                        p.events.event(EventKind::ToolCallDelta { tool_calls: snapshot }),
                    )
                    .await;
                }
                Ok(ResponseFragment::Usage { input_tokens, output_tokens }) => {
                    debug!(input_tokens, output_tokens, "provider usage");
                }
                Ok(ResponseFragment::Finish(reason)) => {
                    if stop_reason.is_none() {
                        stop_reason = Some(reason);
                    }
                }
                Ok(ResponseFragment::Done) => break,
                Err(e) => return StreamOutcome::Failed(e),
            }
        }

        if !thought_buf.is_empty() {
            raise(
                p.sink,
                p.events.event(EventKind::CompleteThought { content: thought_buf }),
            )
            .await;
        }

        if stop_reason == Some(FinishReason::ToolCalls) {
            StreamOutcome::ToolCalls { calls: finish_pending(pending) }
        } else {
            StreamOutcome::Finished { reason: stop_reason, text: text_buf }
        }
    }

    /// One tool-call cycle: bracket events, concurrent execution, message
    /// appends in launch order.
    async fn run_tool_cycle(&self, calls: Vec<ToolCall>, p: &mut ProviderLoop<'_>) {
        raise(
            p.sink,
            p.events.event(EventKind::ToolCall {
                active: true,
                tool_calls: calls.clone(),
                tool_results: None,
            }),
        )
        .await;

        // Launch every call concurrently; results are joined in launch
        // order so the appended history is deterministic.
        let mut handles = Vec::with_capacity(calls.len());
        for call in calls.clone() {
            let chest = Arc::clone(&p.tool_chest);
            let ctx = p.tool_context.clone();
            handles.push(tokio::spawn(async move { execute_one(&chest, &call, &ctx).await }));
        }

        let mut results = Vec::with_capacity(calls.len());
        for (i, handle) in handles.into_iter().enumerate() {
            let content = match handle.await {
                Ok(content) => content,
                Err(e) => format!("Exception: tool task panicked: {e}"),
            };
            results.push(ToolResult {
                tool_call_id: calls[i].id.clone(),
                name: calls[i].name.clone(),
                content,
            });
        }

        raise(
            p.sink,
            p.events.event(EventKind::ToolCall {
                active: false,
                tool_calls: calls.clone(),
                tool_results: Some(results.clone()),
            }),
        )
        .await;

        let mut appended = Vec::with_capacity(1 + results.len());
        appended.push(ChatMessage::assistant_tool_calls(calls));
        for result in results {
            appended.push(ChatMessage::tool_result(result));
        }
        p.working.extend(appended.clone());
        raise(p.sink, p.events.event(EventKind::HistoryDelta { messages: appended })).await;
    }
}

struct ProviderLoop<'a> {
    working: &'a mut Vec<ChatMessage>,
    model_id: String,
    tool_chest: Arc<ToolChest>,
    tool_context: ToolContext,
    inference: Option<InferenceData>,
    temperature: Option<f32>,
    reasoning_effort: Option<ReasoningEffort>,
    budget_tokens: Option<u32>,
    max_tokens: Option<u32>,
    cancel: CancelFlag,
    sink: &'a Arc<dyn EventSink>,
    events: &'a EventBuilder,
}

enum StreamOutcome {
    Finished { reason: Option<FinishReason>, text: String },
    ToolCalls { calls: Vec<ToolCall> },
    Cancelled { text: String },
    Failed(ProviderError),
}

/// Decode arguments and dispatch one call.  Every failure becomes an
/// `"Exception: …"` tool message so the chat loop always continues.
async fn execute_one(chest: &ToolChest, call: &ToolCall, ctx: &ToolContext) -> String {
    let args: serde_json::Value = if call.arguments.trim().is_empty() {
        json!({})
    } else {
        match serde_json::from_str(&call.arguments) {
            Ok(v) => v,
            Err(e) => return format!("Exception: invalid tool arguments: {e}"),
        }
    };
    match chest.call_tool(&call.name, args, ctx).await {
        Ok(content) => content,
        Err(e) => format!("Exception: {e}"),
    }
}

/// Insert-or-rewrite the root message at index 0.
fn ensure_root(messages: &mut Vec<ChatMessage>, role: Role, content: &str) {
    match messages.first_mut() {
        Some(first) if matches!(first.role, Role::System | Role::Developer) => {
            let mut root = ChatMessage::system(content);
            root.role = role;
            *first = root;
        }
        _ => {
            let mut root = ChatMessage::system(content);
            root.role = role;
            messages.insert(0, root);
        }
    }
}

#[derive(Default)]
struct PendingToolCall {
    id: String,
    name: String,
    arguments: String,
}

impl PendingToolCall {
    fn snapshot(&self) -> ToolCall {
        ToolCall {
            id: self.id.clone(),
            name: self.name.clone(),
            arguments: self.arguments.clone(),
        }
    }
}

/// Flush accumulated fragments into dispatchable calls, ordered by
/// provider index.  Calls with no name cannot be dispatched and are
/// dropped; calls with no id get a synthetic one so the history stays
/// well-formed.
fn finish_pending(pending: BTreeMap<u32, PendingToolCall>) -> Vec<ToolCall> {
    let mut calls = Vec::with_capacity(pending.len());
    for (i, (_, slot)) in pending.into_iter().enumerate() {
        if slot.name.is_empty() {
            warn!(tool_call_id = %slot.id, "dropping tool call with empty name");
            continue;
        }
        let mut call = slot.snapshot();
        if call.id.is_empty() {
            call.id = format!("tc_synthetic_{i}");
            warn!(tool_name = %call.name, "tool call had empty id; generated synthetic id");
        }
        calls.push(call);
    }
    calls
}

/// Raise an event, containing callback failures so they can never abort the
/// chat loop.
async fn raise(sink: &Arc<dyn EventSink>, event: RuntimeEvent) {
    if let Err(e) = sink.raise(event).await {
        warn!(error = %e, "streaming callback failed");
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── Reassembly ────────────────────────────────────────────────────────────

    #[test]
    fn fragments_concatenate_arguments_in_order() {
        let mut pending: BTreeMap<u32, PendingToolCall> = BTreeMap::new();
        for (id, name, args) in [
            ("c1", "calculator-evaluate", "{\"ex"),
            ("", "", "pr\":"),
            ("", "", "\"2+2\"}"),
        ] {
            let slot = pending.entry(0).or_default();
            if !id.is_empty() {
                slot.id = id.into();
            }
            if !name.is_empty() {
                slot.name = name.into();
            }
            slot.arguments.push_str(args);
        }
        let calls = finish_pending(pending);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].arguments, "{\"expr\":\"2+2\"}");
        assert_eq!(calls[0].name, "calculator-evaluate");
    }

    #[test]
    fn duplicate_id_and_name_overwrite() {
        let mut pending: BTreeMap<u32, PendingToolCall> = BTreeMap::new();
        let slot = pending.entry(0).or_default();
        slot.id = "first".into();
        slot.name = "a-b".into();
        slot.id = "second".into();
        slot.name = "c-d".into();
        let calls = finish_pending(pending);
        assert_eq!(calls[0].id, "second");
        assert_eq!(calls[0].name, "c-d");
    }

    #[test]
    fn empty_name_dropped_empty_id_synthesized() {
        let mut pending: BTreeMap<u32, PendingToolCall> = BTreeMap::new();
        pending.insert(
            0,
            PendingToolCall { id: "x".into(), name: String::new(), arguments: "{}".into() },
        );
        pending.insert(
            1,
            PendingToolCall { id: String::new(), name: "t-f".into(), arguments: "{}".into() },
        );
        let calls = finish_pending(pending);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "t-f");
        assert!(calls[0].id.starts_with("tc_synthetic_"));
    }

    #[test]
    fn index_order_preserved() {
        let mut pending: BTreeMap<u32, PendingToolCall> = BTreeMap::new();
        pending.insert(
            2,
            PendingToolCall { id: "b".into(), name: "t-second".into(), arguments: "{}".into() },
        );
        pending.insert(
            0,
            PendingToolCall { id: "a".into(), name: "t-first".into(), arguments: "{}".into() },
        );
        let calls = finish_pending(pending);
        assert_eq!(calls[0].name, "t-first");
        assert_eq!(calls[1].name, "t-second");
    }

    // ── Root message ──────────────────────────────────────────────────────────

    #[test]
    fn empty_history_gets_single_root() {
        let mut messages = Vec::new();
        ensure_root(&mut messages, Role::System, "prompt");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::System);
    }

    #[test]
    fn existing_root_is_overwritten_not_duplicated() {
        let mut messages = vec![ChatMessage::system("old"), ChatMessage::user("hi")];
        ensure_root(&mut messages, Role::Developer, "new");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::Developer);
        assert_eq!(messages[0].as_text(), Some("new"));
    }

    #[test]
    fn non_root_first_message_pushes_root_in_front() {
        let mut messages = vec![ChatMessage::user("hi")];
        ensure_root(&mut messages, Role::System, "prompt");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].role, Role::User);
    }
}
