// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! End-to-end chat loop tests against the scripted provider.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use parley_config::{AgentConfigV1, AgentConfigV2, AgentConfiguration};
use parley_core::{
    AgentRuntime, CancelFlag, ChannelSink, ChatRequest, ChatSession, EventKind, EventSink,
    PromptBuilder, RuntimeDefaults, RuntimeEvent,
};
use parley_model::{ChatMessage, ModelProvider, Role, ScriptItem, ScriptedProvider};
use parley_tools::{CalculatorToolset, ToolChest, ToolContext, ToolDescriptor, Toolset};

fn agent(tools: &[&str]) -> AgentConfigV2 {
    AgentConfiguration::V1(AgentConfigV1 {
        version: 1,
        name: "Test Agent".into(),
        uid: "a-b-c".into(),
        model_id: "scripted".into(),
        agent_description: None,
        persona: "You are a helpful assistant.".into(),
        tools: tools.iter().map(|s| s.to_string()).collect(),
        agent_params: None,
        prompt_metadata: None,
    })
    .into_current()
}

fn session(tools: &[&str]) -> ChatSession {
    ChatSession::new("tiger-castle", "u1", agent(tools)).unwrap()
}

fn chest_with_calculator() -> Arc<ToolChest> {
    let chest = ToolChest::new();
    chest.register(Arc::new(CalculatorToolset));
    chest.activate_toolset(&["calculator".into()]);
    Arc::new(chest)
}

struct Harness {
    runtime: AgentRuntime,
    sink: Arc<dyn EventSink>,
    rx: mpsc::Receiver<RuntimeEvent>,
}

fn harness(provider: ScriptedProvider) -> Harness {
    let (tx, rx) = mpsc::channel(1024);
    Harness {
        runtime: AgentRuntime::new(Arc::new(provider), RuntimeDefaults::default()),
        sink: Arc::new(ChannelSink(tx)),
        rx,
    }
}

fn drain(rx: &mut mpsc::Receiver<RuntimeEvent>) -> Vec<RuntimeEvent> {
    let mut events = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        events.push(ev);
    }
    events
}

fn tags(events: &[RuntimeEvent]) -> Vec<&'static str> {
    events.iter().map(|e| e.kind.type_tag()).collect()
}

/// Assert `needles` appear in `haystack` in order (subsequence match).
fn assert_subsequence(haystack: &[&'static str], needles: &[&'static str]) {
    let mut it = haystack.iter();
    for needle in needles {
        assert!(
            it.any(|t| t == needle),
            "missing '{needle}' in order within {haystack:?}"
        );
    }
}

// ── Plain reply ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn plain_reply_produces_expected_messages_and_events() {
    let mut h = harness(ScriptedProvider::reply("Hi there"));
    let mut session = session(&[]);

    let mut req = ChatRequest::basic(&mut session, "Hello", h.sink.clone());
    req.prompt_builder = Some(PromptBuilder::default_sections());
    let messages = h.runtime.chat(req).await.unwrap();

    // Final history: system prompt, user, assistant.
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0].role, Role::System);
    assert_eq!(messages[0].as_text(), Some("You are a helpful assistant."));
    assert_eq!(messages[1].as_text(), Some("Hello"));
    assert_eq!(messages[2].role, Role::Assistant);
    assert_eq!(messages[2].as_text(), Some("Hi there"));
    assert_eq!(session.messages.len(), 3);

    let events = drain(&mut h.rx);
    for ev in &events {
        assert_eq!(ev.session_id, "tiger-castle");
    }
    let tags = tags(&events);
    // Exact order from the interaction bracket onward.
    let start = tags.iter().position(|t| *t == "interaction").unwrap();
    assert_eq!(
        &tags[start..],
        &["interaction", "completion", "text_delta", "completion", "interaction"]
    );

    // Completion bracket details.
    let completions: Vec<&RuntimeEvent> = events
        .iter()
        .filter(|e| matches!(e.kind, EventKind::Completion { .. }))
        .collect();
    match (&completions[0].kind, &completions[1].kind) {
        (
            EventKind::Completion { running: true, completion_options, .. },
            EventKind::Completion { running: false, stop_reason, .. },
        ) => {
            assert!(completion_options.get("messages").is_none(), "history must not leak");
            assert_eq!(stop_reason.as_deref(), Some("stop"));
        }
        other => panic!("unexpected completion pair: {other:?}"),
    }
}

// ── One tool cycle ───────────────────────────────────────────────────────────

fn tool_cycle_script() -> ScriptedProvider {
    ScriptedProvider::new(vec![
        vec![
            ScriptItem::ToolCall {
                index: 0,
                id: "c1".into(),
                name: "calculator-evaluate".into(),
                arguments: "{\"expr\":".into(),
            },
            ScriptItem::ToolCall {
                index: 0,
                id: String::new(),
                name: String::new(),
                arguments: "\"2+2\"}".into(),
            },
            ScriptItem::Finish(parley_model::FinishReason::ToolCalls),
        ],
        vec![
            ScriptItem::Text("Four.".into()),
            ScriptItem::Finish(parley_model::FinishReason::Stop),
        ],
    ])
}

#[tokio::test]
async fn tool_cycle_appends_wrapper_result_and_final_reply() {
    let mut h = harness(tool_cycle_script());
    let mut session = session(&["calculator"]);
    let chest = chest_with_calculator();

    let mut req = ChatRequest::basic(&mut session, "What is 2+2?", h.sink.clone());
    req.tool_chest = chest.clone();
    req.inference = Some(chest.get_inference_data(&["calculator".into()], "openai"));
    let messages = h.runtime.chat(req).await.unwrap();

    // Tail: assistant wrapper, tool result, final assistant.
    let n = messages.len();
    let wrapper = &messages[n - 3];
    assert_eq!(wrapper.role, Role::Assistant);
    let calls = wrapper.tool_calls.as_ref().unwrap();
    assert_eq!(calls[0].id, "c1");
    assert_eq!(calls[0].name, "calculator-evaluate");
    assert_eq!(calls[0].arguments, "{\"expr\":\"2+2\"}");
    assert_eq!(wrapper.as_text(), Some(""));

    let tool_msg = &messages[n - 2];
    assert_eq!(tool_msg.role, Role::Tool);
    assert_eq!(tool_msg.as_text(), Some("4"));

    assert_eq!(messages[n - 1].as_text(), Some("Four."));

    let events = drain(&mut h.rx);
    assert_subsequence(
        &tags(&events),
        &["interaction", "completion", "tool_call", "tool_call", "text_delta", "completion", "interaction"],
    );

    // The active=false event carries the results and follows the matching
    // active=true event with the same call ids.
    let tool_events: Vec<&RuntimeEvent> = events
        .iter()
        .filter(|e| matches!(e.kind, EventKind::ToolCall { .. }))
        .collect();
    assert_eq!(tool_events.len(), 2);
    match (&tool_events[0].kind, &tool_events[1].kind) {
        (
            EventKind::ToolCall { active: true, tool_calls: open, tool_results: None },
            EventKind::ToolCall { active: false, tool_calls: close, tool_results: Some(results) },
        ) => {
            assert_eq!(open[0].id, close[0].id);
            assert_eq!(results[0].content, "4");
        }
        other => panic!("unexpected tool events: {other:?}"),
    }
}

#[tokio::test]
async fn message_growth_matches_tool_cycle_count() {
    let mut h = harness(tool_cycle_script());
    let mut session = session(&["calculator"]);
    let before = session.messages.len();
    let chest = chest_with_calculator();

    let mut req = ChatRequest::basic(&mut session, "What is 2+2?", h.sink.clone());
    req.tool_chest = chest.clone();
    req.inference = Some(chest.get_inference_data(&["calculator".into()], "openai"));
    h.runtime.chat(req).await.unwrap();

    // One user message + one cycle (wrapper + 1 tool message) + final reply.
    assert_eq!(session.messages.len(), before + 1 + 2 + 1);
    drain(&mut h.rx);
}

// ── Tool exception ───────────────────────────────────────────────────────────

#[tokio::test]
async fn tool_exception_becomes_tool_message_and_loop_continues() {
    let provider = ScriptedProvider::new(vec![
        vec![
            ScriptItem::ToolCall {
                index: 0,
                id: "c1".into(),
                name: "calculator-evaluate".into(),
                arguments: "{\"expr\":\"1/0\"}".into(),
            },
            ScriptItem::Finish(parley_model::FinishReason::ToolCalls),
        ],
        vec![
            ScriptItem::Text("That division is undefined.".into()),
            ScriptItem::Finish(parley_model::FinishReason::Stop),
        ],
    ]);
    let mut h = harness(provider);
    let mut session = session(&["calculator"]);
    let chest = chest_with_calculator();

    let mut req = ChatRequest::basic(&mut session, "What is 1/0?", h.sink.clone());
    req.tool_chest = chest.clone();
    req.inference = Some(chest.get_inference_data(&["calculator".into()], "openai"));
    let messages = h.runtime.chat(req).await.unwrap();

    let tool_msg = messages
        .iter()
        .find(|m| m.role == Role::Tool)
        .expect("tool message present");
    assert!(
        tool_msg.as_text().unwrap().starts_with("Exception: "),
        "got: {:?}",
        tool_msg.as_text()
    );
    // The loop continued to a final assistant reply.
    assert_eq!(
        messages.last().unwrap().as_text(),
        Some("That division is undefined.")
    );
    drain(&mut h.rx);
}

// ── Boundary: empty tool-call batch ──────────────────────────────────────────

#[tokio::test]
async fn tool_calls_finish_with_no_fragments_emits_no_tool_call_event() {
    let provider = ScriptedProvider::new(vec![
        vec![ScriptItem::Finish(parley_model::FinishReason::ToolCalls)],
        vec![
            ScriptItem::Text("recovered".into()),
            ScriptItem::Finish(parley_model::FinishReason::Stop),
        ],
    ]);
    let mut h = harness(provider);
    let mut session = session(&[]);

    let req = ChatRequest::basic(&mut session, "hi", h.sink.clone());
    let messages = h.runtime.chat(req).await.unwrap();
    assert_eq!(messages.last().unwrap().as_text(), Some("recovered"));

    let events = drain(&mut h.rx);
    assert!(
        !events.iter().any(|e| matches!(e.kind, EventKind::ToolCall { .. })),
        "empty batch must not emit tool_call events"
    );
}

// ── Boundary: empty history + system prompt ──────────────────────────────────

#[tokio::test]
async fn empty_messages_with_system_prompt_yields_single_root() {
    let mut h = harness(ScriptedProvider::reply("ok"));
    let mut session = session(&[]);
    let mut req = ChatRequest::basic(&mut session, "hello", h.sink.clone());
    req.prompt_builder = Some(PromptBuilder::default_sections());
    req.messages = Some(Vec::new());
    let messages = h.runtime.chat(req).await.unwrap();

    assert_eq!(messages[0].role, Role::System);
    assert_eq!(
        messages
            .iter()
            .filter(|m| matches!(m.role, Role::System | Role::Developer))
            .count(),
        1
    );
    // Explicit message array: the session itself stays untouched.
    assert!(session.messages.is_empty());
    drain(&mut h.rx);
}

// ── One-shot helpers ─────────────────────────────────────────────────────────

#[tokio::test]
async fn one_shot_returns_final_assistant_text() {
    let mut h = harness(ScriptedProvider::reply("Forty-two."));
    let mut session = session(&[]);
    let req = ChatRequest::basic(&mut session, "meaning of life?", h.sink.clone());
    let answer = h.runtime.one_shot(req).await.unwrap();
    assert_eq!(answer, "Forty-two.");
    // One-shots never touch the session history.
    assert!(session.messages.is_empty());
    drain(&mut h.rx);
}

#[tokio::test]
async fn parallel_one_shots_preserve_input_order() {
    let provider = ScriptedProvider::new(vec![
        vec![ScriptItem::Text("same".into()), ScriptItem::Finish(parley_model::FinishReason::Stop)],
        vec![ScriptItem::Text("same".into()), ScriptItem::Finish(parley_model::FinishReason::Stop)],
    ]);
    let mut h = harness(provider);
    let session = session(&[]);
    let answers = h
        .runtime
        .parallel_one_shots(
            &session,
            &["first".to_string(), "second".to_string()],
            h.sink.clone(),
        )
        .await
        .unwrap();
    assert_eq!(answers, vec!["same", "same"]);
    drain(&mut h.rx);
}

// ── Retry and errors ─────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn transient_error_backs_off_and_retries() {
    let provider = ScriptedProvider::new(vec![
        vec![ScriptItem::ConnectError("gateway exploded".into())],
        vec![
            ScriptItem::Text("after retry".into()),
            ScriptItem::Finish(parley_model::FinishReason::Stop),
        ],
    ]);
    let mut h = harness(provider);
    let mut session = session(&[]);

    let req = ChatRequest::basic(&mut session, "hi", h.sink.clone());
    let messages = h.runtime.chat(req).await.unwrap();
    assert_eq!(messages.last().unwrap().as_text(), Some("after retry"));

    let events = drain(&mut h.rx);
    assert!(events.iter().any(|e| matches!(
        &e.kind,
        EventKind::SystemMessage { severity, content, .. }
            if severity == "warning" && content.contains("Backing off")
    )));
}

#[tokio::test(start_paused = true)]
async fn backoff_is_bounded_and_last_error_propagates() {
    // delay 1s → sleep 2s (delay 2) → sleep 4s (delay 4) → 4 >= max_delay,
    // so the third error propagates.
    let provider = ScriptedProvider::new(vec![
        vec![ScriptItem::ConnectError("outage 1".into())],
        vec![ScriptItem::ConnectError("outage 2".into())],
        vec![ScriptItem::ConnectError("outage 3".into())],
    ]);
    let defaults = RuntimeDefaults {
        max_delay: std::time::Duration::from_secs(4),
        ..RuntimeDefaults::default()
    };
    let (tx, mut rx) = mpsc::channel(1024);
    let runtime = AgentRuntime::new(Arc::new(provider), defaults);
    let mut session = session(&[]);

    let req = ChatRequest::basic(&mut session, "hi", Arc::new(ChannelSink(tx)));
    let err = runtime.chat(req).await.unwrap_err();
    assert!(err.to_string().contains("outage 3"));

    let retries = drain(&mut rx)
        .iter()
        .filter(|e| matches!(
            &e.kind,
            EventKind::SystemMessage { content, .. } if content.contains("Backing off")
        ))
        .count();
    assert_eq!(retries, 2);
}

#[tokio::test(start_paused = true)]
async fn permanent_error_propagates_but_closes_interaction() {
    let provider =
        ScriptedProvider::new(vec![vec![ScriptItem::PermanentError("bad request".into())]]);
    let mut h = harness(provider);
    let mut session = session(&[]);

    let req = ChatRequest::basic(&mut session, "hi", h.sink.clone());
    let err = h.runtime.chat(req).await.unwrap_err();
    assert!(err.to_string().contains("bad request"));

    let events = drain(&mut h.rx);
    let interactions: Vec<bool> = events
        .iter()
        .filter_map(|e| match &e.kind {
            EventKind::Interaction { started, .. } => Some(*started),
            _ => None,
        })
        .collect();
    assert_eq!(interactions, vec![true, false], "bracket must close on error");
}

// ── Cancellation ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn pre_set_cancel_skips_provider_entirely() {
    let provider = ScriptedProvider::reply("never sent");
    let mut h = harness(provider);
    let mut session = session(&[]);

    let mut req = ChatRequest::basic(&mut session, "hi", h.sink.clone());
    req.client_wants_cancel = CancelFlag::new();
    req.client_wants_cancel.set();
    let messages = h.runtime.chat(req).await.unwrap();

    assert!(messages.last().unwrap().role == Role::User);
    let events = drain(&mut h.rx);
    assert!(!events
        .iter()
        .any(|e| matches!(e.kind, EventKind::Completion { .. })));
}

// ── Launch-order appending ───────────────────────────────────────────────────

struct SleepyToolset;

#[async_trait]
impl Toolset for SleepyToolset {
    fn name(&self) -> &str {
        "sleepy"
    }
    fn tools(&self) -> Vec<ToolDescriptor> {
        vec![
            ToolDescriptor {
                name: "slow".into(),
                description: "sleeps then answers".into(),
                parameters: json!({ "type": "object" }),
            },
            ToolDescriptor {
                name: "fast".into(),
                description: "answers at once".into(),
                parameters: json!({ "type": "object" }),
            },
        ]
    }
    async fn call(&self, function: &str, _args: Value, _ctx: &ToolContext) -> anyhow::Result<String> {
        match function {
            "slow" => {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                Ok("slow done".into())
            }
            "fast" => Ok("fast done".into()),
            other => anyhow::bail!("no function {other}"),
        }
    }
}

#[tokio::test]
async fn tool_results_append_in_launch_order_not_completion_order() {
    let provider = ScriptedProvider::new(vec![
        vec![
            ScriptItem::ToolCall {
                index: 0,
                id: "c-slow".into(),
                name: "sleepy-slow".into(),
                arguments: "{}".into(),
            },
            ScriptItem::ToolCall {
                index: 1,
                id: "c-fast".into(),
                name: "sleepy-fast".into(),
                arguments: "{}".into(),
            },
            ScriptItem::Finish(parley_model::FinishReason::ToolCalls),
        ],
        vec![
            ScriptItem::Text("done".into()),
            ScriptItem::Finish(parley_model::FinishReason::Stop),
        ],
    ]);
    let mut h = harness(provider);
    let mut session = session(&[]);
    let chest = Arc::new(ToolChest::new());
    chest.register(Arc::new(SleepyToolset));
    chest.activate_toolset(&["sleepy".into()]);

    let mut req = ChatRequest::basic(&mut session, "both", h.sink.clone());
    req.tool_chest = chest.clone();
    req.inference = Some(chest.get_inference_data(&["sleepy".into()], "openai"));
    let messages = h.runtime.chat(req).await.unwrap();

    let tool_messages: Vec<&ChatMessage> =
        messages.iter().filter(|m| m.role == Role::Tool).collect();
    assert_eq!(tool_messages[0].as_text(), Some("slow done"));
    assert_eq!(tool_messages[1].as_text(), Some("fast done"));
    drain(&mut h.rx);
}
