// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Full-path bridge tests: client frames in, ordered events out, session
//! persisted, JSONL written.

use std::path::Path;
use std::sync::Arc;

use serde_json::json;

use parley_bridge::{AgentBridge, InMemoryConnection, ProviderFactory};
use parley_config::AgentConfigLoader;
use parley_core::ChatSession;
use parley_model::{ModelProvider, ScriptItem, ScriptedProvider};
use parley_session::{InMemoryKvStore, KvSessionRepository, SessionManager};
use parley_tools::{CalculatorToolset, ThinkToolset, ToolChest};

const AGENT_YAML: &str = "\
name: Helpful Domo
model_id: scripted
persona: You are a helpful assistant.
tools: []
";

const CALC_AGENT_YAML: &str = "\
name: Calc Domo
model_id: scripted
persona: You can do arithmetic.
tools:
  - calculator
  - think
";

struct Fixture {
    agents_dir: tempfile::TempDir,
    log_dir: tempfile::TempDir,
    manager: Arc<SessionManager>,
    loader: Arc<AgentConfigLoader>,
    chest: Arc<ToolChest>,
}

fn fixture() -> Fixture {
    let agents_dir = tempfile::tempdir().unwrap();
    std::fs::write(agents_dir.path().join("helpful_domo.yaml"), AGENT_YAML).unwrap();
    std::fs::write(agents_dir.path().join("calc_domo.yaml"), CALC_AGENT_YAML).unwrap();
    let loader = Arc::new(AgentConfigLoader::new(agents_dir.path(), "scripted"));
    let manager = Arc::new(SessionManager::new(Arc::new(KvSessionRepository::new(
        Arc::new(InMemoryKvStore::new()),
        None,
    ))));
    let chest = Arc::new(ToolChest::new());
    chest.register(Arc::new(CalculatorToolset));
    chest.register(Arc::new(ThinkToolset::new()));
    Fixture {
        agents_dir,
        log_dir: tempfile::tempdir().unwrap(),
        manager,
        loader,
        chest,
    }
}

fn factory_for(script: ScriptedProvider) -> ProviderFactory {
    let provider: Arc<dyn ModelProvider> = Arc::new(script);
    Arc::new(move |_| Ok(provider.clone()))
}

fn bridge_for(fixture: &Fixture, agent_key: &str, script: ScriptedProvider) -> AgentBridge {
    let agent = fixture.loader.duplicate(agent_key).unwrap();
    let session = ChatSession::new("tiger-castle", "u1", agent).unwrap();
    AgentBridge::new(
        session,
        fixture.manager.clone(),
        fixture.loader.clone(),
        fixture.chest.clone(),
        fixture.log_dir.path(),
    )
    .with_provider_factory(factory_for(script))
}

fn jsonl_lines(log_dir: &Path, session_id: &str) -> Vec<serde_json::Value> {
    let session_dir = log_dir.join(session_id);
    let mut lines = Vec::new();
    if let Ok(entries) = std::fs::read_dir(session_dir) {
        for entry in entries.filter_map(|e| e.ok()) {
            let text = std::fs::read_to_string(entry.path()).unwrap_or_default();
            lines.extend(text.lines().filter_map(|l| serde_json::from_str(l).ok()));
        }
    }
    lines
}

// ── Plain reply, end to end ──────────────────────────────────────────────────

#[tokio::test]
async fn text_input_drives_a_full_turn() {
    let fx = fixture();
    let mut bridge = bridge_for(&fx, "helpful_domo", ScriptedProvider::reply("Hi there"));
    let connection = Arc::new(InMemoryConnection::with_inbound(vec![
        json!({"type": "text_input", "text": "Hello"}),
    ]));

    bridge.run(connection.clone()).await.unwrap();

    // Final history: system prompt, user, assistant.
    let messages = &bridge.chat_session().messages;
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0].as_text(), Some("You are a helpful assistant."));
    assert_eq!(messages[1].as_text(), Some("Hello"));
    assert_eq!(messages[2].as_text(), Some("Hi there"));

    // Capability snapshot first, then the ordered turn events.
    let types = connection.sent_types();
    assert_eq!(types[0], "agent_list");
    assert_eq!(
        &types[1..],
        &[
            "user_request",
            "system_prompt",
            "interaction",
            "completion",
            "text_delta",
            "completion",
            "message",
            "history",
            "interaction"
        ]
    );

    // Session persisted via the manager.
    let (items, total) = fx.manager.list("u1", 0, 10).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(items[0].session_id, "tiger-castle");
    assert_eq!(items[0].message_count, 3);

    // Every runtime event is in the session's JSONL log.
    let records = jsonl_lines(fx.log_dir.path(), "tiger-castle");
    assert!(records.len() >= 8);
    for record in &records {
        assert_eq!(record["event"]["session_id"], "tiger-castle");
        assert!(record["timestamp"].as_str().is_some());
    }
}

// ── Tool cycle through the bridge ────────────────────────────────────────────

#[tokio::test]
async fn calculator_turn_runs_tool_cycle() {
    let fx = fixture();
    let script = ScriptedProvider::new(vec![
        vec![
            ScriptItem::ToolCall {
                index: 0,
                id: "c1".into(),
                name: "calculator-evaluate".into(),
                arguments: "{\"expr\":\"2+2\"}".into(),
            },
            ScriptItem::Finish(parley_model::FinishReason::ToolCalls),
        ],
        vec![
            ScriptItem::Text("Four.".into()),
            ScriptItem::Finish(parley_model::FinishReason::Stop),
        ],
    ]);
    let mut bridge = bridge_for(&fx, "calc_domo", script);
    let connection = Arc::new(InMemoryConnection::with_inbound(vec![
        json!({"type": "text_input", "text": "What is 2+2?"}),
    ]));

    bridge.run(connection.clone()).await.unwrap();

    let messages = &bridge.chat_session().messages;
    let n = messages.len();
    assert!(messages[n - 3].tool_calls.is_some());
    assert_eq!(messages[n - 2].as_text(), Some("4"));
    assert_eq!(messages[n - 1].as_text(), Some("Four."));

    // The think protocol section landed in the rendered system prompt.
    assert!(messages[0].as_text().unwrap().contains("Think protocol"));
    assert!(messages[0].as_text().unwrap().contains("You can do arithmetic."));

    let types = connection.sent_types();
    assert!(types.iter().filter(|t| *t == "tool_call").count() >= 2);
}

// ── File attachments ─────────────────────────────────────────────────────────

#[tokio::test]
async fn attached_files_become_one_multimodal_user_message() {
    use parley_bridge::StaticFileHandler;
    use parley_model::MediaInput;

    let fx = fixture();
    let handler = StaticFileHandler::with_files(vec![
        MediaInput {
            file_id: "img-1".into(),
            mime_type: "image/png".into(),
            url: Some("data:image/png;base64,AAAA".into()),
        },
        MediaInput {
            file_id: "doc-1".into(),
            mime_type: "application/pdf".into(),
            url: None,
        },
    ]);
    let mut bridge = bridge_for(&fx, "helpful_domo", ScriptedProvider::reply("Nice chart."))
        .with_file_handler(Arc::new(handler));
    let connection = Arc::new(InMemoryConnection::with_inbound(vec![json!({
        "type": "text_input",
        "text": "What does this show?",
        "file_ids": ["img-1", "doc-1"],
    })]));

    bridge.run(connection.clone()).await.unwrap();

    let messages = &bridge.chat_session().messages;
    let user = messages
        .iter()
        .find(|m| m.has_media())
        .expect("multimodal user message present");
    // Leading text block, then the image, then the document.
    assert_eq!(user.content.len(), 3);
    assert_eq!(user.joined_text(), "What does this show?");
    assert_eq!(messages.last().unwrap().as_text(), Some("Nice chart."));
}

// ── Protocol errors ──────────────────────────────────────────────────────────

#[tokio::test]
async fn unknown_event_type_is_reported_and_nonfatal() {
    let fx = fixture();
    let mut bridge = bridge_for(&fx, "helpful_domo", ScriptedProvider::reply("ok"));
    let connection = Arc::new(InMemoryConnection::with_inbound(vec![
        json!({"type": "warp_drive"}),
        json!({"type": "ping"}),
    ]));

    bridge.run(connection.clone()).await.unwrap();

    let sent = connection.sent();
    let error = sent
        .iter()
        .find(|v| v["type"] == "system_message")
        .expect("error event sent");
    assert_eq!(error["severity"], "error");
    assert_eq!(error["content"], "Unknown event type: warp_drive");
    // The connection stayed open: the ping still got its pong.
    assert!(connection.sent_types().iter().any(|t| t == "pong"));
}

#[tokio::test]
async fn provider_failure_surfaces_as_system_message_and_connection_survives() {
    let fx = fixture();
    let script = ScriptedProvider::new(vec![vec![ScriptItem::PermanentError(
        "schema rejected".into(),
    )]]);
    let mut bridge = bridge_for(&fx, "helpful_domo", script);
    let connection = Arc::new(InMemoryConnection::with_inbound(vec![
        json!({"type": "text_input", "text": "Hello"}),
        json!({"type": "ping"}),
    ]));

    bridge.run(connection.clone()).await.unwrap();

    let sent = connection.sent();
    assert!(sent.iter().any(|v| {
        v["type"] == "system_message"
            && v["content"]
                .as_str()
                .map(|c| c.contains("Error in agent runtime chat"))
                .unwrap_or(false)
    }));
    assert!(connection.sent_types().iter().any(|t| t == "pong"));
}

// ── Agent management ─────────────────────────────────────────────────────────

#[tokio::test]
async fn set_agent_installs_duplicate_and_announces() {
    let fx = fixture();
    let mut bridge = bridge_for(&fx, "helpful_domo", ScriptedProvider::reply("ok"));
    let connection = Arc::new(InMemoryConnection::with_inbound(vec![
        json!({"type": "set_agent", "agent_key": "calc_domo"}),
    ]));

    bridge.run(connection.clone()).await.unwrap();

    assert_eq!(bridge.chat_session().agent_config.key, "calc_domo");
    let sent = connection.sent();
    let changed = sent
        .iter()
        .find(|v| v["type"] == "agent_configuration_changed")
        .expect("configuration change announced");
    assert_eq!(changed["agent_config"]["key"], "calc_domo");
}

#[tokio::test]
async fn set_unknown_agent_reports_and_keeps_current() {
    let fx = fixture();
    let mut bridge = bridge_for(&fx, "helpful_domo", ScriptedProvider::reply("ok"));
    let connection = Arc::new(InMemoryConnection::with_inbound(vec![
        json!({"type": "set_agent", "agent_key": "ghost"}),
    ]));

    bridge.run(connection.clone()).await.unwrap();

    assert_eq!(bridge.chat_session().agent_config.key, "helpful_domo");
    assert!(connection.sent().iter().any(|v| {
        v["type"] == "system_message"
            && v["content"] == "Agent 'ghost' not found"
    }));
}

#[tokio::test]
async fn update_tools_diffs_activations() {
    let fx = fixture();
    let mut bridge = bridge_for(&fx, "calc_domo", ScriptedProvider::reply("ok"));
    let connection = Arc::new(InMemoryConnection::with_inbound(vec![
        json!({"type": "update_tools", "tools": ["calculator", "nonexistent"]}),
    ]));

    bridge.run(connection.clone()).await.unwrap();

    // Valid names kept, unknown reported and dropped.
    assert_eq!(bridge.chat_session().agent_config.tools, vec!["calculator"]);
    assert!(connection.sent().iter().any(|v| {
        v["type"] == "system_message"
            && v["content"]
                .as_str()
                .map(|c| c.contains("Unknown toolsets: nonexistent"))
                .unwrap_or(false)
    }));
    assert!(connection
        .sent_types()
        .iter()
        .any(|t| t == "agent_configuration_changed"));
}

// ── Direct tool call ─────────────────────────────────────────────────────────

#[tokio::test]
async fn call_tool_returns_result_as_message() {
    let fx = fixture();
    let mut bridge = bridge_for(&fx, "calc_domo", ScriptedProvider::reply("ok"));
    let connection = Arc::new(InMemoryConnection::with_inbound(vec![
        json!({"type": "call_tool", "name": "calculator-evaluate",
               "arguments": {"expr": "6*7"}}),
    ]));

    bridge.run(connection.clone()).await.unwrap();

    let sent = connection.sent();
    let message = sent
        .iter()
        .find(|v| v["type"] == "message")
        .expect("tool result message");
    assert_eq!(message["content"], "42");
}
