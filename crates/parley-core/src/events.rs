// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Runtime events: the ordered stream produced during a turn.
//!
//! Every event is an envelope carrying `session_id` and `role` plus a
//! `type`-tagged payload.  The tagged enum is the event registry: parsing
//! inbound JSON and dispatching by variant are both table-driven through
//! serde and `match`, and construction goes through [`EventBuilder`] so the
//! envelope fields can never be omitted.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use parley_model::{ChatMessage, ToolCall, ToolResult};

/// The `type`-tagged payload of a runtime event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// Brackets one user turn.
    Interaction { started: bool, id: String },
    /// Brackets one provider call.  `completion_options` is a deep copy of
    /// the request options with the message array stripped.
    Completion {
        running: bool,
        completion_options: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stop_reason: Option<String>,
    },
    TextDelta {
        content: String,
    },
    ThoughtDelta {
        content: String,
    },
    CompleteThought {
        content: String,
    },
    /// Brackets tool execution; `active=false` carries the results.
    ToolCall {
        active: bool,
        tool_calls: Vec<ToolCall>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_results: Option<Vec<ToolResult>>,
    },
    /// Partial reassembly snapshot while tool-call fragments stream in.
    ToolCallDelta {
        tool_calls: Vec<ToolCall>,
    },
    /// A complete message, for clients that render whole messages.
    Message {
        content: String,
        format: String,
    },
    /// Full history snapshot.
    History {
        messages: Vec<ChatMessage>,
    },
    /// Messages appended since the last snapshot.
    HistoryDelta {
        messages: Vec<ChatMessage>,
    },
    /// Out-of-band notification (errors, retry notices, status).
    SystemMessage {
        severity: String,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_type: Option<String>,
    },
    /// The rendered system prompt for this turn.
    SystemPrompt {
        content: String,
    },
    /// Echo of the user's request as seen by the runtime.
    UserRequest {
        data: Value,
    },
    /// Inline media render directive.
    RenderMedia {
        content_type: String,
        content: String,
    },
}

impl EventKind {
    /// The wire tag for this variant.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::Interaction { .. } => "interaction",
            Self::Completion { .. } => "completion",
            Self::TextDelta { .. } => "text_delta",
            Self::ThoughtDelta { .. } => "thought_delta",
            Self::CompleteThought { .. } => "complete_thought",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolCallDelta { .. } => "tool_call_delta",
            Self::Message { .. } => "message",
            Self::History { .. } => "history",
            Self::HistoryDelta { .. } => "history_delta",
            Self::SystemMessage { .. } => "system_message",
            Self::SystemPrompt { .. } => "system_prompt",
            Self::UserRequest { .. } => "user_request",
            Self::RenderMedia { .. } => "render_media",
        }
    }
}

/// Envelope: every runtime event carries its session and the role it speaks
/// for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeEvent {
    pub session_id: String,
    pub role: String,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl RuntimeEvent {
    /// Parse an event from its JSON form, requiring a valid `type` tag.
    pub fn from_json(value: &Value) -> anyhow::Result<Self> {
        Ok(serde_json::from_value(value.clone())?)
    }
}

/// Stamps the envelope fields onto event payloads.
///
/// One builder exists per turn context (runtime, bridge), so no call site
/// can forget the session id or role.
#[derive(Debug, Clone)]
pub struct EventBuilder {
    session_id: String,
    role: String,
}

impl EventBuilder {
    pub fn new(session_id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            role: role.into(),
        }
    }

    pub fn event(&self, kind: EventKind) -> RuntimeEvent {
        RuntimeEvent {
            session_id: self.session_id.clone(),
            role: self.role.clone(),
            kind,
        }
    }

    /// Same payload, different role (system notices inside an assistant
    /// stream).
    pub fn event_as(&self, role: &str, kind: EventKind) -> RuntimeEvent {
        RuntimeEvent {
            session_id: self.session_id.clone(),
            role: role.to_string(),
            kind,
        }
    }

    pub fn system_error(&self, content: impl Into<String>, error_type: Option<String>) -> RuntimeEvent {
        self.event_as(
            "system",
            EventKind::SystemMessage {
                severity: "error".into(),
                content: content.into(),
                error_type,
            },
        )
    }
}

/// The single seam between event producers and everything downstream.
///
/// The runtime's `streaming_callback` is an `EventSink`; so are the session
/// logger gateway and the bridge emitter, which lets them chain.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn raise(&self, event: RuntimeEvent) -> anyhow::Result<()>;
}

/// Sink that discards everything.
pub struct NullSink;

#[async_trait]
impl EventSink for NullSink {
    async fn raise(&self, _event: RuntimeEvent) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Sink that forwards into an mpsc channel; the test harness's workhorse.
pub struct ChannelSink(pub mpsc::Sender<RuntimeEvent>);

#[async_trait]
impl EventSink for ChannelSink {
    async fn raise(&self, event: RuntimeEvent) -> anyhow::Result<()> {
        self.0
            .send(event)
            .await
            .map_err(|_| anyhow::anyhow!("event channel closed"))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
