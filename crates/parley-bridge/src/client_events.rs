// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Typed envelopes for the client protocol.
//!
//! Inbound frames must carry a `type` field naming a registered variant;
//! anything else is refused with an error message and no state change.
//! Outbound control events share the same tagged-JSON shape as runtime
//! events so clients parse one envelope format.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use parley_config::AgentCatalogEntry;

fn default_quality() -> String {
    "medium".to_string()
}

fn default_video_encoding() -> String {
    "vp8".to_string()
}

/// Events a client may send.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// One user turn.
    TextInput {
        text: String,
        #[serde(default)]
        file_ids: Vec<String>,
    },
    GetAgents,
    SetAgent {
        agent_key: String,
    },
    GetAvatars,
    SetAvatar {
        avatar_id: String,
        #[serde(default = "default_quality")]
        quality: String,
        #[serde(default = "default_video_encoding")]
        video_encoding: String,
    },
    /// Replace the equipped toolset list.
    UpdateTools {
        tools: Vec<String>,
    },
    /// Direct tool invocation outside a model turn.
    CallTool {
        name: String,
        #[serde(default)]
        arguments: Value,
    },
    /// Cooperative cancel of the in-flight interaction.
    CancelInteraction,
    Ping,
}

/// Parse failure reasons, phrased for the client.
pub fn parse_client_event(value: &Value) -> Result<ClientEvent, String> {
    let Some(event_type) = value.get("type").and_then(|t| t.as_str()) else {
        return Err("Event must have a 'type' field".to_string());
    };
    serde_json::from_value(value.clone()).map_err(|e| {
        if e.to_string().contains("unknown variant") {
            format!("Unknown event type: {event_type}")
        } else {
            format!("Malformed '{event_type}' event: {e}")
        }
    })
}

/// Avatar catalog entry served to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvatarInfo {
    pub avatar_id: String,
    pub name: String,
}

/// Bridge-originated events sent to the client alongside runtime events.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlEvent {
    AgentList {
        agents: Vec<AgentCatalogEntry>,
    },
    AvatarList {
        avatars: Vec<AvatarInfo>,
    },
    AgentConfigurationChanged {
        agent_config: parley_config::AgentConfigV2,
    },
    AvatarConnectionChanged {
        avatar_session_id: Option<String>,
    },
    Pong,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
