// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use parley_config::{AgentConfigV2, MnemonicSlug};
use parley_model::{ChatMessage, Role};

/// Metadata key reserved for tool-visible views: a submapping of
/// `{prefix → json-string}`.
pub const METAMETA_KEY: &str = "metameta";

/// Rejection for ids that are not two-word mnemonic slugs.  GUIDs and every
/// other shape fail with this error at every boundary that accepts an id.
#[derive(Debug, thiserror::Error)]
#[error("Invalid session ID format: '{id}'. Expected MnemonicSlug format (two lowercase words joined by '-'), e.g. 'tiger-castle'")]
pub struct InvalidSessionId {
    pub id: String,
}

/// Validate a session id, returning it through on success.
pub fn validate_session_id(id: &str) -> Result<&str, InvalidSessionId> {
    if MnemonicSlug::is_valid_session_id(id) {
        Ok(id)
    } else {
        Err(InvalidSessionId { id: id.to_string() })
    }
}

/// The session aggregate: one conversation, its agent, and its metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub session_id: String,
    pub user_id: String,
    pub agent_config: AgentConfigV2,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub display_name: Option<String>,
}

fn default_active() -> bool {
    true
}

impl ChatSession {
    /// Construct with an explicit id.  The id is validated; `user_id` must
    /// be non-empty.
    pub fn new(
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        agent_config: AgentConfigV2,
    ) -> anyhow::Result<Self> {
        let session_id = session_id.into();
        let user_id = user_id.into();
        validate_session_id(&session_id)?;
        if user_id.is_empty() {
            anyhow::bail!("user_id must be non-empty");
        }
        let now = Utc::now();
        Ok(Self {
            session_id,
            user_id,
            agent_config,
            messages: Vec::new(),
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
            last_activity: now,
            is_active: true,
            display_name: None,
        })
    }

    /// Construct with a freshly generated mnemonic id.
    pub fn generate(user_id: impl Into<String>, agent_config: AgentConfigV2) -> anyhow::Result<Self> {
        Self::new(MnemonicSlug::generate_session_id(), user_id, agent_config)
    }

    /// Refresh the mutation timestamps.  `updated_at` never moves backwards,
    /// so `updated_at >= created_at` holds for the life of the aggregate.
    pub fn touch(&mut self) {
        let now = Utc::now();
        if now > self.updated_at {
            self.updated_at = now;
        }
        self.last_activity = now;
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
        self.touch();
    }

    /// Ensure the root message at index 0 carries `content` with `role`.
    ///
    /// The root slot is the one place history is rewritten in place: a
    /// changed system prompt replaces the old root rather than appending.
    pub fn ensure_root_message(&mut self, role: Role, content: &str) {
        match self.messages.first_mut() {
            Some(first) if matches!(first.role, Role::System | Role::Developer) => {
                *first = ChatMessage {
                    role,
                    ..ChatMessage::system(content)
                };
            }
            _ => {
                let mut root = ChatMessage::system(content);
                root.role = role;
                self.messages.insert(0, root);
            }
        }
        self.touch();
    }

    /// The tool-visible metadata view: `{prefix → json-string}`.
    pub fn metameta(&self) -> HashMap<String, String> {
        self.metadata
            .get(METAMETA_KEY)
            .and_then(|v| v.as_object())
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Set one prefix entry in the tool-visible view.
    pub fn set_metameta(&mut self, prefix: &str, json_string: impl Into<String>) {
        let entry = self
            .metadata
            .entry(METAMETA_KEY.to_string())
            .or_insert_with(|| serde_json::Value::Object(Default::default()));
        if let Some(map) = entry.as_object_mut() {
            map.insert(prefix.to_string(), serde_json::Value::String(json_string.into()));
        }
        self.touch();
    }

    /// Name shown in session listings; falls back to the agent name.
    pub fn effective_display_name(&self) -> &str {
        self.display_name
            .as_deref()
            .unwrap_or(&self.agent_config.name)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
