// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Versioned agent configuration models.
//!
//! Agent definitions live on disk as one YAML file per agent.  The format is
//! versioned: v1 files predate the `key`/`category` fields and are migrated
//! in memory to the current version on load.  Files without an explicit
//! `version` field are treated as v1.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The version every configuration is migrated to on load.
pub const CURRENT_AGENT_CONFIG_VERSION: u32 = 2;

/// Effort level for reasoning-capable GPT models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Low,
    Medium,
    High,
}

/// Completion parameters, tagged by provider/model kind.
///
/// The kind determines which knobs are legal: `budget_tokens` belongs to
/// reasoning Claude models, `reasoning_effort` to reasoning GPT models,
/// `temperature` to the non-reasoning kinds.  The loader rejects files that
/// mix fields across kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentParams {
    ClaudeReasoning {
        model_name: String,
        budget_tokens: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_searches: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_tokens: Option<u32>,
    },
    ClaudeNonReasoning {
        model_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        temperature: Option<f32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_tokens: Option<u32>,
    },
    GptReasoning {
        model_name: String,
        reasoning_effort: ReasoningEffort,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_tokens: Option<u32>,
    },
    GptNonReasoning {
        model_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        temperature: Option<f32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_tokens: Option<u32>,
    },
}

impl AgentParams {
    pub fn model_name(&self) -> &str {
        match self {
            Self::ClaudeReasoning { model_name, .. }
            | Self::ClaudeNonReasoning { model_name, .. }
            | Self::GptReasoning { model_name, .. }
            | Self::GptNonReasoning { model_name, .. } => model_name,
        }
    }

    pub fn max_tokens(&self) -> Option<u32> {
        match self {
            Self::ClaudeReasoning { max_tokens, .. }
            | Self::ClaudeNonReasoning { max_tokens, .. }
            | Self::GptReasoning { max_tokens, .. }
            | Self::GptNonReasoning { max_tokens, .. } => *max_tokens,
        }
    }

    pub fn temperature(&self) -> Option<f32> {
        match self {
            Self::ClaudeNonReasoning { temperature, .. }
            | Self::GptNonReasoning { temperature, .. } => *temperature,
            _ => None,
        }
    }

    pub fn budget_tokens(&self) -> Option<u32> {
        match self {
            Self::ClaudeReasoning { budget_tokens, .. } => Some(*budget_tokens),
            _ => None,
        }
    }

    pub fn reasoning_effort(&self) -> Option<ReasoningEffort> {
        match self {
            Self::GptReasoning {
                reasoning_effort, ..
            } => Some(*reasoning_effort),
            _ => None,
        }
    }
}

fn default_v1_version() -> u32 {
    1
}

fn default_v2_version() -> u32 {
    2
}

/// First-generation on-disk format.  Kept only as a migration source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfigV1 {
    #[serde(default = "default_v1_version")]
    pub version: u32,
    pub name: String,
    pub uid: String,
    pub model_id: String,
    #[serde(default)]
    pub agent_description: Option<String>,
    pub persona: String,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub agent_params: Option<AgentParams>,
    #[serde(default)]
    pub prompt_metadata: Option<HashMap<String, serde_json::Value>>,
}

/// Current on-disk format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfigV2 {
    #[serde(default = "default_v2_version")]
    pub version: u32,
    pub key: String,
    pub name: String,
    pub uid: String,
    pub model_id: String,
    #[serde(default)]
    pub agent_description: Option<String>,
    pub persona: String,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub agent_params: Option<AgentParams>,
    #[serde(default)]
    pub prompt_metadata: Option<HashMap<String, serde_json::Value>>,
    #[serde(default)]
    pub category: Vec<String>,
}

impl AgentConfigV2 {
    /// Serialize back to the on-disk YAML form.
    pub fn to_yaml(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Projection served to clients in the capability snapshot.
    pub fn as_catalog_entry(&self) -> AgentCatalogEntry {
        AgentCatalogEntry {
            key: self.key.clone(),
            name: self.name.clone(),
            agent_description: self.agent_description.clone(),
            category: self.category.clone(),
        }
    }
}

/// Catalog projection: what a client needs to render an agent picker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCatalogEntry {
    pub key: String,
    pub name: String,
    pub agent_description: Option<String>,
    pub category: Vec<String>,
}

/// Any supported on-disk version.
#[derive(Debug, Clone)]
pub enum AgentConfiguration {
    V1(AgentConfigV1),
    V2(AgentConfigV2),
}

impl AgentConfiguration {
    pub fn version(&self) -> u32 {
        match self {
            Self::V1(_) => 1,
            Self::V2(_) => 2,
        }
    }

    /// Migrate to the current version.  v2 passes through unchanged; v1
    /// gains a `key` derived from the name and the legacy category tags.
    pub fn into_current(self) -> AgentConfigV2 {
        match self {
            Self::V2(cfg) => cfg,
            Self::V1(cfg) => AgentConfigV2 {
                version: CURRENT_AGENT_CONFIG_VERSION,
                key: to_snake_case(&cfg.name),
                name: cfg.name,
                uid: cfg.uid,
                model_id: cfg.model_id,
                agent_description: cfg.agent_description,
                persona: cfg.persona,
                tools: cfg.tools,
                agent_params: cfg.agent_params,
                prompt_metadata: cfg.prompt_metadata,
                category: vec!["domo".to_string(), "outdated".to_string()],
            },
        }
    }
}

/// Convert a display name to a snake_case key: `"My Agent"` → `"my_agent"`.
/// Runs of non-alphanumeric characters collapse into a single underscore;
/// uppercase letters inside a word start a new segment.
pub fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut prev_lower = false;
    for ch in name.chars() {
        if ch.is_alphanumeric() {
            if ch.is_uppercase() {
                if prev_lower {
                    out.push('_');
                }
                out.extend(ch.to_lowercase());
                prev_lower = false;
            } else {
                out.push(ch);
                prev_lower = ch.is_lowercase();
            }
        } else if !out.ends_with('_') && !out.is_empty() {
            out.push('_');
            prev_lower = false;
        }
    }
    out.trim_end_matches('_').to_string()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
