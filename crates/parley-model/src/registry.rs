// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Model-id → driver resolution.
//!
//! The runtime never hard-codes a vendor: the bridge asks this registry for
//! the driver matching the active agent's `model_id`.  Azure takes priority
//! over the hosted OpenAI endpoint when its environment is configured, which
//! mirrors how deployments select the compatible backend.

use std::sync::Arc;

use anyhow::bail;

use crate::{AnthropicProvider, ModelProvider, OpenAICompatProvider, ScriptedProvider};

/// Resolve a streaming driver for `model_id`.
///
/// - `claude*` → Anthropic messages driver (`ANTHROPIC_API_KEY`)
/// - `gpt*` / `o1*` / `o3*` → Azure when `AZURE_OPENAI_*` is configured,
///   otherwise the hosted OpenAI endpoint (`OPENAI_API_KEY`)
/// - `scripted` → empty scripted provider (tests inject their own scripts)
pub fn provider_for_model(model_id: &str) -> anyhow::Result<Arc<dyn ModelProvider>> {
    let lower = model_id.to_lowercase();

    if lower == "scripted" {
        return Ok(Arc::new(ScriptedProvider::empty()));
    }

    if lower.contains("claude") {
        return match AnthropicProvider::from_env(model_id) {
            Some(p) => Ok(Arc::new(p)),
            None => bail!("ANTHROPIC_API_KEY is not set; cannot drive model '{model_id}'"),
        };
    }

    if lower.contains("gpt") || lower.starts_with("o1") || lower.starts_with("o3") {
        if let Some(azure) = OpenAICompatProvider::azure_from_env(model_id) {
            return Ok(Arc::new(azure));
        }
        return Ok(Arc::new(OpenAICompatProvider::openai(model_id, None)));
    }

    bail!("no completion driver registered for model '{model_id}'")
}

/// True when the model family routes the system prompt through the
/// `developer` role rather than `system`.
pub fn uses_developer_root_role(model_id: &str) -> bool {
    let lower = model_id.to_lowercase();
    lower.starts_with("o1") || lower.starts_with("o3")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
