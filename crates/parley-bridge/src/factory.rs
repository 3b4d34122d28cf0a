// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use parley_config::AgentConfigV2;
use parley_core::{AgentRuntime, RuntimeDefaults};
use parley_model::{provider_for_model, uses_developer_root_role, ModelProvider};

/// Override hook for provider resolution, used by hosts that pin drivers
/// (and by tests that inject scripted providers).
pub type ProviderFactory =
    Arc<dyn Fn(&str) -> anyhow::Result<Arc<dyn ModelProvider>> + Send + Sync>;

/// Resolve the runtime implementation for an agent configuration.
///
/// The vendor mapping keys off `model_id`; model families that require the
/// `developer` root role get it here so the caller's defaults stay
/// untouched.
pub fn runtime_for_agent(
    config: &AgentConfigV2,
    defaults: &RuntimeDefaults,
    provider_factory: Option<&ProviderFactory>,
) -> anyhow::Result<AgentRuntime> {
    let provider = match provider_factory {
        Some(factory) => factory(&config.model_id)?,
        None => provider_for_model(&config.model_id)?,
    };
    let mut defaults = defaults.clone();
    if uses_developer_root_role(&config.model_id) {
        defaults.root_message_role = parley_config::RootMessageRole::Developer;
    }
    Ok(AgentRuntime::new(provider, defaults))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
