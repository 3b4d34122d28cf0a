// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod agent;
pub mod agent_loader;
pub mod loader;
pub mod schema;
pub mod slug;

pub use agent::{
    AgentCatalogEntry, AgentConfiguration, AgentConfigV1, AgentConfigV2, AgentParams,
    ReasoningEffort, CURRENT_AGENT_CONFIG_VERSION,
};
pub use agent_loader::{AgentConfigLoader, MigrationRecord, MigrationReport};
pub use loader::load;
pub use schema::{Config, PathsConfig, RootMessageRole, RuntimeTuning};
pub use slug::MnemonicSlug;
