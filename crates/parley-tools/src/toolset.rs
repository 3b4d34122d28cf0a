// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

/// Describes one callable function of a toolset.
///
/// `name` is the bare function name; the fully-qualified name presented to
/// the model is `<toolset><sep><function>` and is assembled by the chest.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// JSON Schema of the parameters object.
    pub parameters: Value,
}

/// Per-call context handed to a tool.
///
/// This is a lookup convenience, never an owner: it carries copies of the
/// identifiers a tool may need (session, agent, model) plus the
/// tool-visible metadata view.  The `metameta` mapping holds one JSON
/// string per registered prefix, exactly as stored on the session.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub session_id: String,
    pub agent_key: String,
    pub model_name: String,
    pub metameta: HashMap<String, String>,
}

/// A named bundle of related tool functions.
#[async_trait]
pub trait Toolset: Send + Sync {
    /// Toolset name.  Must not contain the chest separator (`-`).
    fn name(&self) -> &str;

    /// Descriptors for every function this toolset exposes.
    fn tools(&self) -> Vec<ToolDescriptor>;

    /// Per-turn warm-up: open connections, refresh caches.  Default no-op.
    async fn initialize(&self, _ctx: &ToolContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Execute one function.  Errors are returned as `Err` and converted by
    /// the chest into the user-facing error string.
    async fn call(&self, function: &str, args: Value, ctx: &ToolContext) -> anyhow::Result<String>;

    /// Optional prompt section this toolset contributes when equipped.
    fn prompt_section_text(&self) -> Option<String> {
        None
    }
}
