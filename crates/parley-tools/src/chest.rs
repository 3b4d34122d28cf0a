// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The tool chest: registry and dispatcher for callable toolsets.
//!
//! Toolsets register once (built-ins at startup, server-backed sets on
//! activation); a session then activates the subset its agent declares.
//! Dispatch routes `<toolset>-<function>` to the owning toolset and never
//! panics: every failure becomes a human-readable string the model can
//! relay.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tracing::{debug, warn};

use crate::toolset::{ToolContext, ToolDescriptor, Toolset};

/// Separator between toolset and function in fully-qualified tool names.
pub const TOOL_SEP: &str = "-";

/// Provider-shaped schema fragment for one fully-qualified tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// The resolved tool data handed to a completion request.
#[derive(Debug, Clone)]
pub struct InferenceData {
    pub schemas: Vec<ToolSchema>,
    pub toolsets: Vec<String>,
    pub tool_format: String,
}

#[derive(Default)]
struct ChestState {
    catalog: HashMap<String, Arc<dyn Toolset>>,
    active: HashMap<String, Arc<dyn Toolset>>,
}

/// Registry + dispatcher shared by one bridge and the tools it activates.
#[derive(Default)]
pub struct ToolChest {
    state: RwLock<ChestState>,
}

impl ToolChest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a toolset to the catalog (not yet active).
    pub fn register(&self, toolset: Arc<dyn Toolset>) {
        let name = toolset.name().to_string();
        if name.contains(TOOL_SEP) {
            warn!(toolset = %name, "toolset name contains the separator; dispatch will misroute");
        }
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.catalog.insert(name, toolset);
    }

    /// Activate the union of the named toolsets.  Idempotent: activating an
    /// already-active set is a no-op.  Unknown names are returned as a
    /// failure list rather than raised.
    pub fn activate_toolset(&self, tools: &[String]) -> Vec<String> {
        let mut failures = Vec::new();
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        for name in tools {
            match state.catalog.get(name).cloned() {
                Some(ts) => {
                    state.active.entry(name.clone()).or_insert(ts);
                }
                None => {
                    warn!(toolset = %name, "cannot activate unknown toolset");
                    failures.push(name.clone());
                }
            }
        }
        failures
    }

    /// Deactivate the named toolsets.  Unknown or inactive names are ignored.
    pub fn deactivate_toolset(&self, tools: &[String]) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        for name in tools {
            state.active.remove(name);
        }
    }

    pub fn active_toolsets(&self) -> Vec<String> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = state.active.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn has_toolset(&self, name: &str) -> bool {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .catalog
            .contains_key(name)
    }

    fn active_named(&self, tools: &[String]) -> Vec<Arc<dyn Toolset>> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        tools
            .iter()
            .filter_map(|name| state.active.get(name).cloned())
            .collect()
    }

    /// Per-turn warm-up for the named toolsets.
    pub async fn initialize_toolsets(
        &self,
        tools: &[String],
        ctx: &ToolContext,
    ) -> anyhow::Result<()> {
        for toolset in self.active_named(tools) {
            toolset.initialize(ctx).await?;
        }
        Ok(())
    }

    /// Provider-shaped schemas + resolved toolset list for a request.
    pub fn get_inference_data(&self, tools: &[String], tool_format: &str) -> InferenceData {
        let mut schemas = Vec::new();
        let mut toolsets = Vec::new();
        for toolset in self.active_named(tools) {
            toolsets.push(toolset.name().to_string());
            for ToolDescriptor { name, description, parameters } in toolset.tools() {
                schemas.push(ToolSchema {
                    name: format!("{}{}{}", toolset.name(), TOOL_SEP, name),
                    description,
                    parameters,
                });
            }
        }
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        InferenceData {
            schemas,
            toolsets,
            tool_format: tool_format.to_string(),
        }
    }

    /// Prompt sections contributed by the named toolsets, in order.
    pub fn prompt_sections(&self, tools: &[String]) -> Vec<String> {
        self.active_named(tools)
            .iter()
            .filter_map(|ts| ts.prompt_section_text())
            .collect()
    }

    /// Route one fully-qualified call to its toolset.
    ///
    /// Unknown toolsets and malformed names come back as `Ok` strings the
    /// model can relay; only a failure inside the tool itself is an `Err`,
    /// so callers choose how to phrase it (the chat loop synthesizes an
    /// `"Exception: …"` tool message, direct dispatch uses
    /// [`ToolChest::call_tool_or_report`]).
    pub async fn call_tool(
        &self,
        name: &str,
        args: Value,
        ctx: &ToolContext,
    ) -> anyhow::Result<String> {
        let Some((toolset_name, function)) = name.split_once(TOOL_SEP) else {
            return Ok(format!("{name} is not a valid tool name."));
        };
        let toolset = {
            let state = self.state.read().unwrap_or_else(|e| e.into_inner());
            state.active.get(toolset_name).cloned()
        };
        let Some(toolset) = toolset else {
            return Ok(format!("{toolset_name} is not a valid toolset."));
        };
        debug!(toolset = %toolset_name, function = %function, "dispatching tool call");
        toolset.call(function, args, ctx).await
    }

    /// Like [`ToolChest::call_tool`], but converts tool failures into the
    /// user-facing error string.  Used for direct client-initiated calls.
    pub async fn call_tool_or_report(&self, name: &str, args: Value, ctx: &ToolContext) -> String {
        match self.call_tool(name, args, ctx).await {
            Ok(result) => result,
            Err(e) => {
                let (toolset_name, function) = name.split_once(TOOL_SEP).unwrap_or((name, name));
                warn!(toolset = %toolset_name, function = %function, error = %e, "tool call failed");
                format!(
                    "Important! Tell the user an error occurred calling {function} on {toolset_name}. {e}"
                )
            }
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
