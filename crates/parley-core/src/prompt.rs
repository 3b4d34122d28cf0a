// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Composable system prompt assembly.
//!
//! A prompt is built from sections.  Each section renders against the
//! prompt context (active agent + metadata) and the builder joins the
//! results.  Toolsets can contribute their own sections, which render after
//! the configured ones.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use parley_config::AgentConfigV2;

/// Context visible to prompt sections while rendering.
#[derive(Debug, Clone)]
pub struct PromptContext {
    pub agent: AgentConfigV2,
    /// Free-form metadata from the agent configuration plus anything the
    /// bridge adds for the turn.
    pub metadata: HashMap<String, serde_json::Value>,
}

impl PromptContext {
    pub fn new(agent: AgentConfigV2, metadata: HashMap<String, serde_json::Value>) -> Self {
        Self { agent, metadata }
    }
}

/// One producer of system prompt text.
#[async_trait]
pub trait PromptSection: Send + Sync {
    async fn render(&self, ctx: &PromptContext) -> anyhow::Result<String>;
}

/// Renders the agent's persona with `{{key}}` placeholders substituted from
/// the context metadata.  Unknown placeholders are left verbatim so a typo
/// is visible in the prompt rather than silently blank.
pub struct PersonaSection;

#[async_trait]
impl PromptSection for PersonaSection {
    async fn render(&self, ctx: &PromptContext) -> anyhow::Result<String> {
        Ok(substitute_placeholders(&ctx.agent.persona, &ctx.metadata))
    }
}

/// A fixed block of prompt text (used to wrap toolset-contributed
/// sections).
pub struct StaticSection(pub String);

#[async_trait]
impl PromptSection for StaticSection {
    async fn render(&self, _ctx: &PromptContext) -> anyhow::Result<String> {
        Ok(self.0.clone())
    }
}

fn substitute_placeholders(
    template: &str,
    metadata: &HashMap<String, serde_json::Value>,
) -> String {
    let mut out = template.to_string();
    for (key, value) in metadata {
        let needle = format!("{{{{{key}}}}}");
        if out.contains(&needle) {
            let replacement = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            out = out.replace(&needle, &replacement);
        }
    }
    out
}

/// Joins section output into the final system prompt.
pub struct PromptBuilder {
    sections: Vec<Arc<dyn PromptSection>>,
}

impl PromptBuilder {
    pub fn new(sections: Vec<Arc<dyn PromptSection>>) -> Self {
        Self { sections }
    }

    /// Persona only: the default when an agent configures nothing else.
    pub fn default_sections() -> Self {
        Self::new(vec![Arc::new(PersonaSection)])
    }

    /// Render all sections, then any toolset-contributed texts, joined by
    /// blank lines.  Sections that render empty are dropped.
    pub async fn render(
        &self,
        ctx: &PromptContext,
        tool_sections: &[String],
    ) -> anyhow::Result<String> {
        let mut parts = Vec::with_capacity(self.sections.len() + tool_sections.len());
        for section in &self.sections {
            let text = section.render(ctx).await?;
            if !text.trim().is_empty() {
                parts.push(text);
            }
        }
        for text in tool_sections {
            if !text.trim().is_empty() {
                parts.push(text.clone());
            }
        }
        Ok(parts.join("\n\n"))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
