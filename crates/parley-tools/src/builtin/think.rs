// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::toolset::{ToolContext, ToolDescriptor, Toolset};

const THINK_PROTOCOL: &str = "\
# Think protocol

Use the think-think tool to reason through a problem before acting.
Write out the steps, constraints, and candidate answers; the log is for
your own working memory and is never shown to the user.  Think before any
non-trivial tool use, and again when a result surprises you.";

/// Scratchpad toolset: the model records a thought, nothing is executed.
///
/// Thoughts are kept in memory so tests (and diagnostics) can inspect what
/// the model chose to write down.
#[derive(Default)]
pub struct ThinkToolset {
    thoughts: Mutex<Vec<String>>,
}

impl ThinkToolset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn thoughts(&self) -> Vec<String> {
        self.thoughts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Toolset for ThinkToolset {
    fn name(&self) -> &str {
        "think"
    }

    fn tools(&self) -> Vec<ToolDescriptor> {
        vec![ToolDescriptor {
            name: "think".into(),
            description: "Record a thought while reasoning through a problem. \
                          The thought is logged, nothing else happens."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "thought": { "type": "string", "description": "The thought to record" }
                },
                "required": ["thought"],
                "additionalProperties": false
            }),
        }]
    }

    async fn call(&self, function: &str, args: Value, _ctx: &ToolContext) -> anyhow::Result<String> {
        if function != "think" {
            anyhow::bail!("no function '{function}' on think");
        }
        let thought = args
            .get("thought")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        self.thoughts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(thought);
        Ok(String::new())
    }

    fn prompt_section_text(&self) -> Option<String> {
        Some(THINK_PROTOCOL.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn think_records_and_returns_empty() {
        let ts = ThinkToolset::new();
        let out = ts
            .call("think", json!({"thought": "2+2 is arithmetic"}), &ToolContext::default())
            .await
            .unwrap();
        assert!(out.is_empty());
        assert_eq!(ts.thoughts(), vec!["2+2 is arithmetic"]);
    }

    #[test]
    fn contributes_prompt_section() {
        assert!(ThinkToolset::new()
            .prompt_section_text()
            .unwrap()
            .contains("Think protocol"));
    }
}
