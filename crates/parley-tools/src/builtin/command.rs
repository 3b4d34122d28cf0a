// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::debug;

use crate::policy::PolicyStore;
use crate::toolset::{ToolContext, ToolDescriptor, Toolset};

const MAX_OUTPUT_CHARS: usize = 50_000;

/// Policy-gated external command execution.
///
/// Only commands with a loaded policy can run at all; the policy's flag and
/// subcommand tables are enforced before anything is spawned, and its
/// `default_timeout` bounds the child process.
pub struct CommandToolset {
    policies: Arc<PolicyStore>,
}

impl CommandToolset {
    pub fn new(policies: Arc<PolicyStore>) -> Self {
        Self { policies }
    }
}

#[async_trait]
impl Toolset for CommandToolset {
    fn name(&self) -> &str {
        "command"
    }

    fn tools(&self) -> Vec<ToolDescriptor> {
        vec![ToolDescriptor {
            name: "run".into(),
            description: "Run an allowed external command and return its output. \
                          Only commands with a configured security policy can run; \
                          flags are checked against the policy before execution."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "command": { "type": "string", "description": "Command name, e.g. \"ls\"" },
                    "args": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Arguments passed to the command"
                    }
                },
                "required": ["command"],
                "additionalProperties": false
            }),
        }]
    }

    async fn call(&self, function: &str, args: Value, _ctx: &ToolContext) -> anyhow::Result<String> {
        if function != "run" {
            anyhow::bail!("no function '{function}' on command");
        }
        let command = args
            .get("command")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("missing 'command'"))?;
        let argv: Vec<String> = args
            .get("args")
            .and_then(|v| v.as_array())
            .map(|a| {
                a.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        let Some(policy) = self.policies.get(command) else {
            anyhow::bail!("command '{command}' has no security policy and cannot run");
        };
        policy.validate(&argv).map_err(|e| anyhow::anyhow!(e))?;

        debug!(command = %command, args = ?argv, timeout = ?policy.default_timeout, "running command");

        let child = Command::new(command)
            .args(&argv)
            .kill_on_drop(true)
            .output();
        let output = tokio::time::timeout(policy.default_timeout, child)
            .await
            .map_err(|_| {
                anyhow::anyhow!(
                    "command '{command}' timed out after {:?}",
                    policy.default_timeout
                )
            })??;

        let mut text = String::from_utf8_lossy(&output.stdout).to_string();
        if !output.stderr.is_empty() {
            text.push_str(&String::from_utf8_lossy(&output.stderr));
        }
        if !output.status.success() {
            text.push_str(&format!("\n[exit status: {}]", output.status));
        }
        if text.len() > MAX_OUTPUT_CHARS {
            text.truncate(MAX_OUTPUT_CHARS);
            text.push_str("\n[output truncated]");
        }
        Ok(text)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
