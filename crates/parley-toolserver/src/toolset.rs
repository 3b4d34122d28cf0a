// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Server-backed toolsets: tools enumerated from an external server become
//! callables in the chest under a server-derived toolset name.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use parley_tools::{ToolContext, ToolDescriptor, Toolset, TOOL_SEP};

use crate::client::ToolServerClient;
use crate::config::SecurityConfig;
use crate::proto::RemoteToolInfo;

/// Toolset name derived from a server name.  The chest separator is
/// reserved for `toolset-function` routing, so any occurrence inside the
/// server name is folded to an underscore.
pub fn toolset_name_for_server(server_name: &str) -> String {
    server_name.replace(TOOL_SEP, "_")
}

pub struct ServerToolset {
    toolset_name: String,
    client: Arc<dyn ToolServerClient>,
    tools: Vec<RemoteToolInfo>,
}

impl ServerToolset {
    /// Initialize the connection, enumerate the server's tools, and keep
    /// only those whose fully-qualified names pass the allow-list.
    pub async fn connect(
        client: Arc<dyn ToolServerClient>,
        security: &SecurityConfig,
    ) -> anyhow::Result<Self> {
        client.initialize().await?;
        let toolset_name = toolset_name_for_server(client.server_name());
        let all = client.list_tools().await?;
        let total = all.len();
        let tools: Vec<RemoteToolInfo> = all
            .into_iter()
            .filter(|tool| {
                let qualified = format!("{toolset_name}{TOOL_SEP}{}", tool.name);
                let allowed = security.is_tool_allowed(&qualified);
                if !allowed {
                    debug!(tool = %qualified, "tool excluded by allow-list");
                }
                allowed
            })
            .collect();
        if tools.is_empty() && total > 0 {
            warn!(
                server = %client.server_name(),
                total,
                "allow-list excluded every tool from this server"
            );
        }
        Ok(Self {
            toolset_name,
            client,
            tools,
        })
    }

    pub fn exposed_tools(&self) -> &[RemoteToolInfo] {
        &self.tools
    }

    pub async fn shutdown(&self) -> anyhow::Result<()> {
        self.client.shutdown().await
    }
}

#[async_trait]
impl Toolset for ServerToolset {
    fn name(&self) -> &str {
        &self.toolset_name
    }

    fn tools(&self) -> Vec<ToolDescriptor> {
        self.tools
            .iter()
            .map(|t| ToolDescriptor {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.input_schema.clone(),
            })
            .collect()
    }

    async fn call(&self, function: &str, args: Value, _ctx: &ToolContext) -> anyhow::Result<String> {
        if !self.tools.iter().any(|t| t.name == function) {
            anyhow::bail!("no function '{function}' on {}", self.toolset_name);
        }
        self.client.call_tool(function, args).await
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    struct FakeClient {
        name: String,
        tools: Vec<RemoteToolInfo>,
        calls: Mutex<Vec<(String, Value)>>,
    }

    #[async_trait]
    impl ToolServerClient for FakeClient {
        fn server_name(&self) -> &str {
            &self.name
        }
        async fn initialize(&self) -> anyhow::Result<()> {
            Ok(())
        }
        async fn list_tools(&self) -> anyhow::Result<Vec<RemoteToolInfo>> {
            Ok(self.tools.clone())
        }
        async fn call_tool(&self, name: &str, args: Value) -> anyhow::Result<String> {
            self.calls
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push((name.to_string(), args));
            Ok(format!("remote:{name}"))
        }
        async fn shutdown(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn fake(name: &str, tools: &[&str]) -> Arc<FakeClient> {
        Arc::new(FakeClient {
            name: name.into(),
            tools: tools
                .iter()
                .map(|t| RemoteToolInfo {
                    name: t.to_string(),
                    description: String::new(),
                    input_schema: json!({ "type": "object" }),
                })
                .collect(),
            calls: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn server_name_with_separator_is_folded() {
        let ts = ServerToolset::connect(fake("my-notes", &["create"]), &SecurityConfig::default())
            .await
            .unwrap();
        assert_eq!(ts.name(), "my_notes");
    }

    #[tokio::test]
    async fn allow_list_filters_enumeration() {
        let security = SecurityConfig {
            allowed_tools: vec!["notes-create".into()],
        };
        let ts = ServerToolset::connect(fake("notes", &["create", "delete"]), &security)
            .await
            .unwrap();
        assert_eq!(ts.exposed_tools().len(), 1);
        assert_eq!(ts.exposed_tools()[0].name, "create");
    }

    #[tokio::test]
    async fn call_routes_to_client() {
        let client = fake("notes", &["create"]);
        let ts = ServerToolset::connect(client.clone(), &SecurityConfig::default())
            .await
            .unwrap();
        let out = ts
            .call("create", json!({"title": "x"}), &ToolContext::default())
            .await
            .unwrap();
        assert_eq!(out, "remote:create");
        assert_eq!(client.calls.lock().unwrap()[0].0, "create");
    }

    #[tokio::test]
    async fn filtered_tool_is_not_callable() {
        let security = SecurityConfig {
            allowed_tools: vec!["notes-create".into()],
        };
        let ts = ServerToolset::connect(fake("notes", &["create", "delete"]), &security)
            .await
            .unwrap();
        assert!(ts
            .call("delete", json!({}), &ToolContext::default())
            .await
            .is_err());
    }
}
