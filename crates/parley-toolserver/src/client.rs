// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::Value;

use crate::proto::RemoteToolInfo;

/// A connection to one external tool server, independent of transport.
#[async_trait]
pub trait ToolServerClient: Send + Sync {
    /// The configured server name.
    fn server_name(&self) -> &str;

    /// Perform the `initialize` handshake.  Must be called once before
    /// enumeration or dispatch.
    async fn initialize(&self) -> anyhow::Result<()>;

    /// Enumerate the tools this server exposes.
    async fn list_tools(&self) -> anyhow::Result<Vec<RemoteToolInfo>>;

    /// Invoke one tool and return its flattened text result.
    async fn call_tool(&self, name: &str, args: Value) -> anyhow::Result<String>;

    /// Release the connection (terminate the child / drop the HTTP session).
    async fn shutdown(&self) -> anyhow::Result<()>;
}
