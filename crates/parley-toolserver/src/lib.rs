// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod client;
pub mod config;
pub mod http;
pub mod proto;
pub mod stdio;
pub mod toolset;

use std::sync::Arc;

use tracing::warn;

pub use client::ToolServerClient;
pub use config::{SecurityConfig, ToolServerConfig, ToolServersConfig, TransportType};
pub use http::HttpToolServer;
pub use proto::{RemoteToolInfo, RpcRequest, RpcResponse};
pub use stdio::StdioToolServer;
pub use toolset::{toolset_name_for_server, ServerToolset};

/// Connect every configured server and register the resulting toolsets on
/// `chest`.  A server that fails to connect or enumerate is skipped with a
/// warning; the others stay usable.
pub async fn register_servers(
    chest: &parley_tools::ToolChest,
    config: &ToolServersConfig,
) -> Vec<Arc<ServerToolset>> {
    let mut registered = Vec::new();
    for (name, server_cfg) in &config.servers {
        let client: anyhow::Result<Arc<dyn ToolServerClient>> = match server_cfg.transport_type {
            TransportType::Stdio => {
                StdioToolServer::connect(name.clone(), server_cfg).map(|c| Arc::new(c) as _)
            }
            TransportType::Sse => {
                HttpToolServer::connect(name.clone(), server_cfg).map(|c| Arc::new(c) as _)
            }
        };
        let client = match client {
            Ok(c) => c,
            Err(e) => {
                warn!(server = %name, error = %e, "skipping tool server");
                continue;
            }
        };
        match ServerToolset::connect(client, &config.security).await {
            Ok(toolset) => {
                let toolset = Arc::new(toolset);
                chest.register(toolset.clone());
                registered.push(toolset);
            }
            Err(e) => {
                warn!(server = %name, error = %e, "tool server failed to initialize");
            }
        }
    }
    registered
}
