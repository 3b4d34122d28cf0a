// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Stdio transport: the tool server runs as a child process and speaks
//! line-delimited JSON-RPC over its stdin/stdout.

use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::{debug, warn};

use crate::client::ToolServerClient;
use crate::config::ToolServerConfig;
use crate::proto::{
    call_result_text, parse_tool_list, RemoteToolInfo, RpcRequest, RpcResponse, PROTOCOL_VERSION,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

struct StdioChannel {
    child: Child,
    writer: FramedWrite<ChildStdin, LinesCodec>,
    reader: FramedRead<ChildStdout, LinesCodec>,
}

pub struct StdioToolServer {
    name: String,
    channel: Mutex<StdioChannel>,
    next_id: AtomicU64,
}

impl StdioToolServer {
    /// Spawn the configured child process and wire up its pipes.
    pub fn connect(name: impl Into<String>, cfg: &ToolServerConfig) -> anyhow::Result<Self> {
        let command = cfg
            .command
            .as_deref()
            .context("stdio tool server requires 'command'")?;
        let mut child = Command::new(command)
            .args(&cfg.args)
            .envs(&cfg.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawning tool server '{command}'"))?;

        let stdin = child.stdin.take().context("child stdin unavailable")?;
        let stdout = child.stdout.take().context("child stdout unavailable")?;

        Ok(Self {
            name: name.into(),
            channel: Mutex::new(StdioChannel {
                child,
                writer: FramedWrite::new(stdin, LinesCodec::new()),
                reader: FramedRead::new(stdout, LinesCodec::new()),
            }),
            next_id: AtomicU64::new(1),
        })
    }

    /// One request/response exchange.  Notification lines (no `id`) and
    /// responses to other requests are skipped; the wait is bounded so a
    /// wedged server cannot hang a turn forever.
    async fn request(&self, method: &str, params: Option<Value>) -> anyhow::Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let line = serde_json::to_string(&RpcRequest::new(id, method, params))?;
        let mut channel = self.channel.lock().await;
        channel.writer.send(line).await.context("writing to tool server")?;

        let deadline = tokio::time::Instant::now() + REQUEST_TIMEOUT;
        loop {
            let next = tokio::time::timeout_at(deadline, channel.reader.next()).await;
            let frame = match next {
                Err(_) => bail!("tool server '{}' timed out on {method}", self.name),
                Ok(None) => bail!("tool server '{}' closed its stdout", self.name),
                Ok(Some(frame)) => frame.context("reading from tool server")?,
            };
            let resp: RpcResponse = match serde_json::from_str(&frame) {
                Ok(r) => r,
                Err(e) => {
                    debug!(server = %self.name, error = %e, "skipping non-JSON-RPC line");
                    continue;
                }
            };
            match resp.id {
                Some(got) if got == id => {
                    if let Some(err) = resp.error {
                        bail!("tool server '{}' error {}: {}", self.name, err.code, err.message);
                    }
                    return Ok(resp.result.unwrap_or(Value::Null));
                }
                _ => continue,
            }
        }
    }
}

#[async_trait]
impl ToolServerClient for StdioToolServer {
    fn server_name(&self) -> &str {
        &self.name
    }

    async fn initialize(&self) -> anyhow::Result<()> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "clientInfo": { "name": "parley", "version": env!("CARGO_PKG_VERSION") },
        });
        self.request("initialize", Some(params)).await?;
        Ok(())
    }

    async fn list_tools(&self) -> anyhow::Result<Vec<RemoteToolInfo>> {
        let result = self.request("tools/list", None).await?;
        Ok(parse_tool_list(&result))
    }

    async fn call_tool(&self, name: &str, args: Value) -> anyhow::Result<String> {
        let result = self
            .request("tools/call", Some(json!({ "name": name, "arguments": args })))
            .await?;
        Ok(call_result_text(&result))
    }

    async fn shutdown(&self) -> anyhow::Result<()> {
        let mut channel = self.channel.lock().await;
        if let Err(e) = channel.child.start_kill() {
            warn!(server = %self.name, error = %e, "failed to stop tool server child");
        }
        Ok(())
    }
}
