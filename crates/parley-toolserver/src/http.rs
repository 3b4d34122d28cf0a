// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Streaming HTTP transport: requests POST to the configured endpoint and
//! the server answers either with a plain JSON body or with an SSE stream
//! whose `data:` lines carry JSON-RPC responses.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tracing::debug;

use crate::client::ToolServerClient;
use crate::config::ToolServerConfig;
use crate::proto::{
    call_result_text, parse_tool_list, RemoteToolInfo, RpcRequest, RpcResponse, PROTOCOL_VERSION,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpToolServer {
    name: String,
    url: String,
    headers: Vec<(String, String)>,
    timeout: Duration,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl HttpToolServer {
    pub fn connect(name: impl Into<String>, cfg: &ToolServerConfig) -> anyhow::Result<Self> {
        let url = cfg
            .url
            .clone()
            .context("sse tool server requires 'url'")?;
        url::Url::parse(&url).with_context(|| format!("invalid tool server url '{url}'"))?;
        Ok(Self {
            name: name.into(),
            url,
            headers: cfg.headers.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            timeout: cfg
                .timeout
                .map(Duration::from_secs_f64)
                .unwrap_or(DEFAULT_TIMEOUT),
            client: reqwest::Client::new(),
            next_id: AtomicU64::new(1),
        })
    }

    async fn request(&self, method: &str, params: Option<Value>) -> anyhow::Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = RpcRequest::new(id, method, params);

        let mut req = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&body);
        for (name, value) in &self.headers {
            req = req.header(name.as_str(), value.as_str());
        }

        let resp = req
            .send()
            .await
            .with_context(|| format!("tool server '{}' request failed", self.name))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("tool server '{}' error {status}: {text}", self.name);
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let rpc: RpcResponse = if content_type.starts_with("text/event-stream") {
            self.read_sse_response(resp, id).await?
        } else {
            resp.json().await.context("parsing tool server response")?
        };

        if let Some(err) = rpc.error {
            bail!("tool server '{}' error {}: {}", self.name, err.code, err.message);
        }
        Ok(rpc.result.unwrap_or(Value::Null))
    }

    /// Scan SSE `data:` lines until the response with our request id shows
    /// up.  Other lines (progress notifications, keep-alives) are skipped.
    async fn read_sse_response(
        &self,
        resp: reqwest::Response,
        id: u64,
    ) -> anyhow::Result<RpcResponse> {
        let mut stream = resp.bytes_stream();
        let mut buf = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("reading tool server stream")?;
            buf.push_str(&String::from_utf8_lossy(&chunk));
            while let Some(nl_pos) = buf.find('\n') {
                let line = buf[..nl_pos].trim_end_matches('\r').to_string();
                buf = buf[nl_pos + 1..].to_string();
                let Some(data) = line.strip_prefix("data: ") else {
                    continue;
                };
                match serde_json::from_str::<RpcResponse>(data.trim()) {
                    Ok(rpc) if rpc.id == Some(id) => return Ok(rpc),
                    Ok(_) => continue,
                    Err(e) => debug!(server = %self.name, error = %e, "skipping SSE line"),
                }
            }
        }
        bail!("tool server '{}' stream ended before responding", self.name)
    }
}

#[async_trait]
impl ToolServerClient for HttpToolServer {
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
        Ok(())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
