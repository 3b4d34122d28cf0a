// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Streaming driver for OpenAI-compatible chat completion APIs.
//!
//! One driver covers every endpoint that speaks the `/chat/completions`
//! SSE wire format: OpenAI itself, Azure OpenAI (deployment URL + `api-key`
//! header), and local proxies.  The Azure variant is configured entirely
//! from the `AZURE_OPENAI_*` environment variables.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::{
    provider::FragmentStream, ChatMessage, CompletionRequest, ContentBlock, FinishReason,
    ModelProvider, ProviderError, ResponseFragment, Role,
};

/// How to attach the API key to HTTP requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStyle {
    /// `Authorization: Bearer <key>` — standard for most providers.
    Bearer,
    /// `api-key: <key>` — Azure OpenAI style.
    ApiKeyHeader,
    /// No authentication header — local servers.
    None,
}

pub struct OpenAICompatProvider {
    driver_name: &'static str,
    model: String,
    api_key: Option<String>,
    chat_url: String,
    client: reqwest::Client,
    auth_style: AuthStyle,
}

impl OpenAICompatProvider {
    /// Construct from an API base that ends before `/chat/completions`.
    pub fn new(
        driver_name: &'static str,
        model: impl Into<String>,
        api_key: Option<String>,
        base_url: &str,
        auth_style: AuthStyle,
    ) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            driver_name,
            model: model.into(),
            api_key,
            chat_url: format!("{base}/chat/completions"),
            client: reqwest::Client::new(),
            auth_style,
        }
    }

    /// Standard OpenAI endpoint; the key comes from `OPENAI_API_KEY` unless
    /// supplied explicitly.
    pub fn openai(model: impl Into<String>, api_key: Option<String>) -> Self {
        let key = api_key.or_else(|| std::env::var("OPENAI_API_KEY").ok());
        Self::new("openai", model, key, "https://api.openai.com/v1", AuthStyle::Bearer)
    }

    /// Azure OpenAI from the environment.  Returns `None` unless both
    /// `AZURE_OPENAI_ENDPOINT` and `AZURE_OPENAI_API_KEY` are set; the model
    /// (deployment) id comes from `AZURE_OPENAI_MODEL` when present.
    pub fn azure_from_env(fallback_model: &str) -> Option<Self> {
        let endpoint = std::env::var("AZURE_OPENAI_ENDPOINT").ok()?;
        let api_key = std::env::var("AZURE_OPENAI_API_KEY").ok()?;
        let api_version = std::env::var("AZURE_OPENAI_API_VERSION")
            .unwrap_or_else(|_| "2024-03-01-preview".to_string());
        let model =
            std::env::var("AZURE_OPENAI_MODEL").unwrap_or_else(|_| fallback_model.to_string());
        let endpoint = endpoint.trim_end_matches('/');
        Some(Self {
            driver_name: "azure",
            chat_url: format!(
                "{endpoint}/openai/deployments/{model}/chat/completions?api-version={api_version}"
            ),
            model,
            api_key: Some(api_key),
            client: reqwest::Client::new(),
            auth_style: AuthStyle::ApiKeyHeader,
        })
    }
}

#[async_trait]
impl ModelProvider for OpenAICompatProvider {
    fn name(&self) -> &str {
        self.driver_name
    }

    fn tool_format(&self) -> &str {
        "openai"
    }

    async fn complete(&self, req: CompletionRequest) -> Result<FragmentStream, ProviderError> {
        let messages = build_wire_messages(&req.messages);

        let tools: Vec<Value> = req
            .tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect();

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "stream": true,
            "stream_options": { "include_usage": true },
        });
        if let Some(t) = req.temperature {
            body["temperature"] = json!(t);
        }
        if let Some(max) = req.max_tokens {
            // Newer OpenAI models take max_completion_tokens; other
            // compatible endpoints still expect max_tokens.
            let key = if self.driver_name == "openai" {
                "max_completion_tokens"
            } else {
                "max_tokens"
            };
            body[key] = json!(max);
        }
        if let Some(effort) = req.reasoning_effort {
            body["reasoning_effort"] = serde_json::to_value(effort).unwrap_or(Value::Null);
        }
        if !tools.is_empty() {
            body["tools"] = json!(tools);
        }

        debug!(
            driver = %self.driver_name,
            model = %self.model,
            tool_count = tools.len(),
            message_count = req.messages.len(),
            "sending completion request"
        );

        let mut http_req = self.client.post(&self.chat_url).json(&body);
        http_req = match self.auth_style {
            AuthStyle::Bearer => {
                let key = self.api_key.as_deref().ok_or_else(|| {
                    ProviderError::Permanent("API key not set for bearer auth".into())
                })?;
                http_req.bearer_auth(key)
            }
            AuthStyle::ApiKeyHeader => {
                let key = self.api_key.as_deref().ok_or_else(|| {
                    ProviderError::Permanent("API key not set for api-key auth".into())
                })?;
                http_req.header("api-key", key)
            }
            AuthStyle::None => http_req,
        };

        let resp = http_req.send().await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let retry_after = parse_retry_after(resp.headers());
            let text = resp.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, retry_after, text));
        }

        // SSE events can be split across TCP packets; keep a line buffer
        // across chunks and emit fragments only for complete lines.
        let byte_stream = resp.bytes_stream();
        let fragment_stream = byte_stream
            .scan(String::new(), |buf, chunk| {
                let fragments: Vec<Result<ResponseFragment, ProviderError>> = match chunk {
                    Ok(b) => {
                        buf.push_str(&String::from_utf8_lossy(&b));
                        drain_complete_sse_lines(buf)
                    }
                    Err(e) => vec![Err(ProviderError::Transient(e.to_string()))],
                };
                std::future::ready(Some(fragments))
            })
            .flat_map(futures::stream::iter);

        Ok(Box::pin(fragment_stream))
    }
}

fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Drain all complete `\n`-terminated SSE lines from `buf`, leaving any
/// trailing incomplete line in place for the next chunk.
pub(crate) fn drain_complete_sse_lines(
    buf: &mut String,
) -> Vec<Result<ResponseFragment, ProviderError>> {
    let mut out = Vec::new();
    while let Some(nl_pos) = buf.find('\n') {
        let line = buf[..nl_pos].trim_end_matches('\r').to_string();
        *buf = buf[nl_pos + 1..].to_string();
        if let Some(data) = line.strip_prefix("data: ") {
            let data = data.trim();
            if data.is_empty() {
                continue;
            }
            if data == "[DONE]" {
                out.push(Ok(ResponseFragment::Done));
                continue;
            }
            match serde_json::from_str::<Value>(data) {
                Ok(v) => out.extend(parse_sse_chunk(&v).into_iter().map(Ok)),
                Err(e) => warn!(error = %e, "skipping unparseable SSE chunk"),
            }
        }
    }
    out
}

/// Translate one parsed SSE chunk into zero or more fragments.
fn parse_sse_chunk(v: &Value) -> Vec<ResponseFragment> {
    // Usage-only chunk (stream_options.include_usage).
    if let Some(usage) = v.get("usage").filter(|u| !u.is_null()) {
        return vec![ResponseFragment::Usage {
            input_tokens: usage["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            output_tokens: usage["completion_tokens"].as_u64().unwrap_or(0) as u32,
        }];
    }

    let choice = &v["choices"][0];
    let mut out = Vec::new();

    let delta = &choice["delta"];
    if let Some(tool_calls) = delta.get("tool_calls").and_then(|t| t.as_array()) {
        for tc in tool_calls {
            out.push(ResponseFragment::ToolCallFragment {
                index: tc["index"].as_u64().unwrap_or(0) as u32,
                id: tc["id"].as_str().unwrap_or("").to_string(),
                name: tc["function"]["name"].as_str().unwrap_or("").to_string(),
                arguments: tc["function"]["arguments"].as_str().unwrap_or("").to_string(),
            });
        }
    } else if let Some(thinking) = delta
        .get("reasoning_content")
        .and_then(|c| c.as_str())
        .or_else(|| delta.get("reasoning").and_then(|c| c.as_str()))
    {
        if !thinking.is_empty() {
            out.push(ResponseFragment::ThoughtDelta(thinking.to_string()));
        }
    } else if let Some(text) = delta.get("content").and_then(|c| c.as_str()) {
        if !text.is_empty() {
            out.push(ResponseFragment::TextDelta(text.to_string()));
        }
    }

    if let Some(reason) = choice["finish_reason"].as_str() {
        let mapped = match reason {
            "stop" => FinishReason::Stop,
            "tool_calls" => FinishReason::ToolCalls,
            "length" => FinishReason::Length,
            "content_filter" => FinishReason::ContentFilter,
            other => FinishReason::Other(other.to_string()),
        };
        out.push(ResponseFragment::Finish(mapped));
    }

    out
}

fn wire_role(role: Role) -> &'static str {
    role.as_str()
}

/// Convert history messages into the OpenAI wire-format JSON array.
///
/// Extracted as a free function so it can be unit-tested without HTTP.
pub(crate) fn build_wire_messages(messages: &[ChatMessage]) -> Vec<Value> {
    let mut out = Vec::with_capacity(messages.len());
    for msg in messages {
        if let Some(calls) = &msg.tool_calls {
            let tool_calls: Vec<Value> = calls
                .iter()
                .map(|c| {
                    json!({
                        "id": c.id,
                        "type": "function",
                        "function": { "name": c.name, "arguments": c.arguments },
                    })
                })
                .collect();
            out.push(json!({
                "role": "assistant",
                "content": msg.joined_text(),
                "tool_calls": tool_calls,
            }));
            continue;
        }
        if let Some(results) = &msg.tool_results {
            for r in results {
                out.push(json!({
                    "role": "tool",
                    "tool_call_id": r.tool_call_id,
                    "name": r.name,
                    "content": r.content,
                }));
            }
            continue;
        }
        if msg.has_media() {
            let parts: Vec<Value> = msg
                .content
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } => Some(json!({ "type": "text", "text": text })),
                    ContentBlock::Image { url: Some(url), .. } => {
                        Some(json!({ "type": "image_url", "image_url": { "url": url } }))
                    }
                    ContentBlock::File { file_id, .. } => {
                        Some(json!({ "type": "file", "file": { "file_id": file_id } }))
                    }
                    ContentBlock::Audio { url: Some(url), mime_type, .. } => {
                        let format = mime_type.strip_prefix("audio/").unwrap_or("wav");
                        let data = url.rsplit_once("base64,").map(|(_, d)| d).unwrap_or(url);
                        Some(json!({
                            "type": "input_audio",
                            "input_audio": { "data": data, "format": format },
                        }))
                    }
                    other => {
                        warn!(?other, "dropping media block with no resolved location");
                        None
                    }
                })
                .collect();
            out.push(json!({ "role": wire_role(msg.role), "content": parts }));
            continue;
        }
        out.push(json!({ "role": wire_role(msg.role), "content": msg.joined_text() }));
    }
    out
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
