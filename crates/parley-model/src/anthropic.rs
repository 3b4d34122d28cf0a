// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Streaming driver for the Anthropic Messages API.
//!
//! The wire format differs from OpenAI in three ways that matter here:
//! the system prompt travels as a top-level `system` field, tool calls are
//! `tool_use` content blocks whose arguments stream as `input_json_delta`
//! fragments, and reasoning arrives as dedicated `thinking` blocks with an
//! explicit block boundary.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::{
    provider::FragmentStream, ChatMessage, CompletionRequest, ContentBlock, FinishReason,
    ModelProvider, ProviderError, ResponseFragment, Role,
};

const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct AnthropicProvider {
    model: String,
    api_key: String,
    messages_url: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(model: impl Into<String>, api_key: impl Into<String>, base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            model: model.into(),
            api_key: api_key.into(),
            messages_url: format!("{base}/v1/messages"),
            client: reqwest::Client::new(),
        }
    }

    /// Hosted endpoint with the key from `ANTHROPIC_API_KEY`.
    pub fn from_env(model: impl Into<String>) -> Option<Self> {
        let key = std::env::var("ANTHROPIC_API_KEY").ok()?;
        Some(Self::new(model, key, "https://api.anthropic.com"))
    }
}

#[async_trait]
impl ModelProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn tool_format(&self) -> &str {
        "anthropic"
    }

    fn input_modalities(&self) -> Vec<crate::sanitize::InputModality> {
        use crate::sanitize::InputModality;
        // Text and vision; audio clips and raw file blocks have no wire
        // representation on this API.
        vec![InputModality::Text, InputModality::Image]
    }

    async fn complete(&self, req: CompletionRequest) -> Result<FragmentStream, ProviderError> {
        let (system, messages) = build_wire_messages(&req.messages);

        let tools: Vec<Value> = req
            .tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "input_schema": t.parameters,
                })
            })
            .collect();

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": req.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "stream": true,
        });
        if let Some(system) = system {
            body["system"] = json!(system);
        }
        if let Some(t) = req.temperature {
            body["temperature"] = json!(t);
        }
        if let Some(budget) = req.budget_tokens {
            body["thinking"] = json!({ "type": "enabled", "budget_tokens": budget });
        }
        if !tools.is_empty() {
            body["tools"] = json!(tools);
        }

        debug!(model = %self.model, tool_count = tools.len(), "sending completion request");

        let resp = self
            .client
            .post(&self.messages_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let retry_after = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs);
            let text = resp.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, retry_after, text));
        }

        let byte_stream = resp.bytes_stream();
        let fragment_stream = byte_stream
            .scan(SseState::default(), |state, chunk| {
                let fragments = match chunk {
                    Ok(b) => {
                        state.buf.push_str(&String::from_utf8_lossy(&b));
                        state.drain()
                    }
                    Err(e) => vec![Err(ProviderError::Transient(e.to_string()))],
                };
                std::future::ready(Some(fragments))
            })
            .flat_map(futures::stream::iter);

        Ok(Box::pin(fragment_stream))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BlockKind {
    Text,
    Thinking,
    ToolUse,
}

/// Line buffer plus per-index block bookkeeping for one SSE stream.
#[derive(Default)]
struct SseState {
    buf: String,
    blocks: HashMap<u32, BlockKind>,
    input_tokens: u32,
}

impl SseState {
    fn drain(&mut self) -> Vec<Result<ResponseFragment, ProviderError>> {
        let mut out = Vec::new();
        while let Some(nl_pos) = self.buf.find('\n') {
            let line = self.buf[..nl_pos].trim_end_matches('\r').to_string();
            self.buf = self.buf[nl_pos + 1..].to_string();
            let Some(data) = line.strip_prefix("data: ") else {
                continue;
            };
            match serde_json::from_str::<Value>(data.trim()) {
                Ok(v) => out.extend(self.parse_event(&v).into_iter().map(Ok)),
                Err(e) => warn!(error = %e, "skipping unparseable SSE chunk"),
            }
        }
        out
    }

    fn parse_event(&mut self, v: &Value) -> Vec<ResponseFragment> {
        match v["type"].as_str().unwrap_or_default() {
            "message_start" => {
                self.input_tokens =
                    v["message"]["usage"]["input_tokens"].as_u64().unwrap_or(0) as u32;
                vec![]
            }
            "content_block_start" => {
                let index = v["index"].as_u64().unwrap_or(0) as u32;
                let block = &v["content_block"];
                match block["type"].as_str().unwrap_or_default() {
                    "tool_use" => {
                        self.blocks.insert(index, BlockKind::ToolUse);
                        vec![ResponseFragment::ToolCallFragment {
                            index,
                            id: block["id"].as_str().unwrap_or("").to_string(),
                            name: block["name"].as_str().unwrap_or("").to_string(),
                            arguments: String::new(),
                        }]
                    }
                    "thinking" => {
                        self.blocks.insert(index, BlockKind::Thinking);
                        vec![]
                    }
                    _ => {
                        self.blocks.insert(index, BlockKind::Text);
                        vec![]
                    }
                }
            }
            "content_block_delta" => {
                let index = v["index"].as_u64().unwrap_or(0) as u32;
                let delta = &v["delta"];
                match delta["type"].as_str().unwrap_or_default() {
                    "text_delta" => delta["text"]
                        .as_str()
                        .filter(|t| !t.is_empty())
                        .map(|t| vec![ResponseFragment::TextDelta(t.to_string())])
                        .unwrap_or_default(),
                    "thinking_delta" => delta["thinking"]
                        .as_str()
                        .filter(|t| !t.is_empty())
                        .map(|t| vec![ResponseFragment::ThoughtDelta(t.to_string())])
                        .unwrap_or_default(),
                    "input_json_delta" => vec![ResponseFragment::ToolCallFragment {
                        index,
                        id: String::new(),
                        name: String::new(),
                        arguments: delta["partial_json"].as_str().unwrap_or("").to_string(),
                    }],
                    _ => vec![],
                }
            }
            "content_block_stop" => {
                let index = v["index"].as_u64().unwrap_or(0) as u32;
                match self.blocks.remove(&index) {
                    Some(BlockKind::Thinking) => vec![ResponseFragment::ThoughtDone],
                    _ => vec![],
                }
            }
            "message_delta" => {
                let mut out = Vec::new();
                if let Some(reason) = v["delta"]["stop_reason"].as_str() {
                    let mapped = match reason {
                        "end_turn" | "stop_sequence" => FinishReason::Stop,
                        "tool_use" => FinishReason::ToolCalls,
                        "max_tokens" => FinishReason::Length,
                        other => FinishReason::Other(other.to_string()),
                    };
                    out.push(ResponseFragment::Finish(mapped));
                }
                if let Some(output) = v["usage"]["output_tokens"].as_u64() {
                    out.push(ResponseFragment::Usage {
                        input_tokens: self.input_tokens,
                        output_tokens: output as u32,
                    });
                }
                out
            }
            "message_stop" => vec![ResponseFragment::Done],
            _ => vec![],
        }
    }
}

/// Split history into the top-level `system` string and the wire message
/// array.  Tool calls become `tool_use` blocks on assistant messages; tool
/// results become `tool_result` blocks on user messages.
fn build_wire_messages(messages: &[ChatMessage]) -> (Option<String>, Vec<Value>) {
    let mut system = None;
    let mut out: Vec<Value> = Vec::with_capacity(messages.len());

    for msg in messages {
        match msg.role {
            Role::System | Role::Developer => {
                system = Some(msg.joined_text());
            }
            Role::Assistant => {
                if let Some(calls) = &msg.tool_calls {
                    let blocks: Vec<Value> = calls
                        .iter()
                        .map(|c| {
                            let input: Value = serde_json::from_str(&c.arguments)
                                .unwrap_or_else(|_| json!({}));
                            json!({
                                "type": "tool_use",
                                "id": c.id,
                                "name": c.name,
                                "input": input,
                            })
                        })
                        .collect();
                    out.push(json!({ "role": "assistant", "content": blocks }));
                } else {
                    out.push(json!({ "role": "assistant", "content": msg.joined_text() }));
                }
            }
            Role::Tool => {
                if let Some(results) = &msg.tool_results {
                    let blocks: Vec<Value> = results
                        .iter()
                        .map(|r| {
                            json!({
                                "type": "tool_result",
                                "tool_use_id": r.tool_call_id,
                                "content": r.content,
                            })
                        })
                        .collect();
                    out.push(json!({ "role": "user", "content": blocks }));
                }
            }
            Role::User => {
                if msg.has_media() {
                    let blocks: Vec<Value> = msg
                        .content
                        .iter()
                        .filter_map(|block| match block {
                            ContentBlock::Text { text } => {
                                Some(json!({ "type": "text", "text": text }))
                            }
                            ContentBlock::Image { url: Some(url), mime_type, .. } => {
                                let data =
                                    url.rsplit_once("base64,").map(|(_, d)| d).unwrap_or(url);
                                Some(json!({
                                    "type": "image",
                                    "source": {
                                        "type": "base64",
                                        "media_type": mime_type,
                                        "data": data,
                                    },
                                }))
                            }
                            other => {
                                warn!(?other, "dropping unsupported media block");
                                None
                            }
                        })
                        .collect();
                    out.push(json!({ "role": "user", "content": blocks }));
                } else {
                    out.push(json!({ "role": "user", "content": msg.joined_text() }));
                }
            }
        }
    }

    (system, out)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
