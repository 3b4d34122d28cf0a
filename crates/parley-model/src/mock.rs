// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Scripted provider for deterministic tests.
//!
//! A script is a list of turns; each turn is the list of fragments the
//! provider streams for one `complete()` call.  Scripts can be built in
//! code or loaded from YAML, and can inject connection or mid-stream
//! failures to exercise the retry path.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Deserialize;

use crate::{
    provider::FragmentStream, CompletionRequest, FinishReason, ModelProvider, ProviderError,
    ResponseFragment,
};

/// One scripted item.  The YAML form uses the variant name as the key:
///
/// ```yaml
/// - - text: "Hi there"
///   - finish: stop
/// - - tool_call: { index: 0, id: c1, name: calculator-evaluate, arguments: "{}" }
///   - finish: tool_calls
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptItem {
    Text(String),
    Thought(String),
    ThoughtDone,
    ToolCall {
        index: u32,
        #[serde(default)]
        id: String,
        #[serde(default)]
        name: String,
        #[serde(default)]
        arguments: String,
    },
    Usage {
        input_tokens: u32,
        output_tokens: u32,
    },
    Finish(FinishReason),
    /// Fail the `complete()` call itself with a transient error.
    ConnectError(String),
    /// Fail mid-stream with a transient error after earlier items played.
    StreamError(String),
    /// Fail the `complete()` call with a permanent error.
    PermanentError(String),
}

pub struct ScriptedProvider {
    name: String,
    turns: Mutex<VecDeque<Vec<ScriptItem>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    pub fn new(turns: Vec<Vec<ScriptItem>>) -> Self {
        Self {
            name: "scripted".into(),
            turns: Mutex::new(turns.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Parse a script from YAML (a list of turns, each a list of items).
    pub fn from_yaml(text: &str) -> anyhow::Result<Self> {
        let turns: Vec<Vec<ScriptItem>> = serde_yaml::from_str(text)?;
        Ok(Self::new(turns))
    }

    /// Convenience: one turn that streams `text` and stops.
    pub fn reply(text: &str) -> Self {
        Self::new(vec![vec![
            ScriptItem::Text(text.to_string()),
            ScriptItem::Finish(FinishReason::Stop),
        ]])
    }

    /// Every request this provider has received, for assertions.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn remaining_turns(&self) -> usize {
        self.turns.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn tool_format(&self) -> &str {
        "openai"
    }

    async fn complete(&self, req: CompletionRequest) -> Result<FragmentStream, ProviderError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(req);

        let turn = self
            .turns
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .ok_or_else(|| ProviderError::Permanent("mock script exhausted".into()))?;

        let mut fragments: Vec<Result<ResponseFragment, ProviderError>> = Vec::new();
        for item in turn {
            match item {
                ScriptItem::ConnectError(msg) => return Err(ProviderError::Transient(msg)),
                ScriptItem::PermanentError(msg) => return Err(ProviderError::Permanent(msg)),
                ScriptItem::StreamError(msg) => {
                    fragments.push(Err(ProviderError::Transient(msg)));
                }
                ScriptItem::Text(t) => fragments.push(Ok(ResponseFragment::TextDelta(t))),
                ScriptItem::Thought(t) => fragments.push(Ok(ResponseFragment::ThoughtDelta(t))),
                ScriptItem::ThoughtDone => fragments.push(Ok(ResponseFragment::ThoughtDone)),
                ScriptItem::ToolCall { index, id, name, arguments } => fragments.push(Ok(
                    ResponseFragment::ToolCallFragment { index, id, name, arguments },
                )),
                ScriptItem::Usage { input_tokens, output_tokens } => {
                    fragments.push(Ok(ResponseFragment::Usage { input_tokens, output_tokens }))
                }
                ScriptItem::Finish(reason) => {
                    fragments.push(Ok(ResponseFragment::Finish(reason)))
                }
            }
        }
        fragments.push(Ok(ResponseFragment::Done));

        Ok(Box::pin(futures::stream::iter(fragments)))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
