// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The client connection seam.
//!
//! Transport framing (WebSocket, long-poll, whatever the host app uses) is
//! outside the core; the bridge only needs ordered JSON both ways.  The
//! in-memory implementation backs the test suites.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

/// One live client connection: ordered JSON in, ordered JSON out.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Send one JSON object to the client.
    async fn send(&self, payload: Value) -> anyhow::Result<()>;

    /// Receive the next JSON object from the client; `None` when the
    /// client disconnected.
    async fn receive(&self) -> anyhow::Result<Option<Value>>;
}

/// Scripted connection: a fixed inbound sequence, outbound captured.
#[derive(Default)]
pub struct InMemoryConnection {
    inbound: Mutex<VecDeque<Value>>,
    outbound: Mutex<Vec<Value>>,
}

impl InMemoryConnection {
    pub fn with_inbound(frames: Vec<Value>) -> Self {
        Self {
            inbound: Mutex::new(frames.into()),
            outbound: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<Value> {
        self.outbound.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn sent_types(&self) -> Vec<String> {
        self.sent()
            .iter()
            .filter_map(|v| v["type"].as_str().map(str::to_string))
            .collect()
    }
}

#[async_trait]
impl Connection for InMemoryConnection {
    async fn send(&self, payload: Value) -> anyhow::Result<()> {
        self.outbound
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(payload);
        Ok(())
    }

    async fn receive(&self) -> anyhow::Result<Option<Value>> {
        Ok(self
            .inbound
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front())
    }
}
