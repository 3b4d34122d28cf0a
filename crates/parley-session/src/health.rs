// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Non-critical health probing for the session store.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use std::sync::Arc;

use crate::kv::KeyValueStore;

const WINDOW: usize = 32;

#[derive(Debug, Clone, PartialEq)]
pub struct HealthStatus {
    pub healthy: bool,
    pub latency: Duration,
    /// Fraction of failed probes over the rolling window.
    pub error_rate: f32,
}

#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn check(&self) -> HealthStatus;
}

/// Pings the backing store and tracks a rolling error rate.  Failures here
/// are informational only; nothing in the session path consults them.
pub struct StoreHealthCheck {
    store: Arc<dyn KeyValueStore>,
    window: Mutex<VecDeque<bool>>,
}

impl StoreHealthCheck {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            window: Mutex::new(VecDeque::with_capacity(WINDOW)),
        }
    }

    fn record(&self, ok: bool) -> f32 {
        let mut window = self.window.lock().unwrap_or_else(|e| e.into_inner());
        if window.len() == WINDOW {
            window.pop_front();
        }
        window.push_back(ok);
        let failures = window.iter().filter(|ok| !**ok).count();
        failures as f32 / window.len() as f32
    }
}

#[async_trait]
impl HealthCheck for StoreHealthCheck {
    async fn check(&self) -> HealthStatus {
        match self.store.ping().await {
            Ok(latency) => HealthStatus {
                healthy: true,
                latency,
                error_rate: self.record(true),
            },
            Err(_) => HealthStatus {
                healthy: false,
                latency: Duration::ZERO,
                error_rate: self.record(false),
            },
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
