// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Preset factories for the event session logger.
//!
//! Deployment profiles are an enumerated type with typed per-kind options,
//! not an open option bag: every field a preset accepts is visible in its
//! config record.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use parley_core::EventSink;

use crate::gateway::EventSessionLogger;
use crate::transport::{
    CallbackTransport, FileTransport, HttpTransport, LogTransport, MultiTransport, NullTransport,
    QueueTransport, RetryTransport, Transport,
};

/// Environment variable naming the production HTTP collector.
pub const PRODUCTION_ENDPOINT_VAR: &str = "PARLEY_EVENT_ENDPOINT";

#[derive(Clone)]
pub struct ProductionConfig {
    /// Collector endpoint; when `None`, `PARLEY_EVENT_ENDPOINT` is
    /// consulted.
    pub endpoint: Option<String>,
    /// In-process queue fed when no HTTP endpoint is configured.
    pub queue: Option<tokio::sync::mpsc::Sender<parley_core::RuntimeEvent>>,
    pub timeout: Duration,
    pub retry_attempts: u32,
}

impl Default for ProductionConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            queue: None,
            timeout: Duration::from_secs(5),
            retry_attempts: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// File the legacy consumer tails.
    pub legacy_file: PathBuf,
    /// Emit a deprecation notice once at construction.
    pub deprecation_notice: bool,
}

/// Enumerated logger presets with typed options per kind.
pub enum LoggerPreset {
    /// Log transport, verbose.
    Development,
    /// Null transport: local JSONL only.
    Testing,
    /// Queue or HTTP transport, read from the environment.
    Production(ProductionConfig),
    /// Wraps a legacy file writer.
    Migration(MigrationConfig),
    /// Tee to several transports; one failing never fails the others.
    Multi(Vec<Arc<dyn Transport>>),
}

/// Build a logger for `preset` writing local records under `base_dir`.
///
/// For the production preset without an endpoint, the returned receiver
/// would normally be handed to a forwarder task; the queue is bounded so a
/// stalled forwarder degrades to transport failures rather than unbounded
/// memory growth.
pub fn create_logger(base_dir: impl Into<PathBuf>, preset: LoggerPreset) -> EventSessionLogger {
    let transport: Arc<dyn Transport> = match preset {
        LoggerPreset::Development => Arc::new(LogTransport::new()),
        LoggerPreset::Testing => Arc::new(NullTransport::new()),
        LoggerPreset::Production(cfg) => {
            let endpoint = cfg
                .endpoint
                .or_else(|| std::env::var(PRODUCTION_ENDPOINT_VAR).ok());
            match (endpoint, cfg.queue) {
                (Some(url), _) => Arc::new(RetryTransport::new(
                    Arc::new(HttpTransport::new(url, cfg.timeout)),
                    cfg.retry_attempts,
                    Duration::from_millis(250),
                    None,
                )),
                (None, Some(queue)) => Arc::new(QueueTransport::new(queue)),
                (None, None) => {
                    warn!("production logger has neither endpoint nor queue; using log transport");
                    Arc::new(LogTransport::new())
                }
            }
        }
        LoggerPreset::Migration(cfg) => {
            if cfg.deprecation_notice {
                warn!(
                    legacy_file = %cfg.legacy_file.display(),
                    "file-based event logging is deprecated; migrate consumers to a transport"
                );
            }
            Arc::new(FileTransport::new(cfg.legacy_file))
        }
        LoggerPreset::Multi(transports) => Arc::new(MultiTransport::new(transports)),
    };
    EventSessionLogger::new(base_dir, Some(transport))
}

/// Logger whose downstream is an arbitrary sink (the bridge emitter).
pub fn logger_with_callback(
    base_dir: impl Into<PathBuf>,
    sink: Arc<dyn EventSink>,
) -> EventSessionLogger {
    EventSessionLogger::new(base_dir, Some(Arc::new(CallbackTransport::new(sink))))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
