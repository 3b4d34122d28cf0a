// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The event session logger: the gateway every runtime event flows
//! through.
//!
//! Each event is (1) appended as one JSON-Lines record to the session's
//! daily log file and (2) forwarded to the configured downstream
//! transport.  The two legs are isolated: a transport outage never
//! suppresses local logging, and a full disk never blocks the transport.
//! Either failure is reported as an error system event through the same
//! gateway, guarded against recursive failure.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::warn;

use parley_core::{EventBuilder, EventSink, RuntimeEvent};

use crate::transport::Transport;

/// Gateway between the runtime and everything downstream of it.
pub struct EventSessionLogger {
    base_dir: PathBuf,
    transport: Option<Arc<dyn Transport>>,
    reporting: AtomicBool,
}

impl EventSessionLogger {
    pub fn new(base_dir: impl Into<PathBuf>, transport: Option<Arc<dyn Transport>>) -> Self {
        Self {
            base_dir: base_dir.into(),
            transport,
            reporting: AtomicBool::new(false),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn transport(&self) -> Option<&Arc<dyn Transport>> {
        self.transport.as_ref()
    }

    /// `{base_dir}/{session_id}/events-{YYYYMMDD}.jsonl` for today (UTC).
    pub fn log_file_for(&self, session_id: &str) -> PathBuf {
        let day = Utc::now().format("%Y%m%d");
        self.base_dir
            .join(session_id)
            .join(format!("events-{day}.jsonl"))
    }

    fn write_local(&self, event: &RuntimeEvent) -> anyhow::Result<()> {
        use std::io::Write;
        let path = self.log_file_for(&event.session_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let record = json!({
            "timestamp": Utc::now().to_rfc3339(),
            "event": event,
        });
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        writeln!(file, "{record}")?;
        Ok(())
    }

    /// Report a leg failure through the gateway itself.  The reentrancy
    /// guard makes a failure while reporting degrade to plain logging
    /// instead of recursing.
    async fn report_failure(&self, source_event: &RuntimeEvent, leg: &str, error: String) {
        if self.reporting.swap(true, Ordering::SeqCst) {
            warn!(leg, error = %error, "logger failure while reporting a failure");
            return;
        }
        let notice = EventBuilder::new(source_event.session_id.clone(), "system")
            .system_error(
                format!("Event logger {leg} failure: {error}"),
                Some(format!("logger_{leg}_error")),
            );
        let _ = self.dispatch(&notice).await;
        self.reporting.store(false, Ordering::SeqCst);
    }

    /// Run both legs for one event, collecting leg errors without letting
    /// either abort the other.
    async fn dispatch(&self, event: &RuntimeEvent) -> (Option<String>, Option<String>) {
        let local_err = self.write_local(event).err().map(|e| e.to_string());
        let transport_err = match &self.transport {
            Some(t) => t.send(event).await.err().map(|e| e.to_string()),
            None => None,
        };
        (local_err, transport_err)
    }
}

#[async_trait]
impl EventSink for EventSessionLogger {
    async fn raise(&self, event: RuntimeEvent) -> anyhow::Result<()> {
        let (local_err, transport_err) = self.dispatch(&event).await;
        if let Some(err) = local_err {
            warn!(session_id = %event.session_id, error = %err, "local event logging failed");
            self.report_failure(&event, "local", err).await;
        }
        if let Some(err) = transport_err {
            warn!(session_id = %event.session_id, error = %err, "event transport failed");
            self.report_failure(&event, "transport", err).await;
        }
        // The gateway itself never fails the caller: both legs are
        // best-effort from the runtime's point of view.
        Ok(())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
