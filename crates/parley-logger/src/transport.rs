// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Downstream transports for runtime events.
//!
//! A transport is the pluggable sink events flow into after local logging.
//! Every implementation tracks the same connection state machine
//! (`Disconnected → Connected → Closed`) and metrics tuple, so operators
//! can reason about any sink the same way.

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use parley_core::{EventSink, RuntimeEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    Closed,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransportMetrics {
    pub total_sent: u64,
    pub total_failed: u64,
    pub avg_send_ms: f64,
    pub last_success_at: Option<DateTime<Utc>>,
}

/// Shared state-machine + metrics bookkeeping embedded by every transport.
pub struct TransportCore {
    state: Mutex<ConnectionState>,
    metrics: Mutex<MetricsInner>,
}

#[derive(Default)]
struct MetricsInner {
    total_sent: u64,
    total_failed: u64,
    total_send_ms: f64,
    last_success_at: Option<DateTime<Utc>>,
}

impl Default for TransportCore {
    fn default() -> Self {
        Self {
            state: Mutex::new(ConnectionState::Disconnected),
            metrics: Mutex::new(MetricsInner::default()),
        }
    }
}

impl TransportCore {
    pub fn set_state(&self, state: ConnectionState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn record_success(&self, elapsed: Duration) {
        let mut m = self.metrics.lock().unwrap_or_else(|e| e.into_inner());
        m.total_sent += 1;
        m.total_send_ms += elapsed.as_secs_f64() * 1000.0;
        m.last_success_at = Some(Utc::now());
    }

    pub fn record_failure(&self) {
        self.metrics.lock().unwrap_or_else(|e| e.into_inner()).total_failed += 1;
    }

    pub fn metrics(&self) -> TransportMetrics {
        let m = self.metrics.lock().unwrap_or_else(|e| e.into_inner());
        TransportMetrics {
            total_sent: m.total_sent,
            total_failed: m.total_failed,
            avg_send_ms: if m.total_sent > 0 {
                m.total_send_ms / m.total_sent as f64
            } else {
                0.0
            },
            last_success_at: m.last_success_at,
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self) -> anyhow::Result<()>;
    async fn send(&self, event: &RuntimeEvent) -> anyhow::Result<()>;
    async fn health_check(&self) -> bool;
    async fn close(&self) -> anyhow::Result<()>;
    fn state(&self) -> ConnectionState;
    fn metrics(&self) -> TransportMetrics;
}

// ─── Null ─────────────────────────────────────────────────────────────────────

/// Accepts and discards everything.  The testing preset.
#[derive(Default)]
pub struct NullTransport {
    core: TransportCore,
}

impl NullTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Transport for NullTransport {
    async fn connect(&self) -> anyhow::Result<()> {
        self.core.set_state(ConnectionState::Connected);
        Ok(())
    }
    async fn send(&self, _event: &RuntimeEvent) -> anyhow::Result<()> {
        self.core.record_success(Duration::ZERO);
        Ok(())
    }
    async fn health_check(&self) -> bool {
        true
    }
    async fn close(&self) -> anyhow::Result<()> {
        self.core.set_state(ConnectionState::Closed);
        Ok(())
    }
    fn state(&self) -> ConnectionState {
        self.core.state()
    }
    fn metrics(&self) -> TransportMetrics {
        self.core.metrics()
    }
}

// ─── Logging ──────────────────────────────────────────────────────────────────

/// Writes one structured log line per event.  The development preset.
#[derive(Default)]
pub struct LogTransport {
    core: TransportCore,
}

impl LogTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Transport for LogTransport {
    async fn connect(&self) -> anyhow::Result<()> {
        self.core.set_state(ConnectionState::Connected);
        Ok(())
    }
    async fn send(&self, event: &RuntimeEvent) -> anyhow::Result<()> {
        let started = Instant::now();
        info!(
            session_id = %event.session_id,
            event_type = event.kind.type_tag(),
            "runtime event"
        );
        self.core.record_success(started.elapsed());
        Ok(())
    }
    async fn health_check(&self) -> bool {
        true
    }
    async fn close(&self) -> anyhow::Result<()> {
        self.core.set_state(ConnectionState::Closed);
        Ok(())
    }
    fn state(&self) -> ConnectionState {
        self.core.state()
    }
    fn metrics(&self) -> TransportMetrics {
        self.core.metrics()
    }
}

// ─── File tee ─────────────────────────────────────────────────────────────────

/// Appends serialized events to a single file.  Used by the migration
/// preset to keep feeding a legacy consumer.
pub struct FileTransport {
    core: TransportCore,
    path: PathBuf,
}

impl FileTransport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            core: TransportCore::default(),
            path: path.into(),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

#[async_trait]
impl Transport for FileTransport {
    async fn connect(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.core.set_state(ConnectionState::Connected);
        Ok(())
    }
    async fn send(&self, event: &RuntimeEvent) -> anyhow::Result<()> {
        let started = Instant::now();
        let result = (|| -> anyhow::Result<()> {
            use std::io::Write;
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            let line = serde_json::to_string(event)?;
            writeln!(file, "{line}")?;
            Ok(())
        })();
        match result {
            Ok(()) => {
                self.core.record_success(started.elapsed());
                Ok(())
            }
            Err(e) => {
                self.core.record_failure();
                Err(e)
            }
        }
    }
    async fn health_check(&self) -> bool {
        self.path.parent().map(|p| p.exists()).unwrap_or(true)
    }
    async fn close(&self) -> anyhow::Result<()> {
        self.core.set_state(ConnectionState::Closed);
        Ok(())
    }
    fn state(&self) -> ConnectionState {
        self.core.state()
    }
    fn metrics(&self) -> TransportMetrics {
        self.core.metrics()
    }
}

// ─── Callback ─────────────────────────────────────────────────────────────────

/// Forwards into any [`EventSink`] — typically the bridge emitter, which is
/// how events continue toward the client after local logging.
pub struct CallbackTransport {
    core: TransportCore,
    sink: Arc<dyn EventSink>,
}

impl CallbackTransport {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            core: TransportCore::default(),
            sink,
        }
    }
}

#[async_trait]
impl Transport for CallbackTransport {
    async fn connect(&self) -> anyhow::Result<()> {
        self.core.set_state(ConnectionState::Connected);
        Ok(())
    }
    async fn send(&self, event: &RuntimeEvent) -> anyhow::Result<()> {
        let started = Instant::now();
        match self.sink.raise(event.clone()).await {
            Ok(()) => {
                self.core.record_success(started.elapsed());
                Ok(())
            }
            Err(e) => {
                self.core.record_failure();
                Err(e)
            }
        }
    }
    async fn health_check(&self) -> bool {
        true
    }
    async fn close(&self) -> anyhow::Result<()> {
        self.core.set_state(ConnectionState::Closed);
        Ok(())
    }
    fn state(&self) -> ConnectionState {
        self.core.state()
    }
    fn metrics(&self) -> TransportMetrics {
        self.core.metrics()
    }
}

// ─── Queue ────────────────────────────────────────────────────────────────────

/// Hands events to an in-process queue for an external forwarder task.
pub struct QueueTransport {
    core: TransportCore,
    queue: tokio::sync::mpsc::Sender<RuntimeEvent>,
}

impl QueueTransport {
    pub fn new(queue: tokio::sync::mpsc::Sender<RuntimeEvent>) -> Self {
        Self {
            core: TransportCore::default(),
            queue,
        }
    }
}

#[async_trait]
impl Transport for QueueTransport {
    async fn connect(&self) -> anyhow::Result<()> {
        self.core.set_state(ConnectionState::Connected);
        Ok(())
    }
    async fn send(&self, event: &RuntimeEvent) -> anyhow::Result<()> {
        let started = Instant::now();
        match self.queue.send(event.clone()).await {
            Ok(()) => {
                self.core.record_success(started.elapsed());
                Ok(())
            }
            Err(_) => {
                self.core.record_failure();
                anyhow::bail!("event queue closed")
            }
        }
    }
    async fn health_check(&self) -> bool {
        !self.queue.is_closed()
    }
    async fn close(&self) -> anyhow::Result<()> {
        self.core.set_state(ConnectionState::Closed);
        Ok(())
    }
    fn state(&self) -> ConnectionState {
        self.core.state()
    }
    fn metrics(&self) -> TransportMetrics {
        self.core.metrics()
    }
}

// ─── HTTP ─────────────────────────────────────────────────────────────────────

/// POSTs each event as JSON to a collector endpoint.  The production
/// preset when an endpoint is configured.
pub struct HttpTransport {
    core: TransportCore,
    url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            core: TransportCore::default(),
            url: url.into(),
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn connect(&self) -> anyhow::Result<()> {
        self.core.set_state(ConnectionState::Connected);
        Ok(())
    }
    async fn send(&self, event: &RuntimeEvent) -> anyhow::Result<()> {
        let started = Instant::now();
        let result = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(event)
            .send()
            .await;
        match result {
            Ok(resp) if resp.status().is_success() => {
                self.core.record_success(started.elapsed());
                Ok(())
            }
            Ok(resp) => {
                self.core.record_failure();
                anyhow::bail!("event collector returned {}", resp.status())
            }
            Err(e) => {
                self.core.record_failure();
                Err(e.into())
            }
        }
    }
    async fn health_check(&self) -> bool {
        self.core.state() == ConnectionState::Connected
    }
    async fn close(&self) -> anyhow::Result<()> {
        self.core.set_state(ConnectionState::Closed);
        Ok(())
    }
    fn state(&self) -> ConnectionState {
        self.core.state()
    }
    fn metrics(&self) -> TransportMetrics {
        self.core.metrics()
    }
}

// ─── Retry wrapper ────────────────────────────────────────────────────────────

/// Wraps any transport with bounded exponential retry, optionally falling
/// back to a second transport when every attempt fails.
pub struct RetryTransport {
    core: TransportCore,
    inner: Arc<dyn Transport>,
    max_attempts: u32,
    base_delay: Duration,
    fallback: Option<Arc<dyn Transport>>,
}

impl RetryTransport {
    pub fn new(
        inner: Arc<dyn Transport>,
        max_attempts: u32,
        base_delay: Duration,
        fallback: Option<Arc<dyn Transport>>,
    ) -> Self {
        Self {
            core: TransportCore::default(),
            inner,
            max_attempts: max_attempts.max(1),
            base_delay,
            fallback,
        }
    }
}

#[async_trait]
impl Transport for RetryTransport {
    async fn connect(&self) -> anyhow::Result<()> {
        self.inner.connect().await?;
        if let Some(fb) = &self.fallback {
            // Fallback connect failures are deferred until actually needed.
            if let Err(e) = fb.connect().await {
                warn!(error = %e, "fallback transport failed to connect");
            }
        }
        self.core.set_state(ConnectionState::Connected);
        Ok(())
    }

    async fn send(&self, event: &RuntimeEvent) -> anyhow::Result<()> {
        let started = Instant::now();
        let mut delay = self.base_delay;
        let mut last_err: Option<anyhow::Error> = None;
        for attempt in 1..=self.max_attempts {
            match self.inner.send(event).await {
                Ok(()) => {
                    self.core.record_success(started.elapsed());
                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt, error = %e, "transport send failed");
                    last_err = Some(e);
                    if attempt < self.max_attempts {
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                }
            }
        }
        if let Some(fb) = &self.fallback {
            if fb.send(event).await.is_ok() {
                self.core.record_success(started.elapsed());
                return Ok(());
            }
        }
        self.core.record_failure();
        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("send failed")))
    }

    async fn health_check(&self) -> bool {
        self.inner.health_check().await
    }
    async fn close(&self) -> anyhow::Result<()> {
        self.inner.close().await?;
        self.core.set_state(ConnectionState::Closed);
        Ok(())
    }
    fn state(&self) -> ConnectionState {
        self.core.state()
    }
    fn metrics(&self) -> TransportMetrics {
        self.core.metrics()
    }
}

// ─── Multi tee ────────────────────────────────────────────────────────────────

/// Tees every event to several transports.  One sink failing never stops
/// the others; the send fails only when every sink failed.
pub struct MultiTransport {
    core: TransportCore,
    transports: Vec<Arc<dyn Transport>>,
}

impl MultiTransport {
    pub fn new(transports: Vec<Arc<dyn Transport>>) -> Self {
        Self {
            core: TransportCore::default(),
            transports,
        }
    }
}

#[async_trait]
impl Transport for MultiTransport {
    async fn connect(&self) -> anyhow::Result<()> {
        for t in &self.transports {
            if let Err(e) = t.connect().await {
                warn!(error = %e, "transport failed to connect");
            }
        }
        self.core.set_state(ConnectionState::Connected);
        Ok(())
    }

    async fn send(&self, event: &RuntimeEvent) -> anyhow::Result<()> {
        let started = Instant::now();
        let mut any_ok = false;
        for t in &self.transports {
            match t.send(event).await {
                Ok(()) => any_ok = true,
                Err(e) => warn!(error = %e, "one tee transport failed"),
            }
        }
        if any_ok || self.transports.is_empty() {
            self.core.record_success(started.elapsed());
            Ok(())
        } else {
            self.core.record_failure();
            anyhow::bail!("every tee transport failed")
        }
    }

    async fn health_check(&self) -> bool {
        // Healthy while at least one sink is.
        for t in &self.transports {
            if t.health_check().await {
                return true;
            }
        }
        self.transports.is_empty()
    }
    async fn close(&self) -> anyhow::Result<()> {
        for t in &self.transports {
            let _ = t.close().await;
        }
        self.core.set_state(ConnectionState::Closed);
        Ok(())
    }
    fn state(&self) -> ConnectionState {
        self.core.state()
    }
    fn metrics(&self) -> TransportMetrics {
        self.core.metrics()
    }
}

// ─── Failing (chaos) ──────────────────────────────────────────────────────────

/// Transport that rejects every send.  Exists for tests and for chaos
/// drills that verify the gateway's error isolation end to end.
#[derive(Default)]
pub struct FailingTransport {
    core: TransportCore,
}

impl FailingTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Transport for FailingTransport {
    async fn connect(&self) -> anyhow::Result<()> {
        self.core.set_state(ConnectionState::Connected);
        Ok(())
    }
    async fn send(&self, _event: &RuntimeEvent) -> anyhow::Result<()> {
        self.core.record_failure();
        anyhow::bail!("deliberate transport failure")
    }
    async fn health_check(&self) -> bool {
        false
    }
    async fn close(&self) -> anyhow::Result<()> {
        self.core.set_state(ConnectionState::Closed);
        Ok(())
    }
    fn state(&self) -> ConnectionState {
        self.core.state()
    }
    fn metrics(&self) -> TransportMetrics {
        self.core.metrics()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::{EventBuilder, EventKind};

    pub(crate) fn sample_event() -> RuntimeEvent {
        EventBuilder::new("tiger-castle", "assistant")
            .event(EventKind::TextDelta { content: "x".into() })
    }

    // ── State machine ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn transports_walk_the_state_machine() {
        let t = NullTransport::new();
        assert_eq!(t.state(), ConnectionState::Disconnected);
        t.connect().await.unwrap();
        assert_eq!(t.state(), ConnectionState::Connected);
        t.close().await.unwrap();
        assert_eq!(t.state(), ConnectionState::Closed);
    }

    // ── Metrics ───────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn metrics_count_successes() {
        let t = NullTransport::new();
        t.send(&sample_event()).await.unwrap();
        t.send(&sample_event()).await.unwrap();
        let m = t.metrics();
        assert_eq!(m.total_sent, 2);
        assert_eq!(m.total_failed, 0);
        assert!(m.last_success_at.is_some());
    }

    #[tokio::test]
    async fn failing_transport_counts_failures() {
        let t = FailingTransport::default();
        for _ in 0..3 {
            assert!(t.send(&sample_event()).await.is_err());
        }
        assert_eq!(t.metrics().total_failed, 3);
        assert_eq!(t.metrics().total_sent, 0);
    }

    // ── File transport ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn file_transport_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tee.jsonl");
        let t = FileTransport::new(&path);
        t.connect().await.unwrap();
        t.send(&sample_event()).await.unwrap();
        t.send(&sample_event()).await.unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
        let parsed: RuntimeEvent = serde_json::from_str(text.lines().next().unwrap()).unwrap();
        assert_eq!(parsed.session_id, "tiger-castle");
    }

    // ── Retry wrapper ─────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn retry_exhausts_then_uses_fallback() {
        let primary = Arc::new(FailingTransport::default());
        let fallback = Arc::new(NullTransport::new());
        let t = RetryTransport::new(
            primary.clone(),
            3,
            Duration::from_millis(10),
            Some(fallback.clone()),
        );
        t.send(&sample_event()).await.unwrap();
        assert_eq!(primary.metrics().total_failed, 3);
        assert_eq!(fallback.metrics().total_sent, 1);
        assert_eq!(t.metrics().total_sent, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_without_fallback_reports_failure() {
        let t = RetryTransport::new(
            Arc::new(FailingTransport::default()),
            2,
            Duration::from_millis(1),
            None,
        );
        assert!(t.send(&sample_event()).await.is_err());
        assert_eq!(t.metrics().total_failed, 1);
    }

    // ── Multi tee ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn multi_isolates_failures_between_sinks() {
        let good = Arc::new(NullTransport::new());
        let bad = Arc::new(FailingTransport::default());
        let t = MultiTransport::new(vec![bad.clone(), good.clone()]);
        t.send(&sample_event()).await.unwrap();
        assert_eq!(good.metrics().total_sent, 1);
        assert_eq!(bad.metrics().total_failed, 1);
    }

    #[tokio::test]
    async fn multi_fails_only_when_all_fail() {
        let t = MultiTransport::new(vec![
            Arc::new(FailingTransport::default()) as Arc<dyn Transport>,
            Arc::new(FailingTransport::default()),
        ]);
        assert!(t.send(&sample_event()).await.is_err());
    }

    // ── Queue ─────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn queue_transport_delivers_to_receiver() {
        let (tx, mut rx) = tokio::sync::mpsc::channel(4);
        let t = QueueTransport::new(tx);
        t.send(&sample_event()).await.unwrap();
        assert!(rx.try_recv().is_ok());
    }
}
