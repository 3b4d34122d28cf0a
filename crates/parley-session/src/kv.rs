// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Key-value-backed session repository.
//!
//! The key scheme is the classic Redis shape — `session:{id}:data`,
//! `session:{id}:meta`, a `sessions:by-user:{user_id}` membership set, and
//! a TTL per session — but nothing here depends on any particular engine:
//! the store is a trait, and the in-memory implementation backs tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use parley_core::{validate_session_id, ChatSession};

use crate::repository::{SessionError, SessionIndexEntry, SessionRepository};

/// Minimal key-value contract the repository needs.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> anyhow::Result<()>;
    async fn delete(&self, key: &str) -> anyhow::Result<()>;
    async fn set_add(&self, key: &str, member: &str) -> anyhow::Result<()>;
    async fn set_remove(&self, key: &str, member: &str) -> anyhow::Result<()>;
    async fn set_members(&self, key: &str) -> anyhow::Result<Vec<String>>;
    /// Round-trip probe; returns the observed latency.
    async fn ping(&self) -> anyhow::Result<Duration>;
}

#[derive(Default)]
struct MemoryInner {
    values: HashMap<String, (String, Option<Instant>)>,
    sets: HashMap<String, HashSet<String>>,
}

/// In-memory store with TTL expiry checked on read.
#[derive(Default)]
pub struct InMemoryKvStore {
    inner: Mutex<MemoryInner>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let expired = matches!(
            inner.values.get(key),
            Some((_, Some(expiry))) if *expiry <= Instant::now()
        );
        if expired {
            inner.values.remove(key);
            return Ok(None);
        }
        Ok(inner.values.get(key).map(|(v, _)| v.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> anyhow::Result<()> {
        let expiry = ttl.map(|d| Instant::now() + d);
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values
            .insert(key.to_string(), (value.to_string(), expiry));
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values
            .remove(key);
        Ok(())
    }

    async fn set_add(&self, key: &str, member: &str) -> anyhow::Result<()> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(set) = inner.sets.get_mut(key) {
            set.remove(member);
            if set.is_empty() {
                inner.sets.remove(key);
            }
        }
        Ok(())
    }

    async fn set_members(&self, key: &str) -> anyhow::Result<Vec<String>> {
        Ok(self
            .inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .sets
            .get(key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn ping(&self) -> anyhow::Result<Duration> {
        Ok(Duration::from_micros(1))
    }
}

fn data_key(session_id: &str) -> String {
    format!("session:{session_id}:data")
}

fn meta_key(session_id: &str) -> String {
    format!("session:{session_id}:meta")
}

fn user_key(user_id: &str) -> String {
    format!("sessions:by-user:{user_id}")
}

/// Session repository over any [`KeyValueStore`].
pub struct KvSessionRepository {
    store: Arc<dyn KeyValueStore>,
    ttl: Option<Duration>,
}

impl KvSessionRepository {
    pub fn new(store: Arc<dyn KeyValueStore>, ttl: Option<Duration>) -> Self {
        Self { store, ttl }
    }

    fn storage<E: std::fmt::Display>(e: E) -> SessionError {
        SessionError::Storage(e.to_string())
    }

    async fn write(&self, session: &ChatSession) -> Result<(), SessionError> {
        let data = serde_json::to_string(session).map_err(Self::storage)?;
        let meta = serde_json::to_string(&SessionIndexEntry::from_session(session))
            .map_err(Self::storage)?;
        self.store
            .set(&data_key(&session.session_id), &data, self.ttl)
            .await
            .map_err(Self::storage)?;
        self.store
            .set(&meta_key(&session.session_id), &meta, self.ttl)
            .await
            .map_err(Self::storage)?;
        self.store
            .set_add(&user_key(&session.user_id), &session.session_id)
            .await
            .map_err(Self::storage)?;
        Ok(())
    }
}

#[async_trait]
impl SessionRepository for KvSessionRepository {
    async fn create(&self, session: &ChatSession) -> Result<(), SessionError> {
        validate_session_id(&session.session_id)?;
        if self.exists(&session.session_id).await? {
            return Err(SessionError::AlreadyExists(session.session_id.clone()));
        }
        debug!(session_id = %session.session_id, "creating session");
        self.write(session).await
    }

    async fn get(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> Result<Option<ChatSession>, SessionError> {
        validate_session_id(session_id)?;
        let Some(data) = self
            .store
            .get(&data_key(session_id))
            .await
            .map_err(Self::storage)?
        else {
            return Ok(None);
        };
        let session: ChatSession = serde_json::from_str(&data).map_err(Self::storage)?;
        // Per-user isolation: a session belonging to someone else is
        // indistinguishable from a missing one.
        if session.user_id != user_id {
            return Ok(None);
        }
        Ok(Some(session))
    }

    async fn update(&self, session: &ChatSession) -> Result<(), SessionError> {
        validate_session_id(&session.session_id)?;
        self.write(session).await
    }

    async fn delete(&self, session_id: &str, user_id: &str) -> Result<(), SessionError> {
        validate_session_id(session_id)?;
        self.store
            .delete(&data_key(session_id))
            .await
            .map_err(Self::storage)?;
        self.store
            .delete(&meta_key(session_id))
            .await
            .map_err(Self::storage)?;
        self.store
            .set_remove(&user_key(user_id), session_id)
            .await
            .map_err(Self::storage)?;
        Ok(())
    }

    async fn list(
        &self,
        user_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<SessionIndexEntry>, usize), SessionError> {
        let ids = self
            .store
            .set_members(&user_key(user_id))
            .await
            .map_err(Self::storage)?;
        let mut entries = Vec::with_capacity(ids.len());
        for id in &ids {
            if let Some(meta) = self.store.get(&meta_key(id)).await.map_err(Self::storage)? {
                if let Ok(entry) = serde_json::from_str::<SessionIndexEntry>(&meta) {
                    entries.push(entry);
                }
            }
        }
        entries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        let total = entries.len();
        let page = entries.into_iter().skip(offset).take(limit).collect();
        Ok((page, total))
    }

    async fn exists(&self, session_id: &str) -> Result<bool, SessionError> {
        validate_session_id(session_id)?;
        Ok(self
            .store
            .get(&data_key(session_id))
            .await
            .map_err(Self::storage)?
            .is_some())
    }
}
