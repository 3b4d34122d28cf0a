// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The session cache-and-store layer.
//!
//! The cache is organized per user — `{user_id → {session_id → session}}`
//! — so two users can never observe each other's sessions and clearing one
//! user's scope is a single map removal.  The cached copy is authoritative
//! between flushes; a failed flush leaves it intact for the next attempt.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use parley_core::ChatSession;

use crate::repository::{SessionError, SessionIndexEntry, SessionRepository};

pub struct SessionManager {
    repository: Arc<dyn SessionRepository>,
    cache: RwLock<HashMap<String, HashMap<String, ChatSession>>>,
}

impl SessionManager {
    pub fn new(repository: Arc<dyn SessionRepository>) -> Self {
        Self {
            repository,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Cached session, or loaded from the repository and installed in the
    /// cache.  Missing sessions are `None`.
    pub async fn get(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> Result<Option<ChatSession>, SessionError> {
        if let Some(session) = self
            .cache
            .read()
            .await
            .get(user_id)
            .and_then(|m| m.get(session_id))
        {
            return Ok(Some(session.clone()));
        }
        match self.repository.get(session_id, user_id).await? {
            Some(session) => {
                self.cache
                    .write()
                    .await
                    .entry(user_id.to_string())
                    .or_default()
                    .insert(session_id.to_string(), session.clone());
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    /// Install a new session in its user's cache and touch its timestamps.
    pub async fn new_session(&self, mut session: ChatSession) -> ChatSession {
        session.touch();
        self.cache
            .write()
            .await
            .entry(session.user_id.clone())
            .or_default()
            .insert(session.session_id.clone(), session.clone());
        session
    }

    /// Evict from cache and delete durably.  An emptied user map is dropped
    /// entirely.
    pub async fn delete(&self, session_id: &str, user_id: &str) -> Result<(), SessionError> {
        {
            let mut cache = self.cache.write().await;
            if let Some(user_map) = cache.get_mut(user_id) {
                user_map.remove(session_id);
                if user_map.is_empty() {
                    cache.remove(user_id);
                }
            }
        }
        self.repository.delete(session_id, user_id).await
    }

    /// Persist the cached session.  Absent or message-less sessions are
    /// skipped with a warning rather than an error.
    pub async fn flush(&self, session_id: &str, user_id: &str) -> Result<(), SessionError> {
        let session = self
            .cache
            .read()
            .await
            .get(user_id)
            .and_then(|m| m.get(session_id))
            .cloned();
        let Some(session) = session else {
            warn!(session_id, user_id, "session not in cache, skipping flush");
            return Ok(());
        };
        if session.messages.is_empty() {
            warn!(session_id, user_id, "session is empty, skipping flush");
            return Ok(());
        }
        if self.repository.exists(session_id).await? {
            self.repository.update(&session).await
        } else {
            self.repository.create(&session).await
        }
    }

    /// Install the caller's (mutated) copy and flush it in one step.  This
    /// is what a bridge calls at the end of a turn.
    pub async fn flush_session(&self, session: &ChatSession) -> Result<(), SessionError> {
        self.cache
            .write()
            .await
            .entry(session.user_id.clone())
            .or_default()
            .insert(session.session_id.clone(), session.clone());
        self.flush(&session.session_id, &session.user_id).await
    }

    /// Hook for syncing external mutations into the cache.  No-op by
    /// default.
    pub async fn update(&self) {}

    /// Paginated listing, sorted by `updated_at` descending.
    pub async fn list(
        &self,
        user_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<SessionIndexEntry>, usize), SessionError> {
        self.repository.list(user_id, offset, limit).await
    }

    /// Cache occupancy by user.
    pub async fn stats(&self) -> HashMap<String, usize> {
        self.cache
            .read()
            .await
            .iter()
            .map(|(user, sessions)| (user.clone(), sessions.len()))
            .collect()
    }

    pub async fn cached_session_count(&self, user_id: &str) -> usize {
        self.cache
            .read()
            .await
            .get(user_id)
            .map(|m| m.len())
            .unwrap_or(0)
    }

    /// Drop every cached session for a user.
    pub async fn clear_user_cache(&self, user_id: &str) {
        if self.cache.write().await.remove(user_id).is_some() {
            debug!(user_id, "cleared session cache for user");
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
