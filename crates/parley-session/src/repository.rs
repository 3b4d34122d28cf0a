// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use parley_core::{ChatSession, InvalidSessionId};

/// Errors from the session storage layer.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The id is not a two-word mnemonic slug.  Raised before storage is
    /// touched.
    #[error(transparent)]
    InvalidId(#[from] InvalidSessionId),

    #[error("session '{0}' already exists")]
    AlreadyExists(String),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Index projection used by paginated listings: enough to render a session
/// picker without loading full histories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionIndexEntry {
    pub session_id: String,
    pub user_id: String,
    pub display_name: String,
    pub updated_at: DateTime<Utc>,
    pub message_count: usize,
}

impl SessionIndexEntry {
    pub fn from_session(session: &ChatSession) -> Self {
        Self {
            session_id: session.session_id.clone(),
            user_id: session.user_id.clone(),
            display_name: session.effective_display_name().to_string(),
            updated_at: session.updated_at,
            message_count: session.messages.len(),
        }
    }
}

/// Durable storage contract for sessions.
///
/// Every operation validates the session id shape before touching storage;
/// implementations use [`parley_core::validate_session_id`] for that.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, session: &ChatSession) -> Result<(), SessionError>;
    async fn get(&self, session_id: &str, user_id: &str)
        -> Result<Option<ChatSession>, SessionError>;
    async fn update(&self, session: &ChatSession) -> Result<(), SessionError>;
    async fn delete(&self, session_id: &str, user_id: &str) -> Result<(), SessionError>;
    /// Paginated listing for a user, sorted by `updated_at` descending.
    /// Returns the page plus the total session count for the user.
    async fn list(
        &self,
        user_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<SessionIndexEntry>, usize), SessionError>;
    async fn exists(&self, session_id: &str) -> Result<bool, SessionError>;
}
