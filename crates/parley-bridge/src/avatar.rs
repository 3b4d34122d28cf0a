// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Avatar vendor seam.
//!
//! The streaming avatar SDK is an external collaborator; the bridge only
//! needs to list avatars, open a streaming session, speak text through it,
//! and close it.  The recording implementation backs the tests.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::client_events::AvatarInfo;

#[derive(Debug, Clone, PartialEq)]
pub struct NewAvatarSessionRequest {
    pub avatar_id: String,
    pub quality: String,
    pub video_encoding: String,
}

/// One live avatar streaming session.
#[async_trait]
pub trait AvatarSession: Send + Sync {
    fn session_id(&self) -> &str;
    /// Speak a chunk of text through the avatar.
    async fn speak(&self, text: &str) -> anyhow::Result<()>;
    async fn close(&self) -> anyhow::Result<()>;
}

/// The vendor account client: catalog + session creation.
#[async_trait]
pub trait AvatarClient: Send + Sync {
    async fn list_avatars(&self) -> anyhow::Result<Vec<AvatarInfo>>;
    async fn create_session(
        &self,
        request: NewAvatarSessionRequest,
    ) -> anyhow::Result<Box<dyn AvatarSession>>;
}

// ─── Recording doubles ────────────────────────────────────────────────────────

/// Avatar session that records everything spoken.
#[derive(Default)]
pub struct RecordingAvatarSession {
    session_id: String,
    spoken: Mutex<Vec<String>>,
    closed: Mutex<bool>,
}

impl RecordingAvatarSession {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            spoken: Mutex::new(Vec::new()),
            closed: Mutex::new(false),
        }
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl AvatarSession for RecordingAvatarSession {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn speak(&self, text: &str) -> anyhow::Result<()> {
        self.spoken
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(text.to_string());
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        *self.closed.lock().unwrap_or_else(|e| e.into_inner()) = true;
        Ok(())
    }
}

/// Client double with a fixed catalog.
pub struct StaticAvatarClient {
    pub avatars: Vec<AvatarInfo>,
}

#[async_trait]
impl AvatarClient for StaticAvatarClient {
    async fn list_avatars(&self) -> anyhow::Result<Vec<AvatarInfo>> {
        Ok(self.avatars.clone())
    }

    async fn create_session(
        &self,
        request: NewAvatarSessionRequest,
    ) -> anyhow::Result<Box<dyn AvatarSession>> {
        Ok(Box::new(RecordingAvatarSession::new(format!(
            "avatar-session-{}",
            request.avatar_id
        ))))
    }
}
