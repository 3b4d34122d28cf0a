// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The bridge's runtime-event emitter.
//!
//! Every runtime event lands here (via the session logger's callback
//! transport) and is dispatched by type: text deltas feed the avatar's
//! speakable-chunk buffer, the first thought token triggers a one-shot
//! "thinking" utterance, completion boundaries flush the buffer, and
//! everything is forwarded to the client connection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::warn;

use parley_core::{EventBuilder, EventKind, EventSink, RuntimeEvent};

use crate::avatar::AvatarSession;
use crate::client_events::ControlEvent;
use crate::connection::Connection;

/// Spoken once per turn when the model starts reasoning out loud.
pub const AVATAR_THINK_UTTERANCE: &str = "Let me think about that...";

pub struct BridgeEmitter {
    connection: Arc<dyn Connection>,
    avatar: tokio::sync::Mutex<Option<Box<dyn AvatarSession>>>,
    /// Text not yet spoken: grows per delta, drains at the last newline.
    partial: Mutex<String>,
    /// Full assistant text of the turn, for the complete-message event.
    full_text: Mutex<String>,
    did_think: AtomicBool,
}

impl BridgeEmitter {
    pub fn new(connection: Arc<dyn Connection>) -> Self {
        Self {
            connection,
            avatar: tokio::sync::Mutex::new(None),
            partial: Mutex::new(String::new()),
            full_text: Mutex::new(String::new()),
            did_think: AtomicBool::new(false),
        }
    }

    pub async fn set_avatar_session(&self, session: Box<dyn AvatarSession>) {
        *self.avatar.lock().await = Some(session);
    }

    /// Close and drop the active avatar session, returning its id.
    pub async fn end_avatar_session(&self) -> Option<String> {
        let session = self.avatar.lock().await.take()?;
        let id = session.session_id().to_string();
        if let Err(e) = session.close().await {
            warn!(avatar_session = %id, error = %e, "failed to close avatar session");
        }
        Some(id)
    }

    pub async fn avatar_session_id(&self) -> Option<String> {
        self.avatar
            .lock()
            .await
            .as_ref()
            .map(|s| s.session_id().to_string())
    }

    pub async fn send_control(&self, event: ControlEvent) -> anyhow::Result<()> {
        self.connection.send(serde_json::to_value(&event)?).await
    }

    async fn forward(&self, event: &RuntimeEvent) -> anyhow::Result<()> {
        self.connection.send(serde_json::to_value(event)?).await
    }

    /// Speak through the avatar when one is connected.  Failures are
    /// reported to the client and never abort the event stream.
    async fn avatar_say(&self, session_id: &str, text: &str) {
        let avatar = self.avatar.lock().await;
        let Some(session) = avatar.as_ref() else {
            return;
        };
        if let Err(e) = session.speak(text).await {
            warn!(error = %e, "failed to send text to avatar");
            let notice = EventBuilder::new(session_id, "system")
                .system_error(format!("Failed to send message to avatar: {e}"), None);
            let _ = self.forward(&notice).await;
        }
    }

    fn take_buffer(buffer: &Mutex<String>) -> String {
        std::mem::take(&mut *buffer.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

#[async_trait]
impl EventSink for BridgeEmitter {
    async fn raise(&self, event: RuntimeEvent) -> anyhow::Result<()> {
        match &event.kind {
            EventKind::Interaction { started: true, .. } => {
                Self::take_buffer(&self.partial);
                Self::take_buffer(&self.full_text);
                self.did_think.store(false, Ordering::SeqCst);
                self.forward(&event).await
            }
            EventKind::TextDelta { content } => {
                self.did_think.store(false, Ordering::SeqCst);
                let speakable = {
                    let mut partial = self.partial.lock().unwrap_or_else(|e| e.into_inner());
                    partial.push_str(content);
                    self.full_text
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .push_str(content);
                    // Speak up to the last newline; keep the remainder
                    // buffered until more text (or the completion end)
                    // arrives.
                    match partial.rfind('\n') {
                        Some(pos) => {
                            let spoken = partial[..=pos].to_string();
                            *partial = partial[pos + 1..].to_string();
                            Some(spoken)
                        }
                        None => None,
                    }
                };
                if let Some(chunk) = speakable {
                    self.avatar_say(&event.session_id, &chunk).await;
                }
                self.forward(&event).await
            }
            EventKind::ThoughtDelta { .. } => {
                if !self.did_think.swap(true, Ordering::SeqCst) {
                    self.avatar_say(&event.session_id, AVATAR_THINK_UTTERANCE).await;
                }
                self.forward(&event).await
            }
            EventKind::Completion { running: false, stop_reason, .. } => {
                let rest = Self::take_buffer(&self.partial);
                if !rest.trim().is_empty() {
                    self.avatar_say(&event.session_id, &rest).await;
                }
                self.forward(&event).await?;
                // After the final completion of a turn, send the assembled
                // assistant message as one complete-message event.
                if stop_reason.as_deref() != Some("tool_calls") {
                    let text = Self::take_buffer(&self.full_text);
                    if !text.is_empty() {
                        let message = EventBuilder::new(event.session_id.clone(), "assistant")
                            .event(EventKind::Message {
                                content: text,
                                format: "markdown".into(),
                            });
                        self.forward(&message).await?;
                    }
                }
                Ok(())
            }
            _ => self.forward(&event).await,
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
