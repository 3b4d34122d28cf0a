// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod chat_session;
pub mod defaults;
pub mod events;
pub mod prompt;
pub mod runtime;

pub use chat_session::{validate_session_id, ChatSession, InvalidSessionId, METAMETA_KEY};
pub use defaults::{CancelFlag, RuntimeDefaults};
pub use events::{ChannelSink, EventBuilder, EventKind, EventSink, NullSink, RuntimeEvent};
pub use prompt::{PersonaSection, PromptBuilder, PromptContext, PromptSection, StaticSection};
pub use runtime::{AgentRuntime, ChatRequest};
