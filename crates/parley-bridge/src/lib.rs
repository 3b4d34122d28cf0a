// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod avatar;
pub mod bridge;
pub mod client_events;
pub mod connection;
pub mod emitter;
pub mod factory;
pub mod files;

pub use avatar::{
    AvatarClient, AvatarSession, NewAvatarSessionRequest, RecordingAvatarSession,
    StaticAvatarClient,
};
pub use bridge::AgentBridge;
pub use client_events::{parse_client_event, AvatarInfo, ClientEvent, ControlEvent};
pub use connection::{Connection, InMemoryConnection};
pub use emitter::{BridgeEmitter, AVATAR_THINK_UTTERANCE};
pub use factory::{runtime_for_agent, ProviderFactory};
pub use files::{FileHandler, StaticFileHandler};
