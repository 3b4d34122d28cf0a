// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod anthropic;
pub mod error;
pub mod mock;
pub mod openai_compat;
pub mod provider;
pub mod registry;
pub mod sanitize;
pub mod tokens;
pub mod types;

pub use anthropic::AnthropicProvider;
pub use error::ProviderError;
pub use mock::{ScriptItem, ScriptedProvider};
pub use openai_compat::{AuthStyle, OpenAICompatProvider};
pub use provider::{FragmentStream, ModelProvider};
pub use registry::{provider_for_model, uses_developer_root_role};
pub use sanitize::{strip_unsupported_media, InputModality};
pub use tokens::{approx_conversation_tokens, HeuristicTokenCounter, TokenCounter};
pub use types::{
    ChatMessage, CompletionRequest, ContentBlock, FinishReason, MediaInput, MediaKind,
    ResponseFragment, Role, ToolCall, ToolResult, ToolSchema,
};
