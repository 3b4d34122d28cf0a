// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::{
    sanitize::InputModality, ChatMessage, CompletionRequest, ContentBlock, MediaInput,
    ProviderError, ResponseFragment,
};

pub type FragmentStream =
    Pin<Box<dyn Stream<Item = Result<ResponseFragment, ProviderError>> + Send>>;

/// A streaming completion driver for one vendor wire format.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Stable driver name for logs and status display.
    fn name(&self) -> &str;

    /// Tag identifying the tool-schema dialect this driver consumes
    /// (`"openai"` or `"anthropic"`).  The tool chest shapes its inference
    /// data accordingly.
    fn tool_format(&self) -> &str;

    /// Send a completion request and return the fragment stream.
    async fn complete(&self, req: CompletionRequest) -> Result<FragmentStream, ProviderError>;

    /// Input modalities this driver's models accept.  The default claims
    /// everything; drivers for restricted model families narrow it so the
    /// chat loop can strip unsupported media before the call.
    fn input_modalities(&self) -> Vec<InputModality> {
        vec![
            InputModality::Text,
            InputModality::Image,
            InputModality::Audio,
            InputModality::File,
        ]
    }

    /// Compose the single multimodal user message for a turn that carries
    /// attachments.  The default layout — leading text block followed by
    /// images, audio clips, then other files — suits every current driver;
    /// override only when a vendor needs a different block order.
    fn multimodal_user_message(
        &self,
        user_text: &str,
        images: &[MediaInput],
        audio_clips: &[MediaInput],
        files: &[MediaInput],
    ) -> ChatMessage {
        let mut blocks = Vec::with_capacity(1 + images.len() + audio_clips.len() + files.len());
        blocks.push(ContentBlock::text(user_text));
        for input in images.iter().chain(audio_clips).chain(files) {
            blocks.push(input.clone().into_block());
        }
        ChatMessage::user_with_blocks(blocks)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
