// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! History sanitization before a provider call.
//!
//! A session may accumulate media blocks that the currently selected model
//! cannot accept (the user switched agents mid-conversation, or a tool
//! produced an image for a text-only model).  Sending those blocks causes
//! hard 400s, so unsupported media is stripped transparently and replaced
//! with a short text placeholder naming the file.

use crate::{ChatMessage, ContentBlock};

/// Input modality a model accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputModality {
    Text,
    Image,
    Audio,
    File,
}

fn block_modality(block: &ContentBlock) -> InputModality {
    match block {
        ContentBlock::Text { .. } => InputModality::Text,
        ContentBlock::Image { .. } => InputModality::Image,
        ContentBlock::Audio { .. } => InputModality::Audio,
        ContentBlock::File { .. } => InputModality::File,
    }
}

fn block_file_id(block: &ContentBlock) -> Option<&str> {
    match block {
        ContentBlock::Text { .. } => None,
        ContentBlock::Image { file_id, .. }
        | ContentBlock::Audio { file_id, .. }
        | ContentBlock::File { file_id, .. } => Some(file_id),
    }
}

/// Replace content blocks the model cannot accept with text placeholders.
/// Messages without offending blocks pass through untouched.
pub fn strip_unsupported_media(
    messages: Vec<ChatMessage>,
    modalities: &[InputModality],
) -> Vec<ChatMessage> {
    if modalities.contains(&InputModality::Image)
        && modalities.contains(&InputModality::Audio)
        && modalities.contains(&InputModality::File)
    {
        return messages;
    }
    messages
        .into_iter()
        .map(|mut msg| {
            if !msg.has_media() {
                return msg;
            }
            msg.content = msg
                .content
                .into_iter()
                .map(|block| {
                    if modalities.contains(&block_modality(&block)) {
                        block
                    } else {
                        let file_id = block_file_id(&block).unwrap_or("unknown");
                        ContentBlock::text(format!(
                            "[attachment {file_id} omitted: not supported by this model]"
                        ))
                    }
                })
                .collect();
            msg
        })
        .collect()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MediaKind;

    fn image_block() -> ContentBlock {
        ContentBlock::Image {
            file_id: "img-1".into(),
            mime_type: "image/png".into(),
            url: None,
        }
    }

    #[test]
    fn full_modality_set_passes_through() {
        let msgs = vec![ChatMessage::user_with_blocks(vec![
            ContentBlock::text("look"),
            image_block(),
        ])];
        let out = strip_unsupported_media(
            msgs.clone(),
            &[InputModality::Text, InputModality::Image, InputModality::Audio, InputModality::File],
        );
        assert_eq!(out, msgs);
    }

    #[test]
    fn unsupported_image_becomes_placeholder() {
        let msgs = vec![ChatMessage::user_with_blocks(vec![
            ContentBlock::text("look"),
            image_block(),
        ])];
        let out = strip_unsupported_media(msgs, &[InputModality::Text]);
        assert!(!out[0].has_media());
        assert!(out[0].content.len() == 2);
        assert!(out[0]
            .joined_text()
            .contains("[attachment img-1 omitted"));
    }

    #[test]
    fn text_only_messages_untouched() {
        let msgs = vec![ChatMessage::user("plain"), ChatMessage::assistant("reply")];
        let out = strip_unsupported_media(msgs.clone(), &[InputModality::Text]);
        assert_eq!(out, msgs);
    }

    #[test]
    fn partial_support_keeps_allowed_blocks() {
        let msgs = vec![ChatMessage::user_with_blocks(vec![
            image_block(),
            ContentBlock::Audio {
                file_id: "clip-1".into(),
                mime_type: "audio/wav".into(),
                url: None,
            },
        ])];
        let out =
            strip_unsupported_media(msgs, &[InputModality::Text, InputModality::Image]);
        assert!(matches!(out[0].content[0], ContentBlock::Image { .. }));
        assert!(matches!(out[0].content[1], ContentBlock::Text { .. }));
    }
}
