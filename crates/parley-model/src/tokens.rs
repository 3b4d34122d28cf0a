// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Token estimation.
//!
//! Exact tokenizers are vendor property; a chars/4 heuristic is accurate
//! enough for budget decisions and keeps the core dependency-free.  Hosts
//! that want precise counts implement [`TokenCounter`] with their
//! tokenizer of choice and inject it through the runtime defaults.

use crate::{ChatMessage, ContentBlock, MediaKind};

/// Fixed charge for a media block, in tokens.  Matches the typical vision
/// billing for a tiled 512x512 region.
const MEDIA_BLOCK_TOKENS: usize = 765;

/// Counts tokens in text.  Implementations must be cheap enough to call on
/// every message.
pub trait TokenCounter: Send + Sync {
    fn count_tokens(&self, text: &str) -> usize;
}

/// chars/4 heuristic, the process-wide default.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicTokenCounter;

impl TokenCounter for HeuristicTokenCounter {
    fn count_tokens(&self, text: &str) -> usize {
        (text.len() / 4).max(1)
    }
}

impl ChatMessage {
    /// Approximate token footprint of this message under `counter`.
    pub fn approx_tokens(&self, counter: &dyn TokenCounter) -> usize {
        let mut total = 0usize;
        for block in &self.content {
            total += match block {
                ContentBlock::Text { text } => counter.count_tokens(text),
                _ => MEDIA_BLOCK_TOKENS,
            };
        }
        if let Some(calls) = &self.tool_calls {
            for call in calls {
                total += counter.count_tokens(&call.name) + counter.count_tokens(&call.arguments);
            }
        }
        if let Some(results) = &self.tool_results {
            for result in results {
                total += counter.count_tokens(&result.content);
            }
        }
        total.max(1)
    }
}

/// Total footprint of a message array.
pub fn approx_conversation_tokens(messages: &[ChatMessage], counter: &dyn TokenCounter) -> usize {
    messages.iter().map(|m| m.approx_tokens(counter)).sum()
}

impl crate::MediaInput {
    /// Media inputs bill flat regardless of kind under the heuristic.
    pub fn approx_tokens(&self) -> usize {
        match self.kind() {
            MediaKind::Image | MediaKind::Audio | MediaKind::Other => MEDIA_BLOCK_TOKENS,
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ToolCall, ToolResult};

    #[test]
    fn heuristic_divides_by_four() {
        assert_eq!(HeuristicTokenCounter.count_tokens("12345678"), 2);
    }

    #[test]
    fn heuristic_minimum_is_one() {
        assert_eq!(HeuristicTokenCounter.count_tokens(""), 1);
        assert_eq!(HeuristicTokenCounter.count_tokens("ab"), 1);
    }

    #[test]
    fn message_counts_text_blocks() {
        let m = ChatMessage::user("12345678");
        assert_eq!(m.approx_tokens(&HeuristicTokenCounter), 2);
    }

    #[test]
    fn media_blocks_use_flat_estimate() {
        let m = ChatMessage::user_with_blocks(vec![
            ContentBlock::text("1234"),
            ContentBlock::Image {
                file_id: "f".into(),
                mime_type: "image/png".into(),
                url: None,
            },
        ]);
        assert_eq!(m.approx_tokens(&HeuristicTokenCounter), 1 + 765);
    }

    #[test]
    fn tool_calls_and_results_are_counted() {
        let wrapper = ChatMessage::assistant_tool_calls(vec![ToolCall {
            id: "c1".into(),
            name: "calc-eval".into(),   // 9 chars → 2
            arguments: "12345678".into(), // 8 chars → 2
        }]);
        // Empty text block contributes 1 as the floor.
        assert_eq!(wrapper.approx_tokens(&HeuristicTokenCounter), 1 + 2 + 2);

        let result = ChatMessage::tool_result(ToolResult {
            tool_call_id: "c1".into(),
            name: "calc-eval".into(),
            content: "1234567890123456".into(), // 16 chars → 4
        });
        // Content appears both as the text block and the result record.
        assert_eq!(result.approx_tokens(&HeuristicTokenCounter), 4 + 4);
    }

    #[test]
    fn conversation_total_sums_messages() {
        let msgs = vec![ChatMessage::user("12345678"), ChatMessage::assistant("1234")];
        assert_eq!(approx_conversation_tokens(&msgs, &HeuristicTokenCounter), 3);
    }
}
