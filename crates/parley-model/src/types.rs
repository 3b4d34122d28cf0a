use parley_config::ReasoningEffort;
use serde::{Deserialize, Serialize};

// ─── Roles and content blocks ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    Developer,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Developer => "developer",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// A single typed block in a message's content list.
///
/// Media blocks reference uploaded files by id; the optional `url` carries a
/// resolved location (HTTPS or data URL) filled in by the file handler at
/// request time so providers can ship the bytes without the core knowing
/// about any particular blob backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Image {
        file_id: String,
        mime_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
    Audio {
        file_id: String,
        mime_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
    File {
        file_id: String,
        mime_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

// ─── Tool calls and results ───────────────────────────────────────────────────

/// One tool invocation requested by the model.  `name` is the
/// fully-qualified `toolset-function` form; `arguments` is the JSON string
/// reassembled from streaming fragments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// The outcome of one tool call, stored on a `tool` role message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub name: String,
    pub content: String,
}

// ─── Messages ─────────────────────────────────────────────────────────────────

/// One message in the conversation history.
///
/// `content` is an ordered list of typed blocks.  Assistant messages that
/// request tools carry `tool_calls`; `tool` role messages carry
/// `tool_results`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_results: Option<Vec<ToolResult>>,
}

impl ChatMessage {
    fn text_message(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: vec![ContentBlock::text(text)],
            tool_calls: None,
            tool_results: None,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::text_message(Role::System, text)
    }

    pub fn developer(text: impl Into<String>) -> Self {
        Self::text_message(Role::Developer, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::text_message(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::text_message(Role::Assistant, text)
    }

    /// User message with mixed text and media blocks.
    pub fn user_with_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::User,
            content: blocks,
            tool_calls: None,
            tool_results: None,
        }
    }

    /// Assistant wrapper message for a batch of tool calls.  The content is
    /// intentionally empty text so providers that require a content field
    /// always get one.
    pub fn assistant_tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: vec![ContentBlock::text("")],
            tool_calls: Some(calls),
            tool_results: None,
        }
    }

    /// `tool` role message carrying one result.
    pub fn tool_result(result: ToolResult) -> Self {
        Self {
            role: Role::Tool,
            content: vec![ContentBlock::text(result.content.clone())],
            tool_calls: None,
            tool_results: Some(vec![result]),
        }
    }

    /// The plain text of this message when it is a single text block.
    pub fn as_text(&self) -> Option<&str> {
        match self.content.as_slice() {
            [ContentBlock::Text { text }] => Some(text),
            _ => None,
        }
    }

    /// Concatenation of all text blocks.
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn has_media(&self) -> bool {
        self.content
            .iter()
            .any(|b| !matches!(b, ContentBlock::Text { .. }))
    }
}

// ─── Media inputs ─────────────────────────────────────────────────────────────

/// Kind of an uploaded file, derived from its MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Audio,
    Other,
}

/// A resolved file attachment handed to the runtime for one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInput {
    pub file_id: String,
    pub mime_type: String,
    /// Resolved location: HTTPS URL or `data:<mime>;base64,…`.
    pub url: Option<String>,
}

impl MediaInput {
    pub fn kind(&self) -> MediaKind {
        if self.mime_type.starts_with("image/") {
            MediaKind::Image
        } else if self.mime_type.starts_with("audio/") {
            MediaKind::Audio
        } else {
            MediaKind::Other
        }
    }

    pub fn into_block(self) -> ContentBlock {
        match self.kind() {
            MediaKind::Image => ContentBlock::Image {
                file_id: self.file_id,
                mime_type: self.mime_type,
                url: self.url,
            },
            MediaKind::Audio => ContentBlock::Audio {
                file_id: self.file_id,
                mime_type: self.mime_type,
                url: self.url,
            },
            MediaKind::Other => ContentBlock::File {
                file_id: self.file_id,
                mime_type: self.mime_type,
                url: self.url,
            },
        }
    }
}

// ─── Completion requests ──────────────────────────────────────────────────────

/// A tool schema provided to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema of the parameters object.
    pub parameters: serde_json::Value,
}

/// Request sent to a model provider.  Always streamed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model_id: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub tools: Vec<ToolSchema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<ReasoningEffort>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    /// Deep copy of the request options with the message array removed.
    ///
    /// This is the only form in which completion options may appear inside
    /// emitted events: history must never leak through event payloads.
    pub fn sanitized(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Some(map) = value.as_object_mut() {
            map.remove("messages");
        }
        value
    }
}

// ─── Streaming fragments ──────────────────────────────────────────────────────

/// Why a completion stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    ToolCalls,
    Length,
    ContentFilter,
    Cancel,
    Other(String),
}

impl FinishReason {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Stop => "stop",
            Self::ToolCalls => "tool_calls",
            Self::Length => "length",
            Self::ContentFilter => "content_filter",
            Self::Cancel => "cancel",
            Self::Other(s) => s,
        }
    }
}

/// One streamed item from a provider.
///
/// Tool-call fragments are keyed by a provider-assigned `index`; the
/// consumer accumulates them slot-by-slot, concatenating `arguments` in
/// arrival order and overwriting `id`/`name` when a later fragment supplies
/// them.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseFragment {
    TextDelta(String),
    ThoughtDelta(String),
    /// The provider signalled the end of a reasoning block.
    ThoughtDone,
    ToolCallFragment {
        index: u32,
        id: String,
        name: String,
        arguments: String,
    },
    Usage {
        input_tokens: u32,
        output_tokens: u32,
    },
    /// The provider reported a finish reason for the current choice.
    Finish(FinishReason),
    /// The stream closed normally.
    Done,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── Message construction ──────────────────────────────────────────────────

    #[test]
    fn user_message_has_role_and_text() {
        let m = ChatMessage::user("hello");
        assert_eq!(m.role, Role::User);
        assert_eq!(m.as_text(), Some("hello"));
    }

    #[test]
    fn assistant_tool_calls_wrapper_has_empty_content() {
        let m = ChatMessage::assistant_tool_calls(vec![ToolCall {
            id: "c1".into(),
            name: "calculator-evaluate".into(),
            arguments: "{}".into(),
        }]);
        assert_eq!(m.role, Role::Assistant);
        assert_eq!(m.as_text(), Some(""));
        assert_eq!(m.tool_calls.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn tool_result_message_mirrors_content() {
        let m = ChatMessage::tool_result(ToolResult {
            tool_call_id: "c1".into(),
            name: "calculator-evaluate".into(),
            content: "4".into(),
        });
        assert_eq!(m.role, Role::Tool);
        assert_eq!(m.as_text(), Some("4"));
        assert_eq!(m.tool_results.as_ref().unwrap()[0].content, "4");
    }

    #[test]
    fn multimodal_message_detects_media() {
        let m = ChatMessage::user_with_blocks(vec![
            ContentBlock::text("what is this?"),
            ContentBlock::Image {
                file_id: "f1".into(),
                mime_type: "image/png".into(),
                url: None,
            },
        ]);
        assert!(m.has_media());
        assert!(m.as_text().is_none());
        assert_eq!(m.joined_text(), "what is this?");
    }

    // ── Media partitioning ────────────────────────────────────────────────────

    #[test]
    fn media_kind_from_mime() {
        let img = MediaInput { file_id: "a".into(), mime_type: "image/jpeg".into(), url: None };
        let audio = MediaInput { file_id: "b".into(), mime_type: "audio/wav".into(), url: None };
        let doc = MediaInput { file_id: "c".into(), mime_type: "application/pdf".into(), url: None };
        assert_eq!(img.kind(), MediaKind::Image);
        assert_eq!(audio.kind(), MediaKind::Audio);
        assert_eq!(doc.kind(), MediaKind::Other);
    }

    #[test]
    fn media_into_block_preserves_identity() {
        let input = MediaInput {
            file_id: "f9".into(),
            mime_type: "application/pdf".into(),
            url: Some("https://example.com/f9".into()),
        };
        match input.into_block() {
            ContentBlock::File { file_id, mime_type, url } => {
                assert_eq!(file_id, "f9");
                assert_eq!(mime_type, "application/pdf");
                assert_eq!(url.as_deref(), Some("https://example.com/f9"));
            }
            other => panic!("wrong block: {other:?}"),
        }
    }

    // ── Sanitized options ─────────────────────────────────────────────────────

    #[test]
    fn sanitized_strips_messages() {
        let req = CompletionRequest {
            model_id: "gpt-4o".into(),
            messages: vec![ChatMessage::user("secret history")],
            temperature: Some(0.5),
            max_tokens: Some(1024),
            ..Default::default()
        };
        let v = req.sanitized();
        assert!(v.get("messages").is_none());
        assert_eq!(v["model_id"], "gpt-4o");
        assert_eq!(v["max_tokens"], 1024);
        assert!(!v.to_string().contains("secret history"));
    }

    // ── Serialisation ─────────────────────────────────────────────────────────

    #[test]
    fn chat_message_round_trips() {
        let m = ChatMessage::user("test payload");
        let json = serde_json::to_string(&m).unwrap();
        let back: ChatMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn content_block_tags() {
        let json = serde_json::to_string(&ContentBlock::Image {
            file_id: "f1".into(),
            mime_type: "image/png".into(),
            url: None,
        })
        .unwrap();
        assert!(json.contains("\"type\":\"image\""));
        assert!(!json.contains("url"));
    }

    #[test]
    fn finish_reason_wire_names() {
        assert_eq!(FinishReason::ToolCalls.as_str(), "tool_calls");
        assert_eq!(FinishReason::Stop.as_str(), "stop");
        assert_eq!(FinishReason::Cancel.as_str(), "cancel");
    }
}
