//! # Schemas Module
//!
//! Data structures for the canonical chat-completion protocol this gateway
//! exposes: the inbound request shape, the aggregate response object, and
//! the streaming chunk frames, all OpenAI-compatible.

use serde::{Deserialize, Serialize};

/// # Chat Completion Request
///
/// Canonical inbound request. `model` carries a composite
/// `"provider/generic-name"` identifier resolved by the provider registry;
/// a missing model is a validation error, not a silent default.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ChatCompletionRequest {
    /// List of messages in the conversation
    pub messages: Vec<Message>,
    /// Composite model identifier ("provider/name")
    pub model: Option<String>,
    /// Whether to stream the response (Server-Sent Events)
    pub stream: Option<bool>,
    /// Maximum number of tokens to generate
    pub max_tokens: Option<u32>,
    /// Sampling temperature (0.0 to 2.0)
    pub temperature: Option<f32>,
    /// Nucleus sampling parameter (0.0 to 1.0)
    pub top_p: Option<f32>,
    /// Stop sequences to end generation
    pub stop: Option<Vec<String>>,
    /// Presence penalty (-2.0 to 2.0)
    pub presence_penalty: Option<f32>,
    /// Frequency penalty (-2.0 to 2.0)
    pub frequency_penalty: Option<f32>,
    /// User identifier for tracking
    pub user: Option<String>,
    /// Gateway extension: continue an existing backend thread
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

impl ChatCompletionRequest {
    /// The most recent user-authored message content, used as the content
    /// to sign for signed-header providers. Empty when no user message
    /// exists; the caller decides whether that is worth a warning.
    pub fn latest_user_content(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .and_then(|m| m.content.as_deref())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Message {
    pub role: String,
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: Some(content.into()),
            name: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: Some(content.into()),
            name: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: Some(content.into()),
            name: None,
        }
    }
}

/// Enumerated terminal status of a completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    ToolCalls,
    Error,
}

impl FinishReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::Length => "length",
            FinishReason::ContentFilter => "content_filter",
            FinishReason::ToolCalls => "tool_calls",
            FinishReason::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Usage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: Message,
    pub finish_reason: FinishReason,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// # Chat Completion Chunk (SSE Format)
///
/// One unit of the canonical streaming protocol. The optional `error`
/// member is populated exactly once per request when a backend stream
/// error is surfaced to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    /// Always "chat.completion.chunk"
    pub object: String,
    /// Unix timestamp when the completion was created
    pub created: i64,
    pub model: String,
    pub choices: Vec<StreamChoice>,
    /// Token usage (only in the final chunk, when known)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetails>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChoice {
    pub index: u32,
    pub delta: StreamDelta,
    pub finish_reason: Option<FinishReason>,
}

/// Delta content of one streaming chunk. `role` appears only in the first
/// chunk of a stream; `function_call` carries side payloads such as the
/// citation list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_call: Option<StreamFunctionCall>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamFunctionCall {
    pub name: String,
    /// JSON-encoded arguments
    pub arguments: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub message: String,
    pub r#type: String,
    pub code: Option<String>,
}

/// # Output Frame
///
/// One frame of the canonical streaming protocol: either a chunk or the
/// terminal sentinel. The sentinel is always the last frame written, even
/// on error paths.
#[derive(Debug, Clone)]
pub enum OutputFrame {
    Chunk(ChatCompletionChunk),
    Done,
}

impl OutputFrame {
    /// Format the frame as a `data: <payload>\n\n` wire string.
    pub fn to_sse_string(&self) -> String {
        match self {
            OutputFrame::Chunk(chunk) => {
                let json = serde_json::to_string(chunk).unwrap_or_default();
                format!("data: {}\n\n", json)
            }
            OutputFrame::Done => "data: [DONE]\n\n".to_string(),
        }
    }

    /// The raw data payload, without SSE framing.
    pub fn data_payload(&self) -> String {
        match self {
            OutputFrame::Chunk(chunk) => serde_json::to_string(chunk).unwrap_or_default(),
            OutputFrame::Done => "[DONE]".to_string(),
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, OutputFrame::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_user_content_picks_last_user_message() {
        let req = ChatCompletionRequest {
            messages: vec![
                Message::system("be brief"),
                Message::user("first"),
                Message::assistant("answer"),
                Message::user("second"),
            ],
            ..Default::default()
        };
        assert_eq!(req.latest_user_content(), Some("second"));
    }

    #[test]
    fn test_latest_user_content_empty_conversation() {
        let req = ChatCompletionRequest::default();
        assert_eq!(req.latest_user_content(), None);
    }

    #[test]
    fn test_finish_reason_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&FinishReason::ContentFilter).unwrap(),
            "\"content_filter\""
        );
        assert_eq!(FinishReason::Stop.as_str(), "stop");
    }

    #[test]
    fn test_delta_skips_absent_fields() {
        let delta = StreamDelta {
            content: Some("hi".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_string(&delta).unwrap();
        assert_eq!(json, r#"{"content":"hi"}"#);
    }

    #[test]
    fn test_done_frame_sentinel() {
        assert_eq!(OutputFrame::Done.to_sse_string(), "data: [DONE]\n\n");
    }
}
