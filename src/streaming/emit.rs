//! # Chunk Emitter
//!
//! Converts normalization output into the canonical wire protocol: one
//! delta chunk per visible step in streaming mode, or one aggregate
//! response object after the backend stream is fully drained. Every chunk
//! carries the stable per-request identifier and the canonical model name.

use crate::schemas::{
    ChatCompletionChunk, ChatCompletionResponse, Choice, ErrorDetails, FinishReason, Message,
    OutputFrame, StreamChoice, StreamDelta, StreamFunctionCall,
};
use crate::streaming::accumulator::AccumulatedAnswer;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Per-request emitter state: stable id, canonical model name, chunk count.
#[derive(Debug, Clone)]
pub struct ChunkEmitter {
    request_id: String,
    model: String,
    chunk_index: usize,
}

impl ChunkEmitter {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            request_id: format!("chatcmpl-{}", &Uuid::new_v4().to_string()[..8]),
            model: model.into(),
            chunk_index: 0,
        }
    }

    /// Use a caller-supplied request id instead of a generated one.
    pub fn with_request_id(request_id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            model: model.into(),
            chunk_index: 0,
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn chunks_emitted(&self) -> usize {
        self.chunk_index
    }

    fn chunk(&mut self, delta: StreamDelta, finish_reason: Option<FinishReason>) -> ChatCompletionChunk {
        self.chunk_index += 1;
        ChatCompletionChunk {
            id: self.request_id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: current_timestamp(),
            model: self.model.clone(),
            choices: vec![StreamChoice {
                index: 0,
                delta,
                finish_reason,
            }],
            usage: None,
            error: None,
        }
    }

    /// Initial chunk announcing the assistant role. Always the first frame
    /// of a streaming response.
    pub fn role_chunk(&mut self) -> OutputFrame {
        OutputFrame::Chunk(self.chunk(
            StreamDelta {
                role: Some("assistant".to_string()),
                ..Default::default()
            },
            None,
        ))
    }

    /// One visible content delta.
    pub fn content_chunk(&mut self, content: String) -> OutputFrame {
        OutputFrame::Chunk(self.chunk(
            StreamDelta {
                content: Some(content),
                ..Default::default()
            },
            None,
        ))
    }

    /// Function-like side payload (the citation list).
    pub fn function_call_chunk(&mut self, name: &str, arguments: String) -> OutputFrame {
        OutputFrame::Chunk(self.chunk(
            StreamDelta {
                function_call: Some(StreamFunctionCall {
                    name: name.to_string(),
                    arguments,
                }),
                ..Default::default()
            },
            None,
        ))
    }

    /// Error payload, emitted at most once per request. The visible error
    /// marker travels separately as a content delta; this chunk carries the
    /// structured error member.
    pub fn error_chunk(&mut self, message: &str) -> OutputFrame {
        let mut chunk = self.chunk(StreamDelta::default(), None);
        chunk.error = Some(ErrorDetails {
            message: message.to_string(),
            r#type: "upstream_error".to_string(),
            code: None,
        });
        OutputFrame::Chunk(chunk)
    }

    /// Terminal chunk with the finish reason, emitted exactly once per
    /// request and always followed by the `[DONE]` sentinel.
    pub fn finish_chunk(
        &mut self,
        reason: FinishReason,
        usage: Option<crate::schemas::Usage>,
    ) -> OutputFrame {
        let mut chunk = self.chunk(StreamDelta::default(), Some(reason));
        chunk.usage = usage;
        OutputFrame::Chunk(chunk)
    }

    /// Aggregate the fully drained accumulator into one response object.
    /// The finish reason defaults to `stop` when the backend never supplied
    /// one and no error occurred.
    pub fn aggregate(&self, acc: &AccumulatedAnswer) -> ChatCompletionResponse {
        ChatCompletionResponse {
            id: self.request_id.clone(),
            object: "chat.completion".to_string(),
            created: current_timestamp(),
            model: self.model.clone(),
            choices: vec![Choice {
                index: 0,
                message: Message::assistant(acc.text.clone()),
                finish_reason: acc.finish_reason.unwrap_or(FinishReason::Stop),
            }],
            usage: acc.usage.unwrap_or_default(),
        }
    }
}

fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs() as i64)
        .unwrap_or(0)
}
