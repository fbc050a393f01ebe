//! # Backend Event Vocabulary
//!
//! Typed classification of the backend's SSE event types. The vocabulary is
//! fixed; anything outside it lands in the `Unknown` arm, which the
//! normalizer treats as best-effort text. JSON payloads are parsed here so
//! downstream code never touches raw strings for structured events.

use crate::streaming::parser::RawEvent;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// One citation entry from the backend's `sources` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub title: Option<String>,
    pub url: Option<String>,
    #[serde(flatten)]
    pub extra: Value,
}

/// One repository citation from the backend's `repoSources` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoSourceRef {
    pub repo: Option<String>,
    #[serde(rename = "filePath")]
    pub file_path: Option<String>,
    #[serde(flatten)]
    pub extra: Value,
}

/// A backend action object, upserted into the accumulator keyed by its own
/// `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionPayload {
    #[serde(rename = "type")]
    pub kind: Value,
    #[serde(flatten)]
    pub body: Value,
}

/// Exhaustive tagged union over the backend event vocabulary.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    /// Literal answer-text fragment (`content`, its short alias, or the
    /// default `message` event name)
    Content(String),
    /// Reasoning-trace fragment (`r`); also folded into the answer text
    Reasoning(String),
    ThreadId(String),
    QueryMessageId(String),
    AnswerMessageId(String),
    ThreadTitle(String),
    /// Whole-value replacement of the citation list
    Sources(Vec<SourceRef>),
    /// Whole-value replacement of the repository citation list
    RepoSources(Vec<RepoSourceRef>),
    /// Raw newline-delimited follow-up-question text (`rlq` / `q`)
    RelatedQuestions(String),
    Action(ActionPayload),
    /// Terminal backend error
    Error(String),
    /// Keep-alive, ignored
    Ping,
    /// Explicit terminal event (`close` / `done`); an optional JSON payload
    /// may carry final usage counters
    Done { payload: Option<Value> },
    Unknown { event: String, data: String },
}

impl BackendEvent {
    /// Classify one raw event. Returns `None` when the payload is malformed
    /// for its type — logged and skipped, never fatal to the pipeline.
    pub fn from_raw(raw: &RawEvent) -> Option<BackendEvent> {
        match raw.event.as_str() {
            "message" | "content" | "c" => Some(BackendEvent::Content(raw.data.clone())),
            "r" => Some(BackendEvent::Reasoning(raw.data.clone())),
            "threadId" => Some(BackendEvent::ThreadId(raw.data.clone())),
            "queryMessageId" => Some(BackendEvent::QueryMessageId(raw.data.clone())),
            "answerMessageId" => Some(BackendEvent::AnswerMessageId(raw.data.clone())),
            "threadTitle" => Some(BackendEvent::ThreadTitle(raw.data.clone())),
            "sources" => safe_json_parse::<Vec<SourceRef>>(&raw.data).map(BackendEvent::Sources),
            "repoSources" => {
                safe_json_parse::<Vec<RepoSourceRef>>(&raw.data).map(BackendEvent::RepoSources)
            }
            "rlq" | "q" => Some(BackendEvent::RelatedQuestions(raw.data.clone())),
            "action" => safe_json_parse::<ActionPayload>(&raw.data).map(BackendEvent::Action),
            "error" => Some(BackendEvent::Error(raw.data.clone())),
            "ping" => Some(BackendEvent::Ping),
            "close" | "done" => Some(BackendEvent::Done {
                payload: serde_json::from_str(&raw.data).ok(),
            }),
            other => Some(BackendEvent::Unknown {
                event: other.to_string(),
                data: raw.data.clone(),
            }),
        }
    }
}

/// Parse JSON from an event payload, logging failures instead of raising.
fn safe_json_parse<'a, T>(data: &'a str) -> Option<T>
where
    T: Deserialize<'a>,
{
    match serde_json::from_str::<T>(data) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!(error = %e, data = %data, "failed to parse JSON from event payload");
            None
        }
    }
}
