//! # Event Normalizer and Accumulator
//!
//! The per-request state machine folding backend events into one
//! `AccumulatedAnswer`. Exactly one accumulator exists per request and is
//! owned by that request's pipeline; nothing here is shared.
//!
//! Reasoning fragments are accumulated immediately (so the aggregate answer
//! preserves arrival order) but their EMISSION is buffered: consecutive
//! fragments coalesce until a size threshold, a time threshold, or a line
//! break triggers a flush. Any unrelated visible-content event flushes the
//! buffer first, keeping emitted order consistent with accumulated order.

use crate::schemas::{FinishReason, Usage};
use crate::streaming::events::{ActionPayload, BackendEvent, RepoSourceRef, SourceRef};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Clock seam so flush thresholds are deterministically testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall-clock implementation used in production.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// One parsed follow-up question, re-derived from the raw newline-delimited
/// text the backend streams.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelatedQuestion {
    pub id: u32,
    pub text: String,
}

/// # Accumulated Answer
///
/// The single mutable aggregate per request. Text and reasoning are
/// append-only until `is_finished` flips; after that every apply is a no-op.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccumulatedAnswer {
    pub text: String,
    pub reasoning: Option<String>,
    pub sources: Vec<SourceRef>,
    pub repo_sources: Vec<RepoSourceRef>,
    pub actions: Vec<ActionPayload>,
    pub related_questions: Vec<RelatedQuestion>,
    #[serde(skip)]
    related_questions_raw: String,
    pub thread_id: Option<String>,
    pub query_message_id: Option<String>,
    pub answer_message_id: Option<String>,
    pub thread_title: Option<String>,
    pub finish_reason: Option<FinishReason>,
    pub usage: Option<Usage>,
    pub error: Option<String>,
    pub is_finished: bool,
}

impl AccumulatedAnswer {
    /// Re-derive the parsed question list from the raw accumulated text:
    /// split on line breaks, trim, drop empties, zero-based id per line.
    fn update_related_questions(&mut self) {
        self.related_questions = self
            .related_questions_raw
            .split('\n')
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .enumerate()
            .map(|(id, text)| RelatedQuestion {
                id: id as u32,
                text: text.to_string(),
            })
            .collect();
    }

    /// Upsert an action keyed by the payload's own `type` field.
    fn upsert_action(&mut self, action: ActionPayload) {
        match self.actions.iter_mut().find(|a| a.kind == action.kind) {
            Some(existing) => *existing = action,
            None => self.actions.push(action),
        }
    }
}

/// # Stream Context
///
/// Ephemeral per-request bookkeeping: the pending-reasoning buffer, the
/// last-flush timestamp, and at-most-once emission flags for the sources
/// and error payloads.
pub struct StreamContext {
    pending_reasoning: String,
    last_flush: Instant,
    pub sources_emitted: bool,
    pub error_emitted: bool,
    flush_bytes: usize,
    flush_interval: Duration,
    clock: Arc<dyn Clock>,
}

impl StreamContext {
    pub fn new(flush_bytes: usize, flush_interval: Duration, clock: Arc<dyn Clock>) -> Self {
        let last_flush = clock.now();
        Self {
            pending_reasoning: String::new(),
            last_flush,
            sources_emitted: false,
            error_emitted: false,
            flush_bytes,
            flush_interval,
            clock,
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending_reasoning.is_empty()
    }

    /// Drain the pending buffer unconditionally, resetting the flush timer.
    pub fn take_pending(&mut self) -> Option<String> {
        self.last_flush = self.clock.now();
        if self.pending_reasoning.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending_reasoning))
        }
    }

    fn push_pending(&mut self, fragment: &str) {
        self.pending_reasoning.push_str(fragment);
    }

    /// Flush triggers: size threshold, elapsed time since last flush, or a
    /// line break anywhere in the buffer.
    fn should_flush(&self) -> bool {
        self.pending_reasoning.len() >= self.flush_bytes
            || self.pending_reasoning.contains('\n')
            || self.clock.now().duration_since(self.last_flush) >= self.flush_interval
    }

    /// Flush forced by an unrelated visible-content event.
    fn preempt_flush(&mut self) -> Vec<String> {
        self.take_pending().into_iter().collect()
    }
}

/// Result of applying one backend event to the accumulator. `deltas` holds
/// visible text fragments ready for incremental emission, in order.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct StepResult {
    pub updated: bool,
    pub terminal: bool,
    pub deltas: Vec<String>,
}

impl StepResult {
    fn none() -> Self {
        Self::default()
    }

    fn updated(deltas: Vec<String>) -> Self {
        Self {
            updated: true,
            terminal: false,
            deltas,
        }
    }

    fn terminal(deltas: Vec<String>) -> Self {
        Self {
            updated: true,
            terminal: true,
            deltas,
        }
    }
}

/// Stateless dispatcher applying one event at a time.
pub struct Normalizer;

impl Normalizer {
    /// Apply one event to the accumulator, mutating it in place and
    /// reporting what became visible. Once the answer is finished every
    /// further event is a no-op.
    pub fn apply(
        event: BackendEvent,
        acc: &mut AccumulatedAnswer,
        ctx: &mut StreamContext,
    ) -> StepResult {
        if acc.is_finished {
            debug!("dropping event after terminal state");
            return StepResult::none();
        }

        match event {
            BackendEvent::Content(data) => {
                if data.is_empty() {
                    return StepResult::none();
                }
                let mut deltas = ctx.preempt_flush();
                acc.text.push_str(&data);
                deltas.push(data);
                StepResult::updated(deltas)
            }
            BackendEvent::Reasoning(data) => {
                if data.is_empty() {
                    return StepResult::none();
                }
                // Folded into both fields from the same datum so plain
                // clients still see the reasoning trace as text.
                acc.reasoning
                    .get_or_insert_with(String::new)
                    .push_str(&data);
                acc.text.push_str(&data);
                ctx.push_pending(&data);
                let deltas = if ctx.should_flush() {
                    ctx.take_pending().into_iter().collect()
                } else {
                    Vec::new()
                };
                StepResult::updated(deltas)
            }
            BackendEvent::ThreadId(value) => {
                acc.thread_id = Some(value);
                StepResult::updated(Vec::new())
            }
            BackendEvent::QueryMessageId(value) => {
                acc.query_message_id = Some(value);
                StepResult::updated(Vec::new())
            }
            BackendEvent::AnswerMessageId(value) => {
                acc.answer_message_id = Some(value);
                StepResult::updated(Vec::new())
            }
            BackendEvent::ThreadTitle(value) => {
                acc.thread_title = Some(value);
                StepResult::updated(Vec::new())
            }
            BackendEvent::Sources(list) => {
                // Whole-value replacement, not append.
                acc.sources = list;
                StepResult::updated(Vec::new())
            }
            BackendEvent::RepoSources(list) => {
                acc.repo_sources = list;
                StepResult::updated(Vec::new())
            }
            BackendEvent::RelatedQuestions(data) => {
                let trimmed = data.trim();
                if trimmed.is_empty() {
                    return StepResult::none();
                }
                acc.related_questions_raw.push('\n');
                acc.related_questions_raw.push_str(trimmed);
                acc.update_related_questions();
                StepResult::updated(Vec::new())
            }
            BackendEvent::Action(action) => {
                acc.upsert_action(action);
                StepResult::updated(Vec::new())
            }
            BackendEvent::Error(message) => {
                error!(error = %message, "backend reported stream error");
                let mut deltas = ctx.preempt_flush();
                let marker = if acc.text.is_empty() {
                    format!("[ERROR]: {}", message)
                } else {
                    format!("\n[ERROR]: {}", message)
                };
                acc.text.push_str(&marker);
                deltas.push(marker);
                if acc.error.is_none() {
                    acc.error = Some(message);
                }
                acc.finish_reason = Some(FinishReason::Error);
                acc.is_finished = true;
                StepResult::terminal(deltas)
            }
            BackendEvent::Done { payload } => {
                if let Some(payload) = payload {
                    if let Some(usage) = extract_usage(&payload) {
                        // Overwrite, never sum: the backend reports totals.
                        acc.usage = Some(usage);
                    }
                }
                acc.is_finished = true;
                StepResult::terminal(Vec::new())
            }
            BackendEvent::Ping => StepResult::none(),
            BackendEvent::Unknown { event, data } => {
                if data.is_empty() {
                    return StepResult::none();
                }
                warn!(event = %event, "unrecognized event type; appending payload as text");
                let mut deltas = ctx.preempt_flush();
                acc.text.push_str(&data);
                deltas.push(data);
                StepResult::updated(deltas)
            }
        }
    }
}

/// Pull backend-reported usage counters out of a terminal-event payload.
/// Accepts the counters at the top level or nested under `usage`.
fn extract_usage(payload: &serde_json::Value) -> Option<Usage> {
    let candidate = if payload.get("usage").is_some() {
        payload.get("usage")?
    } else {
        payload
    };
    serde_json::from_value::<Usage>(candidate.clone()).ok()
}
