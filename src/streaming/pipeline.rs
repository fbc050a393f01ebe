//! # Stream Orchestrator
//!
//! Wires parser, normalizer, and emitter into the two request pipelines:
//! streaming (backend bytes forwarded incrementally as canonical frames)
//! and aggregate (backend bytes fully drained, one response object). Each
//! request owns one pipeline instance end to end; pipelines share nothing
//! mutable with each other.
//!
//! Failures before the backend stream opens surface as clean HTTP errors.
//! Failures mid-stream never sever the client connection: whatever was
//! buffered is emitted, then the error/finish/sentinel sequence.

use crate::{
    adapters::build_backend_request,
    config::Config,
    error::GatewayError,
    registry::ProviderDescriptor,
    schemas::{ChatCompletionRequest, ChatCompletionResponse, FinishReason, OutputFrame},
    signing::Signer,
    streaming::{
        accumulator::{AccumulatedAnswer, Clock, Normalizer, StreamContext, SystemClock},
        emit::ChunkEmitter,
        events::BackendEvent,
        parser::{RawEvent, SseParser},
    },
};
use bytes::Bytes;
use futures_util::stream::{self, Stream, StreamExt};
use serde_json::json;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Tuning for the reasoning flush policy plus the clock seam that makes it
/// deterministic in tests.
#[derive(Clone)]
pub struct PipelineSettings {
    pub flush_bytes: usize,
    pub flush_interval: Duration,
    pub clock: Arc<dyn Clock>,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            flush_bytes: config.reasoning_flush_bytes,
            flush_interval: Duration::from_millis(config.reasoning_flush_interval_ms),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn context(&self) -> StreamContext {
        StreamContext::new(self.flush_bytes, self.flush_interval, self.clock.clone())
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            flush_bytes: 64,
            flush_interval: Duration::from_millis(250),
            clock: Arc::new(SystemClock),
        }
    }
}

/// # Stream Pipeline
///
/// One provider-bound orchestrator. Constructed per request from shared
/// read-only parts (client, descriptor, signer); all mutable state lives in
/// the per-run machines below.
pub struct StreamPipeline {
    client: reqwest::Client,
    provider: Arc<ProviderDescriptor>,
    signer: Arc<dyn Signer>,
    settings: PipelineSettings,
}

impl StreamPipeline {
    pub fn new(
        client: reqwest::Client,
        provider: Arc<ProviderDescriptor>,
        signer: Arc<dyn Signer>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            client,
            provider,
            signer,
            settings,
        }
    }

    /// Open the backend stream, reporting connection and status failures
    /// before any client-visible frame exists.
    async fn open_backend_stream(
        &self,
        req: &ChatCompletionRequest,
        backend_model: &str,
    ) -> Result<impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static, GatewayError>
    {
        let outbound =
            build_backend_request(req, &self.provider, self.signer.as_ref(), backend_model)?;
        debug!(url = %outbound.url, provider = %self.provider.name, "opening backend stream");

        let response = self
            .client
            .post(&outbound.url)
            .headers(outbound.headers)
            .json(&outbound.body)
            .send()
            .await
            .map_err(GatewayError::from)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let excerpt: String = body.chars().take(512).collect();
            let message = if excerpt.is_empty() {
                format!("backend returned status {}", status)
            } else {
                format!("backend returned status {}: {}", status, excerpt)
            };
            error!(status = status.as_u16(), "backend request failed");
            return Err(GatewayError::BackendHttp {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.bytes_stream())
    }

    /// Streaming mode: canonical frames forwarded incrementally.
    pub async fn run_streaming(
        &self,
        req: &ChatCompletionRequest,
        backend_model: &str,
        canonical_model: &str,
    ) -> Result<impl Stream<Item = OutputFrame> + Send + 'static, GatewayError> {
        let bytes = self.open_backend_stream(req, backend_model).await?;
        let emitter = ChunkEmitter::new(canonical_model);
        info!(request_id = emitter.request_id(), model = canonical_model, "streaming pipeline started");
        Ok(stream_output_frames(bytes, emitter, self.settings.context()))
    }

    /// Aggregate mode: backend fully drained, one response object.
    pub async fn run_aggregate(
        &self,
        req: &ChatCompletionRequest,
        backend_model: &str,
        canonical_model: &str,
    ) -> Result<ChatCompletionResponse, GatewayError> {
        let bytes = self.open_backend_stream(req, backend_model).await?;
        let emitter = ChunkEmitter::new(canonical_model);
        info!(request_id = emitter.request_id(), model = canonical_model, "aggregate pipeline started");
        Ok(aggregate_output(bytes, emitter, self.settings.context()).await)
    }
}

/// Per-run state for the streaming machine. Owned by the unfold closure;
/// dropping the returned stream drops the backend read and cancels it.
struct StreamMachine {
    bytes: Pin<Box<dyn Stream<Item = Result<Bytes, String>> + Send>>,
    parser: SseParser,
    acc: AccumulatedAnswer,
    ctx: StreamContext,
    emitter: ChunkEmitter,
    queue: VecDeque<OutputFrame>,
    terminal_enqueued: bool,
    done_emitted: bool,
}

impl StreamMachine {
    fn process_raw(&mut self, raw: &RawEvent) {
        if self.terminal_enqueued {
            return;
        }
        if let Some(event) = BackendEvent::from_raw(raw) {
            self.apply(event);
        }
    }

    fn apply(&mut self, event: BackendEvent) {
        let result = Normalizer::apply(event, &mut self.acc, &mut self.ctx);
        for delta in result.deltas {
            let frame = self.emitter.content_chunk(delta);
            self.queue.push_back(frame);
        }
        if result.terminal {
            self.enqueue_terminal();
        }
    }

    fn fold_transport_error(&mut self, message: String) {
        error!(error = %message, "transport failure mid-stream");
        if !self.terminal_enqueued {
            self.apply(BackendEvent::Error(format!("transport failure: {}", message)));
            // The error event is terminal, but guard against the apply
            // having been a no-op on an already-finished answer.
            self.enqueue_terminal();
        }
    }

    fn end_of_stream(&mut self) {
        if let Some(raw) = self.parser.finish() {
            self.process_raw(&raw);
        }
        if !self.terminal_enqueued {
            if !self.acc.is_finished {
                self.acc.is_finished = true;
            }
            self.enqueue_terminal();
        }
    }

    /// The closing frame sequence: flush buffered reasoning, then the
    /// at-most-once side payloads, then finish, then the sentinel.
    fn enqueue_terminal(&mut self) {
        if self.terminal_enqueued {
            return;
        }
        self.terminal_enqueued = true;

        if let Some(pending) = self.ctx.take_pending() {
            let frame = self.emitter.content_chunk(pending);
            self.queue.push_back(frame);
        }

        if !self.ctx.sources_emitted
            && (!self.acc.sources.is_empty() || !self.acc.repo_sources.is_empty())
        {
            self.ctx.sources_emitted = true;
            let args = json!({
                "sources": self.acc.sources,
                "repoSources": self.acc.repo_sources,
            })
            .to_string();
            let frame = self.emitter.function_call_chunk("sources", args);
            self.queue.push_back(frame);
        }

        if let Some(message) = self.acc.error.clone() {
            if !self.ctx.error_emitted {
                self.ctx.error_emitted = true;
                let frame = self.emitter.error_chunk(&message);
                self.queue.push_back(frame);
            }
        }

        let reason = self.acc.finish_reason.unwrap_or(FinishReason::Stop);
        let frame = self.emitter.finish_chunk(reason, self.acc.usage);
        self.queue.push_back(frame);
        self.queue.push_back(OutputFrame::Done);
    }
}

/// Transform a backend byte stream into canonical output frames. The first
/// frame is always the assistant role announcement; the last is always the
/// `[DONE]` sentinel, on error paths included.
pub fn stream_output_frames<S, E>(
    byte_stream: S,
    mut emitter: ChunkEmitter,
    ctx: StreamContext,
) -> impl Stream<Item = OutputFrame> + Send + 'static
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + 'static,
{
    let bytes: Pin<Box<dyn Stream<Item = Result<Bytes, String>> + Send>> =
        Box::pin(byte_stream.map(|item| item.map_err(|e| e.to_string())));

    let role = emitter.role_chunk();
    let mut machine = StreamMachine {
        bytes,
        parser: SseParser::new(),
        acc: AccumulatedAnswer::default(),
        ctx,
        emitter,
        queue: VecDeque::new(),
        terminal_enqueued: false,
        done_emitted: false,
    };
    machine.queue.push_back(role);

    stream::unfold(machine, |mut machine| async move {
        loop {
            if let Some(frame) = machine.queue.pop_front() {
                if frame.is_done() {
                    machine.done_emitted = true;
                }
                return Some((frame, machine));
            }
            if machine.done_emitted {
                return None;
            }

            match machine.bytes.next().await {
                Some(Ok(chunk)) => {
                    let raws = machine.parser.feed(&chunk);
                    for raw in &raws {
                        machine.process_raw(raw);
                    }
                }
                Some(Err(message)) => machine.fold_transport_error(message),
                None => machine.end_of_stream(),
            }
        }
    })
}

/// Drain a backend byte stream through the normalizer and produce the
/// aggregate response object.
pub async fn aggregate_output<S, E>(
    byte_stream: S,
    emitter: ChunkEmitter,
    mut ctx: StreamContext,
) -> ChatCompletionResponse
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    let mut bytes = Box::pin(byte_stream);
    let mut parser = SseParser::new();
    let mut acc = AccumulatedAnswer::default();

    let mut terminal = false;
    while !terminal {
        match bytes.next().await {
            Some(Ok(chunk)) => {
                for raw in parser.feed(&chunk) {
                    if let Some(event) = BackendEvent::from_raw(&raw) {
                        let result = Normalizer::apply(event, &mut acc, &mut ctx);
                        if result.terminal {
                            terminal = true;
                            break;
                        }
                    }
                }
            }
            Some(Err(e)) => {
                error!(error = %e, "transport failure mid-stream");
                Normalizer::apply(
                    BackendEvent::Error(format!("transport failure: {}", e)),
                    &mut acc,
                    &mut ctx,
                );
                terminal = true;
            }
            None => break,
        }
    }

    if !terminal {
        if let Some(raw) = parser.finish() {
            if let Some(event) = BackendEvent::from_raw(&raw) {
                Normalizer::apply(event, &mut acc, &mut ctx);
            }
        }
    }
    if !acc.is_finished {
        acc.is_finished = true;
    }

    emitter.aggregate(&acc)
}
