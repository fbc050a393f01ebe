//! # Streaming Module
//!
//! The protocol adapter and streaming normalization engine: SSE parsing,
//! event normalization into the per-request accumulator, canonical chunk
//! emission, and the orchestrator wiring them into the streaming and
//! aggregate pipelines.

pub mod accumulator;
pub mod emit;
pub mod events;
pub mod parser;
pub mod pipeline;

// Re-export the types most callers need
pub use accumulator::{AccumulatedAnswer, Clock, Normalizer, StepResult, StreamContext, SystemClock};
pub use emit::ChunkEmitter;
pub use events::BackendEvent;
pub use parser::{RawEvent, SseParser};
pub use pipeline::{aggregate_output, stream_output_frames, PipelineSettings, StreamPipeline};
