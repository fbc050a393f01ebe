//! # ChatConduit - Canonical Chat Gateway
//!
//! A gateway that accepts one canonical chat-completion request format and
//! forwards it to heterogeneous backend chat APIs, translating each
//! backend's wire format (JSON shapes, SSE vocabularies, authentication
//! schemes) back into one canonical response protocol, in both
//! incremental-streaming and fully-aggregated modes.
//!
//! ## Architecture
//!
//! The crate is organized around the protocol adapter and streaming
//! normalization engine:
//!
//! - [`adapters`] - Backend request building, including signed-header auth
//!   via the [`signing`] oracle
//! - [`streaming`] - SSE parsing, event normalization into the per-request
//!   accumulator, canonical chunk emission, and the pipelines
//! - [`registry`] - Composite model name resolution to provider descriptors
//! - [`config`] - Configuration with CLI and environment support
//! - [`schemas`] - Canonical request/response/chunk data structures
//! - [`error`] - Gateway error taxonomy
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chat_conduit::{AppState, Config, create_router};
//! use std::net::SocketAddr;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::for_test(); // or Config::parse_args() for CLI
//!     let state = AppState::new(config)?;
//!     let app = create_router(state);
//!
//!     let addr = SocketAddr::from(([0, 0, 0, 0], 8080));
//!     let listener = tokio::net::TcpListener::bind(addr).await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

// Core infrastructure
pub mod config;
pub mod core;
pub mod error;
pub mod schemas;

// Domain modules
pub mod adapters;
pub mod registry;
pub mod signing;
pub mod streaming;

#[cfg(feature = "server")]
pub mod server;

// Re-export commonly used types for convenience
pub use config::Config;
pub use error::GatewayError;
pub use registry::{AuthScheme, ProviderDescriptor, ProviderRegistry};
pub use schemas::{
    ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, FinishReason, Message,
    OutputFrame,
};
pub use signing::{HmacSigner, Signer, SigningError};
pub use streaming::{
    AccumulatedAnswer, ChunkEmitter, PipelineSettings, SseParser, StreamContext, StreamPipeline,
};

#[cfg(feature = "server")]
pub use server::{create_router, AppState};

/// The result type used throughout the library
pub type Result<T> = std::result::Result<T, GatewayError>;
