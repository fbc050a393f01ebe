//! # Server Handlers
//!
//! HTTP route handlers for the gateway front door.

use axum::{
    extract::State,
    http::StatusCode,
    response::{sse::Event, sse::KeepAlive, sse::Sse, IntoResponse, Json as JsonResponse, Response},
    Json,
};
use futures_util::StreamExt;
use std::convert::Infallible;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::info;

use super::AppState;
use crate::{
    error::GatewayError,
    schemas::ChatCompletionRequest,
    streaming::{PipelineSettings, StreamPipeline},
};

/// Chat completions handler. Validates the request, resolves the composite
/// model through the registry, and runs the streaming or aggregate pipeline
/// depending on the CLIENT's `stream` flag.
pub async fn chat_completions(
    State(state): State<AppState>,
    Json(req): Json<ChatCompletionRequest>,
) -> Result<Response, GatewayError> {
    let model = req
        .model
        .clone()
        .filter(|m| !m.is_empty())
        .ok_or_else(|| GatewayError::Validation("missing 'model' field".to_string()))?;

    if req.messages.is_empty() {
        return Err(GatewayError::Validation(
            "'messages' must not be empty".to_string(),
        ));
    }

    let (provider, backend_model) = state.registry().resolve(&model)?;
    info!(model = %model, provider = %provider.name, backend_model = %backend_model,
          stream = req.stream.unwrap_or(false), "chat completion request");

    let pipeline = StreamPipeline::new(
        state.http_client().clone(),
        provider,
        state.signer(),
        PipelineSettings::from_config(state.config()),
    );

    if req.stream.unwrap_or(false) {
        let frames = pipeline.run_streaming(&req, &backend_model, &model).await?;
        let keep_alive =
            KeepAlive::new().interval(Duration::from_secs(state.config().streaming_keep_alive_interval));

        let events = frames
            .map(|frame| Ok::<_, Infallible>(Event::default().data(frame.data_payload())));

        Ok(Sse::new(events).keep_alive(keep_alive).into_response())
    } else {
        let response = pipeline.run_aggregate(&req, &backend_model, &model).await?;
        Ok((StatusCode::OK, Json(response)).into_response())
    }
}

/// Health check handler
pub async fn health_check() -> impl IntoResponse {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let health_status = serde_json::json!({
        "status": "healthy",
        "timestamp": timestamp,
        "service": "chatconduit",
        "version": env!("CARGO_PKG_VERSION")
    });

    (StatusCode::OK, JsonResponse(health_status))
}
