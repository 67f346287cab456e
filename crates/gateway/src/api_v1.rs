//! v1 API routes.
//!
//! - `POST /v1/threads/{thread_id}/run` — run a thread, streamed as SSE

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::{
        Json,
        sse::{Event as SseEvent, Sse},
    },
    routing::post,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use turnstile_core::error::SetupError;
use turnstile_core::{Error, ProjectId, ThreadId};

use crate::SharedState;

/// Build the v1 router.
pub fn v1_router(state: SharedState) -> Router {
    Router::new()
        .route("/threads/{thread_id}/run", post(run_thread_handler))
        .with_state(state)
}

/// Per-request overrides for a run.
#[derive(Debug, Deserialize)]
pub struct RunRequest {
    pub project_id: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub max_iterations: Option<u32>,
    #[serde(default)]
    pub enable_thinking: Option<bool>,
    #[serde(default)]
    pub reasoning_effort: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
}

/// Map a setup failure to its HTTP status.
fn setup_error_status(err: &Error) -> StatusCode {
    match err {
        Error::Setup(SetupError::SessionNotFound(_) | SetupError::ProjectNotFound(_)) => {
            StatusCode::NOT_FOUND
        }
        Error::Setup(SetupError::MissingComputeEnvironment(_)) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// `POST /v1/threads/{thread_id}/run` — drive a thread, receive an SSE
/// stream with one event per chunk.
async fn run_thread_handler(
    State(state): State<SharedState>,
    Path(thread_id): Path<String>,
    Json(payload): Json<RunRequest>,
) -> Result<Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    info!(thread_id = %thread_id, project_id = %payload.project_id, "v1/threads/run request");

    let mut runner = state.runner.clone();
    {
        let settings = runner.settings_mut();
        if let Some(model) = payload.model {
            settings.model = model;
        }
        if let Some(max) = payload.max_iterations {
            if max == 0 {
                return Err(api_error(
                    StatusCode::BAD_REQUEST,
                    "max_iterations must be at least 1",
                ));
            }
            settings.max_iterations = max;
        }
        if let Some(thinking) = payload.enable_thinking {
            settings.enable_thinking = thinking;
        }
        if let Some(effort) = payload.reasoning_effort {
            if !matches!(effort.as_str(), "low" | "medium" | "high") {
                return Err(api_error(
                    StatusCode::BAD_REQUEST,
                    format!("Unknown reasoning_effort '{effort}'. Use 'low', 'medium', or 'high'."),
                ));
            }
            settings.reasoning_effort = effort;
        }
    }

    let session = state
        .setup
        .prepare(ThreadId::from(thread_id), &ProjectId::from(payload.project_id))
        .await
        .map_err(|e| {
            let status = setup_error_status(&e);
            warn!(status = %status, error = %e, "Run setup failed");
            api_error(status, e.to_string())
        })?;

    let rx = runner.run_stream(session);

    let stream = ReceiverStream::new(rx).map(|chunk| {
        let data = serde_json::to_string(&chunk).unwrap_or_default();
        Ok(SseEvent::default().event(sse_event_name(&chunk.chunk_type)).data(data))
    });

    Ok(Sse::new(stream))
}

/// SSE event name for a chunk type. Line breaks are not allowed in an SSE
/// field, so such types fall back to `message` (the chunk JSON keeps the raw
/// type).
fn sse_event_name(chunk_type: &str) -> &str {
    if chunk_type.contains(['\n', '\r']) {
        "message"
    } else {
        chunk_type
    }
}
