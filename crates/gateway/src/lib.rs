//! HTTP gateway for Turnstile.
//!
//! Exposes a health check and the v1 run endpoint, which drives a thread
//! through the iteration loop and streams every chunk back as a
//! server-sent event.
//!
//! Built on Axum.

pub mod api_v1;

use axum::extract::DefaultBodyLimit;
use axum::{Router, response::Json, routing::get};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::info;

use turnstile_agent::{IterationLoop, SessionSetup};
use turnstile_config::AppConfig;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub config: AppConfig,
    pub setup: SessionSetup,
    /// Template loop; each request clones it and applies its overrides
    pub runner: IterationLoop,
}

pub type SharedState = Arc<GatewayState>;

/// Build the full router.
///
/// Layers applied:
/// - CORS restricted to localhost origins
/// - Request body size limit (64 KB)
/// - HTTP trace logging
pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(|origin, _| {
            origin.as_bytes().starts_with(b"http://localhost")
                || origin.as_bytes().starts_with(b"http://127.0.0.1")
        }))
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers([axum::http::header::CONTENT_TYPE])
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/v1", api_v1::v1_router(state))
        .layer(DefaultBodyLimit::max(64 * 1024))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server.
pub async fn start(state: SharedState) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", state.config.gateway.host, state.config.gateway.port);
    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use turnstile_agent::{ReplayExecutor, ReplayScript};
    use turnstile_billing::QuotaLedger;
    use turnstile_core::{AccountId, Project, ProjectId, SandboxInfo, ThreadId};
    use turnstile_store::{InMemorySessionStore, SessionSeed};

    pub const SCRIPT: &str = r#"{"turns":[
        {"chunks":[
            {"type":"assistant","content":"{\"content\":\"Deploying now\"}"},
            {"type":"tool","content":{"name":"deploy"},"tool_call_id":"c-1"}
        ]},
        {"chunks":[{"type":"assistant","content":"{\"content\":\"Done. </complete>\"}"}]}
    ]}"#;

    pub async fn state() -> SharedState {
        state_with_script(SCRIPT).await
    }

    pub async fn state_with_script(script: &str) -> SharedState {
        let store = Arc::new(InMemorySessionStore::new());
        let seed = SessionSeed::from_json(
            r#"{"thread_id":"t-1",
                "project":{"project_id":"p-1","account_id":"a-1","sandbox":{"id":"sb-1"}},
                "messages":[{"type":"user","content":"ship it"}]}"#,
        )
        .unwrap();
        store.seed(&seed).await.unwrap();
        store
            .add_project(Project {
                project_id: ProjectId::from("bare"),
                account_id: AccountId::from("a-1"),
                sandbox: Some(SandboxInfo { id: String::new() }),
            })
            .await;
        store
            .add_thread(ThreadId::from("t-2"), ProjectId::from("bare"))
            .await;
        store
            .add_thread(ThreadId::from("t-3"), ProjectId::from("p-1"))
            .await;

        let executor = ReplayExecutor::new(ReplayScript::from_json(script).unwrap());
        let config = AppConfig::default();
        Arc::new(GatewayState {
            setup: SessionSetup::new(store.clone()),
            runner: IterationLoop::new(
                Arc::new(QuotaLedger::from_config(&config.billing)),
                store,
                Arc::new(executor),
            ),
            config,
        })
    }
}
