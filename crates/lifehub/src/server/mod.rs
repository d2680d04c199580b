use std::net::SocketAddr;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{
    dynamic_now::{self, ClockBlock},
    flusher::FlusherHandle,
    state::{AppContext, DynamicNowState},
    sync::{FlushOutcome, SyncItem, SyncOp},
    tasks::Task,
};

#[derive(Clone)]
pub struct ServerState {
    ctx: AppContext,
    flusher: FlusherHandle,
}

impl ServerState {
    pub fn new(ctx: AppContext, flusher: FlusherHandle) -> Self {
        Self { ctx, flusher }
    }

    fn ctx(&self) -> &AppContext {
        &self.ctx
    }
}

pub async fn serve(state: ServerState) -> anyhow::Result<()> {
    let addr: SocketAddr = state.ctx().config().server.addr().parse()?;
    let listener = TcpListener::bind(addr).await?;
    serve_with_listener(listener, state).await
}

pub async fn serve_with_listener(listener: TcpListener, state: ServerState) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, "server listening");

    let app = router(state.clone());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.ctx().clone()))
        .await?;

    Ok(())
}

fn router(state: ServerState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/api/now", get(now_overview))
        .route("/api/now/toggle", post(toggle_dynamic_now))
        .route("/api/tasks/filter", post(filter_tasks))
        .route(
            "/api/sync/queue",
            get(list_queue).post(enqueue_mutation).delete(clear_queue),
        )
        .route("/api/sync/queue/:id", axum::routing::delete(remove_queued))
        .route("/api/sync/flush", post(flush_queue))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal(ctx: AppContext) {
    ctx.shutdown_notifier().notified().await;
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize)]
struct NowResponse {
    hour: u32,
    time_block: ClockBlock,
    #[serde(flatten)]
    state: DynamicNowState,
    queued: usize,
}

async fn now_overview(State(state): State<ServerState>) -> Json<NowResponse> {
    let hour = dynamic_now::current_hour();
    Json(NowResponse {
        hour,
        time_block: dynamic_now::time_block_for_hour(hour),
        state: state.ctx().dynamic_now(),
        queued: state.ctx().queue().len(),
    })
}

/// Explicit fields update what they name; an empty body flips `enabled`,
/// mirroring the bare toggle the UI exposes.
#[derive(Debug, Default, Deserialize)]
struct ToggleRequest {
    #[serde(default)]
    enabled: Option<bool>,
    #[serde(default)]
    show_hidden: Option<bool>,
}

async fn toggle_dynamic_now(
    State(state): State<ServerState>,
    Json(request): Json<ToggleRequest>,
) -> Json<DynamicNowState> {
    let updated = state.ctx().update_dynamic_now(|dynamic_now| {
        match request.enabled {
            Some(enabled) => dynamic_now.set_enabled(enabled),
            None if request.show_hidden.is_none() => dynamic_now.toggle(),
            None => {}
        }
        if let Some(show_hidden) = request.show_hidden {
            dynamic_now.set_show_hidden(show_hidden);
        }
    });
    Json(updated)
}

#[derive(Debug, Deserialize)]
struct FilterRequest {
    tasks: Vec<Task>,
    #[serde(default)]
    hour: Option<u32>,
}

#[derive(Debug, Serialize)]
struct FilterResponse {
    visible_tasks: Vec<Task>,
    hidden_tasks: Vec<Task>,
    hidden_reason: Option<String>,
    hidden_count: usize,
    hour: u32,
    time_block: ClockBlock,
}

async fn filter_tasks(
    State(state): State<ServerState>,
    Json(request): Json<FilterRequest>,
) -> Json<FilterResponse> {
    let toggles = state.ctx().dynamic_now();
    let hour = request.hour.unwrap_or_else(dynamic_now::current_hour);
    let result = dynamic_now::apply_dynamic_now_filter(
        &request.tasks,
        toggles.enabled,
        toggles.show_hidden,
        Some(hour),
    );

    Json(FilterResponse {
        hidden_count: result.hidden_tasks.len(),
        visible_tasks: result.visible_tasks.into_iter().cloned().collect(),
        hidden_tasks: result.hidden_tasks.into_iter().cloned().collect(),
        hidden_reason: result.hidden_reason,
        hour,
        time_block: dynamic_now::time_block_for_hour(hour),
    })
}

#[derive(Debug, Serialize)]
struct QueueResponse {
    items: Vec<SyncItem>,
    length: usize,
}

async fn list_queue(State(state): State<ServerState>) -> Json<QueueResponse> {
    let items = state.ctx().queue().items();
    Json(QueueResponse {
        length: items.len(),
        items,
    })
}

#[derive(Debug, Deserialize)]
struct EnqueueRequest {
    endpoint: String,
    #[serde(flatten)]
    op: SyncOp,
}

async fn enqueue_mutation(
    State(state): State<ServerState>,
    Json(request): Json<EnqueueRequest>,
) -> impl IntoResponse {
    match state.ctx().queue().enqueue(request.endpoint, request.op) {
        Ok(item) => (StatusCode::CREATED, Json(item)).into_response(),
        Err(err) => {
            warn!(error = ?err, "failed to enqueue mutation");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn clear_queue(State(state): State<ServerState>) -> impl IntoResponse {
    match state.ctx().queue().clear() {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            warn!(error = ?err, "failed to clear sync queue");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn remove_queued(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.ctx().queue().remove(&id) {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            warn!(error = ?err, id = %id, "failed to remove queued mutation");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct FlushParams {
    #[serde(default)]
    background: bool,
}

/// Run one flush pass. `?background=true` hands the pass to the flusher task
/// and returns immediately; the default waits and reports the outcome.
async fn flush_queue(
    State(state): State<ServerState>,
    Query(params): Query<FlushParams>,
) -> impl IntoResponse {
    if params.background {
        return match state.flusher.request_flush().await {
            Ok(()) => StatusCode::ACCEPTED.into_response(),
            Err(err) => {
                warn!(error = ?err, "failed to hand flush to background task");
                StatusCode::SERVICE_UNAVAILABLE.into_response()
            }
        };
    }

    let outcome: FlushOutcome = state.ctx().queue().flush().await;
    Json(outcome).into_response()
}
