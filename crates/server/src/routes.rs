use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use serde_json::Value;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use common::types::Health;
use storage::Repository;

use crate::errors::ApiError;

#[derive(Clone)]
pub struct ServerState {
    pub repo: Arc<dyn Repository>,
}

pub async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

/// List every record stored in a namespace.
async fn list_records(
    State(state): State<ServerState>,
    Path(namespace): Path<String>,
) -> Result<Json<Vec<Value>>, ApiError> {
    let records = state.repo.read(&namespace).await?;
    Ok(Json(records))
}

/// Store a new record; the repository assigns its identifier.
async fn create_record(
    State(state): State<ServerState>,
    Path(namespace): Path<String>,
    Json(data): Json<Value>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let record = state.repo.create(&namespace, data).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// Idempotent PUT: replace the record under the given identifier, or insert
/// it when absent. 201 signals that the upsert created a new record.
async fn upsert_record(
    State(state): State<ServerState>,
    Path((namespace, id)): Path<(String, String)>,
    Json(data): Json<Value>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let created = state.repo.update(&namespace, &id, data).await?;
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(serde_json::json!({"id": id, "created": created}))))
}

async fn delete_record(
    State(state): State<ServerState>,
    Path((namespace, id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    match state.repo.delete(&namespace, &id).await? {
        true => Ok(StatusCode::NO_CONTENT),
        false => Ok(StatusCode::NOT_FOUND),
    }
}

/// Build the application router: health plus the namespaced CRUD surface.
pub fn build_router(cors: CorsLayer, state: ServerState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/:namespace", get(list_records).post(create_record))
        .route("/:namespace/:id", put(upsert_record).delete(delete_record))
        .with_state(state)
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO).include_headers(false))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO).include_headers(false))
                .on_failure(DefaultOnFailure::new().level(Level::ERROR)),
        )
}
