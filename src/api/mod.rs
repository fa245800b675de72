use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::routing::post;
use axum::{Router, extract::State, http::StatusCode, routing::get};
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::models::{GenerateTodosRequest, GenerateTodosResponse};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/generate-todos", post(generate_todos))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    state.store.ping().await?;
    Ok(StatusCode::OK)
}

async fn generate_todos(
    State(state): State<AppState>,
    payload: Result<Json<GenerateTodosRequest>, JsonRejection>,
) -> Result<Json<GenerateTodosResponse>, AppError> {
    let Json(req) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let response = state.generator.generate(req).await?;
    Ok(Json(response))
}
