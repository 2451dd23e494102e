pub mod accounts;
pub mod admin;
pub mod auth;
pub mod form;
pub mod media;
pub mod posts;
pub mod views;

use axum::extract::{DefaultBodyLimit, State};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::error::AppResult;
use crate::state::AppState;

/// Room for the text parts and multipart framing around a maximal upload.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

/// Every API route, without transport layers.
pub fn app(state: AppState) -> Router {
    let body_limit = state.config.storage.max_upload_bytes + FORM_OVERHEAD_BYTES;

    Router::new()
        .route("/api/health", get(health))
        .route("/media/{*path}", get(media::serve))
        .merge(auth::router())
        .merge(accounts::router())
        .merge(posts::router())
        .merge(admin::router())
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// GET /api/health: 200 once the database answers.
async fn health(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    conn.query_row("SELECT 1", [], |r| r.get::<_, i64>(0))?;
    Ok(Json(json!({ "status": "ok" })))
}
