use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::accounts::Registration;
use crate::auth::session;
use crate::error::AppResult;
use crate::extractors::{session_token, ApiJson};
use crate::routes::views::UserBody;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/users/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
}

// -- Cookie helpers --

fn session_cookie(name: &str, token: &str, max_age_hours: u64) -> String {
    let max_age_secs = max_age_hours * 3600;
    format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}",
        name, token, max_age_secs
    )
}

fn clear_session_cookie(name: &str) -> String {
    format!("{}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0", name)
}

// -- Handlers --

/// POST /api/users/register
async fn register(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<Registration>,
) -> AppResult<Response> {
    let user = state.accounts.register(&body)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "detail": "User registered successfully.",
            "user": UserBody::new(&user, state.media.as_ref()),
        })),
    )
        .into_response())
}

/// POST /api/auth/login
/// Returns: { token, user } with session cookie
async fn login(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<LoginRequest>,
) -> AppResult<Response> {
    let user = state.accounts.authenticate(&body.email, &body.password)?;
    let hours = state.config.auth.session_hours;
    let token = session::create_session(&state.db, &user.id, hours)?;

    tracing::info!("User logged in: {}", user.email);

    Ok((
        StatusCode::OK,
        [(
            header::SET_COOKIE,
            session_cookie(&state.config.auth.cookie_name, &token, hours),
        )],
        Json(json!({
            "token": token,
            "user": UserBody::new(&user, state.media.as_ref()),
        })),
    )
        .into_response())
}

/// POST /api/auth/logout
async fn logout(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    let cookie_name = &state.config.auth.cookie_name;
    if let Some(token) = session_token(&headers, cookie_name) {
        session::delete_session(&state.db, token)?;
    }

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, clear_session_cookie(cookie_name))],
        Json(json!({ "detail": "Logged out." })),
    )
        .into_response())
}
