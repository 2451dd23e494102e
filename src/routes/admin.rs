//! Staff-only moderation and reporting endpoints.

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::accounts::DependentAssets;
use crate::error::{AppError, AppResult};
use crate::extractors::{ApiJson, ApiPath, ApiQuery, StaffUser};
use crate::pagination::{ListQuery, Page, PageRequest};
use crate::reporting::{AdminPostRow, DashboardStats};
use crate::routes::views::{AdminUserBody, AdminUserDetailBody};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct UserSelection {
    pub user_ids: Vec<String>,
}

#[derive(Deserialize)]
pub struct PostModeration {
    pub is_active: bool,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/admin/dashboard", get(dashboard))
        .route("/api/admin/users", get(users))
        .route("/api/admin/users/activate", post(activate_users))
        .route("/api/admin/users/deactivate", post(deactivate_users))
        .route("/api/admin/users/grant-staff", post(grant_staff))
        .route("/api/admin/users/{id}", get(user_detail).delete(delete_user))
        .route("/api/admin/posts", get(posts))
        .route("/api/admin/posts/{id}", patch(moderate_post))
}

async fn dashboard(
    State(state): State<AppState>,
    _staff: StaffUser,
) -> AppResult<Json<DashboardStats>> {
    Ok(Json(state.reporter.dashboard(Utc::now())?))
}

/// GET /api/admin/users?q=&page=
async fn users(
    State(state): State<AppState>,
    _staff: StaffUser,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> AppResult<Json<Page<AdminUserBody>>> {
    let request = PageRequest::new(query.page, state.config.pagination.admin_user_page_size)?;
    let rows = state.reporter.admin_users(query.search(), request)?;
    let media = state.media.as_ref();
    Ok(Json(rows.map(|row| AdminUserBody::new(&row, media))))
}

async fn user_detail(
    State(state): State<AppState>,
    _staff: StaffUser,
    ApiPath(id): ApiPath<String>,
) -> AppResult<Json<AdminUserDetailBody>> {
    let detail = state.reporter.admin_user_detail(&id)?;
    Ok(Json(AdminUserDetailBody::new(&detail, state.media.as_ref())))
}

/// DELETE /api/admin/users/{id}
/// Removes the user, their posts, comments, likes and follow edges.
async fn delete_user(
    State(state): State<AppState>,
    StaffUser(staff): StaffUser,
    ApiPath(id): ApiPath<String>,
) -> AppResult<Response> {
    let dependents: [&dyn DependentAssets; 1] = [&state.content];
    let cleanup = state.accounts.delete_user(&staff.id, &id, &dependents)?;
    let released = cleanup.run(state.media.as_ref());
    tracing::debug!("Released {} asset(s) of user {}", released, id);
    Ok(Json(json!({ "detail": "User deleted successfully." })).into_response())
}

async fn activate_users(
    State(state): State<AppState>,
    StaffUser(staff): StaffUser,
    ApiJson(body): ApiJson<UserSelection>,
) -> AppResult<Response> {
    set_active(&state, &staff.id, &body.user_ids, true)
}

async fn deactivate_users(
    State(state): State<AppState>,
    StaffUser(staff): StaffUser,
    ApiJson(body): ApiJson<UserSelection>,
) -> AppResult<Response> {
    set_active(&state, &staff.id, &body.user_ids, false)
}

fn set_active(state: &AppState, actor_id: &str, user_ids: &[String], active: bool) -> AppResult<Response> {
    if user_ids.is_empty() {
        return Err(AppError::validation("user_ids", "Select at least one user."));
    }
    let result = state.accounts.set_users_active(actor_id, user_ids, active)?;
    let verb = if active { "activated" } else { "deactivated" };
    let mut detail = format!("{} user(s) {}.", result.updated, verb);
    if result.skipped_self {
        detail.push_str(" Your own account was left active.");
    }
    Ok(Json(json!({
        "updated": result.updated,
        "skipped_self": result.skipped_self,
        "detail": detail,
    }))
    .into_response())
}

async fn grant_staff(
    State(state): State<AppState>,
    _staff: StaffUser,
    ApiJson(body): ApiJson<UserSelection>,
) -> AppResult<Response> {
    if body.user_ids.is_empty() {
        return Err(AppError::validation("user_ids", "Select at least one user."));
    }
    let updated = state.accounts.grant_staff(&body.user_ids)?;
    Ok(Json(json!({
        "updated": updated,
        "detail": format!("{} user(s) granted staff status.", updated),
    }))
    .into_response())
}

/// GET /api/admin/posts?q=&page=
async fn posts(
    State(state): State<AppState>,
    _staff: StaffUser,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> AppResult<Json<Page<AdminPostRow>>> {
    let request = PageRequest::new(query.page, state.config.pagination.admin_post_page_size)?;
    let posts = state.content.list_all(query.search(), request)?;
    Ok(Json(posts.map(AdminPostRow::from)))
}

/// PATCH /api/admin/posts/{id}: hide or restore a post.
async fn moderate_post(
    State(state): State<AppState>,
    _staff: StaffUser,
    ApiPath(id): ApiPath<String>,
    ApiJson(body): ApiJson<PostModeration>,
) -> AppResult<Response> {
    let post = state.content.set_post_active(&id, body.is_active)?;
    Ok(Json(json!({ "id": post.id, "is_active": post.is_active })).into_response())
}
