use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::accounts::ProfileUpdate;
use crate::error::AppResult;
use crate::extractors::{ApiJson, ApiMultipart, ApiPath, ApiQuery, CurrentUser, MaybeUser};
use crate::media::{profile_picture_path, settle};
use crate::pagination::{ListQuery, Page, PageRequest};
use crate::reporting::UserStats;
use crate::routes::form::{image_update, ImageForm};
use crate::routes::views::{FollowBody, ProfileBody, UserCard};
use crate::state::AppState;

const SUGGESTION_LIMIT: u32 = 10;

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

#[derive(Deserialize)]
pub struct UpdateEmailRequest {
    pub new_email: String,
    pub current_password: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/users/search", get(search))
        .route("/api/users/profiles", get(list_profiles))
        .route("/api/users/profiles/{id}", get(profile))
        .route("/api/users/profiles/{id}/followers", get(followers))
        .route("/api/users/profiles/{id}/following", get(following))
        .route("/api/users/me", get(me).patch(update_me))
        .route("/api/users/me/password", put(change_password))
        .route("/api/users/me/email", put(update_email))
        .route("/api/users/me/stats", get(stats))
        .route("/api/users/{id}/follow", post(toggle_follow))
        .route("/api/users/{id}/follow/status", get(follow_status))
        .route("/api/users/follow/suggestions", get(suggestions))
}

/// GET /api/users/search?q=&page=
async fn search(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> AppResult<Response> {
    let request = PageRequest::new(query.page, state.config.pagination.user_page_size)?;
    let found = state.accounts.search(query.search(), true, request)?;
    let media = state.media.as_ref();
    let results: Vec<_> = found.results.iter().map(|u| UserCard::new(u, media)).collect();

    Ok(Json(json!({
        "query": query.q.unwrap_or_default(),
        "count": results.len(),
        "total": found.total,
        "page": found.page,
        "total_pages": found.total_pages,
        "results": results,
    }))
    .into_response())
}

/// GET /api/users/profiles?page=
async fn list_profiles(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> AppResult<Json<Page<UserCard>>> {
    let request = PageRequest::new(query.page, state.config.pagination.user_page_size)?;
    let users = state.accounts.list_profiles(request)?;
    let media = state.media.as_ref();
    Ok(Json(users.map(|u| UserCard::new(&u, media))))
}

/// GET /api/users/profiles/{id}
async fn profile(
    State(state): State<AppState>,
    viewer: MaybeUser,
    ApiPath(id): ApiPath<String>,
) -> AppResult<Json<ProfileBody>> {
    let summary = state.accounts.profile(viewer.id(), &id)?;
    Ok(Json(ProfileBody::new(&summary, state.media.as_ref())))
}

async fn followers(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<String>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> AppResult<Json<Page<FollowBody>>> {
    let request = PageRequest::new(query.page, state.config.pagination.user_page_size)?;
    let edges = state.accounts.followers(&id, request)?;
    let media = state.media.as_ref();
    Ok(Json(edges.map(|e| FollowBody::new(&e, media))))
}

async fn following(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<String>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> AppResult<Json<Page<FollowBody>>> {
    let request = PageRequest::new(query.page, state.config.pagination.user_page_size)?;
    let edges = state.accounts.following(&id, request)?;
    let media = state.media.as_ref();
    Ok(Json(edges.map(|e| FollowBody::new(&e, media))))
}

/// GET /api/users/me
async fn me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<ProfileBody>> {
    let summary = state.accounts.profile(Some(&user.id), &user.id)?;
    Ok(Json(ProfileBody::new(&summary, state.media.as_ref())))
}

/// PATCH /api/users/me (multipart: name, bio, profile_picture, remove_profile_picture)
async fn update_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiMultipart(multipart): ApiMultipart,
) -> AppResult<Json<ProfileBody>> {
    let mut form = ImageForm::read(multipart, "profile_picture").await?;
    let image = image_update(&state, &mut form, "remove_profile_picture", |ext| {
        profile_picture_path(&user.id, ext)
    })?;
    let update = ProfileUpdate {
        name: form.text("name"),
        bio: form.text("bio"),
        image,
    };

    let result = state.accounts.update_profile(&user.id, &update);
    settle(state.media.as_ref(), update.image.pending_path(), result)?;

    let summary = state.accounts.profile(Some(&user.id), &user.id)?;
    Ok(Json(ProfileBody::new(&summary, state.media.as_ref())))
}

/// PUT /api/users/me/password
async fn change_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(body): ApiJson<ChangePasswordRequest>,
) -> AppResult<Response> {
    state.accounts.change_password(
        &user.id,
        &body.old_password,
        &body.new_password,
        &body.confirm_password,
    )?;
    Ok(Json(json!({ "detail": "Password updated successfully." })).into_response())
}

/// PUT /api/users/me/email
async fn update_email(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(body): ApiJson<UpdateEmailRequest>,
) -> AppResult<Response> {
    let updated = state
        .accounts
        .update_email(&user.id, &body.new_email, &body.current_password)?;
    Ok(Json(json!({
        "detail": "Email updated successfully.",
        "new_email": updated.email,
    }))
    .into_response())
}

/// GET /api/users/me/stats
async fn stats(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<UserStats>> {
    Ok(Json(state.reporter.user_stats(&user, Utc::now())?))
}

/// POST /api/users/{id}/follow
/// 201 when now following, 200 when unfollowed.
async fn toggle_follow(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiPath(id): ApiPath<String>,
) -> AppResult<Response> {
    let toggle = state.accounts.toggle_follow(&user.id, &id)?;
    let (status, detail) = if toggle.is_following {
        (StatusCode::CREATED, format!("Now following {}.", toggle.target_name))
    } else {
        (StatusCode::OK, format!("Unfollowed {}.", toggle.target_name))
    };
    Ok((
        status,
        Json(json!({ "is_following": toggle.is_following, "detail": detail })),
    )
        .into_response())
}

/// GET /api/users/{id}/follow/status
async fn follow_status(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiPath(id): ApiPath<String>,
) -> AppResult<Response> {
    let target = state.accounts.get_active(&id)?;
    let is_following = state.accounts.is_following(&user.id, &target.id)?;
    Ok(Json(json!({
        "is_following": is_following,
        "target_user_id": target.id,
        "target_user_name": target.name,
    }))
    .into_response())
}

/// GET /api/users/follow/suggestions
async fn suggestions(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<Vec<UserCard>>> {
    let users = state.accounts.suggestions(&user.id, SUGGESTION_LIMIT)?;
    let media = state.media.as_ref();
    Ok(Json(users.iter().map(|u| UserCard::new(u, media)).collect()))
}
