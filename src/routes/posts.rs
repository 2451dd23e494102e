use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::content::{NewPost, PostUpdate, Viewer};
use crate::db::models::Comment;
use crate::error::{AppError, AppResult};
use crate::extractors::{ApiJson, ApiMultipart, ApiPath, ApiQuery, CurrentUser, MaybeUser};
use crate::media::{post_image_path, settle, AssetCleanup};
use crate::pagination::{ListQuery, Page, PageRequest};
use crate::routes::form::{image_update, store_image, ImageForm};
use crate::routes::views::PostBody;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CommentRequest {
    #[serde(alias = "content")]
    pub text: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/posts", get(feed).post(create_post))
        .route(
            "/api/posts/{id}",
            get(post_detail).patch(update_post).delete(delete_post),
        )
        .route("/api/posts/{id}/comment", post(add_comment))
        .route("/api/posts/{id}/comments", get(list_comments))
        .route("/api/posts/{id}/like", post(toggle_like))
        .route("/api/comments/{id}", delete(delete_comment))
}

/// GET /api/posts?q=&page=
async fn feed(
    State(state): State<AppState>,
    viewer: MaybeUser,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> AppResult<Json<Page<PostBody>>> {
    let request = PageRequest::new(query.page, state.config.pagination.feed_page_size)?;
    let posts = state
        .content
        .compose_feed(viewer.id(), query.search(), request)?;
    let media = state.media.as_ref();
    Ok(Json(posts.map(|view| PostBody::new(view, media))))
}

/// POST /api/posts (multipart: content, image)
async fn create_post(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiMultipart(multipart): ApiMultipart,
) -> AppResult<Response> {
    let mut form = ImageForm::read(multipart, "image").await?;
    let id = NewPost::next_id();
    let image = match form.take_image() {
        Some(upload) => Some(store_image(&state, &upload, |ext| post_image_path(&id, ext))?),
        None => None,
    };
    let new = NewPost {
        id,
        content: form.text("content"),
        image,
    };

    let created = state
        .content
        .create_post(&user.id, &new)
        .map(|post| (post, AssetCleanup::none()));
    let post = settle(state.media.as_ref(), new.image.as_deref(), created)?;

    let view = state.content.post_view(Viewer::user(&user), &post.id)?;
    Ok((
        StatusCode::CREATED,
        Json(PostBody::new(view, state.media.as_ref())),
    )
        .into_response())
}

/// GET /api/posts/{id}, with the comment thread.
async fn post_detail(
    State(state): State<AppState>,
    viewer: MaybeUser,
    ApiPath(id): ApiPath<String>,
) -> AppResult<Json<PostBody>> {
    let view = state
        .content
        .post_view(Viewer::maybe(viewer.0.as_ref()), &id)?;
    let comments = state.content.thread(&view.post.id)?;
    Ok(Json(
        PostBody::new(view, state.media.as_ref()).with_comments(comments),
    ))
}

/// PATCH /api/posts/{id} (multipart: content, image, remove_image)
async fn update_post(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiPath(id): ApiPath<String>,
    ApiMultipart(multipart): ApiMultipart,
) -> AppResult<Json<PostBody>> {
    // Ownership is checked before anything lands on disk.
    let existing = state.content.get_post(&id)?;
    if existing.user_id != user.id {
        return Err(AppError::Forbidden);
    }

    let mut form = ImageForm::read(multipart, "image").await?;
    let image = image_update(&state, &mut form, "remove_image", |ext| {
        post_image_path(&existing.id, ext)
    })?;
    let update = PostUpdate {
        content: form.text("content"),
        image,
    };

    let result = state.content.update_post(&user.id, &id, &update);
    settle(state.media.as_ref(), update.image.pending_path(), result)?;

    let view = state.content.post_view(Viewer::user(&user), &id)?;
    Ok(Json(PostBody::new(view, state.media.as_ref())))
}

/// DELETE /api/posts/{id}
async fn delete_post(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiPath(id): ApiPath<String>,
) -> AppResult<Response> {
    let cleanup = state.content.delete_post(&user, &id)?;
    cleanup.run(state.media.as_ref());
    Ok(Json(json!({ "detail": "Post deleted successfully." })).into_response())
}

/// POST /api/posts/{id}/comment
async fn add_comment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiPath(id): ApiPath<String>,
    ApiJson(body): ApiJson<CommentRequest>,
) -> AppResult<Response> {
    let comment = state.content.add_comment(&id, &user.id, &body.text)?;
    Ok((StatusCode::CREATED, Json(comment)).into_response())
}

/// GET /api/posts/{id}/comments
async fn list_comments(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<String>,
) -> AppResult<Json<Vec<Comment>>> {
    Ok(Json(state.content.list_comments(&id)?))
}

/// POST /api/posts/{id}/like
async fn toggle_like(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiPath(id): ApiPath<String>,
) -> AppResult<Response> {
    let toggle = state.content.toggle_like(&id, &user.id)?;
    let detail = if toggle.liked {
        "Post liked."
    } else {
        "Post unliked."
    };
    Ok(Json(json!({
        "liked": toggle.liked,
        "like_count": toggle.like_count,
        "detail": detail,
    }))
    .into_response())
}

/// DELETE /api/comments/{id}
async fn delete_comment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiPath(id): ApiPath<String>,
) -> AppResult<Response> {
    state.content.delete_comment(&user, &id)?;
    Ok(Json(json!({ "detail": "Comment deleted successfully." })).into_response())
}
