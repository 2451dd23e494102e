use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::extractors::ApiPath;
use crate::state::AppState;

/// GET /media/{*path}
pub async fn serve(State(state): State<AppState>, ApiPath(path): ApiPath<String>) -> Response {
    match state.media.read(&path) {
        Ok(bytes) => {
            let mime = mime_guess::from_path(&path).first_or_octet_stream();
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, mime.as_ref().to_string()),
                    (header::CACHE_CONTROL, "public, max-age=86400".to_string()),
                ],
                bytes,
            )
                .into_response()
        }
        Err(err) => {
            tracing::debug!("Media {} not served: {}", path, err);
            StatusCode::NOT_FOUND.into_response()
        }
    }
}
