#![allow(dead_code)]

use agora::config::Config;
use agora::routes;
use agora::state::AppState;
use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "agora-test-boundary";

pub struct TestApp {
    pub tmp: TempDir,
    pub state: AppState,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

/// One part of a multipart form.
pub enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str, &'a [u8]),
}

impl TestApp {
    pub fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::for_data_dir(tmp.path());
        config.auth.bcrypt_cost = 4;
        let state = AppState::open(config).unwrap();
        TestApp { tmp, state }
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = routes::app(self.state.clone())
            .oneshot(request)
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.send(authorized(Request::get(uri), token).body(Body::empty()).unwrap())
            .await
    }

    pub async fn json(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Value,
    ) -> TestResponse {
        let request = authorized(Request::builder().method(method).uri(uri), token)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    pub async fn multipart(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        parts: &[Part<'_>],
    ) -> TestResponse {
        let request = authorized(Request::builder().method(method).uri(uri), token)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(parts)))
            .unwrap();
        self.send(request).await
    }

    /// Register and log in. Returns `(user_id, token)`.
    pub async fn signup(&self, email: &str, name: &str) -> (String, String) {
        let registered = self
            .json(
                Method::POST,
                "/api/users/register",
                None,
                json!({
                    "email": email,
                    "name": name,
                    "password": "password123",
                    "password_confirm": "password123",
                }),
            )
            .await;
        assert_eq!(registered.status, StatusCode::CREATED, "{}", registered.body);

        let login = self
            .json(
                Method::POST,
                "/api/auth/login",
                None,
                json!({ "email": email, "password": "password123" }),
            )
            .await;
        assert_eq!(login.status, StatusCode::OK, "{}", login.body);
        (
            login.body["user"]["id"].as_str().unwrap().to_string(),
            login.body["token"].as_str().unwrap().to_string(),
        )
    }

    /// Sign up and promote to staff directly through the store.
    pub async fn signup_staff(&self, email: &str, name: &str) -> (String, String) {
        let (id, token) = self.signup(email, name).await;
        self.state.accounts.grant_staff(&[id.clone()]).unwrap();
        (id, token)
    }

    pub async fn post_text(&self, token: &str, content: &str) -> String {
        let created = self
            .multipart(
                Method::POST,
                "/api/posts",
                Some(token),
                &[Part::Text("content", content)],
            )
            .await;
        assert_eq!(created.status, StatusCode::CREATED, "{}", created.body);
        created.body["id"].as_str().unwrap().to_string()
    }
}

fn authorized(
    builder: axum::http::request::Builder,
    token: Option<&str>,
) -> axum::http::request::Builder {
    match token {
        Some(token) => builder.header(header::AUTHORIZATION, format!("Bearer {token}")),
        None => builder,
    }
}

fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File(name, filename, bytes) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}
