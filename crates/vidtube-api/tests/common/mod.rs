#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

use vidtube_api::media::{MediaError, MediaHost};
use vidtube_api::routes::router;
use vidtube_api::state::{AppState, AppStateInner};
use vidtube_api::tokens::{TokenConfig, TokenService};
use vidtube_db::Database;

/// Records what it was asked to upload. Fails every upload while `fail` is set.
#[derive(Default)]
pub struct FakeMedia {
    pub fail: AtomicBool,
    pub uploads: Mutex<Vec<(PathBuf, Vec<u8>)>>,
}

#[async_trait]
impl MediaHost for FakeMedia {
    async fn upload(&self, path: &Path) -> Result<String, MediaError> {
        let bytes = tokio::fs::read(path).await?;
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        self.uploads.lock().unwrap().push((path.to_path_buf(), bytes));
        if self.fail.load(Ordering::SeqCst) {
            return Err(MediaError::Rejected {
                status: 500,
                body: "boom".into(),
            });
        }
        Ok(format!("https://media.test/{name}"))
    }
}

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub media: Arc<FakeMedia>,
    pub upload_dir: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(5))
    }

    pub fn with_timeout(collaborator_timeout: Duration) -> Self {
        let media = Arc::new(FakeMedia::default());
        let upload_dir = tempfile::tempdir().unwrap();
        let tokens = TokenService::new(&TokenConfig {
            access_secret: "access-test-secret".into(),
            access_ttl: chrono::Duration::minutes(15),
            refresh_secret: "refresh-test-secret".into(),
            refresh_ttl: chrono::Duration::days(10),
        });
        let state: AppState = Arc::new(AppStateInner {
            db: Database::open_in_memory().unwrap(),
            tokens,
            media: media.clone(),
            upload_dir: upload_dir.path().join("temp"),
            collaborator_timeout,
        });
        Self {
            app: router(state.clone()),
            state,
            media,
            upload_dir,
        }
    }

    pub fn fail_uploads(&self, fail: bool) {
        self.media.fail.store(fail, Ordering::SeqCst);
    }

    /// Files still sitting in the staging directory.
    pub fn staged_files(&self) -> usize {
        match std::fs::read_dir(&self.state.upload_dir) {
            Ok(entries) => entries.count(),
            Err(_) => 0,
        }
    }

    pub async fn send(&self, req: Request<Body>) -> Response {
        let resp = self.app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        Response { status, headers, body }
    }

    pub async fn register(&self, username: &str, email: &str, password: &str) -> Response {
        let form = MultipartBuilder::new()
            .text("fullName", &format!("{username} Example"))
            .text("email", email)
            .text("username", username)
            .text("password", password)
            .file("avatar", "me.png", b"avatar-bytes");
        self.send(form.request(Method::POST, "/api/v1/users/register", None)).await
    }

    pub async fn login(&self, username: &str, password: &str) -> Response {
        self.send(json_request(
            Method::POST,
            "/api/v1/users/login",
            json!({ "username": username, "password": password }),
            None,
        ))
        .await
    }

    /// Registers and logs in, returning `(user_id, access_token, refresh_token)`.
    pub async fn signed_in(&self, username: &str) -> (String, String, String) {
        let email = format!("{username}@x.com");
        let reg = self.register(username, &email, "pa55word").await;
        assert_eq!(reg.status, StatusCode::CREATED, "{:?}", reg.body);
        let login = self.login(username, "pa55word").await;
        assert_eq!(login.status, StatusCode::OK, "{:?}", login.body);
        (
            login.body["data"]["user"]["_id"].as_str().unwrap().to_string(),
            login.body["data"]["accessToken"].as_str().unwrap().to_string(),
            login.body["data"]["refreshToken"].as_str().unwrap().to_string(),
        )
    }
}

pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl Response {
    pub fn set_cookies(&self) -> Vec<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect()
    }

    pub fn cookie(&self, name: &str) -> Option<String> {
        self.set_cookies()
            .into_iter()
            .find(|c| c.starts_with(&format!("{name}=")))
    }
}

pub fn json_request(method: Method, uri: &str, body: Value, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn empty_request(method: Method, uri: &str, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

const BOUNDARY: &str = "vidtube-test-boundary";

#[derive(Default)]
pub struct MultipartBuilder {
    body: Vec<u8>,
}

impl MultipartBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, file_name: &str, bytes: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(bytes);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn request(mut self, method: Method, uri: &str, bearer: Option<&str>) -> Request<Body> {
        self.body
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            );
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(self.body)).unwrap()
    }
}
