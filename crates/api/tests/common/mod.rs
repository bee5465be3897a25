#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use shipyard_api::config::ServerConfig;
use shipyard_api::router::build_app_router;
use shipyard_api::state::AppState;
use shipyard_api::ws::WsManager;
use shipyard_codegen::{CodeGenerator, CodegenConfig, CodegenError};
use shipyard_core::auto_fix::CorrectionRequest;
use shipyard_core::types::SourceFiles;
use shipyard_db::{GenerationTracker, InMemoryJobStore};
use shipyard_events::EventBus;
use tower::ServiceExt;

pub const RUNNER_SECRET: &str = "test-runner-secret";

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config(runner_secret: Option<&str>) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        runner_secret: runner_secret.map(str::to_string),
        runner_stale_secs: 0,
        codegen: CodegenConfig {
            base_url: "http://codegen.invalid".to_string(),
            api_key: None,
            timeout: Duration::from_secs(1),
        },
    }
}

// ---------------------------------------------------------------------------
// Fake code generator
// ---------------------------------------------------------------------------

/// Code generator that replays a canned answer and records requests.
#[derive(Default)]
pub struct FakeGenerator {
    files: Mutex<Option<SourceFiles>>,
    delay: Duration,
    pub requests: Mutex<Vec<CorrectionRequest>>,
    pub calls: AtomicUsize,
}

impl FakeGenerator {
    /// Always answer with `files`.
    pub fn returning(files: SourceFiles) -> Arc<Self> {
        Arc::new(Self {
            files: Mutex::new(Some(files)),
            ..Default::default()
        })
    }

    /// Answer with `files` after sleeping for `delay`.
    pub fn slow(files: SourceFiles, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            files: Mutex::new(Some(files)),
            delay,
            ..Default::default()
        })
    }

    /// Always fail like an overloaded upstream.
    pub fn failing() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CodeGenerator for FakeGenerator {
    async fn correct(&self, request: &CorrectionRequest) -> Result<SourceFiles, CodegenError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.files.lock().unwrap().clone() {
            Some(files) => Ok(files),
            None => Err(CodegenError::ApiError {
                status: 503,
                body: "model overloaded".into(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// App construction
// ---------------------------------------------------------------------------

/// A router plus handles on the state behind it.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryJobStore>,
    pub generations: Arc<GenerationTracker>,
    pub event_bus: Arc<EventBus>,
}

/// Build the full application router (same middleware stack as the binary)
/// over a fresh in-memory store.
pub fn build_test_app_with(generator: Arc<FakeGenerator>, runner_secret: Option<&str>) -> TestApp {
    build_test_app_with_config(generator, test_config(runner_secret))
}

/// Like [`build_test_app_with`] but with a caller-supplied config.
pub fn build_test_app_with_config(generator: Arc<FakeGenerator>, config: ServerConfig) -> TestApp {
    let store = Arc::new(InMemoryJobStore::new());
    let generations = Arc::new(GenerationTracker::new());
    let event_bus = Arc::new(EventBus::default());

    let state = AppState {
        store: store.clone(),
        generations: Arc::clone(&generations),
        codegen: generator,
        config: Arc::new(config.clone()),
        ws_manager: Arc::new(WsManager::new()),
        event_bus: Arc::clone(&event_bus),
    };

    TestApp {
        router: build_app_router(state, &config),
        store,
        generations,
        event_bus,
    }
}

/// Test app with the runner secret configured and a failing generator.
pub fn build_test_app() -> TestApp {
    build_test_app_with(FakeGenerator::failing(), Some(RUNNER_SECRET))
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

/// Read a response body as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body should be readable")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("body should be JSON")
}

pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<serde_json::Value>,
    bearer: Option<&str>,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.clone().oneshot(request).await.unwrap()
}

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, None, None).await
}

pub async fn post_json(app: &Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    send(app, Method::POST, uri, Some(body), None).await
}

/// POST as an authenticated runner.
pub async fn runner_post(app: &Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    send(app, Method::POST, uri, Some(body), Some(RUNNER_SECRET)).await
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn swift_sources() -> serde_json::Value {
    serde_json::json!({
        "App/ContentView.swift": "import SwiftUI\n\nstruct ContentView: View {\n    var body: some View { Text(\"Hi\") }\n}\n",
        "App/Model.swift": "struct Item { let name: String }\n",
    })
}

pub fn build_body() -> serde_json::Value {
    serde_json::json!({
        "project_id": "proj-1",
        "project_name": "Recipes",
        "bundle_id": "com.example.recipes",
        "files": swift_sources(),
        "team_id": "TEAM1",
        "auto_fix": true,
    })
}

/// Create a build over HTTP and return its id.
pub async fn create_build(app: &Router, body: serde_json::Value) -> String {
    let response = post_json(app, "/api/v1/builds", body).await;
    assert_eq!(response.status(), 201);
    let json = body_json(response).await;
    json["data"]["id"].as_str().unwrap().to_string()
}

/// Create, claim, and fail a build with the given compiler errors.
pub async fn failed_build(app: &Router, body: serde_json::Value, errors: &[&str]) -> String {
    let id = create_build(app, body).await;
    let response = runner_post(
        app,
        "/api/v1/runner/claim",
        serde_json::json!({ "runner_id": "runner-1" }),
    )
    .await;
    assert_eq!(body_json(response).await["data"]["id"], id);

    let response = runner_post(
        app,
        &format!("/api/v1/runner/builds/{id}/report"),
        serde_json::json!({
            "runner_id": "runner-1",
            "status": "failed",
            "exit_code": 65,
            "error": "Compilation failed",
            "compiler_errors": errors,
        }),
    )
    .await;
    assert_eq!(response.status(), 200);
    id
}
