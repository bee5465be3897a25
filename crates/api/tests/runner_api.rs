//! Integration tests for the runner protocol: authentication, claiming, and
//! report ingestion.

mod common;

use std::collections::HashSet;

use axum::http::{Method, StatusCode};
use common::{
    body_json, build_body, build_test_app, build_test_app_with, create_build, get, runner_post,
    send, FakeGenerator, RUNNER_SECRET,
};

fn claim_body(runner_id: &str) -> serde_json::Value {
    serde_json::json!({ "runner_id": runner_id })
}

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

#[tokio::test]
async fn runner_api_is_unavailable_without_configured_secret() {
    let app = build_test_app_with(FakeGenerator::failing(), None);
    let response = send(
        &app.router,
        Method::POST,
        "/api/v1/runner/claim",
        Some(claim_body("runner-1")),
        Some("anything"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json = body_json(response).await;
    assert_eq!(json["code"], "SERVICE_UNAVAILABLE");
}

#[tokio::test]
async fn missing_or_wrong_secret_is_unauthorized() {
    let app = build_test_app();

    let response = send(
        &app.router,
        Method::POST,
        "/api/v1/runner/claim",
        Some(claim_body("runner-1")),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = send(
        &app.router,
        Method::POST,
        "/api/v1/runner/claim",
        Some(claim_body("runner-1")),
        Some("not-the-secret"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn unauthorized_report_changes_nothing() {
    let app = build_test_app();
    let id = create_build(&app.router, build_body()).await;

    let response = send(
        &app.router,
        Method::POST,
        &format!("/api/v1/runner/builds/{id}/report"),
        Some(serde_json::json!({ "logs": ["sneaky"] })),
        Some("wrong"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let json = body_json(get(&app.router, &format!("/api/v1/builds/{id}")).await).await;
    assert_eq!(json["data"]["logs"].as_array().unwrap().len(), 0);
}

// ---------------------------------------------------------------------------
// Claim
// ---------------------------------------------------------------------------

#[tokio::test]
async fn claim_with_empty_queue_returns_null() {
    let app = build_test_app();
    let response = runner_post(&app.router, "/api/v1/runner/claim", claim_body("runner-1")).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json["data"].is_null());
}

#[tokio::test]
async fn claim_hands_out_oldest_job_and_binds_runner() {
    let app = build_test_app();
    let first = create_build(&app.router, build_body()).await;
    let second = create_build(&app.router, build_body()).await;

    let json = body_json(
        runner_post(&app.router, "/api/v1/runner/claim", claim_body("mac-mini-1")).await,
    )
    .await;
    assert_eq!(json["data"]["id"], first);
    assert_eq!(json["data"]["status"], "running");
    assert_eq!(json["data"]["runner_id"], "mac-mini-1");
    assert!(json["data"]["started_at"].is_string());

    let json = body_json(
        runner_post(&app.router, "/api/v1/runner/claim", claim_body("mac-mini-2")).await,
    )
    .await;
    assert_eq!(json["data"]["id"], second);

    let json = body_json(
        runner_post(&app.router, "/api/v1/runner/claim", claim_body("mac-mini-3")).await,
    )
    .await;
    assert!(json["data"].is_null());
}

#[tokio::test]
async fn blank_runner_id_is_rejected() {
    let app = build_test_app();
    create_build(&app.router, build_body()).await;

    let response = runner_post(&app.router, "/api/v1/runner/claim", claim_body("  ")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.store.queue_len().await, 1);
}

#[tokio::test]
async fn concurrent_claims_never_share_a_job() {
    let app = build_test_app();
    for _ in 0..5 {
        create_build(&app.router, build_body()).await;
    }

    let mut handles = Vec::new();
    for i in 0..20 {
        let router = app.router.clone();
        handles.push(tokio::spawn(async move {
            let response = runner_post(
                &router,
                "/api/v1/runner/claim",
                claim_body(&format!("runner-{i}")),
            )
            .await;
            body_json(response).await["data"]["id"]
                .as_str()
                .map(str::to_string)
        }));
    }

    let mut claimed = Vec::new();
    for handle in handles {
        if let Some(id) = handle.await.unwrap() {
            claimed.push(id);
        }
    }
    let unique: HashSet<_> = claimed.iter().collect();
    assert_eq!(claimed.len(), 5);
    assert_eq!(unique.len(), 5);
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[tokio::test]
async fn logs_can_stream_before_claim_but_status_cannot() {
    let app = build_test_app();
    let id = create_build(&app.router, build_body()).await;

    let response = runner_post(
        &app.router,
        &format!("/api/v1/runner/builds/{id}/report"),
        serde_json::json!({ "logs": ["Preparing", "", 42], "status": "succeeded" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["logs_appended"], 1);
    assert_eq!(json["data"]["status"], "queued");
    assert!(json["data"]["status_ignored"].is_string());
}

#[tokio::test]
async fn success_report_finishes_the_job() {
    let app = build_test_app();
    let id = create_build(&app.router, build_body()).await;
    runner_post(&app.router, "/api/v1/runner/claim", claim_body("runner-1")).await;

    let report_uri = format!("/api/v1/runner/builds/{id}/report");
    let json = body_json(
        runner_post(
            &app.router,
            &report_uri,
            serde_json::json!({ "runner_id": "runner-1", "status": "running", "logs": ["Compiling"] }),
        )
        .await,
    )
    .await;
    // Re-reporting the current status is a quiet no-op.
    assert!(json["data"]["status_ignored"].is_null());

    let json = body_json(
        runner_post(
            &app.router,
            &report_uri,
            serde_json::json!({ "runner_id": "runner-1", "status": "succeeded", "exit_code": 0, "logs": ["Done"] }),
        )
        .await,
    )
    .await;
    assert_eq!(json["data"]["status"], "succeeded");

    let job = body_json(get(&app.router, &format!("/api/v1/builds/{id}")).await).await;
    let job = &job["data"];
    assert_eq!(job["status"], "succeeded");
    assert_eq!(job["exit_code"], 0);
    assert!(job["finished_at"].is_string());
    assert_eq!(job["logs"], serde_json::json!(["Compiling", "Done"]));
}

#[tokio::test]
async fn terminal_status_cannot_be_changed() {
    let app = build_test_app();
    let id = common::failed_build(&app.router, build_body(), &["error: a"]).await;

    let json = body_json(
        runner_post(
            &app.router,
            &format!("/api/v1/runner/builds/{id}/report"),
            serde_json::json!({ "status": "succeeded", "logs": ["late line"] }),
        )
        .await,
    )
    .await;
    assert_eq!(json["data"]["status"], "failed");
    assert!(json["data"]["status_ignored"]
        .as_str()
        .unwrap()
        .contains("failed -> succeeded"));
    assert_eq!(json["data"]["logs_appended"], 1);
}

#[tokio::test]
async fn unknown_status_and_foreign_runner_are_ignored() {
    let app = build_test_app();
    let id = create_build(&app.router, build_body()).await;
    runner_post(&app.router, "/api/v1/runner/claim", claim_body("runner-1")).await;
    let report_uri = format!("/api/v1/runner/builds/{id}/report");

    let json = body_json(
        runner_post(&app.router, &report_uri, serde_json::json!({ "status": "cancelled" })).await,
    )
    .await;
    assert_eq!(json["data"]["status"], "running");
    assert!(json["data"]["status_ignored"].is_string());

    let json = body_json(
        runner_post(
            &app.router,
            &report_uri,
            serde_json::json!({ "runner_id": "runner-2", "status": "failed" }),
        )
        .await,
    )
    .await;
    assert_eq!(json["data"]["status"], "running");
}

#[tokio::test]
async fn compiler_errors_are_stored_verbatim() {
    let app = build_test_app();
    let errors = ["b.swift:2: error: second", "a.swift:1: error: first"];
    let id = common::failed_build(&app.router, build_body(), &errors).await;

    let job = body_json(get(&app.router, &format!("/api/v1/builds/{id}")).await).await;
    assert_eq!(job["data"]["compiler_errors"], serde_json::json!(errors));
    assert_eq!(job["data"]["error"], "Compilation failed");
    assert_eq!(job["data"]["exit_code"], 65);
}

#[tokio::test]
async fn report_for_unknown_job_is_404() {
    let app = build_test_app();
    let missing = uuid::Uuid::new_v4();
    let response = send(
        &app.router,
        Method::POST,
        &format!("/api/v1/runner/builds/{missing}/report"),
        Some(serde_json::json!({ "logs": ["x"] })),
        Some(RUNNER_SECRET),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
