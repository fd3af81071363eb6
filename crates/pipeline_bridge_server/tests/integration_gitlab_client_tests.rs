//! Drives the HTTP API against a fake GitLab served on a loopback port.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use pipeline_bridge_core::contract::Environment;
use pipeline_bridge_core::gitlab::{GitLabSettings, RefPolicy};
use pipeline_bridge_server::build_service;
use pipeline_bridge_server::http::{router, AppState};
use serde_json::{json, Value};
use tower::ServiceExt;

#[derive(Clone, Default)]
struct FakeGitLab {
    triggers: Arc<Mutex<Vec<(Option<String>, Value)>>>,
    lookups: Arc<Mutex<Vec<String>>>,
    reject_triggers: bool,
}

async fn trigger(
    State(fake): State<FakeGitLab>,
    Path(project): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let token = headers
        .get("PRIVATE-TOKEN")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    fake.triggers
        .lock()
        .expect("poisoned mutex")
        .push((token, body));

    if fake.reject_triggers {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"message": "Reference not found"})),
        );
    }
    (
        StatusCode::CREATED,
        Json(json!({
            "id": 4242,
            "status": "created",
            "web_url": format!("https://gitlab.example.com/{project}/-/pipelines/4242")
        })),
    )
}

async fn pipeline(
    State(fake): State<FakeGitLab>,
    Path((_project, pipeline_id)): Path<(String, String)>,
) -> Json<Value> {
    fake.lookups
        .lock()
        .expect("poisoned mutex")
        .push(pipeline_id.clone());
    Json(json!({"id": pipeline_id.parse::<u64>().unwrap_or_default(), "status": "success"}))
}

async fn start_fake_gitlab(fake: FakeGitLab) -> String {
    let app = Router::new()
        .route("/api/v4/projects/{project}/pipeline", post(trigger))
        .route(
            "/api/v4/projects/{project}/pipelines/{pipeline_id}",
            get(pipeline),
        )
        .with_state(fake);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind loopback");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move { axum::serve(listener, app).await });
    format!("http://{addr}")
}

fn live_settings(base_url: String) -> GitLabSettings {
    GitLabSettings {
        base_url,
        project_id: "77".to_string(),
        token: Some("glpat-integration".to_string()),
        refs: RefPolicy {
            default_ref: "main".to_string(),
            environment_refs: BTreeMap::from([(Environment::Prod, "release".to_string())]),
        },
        request_timeout: Duration::from_secs(5),
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("body bytes");
    (status, serde_json::from_slice(&bytes).expect("json body"))
}

fn execute_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/execute")
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

#[tokio::test]
async fn triggers_live_pipeline_and_refreshes_status() {
    let fake = FakeGitLab::default();
    let settings = live_settings(start_fake_gitlab(fake.clone()).await);
    let app = router(AppState::new(
        build_service(&settings).expect("live service"),
        &settings,
    ));

    let (status, record) = send(
        &app,
        execute_request(json!({
            "pipeline_type": "app",
            "environment": "prod",
            "tenant_id": "acme",
            "app_name": "billing",
            "app_version": "2.1.0"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["gitlab_pipeline_id"], json!("4242"));
    assert_eq!(record["status"], json!("pending"));
    assert_eq!(record["git_ref"], json!("release"));
    assert_eq!(record["completed_at"], Value::Null);

    let triggers = fake.triggers.lock().expect("poisoned mutex").clone();
    assert_eq!(triggers.len(), 1);
    let (token, body) = &triggers[0];
    assert_eq!(token.as_deref(), Some("glpat-integration"));
    assert_eq!(body["ref"], json!("release"));
    let variables: BTreeMap<String, String> = body["variables"]
        .as_array()
        .expect("variables")
        .iter()
        .map(|variable| {
            assert_eq!(variable["variable_type"], json!("env_var"));
            (
                variable["key"].as_str().expect("key").to_string(),
                variable["value"].as_str().expect("value").to_string(),
            )
        })
        .collect();
    assert_eq!(variables["APP_NAME"], "billing");
    assert_eq!(variables["APP_VERSION"], "2.1.0");
    assert_eq!(
        Some(variables["EXECUTION_ID"].as_str()),
        record["execution_id"].as_str()
    );

    let execution_id = record["execution_id"].as_str().expect("execution id");
    let (status, refreshed) = send(
        &app,
        Request::builder()
            .uri(format!("/status/{execution_id}"))
            .body(Body::empty())
            .expect("request"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(refreshed["status"], json!("completed"));
    assert!(refreshed["completed_at"].is_string());
    assert_eq!(
        fake.lookups.lock().expect("poisoned mutex").clone(),
        vec!["4242".to_string()]
    );
}

#[tokio::test]
async fn gitlab_rejections_surface_as_server_errors() {
    let fake = FakeGitLab {
        reject_triggers: true,
        ..FakeGitLab::default()
    };
    let settings = live_settings(start_fake_gitlab(fake.clone()).await);
    let app = router(AppState::new(
        build_service(&settings).expect("live service"),
        &settings,
    ));

    let (status, body) = send(
        &app,
        execute_request(json!({"pipeline_type": "bootstrap", "environment": "dev"})),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let detail = body["detail"].as_str().expect("detail");
    assert!(detail.starts_with("GitLab returned HTTP 400"), "{detail}");
    assert_eq!(fake.triggers.lock().expect("poisoned mutex").len(), 1);
}

#[tokio::test]
async fn direct_pipeline_lookup_falls_back_to_built_web_url() {
    let fake = FakeGitLab::default();
    let base_url = start_fake_gitlab(fake.clone()).await;
    let settings = live_settings(base_url.clone());
    let app = router(AppState::new(
        build_service(&settings).expect("live service"),
        &settings,
    ));

    let (status, body) = send(
        &app,
        Request::builder()
            .uri("/status/exec-x?gitlab_pipeline_id=4242")
            .body(Body::empty())
            .expect("request"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["gitlab_pipeline_id"], json!("4242"));
    assert_eq!(body["status"], json!("completed"));
    assert_eq!(
        body["gitlab_url"],
        json!(format!("{base_url}/77/-/pipelines/4242"))
    );
    assert_eq!(
        fake.lookups.lock().expect("poisoned mutex").clone(),
        vec!["4242".to_string()]
    );
}
