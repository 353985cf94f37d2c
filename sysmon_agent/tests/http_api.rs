//! REST facade and JSON-RPC transport driven through the router.

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use sysmon_agent::{http, AppState};
use tower::ServiceExt;

fn app() -> Router {
    http::router(AppState::new(Default::default()))
}

async fn request(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<&str>,
) -> (StatusCode, Vec<u8>) {
    let mut builder = Request::builder().method(method).uri(uri);
    if body.is_some() {
        builder = builder.header("content-type", "application/json");
    }
    let req = builder
        .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

async fn json(app: &Router, method: Method, uri: &str, body: Option<&str>) -> (StatusCode, Value) {
    let (status, bytes) = request(app, method, uri, body).await;
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn health_reports_identity_without_touching_monitoring() {
    let app = app();
    let (_, before) = json(&app, Method::GET, "/api/monitoring/status", None).await;
    for _ in 0..3 {
        let (status, body) = json(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "sysmon_agent");
        assert!(body["timestamp"].is_string());
    }
    let (_, after) = json(&app, Method::GET, "/api/monitoring/status", None).await;
    assert_eq!(before, after);
}

#[tokio::test]
async fn notification_gets_202_and_empty_body() {
    let (status, body) = request(
        &app(),
        Method::POST,
        "/",
        Some(r#"{"jsonrpc":"2.0","method":"initialized"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(body.is_empty());
}

#[tokio::test]
async fn rpc_errors_travel_in_a_200_envelope() {
    let (status, body) = json(
        &app(),
        Method::POST,
        "/mcp",
        Some(r#"{"jsonrpc":"2.0","id":"5","method":"unknown/method"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["jsonrpc"], "2.0");
    assert_eq!(body["id"], "5");
    assert_eq!(body["error"]["code"], -32601);
    assert!(body["result"].is_null());
}

#[tokio::test]
async fn rpc_endpoint_is_post_only() {
    let (status, _) = request(&app(), Method::GET, "/", None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn snapshot_routes_return_records() {
    let app = app();
    let (status, mem) = json(&app, Method::GET, "/api/system/memory", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(mem["used"].as_u64().unwrap() <= mem["total"].as_u64().unwrap());

    let (status, info) = json(&app, Method::GET, "/api/system/info", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(info["hostname"].is_string());

    let (status, cpu) = json(&app, Method::GET, "/api/system/cpu", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(cpu["cores"].as_u64().unwrap() >= 1);

    let (status, nets) = json(&app, Method::GET, "/api/system/networks", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(nets.is_array());
}

#[tokio::test]
async fn process_routes_validate_input() {
    let app = app();
    let (status, body) = json(&app, Method::GET, "/api/system/processes/abc", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], -32602);

    let (status, body) = json(&app, Method::GET, "/api/system/processes/999999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], -32001);

    let (status, body) = json(&app, Method::GET, "/api/system/processes?limit=2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().unwrap().len() <= 2);

    let (status, _) = json(&app, Method::GET, "/api/system/processes?limit=0", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let own = format!("/api/system/processes/{}", std::process::id());
    let (status, body) = json(&app, Method::GET, &own, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pid"], std::process::id());
}

#[tokio::test]
async fn monitoring_routes_map_conflicts_to_409() {
    let app = app();
    let (status, body) = json(&app, Method::POST, "/api/monitoring/stop", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], -32003);

    let (status, body) = json(&app, Method::POST, "/api/monitoring/start", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "running");

    let (status, body) = json(&app, Method::POST, "/api/monitoring/start", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], -32002);

    let (_, body) = json(&app, Method::GET, "/api/monitoring/status", None).await;
    assert_eq!(body["active"], true);

    let (status, body) = json(&app, Method::POST, "/api/monitoring/stop", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "stopped");
}
