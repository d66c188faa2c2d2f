use std::{net::SocketAddr, path::Path, sync::Arc};

use axum::{
    body::{to_bytes, Body},
    extract::ConnectInfo,
    http::{Request, StatusCode},
    Router,
};
use beacon_ingest::{
    build_router, enrich::Enricher, geo::GeoTable, partition::Partition, sink::EventSink,
    IngestState,
};
use chrono::Utc;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

const ROUTE: &str = "/api/track";

fn router_with(root: &Path, enricher: Enricher) -> Router {
    let state = IngestState::new(Arc::new(EventSink::new(root)), enricher);
    build_router(state, ROUTE)
}

fn router(root: &Path) -> Router {
    router_with(root, Enricher::default())
}

fn post(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(ROUTE)
        .header("content-type", "application/json")
        .header("user-agent", "beacon-test/1.0")
        .body(body.into())
        .expect("request")
}

async fn send(router: Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = router.oneshot(request).await.expect("response");
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body")
        .to_vec();
    (status, headers, body)
}

fn todays_lines(root: &Path) -> Vec<Value> {
    let path = Partition::for_date(root, Utc::now()).file;
    let contents = std::fs::read_to_string(&path).unwrap_or_default();
    contents
        .lines()
        .map(|line| serde_json::from_str(line).expect("standalone JSON line"))
        .collect()
}

fn assert_cors(headers: &axum::http::HeaderMap) {
    assert_eq!(headers["access-control-allow-origin"], "*");
    assert_eq!(headers["access-control-allow-methods"], "POST, OPTIONS");
    assert_eq!(headers["access-control-allow-headers"], "Content-Type");
    assert_eq!(headers["content-type"], "application/json");
}

#[tokio::test]
async fn post_appends_enriched_line_and_echoes_session() {
    let dir = TempDir::new().unwrap();
    let payload = json!({"type": "event", "event": "click", "sessionId": "s1"});

    let before = Utc::now().timestamp();
    let (status, headers, body) = send(router(dir.path()), post(payload.to_string())).await;

    assert_eq!(status, StatusCode::OK);
    assert_cors(&headers);
    let ack: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(ack["status"], "success");
    assert_eq!(ack["session_id"], "s1");
    assert!(ack["timestamp"].as_i64().unwrap() >= before);

    let lines = todays_lines(dir.path());
    assert_eq!(lines.len(), 1);
    let line = &lines[0];
    assert_eq!(line["type"], "event");
    assert_eq!(line["event"], "click");
    assert_eq!(line["sessionId"], "s1");
    assert_eq!(line["server"]["request_method"], "POST");
    assert_eq!(line["server"]["user_agent"], "beacon-test/1.0");
    assert_eq!(line["server"]["content_type"], "application/json");
    assert_eq!(line["server"]["referer"], "unknown");
    assert_eq!(line["server"]["ip"], "unknown");
    assert!(line.get("geolocation").is_none());
}

#[tokio::test]
async fn missing_session_id_echoes_unknown() {
    let dir = TempDir::new().unwrap();
    let (status, _, body) = send(router(dir.path()), post(r#"{"type":"pageview"}"#)).await;

    assert_eq!(status, StatusCode::OK);
    let ack: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(ack["session_id"], "unknown");
}

#[tokio::test]
async fn invalid_json_is_rejected() {
    let dir = TempDir::new().unwrap();
    for body in ["", "not json", "{}", "null"] {
        let (status, headers, response) = send(router(dir.path()), post(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body {body:?}");
        assert_cors(&headers);
        let error: Value = serde_json::from_slice(&response).unwrap();
        assert_eq!(error, json!({"error": "Invalid JSON data"}));
    }
    assert!(todays_lines(dir.path()).is_empty());
}

#[tokio::test]
async fn oversized_body_is_invalid_json_with_tracking_headers() {
    let dir = TempDir::new().unwrap();
    let state = IngestState::new(Arc::new(EventSink::new(dir.path())), Enricher::default())
        .with_body_limit(1024);
    let router = build_router(state, ROUTE);

    let padding = "x".repeat(4096);
    let oversized = json!({"type": "event", "event": "click", "padding": padding});
    let (status, headers, body) = send(router.clone(), post(oversized.to_string())).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_cors(&headers);
    let error: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(error, json!({"error": "Invalid JSON data"}));
    assert!(todays_lines(dir.path()).is_empty());

    let small = json!({"type": "event", "event": "click"});
    let (status, _, _) = send(router, post(small.to_string())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(todays_lines(dir.path()).len(), 1);
}

#[tokio::test]
async fn get_is_method_not_allowed() {
    let dir = TempDir::new().unwrap();
    let request = Request::builder()
        .method("GET")
        .uri(ROUTE)
        .body(Body::empty())
        .unwrap();

    let (status, headers, body) = send(router(dir.path()), request).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_cors(&headers);
    let error: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(error, json!({"error": "Method not allowed"}));
}

#[tokio::test]
async fn options_preflight_is_empty_200_with_cors() {
    let dir = TempDir::new().unwrap();
    let request = Request::builder()
        .method("OPTIONS")
        .uri(ROUTE)
        .header("origin", "https://site.test")
        .header("access-control-request-method", "POST")
        .body(Body::empty())
        .unwrap();

    let (status, headers, body) = send(router(dir.path()), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_cors(&headers);
    assert!(body.is_empty());
}

#[tokio::test]
async fn peer_address_drives_ip_and_geolocation() {
    let dir = TempDir::new().unwrap();
    let table = GeoTable::from_json(
        r#"{"networks": [{"network": "203.0.113.0/24", "country": "France", "city": "Paris", "latitude": 48.85, "longitude": 2.35}]}"#,
    )
    .unwrap();
    let router = router_with(dir.path(), Enricher::new(Some(Arc::new(table)), false));

    let mut request = post(r#"{"type":"event","sessionId":"geo"}"#);
    let peer: SocketAddr = "203.0.113.40:40000".parse().unwrap();
    request.extensions_mut().insert(ConnectInfo(peer));

    let (status, _, _) = send(router, request).await;
    assert_eq!(status, StatusCode::OK);

    let lines = todays_lines(dir.path());
    assert_eq!(lines[0]["server"]["ip"], "203.0.113.40");
    assert_eq!(lines[0]["geolocation"]["country"], "France");
    assert_eq!(lines[0]["geolocation"]["region"], "unknown");
    assert_eq!(lines[0]["geolocation"]["latitude"], 48.85);
}

#[tokio::test]
async fn concurrent_posts_produce_whole_lines() {
    let dir = TempDir::new().unwrap();
    let router = router(dir.path());

    let tasks: Vec<_> = (0..32)
        .map(|n| {
            let router = router.clone();
            tokio::spawn(async move {
                let payload = json!({
                    "type": "event",
                    "event": "load",
                    "sessionId": format!("s{n}"),
                    "data": {"blob": "y".repeat(8192)},
                });
                send(router, post(payload.to_string())).await.0
            })
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await.unwrap(), StatusCode::OK);
    }

    let lines = todays_lines(dir.path());
    assert_eq!(lines.len(), 32);
    let mut sessions: Vec<String> = lines
        .iter()
        .map(|line| line["sessionId"].as_str().unwrap().to_string())
        .collect();
    sessions.sort();
    sessions.dedup();
    assert_eq!(sessions.len(), 32);
}

#[tokio::test]
async fn write_failure_still_acknowledges_and_is_counted() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"file, not directory").unwrap();

    let sink = Arc::new(EventSink::new(&blocker));
    let state = IngestState::new(Arc::clone(&sink), Enricher::default());
    let router = build_router(state, ROUTE);

    let (status, _, body) = send(router.clone(), post(r#"{"sessionId":"lost"}"#)).await;
    assert_eq!(status, StatusCode::OK);
    let ack: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(ack["session_id"], "lost");
    assert_eq!(sink.write_failures(), 1);

    let health = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(router, health).await;
    assert_eq!(status, StatusCode::OK);
    let health: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["write_failures"], 1);
}
