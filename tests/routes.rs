mod support;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt; // for `oneshot`

use brandshot::routes::router;
use support::{session_token, FakeExtractor, Harness, COOKIE, USER};

fn app(h: &Harness) -> Router {
    router(h.app_state(support::scratch_dir(), 100))
}

fn authed(builder: axum::http::request::Builder, user: &str) -> axum::http::request::Builder {
    builder.header(header::AUTHORIZATION, format!("Bearer {}", session_token(user)))
}

fn generate() -> axum::http::request::Builder {
    Request::builder()
        .method("POST")
        .uri("/api/generate")
        .header(header::CONTENT_TYPE, "application/json")
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.expect("request failed");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn json_body(v: Value) -> Body {
    Body::from(serde_json::to_vec(&v).unwrap())
}

#[tokio::test]
async fn generate_requires_a_session() {
    let h = Harness::new(1, FakeExtractor::structured("a lighthouse"));
    let request = generate()
        .body(json_body(json!({ "url": "https://example.com" })))
        .unwrap();
    let (status, body) = send(app(&h), request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");
    assert_eq!(h.ledger.credit(USER), 1);
}

#[tokio::test]
async fn generate_returns_a_signed_image() {
    let h = Harness::new(2, FakeExtractor::structured("a lighthouse"));
    let request = authed(generate(), USER)
        .body(json_body(json!({ "url": "https://example.com" })))
        .unwrap();
    let (status, body) = send(app(&h), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["storage"], "supabase");
    assert_eq!(body["taskId"], "task-1");
    assert!(body["imageUrl"].as_str().unwrap().starts_with("https://storage.example/"));
    assert_eq!(h.ledger.credit(USER), 1);
}

#[tokio::test]
async fn missing_url_is_a_bad_request() {
    let h = Harness::new(2, FakeExtractor::structured("a lighthouse"));
    let request = authed(generate(), USER)
        .body(json_body(json!({})))
        .unwrap();
    let (status, body) = send(app(&h), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "URL is required");
    assert_eq!(h.ledger.credit(USER), 2);
}

#[tokio::test]
async fn no_credit_is_a_bad_request() {
    let h = Harness::new(0, FakeExtractor::structured("a lighthouse"));
    let request = authed(generate(), USER)
        .body(json_body(json!({ "url": "https://example.com" })))
        .unwrap();
    let (status, body) = send(app(&h), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No credits left");
}

#[tokio::test]
async fn generation_failure_carries_details() {
    let h = Harness::new(1, FakeExtractor::structured("a lighthouse"));
    *h.images.fail_with.lock().unwrap() = Some(json!({ "success": false, "msg": "quota" }));
    let request = authed(generate(), USER)
        .body(json_body(json!({ "url": "https://example.com" })))
        .unwrap();
    let (status, body) = send(app(&h), request).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["details"]["msg"], "quota");
    assert_eq!(h.ledger.credit(USER), 1);
}

#[tokio::test]
async fn generate_is_throttled() {
    let h = Harness::new(5, FakeExtractor::structured("a lighthouse"));
    let app = router(h.app_state(support::scratch_dir(), 1));
    let first = authed(generate(), USER)
        .body(json_body(json!({ "url": "https://example.com" })))
        .unwrap();
    let (status, _) = send(app.clone(), first).await;
    assert_eq!(status, StatusCode::OK);
    let second = authed(generate(), USER)
        .body(json_body(json!({ "url": "https://example.com" })))
        .unwrap();
    let (status, body) = send(app, second).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "Rate limited");
    assert_eq!(h.ledger.credit(USER), 4);
}

#[tokio::test]
async fn anonymous_listing_is_empty() {
    let h = Harness::new(1, FakeExtractor::structured("a lighthouse"));
    h.generations.insert("g1", USER, "gen-1.png", 10);
    let request = Request::builder().uri("/api/images").body(Body::empty()).unwrap();
    let (status, body) = send(app(&h), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "images": [] }));
}

#[tokio::test]
async fn listing_is_newest_first_and_skips_unsignable() {
    let h = Harness::new(1, FakeExtractor::structured("a lighthouse"));
    h.generations.insert("old", USER, "gen-1.png", 300);
    h.generations.insert("new", USER, "gen-2.png", 10);
    h.generations.insert("broken", USER, "gen-3.png", 100);
    h.generations.insert("theirs", "user-2", "gen-4.png", 5);
    h.assets.unsignable.lock().unwrap().push("gen-3.png".into());

    let request = authed(Request::builder().uri("/api/images"), USER)
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app(&h), request).await;
    assert_eq!(status, StatusCode::OK);
    let images = body["images"].as_array().unwrap();
    let names: Vec<&str> = images.iter().map(|i| i["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["gen-2.png", "gen-1.png"]);
    assert!(images[0]["time"].as_i64().unwrap() > images[1]["time"].as_i64().unwrap());
    assert!(images[0]["url"].as_str().unwrap().contains("gen-2.png"));
}

#[tokio::test]
async fn listing_fails_open() {
    let h = Harness::new(1, FakeExtractor::structured("a lighthouse"));
    h.generations
        .fail_list
        .store(true, std::sync::atomic::Ordering::SeqCst);
    let request = authed(Request::builder().uri("/api/images"), USER)
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app(&h), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "images": [] }));
}

#[tokio::test]
async fn delete_removes_row_and_asset() {
    let h = Harness::new(1, FakeExtractor::structured("a lighthouse"));
    h.generations.insert("g1", USER, "gen-1.png", 10);
    let request = authed(Request::builder().method("DELETE").uri("/api/images/g1"), USER)
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app(&h), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true }));
    assert_eq!(h.generations.count(), 0);
    assert_eq!(*h.assets.deleted.lock().unwrap(), vec!["gen-1.png".to_string()]);
}

#[tokio::test]
async fn delete_of_foreign_generation_is_not_found() {
    let h = Harness::new(1, FakeExtractor::structured("a lighthouse"));
    h.generations.insert("g1", "user-2", "gen-1.png", 10);
    let request = authed(Request::builder().method("DELETE").uri("/api/images/g1"), USER)
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(app(&h), request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(h.generations.count(), 1);
    assert!(h.assets.deleted.lock().unwrap().is_empty());
}

#[tokio::test]
async fn credits_reports_the_balance() {
    let h = Harness::new(7, FakeExtractor::structured("a lighthouse"));
    let request = Request::builder()
        .uri("/api/credits")
        .header(header::COOKIE, format!("{}={}", COOKIE, session_token(USER)))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app(&h), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "credit": 7 }));
}

#[tokio::test]
async fn protected_pages_redirect_to_signin() {
    let h = Harness::new(1, FakeExtractor::structured("a lighthouse"));
    let request = Request::builder().uri("/history").body(Body::empty()).unwrap();
    let response = app(&h).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        response.headers()[header::LOCATION],
        "/signin?callbackUrl=%2Fhistory"
    );
}

#[tokio::test]
async fn signed_in_visitors_skip_signin() {
    let h = Harness::new(1, FakeExtractor::structured("a lighthouse"));
    let request = authed(Request::builder().uri("/signin"), USER)
        .body(Body::empty())
        .unwrap();
    let response = app(&h).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(response.headers()[header::LOCATION], "/history");
}

#[tokio::test]
async fn generator_page_needs_a_session() {
    let h = Harness::new(1, FakeExtractor::structured("a lighthouse"));
    let request = Request::builder().uri("/").body(Body::empty()).unwrap();
    let response = app(&h).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(response.headers()[header::LOCATION], "/signin?callbackUrl=%2F");
}
