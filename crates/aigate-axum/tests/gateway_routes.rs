//! Integration tests for the gateway routes.
//!
//! Requests go through the full router (CORS, tracing, handlers, core
//! pipeline) with a scripted backend behind it.

mod common;

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use aigate_core::GatewaySettings;

use common::{
    ScriptedBackend, TOKEN, router_and_limiter, router_with, test_router, test_settings,
};

fn post(path: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn chat_body() -> Value {
    json!({ "messages": [{ "role": "user", "content": "Hi" }] })
}

async fn send(app: &Router, req: Request<Body>) -> Response {
    app.clone().oneshot(req).await.unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: Response) -> Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

fn assert_cors(response: &Response) {
    let headers = response.headers();
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert_eq!(
        headers[header::ACCESS_CONTROL_ALLOW_HEADERS],
        "Content-Type, Authorization"
    );
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], "GET, POST, OPTIONS");
}

#[tokio::test]
async fn chat_returns_assistant_message() {
    let (app, backend) = test_router();

    let response = send(&app, post("/ai/chat", &chat_body())).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_cors(&response);

    let body = body_json(response).await;
    assert_eq!(body["message"], json!({ "role": "assistant", "content": "Hello" }));
    let id = body["id"].as_str().unwrap();
    assert!(uuid::Uuid::parse_str(id).is_ok(), "id should be a uuid: {id}");
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn vision_and_speech_shapes() {
    let (app, _backend) = test_router();

    let vision = send(
        &app,
        post("/ai/vision", &json!({ "imageUrl": "https://cdn.example/bike.jpg" })),
    )
    .await;
    assert_eq!(vision.status(), StatusCode::OK);
    assert_eq!(body_json(vision).await["result"], "a red bicycle");

    let speech = send(&app, post("/ai/speech", &json!({ "audioBase64": "AAAA" }))).await;
    assert_eq!(speech.status(), StatusCode::OK);
    assert_eq!(body_json(speech).await["transcript"], "hello world");
}

#[tokio::test]
async fn streaming_chat_writes_ndjson() {
    let (app, _backend) = test_router();
    let body = json!({ "messages": [{ "role": "user", "content": "Hi" }], "stream": true });

    let response = send(&app, post("/ai/chat", &body)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_cors(&response);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/plain; charset=utf-8"
    );

    let text = body_text(response).await;
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines,
        vec![r#"{"delta":"Hel"}"#, r#"{"delta":"lo"}"#, r#"{"done":true}"#]
    );
    assert!(text.ends_with('\n'));
}

#[tokio::test]
async fn stream_flag_is_ignored_for_vision() {
    let (app, _backend) = test_router();
    let body = json!({ "imageBase64": "iVBORw0KGgo=", "stream": true });

    let response = send(&app, post("/ai/vision", &body)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
}

#[tokio::test]
async fn missing_token_is_unauthorized() {
    let (app, backend) = test_router();
    let req = Request::builder()
        .method("POST")
        .uri("/ai/chat")
        .body(Body::from(chat_body().to_string()))
        .unwrap();

    let response = send(&app, req).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
    assert_cors(&response);
    assert_eq!(
        body_json(response).await,
        json!({ "error": "Unauthorized", "code": "unauthorized" })
    );
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn unknown_token_is_unauthorized() {
    let (app, backend) = test_router();
    let req = Request::builder()
        .method("POST")
        .uri("/ai/chat")
        .header(header::AUTHORIZATION, "Bearer not-issued")
        .body(Body::from(chat_body().to_string()))
        .unwrap();

    let response = send(&app, req).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn rate_limit_returns_429_with_retry_after() {
    let (app, backend) = test_router();

    for _ in 0..2 {
        let ok = send(&app, post("/ai/chat", &chat_body())).await;
        assert_eq!(ok.status(), StatusCode::OK);
    }

    let limited = send(&app, post("/ai/chat", &chat_body())).await;
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_cors(&limited);
    let retry_after: u64 = limited.headers()[header::RETRY_AFTER]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after >= 1);
    assert_eq!(body_json(limited).await["code"], "rate_limited");
    assert_eq!(backend.calls(), 2);

    // Other endpoints have their own buckets.
    let vision = send(&app, post("/ai/vision", &json!({ "imageBase64": "AAAA" }))).await;
    assert_eq!(vision.status(), StatusCode::OK);
}

#[tokio::test]
async fn forwarded_origins_get_separate_buckets() {
    let (app, _backend) = test_router();
    let from = |ip: &str| {
        let mut req = post("/ai/chat", &chat_body());
        req.headers_mut()
            .insert("x-forwarded-for", format!("{ip}, 10.0.0.1").parse().unwrap());
        req
    };

    for _ in 0..2 {
        assert_eq!(send(&app, from("203.0.113.5")).await.status(), StatusCode::OK);
    }
    assert_eq!(
        send(&app, from("203.0.113.5")).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );
    assert_eq!(send(&app, from("198.51.100.9")).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn invalid_body_lists_field_errors() {
    let (app, backend) = test_router();
    let body = json!({ "messages": [{ "role": "robot", "content": "" }] });

    let response = send(&app, post("/ai/chat", &body)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["error"], "Invalid request");
    assert_eq!(body["code"], "bad_request");
    assert!(body["details"]["messages[0].role"].is_string());
    assert!(body["details"]["messages[0].content"].is_string());
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn malformed_json_is_bad_request() {
    let (app, _backend) = test_router();
    let req = Request::builder()
        .method("POST")
        .uri("/ai/speech")
        .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
        .body(Body::from("{not json"))
        .unwrap();

    let response = send(&app, req).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(response).await["details"]["body"].is_string());
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let (app, backend) = test_router();
    let big = "x".repeat(4096);
    let body = json!({ "messages": [{ "role": "user", "content": big }] });

    let response = send(&app, post("/ai/chat", &body)).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body_json(response).await["code"], "payload_too_large");
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn non_post_is_method_not_allowed() {
    let (app, backend) = test_router();
    let req = Request::builder()
        .method("GET")
        .uri("/ai/chat")
        .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
        .body(Body::empty())
        .unwrap();

    let response = send(&app, req).await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_cors(&response);
    assert_eq!(body_json(response).await["code"], "method_not_allowed");
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn preflight_short_circuits() {
    let (app, backend) = test_router();
    let req = Request::builder()
        .method("OPTIONS")
        .uri("/ai/vision")
        .header(header::ORIGIN, "https://app.example")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();

    let response = send(&app, req).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_cors(&response);
    assert!(body_text(response).await.is_empty());
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn backend_failure_is_generic_500() {
    let backend = Arc::new(ScriptedBackend::failing());
    let app = router_with(test_settings(), Arc::clone(&backend));

    let response = send(&app, post("/ai/chat", &chat_body())).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_cors(&response);

    let text = body_text(response).await;
    assert_eq!(text, r#"{"error":"Internal server error"}"#);
    assert!(!text.contains("10.0.0.7"));
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn stream_failing_before_first_delta_is_500() {
    let backend = Arc::new(ScriptedBackend::failing_stream());
    let app = router_with(test_settings(), Arc::clone(&backend));
    let body = json!({ "messages": [{ "role": "user", "content": "Hi" }], "stream": true });

    let response = send(&app, post("/ai/chat", &body)).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_cors(&response);
    assert_eq!(
        body_text(response).await,
        r#"{"error":"Internal server error"}"#
    );
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn health_needs_no_auth() {
    let (app, _backend) = test_router();
    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();

    let response = send(&app, req).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_cors(&response);
    assert_eq!(body_json(response).await, json!({ "status": "ok" }));
}

#[tokio::test]
async fn unknown_path_is_json_404() {
    let (app, _backend) = test_router();

    let response = send(&app, post("/ai/translate", &json!({}))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_cors(&response);
    assert_eq!(body_json(response).await["code"], "not_found");
}

#[tokio::test]
async fn route_prefix_is_configurable() {
    let mut settings = test_settings();
    settings.route_prefix = "/v2".to_string();
    let app = router_with(settings, Arc::new(ScriptedBackend::default()));

    assert_eq!(
        send(&app, post("/v2/chat", &chat_body())).await.status(),
        StatusCode::OK
    );
    assert_eq!(
        send(&app, post("/ai/chat", &chat_body())).await.status(),
        StatusCode::NOT_FOUND
    );

    let mut settings = test_settings();
    settings.route_prefix = String::new();
    let app = router_with(settings, Arc::new(ScriptedBackend::default()));
    assert_eq!(
        send(&app, post("/chat", &chat_body())).await.status(),
        StatusCode::OK
    );
}

#[tokio::test]
async fn default_chat_policy_allows_ten_then_limits() {
    let app = router_with(
        GatewaySettings::with_defaults(),
        Arc::new(ScriptedBackend::default()),
    );

    for i in 0..10 {
        let response = send(&app, post("/ai/chat", &chat_body())).await;
        assert_eq!(response.status(), StatusCode::OK, "request {i}");
    }
    let eleventh = send(&app, post("/ai/chat", &chat_body())).await;
    assert_eq!(eleventh.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn vision_without_image_names_the_rule() {
    let (app, _backend) = test_router();

    let response = send(&app, post("/ai/vision", &json!({ "prompt": "what is this?" }))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let details = &body_json(response).await["details"];
    let rule = details["imageUrl"].as_str().unwrap();
    assert!(rule.contains("imageBase64"), "unexpected rule: {rule}");
    assert_eq!(details["imageBase64"], details["imageUrl"]);
}

#[tokio::test]
async fn unauthenticated_request_leaves_limiter_untouched() {
    let backend = Arc::new(ScriptedBackend::default());
    let (app, limiter) = router_and_limiter(test_settings(), Arc::clone(&backend));
    let req = Request::builder()
        .method("POST")
        .uri("/ai/chat")
        .body(Body::from(chat_body().to_string()))
        .unwrap();

    assert_eq!(send(&app, req).await.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(limiter.bucket_count(), 0);
    assert!(limiter.tokens("chat:alice:unknown").is_none());

    assert_eq!(
        send(&app, post("/ai/chat", &chat_body())).await.status(),
        StatusCode::OK
    );
    assert_eq!(limiter.bucket_count(), 1);
    assert_eq!(backend.calls(), 1);
}
