//! Router-level integration tests: register/login, the upload pipeline,
//! per-user history, and owner-gated artifact retrieval, all against an
//! in-memory SQLite database and a temp-dir image store.

use std::io::Cursor;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value;
use sqlx::sqlite::SqlitePoolOptions;
use tower::util::ServiceExt; // for `oneshot`

use chartsight::{
    app::build_app,
    classifier::{Classifier, FallbackPolicy},
    config::{AppConfig, JwtConfig},
    state::AppState,
    storage::ImageStore,
};

struct TestApp {
    router: Router,
    // Keeps the artifact directories alive for the test's duration.
    _tmp: tempfile::TempDir,
}

async fn setup_app(fallback: FallbackPolicy) -> TestApp {
    let tmp = tempfile::tempdir().expect("tempdir");
    let upload_dir = tmp.path().join("uploads");
    let annotated_dir = tmp.path().join("annotated");

    let db = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    sqlx::migrate!("./migrations").run(&db).await.expect("migrations");

    let config = Arc::new(AppConfig {
        database_url: "sqlite::memory:".into(),
        jwt: JwtConfig {
            secret: "test-secret".into(),
            issuer: "test".into(),
            audience: "test".into(),
            ttl_minutes: 5,
        },
        upload_dir: upload_dir.clone(),
        annotated_dir: annotated_dir.clone(),
        model_path: "missing.onnx".into(),
        fallback,
    });

    let store = Arc::new(ImageStore::open(&upload_dir, &annotated_dir).expect("store"));
    let classifier = Arc::new(Classifier::from_parts(None, fallback));

    let state = AppState::from_parts(db, config, classifier, store);
    TestApp {
        router: build_app(state),
        _tmp: tmp,
    }
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(t) = token {
        builder = builder.header("authorization", format!("Bearer {t}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn multipart_request(
    uri: &str,
    token: Option<&str>,
    content_type: &str,
    bytes: &[u8],
) -> Request<Body> {
    const BOUNDARY: &str = "test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"chart.png\"\r\n\
             Content-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    let mut builder = Request::builder().method("POST").uri(uri).header(
        "content-type",
        format!("multipart/form-data; boundary={BOUNDARY}"),
    );
    if let Some(t) = token {
        builder = builder.header("authorization", format!("Bearer {t}"));
    }
    builder.body(Body::from(body)).unwrap()
}

fn png_bytes() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(64, 48, image::Rgb([120, 30, 200]));
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

async fn body_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.expect("read body");
    serde_json::from_slice(&bytes).expect("parse json")
}

async fn body_text(body: Body) -> String {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.expect("read body");
    String::from_utf8(bytes.to_vec()).expect("utf8 body")
}

async fn register(app: &TestApp, email: &str, password: &str) -> StatusCode {
    let response = app
        .router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/register",
            serde_json::json!({"email": email, "password": password}),
        ))
        .await
        .unwrap();
    response.status()
}

async fn login(app: &TestApp, email: &str, password: &str) -> String {
    let response = app
        .router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/login",
            serde_json::json!({"email": email, "password": password}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response.into_body()).await;
    assert_eq!(body["token_type"], "bearer");
    body["access_token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_reports_classifier_mode() {
    let app = setup_app(FallbackPolicy::Random).await;
    let response = app.router.clone().oneshot(get_request("/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response.into_body()).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["classifier"], "fallback");
}

#[tokio::test]
async fn register_succeeds_once_then_conflicts() {
    let app = setup_app(FallbackPolicy::Random).await;
    assert_eq!(register(&app, "alice@example.com", "secret123").await, StatusCode::OK);
    assert_eq!(
        register(&app, "alice@example.com", "secret123").await,
        StatusCode::BAD_REQUEST
    );
}

#[tokio::test]
async fn register_rejects_missing_or_malformed_fields() {
    let app = setup_app(FallbackPolicy::Random).await;
    for body in [
        serde_json::json!({"email": "", "password": "secret123"}),
        serde_json::json!({"email": "alice@example.com", "password": ""}),
        serde_json::json!({"email": "not-an-email", "password": "secret123"}),
        // Keys absent entirely, not just empty.
        serde_json::json!({"email": "alice@example.com"}),
        serde_json::json!({"password": "secret123"}),
        serde_json::json!({}),
    ] {
        let response = app
            .router
            .clone()
            .oneshot(json_request("POST", "/api/register", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn login_failures_are_indistinguishable() {
    let app = setup_app(FallbackPolicy::Random).await;
    assert_eq!(register(&app, "alice@example.com", "secret123").await, StatusCode::OK);

    let wrong_password = app
        .router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/login",
            serde_json::json!({"email": "alice@example.com", "password": "wrong"}),
        ))
        .await
        .unwrap();
    let unknown_email = app
        .router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/login",
            serde_json::json!({"email": "bob@example.com", "password": "secret123"}),
        ))
        .await
        .unwrap();

    assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_email.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        body_text(wrong_password.into_body()).await,
        body_text(unknown_email.into_body()).await
    );
}

#[tokio::test]
async fn login_accepts_username_key_and_requires_password() {
    let app = setup_app(FallbackPolicy::Random).await;
    assert_eq!(register(&app, "alice@example.com", "secret123").await, StatusCode::OK);

    let via_username = app
        .router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/login",
            serde_json::json!({"username": "alice@example.com", "password": "secret123"}),
        ))
        .await
        .unwrap();
    assert_eq!(via_username.status(), StatusCode::OK);

    for body in [
        serde_json::json!({"password": "secret123"}),
        serde_json::json!({"email": "alice@example.com"}),
        serde_json::json!({"email": "  ", "password": "secret123"}),
    ] {
        let response = app
            .router
            .clone()
            .oneshot(json_request("POST", "/api/login", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn predict_requires_a_token() {
    let app = setup_app(FallbackPolicy::Random).await;
    let response = app
        .router
        .clone()
        .oneshot(multipart_request("/api/predict", None, "image/png", &png_bytes()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn expired_token_is_rejected_as_expired() {
    let app = setup_app(FallbackPolicy::Random).await;
    assert_eq!(register(&app, "alice@example.com", "secret123").await, StatusCode::OK);

    let now = time::OffsetDateTime::now_utc().unix_timestamp();
    let claims = chartsight::auth::jwt::Claims {
        sub: "alice@example.com".into(),
        iat: (now - 7200) as usize,
        exp: (now - 3600) as usize,
        iss: "test".into(),
        aud: "test".into(),
    };
    let stale = jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(b"test-secret"),
    )
    .unwrap();

    let response = app
        .router
        .clone()
        .oneshot(get_request("/api/history", Some(&stale)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_text(response.into_body()).await, "Token expired");
}

#[tokio::test]
async fn predict_classifies_persists_and_serves_artifacts() {
    let app = setup_app(FallbackPolicy::Random).await;
    assert_eq!(register(&app, "alice@example.com", "secret123").await, StatusCode::OK);
    let token = login(&app, "alice@example.com", "secret123").await;

    let response = app
        .router
        .clone()
        .oneshot(multipart_request(
            "/api/predict",
            Some(&token),
            "image/png",
            &png_bytes(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response.into_body()).await;

    let label = body["prediction"].as_str().unwrap();
    assert!(["BUY", "SELL", "NEUTRAL"].contains(&label));
    let confidence = body["confidence"].as_f64().unwrap();
    assert!((0.0..0.95).contains(&confidence));
    assert_eq!(body["source"], "fallback");
    let saved_path = body["saved_path"].as_str().unwrap().to_string();
    assert!(saved_path.starts_with("/api/uploads/"));
    let annotated_path = body["annotated_path"].as_str().unwrap().to_string();
    assert!(annotated_path.starts_with("/api/annotated/"));

    // The history entry mirrors the response.
    let history = app
        .router
        .clone()
        .oneshot(get_request("/api/history", Some(&token)))
        .await
        .unwrap();
    assert_eq!(history.status(), StatusCode::OK);
    let items = body_json(history.into_body()).await;
    let items = items.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["prediction"], label);
    assert_eq!(items[0]["confidence"].as_f64().unwrap(), confidence);
    assert_eq!(items[0]["original_path"], saved_path.as_str());
    assert_eq!(items[0]["annotated_path"], annotated_path.as_str());
    assert_eq!(items[0]["source"], "fallback");
    assert!(items[0]["created_at"].is_string());

    // Owner can fetch both artifacts.
    let original = app
        .router
        .clone()
        .oneshot(get_request(&saved_path, Some(&token)))
        .await
        .unwrap();
    assert_eq!(original.status(), StatusCode::OK);
    assert_eq!(
        original.headers().get("content-type").unwrap(),
        "image/png"
    );
    let served = axum::body::to_bytes(original.into_body(), usize::MAX).await.unwrap();
    assert_eq!(served.to_vec(), png_bytes());

    let annotated = app
        .router
        .clone()
        .oneshot(get_request(&annotated_path, Some(&token)))
        .await
        .unwrap();
    assert_eq!(annotated.status(), StatusCode::OK);

    // Without a token the artifact endpoints refuse.
    let anonymous = app
        .router
        .clone()
        .oneshot(get_request(&saved_path, None))
        .await
        .unwrap();
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    // A different user gets a 404, not the bytes.
    assert_eq!(register(&app, "bob@example.com", "hunter22").await, StatusCode::OK);
    let bob_token = login(&app, "bob@example.com", "hunter22").await;
    let cross = app
        .router
        .clone()
        .oneshot(get_request(&saved_path, Some(&bob_token)))
        .await
        .unwrap();
    assert_eq!(cross.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn predict_rejects_non_image_before_persisting() {
    let app = setup_app(FallbackPolicy::Random).await;
    assert_eq!(register(&app, "alice@example.com", "secret123").await, StatusCode::OK);
    let token = login(&app, "alice@example.com", "secret123").await;

    let response = app
        .router
        .clone()
        .oneshot(multipart_request(
            "/api/predict",
            Some(&token),
            "text/plain",
            b"not an image",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let history = app
        .router
        .clone()
        .oneshot(get_request("/api/history", Some(&token)))
        .await
        .unwrap();
    let items = body_json(history.into_body()).await;
    assert_eq!(items.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn history_is_isolated_per_user() {
    let app = setup_app(FallbackPolicy::Random).await;
    assert_eq!(register(&app, "alice@example.com", "secret123").await, StatusCode::OK);
    assert_eq!(register(&app, "bob@example.com", "hunter22").await, StatusCode::OK);
    let alice = login(&app, "alice@example.com", "secret123").await;
    let bob = login(&app, "bob@example.com", "hunter22").await;

    let response = app
        .router
        .clone()
        .oneshot(multipart_request(
            "/api/predict",
            Some(&alice),
            "image/png",
            &png_bytes(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bob_history = app
        .router
        .clone()
        .oneshot(get_request("/api/history", Some(&bob)))
        .await
        .unwrap();
    let items = body_json(bob_history.into_body()).await;
    assert_eq!(items.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn reject_policy_surfaces_classifier_unavailability() {
    let app = setup_app(FallbackPolicy::Reject).await;
    assert_eq!(register(&app, "alice@example.com", "secret123").await, StatusCode::OK);
    let token = login(&app, "alice@example.com", "secret123").await;

    let response = app
        .router
        .clone()
        .oneshot(multipart_request(
            "/api/predict",
            Some(&token),
            "image/png",
            &png_bytes(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let history = app
        .router
        .clone()
        .oneshot(get_request("/api/history", Some(&token)))
        .await
        .unwrap();
    let items = body_json(history.into_body()).await;
    assert_eq!(items.as_array().unwrap().len(), 0);
}
