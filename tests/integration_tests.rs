use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use frontdesk::config::{CookieSecurity, TrustProxy};
use frontdesk::{
    router, router_with, AppConfig, AppError, AppState, ClientInfo, MemorySessionStore,
    MemoryUploads, Session,
};
use http_body_util::BodyExt;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceExt;

const BOUNDARY: &str = "integration-boundary";

fn state(config: AppConfig) -> AppState {
    AppState::new(config, Arc::new(MemorySessionStore::new())).unwrap()
}

async fn whoami(client: ClientInfo) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "ip": client.ip.map(|ip| ip.to_string()),
        "secure": client.is_secure(),
        "host": client.host,
    }))
}

async fn login(session: Session) -> Result<StatusCode, AppError> {
    session.insert("user", "alice")?;
    session.regenerate();
    Ok(StatusCode::NO_CONTENT)
}

async fn me(session: Session) -> Result<Json<serde_json::Value>, AppError> {
    let user: Option<String> = session.get("user")?;
    Ok(Json(serde_json::json!({ "user": user })))
}

async fn logout(session: Session) -> StatusCode {
    session.destroy();
    StatusCode::NO_CONTENT
}

async fn import(uploads: MemoryUploads) -> Result<Json<serde_json::Value>, AppError> {
    let file = uploads.file("file").ok_or_else(|| AppError::UploadError {
        message: "missing 'file' part".to_string(),
    })?;
    let table = file.csv_table()?;
    Ok(Json(serde_json::json!({
        "source": uploads.field("source"),
        "headers": table.headers,
        "rows": table.rows,
    })))
}

fn app(config: AppConfig) -> Router {
    let routes = Router::new()
        .route("/whoami", get(whoami))
        .route("/login", post(login))
        .route("/me", get(me))
        .route("/logout", post(logout))
        .route("/import", post(import));
    router_with(state(config), routes)
}

fn request(method: &str, uri: &str) -> axum::http::request::Builder {
    let peer: SocketAddr = "10.0.0.2:41000".parse().unwrap();
    Request::builder()
        .method(method)
        .uri(uri)
        .extension(ConnectInfo(peer))
}

async fn json_body(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn session_cookie(response: &Response) -> Option<String> {
    response
        .headers()
        .get(header::SET_COOKIE)
        .map(|v| v.to_str().unwrap().split(';').next().unwrap().to_string())
}

fn csv_upload(source: &str, file_name: &str, content: &str) -> Body {
    Body::from(format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"source\"\r\n\r\n{source}\r\n\
         --{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
         Content-Type: text/csv\r\n\r\n{content}\r\n--{b}--\r\n",
        b = BOUNDARY,
    ))
}

#[tokio::test]
async fn test_health_endpoint() {
    let response = router(state(AppConfig::default()))
        .oneshot(request("GET", "/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "no-store, no-cache, must-revalidate"
    );
    let json = json_body(response).await;
    assert_eq!(json["status"], "up");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_first_proxy_hop_is_trusted_by_default() {
    let response = app(AppConfig::default())
        .oneshot(
            request("GET", "/whoami")
                .header("x-forwarded-for", "203.0.113.9")
                .header("x-forwarded-proto", "https")
                .header("x-forwarded-host", "app.example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let json = json_body(response).await;
    assert_eq!(json["ip"], "203.0.113.9");
    assert_eq!(json["secure"], true);
    assert_eq!(json["host"], "app.example.com");
}

#[tokio::test]
async fn test_forwarded_headers_ignored_without_trust() {
    let mut config = AppConfig::default();
    config.server.trust_proxy = TrustProxy::Flag(false);

    let response = app(config)
        .oneshot(
            request("GET", "/whoami")
                .header("x-forwarded-for", "203.0.113.9")
                .header("x-forwarded-proto", "https")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let json = json_body(response).await;
    assert_eq!(json["ip"], "10.0.0.2");
    assert_eq!(json["secure"], false);
}

#[tokio::test]
async fn test_session_login_read_logout() {
    let app = app(AppConfig::default());

    // anonymous requests get no cookie
    let response = app
        .clone()
        .oneshot(request("GET", "/me").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert!(session_cookie(&response).is_none());
    assert_eq!(json_body(response).await["user"], serde_json::Value::Null);

    let response = app
        .clone()
        .oneshot(request("POST", "/login").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let cookie = session_cookie(&response).expect("login sets a session cookie");
    assert!(cookie.starts_with("sid="));

    let response = app
        .clone()
        .oneshot(
            request("GET", "/me")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(json_body(response).await["user"], "alice");

    let response = app
        .clone()
        .oneshot(
            request("POST", "/logout")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let set_cookie = response.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(set_cookie.contains("Max-Age=0"));

    let response = app
        .oneshot(
            request("GET", "/me")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(json_body(response).await["user"], serde_json::Value::Null);
}

#[tokio::test]
async fn test_session_cookie_secure_behind_https_proxy() {
    let response = app(AppConfig::default())
        .oneshot(
            request("POST", "/login")
                .header("x-forwarded-proto", "https")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let set_cookie = response.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(set_cookie.contains("Secure"));
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("SameSite=Lax"));
}

#[tokio::test]
async fn test_secure_only_sessions_need_https() {
    let mut config = AppConfig::default();
    config.session.cookie.secure = CookieSecurity::Always;

    let response = app(config)
        .oneshot(request("POST", "/login").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(session_cookie(&response).is_none());
}

#[tokio::test]
async fn test_cors_preflight() {
    let mut config = AppConfig::default();
    config.cors.allowed_origins = vec!["https://app.example.com".to_string()];
    let app = app(config);

    let response = app
        .clone()
        .oneshot(
            request("OPTIONS", "/me")
                .header(header::ORIGIN, "https://app.example.com")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "https://app.example.com"
    );
    assert_eq!(
        response.headers().get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).unwrap(),
        "true"
    );

    let response = app
        .oneshot(
            request("GET", "/me")
                .header(header::ORIGIN, "https://evil.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
}

#[tokio::test]
async fn test_csv_upload_is_parsed_from_memory() {
    let response = app(AppConfig::default())
        .oneshot(
            request("POST", "/import")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={}", BOUNDARY),
                )
                .body(csv_upload("crm", "people.csv", "id,name\n1,Alice\n2,Bob"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["source"], "crm");
    assert_eq!(json["headers"], serde_json::json!(["id", "name"]));
    assert_eq!(json["rows"][1], serde_json::json!(["2", "Bob"]));
}

#[tokio::test]
async fn test_malformed_csv_upload_is_unprocessable() {
    let response = app(AppConfig::default())
        .oneshot(
            request("POST", "/import")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={}", BOUNDARY),
                )
                .body(csv_upload("crm", "people.csv", "id,name\n1"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json = json_body(response).await;
    assert_eq!(json["status"], 422);
    assert_eq!(json["title"], "Invalid CSV");
}

#[tokio::test]
async fn test_oversized_upload_is_rejected() {
    let mut config = AppConfig::default();
    config.upload.max_file_size = 16;
    config.upload.max_body_size = 4096;

    let content = "id,name\n".to_string() + &"1,Alice\n".repeat(50);
    let response = app(config)
        .oneshot(
            request("POST", "/import")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={}", BOUNDARY),
                )
                .body(csv_upload("crm", "big.csv", &content))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let json = json_body(response).await;
    assert!(json["detail"].as_str().unwrap().contains("big.csv"));
}

#[tokio::test]
async fn test_extractors_without_middleware_are_internal_errors() {
    let bare = Router::new()
        .route("/whoami", get(whoami))
        .route("/me", get(me));

    for uri in ["/whoami", "/me"] {
        let response = bare
            .clone()
            .oneshot(request("GET", uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = json_body(response).await;
        assert_eq!(json["status"], 500);
        assert_eq!(json["detail"], "An unexpected error occurred");
    }
}

#[tokio::test]
async fn test_body_over_limit_is_rejected() {
    let mut config = AppConfig::default();
    config.upload.max_file_size = 128;
    config.upload.max_body_size = 128;

    let content = "id,name\n".to_string() + &"1,Alice\n".repeat(50);
    let response = app(config)
        .oneshot(
            request("POST", "/import")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={}", BOUNDARY),
                )
                .body(csv_upload("crm", "big.csv", &content))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let json = json_body(response).await;
    assert_eq!(json["title"], "Payload Too Large");
}
