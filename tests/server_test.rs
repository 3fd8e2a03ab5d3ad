use frontdesk::{AppConfig, Server};
use std::io::Write;
use tempfile::NamedTempFile;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

#[tokio::test]
async fn test_server_serves_health_and_shuts_down() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let server = Server::builder().config(AppConfig::default()).build().unwrap();
    let handle = tokio::spawn(server.serve(listener, async {
        let _ = shutdown_rx.await;
    }));

    let response = reqwest::get(format!("http://{}/health", address)).await.unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "up");

    shutdown_tx.send(()).unwrap();
    let result = handle.await.unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_server_from_config_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[server]
address = "127.0.0.1"
trust_proxy = 2

[cors]
allowed_origins = ["https://app.example.com"]

[http_client]
user_agent = "frontdesk-it/0.1"
"#
    )
    .unwrap();

    let config = AppConfig::from_file(file.path()).unwrap();
    let server = Server::builder().config(config).build().unwrap();

    assert_eq!(server.state().config.server.trust_proxy.hops(), 2);
    assert_eq!(server.state().config.http_client.user_agent, "frontdesk-it/0.1");
}

#[test]
fn test_invalid_cors_config_fails_build() {
    let mut config = AppConfig::default();
    config.cors.allowed_origins = vec!["*".to_string()];
    config.cors.allow_credentials = true;

    assert!(Server::builder().config(config).build().is_err());
}
