//! Exercises the real network path against a local axum server

use axum::{http::StatusCode, routing::get, Router};
use std::time::Duration;
use volley_http::{HttpClient, HttpConfig, HttpError, HttpManager};

async fn spawn_server() -> String {
    let app = Router::new()
        .route("/ok", get(|| async { "pong" }))
        .route(
            "/fail",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        )
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}

#[tokio::test]
async fn test_get_success() {
    let base = spawn_server().await;
    let manager = HttpManager::new().unwrap();

    let response = manager.get(&format!("{}/ok", base)).await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.body_bytes, 4);
    assert!(response.is_expected());
}

#[tokio::test]
async fn test_get_server_error_is_a_response() {
    let base = spawn_server().await;
    let manager = HttpManager::new().unwrap();

    let response = manager.get(&format!("{}/fail", base)).await.unwrap();
    assert_eq!(response.status, 500);
    assert!(!response.is_expected());
}

#[tokio::test]
async fn test_get_timeout() {
    let base = spawn_server().await;
    let config = HttpConfig {
        timeout: Duration::from_millis(200),
        ..HttpConfig::default()
    };
    let manager = HttpManager::with_config(config).unwrap();

    let err = manager.get(&format!("{}/slow", base)).await.unwrap_err();
    assert!(err.is_timeout());
}

#[tokio::test]
async fn test_connection_refused() {
    // Bind then drop to get a port nobody listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let manager = HttpManager::new().unwrap();
    let err = manager.get(&format!("http://{}/", addr)).await.unwrap_err();
    assert!(matches!(err, HttpError::NetworkError(_)));
}
