// Shared helpers for the HTTP integration tests.

#![allow(dead_code)]

use std::path::PathBuf;

use axum::body::Body;
use axum::http::{header::CONTENT_TYPE, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use arena_backend::api::{self, AppState};
use arena_backend::config::{AssetConfig, LangflowConfig, OpenRagConfig};
use arena_backend::db::Persistence;
use arena_backend::openrag::FilterService;
use arena_backend::vision::VisionService;

/// State backed by a fresh in-memory store with every hosted service
/// unconfigured.
pub async fn test_state() -> AppState {
    AppState {
        store: Persistence::connect("sqlite::memory:").await,
        assets: AssetConfig {
            monsters_dir: PathBuf::from("/definitely/not/a/monster/dir"),
            cdn_prefix: "/cdn/monsters".to_string(),
        },
        vision: VisionService::from_config(None),
        filters: FilterService::from_config(None),
    }
}

pub fn build_test_app(state: AppState) -> Router {
    api::router(state)
}

pub fn filters_at(base_url: &str) -> FilterService {
    FilterService::from_config(Some(&OpenRagConfig {
        base_url: base_url.to_string(),
        api_key: Some("test-key".to_string()),
    }))
}

pub fn vision_at(base_url: &str) -> VisionService {
    VisionService::from_config(Some(&LangflowConfig {
        base_url: base_url.to_string(),
        api_key: None,
        flow_id: "flow-1".to_string(),
        chat_input_id: "ChatInput-abc".to_string(),
    }))
}

/// Send a request and decode the JSON response body.
pub async fn send_json(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<&str>,
) -> (StatusCode, Value) {
    let (status, raw) = send_raw(app, method, uri, body).await;
    let value = serde_json::from_str(&raw).unwrap_or(Value::Null);
    (status, value)
}

/// Send a request and return the body as text.
pub async fn send_raw(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<&str>,
) -> (StatusCode, String) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(b) => {
            builder = builder.header(CONTENT_TYPE, "application/json");
            Body::from(b.to_string())
        }
        None => Body::empty(),
    };
    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

/// Serve a stand-in upstream on an ephemeral port and return its base URL.
pub async fn spawn_upstream(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}
