//! Common utilities for arena-control integration tests.

#![allow(dead_code)]

pub mod fixtures;
pub mod s3;

use std::sync::{Arc, Mutex};

use arena_control::config::ArenaConfig;
use arena_credentials::SecretValue;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, post};
use axum::{Json, Router};
use serde_json::{json, Value};

#[derive(Clone, Default)]
struct PlatformState {
    policies: Arc<Mutex<Vec<Value>>>,
    mints: Arc<Mutex<u32>>,
}

/// In-process platform API that also answers endpoint probes.
///
/// Any path outside the API answers 403, which is enough for a probe to count
/// the endpoint as reachable.
pub struct MockPlatform {
    /// Root URL, usable as an object storage endpoint.
    pub url: String,
    /// Base URL of the platform object storage API.
    pub api_base_url: String,
    state: PlatformState,
}

impl MockPlatform {
    pub async fn start() -> Self {
        let state = PlatformState::default();
        let app = Router::new()
            .route("/v1/cwobject/access-key", post(mint))
            .route("/v1/cwobject/access-policy", post(put_policy).get(list_policies))
            .route("/v1/cwobject/access-policy/{name}", delete(delete_policy))
            .fallback(|| async { StatusCode::FORBIDDEN })
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{addr}"),
            api_base_url: format!("http://{addr}/v1/cwobject"),
            state,
        }
    }

    /// Number of keys minted so far.
    pub fn mints(&self) -> u32 {
        *self.state.mints.lock().unwrap()
    }

    /// Policies posted so far.
    pub fn policies(&self) -> Vec<Value> {
        self.state.policies.lock().unwrap().clone()
    }
}

async fn mint(State(state): State<PlatformState>) -> Response {
    let n = {
        let mut mints = state.mints.lock().unwrap();
        *mints += 1;
        *mints
    };
    Json(json!({
        "accessKeyId": format!("AKIA{n:08}"),
        "secretKey": format!("secret-{n}"),
    }))
    .into_response()
}

async fn put_policy(State(state): State<PlatformState>, Json(body): Json<Value>) -> StatusCode {
    state.policies.lock().unwrap().push(body);
    StatusCode::OK
}

async fn delete_policy(State(state): State<PlatformState>, Path(name): Path<String>) -> StatusCode {
    let mut policies = state.policies.lock().unwrap();
    let before = policies.len();
    policies.retain(|p| p.pointer("/policy/name").and_then(Value::as_str) != Some(name.as_str()));
    if policies.len() == before {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::NO_CONTENT
    }
}

async fn list_policies(State(state): State<PlatformState>) -> Json<Value> {
    let policies: Vec<Value> = state
        .policies
        .lock()
        .unwrap()
        .iter()
        .filter_map(|p| p.get("policy").cloned())
        .collect();
    Json(json!({ "policies": policies }))
}

/// A URL nothing listens on.
pub async fn closed_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

/// Configuration pointing every endpoint at the given URLs.
///
/// The workload identity token path never exists, so only the access key
/// method can succeed, and only when `token` is set.
pub fn storage_config(
    platform: &MockPlatform,
    lota_url: &str,
    token: Option<&str>,
    token_dir: &std::path::Path,
) -> ArenaConfig {
    let mut config = ArenaConfig::default();
    config.storage.lota_url = lota_url.to_owned();
    config.storage.caios_url = platform.url.clone();
    config.storage.region = Some("US-EAST-04A".to_owned());
    config.storage.probe_timeout_secs = 2;
    config.credentials.api_base_url = platform.api_base_url.clone();
    config.credentials.token = token.map(SecretValue::new);
    config.credentials.token_path = token_dir.join("missing-token");
    config.credentials.timeout_secs = 5;
    config
}
