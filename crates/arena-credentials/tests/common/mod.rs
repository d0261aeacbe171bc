//! In-process stand-in for the platform object storage API.

use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

/// How the mock answers key requests.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Mint `AKIA0000000N` style keys.
    Keys,
    /// Answer with the given status and a plain body.
    Status(u16),
    /// Answer 200 without a secret key.
    MissingSecret,
}

/// A request as seen by the mock.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub path: String,
    pub authorization: Option<String>,
    pub body: Value,
}

#[derive(Clone)]
struct MockState {
    reply: Reply,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

/// Running mock platform bound to an ephemeral port.
pub struct MockPlatform {
    pub base_url: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl MockPlatform {
    /// Start a mock that replies as `reply` to every key request.
    pub async fn start(reply: Reply) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = MockState {
            reply,
            requests: requests.clone(),
        };

        let app = Router::new()
            .route("/v1/cwobject/access-key", post(mint))
            .route("/v1/cwobject/temporary-credentials/oidc", post(mint))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}/v1/cwobject"),
            requests,
        }
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

async fn mint(
    State(state): State<MockState>,
    uri: Uri,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let n = {
        let mut requests = state.requests.lock().unwrap();
        requests.push(Recorded {
            path: uri.path().to_owned(),
            authorization: headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(ToOwned::to_owned),
            body,
        });
        requests.len()
    };

    match state.reply {
        Reply::Keys => Json(json!({
            "accessKeyId": format!("AKIA{n:08}"),
            "secretKey": format!("secret-{n}"),
        }))
        .into_response(),
        Reply::Status(code) => (
            StatusCode::from_u16(code).unwrap(),
            "upstream said no",
        )
            .into_response(),
        Reply::MissingSecret => Json(json!({ "accessKeyId": "AKIA00000001" })).into_response(),
    }
}
