//! Minimal path-style S3 bucket API.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

#[derive(Clone, Default)]
struct S3State {
    buckets: Arc<Mutex<BTreeMap<String, Option<String>>>>,
    forbidden: Arc<Mutex<HashSet<String>>>,
}

/// Answers bucket-level S3 calls for buckets held in memory.
///
/// Buckets marked forbidden answer 403 to everything.
pub struct MockS3 {
    /// Endpoint URL.
    pub url: String,
    state: S3State,
}

impl MockS3 {
    pub async fn start() -> Self {
        let state = S3State::default();
        let app = Router::new()
            .route("/", get(list_buckets))
            .route(
                "/{bucket}",
                get(get_bucket)
                    .head(head_bucket)
                    .put(put_bucket)
                    .delete(delete_bucket),
            )
            // The S3 SDK addresses path-style buckets with a trailing slash.
            .route(
                "/{bucket}/",
                get(get_bucket)
                    .head(head_bucket)
                    .put(put_bucket)
                    .delete(delete_bucket),
            )
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{addr}"),
            state,
        }
    }

    /// Add a bucket directly.
    pub fn with_bucket(self, bucket: &str) -> Self {
        self.state.buckets.lock().unwrap().insert(bucket.to_owned(), None);
        self
    }

    /// Add a bucket the caller may not access.
    pub fn with_forbidden_bucket(self, bucket: &str) -> Self {
        self.state.forbidden.lock().unwrap().insert(bucket.to_owned());
        self
    }

    /// Bucket names.
    pub fn buckets(&self) -> Vec<String> {
        self.state.buckets.lock().unwrap().keys().cloned().collect()
    }

    /// Raw policy of a bucket.
    pub fn policy(&self, bucket: &str) -> Option<String> {
        self.state.buckets.lock().unwrap().get(bucket).cloned().flatten()
    }
}

fn xml(status: StatusCode, body: String) -> Response {
    (status, [(header::CONTENT_TYPE, "application/xml")], body).into_response()
}

fn error(status: StatusCode, code: &str) -> Response {
    xml(
        status,
        format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?><Error><Code>{code}</Code><Message>{code}</Message><RequestId>1</RequestId></Error>"),
    )
}

async fn list_buckets(State(state): State<S3State>) -> Response {
    let entries: String = state
        .buckets
        .lock()
        .unwrap()
        .keys()
        .map(|name| format!("<Bucket><Name>{name}</Name><CreationDate>2024-01-01T00:00:00.000Z</CreationDate></Bucket>"))
        .collect();
    xml(
        StatusCode::OK,
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><ListAllMyBucketsResult xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\"><Owner><ID>arena</ID><DisplayName>arena</DisplayName></Owner><Buckets>{entries}</Buckets></ListAllMyBucketsResult>"
        ),
    )
}

async fn head_bucket(State(state): State<S3State>, Path(bucket): Path<String>) -> StatusCode {
    if state.forbidden.lock().unwrap().contains(&bucket) {
        StatusCode::FORBIDDEN
    } else if state.buckets.lock().unwrap().contains_key(&bucket) {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn get_bucket(
    State(state): State<S3State>,
    Path(bucket): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if !query.contains_key("policy") {
        return error(StatusCode::NOT_IMPLEMENTED, "NotImplemented");
    }
    match state.buckets.lock().unwrap().get(&bucket) {
        Some(Some(policy)) => (StatusCode::OK, policy.clone()).into_response(),
        Some(None) => error(StatusCode::NOT_FOUND, "NoSuchBucketPolicy"),
        None => error(StatusCode::NOT_FOUND, "NoSuchBucket"),
    }
}

async fn put_bucket(
    State(state): State<S3State>,
    Path(bucket): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    if state.forbidden.lock().unwrap().contains(&bucket) {
        return error(StatusCode::FORBIDDEN, "AccessDenied");
    }
    let mut buckets = state.buckets.lock().unwrap();

    if query.contains_key("policy") {
        return match buckets.get_mut(&bucket) {
            Some(policy) => {
                *policy = Some(String::from_utf8_lossy(&body).into_owned());
                StatusCode::NO_CONTENT.into_response()
            }
            None => error(StatusCode::NOT_FOUND, "NoSuchBucket"),
        };
    }

    if buckets.contains_key(&bucket) {
        return error(StatusCode::CONFLICT, "BucketAlreadyOwnedByYou");
    }
    buckets.insert(bucket.clone(), None);
    (StatusCode::OK, [(header::LOCATION, format!("/{bucket}"))]).into_response()
}

async fn delete_bucket(State(state): State<S3State>, Path(bucket): Path<String>) -> Response {
    match state.buckets.lock().unwrap().remove(&bucket) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => error(StatusCode::NOT_FOUND, "NoSuchBucket"),
    }
}
