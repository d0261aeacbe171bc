//! HTTP client for the platform object storage API.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{CredentialsError, CredentialsResult};
use crate::types::{KeyPair, SecretValue};

/// Raw body returned by both temporary key endpoints.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TemporaryKeyResponse {
    access_key_id: Option<String>,
    secret_key: Option<String>,
}

/// Bearer-authenticated client for the platform API.
///
/// The token is attached as a default header; it is never logged.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a client for `base_url` that authenticates with `token`.
    pub fn new(
        base_url: impl Into<String>,
        token: &SecretValue,
        timeout: Duration,
    ) -> CredentialsResult<Self> {
        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", token.expose()))
            .map_err(|_| CredentialsError::Configuration("token is not a valid header value".to_owned()))?;
        bearer.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| CredentialsError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        })
    }

    /// Get the base URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST a JSON body and decode the JSON response.
    pub async fn post_json<B, R>(&self, path: &str, body: &B, action: &str) -> CredentialsResult<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| CredentialsError::object_storage(format!("failed to {action}: {e}")))?;

        decode(response, action).await
    }

    /// POST a JSON body, ignoring any response body.
    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B, action: &str) -> CredentialsResult<()> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| CredentialsError::object_storage(format!("failed to {action}: {e}")))?;

        check_status(response, action).await.map(|_| ())
    }

    /// GET a JSON document.
    pub async fn get_json<R: DeserializeOwned>(&self, path: &str, action: &str) -> CredentialsResult<R> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CredentialsError::object_storage(format!("failed to {action}: {e}")))?;

        decode(response, action).await
    }

    /// DELETE a resource, ignoring any response body.
    pub async fn delete(&self, path: &str, action: &str) -> CredentialsResult<()> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|e| CredentialsError::object_storage(format!("failed to {action}: {e}")))?;

        check_status(response, action).await.map(|_| ())
    }

    /// Exchange the bearer token for a temporary key pair at `path`.
    ///
    /// A body without both keys is rejected.
    pub async fn mint<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> CredentialsResult<KeyPair> {
        let raw: TemporaryKeyResponse = self.post_json(path, body, "create access key").await?;

        match (raw.access_key_id, raw.secret_key) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => {
                Ok(KeyPair::new(id, secret))
            }
            _ => Err(CredentialsError::object_storage(
                "invalid response from access key endpoint, missing keys",
            )),
        }
    }
}

async fn check_status(response: Response, action: &str) -> CredentialsResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(CredentialsError::object_storage(format!(
        "failed to {action}: {status}: {body}"
    )))
}

async fn decode<R: DeserializeOwned>(response: Response, action: &str) -> CredentialsResult<R> {
    check_status(response, action)
        .await?
        .json()
        .await
        .map_err(|e| CredentialsError::object_storage(format!("failed to {action}: {e}")))
}
