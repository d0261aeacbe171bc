//! Bearer-token key fetcher.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::api::ApiClient;
use crate::config::CredentialsConfig;
use crate::error::{CredentialsError, CredentialsResult};
use crate::traits::TemporaryKeyFetcher;
use crate::types::{AuthMethod, KeyPair};

const ACCESS_KEY_PATH: &str = "/access-key";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AccessKeyRequest {
    duration_seconds: u64,
}

/// Fetcher using an explicit platform API token.
#[derive(Debug, Clone)]
pub struct AccessKeyFetcher {
    api: ApiClient,
}

impl AccessKeyFetcher {
    /// Build the fetcher from the configured token.
    ///
    /// Fails immediately with [`CredentialsError::MissingCredentials`] when no
    /// token is configured.
    pub fn from_config(config: &CredentialsConfig) -> CredentialsResult<Self> {
        let token = config.token().ok_or_else(|| {
            CredentialsError::missing("missing platform token, set CW_TOKEN or credentials.token")
        })?;

        let api = ApiClient::new(
            config.api_base_url.clone(),
            token,
            Duration::from_secs(config.timeout_secs),
        )?;

        Ok(Self { api })
    }

    /// The underlying API client, for calls that share the same token.
    #[must_use]
    pub const fn api(&self) -> &ApiClient {
        &self.api
    }
}

#[async_trait]
impl TemporaryKeyFetcher for AccessKeyFetcher {
    async fn fetch_temp_keys(&self, duration_secs: u64) -> CredentialsResult<KeyPair> {
        let body = AccessKeyRequest {
            duration_seconds: duration_secs,
        };

        let pair = self.api.mint(ACCESS_KEY_PATH, &body).await?;
        let prefix = pair.access_key_id.get(..8).unwrap_or(&pair.access_key_id);
        info!(key = %prefix, "created access key");

        Ok(pair)
    }

    fn method(&self) -> AuthMethod {
        AuthMethod::AccessKey
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::SecretValue;

    #[test]
    fn missing_token_is_fatal() {
        let config = CredentialsConfig::default();
        let err = AccessKeyFetcher::from_config(&config).unwrap_err();
        assert!(err.is_missing_credentials());
    }

    #[test]
    fn builds_with_token() {
        let config = CredentialsConfig {
            token: Some(SecretValue::new("cw-token")),
            ..CredentialsConfig::default()
        };
        let fetcher = AccessKeyFetcher::from_config(&config);
        assert!(fetcher.is_ok_and(|f| f.method() == AuthMethod::AccessKey));
    }
}
