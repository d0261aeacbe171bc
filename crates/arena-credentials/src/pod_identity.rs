//! Workload identity key fetcher.
//!
//! Pods running in a CoreWeave cluster with pod identity enabled get an OIDC
//! token mounted at a well-known path. The token is read once when the
//! fetcher is built and exchanged for temporary keys on every refresh.

use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::api::ApiClient;
use crate::config::CredentialsConfig;
use crate::error::{CredentialsError, CredentialsResult};
use crate::traits::TemporaryKeyFetcher;
use crate::types::{AuthMethod, KeyPair, SecretValue};

const OIDC_EXCHANGE_PATH: &str = "/temporary-credentials/oidc";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OidcExchange<'a> {
    duration_seconds: u64,
    org_id: &'a str,
    oidc_token: &'a str,
}

/// Fetcher using the ambient workload identity token.
#[derive(Debug, Clone)]
pub struct PodIdentityFetcher {
    api: ApiClient,
    org_id: String,
    token: SecretValue,
}

impl PodIdentityFetcher {
    /// Build the fetcher, reading the identity token from `config.token_path`.
    ///
    /// Fails with [`CredentialsError::MissingCredentials`] if the token file is
    /// absent or empty, or if no organisation id is configured.
    pub fn from_config(config: &CredentialsConfig) -> CredentialsResult<Self> {
        let token = read_token_file(&config.token_path)?;
        Self::with_token(config, token)
    }

    /// Build the fetcher with an identity token obtained elsewhere.
    pub fn with_token(config: &CredentialsConfig, token: SecretValue) -> CredentialsResult<Self> {
        if token.is_blank() {
            return Err(CredentialsError::missing("pod identity token is empty"));
        }

        let org_id = config
            .org_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| {
                CredentialsError::missing("pod identity exchange requires an organisation id")
            })?;

        // The OIDC exchange authenticates with the identity token itself.
        let api = ApiClient::new(
            config.api_base_url.clone(),
            &token,
            Duration::from_secs(config.timeout_secs),
        )?;

        Ok(Self { api, org_id, token })
    }
}

#[async_trait]
impl TemporaryKeyFetcher for PodIdentityFetcher {
    async fn fetch_temp_keys(&self, duration_secs: u64) -> CredentialsResult<KeyPair> {
        debug!(org_id = %self.org_id, duration_secs, "exchanging pod identity token");

        let body = OidcExchange {
            duration_seconds: duration_secs,
            org_id: &self.org_id,
            oidc_token: self.token.expose(),
        };

        self.api.mint(OIDC_EXCHANGE_PATH, &body).await
    }

    fn method(&self) -> AuthMethod {
        AuthMethod::PodIdentity
    }
}

fn read_token_file(path: &Path) -> CredentialsResult<SecretValue> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            let token = SecretValue::new(contents.trim());
            if token.is_blank() {
                Err(CredentialsError::missing(format!(
                    "pod identity token file {} is empty",
                    path.display()
                )))
            } else {
                Ok(token)
            }
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Err(CredentialsError::missing(format!(
            "pod identity token file {} not found, are you running in a CoreWeave cluster?",
            path.display()
        ))),
        Err(e) => Err(CredentialsError::missing(format!(
            "failed to read pod identity token {}: {e}",
            path.display()
        ))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Write;

    use super::*;

    fn config_with(path: &Path, org_id: Option<&str>) -> CredentialsConfig {
        CredentialsConfig {
            token_path: path.to_path_buf(),
            org_id: org_id.map(ToOwned::to_owned),
            ..CredentialsConfig::default()
        }
    }

    #[test]
    fn missing_token_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with(&dir.path().join("absent"), Some("acme"));

        let err = PodIdentityFetcher::from_config(&config).unwrap_err();
        assert!(err.is_missing_credentials());
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn empty_token_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "   ").unwrap();
        let config = config_with(file.path(), Some("acme"));

        let err = PodIdentityFetcher::from_config(&config).unwrap_err();
        assert!(err.is_missing_credentials());
    }

    #[test]
    fn missing_org_id() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "oidc-token").unwrap();
        let config = config_with(file.path(), None);

        let err = PodIdentityFetcher::from_config(&config).unwrap_err();
        assert!(err.is_missing_credentials());
    }

    #[test]
    fn token_file_is_trimmed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "oidc-token").unwrap();
        let config = config_with(file.path(), Some("acme"));

        let fetcher = PodIdentityFetcher::from_config(&config).unwrap();
        assert_eq!(fetcher.token.expose(), "oidc-token");
        assert_eq!(fetcher.method(), AuthMethod::PodIdentity);
    }
}
