//! Configuration for temporary credential acquisition.

use std::path::PathBuf;

use serde::Deserialize;

use crate::types::{SecretValue, DEFAULT_DURATION_SECS};

/// Base URL of the platform object storage API.
pub const DEFAULT_API_BASE_URL: &str = "https://api.coreweave.com/v1/cwobject";

/// Where workload identity mounts its token inside a pod.
pub const DEFAULT_POD_IDENTITY_TOKEN_PATH: &str =
    "/var/run/secrets/cks.coreweave.com/serviceaccount/cks-pod-identity-token";

/// Settings shared by both credential fetchers.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsConfig {
    /// Base URL for the temporary key API.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Platform API token. Usually supplied through `CW_TOKEN`.
    #[serde(default)]
    pub token: Option<SecretValue>,

    /// Path of the workload identity token file.
    #[serde(default = "default_token_path")]
    pub token_path: PathBuf,

    /// Organisation id, required by the workload identity exchange.
    #[serde(default)]
    pub org_id: Option<String>,

    /// Requested key lifetime in seconds.
    #[serde(default = "default_duration_secs")]
    pub duration_secs: u64,

    /// HTTP request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl CredentialsConfig {
    /// Returns the configured token unless it is blank.
    #[must_use]
    pub fn token(&self) -> Option<&SecretValue> {
        self.token.as_ref().filter(|t| !t.is_blank())
    }
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_owned()
}

fn default_token_path() -> PathBuf {
    PathBuf::from(DEFAULT_POD_IDENTITY_TOKEN_PATH)
}

const fn default_duration_secs() -> u64 {
    DEFAULT_DURATION_SECS
}

const fn default_timeout_secs() -> u64 {
    30
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            token: None,
            token_path: default_token_path(),
            org_id: None,
            duration_secs: default_duration_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}
