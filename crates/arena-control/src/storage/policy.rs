//! Organisation access policies.
//!
//! Policies are managed through the platform API with the caller's own
//! token; workload identity tokens cannot manage them.

use std::time::Duration;

use arena_credentials::{ApiClient, CredentialsConfig, CredentialsError};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{ControlError, ControlResult};

const POLICY_PATH: &str = "/access-policy";

#[derive(Deserialize)]
struct PolicyList {
    #[serde(default)]
    policies: Option<Vec<Value>>,
}

/// Client for organisation access policies.
#[derive(Debug, Clone)]
pub struct PolicyClient {
    api: ApiClient,
}

impl PolicyClient {
    /// Create a client from the platform token in `config`.
    pub fn from_config(config: &CredentialsConfig) -> ControlResult<Self> {
        let token = config.token().ok_or_else(|| {
            CredentialsError::missing("managing policies needs a platform token, set CW_TOKEN or credentials.token")
        })?;
        let api = ApiClient::new(
            &config.api_base_url,
            token,
            Duration::from_secs(config.timeout_secs),
        )?;
        Ok(Self::new(api))
    }

    /// Wrap an existing API client.
    #[must_use]
    pub const fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// List organisation policies.
    ///
    /// Failures are logged and yield an empty list.
    pub async fn list(&self) -> Vec<Value> {
        match self
            .api
            .get_json::<PolicyList>(POLICY_PATH, "list access policies")
            .await
        {
            Ok(list) => list.policies.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "failed to list organisation policies");
                Vec::new()
            }
        }
    }

    /// Create or update a policy.
    ///
    /// `policy` is the full request document, `{"policy": {"name": ..}}`.
    pub async fn apply(&self, policy: &Value) -> ControlResult<()> {
        let name = policy_name(policy);
        self.api
            .post(POLICY_PATH, policy, &format!("apply access policy {name}"))
            .await?;
        info!(policy = name, "applied organisation policy");
        Ok(())
    }

    /// Delete a policy by name.
    ///
    /// The platform may not support deletion through the API; its error is
    /// returned as is.
    pub async fn delete(&self, name: &str) -> ControlResult<()> {
        if name.is_empty() || name.contains('/') {
            return Err(ControlError::object_storage(format!("invalid policy name {name:?}")));
        }
        self.api
            .delete(&format!("{POLICY_PATH}/{name}"), &format!("delete access policy {name}"))
            .await?;
        info!(policy = name, "deleted organisation policy");
        Ok(())
    }
}

/// Name of a policy document, or `unknown`.
#[must_use]
pub fn policy_name(policy: &Value) -> &str {
    policy
        .get("policy")
        .and_then(|p| p.get("name"))
        .and_then(Value::as_str)
        .unwrap_or("unknown")
}
