//! Error types for arena-control.

use arena_credentials::CredentialsError;

use crate::apply::ApplyResult;

/// Result type alias using [`ControlError`].
pub type ControlResult<T> = Result<T, ControlError>;

/// Errors that can occur while inspecting the cluster or running benchmarks.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// Kubernetes API call failed.
    #[error("kubernetes error: {0}")]
    Kubernetes(String),

    /// Kubernetes client configuration could not be loaded.
    #[error("failed to load kubernetes config: {0}")]
    KubernetesConfig(String),

    /// No object storage region could be determined.
    #[error("unable to determine object storage region: {0}")]
    MissingRegion(String),

    /// Temporary credential acquisition failed.
    #[error(transparent)]
    Credentials(#[from] CredentialsError),

    /// Object storage operation failed.
    #[error("object storage error: {0}")]
    ObjectStorage(String),

    /// The endpoint could not be reached at all (connect failure or timeout).
    #[error("endpoint {endpoint} unreachable: {message}")]
    Unreachable {
        /// Endpoint URL.
        endpoint: String,
        /// Underlying transport error.
        message: String,
    },

    /// A manifest document is malformed.
    #[error("invalid manifest: {0}")]
    Manifest(String),

    /// Applying a resource failed part way through a batch.
    #[error("failed to apply {resource}: {message}")]
    Apply {
        /// `Kind/name` of the resource that failed.
        resource: String,
        /// Resources handled before the failure.
        applied: Box<ApplyResult>,
        /// Underlying error.
        message: String,
    },

    /// Not enough nodes for a distributed benchmark.
    #[error("warp needs at least 2 hosts, found {found}")]
    InsufficientNodes {
        /// Number of eligible hosts.
        found: u32,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialisation error.
    #[error("serialisation error: {0}")]
    Serialisation(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ControlError {
    /// Create a kubernetes error.
    #[must_use]
    pub fn kubernetes(msg: impl Into<String>) -> Self {
        Self::Kubernetes(msg.into())
    }

    /// Create an object storage error.
    #[must_use]
    pub fn object_storage(msg: impl Into<String>) -> Self {
        Self::ObjectStorage(msg.into())
    }

    /// Create a manifest error.
    #[must_use]
    pub fn manifest(msg: impl Into<String>) -> Self {
        Self::Manifest(msg.into())
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns true if the endpoint could not be reached at the transport level.
    #[must_use]
    pub const fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable { .. })
    }
}

impl From<serde_json::Error> for ControlError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialisation(e.to_string())
    }
}

impl From<serde_yaml::Error> for ControlError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Serialisation(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_errors_convert() {
        let err: ControlError = CredentialsError::missing("no token").into();
        assert!(matches!(err, ControlError::Credentials(_)));
        assert_eq!(err.to_string(), "missing credentials: no token");
    }

    #[test]
    fn unreachable_classification() {
        let err = ControlError::Unreachable {
            endpoint: "http://cwlota.com".to_owned(),
            message: "connection refused".to_owned(),
        };
        assert!(err.is_unreachable());
        assert!(!ControlError::object_storage("403").is_unreachable());
    }
}
