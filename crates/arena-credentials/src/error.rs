//! Error types for credential acquisition.

use thiserror::Error;

/// Result type alias using [`CredentialsError`].
pub type CredentialsResult<T> = Result<T, CredentialsError>;

/// Errors that can occur while obtaining temporary credentials.
#[derive(Debug, Error)]
pub enum CredentialsError {
    /// No token is available to authenticate with.
    ///
    /// Raised at construction time and never retried.
    #[error("missing credentials: {0}")]
    MissingCredentials(String),

    /// The platform API exchange failed.
    ///
    /// Covers network failures, non-2xx responses and malformed bodies. The
    /// caller decides whether and when to retry.
    #[error("object storage error: {0}")]
    ObjectStorage(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl CredentialsError {
    /// Create a missing credentials error.
    #[must_use]
    pub fn missing(msg: impl Into<String>) -> Self {
        Self::MissingCredentials(msg.into())
    }

    /// Create an object storage error.
    #[must_use]
    pub fn object_storage(msg: impl Into<String>) -> Self {
        Self::ObjectStorage(msg.into())
    }

    /// Returns true if the error means no token was available at all.
    #[must_use]
    pub const fn is_missing_credentials(&self) -> bool {
        matches!(self, Self::MissingCredentials(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_credentials_classification() {
        assert!(CredentialsError::missing("no token").is_missing_credentials());
        assert!(!CredentialsError::object_storage("503").is_missing_credentials());
    }
}
