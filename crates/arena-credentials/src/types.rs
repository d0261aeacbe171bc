//! Core credential types.

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Default lifetime requested for temporary keys (12 hours).
pub const DEFAULT_DURATION_SECS: u64 = 43_200;

/// How long before expiry a credential is considered stale.
pub const REFRESH_MARGIN_SECS: i64 = 300;

/// A secret value with automatic memory zeroisation.
///
/// The value is stored as a `SecretString` which prevents accidental logging
/// and ensures memory is zeroed when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretValue {
    #[zeroize(skip)]
    inner: SecretString,
}

impl SecretValue {
    /// Creates a new secret value from a string.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            inner: SecretString::from(value.into()),
        }
    }

    /// Exposes the secret value for use.
    ///
    /// The returned reference should not be logged, stored, or otherwise
    /// exposed.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.inner.expose_secret()
    }

    /// Returns true if the secret value is empty or whitespace.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.inner.expose_secret().trim().is_empty()
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl PartialEq for SecretValue {
    /// Constant-time comparison to prevent timing attacks.
    fn eq(&self, other: &Self) -> bool {
        let self_bytes = self.inner.expose_secret().as_bytes();
        let other_bytes = other.inner.expose_secret().as_bytes();

        if self_bytes.len() != other_bytes.len() {
            return false;
        }

        self_bytes.ct_eq(other_bytes).into()
    }
}

impl Eq for SecretValue {}

impl<'de> Deserialize<'de> for SecretValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

/// The way a temporary key pair was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// Ambient workload identity token mounted into the pod.
    PodIdentity,
    /// Caller-supplied platform API token.
    AccessKey,
}

impl AuthMethod {
    /// Get the method name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PodIdentity => "pod_identity",
            Self::AccessKey => "access_key",
        }
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A freshly minted access key pair, before expiry tracking is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPair {
    /// S3 access key id.
    pub access_key_id: String,
    /// S3 secret access key.
    pub secret_access_key: SecretValue,
}

impl KeyPair {
    /// Create a key pair.
    #[must_use]
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: SecretValue::new(secret_access_key),
        }
    }
}

/// A temporary access key pair with its validity window.
///
/// Replaced wholesale on refresh, never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    access_key_id: String,
    secret_access_key: SecretValue,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    duration_seconds: u64,
}

impl Credential {
    /// Attach a validity window starting at `issued_at` to a key pair.
    #[must_use]
    pub fn issue(pair: KeyPair, duration_seconds: u64, issued_at: DateTime<Utc>) -> Self {
        let lifetime = i64::try_from(duration_seconds)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX);
        let expires_at = issued_at
            .checked_add_signed(lifetime)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Self {
            access_key_id: pair.access_key_id,
            secret_access_key: pair.secret_access_key,
            issued_at,
            expires_at,
            duration_seconds,
        }
    }

    /// Get the access key id.
    #[must_use]
    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    /// Get the secret access key.
    #[must_use]
    pub const fn secret_access_key(&self) -> &SecretValue {
        &self.secret_access_key
    }

    /// When the key pair was minted.
    #[must_use]
    pub const fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// When the key pair stops being accepted.
    #[must_use]
    pub const fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Requested lifetime in seconds.
    #[must_use]
    pub const fn duration_seconds(&self) -> u64 {
        self.duration_seconds
    }

    /// The instant from which the credential must be refreshed before use.
    #[must_use]
    pub fn refresh_due_at(&self) -> DateTime<Utc> {
        self.expires_at
            .checked_sub_signed(TimeDelta::seconds(REFRESH_MARGIN_SECS))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Returns true if `now` is inside the refresh margin or past expiry.
    #[must_use]
    pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.refresh_due_at()
    }

    /// First eight characters of the key id, safe to log.
    #[must_use]
    pub fn key_prefix(&self) -> &str {
        self.access_key_id
            .get(..8)
            .unwrap_or(&self.access_key_id)
    }
}
