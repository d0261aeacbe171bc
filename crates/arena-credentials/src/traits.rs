//! Traits for temporary key fetchers.

use async_trait::async_trait;

use crate::error::CredentialsResult;
use crate::types::{AuthMethod, KeyPair};

/// Exchanges a bearer token for a temporary S3 key pair.
///
/// Implementations differ only in where the bearer token comes from and which
/// endpoint contract they call. Failures are returned as-is; no retry or
/// backoff happens behind this trait.
#[async_trait]
pub trait TemporaryKeyFetcher: Send + Sync {
    /// Mint a key pair valid for `duration_secs` seconds.
    async fn fetch_temp_keys(&self, duration_secs: u64) -> CredentialsResult<KeyPair>;

    /// The authentication strategy this fetcher uses.
    fn method(&self) -> AuthMethod;
}
