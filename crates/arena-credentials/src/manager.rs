//! Cached temporary credentials with refresh ahead of expiry.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::CredentialsConfig;
use crate::error::CredentialsResult;
use crate::provider::detect_fetcher;
use crate::traits::TemporaryKeyFetcher;
use crate::types::{AuthMethod, Credential, SecretValue, DEFAULT_DURATION_SECS};

#[derive(Default)]
struct Cached {
    current: Option<Credential>,
    generation: u64,
}

/// Owns the current temporary credential and mints a new one when needed.
///
/// Nothing is fetched until the first access. Every accessor refreshes the
/// credential if it is missing or within five minutes of expiry. Refreshes are
/// serialised behind a single async mutex, so concurrent callers never mint
/// more than one pair for the same stale credential.
pub struct CredentialManager {
    fetcher: Arc<dyn TemporaryKeyFetcher>,
    duration_secs: u64,
    state: Mutex<Cached>,
}

impl fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialManager")
            .field("method", &self.fetcher.method())
            .field("duration_secs", &self.duration_secs)
            .finish_non_exhaustive()
    }
}

impl CredentialManager {
    /// Create a manager around an existing fetcher.
    #[must_use]
    pub fn new(fetcher: Arc<dyn TemporaryKeyFetcher>) -> Self {
        Self {
            fetcher,
            duration_secs: DEFAULT_DURATION_SECS,
            state: Mutex::new(Cached::default()),
        }
    }

    /// Override the requested key lifetime.
    #[must_use]
    pub const fn with_duration(mut self, duration_secs: u64) -> Self {
        self.duration_secs = duration_secs;
        self
    }

    /// Pick pod identity when available, otherwise the access key method.
    pub fn auto(config: &CredentialsConfig) -> CredentialsResult<Self> {
        let fetcher = detect_fetcher(config)?;
        Ok(Self::new(fetcher).with_duration(config.duration_secs))
    }

    /// The authentication method in use.
    #[must_use]
    pub fn method(&self) -> AuthMethod {
        self.fetcher.method()
    }

    /// Requested key lifetime in seconds.
    #[must_use]
    pub const fn duration_secs(&self) -> u64 {
        self.duration_secs
    }

    /// Number of refreshes performed so far.
    pub async fn generation(&self) -> u64 {
        self.state.lock().await.generation
    }

    /// Returns true if no credential is cached or it is inside the refresh margin.
    pub async fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.state
            .lock()
            .await
            .current
            .as_ref()
            .map_or(true, |c| c.is_stale_at(now))
    }

    /// Get the current credential, refreshing it if stale.
    pub async fn credential(&self) -> CredentialsResult<Credential> {
        self.snapshot().await.map(|(_, credential)| credential)
    }

    /// Get the current credential together with its generation.
    pub async fn snapshot(&self) -> CredentialsResult<(u64, Credential)> {
        self.snapshot_at(Utc::now()).await
    }

    /// Like [`Self::snapshot`] with an explicit clock reading.
    pub async fn snapshot_at(&self, now: DateTime<Utc>) -> CredentialsResult<(u64, Credential)> {
        let mut state = self.state.lock().await;

        if let Some(current) = state.current.as_ref().filter(|c| !c.is_stale_at(now)) {
            return Ok((state.generation, current.clone()));
        }

        debug!(method = %self.method(), "credential missing or stale");
        let credential = self.mint(&mut state, now).await?;
        Ok((state.generation, credential))
    }

    /// Get the access key id, refreshing if stale.
    pub async fn access_key_id(&self) -> CredentialsResult<String> {
        Ok(self.credential().await?.access_key_id().to_owned())
    }

    /// Get the secret access key, refreshing if stale.
    pub async fn secret_access_key(&self) -> CredentialsResult<SecretValue> {
        Ok(self.credential().await?.secret_access_key().clone())
    }

    /// Mint a new credential unconditionally and replace the cached one.
    ///
    /// On failure the previous credential, if any, stays in place.
    pub async fn refresh(&self) -> CredentialsResult<Credential> {
        self.refresh_at(Utc::now()).await
    }

    /// Like [`Self::refresh`] with an explicit clock reading.
    pub async fn refresh_at(&self, now: DateTime<Utc>) -> CredentialsResult<Credential> {
        let mut state = self.state.lock().await;
        self.mint(&mut state, now).await
    }

    async fn mint(&self, state: &mut Cached, now: DateTime<Utc>) -> CredentialsResult<Credential> {
        let pair = self.fetcher.fetch_temp_keys(self.duration_secs).await?;
        let credential = Credential::issue(pair, self.duration_secs, now);

        state.generation += 1;
        state.current = Some(credential.clone());

        info!(
            method = %self.method(),
            key = %credential.key_prefix(),
            generation = state.generation,
            expires_at = %credential.expires_at(),
            "refreshed temporary credentials"
        );

        Ok(credential)
    }
}
