//! In-memory key fetcher for testing and dry runs.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;

use crate::error::{CredentialsError, CredentialsResult};
use crate::traits::TemporaryKeyFetcher;
use crate::types::{AuthMethod, KeyPair};

/// Fetcher that mints deterministic keys without any network access.
///
/// Each call returns a new pair (`MEMKEY00000001`, `MEMKEY00000002`, ...) so
/// callers can observe refreshes. It can be switched into a failing mode to
/// exercise error paths.
#[derive(Debug)]
pub struct MemoryKeyFetcher {
    method: AuthMethod,
    issued: AtomicU64,
    failing: AtomicBool,
}

impl Default for MemoryKeyFetcher {
    fn default() -> Self {
        Self::new(AuthMethod::AccessKey)
    }
}

impl MemoryKeyFetcher {
    /// Create a fetcher reporting the given method.
    #[must_use]
    pub const fn new(method: AuthMethod) -> Self {
        Self {
            method,
            issued: AtomicU64::new(0),
            failing: AtomicBool::new(false),
        }
    }

    /// Number of key pairs minted so far.
    #[must_use]
    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::SeqCst)
    }

    /// Make subsequent fetches fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl TemporaryKeyFetcher for MemoryKeyFetcher {
    async fn fetch_temp_keys(&self, _duration_secs: u64) -> CredentialsResult<KeyPair> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CredentialsError::object_storage(
                "failed to create access key: memory fetcher is failing",
            ));
        }

        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(KeyPair::new(
            format!("MEMKEY{n:08}"),
            format!("memory-secret-{n}"),
        ))
    }

    fn method(&self) -> AuthMethod {
        self.method
    }
}
