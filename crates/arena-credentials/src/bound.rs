//! Downstream clients tied to a credential generation.

use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::error::CredentialsError;
use crate::manager::CredentialManager;
use crate::types::Credential;

type Builder<T, E> = Box<dyn Fn(&Credential) -> Result<T, E> + Send + Sync>;

/// A client built from the manager's current credential.
///
/// The client is cached together with the generation it was built from. When
/// the manager refreshes, the next [`BoundClient::get`] rebuilds it, so a
/// client holding expired keys is never handed out.
pub struct BoundClient<T, E = CredentialsError> {
    manager: Arc<CredentialManager>,
    build: Builder<T, E>,
    cached: Mutex<Option<(u64, Arc<T>)>>,
}

impl<T, E> fmt::Debug for BoundClient<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundClient")
            .field("manager", &self.manager)
            .finish_non_exhaustive()
    }
}

impl<T, E> BoundClient<T, E>
where
    E: From<CredentialsError>,
{
    /// Bind `build` to the credentials owned by `manager`.
    pub fn new<F>(manager: Arc<CredentialManager>, build: F) -> Self
    where
        F: Fn(&Credential) -> Result<T, E> + Send + Sync + 'static,
    {
        Self {
            manager,
            build: Box::new(build),
            cached: Mutex::new(None),
        }
    }

    /// The manager this client draws credentials from.
    #[must_use]
    pub const fn manager(&self) -> &Arc<CredentialManager> {
        &self.manager
    }

    /// Get a client built from a fresh credential.
    pub async fn get(&self) -> Result<Arc<T>, E> {
        let (generation, credential) = self.manager.snapshot().await?;
        let mut cached = self.cached.lock().await;

        if let Some((built_for, client)) = cached.as_ref() {
            if *built_for == generation {
                return Ok(Arc::clone(client));
            }
        }

        debug!(generation, key = %credential.key_prefix(), "building client for new credential");
        let client = Arc::new((self.build)(&credential)?);
        *cached = Some((generation, Arc::clone(&client)));
        Ok(client)
    }
}
