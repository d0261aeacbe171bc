//! Factory for temporary key fetchers.

use std::sync::Arc;

use tracing::{debug, info};

use crate::access_key::AccessKeyFetcher;
use crate::config::CredentialsConfig;
use crate::error::CredentialsResult;
use crate::pod_identity::PodIdentityFetcher;
use crate::traits::TemporaryKeyFetcher;
use crate::types::AuthMethod;

/// Order in which authentication methods are tried when none is forced.
pub const AUTH_METHOD_ORDER: [AuthMethod; 2] = [AuthMethod::PodIdentity, AuthMethod::AccessKey];

/// Create a fetcher for a specific authentication method.
pub fn create_fetcher(
    method: AuthMethod,
    config: &CredentialsConfig,
) -> CredentialsResult<Arc<dyn TemporaryKeyFetcher>> {
    match method {
        AuthMethod::PodIdentity => Ok(Arc::new(PodIdentityFetcher::from_config(config)?)),
        AuthMethod::AccessKey => Ok(Arc::new(AccessKeyFetcher::from_config(config)?)),
    }
}

/// Create the first fetcher whose credentials are available.
///
/// Pod identity is preferred; a missing token file or organisation id falls
/// back to the access key method. Any other failure is returned unchanged.
pub fn detect_fetcher(config: &CredentialsConfig) -> CredentialsResult<Arc<dyn TemporaryKeyFetcher>> {
    match create_fetcher(AuthMethod::PodIdentity, config) {
        Ok(fetcher) => {
            debug!("using pod identity credentials");
            Ok(fetcher)
        }
        Err(e) if e.is_missing_credentials() => {
            info!(reason = %e, "pod identity unavailable, falling back to access key");
            create_fetcher(AuthMethod::AccessKey, config)
        }
        Err(e) => Err(e),
    }
}
