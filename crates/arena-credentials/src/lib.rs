//! Temporary object storage credentials for Arena.
//!
//! Access to the object store is granted through short-lived S3 key pairs
//! minted by the platform API. This crate obtains those pairs, tracks their
//! expiry, and refreshes them ahead of time.
//!
//! # Fetchers
//!
//! - **Pod identity**: exchanges the workload identity token mounted into the
//!   pod for keys.
//! - **Access key**: exchanges a caller-supplied platform token (`CW_TOKEN`).
//! - **Memory**: deterministic keys for tests and dry runs.
//!
//! [`CredentialManager::auto`] prefers pod identity and falls back to the
//! access key method when no identity token is available.
//!
//! # Example
//!
//! ```rust,ignore
//! use arena_credentials::{CredentialManager, CredentialsConfig};
//!
//! let manager = CredentialManager::auto(&CredentialsConfig::default())?;
//! let key_id = manager.access_key_id().await?;
//! ```

mod access_key;
mod api;
mod bound;
mod config;
mod error;
mod manager;
mod memory;
mod pod_identity;
mod provider;
mod traits;
mod types;

pub use access_key::AccessKeyFetcher;
pub use api::ApiClient;
pub use bound::BoundClient;
pub use config::{CredentialsConfig, DEFAULT_API_BASE_URL, DEFAULT_POD_IDENTITY_TOKEN_PATH};
pub use error::{CredentialsError, CredentialsResult};
pub use manager::CredentialManager;
pub use memory::MemoryKeyFetcher;
pub use pod_identity::PodIdentityFetcher;
pub use provider::{create_fetcher, detect_fetcher, AUTH_METHOD_ORDER};
pub use traits::TemporaryKeyFetcher;
pub use types::{
    AuthMethod, Credential, KeyPair, SecretValue, DEFAULT_DURATION_SECS, REFRESH_MARGIN_SECS,
};
