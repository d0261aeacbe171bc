//! Object storage sessions.
//!
//! [`ObjectStorage::connect`] picks an authentication method and an endpoint
//! that work from where the process runs, then hands out S3 clients bound to
//! the session's temporary credentials.

mod bucket;
mod endpoint;
mod policy;
mod probe;
mod region;

pub use bucket::{
    empty_bucket, ensure_bucket, BucketApi, BucketStatus, EnsureOutcome, MemoryBuckets, S3Buckets,
};
pub use endpoint::{endpoint_host, virtual_hosted_url, AddressingStyle, Endpoint};
pub use policy::{policy_name, PolicyClient};
pub use probe::probe_endpoint;
pub use region::resolve_region;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arena_credentials::{
    create_fetcher, AuthMethod, BoundClient, Credential, CredentialManager, AUTH_METHOD_ORDER,
};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::ObjectStore;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cluster::ClusterClient;
use crate::config::{ArenaConfig, StorageConfig};
use crate::error::{ControlError, ControlResult};
use crate::warp::WarpTarget;

/// One entry of a bucket listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectSummary {
    /// Object key.
    pub key: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time.
    pub last_modified: DateTime<Utc>,
}

type BoundStore = BoundClient<AmazonS3, ControlError>;
type BoundBuckets = BoundClient<S3Buckets, ControlError>;

/// A connected object storage session.
pub struct ObjectStorage {
    manager: Arc<CredentialManager>,
    endpoint: Endpoint,
    endpoint_url: String,
    region: String,
    addressing_style: AddressingStyle,
    stores: Mutex<HashMap<String, Arc<BoundStore>>>,
    buckets: BoundBuckets,
}

impl std::fmt::Debug for ObjectStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStorage")
            .field("method", &self.manager.method())
            .field("endpoint", &self.endpoint)
            .field("endpoint_url", &self.endpoint_url)
            .field("region", &self.region)
            .field("addressing_style", &self.addressing_style)
            .finish_non_exhaustive()
    }
}

impl ObjectStorage {
    /// Connect with the first working authentication method and endpoint.
    ///
    /// Methods are tried in [`AUTH_METHOD_ORDER`]; a method whose credentials
    /// are missing is skipped. For each method the endpoints are tried in
    /// [`Endpoint::candidates`] order: an unreachable LOTA endpoint falls
    /// through to CAIOS, any other failure moves on to the next method.
    pub async fn connect(config: &ArenaConfig, cluster: &dyn ClusterClient) -> ControlResult<Self> {
        let region = resolve_region(&config.storage, cluster).await?;
        let mut failures = Vec::new();

        for method in AUTH_METHOD_ORDER {
            let fetcher = match create_fetcher(method, &config.credentials) {
                Ok(fetcher) => fetcher,
                Err(e) => {
                    debug!(method = %method, error = %e, "authentication method unavailable");
                    failures.push(format!("{method}: {e}"));
                    continue;
                }
            };
            let manager = Arc::new(
                CredentialManager::new(fetcher).with_duration(config.credentials.duration_secs),
            );

            for &endpoint in Endpoint::candidates(config.storage.prefer_lota) {
                let url = endpoint.url(&config.storage);
                match Self::check(&manager, url, &config.storage).await {
                    Ok(()) => {
                        info!(method = %method, endpoint = %endpoint, region = %region, "object storage ready");
                        return Ok(Self::new(manager, endpoint, url, region, config.storage.addressing_style));
                    }
                    Err(e) if e.is_unreachable() && endpoint == Endpoint::Lota => {
                        warn!(error = %e, "LOTA unreachable, is this a GPU cluster? trying CAIOS");
                        failures.push(format!("{method} via {endpoint}: {e}"));
                    }
                    Err(e) => {
                        warn!(method = %method, endpoint = %endpoint, error = %e, "authentication failed");
                        failures.push(format!("{method} via {endpoint}: {e}"));
                        break;
                    }
                }
            }
        }

        Err(ControlError::object_storage(format!(
            "failed to create the object storage session: {}",
            failures.join("; ")
        )))
    }

    async fn check(manager: &CredentialManager, url: &str, storage: &StorageConfig) -> ControlResult<()> {
        probe_endpoint(url, Duration::from_secs(storage.probe_timeout_secs)).await?;
        manager.credential().await?;
        Ok(())
    }

    /// A session over an existing credential manager.
    #[must_use]
    pub fn new(
        manager: Arc<CredentialManager>,
        endpoint: Endpoint,
        endpoint_url: impl Into<String>,
        region: impl Into<String>,
        addressing_style: AddressingStyle,
    ) -> Self {
        let endpoint_url = endpoint_url.into();
        let region = region.into();
        let buckets = {
            let endpoint_url = endpoint_url.clone();
            let region = region.clone();
            BoundClient::new(Arc::clone(&manager), move |credential: &Credential| {
                Ok(S3Buckets::new(&endpoint_url, &region, addressing_style, credential))
            })
        };

        Self {
            manager,
            endpoint,
            endpoint_url,
            region,
            addressing_style,
            stores: Mutex::new(HashMap::new()),
            buckets,
        }
    }

    /// A session on another endpoint sharing this session's credentials.
    #[must_use]
    pub fn for_endpoint(&self, endpoint: Endpoint, config: &StorageConfig) -> Self {
        Self::new(
            Arc::clone(&self.manager),
            endpoint,
            endpoint.url(config),
            self.region.clone(),
            self.addressing_style,
        )
    }

    /// Credential manager of the session.
    #[must_use]
    pub const fn manager(&self) -> &Arc<CredentialManager> {
        &self.manager
    }

    /// Authentication method in use.
    #[must_use]
    pub fn method(&self) -> AuthMethod {
        self.manager.method()
    }

    /// Endpoint in use.
    #[must_use]
    pub const fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    /// Endpoint URL in use.
    #[must_use]
    pub fn endpoint_url(&self) -> &str {
        &self.endpoint_url
    }

    /// Region requests are signed for.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// S3 addressing style.
    #[must_use]
    pub const fn addressing_style(&self) -> AddressingStyle {
        self.addressing_style
    }

    /// An S3 client for `bucket` using current credentials.
    ///
    /// The client is rebuilt after every credential refresh.
    pub async fn store(&self, bucket: &str) -> ControlResult<Arc<dyn ObjectStore>> {
        let bound = {
            let mut stores = self.stores.lock().await;
            let bound = stores.entry(bucket.to_owned()).or_insert_with(|| {
                let endpoint_url = self.endpoint_url.clone();
                let region = self.region.clone();
                let style = self.addressing_style;
                let bucket = bucket.to_owned();
                Arc::new(BoundClient::new(Arc::clone(&self.manager), move |credential: &Credential| {
                    build_s3(&endpoint_url, &region, style, &bucket, credential)
                }))
            });
            Arc::clone(bound)
        };

        let store: Arc<dyn ObjectStore> = bound.get().await?;
        Ok(store)
    }

    /// List objects in `bucket` whose key starts with `prefix`.
    ///
    /// Failures are logged and yield an empty list.
    pub async fn list_objects(&self, bucket: &str, prefix: &str) -> Vec<ObjectSummary> {
        match self.try_list_objects(bucket, prefix).await {
            Ok(objects) => objects,
            Err(e) => {
                warn!(bucket, error = %e, "failed to list objects");
                Vec::new()
            }
        }
    }

    async fn try_list_objects(&self, bucket: &str, prefix: &str) -> ControlResult<Vec<ObjectSummary>> {
        let store = self.store(bucket).await?;
        list_prefixed(store.as_ref(), prefix)
            .await
            .map_err(|e| ControlError::object_storage(format!("failed to list {bucket}: {e}")))
    }

    /// Bucket-level operations using current credentials.
    pub async fn buckets(&self) -> ControlResult<Arc<dyn BucketApi>> {
        let buckets: Arc<dyn BucketApi> = self.buckets.get().await?;
        Ok(buckets)
    }

    /// Make sure `bucket` exists, creating it in the session's region.
    pub async fn ensure_bucket(&self, bucket: &str) -> ControlResult<EnsureOutcome> {
        let buckets = self.buckets().await?;
        ensure_bucket(buckets.as_ref(), bucket, &self.region).await
    }

    /// Delete every object in `bucket`. Returns the number deleted.
    pub async fn empty_bucket(&self, bucket: &str) -> ControlResult<u64> {
        let store = self.store(bucket).await?;
        empty_bucket(store.as_ref()).await
    }

    /// Everything a Warp run needs to reach `bucket`.
    pub async fn warp_target(&self, bucket: &str) -> ControlResult<WarpTarget> {
        let credential = self.manager.credential().await?;
        Ok(WarpTarget {
            bucket: bucket.to_owned(),
            region: self.region.clone(),
            endpoint: self.endpoint_url.clone(),
            access_key_id: credential.access_key_id().to_owned(),
            secret_access_key: credential.secret_access_key().clone(),
        })
    }
}

/// Objects in `store` whose key starts with `prefix`.
///
/// Keys never start with `/`, so leading slashes in `prefix` are ignored.
pub async fn list_prefixed(store: &dyn ObjectStore, prefix: &str) -> object_store::Result<Vec<ObjectSummary>> {
    let prefix = prefix.trim_start_matches('/');

    // Listing prefixes are whole path segments; filter the rest by key.
    let directory = prefix.rfind('/').map(|i| Path::from(&prefix[..i]));
    let objects: Vec<_> = store.list(directory.as_ref()).try_collect().await?;

    Ok(objects
        .into_iter()
        .filter(|meta| meta.location.as_ref().starts_with(prefix))
        .map(|meta| ObjectSummary {
            key: meta.location.to_string(),
            size: meta.size,
            last_modified: meta.last_modified,
        })
        .collect())
}

fn build_s3(
    endpoint_url: &str,
    region: &str,
    style: AddressingStyle,
    bucket: &str,
    credential: &Credential,
) -> ControlResult<AmazonS3> {
    let mut builder = AmazonS3Builder::new()
        .with_bucket_name(bucket)
        .with_region(region)
        .with_access_key_id(credential.access_key_id())
        .with_secret_access_key(credential.secret_access_key().expose());

    builder = if style.is_virtual_for(bucket) {
        builder
            .with_endpoint(virtual_hosted_url(endpoint_url, bucket))
            .with_virtual_hosted_style_request(true)
    } else {
        builder.with_endpoint(endpoint_url)
    };

    if endpoint_url.starts_with("http://") {
        builder = builder.with_allow_http(true);
    }

    builder
        .build()
        .map_err(|e| ControlError::object_storage(format!("failed to build S3 client for {bucket}: {e}")))
}
