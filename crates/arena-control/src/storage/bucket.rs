//! Bucket management.
//!
//! Object listing and transfers go through `object_store`; creating,
//! deleting and inspecting buckets needs the bucket-level S3 API, which
//! [`S3Buckets`] provides. [`MemoryBuckets`] stands in for it in tests.

use std::collections::{BTreeMap, HashSet};
use std::sync::RwLock;

use arena_credentials::Credential;
use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use futures::{StreamExt, TryStreamExt};
use object_store::ObjectStore;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::endpoint::AddressingStyle;
use crate::error::{ControlError, ControlResult};

/// What a `HEAD` on a bucket says about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketStatus {
    /// The bucket exists and is accessible.
    Exists,
    /// The bucket exists but the caller may not access it.
    Forbidden,
    /// No such bucket.
    Missing,
}

/// Outcome of [`ensure_bucket`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// The bucket was already there.
    Existed,
    /// The bucket exists but access is denied; benchmarks will likely fail.
    Forbidden,
    /// The bucket was created.
    Created,
}

/// Bucket-level object storage operations.
#[async_trait]
pub trait BucketApi: Send + Sync {
    /// Names of all buckets visible to the caller.
    async fn list_buckets(&self) -> ControlResult<Vec<String>>;

    /// Check whether a bucket exists.
    async fn bucket_status(&self, bucket: &str) -> ControlResult<BucketStatus>;

    /// Create a bucket in `region`.
    ///
    /// Returns false if the bucket already existed.
    async fn create_bucket(&self, bucket: &str, region: &str) -> ControlResult<bool>;

    /// Delete an empty bucket.
    async fn delete_bucket(&self, bucket: &str) -> ControlResult<()>;

    /// Replace the bucket policy.
    async fn put_bucket_policy(&self, bucket: &str, policy: &Value) -> ControlResult<()>;

    /// The bucket policy, if one is set.
    async fn get_bucket_policy(&self, bucket: &str) -> ControlResult<Option<Value>>;
}

/// [`BucketApi`] over the S3 API.
#[derive(Debug, Clone)]
pub struct S3Buckets {
    client: aws_sdk_s3::Client,
}

impl S3Buckets {
    /// Build a client for `endpoint_url` signed with `credential`.
    #[must_use]
    pub fn new(endpoint_url: &str, region: &str, style: AddressingStyle, credential: &Credential) -> Self {
        let credentials = Credentials::new(
            credential.access_key_id(),
            credential.secret_access_key().expose(),
            None,
            None,
            "arena",
        );
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region.to_owned()))
            .endpoint_url(endpoint_url)
            .credentials_provider(credentials)
            .force_path_style(style == AddressingStyle::Path)
            .build();

        Self {
            client: aws_sdk_s3::Client::from_conf(config),
        }
    }
}

fn s3_error(action: &str, bucket: &str, e: impl std::error::Error) -> ControlError {
    ControlError::object_storage(format!(
        "failed to {action} {bucket}: {}",
        DisplayErrorContext(e)
    ))
}

#[async_trait]
impl BucketApi for S3Buckets {
    async fn list_buckets(&self) -> ControlResult<Vec<String>> {
        let output = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(|e| s3_error("list", "buckets", e))?;

        Ok(output
            .buckets()
            .iter()
            .filter_map(|b| b.name())
            .map(ToOwned::to_owned)
            .collect())
    }

    async fn bucket_status(&self, bucket: &str) -> ControlResult<BucketStatus> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(BucketStatus::Exists),
            Err(e) => match e.raw_response().map(|r| r.status().as_u16()) {
                Some(404) => Ok(BucketStatus::Missing),
                Some(403) => Ok(BucketStatus::Forbidden),
                _ => Err(s3_error("check bucket", bucket, e)),
            },
        }
    }

    async fn create_bucket(&self, bucket: &str, region: &str) -> ControlResult<bool> {
        let configuration = CreateBucketConfiguration::builder()
            .location_constraint(BucketLocationConstraint::from(region))
            .build();

        match self
            .client
            .create_bucket()
            .bucket(bucket)
            .create_bucket_configuration(configuration)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e)
                if e.as_service_error().is_some_and(|s| {
                    s.is_bucket_already_exists() || s.is_bucket_already_owned_by_you()
                }) =>
            {
                Ok(false)
            }
            Err(e) => Err(s3_error("create bucket", bucket, e)),
        }
    }

    async fn delete_bucket(&self, bucket: &str) -> ControlResult<()> {
        self.client
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| s3_error("delete bucket", bucket, e))?;
        Ok(())
    }

    async fn put_bucket_policy(&self, bucket: &str, policy: &Value) -> ControlResult<()> {
        self.client
            .put_bucket_policy()
            .bucket(bucket)
            .policy(policy.to_string())
            .send()
            .await
            .map_err(|e| s3_error("put policy of", bucket, e))?;
        Ok(())
    }

    async fn get_bucket_policy(&self, bucket: &str) -> ControlResult<Option<Value>> {
        let output = match self.client.get_bucket_policy().bucket(bucket).send().await {
            Ok(output) => output,
            Err(e) if e.raw_response().is_some_and(|r| r.status().as_u16() == 404) => return Ok(None),
            Err(e) => return Err(s3_error("get policy of", bucket, e)),
        };

        output
            .policy()
            .map(serde_json::from_str::<Value>)
            .transpose()
            .map_err(|e| ControlError::object_storage(format!("policy of {bucket} is not JSON: {e}")))
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    buckets: BTreeMap<String, Option<Value>>,
    forbidden: HashSet<String>,
}

/// Buckets held in memory.
///
/// Buckets marked forbidden report [`BucketStatus::Forbidden`] and reject
/// every other call.
#[derive(Debug, Default)]
pub struct MemoryBuckets {
    state: RwLock<MemoryState>,
}

impl MemoryBuckets {
    /// Mark a bucket as existing but inaccessible.
    pub fn forbid(&self, bucket: &str) -> ControlResult<()> {
        self.write()?.forbidden.insert(bucket.to_owned());
        Ok(())
    }

    fn read(&self) -> ControlResult<std::sync::RwLockReadGuard<'_, MemoryState>> {
        self.state
            .read()
            .map_err(|_| ControlError::internal("lock poisoned"))
    }

    fn write(&self) -> ControlResult<std::sync::RwLockWriteGuard<'_, MemoryState>> {
        self.state
            .write()
            .map_err(|_| ControlError::internal("lock poisoned"))
    }
}

fn check_access(state: &MemoryState, bucket: &str) -> ControlResult<()> {
    if state.forbidden.contains(bucket) {
        return Err(ControlError::object_storage(format!("access to {bucket} denied")));
    }
    if !state.buckets.contains_key(bucket) {
        return Err(ControlError::object_storage(format!("no such bucket {bucket}")));
    }
    Ok(())
}

#[async_trait]
impl BucketApi for MemoryBuckets {
    async fn list_buckets(&self) -> ControlResult<Vec<String>> {
        Ok(self.read()?.buckets.keys().cloned().collect())
    }

    async fn bucket_status(&self, bucket: &str) -> ControlResult<BucketStatus> {
        let state = self.read()?;
        Ok(if state.forbidden.contains(bucket) {
            BucketStatus::Forbidden
        } else if state.buckets.contains_key(bucket) {
            BucketStatus::Exists
        } else {
            BucketStatus::Missing
        })
    }

    async fn create_bucket(&self, bucket: &str, _region: &str) -> ControlResult<bool> {
        let mut state = self.write()?;
        if state.buckets.contains_key(bucket) {
            return Ok(false);
        }
        state.buckets.insert(bucket.to_owned(), None);
        Ok(true)
    }

    async fn delete_bucket(&self, bucket: &str) -> ControlResult<()> {
        let mut state = self.write()?;
        check_access(&state, bucket)?;
        state.buckets.remove(bucket);
        Ok(())
    }

    async fn put_bucket_policy(&self, bucket: &str, policy: &Value) -> ControlResult<()> {
        let mut state = self.write()?;
        check_access(&state, bucket)?;
        state.buckets.insert(bucket.to_owned(), Some(policy.clone()));
        Ok(())
    }

    async fn get_bucket_policy(&self, bucket: &str) -> ControlResult<Option<Value>> {
        let state = self.read()?;
        check_access(&state, bucket)?;
        Ok(state.buckets.get(bucket).cloned().flatten())
    }
}

/// Make sure `bucket` exists, creating it in `region` if needed.
///
/// A bucket that exists but denies access is reported, not created.
pub async fn ensure_bucket(api: &dyn BucketApi, bucket: &str, region: &str) -> ControlResult<EnsureOutcome> {
    match api.bucket_status(bucket).await? {
        BucketStatus::Exists => {
            debug!(bucket, "bucket exists");
            Ok(EnsureOutcome::Existed)
        }
        BucketStatus::Forbidden => {
            warn!(bucket, "bucket exists but access is denied, check permissions");
            Ok(EnsureOutcome::Forbidden)
        }
        BucketStatus::Missing => {
            if api.create_bucket(bucket, region).await? {
                info!(bucket, region, "created bucket");
                Ok(EnsureOutcome::Created)
            } else {
                Ok(EnsureOutcome::Existed)
            }
        }
    }
}

/// Delete every object in the store.
///
/// Individual delete failures are logged and skipped. Returns the number of
/// objects deleted.
pub async fn empty_bucket(store: &dyn ObjectStore) -> ControlResult<u64> {
    let locations = store
        .list(None)
        .map_ok(|meta| meta.location)
        .boxed();
    let mut results = store.delete_stream(locations);

    let mut deleted = 0_u64;
    let mut failed = 0_u64;
    while let Some(result) = results.next().await {
        match result {
            Ok(path) => {
                debug!(key = %path, "deleted");
                deleted += 1;
            }
            Err(e) => {
                warn!(error = %e, "failed to delete object");
                failed += 1;
            }
        }
    }

    if failed > 0 {
        warn!(deleted, failed, "some objects could not be deleted");
    }
    info!(deleted, "emptied bucket");
    Ok(deleted)
}
