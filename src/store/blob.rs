use async_trait::async_trait;
use bytes::Bytes;
use futures_util::TryStreamExt;
use object_store::{
    aws::AmazonS3Builder,
    azure::MicrosoftAzureBuilder,
    local::LocalFileSystem,
    memory::InMemory,
    path::{Path as ObjectPath, PathPart},
    ObjectStore, PutMode, PutPayload,
};
use std::path::PathBuf;
use std::sync::Arc;

use super::{BlobStore, StoreError};
use crate::config::{ObjectBackend, ObjectStoreConfig};

const DEFAULT_LOCAL_ROOT: &str = "./data";

/// [`BlobStore`] over any `object_store` backend.
///
/// Keys are a single path segment, so an order id containing `/` can never
/// escape the container.
pub struct ObjectStoreBlobs {
    store: Arc<dyn ObjectStore>,
    prefix: Option<ObjectPath>,
}

impl ObjectStoreBlobs {
    pub fn with_object_store(store: Arc<dyn ObjectStore>, prefix: Option<ObjectPath>) -> Self {
        Self { store, prefix }
    }

    pub fn in_memory() -> Self {
        Self::with_object_store(Arc::new(InMemory::new()), None)
    }

    /// Build the backend named in `config`. For the local backend this also
    /// creates the container directory.
    pub fn from_config(config: &ObjectStoreConfig) -> Result<Self, StoreError> {
        let store: Arc<dyn ObjectStore> = match config.backend {
            ObjectBackend::Memory => Arc::new(InMemory::new()),
            ObjectBackend::Local => {
                let root = config.connection.as_deref().unwrap_or(DEFAULT_LOCAL_ROOT);
                let dir = PathBuf::from(root).join(&config.container);
                std::fs::create_dir_all(&dir)
                    .map_err(|e| StoreError::Config(format!("Failed to create {}: {}", dir.display(), e)))?;

                Arc::new(
                    LocalFileSystem::new_with_prefix(&dir)
                        .map_err(|e| StoreError::Config(format!("Failed to open local store: {}", e)))?,
                )
            }
            ObjectBackend::S3 => {
                let mut builder = AmazonS3Builder::new().with_bucket_name(&config.container);

                if let Some(ref endpoint) = config.connection {
                    builder = builder
                        .with_endpoint(endpoint)
                        .with_allow_http(endpoint.starts_with("http://"));
                }
                if let Some(ref region) = config.region {
                    builder = builder.with_region(region);
                }
                if let Some(ref access_key_id) = config.access_key_id {
                    builder = builder.with_access_key_id(access_key_id);
                }
                if let Some(ref secret_access_key) = config.secret_access_key {
                    builder = builder.with_secret_access_key(secret_access_key);
                }

                Arc::new(
                    builder
                        .build()
                        .map_err(|e| StoreError::Config(format!("Failed to build S3 store: {}", e)))?,
                )
            }
            ObjectBackend::Azure => {
                let account = config.connection.as_ref().ok_or_else(|| {
                    StoreError::Config("OBJECT_STORE_CONNECTION must name the storage account".to_string())
                })?;

                let mut builder = MicrosoftAzureBuilder::new()
                    .with_account(account)
                    .with_container_name(&config.container);

                if let Some(ref access_key) = config.secret_access_key {
                    builder = builder.with_access_key(access_key);
                }

                Arc::new(
                    builder
                        .build()
                        .map_err(|e| StoreError::Config(format!("Failed to build Azure store: {}", e)))?,
                )
            }
        };

        Ok(Self::with_object_store(store, None))
    }

    /// Probe the container with a listing; fails if it is missing or
    /// unreachable.
    pub async fn ensure_container(&self) -> Result<(), StoreError> {
        self.store
            .list_with_delimiter(self.prefix.as_ref())
            .await
            .map(|_| ())
            .map_err(|e| map_error("<container>", e))
    }

    /// Names of every object below the prefix.
    pub async fn keys(&self) -> Result<Vec<String>, StoreError> {
        let mut keys: Vec<String> = self
            .store
            .list(self.prefix.as_ref())
            .map_ok(|meta| meta.location.filename().unwrap_or_default().to_string())
            .try_collect()
            .await
            .map_err(|e| map_error("<list>", e))?;
        keys.sort();
        Ok(keys)
    }

    fn path(&self, key: &str) -> ObjectPath {
        let part = PathPart::from(key);
        match self.prefix {
            Some(ref prefix) => prefix.child(part),
            None => ObjectPath::from_iter([part]),
        }
    }
}

#[async_trait]
impl BlobStore for ObjectStoreBlobs {
    async fn put_object(&self, key: &str, body: Bytes, overwrite: bool) -> Result<(), StoreError> {
        let mode = if overwrite { PutMode::Overwrite } else { PutMode::Create };

        self.store
            .put_opts(&self.path(key), PutPayload::from(body), mode.into())
            .await
            .map_err(|e| map_error(key, e))?;

        tracing::debug!(key, overwrite, "Object written");
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        match self.store.get(&self.path(key)).await {
            Ok(result) => Ok(Some(result.bytes().await.map_err(|e| map_error(key, e))?)),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(map_error(key, e)),
        }
    }
}

fn map_error(key: &str, error: object_store::Error) -> StoreError {
    match error {
        object_store::Error::AlreadyExists { .. } => StoreError::AlreadyExists(key.to_string()),
        object_store::Error::NotSupported { .. }
        | object_store::Error::NotImplemented
        | object_store::Error::InvalidPath { .. } => StoreError::Rejected(error.to_string()),
        other => StoreError::Unavailable(other.to_string()),
    }
}
