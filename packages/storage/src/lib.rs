//! Persisted session storage for the worker pool.
//!
//! Goal:
//! - S3-compatible storage in production/staging
//! - On-disk storage for local dev
//! - In-memory storage for tests
//!
//! A thin wrapper around `object_store`, which already provides all three
//! backends. The whole deployment shares one JSON blob at a configurable key.

mod config;

use std::path::Path as FsPath;
use std::sync::Arc;

use attendant_core::{SessionState, SessionStore, StoreError, WorkerFuture};
use bytes::Bytes;
use object_store::ObjectStore;
use object_store::ObjectStoreExt;
use object_store::path::Path;

pub use config::{
    DEFAULT_SESSION_KEY, S3Config, StorageBackendConfig, StorageConfig, StorageKind,
};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid storage config: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("object_store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<StorageError> for StoreError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Json(e) => StoreError::Malformed(e.to_string()),
            other => StoreError::Backend(other.to_string()),
        }
    }
}

/// Session store backed by an object store.
#[derive(Clone)]
pub struct ObjectSessionStore {
    kind: StorageKind,
    store: Arc<dyn ObjectStore>,
    path: Path,
}

impl ObjectSessionStore {
    pub async fn new(cfg: StorageConfig) -> Result<Self, StorageError> {
        let (kind, store): (StorageKind, Arc<dyn ObjectStore>) = match cfg.backend {
            StorageBackendConfig::S3(s3) => (StorageKind::S3, Arc::new(build_s3(s3)?) as _),
            StorageBackendConfig::Filesystem { root } => {
                ensure_dir(&root)?;
                let fs = object_store::local::LocalFileSystem::new_with_prefix(&root)?;
                (StorageKind::Filesystem, Arc::new(fs) as _)
            }
            StorageBackendConfig::Memory => (
                StorageKind::Memory,
                Arc::new(object_store::memory::InMemory::new()) as _,
            ),
        };

        let path = object_path(cfg.prefix.as_deref(), &cfg.key)?;
        tracing::info!("Session store: {} at {}", kind.as_str(), path);

        Ok(Self { kind, store, path })
    }

    pub async fn from_env() -> Result<Self, StorageError> {
        Self::new(StorageConfig::from_env()?).await
    }

    pub fn kind(&self) -> StorageKind {
        self.kind
    }

    /// Read the blob; a missing object is `None`.
    pub async fn read(&self) -> Result<Option<SessionState>, StorageError> {
        let bytes = match self.store.get(&self.path).await {
            Ok(res) => res.bytes().await?,
            Err(object_store::Error::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let value: serde_json::Value = serde_json::from_slice(&bytes)?;
        Ok(Some(SessionState::new(value)))
    }

    pub async fn write(&self, state: &SessionState) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(state.as_value())?;
        self.store
            .put(&self.path, object_store::PutPayload::from(Bytes::from(bytes)))
            .await?;
        tracing::debug!("Saved session state to {}", self.path);
        Ok(())
    }

    /// Remove the blob, e.g. after the session was revoked.
    pub async fn clear(&self) -> Result<(), StorageError> {
        match self.store.delete(&self.path).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl SessionStore for ObjectSessionStore {
    fn load(&self) -> WorkerFuture<'_, Result<Option<SessionState>, StoreError>> {
        Box::pin(async move { Ok(self.read().await?) })
    }

    fn save<'a>(&'a self, state: &'a SessionState) -> WorkerFuture<'a, Result<(), StoreError>> {
        Box::pin(async move { Ok(self.write(state).await?) })
    }
}

fn object_path(prefix: Option<&str>, key: &str) -> Result<Path, StorageError> {
    let key = key.trim_matches('/');
    if key.is_empty() {
        return Err(StorageError::InvalidConfig(
            "session key must not be empty".to_string(),
        ));
    }

    let joined = match prefix.map(|p| p.trim_matches('/')) {
        Some(prefix) if !prefix.is_empty() => format!("{prefix}/{key}"),
        _ => key.to_string(),
    };
    Ok(Path::from(joined))
}

fn ensure_dir(root: &FsPath) -> Result<(), StorageError> {
    std::fs::create_dir_all(root)?;
    Ok(())
}

fn build_s3(cfg: S3Config) -> Result<object_store::aws::AmazonS3, StorageError> {
    let mut builder = object_store::aws::AmazonS3Builder::new()
        .with_bucket_name(cfg.bucket)
        .with_region(cfg.region)
        .with_virtual_hosted_style_request(cfg.virtual_hosted_style)
        .with_allow_http(cfg.allow_http);

    if let Some(endpoint) = cfg.endpoint {
        builder = builder.with_endpoint(endpoint);
    }
    if let Some(access_key_id) = cfg.access_key_id {
        builder = builder.with_access_key_id(access_key_id);
    }
    if let Some(secret_access_key) = cfg.secret_access_key {
        builder = builder.with_secret_access_key(secret_access_key);
    }
    if let Some(session_token) = cfg.session_token {
        builder = builder.with_token(session_token);
    }

    Ok(builder.build()?)
}
