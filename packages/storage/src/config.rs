//! Backend selection for the session store.

use std::path::PathBuf;

use crate::StorageError;

/// Object key used when `SESSION_STORE_KEY` is unset.
pub const DEFAULT_SESSION_KEY: &str = "session/state.json";

const DEFAULT_FS_ROOT: &str = "./data/session";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    S3,
    Filesystem,
    Memory,
}

impl StorageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageKind::S3 => "s3",
            StorageKind::Filesystem => "filesystem",
            StorageKind::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub allow_http: bool,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    pub virtual_hosted_style: bool,
}

#[derive(Debug, Clone)]
pub enum StorageBackendConfig {
    S3(S3Config),
    Filesystem { root: PathBuf },
    Memory,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackendConfig,
    /// Optional prefix applied to every object key.
    pub prefix: Option<String>,
    /// Key of the session blob.
    pub key: String,
}

impl StorageConfig {
    fn with_backend(backend: StorageBackendConfig) -> Self {
        Self {
            backend,
            prefix: None,
            key: DEFAULT_SESSION_KEY.to_string(),
        }
    }

    pub fn memory() -> Self {
        Self::with_backend(StorageBackendConfig::Memory)
    }

    pub fn filesystem(root: impl Into<PathBuf>) -> Self {
        Self::with_backend(StorageBackendConfig::Filesystem { root: root.into() })
    }

    pub fn s3(cfg: S3Config) -> Self {
        Self::with_backend(StorageBackendConfig::S3(cfg))
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = non_empty(prefix.into());
        self
    }

    /// Build a config from environment variables.
    ///
    /// - `SESSION_STORE_BACKEND`: `memory`, `filesystem` (default) or `s3`
    /// - `SESSION_STORE_ROOT`: filesystem root (default: `./data/session`)
    /// - `SESSION_STORE_KEY`: object key (default: `session/state.json`)
    /// - `SESSION_STORE_PREFIX`: optional key prefix
    ///
    /// The `s3` backend additionally reads `S3_BUCKET` (required), `AWS_REGION`
    /// (default `us-east-1`), `S3_ENDPOINT`, `S3_ALLOW_HTTP` (defaults to true
    /// for `http://` endpoints), `S3_VIRTUAL_HOSTED_STYLE` and the usual AWS
    /// credential variables.
    pub fn from_env() -> Result<Self, StorageError> {
        let mut cfg = match env("SESSION_STORE_BACKEND").as_deref() {
            Some("s3") => Self::s3(read_s3_config()?),
            Some("memory") | Some("mem") => Self::memory(),
            Some("filesystem") | Some("fs") | None => Self::filesystem(
                env("SESSION_STORE_ROOT").unwrap_or_else(|| DEFAULT_FS_ROOT.to_string()),
            ),
            Some(other) => {
                return Err(StorageError::InvalidConfig(format!(
                    "unsupported SESSION_STORE_BACKEND={other} (expected s3|filesystem|memory)"
                )));
            }
        };

        if let Some(key) = env("SESSION_STORE_KEY") {
            cfg.key = key;
        }
        cfg.prefix = env("SESSION_STORE_PREFIX");
        Ok(cfg)
    }
}

fn env(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(non_empty)
}

pub(crate) fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_bool(name: &str, raw: Option<String>) -> Result<Option<bool>, StorageError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" => Ok(Some(true)),
        "0" | "false" | "no" | "n" => Ok(Some(false)),
        _ => Err(StorageError::InvalidConfig(format!(
            "invalid boolean for {name}={raw} (expected true/false)"
        ))),
    }
}

fn read_s3_config() -> Result<S3Config, StorageError> {
    let bucket = env("S3_BUCKET").ok_or_else(|| {
        StorageError::InvalidConfig("S3_BUCKET is required for the s3 backend".into())
    })?;
    let endpoint = env("S3_ENDPOINT");
    let allow_http = parse_bool("S3_ALLOW_HTTP", env("S3_ALLOW_HTTP"))?.unwrap_or_else(|| {
        endpoint
            .as_deref()
            .is_some_and(|e| e.to_ascii_lowercase().starts_with("http://"))
    });

    Ok(S3Config {
        bucket,
        region: env("AWS_REGION").unwrap_or_else(|| "us-east-1".to_string()),
        endpoint,
        allow_http,
        access_key_id: env("AWS_ACCESS_KEY_ID"),
        secret_access_key: env("AWS_SECRET_ACCESS_KEY"),
        session_token: env("AWS_SESSION_TOKEN"),
        virtual_hosted_style: parse_bool("S3_VIRTUAL_HOSTED_STYLE", env("S3_VIRTUAL_HOSTED_STYLE"))?
            .unwrap_or(false),
    })
}
