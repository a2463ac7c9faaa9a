//! src/services/object_store.rs
//!
//! Object store gateway for uploaded media. The local backend keeps
//! payloads on disk sharded beneath `base_path/{shard}/{shard}/{name}` and
//! publishes them under a configured content-delivery base path.

use async_trait::async_trait;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    pin::Pin,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::{AsyncRead, AsyncWrite},
};
use tracing::debug;
use uuid::Uuid;

const MAX_OBJECT_NAME_LEN: usize = 1024;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("object `{0}` not found")]
    NotFound(String),
    #[error("invalid object name `{0}`")]
    InvalidName(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type ObjectResult<T> = Result<T, ObjectStoreError>;

/// Destination for an object's bytes.
pub type ObjectSink = Pin<Box<dyn AsyncWrite + Send>>;

/// An opened object ready to stream out.
pub struct StoredObject {
    pub name: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub reader: Pin<Box<dyn AsyncRead + Send>>,
}

/// Capability interface over the blob store holding uploaded media.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Open a sink that writes the named object. Bytes become visible as
    /// they are written; an abandoned sink leaves a partial object behind.
    async fn writer(&self, name: &str) -> ObjectResult<ObjectSink>;

    /// Open the named object for reading, or `NotFound`.
    async fn open(&self, name: &str) -> ObjectResult<StoredObject>;

    async fn exists(&self, name: &str) -> ObjectResult<bool>;

    /// Public URL the object is served under.
    fn url(&self, name: &str) -> String;

    /// Write/read/delete round trip used by readiness checks.
    async fn probe(&self) -> ObjectResult<()>;
}

/// Filesystem-backed object store.
#[derive(Clone, Debug)]
pub struct LocalObjectStore {
    /// Base directory on disk where object payloads are stored.
    base_path: PathBuf,

    /// Public prefix, e.g. `https://cdn.example.com/media/`.
    cdn_base_url: String,
}

impl LocalObjectStore {
    pub fn new(base_path: impl Into<PathBuf>, cdn_base_url: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            cdn_base_url: cdn_base_url.into(),
        }
    }

    /// Reject names that are empty, oversized, or could escape the shard
    /// directory.
    fn ensure_name_safe(name: &str) -> ObjectResult<()> {
        let invalid = name.is_empty()
            || name.len() > MAX_OBJECT_NAME_LEN
            || name.contains('/')
            || name == "."
            || name == ".."
            || name
                .bytes()
                .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0');
        if invalid {
            return Err(ObjectStoreError::InvalidName(name.to_string()));
        }
        Ok(())
    }

    /// Two-level shard identifiers: the first two bytes of MD5(name) as
    /// lowercase hex.
    fn object_shards(name: &str) -> (String, String) {
        let digest = md5::compute(name);
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn object_path(&self, name: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(name);
        let mut path = self.base_path.clone();
        path.push(shard_a);
        path.push(shard_b);
        path.push(name);
        path
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn writer(&self, name: &str) -> ObjectResult<ObjectSink> {
        Self::ensure_name_safe(name)?;
        let path = self.object_path(name);
        let parent = path.parent().map(Path::to_path_buf).ok_or_else(|| {
            ObjectStoreError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let file = File::create(&path).await?;
        debug!(object_name = name, path = %path.display(), "opened object writer");
        Ok(Box::pin(file))
    }

    async fn open(&self, name: &str) -> ObjectResult<StoredObject> {
        Self::ensure_name_safe(name)?;
        let path = self.object_path(name);
        let file = File::open(&path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                ObjectStoreError::NotFound(name.to_string())
            } else {
                ObjectStoreError::Io(err)
            }
        })?;
        let size_bytes = file.metadata().await?.len();
        let content_type = mime_guess::from_path(name)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        Ok(StoredObject {
            name: name.to_string(),
            content_type,
            size_bytes,
            reader: Box::pin(file),
        })
    }

    async fn exists(&self, name: &str) -> ObjectResult<bool> {
        Self::ensure_name_safe(name)?;
        Ok(fs::try_exists(self.object_path(name)).await?)
    }

    fn url(&self, name: &str) -> String {
        if self.cdn_base_url.ends_with('/') {
            format!("{}{}", self.cdn_base_url, name)
        } else {
            format!("{}/{}", self.cdn_base_url, name)
        }
    }

    async fn probe(&self) -> ObjectResult<()> {
        fs::create_dir_all(&self.base_path).await?;
        let tmp_path = self.base_path.join(format!(".readyz-{}", Uuid::new_v4()));
        fs::write(&tmp_path, b"readyz").await?;
        let read = fs::read(&tmp_path).await;
        let removed = fs::remove_file(&tmp_path).await;
        if read? != b"readyz" {
            return Err(ObjectStoreError::Io(io::Error::new(
                ErrorKind::InvalidData,
                "file content mismatch",
            )));
        }
        removed?;
        Ok(())
    }
}
