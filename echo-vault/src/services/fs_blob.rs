//! Filesystem Blob Store
//!
//! Objects live under `<root>/blobs/<path>` and are served publicly by the
//! HTTP layer at `/blobs/<path>`.

use async_trait::async_trait;
use bytes::Bytes;
use echo_common::{Error, Result};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

use super::BlobStore;

#[derive(Debug, Clone)]
pub struct FsBlobStore {
    dir: PathBuf,
    base_url: String,
}

impl FsBlobStore {
    /// `base_url` is the public origin, e.g. `http://127.0.0.1:5740`
    pub fn new(dir: impl Into<PathBuf>, base_url: &str) -> Self {
        Self {
            dir: dir.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Map an object path to a file below the blob directory
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        if path.is_empty() {
            return Err(Error::InvalidInput("Empty blob path".to_string()));
        }
        for component in relative.components() {
            match component {
                Component::Normal(_) => {}
                _ => {
                    return Err(Error::InvalidInput(format!("Invalid blob path: {}", path)));
                }
            }
        }
        Ok(self.dir.join(relative))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn upload(&self, path: &str, bytes: Bytes, content_type: &str) -> Result<()> {
        let target = self.resolve(path)?;
        if target.exists() {
            return Err(Error::Upload(format!("Object already exists: {}", path)));
        }
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Upload(format!("Failed to create {}: {}", parent.display(), e)))?;
        }

        tokio::fs::write(&target, &bytes)
            .await
            .map_err(|e| Error::Upload(format!("Failed to write {}: {}", path, e)))?;

        debug!("Stored blob {} ({} bytes, {})", path, bytes.len(), content_type);
        Ok(())
    }

    async fn download(&self, path: &str) -> Result<Bytes> {
        let target = self.resolve(path)?;
        match tokio::fs::read(&target).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("Blob {}", path)))
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/blobs/{}", self.base_url, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_upload_download_and_url() {
        let dir = TempDir::new().unwrap();
        let store = FsBlobStore::new(dir.path(), "http://localhost:5740/");

        store
            .upload("user/clip.wav", Bytes::from_static(b"RIFF"), "audio/wav")
            .await
            .unwrap();
        assert!(dir.path().join("user").join("clip.wav").exists());
        assert_eq!(store.download("user/clip.wav").await.unwrap(), Bytes::from_static(b"RIFF"));

        let url = store.public_url("user/clip.wav");
        assert_eq!(url, "http://localhost:5740/blobs/user/clip.wav");
        assert_eq!(store.path_for_url(&url).as_deref(), Some("user/clip.wav"));
        assert_eq!(store.path_for_url("http://elsewhere/x.wav"), None);
    }

    #[tokio::test]
    async fn test_rejects_escaping_paths() {
        let dir = TempDir::new().unwrap();
        let store = FsBlobStore::new(dir.path(), "http://localhost");

        for bad in ["../x.wav", "/etc/passwd", "a/../../b", ""] {
            let result = store.upload(bad, Bytes::from_static(b"x"), "audio/wav").await;
            assert!(matches!(result, Err(Error::InvalidInput(_))), "{} accepted", bad);
        }
    }

    #[tokio::test]
    async fn test_no_overwrite() {
        let dir = TempDir::new().unwrap();
        let store = FsBlobStore::new(dir.path(), "http://localhost");
        store.upload("a.wav", Bytes::from_static(b"1"), "audio/wav").await.unwrap();
        let second = store.upload("a.wav", Bytes::from_static(b"2"), "audio/wav").await;
        assert!(matches!(second, Err(Error::Upload(_))));
    }

    #[tokio::test]
    async fn test_missing_blob() {
        let dir = TempDir::new().unwrap();
        let store = FsBlobStore::new(dir.path(), "http://localhost");
        assert!(matches!(store.download("nope.wav").await, Err(Error::NotFound(_))));
    }
}
