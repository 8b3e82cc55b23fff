//! Blob store client over a per-environment media directory
//!
//! Objects live under relative keys (`audio/{id}/{filename}`); the promoter
//! mirrors that exact layout into the target environment's store. Keys are
//! contained to the store root, and per-object copies are idempotent so a
//! failed promotion can simply be re-run.

use crate::{Error, Result};
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use walkdir::WalkDir;

/// Filesystem-backed object store for one environment's media area
#[derive(Clone)]
pub struct BlobStore {
    root: PathBuf,
    public_base_url: String,
    environment: String,
}

impl BlobStore {
    /// Open a blob area rooted at `root`, creating the directory if missing
    pub fn new(root: PathBuf, public_base_url: &str, environment: &str) -> Result<Self> {
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            environment: environment.to_string(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Canonical public locator for a key in this environment
    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }

    /// Inverse of [`public_url`]: recover the key from a locator this store
    /// issued, or `None` if the URL belongs elsewhere
    pub fn key_for_url(&self, url: &str) -> Option<String> {
        url.strip_prefix(&self.public_base_url)
            .map(|rest| rest.trim_start_matches('/').to_string())
            .filter(|key| !key.is_empty())
    }

    /// Map a key onto the local path, rejecting traversal outside the root
    pub fn path(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() {
            return Err(Error::Blob("empty blob key".to_string()));
        }
        let relative = Path::new(key);
        if relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(Error::Blob(format!("invalid blob key: {}", key)));
        }
        Ok(self.root.join(relative))
    }

    /// Write an object, creating parent directories as needed
    pub async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(())
    }

    pub async fn read(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("blob {}", key)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Read up to `n` bytes of the object head (the ingest security scan
    /// window)
    pub async fn read_head(&self, key: &str, n: usize) -> Result<Vec<u8>> {
        let path = self.path(key)?;
        let file = match tokio::fs::File::open(&path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(format!("blob {}", key)));
            }
            Err(e) => return Err(e.into()),
        };
        let mut buf = vec![0u8; n];
        let mut reader = file.take(n as u64);
        let mut filled = 0;
        loop {
            let read = reader.read(&mut buf[filled..]).await?;
            if read == 0 {
                break;
            }
            filled += read;
        }
        buf.truncate(filled);
        Ok(buf)
    }

    /// HEAD-equivalent existence check
    pub async fn exists(&self, key: &str) -> bool {
        match self.path(key) {
            Ok(path) => tokio::fs::metadata(&path)
                .await
                .map(|m| m.is_file())
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    pub async fn size(&self, key: &str) -> Result<u64> {
        let path = self.path(key)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(meta.len()),
            Ok(_) => Err(Error::Blob(format!("{} is not an object", key))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("blob {}", key)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// List object keys under a prefix, sorted for deterministic iteration.
    /// A missing prefix directory is an empty listing, not an error.
    pub fn list_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let base = self.path(prefix)?;
        if !base.exists() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        for entry in WalkDir::new(&base).follow_links(false) {
            let entry = entry.map_err(|e| Error::Blob(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&self.root)
                .map_err(|e| Error::Blob(e.to_string()))?;
            // Normalize separators so keys are portable
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            keys.push(key);
        }
        keys.sort();
        Ok(keys)
    }

    /// Copy one object into another store under the same key. Overwrites any
    /// existing target object, which makes retried promotions safe.
    pub async fn copy_to(&self, target: &BlobStore, key: &str) -> Result<u64> {
        let source_path = self.path(key)?;
        let target_path = target.path(key)?;
        if let Some(parent) = target_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::Blob(format!("copy {} to {}: {}", key, target.environment, e))
            })?;
        }
        tokio::fs::copy(&source_path, &target_path)
            .await
            .map_err(|e| Error::Blob(format!("copy {} to {}: {}", key, target.environment, e)))
    }

    /// Remove one object (used to clear processed uploads)
    pub async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> BlobStore {
        BlobStore::new(
            dir.path().join("media"),
            "https://media.test.example",
            "dev",
        )
        .unwrap()
    }

    #[tokio::test]
    async fn put_read_exists_delete() {
        let dir = TempDir::new().unwrap();
        let blobs = store(&dir);

        let key = "audio/abc/track.mp3";
        assert!(!blobs.exists(key).await);

        blobs.put(key, b"audio-bytes").await.unwrap();
        assert!(blobs.exists(key).await);
        assert_eq!(blobs.read(key).await.unwrap(), b"audio-bytes");
        assert_eq!(blobs.size(key).await.unwrap(), 11);

        blobs.delete(key).await.unwrap();
        assert!(!blobs.exists(key).await);
        assert!(matches!(
            blobs.read(key).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn head_read_is_bounded() {
        let dir = TempDir::new().unwrap();
        let blobs = store(&dir);

        blobs.put("audio/a/long.mp3", &[7u8; 4096]).await.unwrap();
        let head = blobs.read_head("audio/a/long.mp3", 1024).await.unwrap();
        assert_eq!(head.len(), 1024);

        blobs.put("audio/a/short.mp3", &[7u8; 16]).await.unwrap();
        let head = blobs.read_head("audio/a/short.mp3", 1024).await.unwrap();
        assert_eq!(head.len(), 16);
    }

    #[tokio::test]
    async fn traversal_keys_are_rejected() {
        let dir = TempDir::new().unwrap();
        let blobs = store(&dir);

        assert!(blobs.path("../outside").is_err());
        assert!(blobs.path("/etc/passwd").is_err());
        assert!(blobs.path("").is_err());
        assert!(blobs.put("audio/../../x", b"nope").await.is_err());
    }

    #[tokio::test]
    async fn prefix_listing_is_sorted_and_scoped() {
        let dir = TempDir::new().unwrap();
        let blobs = store(&dir);

        blobs.put("audio/t1/b.mp3", b"b").await.unwrap();
        blobs.put("audio/t1/a.jpg", b"a").await.unwrap();
        blobs.put("audio/t2/other.mp3", b"x").await.unwrap();

        let keys = blobs.list_prefix("audio/t1/").unwrap();
        assert_eq!(keys, vec!["audio/t1/a.jpg", "audio/t1/b.mp3"]);

        assert!(blobs.list_prefix("audio/none/").unwrap().is_empty());
    }

    #[tokio::test]
    async fn copy_to_mirrors_key_and_overwrites() {
        let dir = TempDir::new().unwrap();
        let source = store(&dir);
        let target = BlobStore::new(
            dir.path().join("prod-media"),
            "https://media.example",
            "prod",
        )
        .unwrap();

        source.put("audio/t/track.mp3", b"v1").await.unwrap();
        let copied = source.copy_to(&target, "audio/t/track.mp3").await.unwrap();
        assert_eq!(copied, 2);
        assert_eq!(target.read("audio/t/track.mp3").await.unwrap(), b"v1");

        // Re-copy after a source change converges the target
        source.put("audio/t/track.mp3", b"v2-longer").await.unwrap();
        source.copy_to(&target, "audio/t/track.mp3").await.unwrap();
        assert_eq!(target.read("audio/t/track.mp3").await.unwrap(), b"v2-longer");
    }

    #[test]
    fn url_mapping_roundtrip() {
        let dir = TempDir::new().unwrap();
        let blobs = store(&dir);

        let url = blobs.public_url("audio/t/track.mp3");
        assert_eq!(url, "https://media.test.example/audio/t/track.mp3");
        assert_eq!(
            blobs.key_for_url(&url).as_deref(),
            Some("audio/t/track.mp3")
        );
        assert_eq!(blobs.key_for_url("https://elsewhere/a.mp3"), None);
    }
}
