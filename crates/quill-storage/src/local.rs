use anyhow::{Result, bail};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::ImageStore;

/// Local-filesystem image storage.
///
/// Files land flat in `{dir}/{filename}` and are served back under
/// `{public_prefix}/{filename}` by the static file layer.
pub struct LocalImageStore {
    dir: PathBuf,
    public_prefix: String,
}

impl LocalImageStore {
    pub async fn new(dir: PathBuf, public_prefix: &str) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Image storage directory: {}", dir.display());
        Ok(Self {
            dir,
            public_prefix: public_prefix.trim_end_matches('/').to_string(),
        })
    }

    fn disk_path(&self, filename: &str) -> Result<PathBuf> {
        // Filenames are server-generated, but refuse separators anyway so a
        // bad caller cannot escape the storage directory.
        if filename.is_empty() || filename.contains('/') || filename.contains('\\') {
            bail!("Invalid image filename: {:?}", filename);
        }
        Ok(self.dir.join(filename))
    }
}

#[async_trait]
impl ImageStore for LocalImageStore {
    async fn save(&self, filename: &str, data: &[u8]) -> Result<String> {
        let path = self.disk_path(filename)?;
        let mut file = fs::File::create(&path).await?;
        file.write_all(data).await?;
        file.flush().await?;
        Ok(format!("{}/{}", self.public_prefix, filename))
    }

    async fn delete(&self, public_path: &str) -> Result<()> {
        let filename = public_path
            .strip_prefix(&self.public_prefix)
            .map(|rest| rest.trim_start_matches('/'))
            .unwrap_or(public_path);
        let path = self.disk_path(filename)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted image {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Image {} already gone", path.display());
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store(dir: &tempfile::TempDir) -> LocalImageStore {
        LocalImageStore::new(dir.path().to_path_buf(), "/uploads")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn save_returns_public_path_and_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;

        let public = store.save("image-1.png", b"png-bytes").await.unwrap();
        assert_eq!(public, "/uploads/image-1.png");

        let on_disk = tokio::fs::read(dir.path().join("image-1.png")).await.unwrap();
        assert_eq!(on_disk, b"png-bytes");
    }

    #[tokio::test]
    async fn delete_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;

        let public = store.save("image-2.png", b"bytes").await.unwrap();
        store.delete(&public).await.unwrap();
        assert!(!dir.path().join("image-2.png").exists());
    }

    #[tokio::test]
    async fn delete_of_missing_file_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        store.delete("/uploads/never-existed.png").await.unwrap();
    }

    #[tokio::test]
    async fn path_separators_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        assert!(store.save("../escape.png", b"x").await.is_err());
    }
}
