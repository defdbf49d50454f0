//! Local-disk image storage for asset attachments.
//!
//! Stored files are addressed as `{public_base_url}/{generated name}`; the
//! rest of the system treats storage as an opaque service returning
//! `{url, filename}` pairs.

use crate::config::UploadConfig;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use upkeep_shared::AssetImage;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ImageStorage {
    root: PathBuf,
    public_base_url: String,
}

impl ImageStorage {
    pub fn new(config: &UploadConfig) -> Self {
        Self {
            root: PathBuf::from(&config.dir),
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Store one uploaded file and return its public address. The stored
    /// name is a uuid with the original extension to avoid collisions.
    pub async fn store(&self, original_name: &str, bytes: &[u8]) -> std::io::Result<AssetImage> {
        fs::create_dir_all(&self.root).await?;

        let extension = Path::new(original_name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("bin");
        let stored_name = format!("{}.{}", Uuid::new_v4(), extension);

        let path = self.root.join(&stored_name);
        let mut file = fs::File::create(&path).await?;
        file.write_all(bytes).await?;
        file.flush().await?;

        tracing::info!("Stored upload {} as {}", original_name, stored_name);

        Ok(AssetImage {
            url: format!("{}/{}", self.public_base_url, stored_name),
            filename: original_name.to_string(),
        })
    }

    /// Remove a stored file by its public URL. Unknown URLs are a no-op.
    pub async fn remove_by_url(&self, url: &str) -> std::io::Result<()> {
        let Some(stored_name) = url.rsplit('/').next() else {
            return Ok(());
        };
        // Refuse anything that is not a bare generated name.
        if stored_name.contains("..") || stored_name.contains('/') {
            return Ok(());
        }
        let path = self.root.join(stored_name);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UploadConfig;

    fn storage_in(dir: &Path) -> ImageStorage {
        ImageStorage::new(&UploadConfig {
            dir: dir.to_string_lossy().to_string(),
            public_base_url: "/uploads/".to_string(),
        })
    }

    #[tokio::test]
    async fn store_and_remove_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = storage_in(tmp.path());

        let image = storage.store("boiler.jpg", b"jpegdata").await.unwrap();
        assert_eq!(image.filename, "boiler.jpg");
        assert!(image.url.starts_with("/uploads/"));
        assert!(image.url.ends_with(".jpg"));

        let stored_name = image.url.rsplit('/').next().unwrap();
        assert!(tmp.path().join(stored_name).exists());

        storage.remove_by_url(&image.url).await.unwrap();
        assert!(!tmp.path().join(stored_name).exists());
    }

    #[tokio::test]
    async fn remove_unknown_url_is_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = storage_in(tmp.path());
        storage.remove_by_url("/uploads/missing.png").await.unwrap();
    }
}
