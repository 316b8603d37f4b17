use std::path::{Path, PathBuf};

use crate::error::AppError;

/// Local-disk storage for uploaded event images. Keys are opaque file names;
/// the files are served statically under `/uploads/`.
#[derive(Clone)]
pub struct LocalStorage {
    upload_dir: PathBuf,
}

impl LocalStorage {
    pub fn new(upload_dir: &str) -> Self {
        Self {
            upload_dir: PathBuf::from(upload_dir),
        }
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub async fn put(&self, key: &str, data: &[u8]) -> Result<(), AppError> {
        let path = self.upload_dir.join(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Internal(format!("Failed to create directory: {e}")))?;
        }
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to write file: {e}")))?;
        Ok(())
    }

    /// Best-effort: a missing file is not an error.
    pub async fn delete(&self, key: &str) {
        let path = self.upload_dir.join(key);
        let _ = tokio::fs::remove_file(&path).await;
    }

    pub fn public_url(&self, key: &str) -> String {
        format!("/uploads/{key}")
    }
}
