/// Staging of uploaded files
///
/// Every upload lives at a unique path under the upload directory and is
/// removed when its [`UploadGuard`] is dropped, whether processing succeeded
/// or not.

use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::{PipelineError, Result};

#[derive(Debug)]
pub struct UploadGuard {
    path: PathBuf,
    display_name: String,
    removed: bool,
}

impl UploadGuard {
    /// Reserve a path for `display_name` inside `upload_dir`
    ///
    /// Only the final path component of the name is kept and a random
    /// prefix avoids clashes between uploads of the same name.
    pub fn reserve(upload_dir: &Path, display_name: &str) -> Result<Self> {
        let file_name = Path::new(display_name.trim())
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
            .ok_or(PipelineError::MissingFileName)?;

        Ok(Self {
            path: upload_dir.join(format!("{}-{}", Uuid::new_v4().simple(), file_name)),
            display_name: file_name.to_string(),
            removed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Remove the file without blocking the runtime
    pub async fn remove(mut self) {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => log::info!("File cleaned up: {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Failed to remove {}: {}", self.path.display(), e),
        }
        self.removed = true;
    }
}

/// Fallback for paths that skip [`UploadGuard::remove`]; uploads are small
/// enough that a blocking unlink on a worker thread is acceptable
impl Drop for UploadGuard {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => log::info!("File cleaned up: {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Failed to remove {}: {}", self.path.display(), e),
        }
    }
}

/// Create the upload directory if it does not exist
pub async fn ensure_upload_dir(upload_dir: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(upload_dir).await?;
    log::info!("Upload directory ready: {}", upload_dir.display());
    Ok(())
}
