// Local cache directory sink
//
// Writes go to a dot-prefixed temporary file that is renamed over the target, so a
// web server reading the directory never serves a half-written segment.

use super::{validate_name, HlsSink};
use async_trait::async_trait;
use bytes::Bytes;
use std::io::Result;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;

pub struct FileSink {
    base_path: PathBuf,
    label: String,
}

impl FileSink {
    #[must_use]
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        let base_path = base_path.into();
        Self {
            label: format!("file:{}", base_path.display()),
            base_path,
        }
    }

    /// Create the directory if needed.
    pub async fn create(base_path: impl Into<PathBuf>) -> Result<Self> {
        let sink = Self::new(base_path);
        fs::create_dir_all(&sink.base_path).await?;
        Ok(sink)
    }

    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn path_for(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.base_path.join(name))
    }
}

#[async_trait]
impl HlsSink for FileSink {
    fn label(&self) -> &str {
        &self.label
    }

    async fn put(&self, name: &str, data: Bytes) -> Result<()> {
        let target = self.path_for(name)?;
        let tmp = self.base_path.join(format!(".{name}.tmp"));
        let size = data.len();

        fs::write(&tmp, &data).await?;
        if let Err(e) = fs::rename(&tmp, &target).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e);
        }

        tracing::trace!("Wrote: {:?} ({} bytes)", target, size);
        Ok(())
    }

    async fn cleanup(&self, older_than: Duration) -> Result<usize> {
        if !fs::try_exists(&self.base_path).await.unwrap_or(false) {
            tracing::debug!("Cleanup base path does not exist: {:?}", self.base_path);
            return Ok(0);
        }

        let Some(cutoff) = SystemTime::now().checked_sub(older_than) else {
            return Ok(0);
        };
        let mut deleted = 0;
        let mut entries = fs::read_dir(&self.base_path).await?;

        while let Some(entry) = entries.next_entry().await? {
            let Ok(file_type) = entry.file_type().await else {
                continue;
            };
            // only segments; the playlist is always current
            let is_segment = entry.file_name().to_string_lossy().ends_with(".ts");
            if !file_type.is_file() || !is_segment {
                continue;
            }

            let path = entry.path();
            let modified = match fs::metadata(&path).await.and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(_) => continue,
            };
            if modified < cutoff && fs::remove_file(&path).await.is_ok() {
                deleted += 1;
                tracing::trace!("Deleted expired segment: {:?}", path);
            }
        }

        if deleted > 0 {
            tracing::debug!(
                deleted,
                "removed cached segments older than {:?}",
                older_than
            );
        }
        Ok(deleted)
    }
}
