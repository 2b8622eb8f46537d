use anyhow::Result;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

/// URL prefix under which artifacts are served.
pub const UPLOADS_ROUTE: &str = "/uploads";

/// Manages generated artifacts on local disk.
///
/// Each artifact is stored as a single flat file at `{dir}/{name}`.
/// Writes land in a `.part` file first and are renamed into place once
/// flushed, so a reader never sees a partially written artifact.
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub async fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Artifact directory: {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Public URL of a stored artifact.
    pub fn url_for(name: &str) -> String {
        format!("{}/{}", UPLOADS_ROUTE, name)
    }

    /// Durably write `data` under `name`.
    pub async fn write(&self, name: &str, data: &[u8]) -> Result<()> {
        let final_path = self.file_path(name);
        let part_path = self.file_path(&format!("{}.part", name));

        let result = async {
            let mut file = fs::File::create(&part_path).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
            fs::rename(&part_path, &final_path).await?;
            Ok::<_, std::io::Error>(())
        }
        .await;

        if let Err(e) = result {
            let _ = fs::remove_file(&part_path).await;
            return Err(anyhow::anyhow!("Failed to write artifact {}: {}", name, e));
        }
        Ok(())
    }

    /// Delete an artifact. Missing files are not an error.
    pub async fn delete(&self, name: &str) -> Result<()> {
        let path = self.file_path(name);
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted artifact {}", name);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Artifact {} already gone", name);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
