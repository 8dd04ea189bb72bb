use std::path::{Path, PathBuf};

use async_trait::async_trait;

use cavastock_inventory::LedgerSnapshot;
use cavastock_inventory::snapshot::{self, SnapshotFormat};

use super::{RemoteStore, SyncError};

/// Mirrors each snapshot into a folder, typically one kept in step with cloud
/// storage by an external client (shared drive, mounted bucket).
#[derive(Debug, Clone)]
pub struct FolderRemote {
    dir: PathBuf,
    file_name: String,
}

impl FolderRemote {
    pub fn new(dir: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            file_name: file_name.into(),
        }
    }

    pub fn target(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }

    fn remote_err(path: &Path, err: impl std::fmt::Display) -> SyncError {
        SyncError::Remote(format!("{}: {err}", path.display()))
    }
}

#[async_trait]
impl RemoteStore for FolderRemote {
    async fn push(&self, snapshot: &LedgerSnapshot) -> Result<(), SyncError> {
        let body = snapshot::encode(snapshot.entries(), SnapshotFormat::JsonArray)
            .map_err(|e| SyncError::Remote(e.to_string()))?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Self::remote_err(&self.dir, e))?;

        let target = self.target();
        let tmp = self.dir.join(format!(".{}.partial", self.file_name));
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|e| Self::remote_err(&tmp, e))?;
        tokio::fs::rename(&tmp, &target)
            .await
            .map_err(|e| Self::remote_err(&target, e))?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.target().display().to_string()
    }
}
