use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use cavastock_inventory::LedgerSnapshot;
use cavastock_inventory::snapshot::{self, SnapshotFormat};

use super::{SavedLedger, SnapshotStore, StoreError};

/// Snapshot kept in a single JSON document on local disk.
///
/// Saves go to a sibling temp file which is then renamed over the target, so a
/// crash mid-write leaves the previous snapshot intact. The ledger version is
/// kept next to it in `<file>.version`; the document itself stays a plain
/// entry sequence.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    format: SnapshotFormat,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            format: SnapshotFormat::JsonArray,
        }
    }

    pub fn with_format(mut self, format: SnapshotFormat) -> Self {
        self.format = format;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sibling(path: &Path, suffix: &str) -> PathBuf {
        let mut name = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "snapshot".into());
        name.push(suffix);
        path.with_file_name(name)
    }

    fn temp_path(&self) -> PathBuf {
        Self::sibling(&self.path, ".tmp")
    }

    pub fn version_path(&self) -> PathBuf {
        Self::sibling(&self.path, ".version")
    }

    fn write_atomically(path: &Path, body: &[u8]) -> Result<(), StoreError> {
        let tmp = Self::sibling(path, ".tmp");
        fs::write(&tmp, body)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Missing stamp reads as version 0 (documents written before stamps existed).
    fn load_version(&self) -> Result<u64, StoreError> {
        match fs::read_to_string(self.version_path()) {
            Ok(raw) => Ok(serde_json::from_str::<VersionStamp>(&raw)?.version),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(err) => Err(err.into()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct VersionStamp {
    version: u64,
}

impl SnapshotStore for JsonFileStore {
    fn load(&self) -> Result<Option<SavedLedger>, StoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let entries = snapshot::decode(&raw, self.format)?;
        Ok(Some(SavedLedger::new(self.load_version()?, entries)))
    }

    fn save(&self, snapshot: &LedgerSnapshot) -> Result<(), StoreError> {
        let body = snapshot::encode(snapshot.entries(), self.format)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        // Stamp first: after a crash between the two writes the stamp is ahead
        // of the data, never behind it, so a version is not handed out twice.
        let stamp = serde_json::to_vec(&VersionStamp {
            version: snapshot.version(),
        })?;
        Self::write_atomically(&self.version_path(), &stamp)?;
        Self::write_atomically(&self.path, body.as_bytes())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
