//! Remote sync: pushes ledger snapshots to an off-site store in the background.
//!
//! The ledger never waits on this. The coordinator hands every accepted snapshot
//! to a [`SyncHandle`]; a single tokio task keeps only the newest one pending,
//! pushes it with a per-attempt timeout, retries with exponential backoff and
//! reports progress as a [`SyncStatus`].

pub mod folder;
pub mod worker;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use cavastock_inventory::LedgerSnapshot;

pub use folder::FolderRemote;
pub use worker::{SyncHandle, SyncPolicy, SyncWorker};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("remote push timed out after {0:?}")]
    Timeout(Duration),

    #[error("remote rejected snapshot: {0}")]
    Remote(String),

    #[error("sync gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

/// Off-site destination for full snapshots.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn push(&self, snapshot: &LedgerSnapshot) -> Result<(), SyncError>;

    fn describe(&self) -> String;
}

/// Sync indicator state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SyncStatus {
    Idle,
    Syncing {
        version: u64,
        attempt: u32,
    },
    Success {
        version: u64,
        synced_at: DateTime<Utc>,
    },
    Error {
        version: u64,
        message: String,
    },
}

impl SyncStatus {
    pub fn label(&self) -> &'static str {
        match self {
            SyncStatus::Idle => "idle",
            SyncStatus::Syncing { .. } => "syncing",
            SyncStatus::Success { .. } => "success",
            SyncStatus::Error { .. } => "error",
        }
    }
}
