//! Runtime configuration.
//!
//! Defaults suit a single-facility install writing under `./data`. Every field
//! can be overridden through a `CAVASTOCK_*` environment variable; values that
//! fail to parse keep the default and log a warning.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use cavastock_inventory::SlotPolicy;

use crate::sync::SyncPolicy;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Ledger id; one ledger per facility.
    pub facility: String,
    pub data_dir: PathBuf,
    pub snapshot_file: String,
    pub paged_capacity: usize,
    /// Longest a mutation waits on the local snapshot save before reporting degraded durability.
    pub save_timeout_ms: u64,
    /// Folder mirrored as the remote copy. Sync is off when unset.
    pub sync_dir: Option<PathBuf>,
    pub sync_timeout_ms: u64,
    pub sync_max_retries: u32,
    pub sync_backoff_ms: u64,
    /// Days ahead counted as "near expiry" on the dashboard.
    pub expiry_window_days: i64,
    pub bind_addr: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            facility: "main".to_string(),
            data_dir: PathBuf::from("./data"),
            snapshot_file: "inventory.json".to_string(),
            paged_capacity: 1,
            save_timeout_ms: 2_000,
            sync_dir: None,
            sync_timeout_ms: 5_000,
            sync_max_retries: 3,
            sync_backoff_ms: 500,
            expiry_window_days: 7,
            bind_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

impl LedgerConfig {
    /// Defaults with process environment overrides applied.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `CAVASTOCK_*` overrides read through `lookup`.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        // CAVASTOCK_FACILITY
        if let Some(v) = get("CAVASTOCK_FACILITY") {
            self.facility = v;
        }

        // CAVASTOCK_DATA_DIR
        if let Some(v) = get("CAVASTOCK_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }

        // CAVASTOCK_SNAPSHOT_FILE
        if let Some(v) = get("CAVASTOCK_SNAPSHOT_FILE") {
            self.snapshot_file = v;
        }

        // CAVASTOCK_PAGED_CAPACITY (at least 1)
        if let Some(v) = get("CAVASTOCK_PAGED_CAPACITY") {
            match v.parse::<usize>() {
                Ok(n) if n >= 1 => self.paged_capacity = n,
                _ => invalid("CAVASTOCK_PAGED_CAPACITY", &v),
            }
        }

        // CAVASTOCK_SYNC_DIR
        if let Some(v) = get("CAVASTOCK_SYNC_DIR") {
            self.sync_dir = Some(PathBuf::from(v));
        }

        parse_into(&get, "CAVASTOCK_SAVE_TIMEOUT_MS", &mut self.save_timeout_ms);
        parse_into(&get, "CAVASTOCK_SYNC_TIMEOUT_MS", &mut self.sync_timeout_ms);
        parse_into(&get, "CAVASTOCK_SYNC_MAX_RETRIES", &mut self.sync_max_retries);
        parse_into(&get, "CAVASTOCK_SYNC_BACKOFF_MS", &mut self.sync_backoff_ms);
        parse_into(&get, "CAVASTOCK_EXPIRY_WINDOW_DAYS", &mut self.expiry_window_days);

        // CAVASTOCK_BIND_ADDR
        if let Some(v) = get("CAVASTOCK_BIND_ADDR") {
            self.bind_addr = v;
        }

        self
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join(&self.snapshot_file)
    }

    pub fn save_timeout(&self) -> Duration {
        Duration::from_millis(self.save_timeout_ms)
    }

    pub fn slot_policy(&self) -> SlotPolicy {
        SlotPolicy::new(self.paged_capacity)
    }

    pub fn sync_policy(&self) -> SyncPolicy {
        SyncPolicy {
            timeout: Duration::from_millis(self.sync_timeout_ms),
            max_retries: self.sync_max_retries,
            backoff: Duration::from_millis(self.sync_backoff_ms),
        }
    }
}

fn parse_into<T: std::str::FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) {
    if let Some(v) = get(key) {
        match v.parse::<T>() {
            Ok(parsed) => *slot = parsed,
            Err(_) => invalid(key, &v),
        }
    }
}

fn invalid(key: &str, value: &str) {
    warn!(key, value, "ignoring invalid configuration value; keeping default");
}
