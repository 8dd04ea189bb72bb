use std::{convert::Infallible, sync::Arc, time::Duration};

use anyhow::Context;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use tokio::sync::broadcast;
use tokio_stream::{StreamExt, wrappers::BroadcastStream};

use cavastock_events::{Event, EventBus, InMemoryEventBus};
use cavastock_infra::{
    FolderRemote, InMemorySnapshotStore, JsonFileStore, LedgerConfig, LedgerCoordinator,
    SnapshotStore, SyncWorker, TimedStore,
};
use cavastock_inventory::LedgerEvent;
use cavastock_products::ProductCatalog;

/// Ledger change broadcast to SSE clients.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RealtimeMessage {
    pub topic: String,
    pub payload: serde_json::Value,
}

/// Everything the handlers need, shared behind an `Arc`.
#[derive(Debug)]
pub struct AppServices {
    coordinator: LedgerCoordinator,
    expiry_window_days: i64,
    realtime_tx: broadcast::Sender<RealtimeMessage>,
}

impl AppServices {
    /// Wire services from configuration: JSON snapshot on disk, optional folder sync.
    ///
    /// Must run inside a tokio runtime when sync is enabled.
    pub fn from_config(config: &LedgerConfig) -> anyhow::Result<Self> {
        let file: Arc<dyn SnapshotStore> = Arc::new(JsonFileStore::new(config.snapshot_path()));
        let store: Arc<dyn SnapshotStore> = Arc::new(
            TimedStore::new(file, config.save_timeout()).context("starting snapshot writer")?,
        );
        let mut coordinator = LedgerCoordinator::open(
            config.facility.clone(),
            ProductCatalog::seeded(),
            config.slot_policy(),
            store,
            InMemoryEventBus::new(),
        )
        .with_context(|| format!("opening ledger at {}", config.snapshot_path().display()))?;

        if let Some(dir) = &config.sync_dir {
            let remote = Arc::new(FolderRemote::new(dir, config.snapshot_file.clone()));
            coordinator = coordinator.with_sync(SyncWorker::new(remote, config.sync_policy()).spawn());
        } else {
            tracing::info!("remote sync disabled (CAVASTOCK_SYNC_DIR not set)");
        }

        Ok(Self::new(coordinator, config.expiry_window_days))
    }

    /// Empty ledger with a seeded catalog and in-memory persistence.
    pub fn in_memory() -> Self {
        let coordinator = LedgerCoordinator::new(
            cavastock_inventory::Ledger::new(
                "main",
                ProductCatalog::seeded(),
                cavastock_inventory::SlotPolicy::default(),
            ),
            Arc::new(InMemorySnapshotStore::new()),
            InMemoryEventBus::new(),
        );
        Self::new(coordinator, LedgerConfig::default().expiry_window_days)
    }

    pub fn new(coordinator: LedgerCoordinator, expiry_window_days: i64) -> Self {
        let (realtime_tx, _) = broadcast::channel(256);
        spawn_event_forwarder(&coordinator, realtime_tx.clone());
        Self {
            coordinator,
            expiry_window_days,
            realtime_tx,
        }
    }

    pub fn coordinator(&self) -> &LedgerCoordinator {
        &self.coordinator
    }

    pub fn expiry_window_days(&self) -> i64 {
        self.expiry_window_days
    }

    pub fn realtime_tx(&self) -> &broadcast::Sender<RealtimeMessage> {
        &self.realtime_tx
    }
}

/// Bridge the (blocking) ledger bus into the async broadcast channel.
///
/// The thread ends when the coordinator, and with it the bus, is dropped.
fn spawn_event_forwarder(coordinator: &LedgerCoordinator, tx: broadcast::Sender<RealtimeMessage>) {
    let subscription = coordinator.bus().subscribe();
    let spawned = std::thread::Builder::new()
        .name("ledger-event-forwarder".to_string())
        .spawn(move || {
            while let Ok(event) = subscription.recv() {
                let _ = tx.send(realtime_message(&event));
            }
        });
    if let Err(err) = spawned {
        tracing::warn!(error = %err, "event forwarder not started; change feed disabled");
    }
}

fn realtime_message(event: &LedgerEvent) -> RealtimeMessage {
    RealtimeMessage {
        topic: event.event_type().to_string(),
        payload: serde_json::to_value(event).unwrap_or(serde_json::Value::Null),
    }
}

/// Ledger change feed as server-sent events.
pub fn ledger_sse_stream(
    services: Arc<AppServices>,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = services.realtime_tx().subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|msg| match msg {
        Ok(m) => {
            let data = serde_json::to_string(&m.payload).unwrap_or_else(|_| "{}".to_string());
            Some(Ok(SseEvent::default().event(m.topic).data(data)))
        }
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
