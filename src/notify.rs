use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CatalogAction {
    TitleAdded,
    TitleDeleted,
}

/// One-way signal consumed by subscribed listeners after a catalog
/// mutation; delivery is best-effort and unordered across listeners.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogEvent {
    pub action: CatalogAction,
    pub title_id: String,
}

#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    tx: broadcast::Sender<CatalogEvent>,
}

impl EventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CatalogEvent> {
        self.tx.subscribe()
    }

    /// Fire-and-forget: having no live subscribers is not an error and
    /// never blocks the caller.
    pub fn publish(&self, action: CatalogAction, title_id: &str) {
        tracing::debug!(?action, title_id, "catalog event");
        let _ = self.tx.send(CatalogEvent {
            action,
            title_id: title_id.to_owned(),
        });
    }
}
