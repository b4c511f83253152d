//! Shared application state for all routes. Nothing in here changes per request.

use crate::catalog::Catalog;
use crate::dispatch::ChangeEvent;
use crate::redact::Redactor;
use crate::store::{Executor, MySqlStore};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};

/// Buffered change events per subscriber before it starts lagging.
const EVENT_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<dyn Catalog>,
    pub executor: Arc<dyn Executor>,
    /// Route prefix the REST paths are mounted under, e.g. `/orm`.
    pub prefix: String,
    pub redactor: Arc<Redactor>,
    pub events: broadcast::Sender<ChangeEvent>,
}

impl AppState {
    pub fn new(catalog: Arc<dyn Catalog>, executor: Arc<dyn Executor>, prefix: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        AppState {
            catalog,
            executor,
            prefix: prefix.into(),
            redactor: Arc::new(Redactor::default()),
            events,
        }
    }

    /// One MySQL store serving as both catalog and executor.
    pub fn from_store(store: MySqlStore, prefix: impl Into<String>) -> Self {
        let store = Arc::new(store);
        AppState::new(store.clone(), store, prefix)
    }

    pub fn with_redactor(mut self, redactor: Redactor) -> Self {
        self.redactor = Arc::new(redactor);
        self
    }

    /// Receives every save and delete made after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.events.subscribe()
    }

    pub(crate) fn publish(&self, event: ChangeEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }
}

/// Hands every change on `changes` to `on_change` until all senders are gone.
/// Events lost while the receiver lagged are logged and skipped.
pub async fn follow_changes<F>(mut changes: broadcast::Receiver<ChangeEvent>, mut on_change: F)
where
    F: FnMut(ChangeEvent),
{
    loop {
        match changes.recv().await {
            Ok(event) => on_change(event),
            Err(RecvError::Lagged(skipped)) => tracing::warn!(skipped, "change subscriber fell behind"),
            Err(RecvError::Closed) => break,
        }
    }
}
