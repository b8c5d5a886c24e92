use std::collections::HashSet;
use std::sync::Arc;

use interfaces::{MemoryDenyStore, SqliteDenyStore};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::types::DenyStore;

/// In-memory view over the persistent deny store.
///
/// The snapshot hydrates asynchronously: a run issues its first fetches
/// before `load_all` lands, and the loaded history is merged in as soon as
/// it arrives. Writes degrade to snapshot-only tracking when the store
/// fails; persistence problems are never fatal to a run.
pub struct DenyList {
    store: Arc<dyn DenyStore>,
    known: HashSet<String>,
    hydration: Option<oneshot::Receiver<Vec<String>>>,
    store_healthy: bool,
}

impl DenyList {
    pub fn new(store: Arc<dyn DenyStore>) -> Self {
        Self {
            store,
            known: HashSet::new(),
            hydration: None,
            store_healthy: true,
        }
    }

    /// Open the sqlite store, falling back to in-memory-only tracking when
    /// the database cannot be opened.
    pub async fn open_or_memory(database_url: &str, max_entries: usize) -> Self {
        match SqliteDenyStore::connect(database_url, max_entries).await {
            Ok(store) => {
                info!("Deny list backed by sqlite at {}", database_url);
                Self::new(Arc::new(store))
            }
            Err(e) => {
                warn!(
                    "Deny store unavailable ({}), tracking in memory only",
                    e
                );
                Self::new(Arc::new(MemoryDenyStore::new(max_entries)))
            }
        }
    }

    /// Kick off the snapshot load without blocking the caller.
    pub fn begin_hydration(&mut self) {
        let (tx, rx) = oneshot::channel();
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            let codes = match store.load_all().await {
                Ok(codes) => codes,
                Err(e) => {
                    warn!("Deny list hydration failed: {}", e);
                    Vec::new()
                }
            };
            let _ = tx.send(codes);
        });
        self.hydration = Some(rx);
    }

    /// Merge the hydration result into the snapshot if it has arrived.
    pub fn poll_hydration(&mut self) {
        if let Some(rx) = &mut self.hydration {
            match rx.try_recv() {
                Ok(codes) => {
                    debug!("Deny list hydrated with {} entries", codes.len());
                    self.known.extend(codes);
                    self.hydration = None;
                }
                Err(oneshot::error::TryRecvError::Empty) => {}
                Err(oneshot::error::TryRecvError::Closed) => {
                    self.hydration = None;
                }
            }
        }
    }

    pub fn contains(&self, code: &str) -> bool {
        self.known.contains(code)
    }

    pub fn snapshot(&self) -> &HashSet<String> {
        &self.known
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    /// Record consumed identifiers in the snapshot and the store.
    pub async fn record_many(&mut self, codes: Vec<String>) {
        if codes.is_empty() {
            return;
        }
        self.known.extend(codes.iter().cloned());
        if !self.store_healthy {
            return;
        }
        if let Err(e) = self.store.put_many(&codes).await {
            warn!(
                "Deny store write failed ({}), continuing in memory only",
                e
            );
            self.store_healthy = false;
        }
    }
}
