use std::sync::{Arc, Mutex};

use uuid::Uuid;

/// Shared accounting for display handles.
///
/// A handle is a stand-in for a temporary OS-level display resource; the
/// registry records every allocation, release, double release, and handle
/// dropped without release, so the pipeline's exactly-once discipline is
/// observable from the outside.
#[derive(Debug, Default)]
pub struct HandleRegistry {
    counters: Mutex<Counters>,
}

#[derive(Debug, Default, Clone)]
struct Counters {
    created: u64,
    released: u64,
    double_releases: u64,
    leaked: u64,
}

impl HandleRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn created(&self) -> u64 {
        self.counters.lock().unwrap().created
    }

    pub fn released(&self) -> u64 {
        self.counters.lock().unwrap().released
    }

    pub fn double_releases(&self) -> u64 {
        self.counters.lock().unwrap().double_releases
    }

    pub fn leaked(&self) -> u64 {
        self.counters.lock().unwrap().leaked
    }

    /// Handles currently alive and unreleased.
    pub fn outstanding(&self) -> u64 {
        let counters = self.counters.lock().unwrap();
        counters.created - counters.released - counters.leaked
    }

    fn record_created(&self) {
        self.counters.lock().unwrap().created += 1;
    }

    fn record_release(&self, already_released: bool) {
        let mut counters = self.counters.lock().unwrap();
        if already_released {
            counters.double_releases += 1;
        } else {
            counters.released += 1;
        }
    }

    fn record_leak(&self) {
        self.counters.lock().unwrap().leaked += 1;
    }
}

/// A must-release-once display resource backing an in-memory image.
#[derive(Debug)]
pub struct DisplayHandle {
    id: Uuid,
    registry: Arc<HandleRegistry>,
    released: bool,
}

impl DisplayHandle {
    /// Mint a new handle against a registry.
    pub fn new(registry: &Arc<HandleRegistry>) -> Self {
        registry.record_created();
        Self {
            id: Uuid::new_v4(),
            registry: Arc::clone(registry),
            released: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Release the underlying resource. Releasing twice is recorded against
    /// the registry instead of panicking.
    pub fn release(&mut self) {
        self.registry.record_release(self.released);
        self.released = true;
    }
}

impl Drop for DisplayHandle {
    fn drop(&mut self) {
        if !self.released {
            self.registry.record_leak();
        }
    }
}
