use std::collections::{HashSet, VecDeque};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::defs::DenyStore;

/// In-memory deny store with the same bounded, insertion-ordered semantics
/// as the durable one. Nothing survives the process; used when persistence
/// is unavailable and in tests.
pub struct MemoryDenyStore {
    inner: RwLock<Inner>,
    max_entries: usize,
}

struct Inner {
    order: VecDeque<String>,
    known: HashSet<String>,
}

impl MemoryDenyStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                order: VecDeque::new(),
                known: HashSet::new(),
            }),
            max_entries,
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.order.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl DenyStore for MemoryDenyStore {
    async fn load_all(&self) -> Result<Vec<String>> {
        let inner = self.inner.read().await;
        Ok(inner.order.iter().cloned().collect())
    }

    async fn put_many(&self, codes: &[String]) -> Result<()> {
        let mut inner = self.inner.write().await;
        for code in codes {
            if inner.known.insert(code.clone()) {
                inner.order.push_back(code.clone());
            }
        }
        while inner.order.len() > self.max_entries {
            if let Some(evicted) = inner.order.pop_front() {
                inner.known.remove(&evicted);
            }
        }
        Ok(())
    }
}
