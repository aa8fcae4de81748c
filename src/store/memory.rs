use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{InstrumentStore, SignalStore};
use crate::error::StoreError;
use crate::models::{InstrumentSnapshot, Signal, SignalStatus};

/// Process-local store for dry runs and tests
#[derive(Default)]
pub struct MemoryStore {
    signals: RwLock<HashMap<Uuid, Signal>>,
    snapshot: RwLock<Option<InstrumentSnapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All signals regardless of status, oldest first
    pub async fn all(&self) -> Vec<Signal> {
        let mut signals: Vec<Signal> = self.signals.read().await.values().cloned().collect();
        signals.sort_by_key(|s| s.created_at);
        signals
    }
}

#[async_trait]
impl SignalStore for MemoryStore {
    async fn insert(&self, signal: &Signal) -> Result<(), StoreError> {
        let mut signals = self.signals.write().await;
        if signals.contains_key(&signal.id) {
            return Err(StoreError::Duplicate(signal.id));
        }
        signals.insert(signal.id, signal.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Signal>, StoreError> {
        Ok(self.signals.read().await.get(&id).cloned())
    }

    async fn find_by_status(&self, statuses: &[SignalStatus]) -> Result<Vec<Signal>, StoreError> {
        let mut found: Vec<Signal> = self
            .signals
            .read()
            .await
            .values()
            .filter(|s| statuses.contains(&s.status))
            .cloned()
            .collect();
        found.sort_by_key(|s| s.created_at);
        Ok(found)
    }

    async fn transition(
        &self,
        signal: &Signal,
        expected: SignalStatus,
    ) -> Result<Option<Signal>, StoreError> {
        let mut signals = self.signals.write().await;

        let Some(stored) = signals.get_mut(&signal.id) else {
            return Ok(None);
        };
        if stored.status != expected || stored.version != signal.version {
            return Ok(None);
        }

        let mut updated = signal.clone();
        updated.version = stored.version + 1;
        *stored = updated.clone();

        Ok(Some(updated))
    }
}

#[async_trait]
impl InstrumentStore for MemoryStore {
    async fn save_instrument_snapshot(
        &self,
        snapshot: &InstrumentSnapshot,
    ) -> Result<(), StoreError> {
        *self.snapshot.write().await = Some(snapshot.clone());
        Ok(())
    }

    async fn latest_instrument_snapshot(&self) -> Result<Option<InstrumentSnapshot>, StoreError> {
        Ok(self.snapshot.read().await.clone())
    }
}
