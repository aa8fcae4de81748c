// Signal and instrument storage
pub mod memory;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{InstrumentSnapshot, Signal, SignalStatus};

pub use memory::MemoryStore;

/// Durable record of signals
///
/// Every update goes through [`SignalStore::transition`], a compare-and-swap on
/// the stored status and version, so two writers racing on the same signal
/// cannot both succeed.
#[async_trait]
pub trait SignalStore: Send + Sync {
    /// Store a freshly accepted signal
    async fn insert(&self, signal: &Signal) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Signal>, StoreError>;

    /// Signals currently in any of `statuses`, oldest first
    async fn find_by_status(&self, statuses: &[SignalStatus]) -> Result<Vec<Signal>, StoreError>;

    /// Persist `signal` if the stored row is still in `expected` at `signal.version`
    ///
    /// Returns the stored signal with its bumped version, or None when another
    /// writer got there first.
    async fn transition(
        &self,
        signal: &Signal,
        expected: SignalStatus,
    ) -> Result<Option<Signal>, StoreError>;
}

/// Latest exchange instrument rule set
#[async_trait]
pub trait InstrumentStore: Send + Sync {
    async fn save_instrument_snapshot(&self, snapshot: &InstrumentSnapshot)
        -> Result<(), StoreError>;

    async fn latest_instrument_snapshot(&self) -> Result<Option<InstrumentSnapshot>, StoreError>;
}
