use async_trait::async_trait;
use berth_shared::BookingEvent;
use chrono::NaiveDate;

use crate::{Booking, CoachInventory, CoreResult, InventoryKey, Pnr, SeatInventory, Train};

/// Storage for the seat inventory aggregate.
///
/// Every mutation goes through [`InventoryStore::lock`]: the returned guard holds the
/// key-scoped exclusive lock until it is committed or dropped. Dropping without
/// committing rolls back.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Create the record for a scheduled train run.
    async fn provision(&self, record: SeatInventory) -> CoreResult<()>;

    /// Acquire the exclusive lock for `key`, waiting at most the store's lock timeout.
    ///
    /// The snapshot contains every booking with a RAC or waitlisted passenger on the
    /// key, plus the bookings named in `include`.
    async fn lock(&self, key: &InventoryKey, include: &[Pnr]) -> CoreResult<Box<dyn InventoryLock>>;

    /// Point-in-time read of the counters, without locking.
    async fn snapshot(&self, key: &InventoryKey) -> CoreResult<Option<SeatInventory>>;

    /// Inventory keys provisioned for one train run.
    async fn keys_for_run(&self, train_number: &str, journey_date: NaiveDate) -> CoreResult<Vec<InventoryKey>>;

    async fn find_booking(&self, pnr: &Pnr) -> CoreResult<Option<Booking>>;

    /// Drop runs whose journey date is before `date`, returning how many went.
    /// Stores that keep booking history may leave them in place.
    async fn retire_before(&self, _date: NaiveDate) -> CoreResult<usize> {
        Ok(0)
    }
}

/// Guard over one locked [`CoachInventory`].
#[async_trait]
pub trait InventoryLock: Send {
    fn inventory(&self) -> &CoachInventory;

    /// Persist `inventory` atomically and release the lock. Returns the committed version.
    async fn commit(self: Box<Self>, inventory: CoachInventory) -> CoreResult<u64>;
}

/// Read-only schedule reference data.
#[async_trait]
pub trait TrainCatalog: Send + Sync {
    async fn train(&self, number: &str) -> CoreResult<Option<Train>>;

    /// Trains calling at `source` before `destination`.
    async fn trains_between(&self, source: &str, destination: &str) -> CoreResult<Vec<Train>>;

    async fn all_trains(&self) -> CoreResult<Vec<Train>>;
}

/// Read-through cache of inventory counters used by search.
///
/// Entries are versioned. A `put` carrying a version older than the newest one the
/// cache has seen for the key is ignored, so a snapshot read before a commit can never
/// overwrite that commit's invalidation.
#[async_trait]
pub trait AvailabilityCache: Send + Sync {
    async fn get(&self, key: &InventoryKey) -> CoreResult<Option<SeatInventory>>;

    async fn put(&self, record: &SeatInventory) -> CoreResult<()>;

    /// Drop the entry for `key` after `committed_version` was written.
    async fn invalidate(&self, key: &InventoryKey, committed_version: u64) -> CoreResult<()>;
}

/// Outbound notifications, fired after commit.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: &BookingEvent) -> CoreResult<()>;
}
