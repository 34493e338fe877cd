//! Process-local implementations of the store ports.
//!
//! Each inventory key gets its own `tokio` mutex. A lock holder works on a clone of
//! the committed aggregate; readers see the committed copy and never wait.

use async_trait::async_trait;
use berth_core::{
    Booking, CoachInventory, CoreError, CoreResult, InventoryKey, InventoryLock, InventoryStore,
    Pnr, SeatInventory, Train, TrainCatalog,
};
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, warn};

#[derive(Default)]
struct Inner {
    locks: Mutex<HashMap<InventoryKey, Arc<Mutex<()>>>>,
    committed: RwLock<BTreeMap<InventoryKey, CoachInventory>>,
    pnr_index: RwLock<HashMap<Pnr, InventoryKey>>,
}

#[derive(Clone)]
pub struct MemoryInventoryStore {
    inner: Arc<Inner>,
    lock_timeout: Duration,
}

impl MemoryInventoryStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner::default()),
            lock_timeout,
        }
    }
}

#[async_trait]
impl InventoryStore for MemoryInventoryStore {
    async fn provision(&self, record: SeatInventory) -> CoreResult<()> {
        let key = record.key.clone();
        let mut committed = self.inner.committed.write().await;
        if committed.contains_key(&key) {
            return Err(CoreError::ValidationError(format!("{} is already provisioned", key)));
        }
        committed.insert(key.clone(), CoachInventory::new(record));
        self.inner
            .locks
            .lock()
            .await
            .insert(key, Arc::new(Mutex::new(())));
        Ok(())
    }

    async fn lock(&self, key: &InventoryKey, _include: &[Pnr]) -> CoreResult<Box<dyn InventoryLock>> {
        let mutex = self
            .inner
            .locks
            .lock()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| CoreError::NotFoundError(format!("no inventory for {}", key)))?;

        let guard = match tokio::time::timeout(self.lock_timeout, mutex.lock_owned()).await {
            Ok(guard) => guard,
            Err(_) => {
                warn!(%key, timeout_ms = self.lock_timeout.as_millis() as u64, "inventory lock timed out");
                return Err(CoreError::ConflictError(format!("{} is busy, retry shortly", key)));
            }
        };

        let snapshot = self
            .inner
            .committed
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| CoreError::NotFoundError(format!("no inventory for {}", key)))?;

        debug!(%key, version = snapshot.record.version, "inventory locked");
        Ok(Box::new(MemoryLock {
            inner: self.inner.clone(),
            snapshot,
            _guard: guard,
        }))
    }

    async fn snapshot(&self, key: &InventoryKey) -> CoreResult<Option<SeatInventory>> {
        Ok(self
            .inner
            .committed
            .read()
            .await
            .get(key)
            .map(|inventory| inventory.record.clone()))
    }

    async fn keys_for_run(&self, train_number: &str, journey_date: NaiveDate) -> CoreResult<Vec<InventoryKey>> {
        Ok(self
            .inner
            .committed
            .read()
            .await
            .keys()
            .filter(|k| k.train_number == train_number && k.journey_date == journey_date)
            .cloned()
            .collect())
    }

    async fn retire_before(&self, date: NaiveDate) -> CoreResult<usize> {
        let mut committed = self.inner.committed.write().await;
        let before = committed.len();
        committed.retain(|key, _| key.journey_date >= date);
        let retired = before - committed.len();
        if retired == 0 {
            return Ok(0);
        }

        self.inner.pnr_index.write().await.retain(|_, key| key.journey_date >= date);
        self.inner.locks.lock().await.retain(|key, _| key.journey_date >= date);
        debug!(%date, retired, "past runs dropped");
        Ok(retired)
    }

    async fn find_booking(&self, pnr: &Pnr) -> CoreResult<Option<Booking>> {
        let Some(key) = self.inner.pnr_index.read().await.get(pnr).cloned() else {
            return Ok(None);
        };
        Ok(self
            .inner
            .committed
            .read()
            .await
            .get(&key)
            .and_then(|inventory| inventory.bookings.get(pnr).cloned()))
    }
}

struct MemoryLock {
    inner: Arc<Inner>,
    snapshot: CoachInventory,
    _guard: OwnedMutexGuard<()>,
}

#[async_trait]
impl InventoryLock for MemoryLock {
    fn inventory(&self) -> &CoachInventory {
        &self.snapshot
    }

    async fn commit(self: Box<Self>, mut inventory: CoachInventory) -> CoreResult<u64> {
        let key = self.snapshot.key().clone();
        if inventory.key() != &key {
            return Err(CoreError::InvariantViolation(format!(
                "lock on {} cannot commit {}",
                key,
                inventory.key()
            )));
        }
        let version = self.snapshot.record.version + 1;
        inventory.record.version = version;

        let mut committed = self.inner.committed.write().await;
        if !committed.contains_key(&key) {
            return Err(CoreError::NotFoundError(format!("{} was retired while locked", key)));
        }
        {
            let mut index = self.inner.pnr_index.write().await;
            for pnr in inventory.bookings.keys() {
                index.entry(pnr.clone()).or_insert_with(|| key.clone());
            }
        }
        committed.insert(key, inventory);
        // `_guard` drops with `self`, releasing the key.
        Ok(version)
    }
}

/// Fixed schedule data, typically loaded from the seed file.
pub struct StaticTrainCatalog {
    trains: BTreeMap<String, Train>,
}

impl StaticTrainCatalog {
    pub fn new(trains: Vec<Train>) -> Self {
        Self {
            trains: trains.into_iter().map(|t| (t.number.clone(), t)).collect(),
        }
    }
}

#[async_trait]
impl TrainCatalog for StaticTrainCatalog {
    async fn train(&self, number: &str) -> CoreResult<Option<Train>> {
        Ok(self.trains.get(number).cloned())
    }

    async fn trains_between(&self, source: &str, destination: &str) -> CoreResult<Vec<Train>> {
        Ok(self
            .trains
            .values()
            .filter(|t| t.route(source, destination).is_ok())
            .cloned()
            .collect())
    }

    async fn all_trains(&self) -> CoreResult<Vec<Train>> {
        Ok(self.trains.values().cloned().collect())
    }
}
