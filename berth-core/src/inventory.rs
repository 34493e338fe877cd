//! The seat inventory aggregate.
//!
//! A [`SeatInventory`] record holds the counters for one (train, date, class) key.
//! [`CoachInventory`] pairs it with the bookings whose passengers occupy that key's
//! RAC and waitlist queues, and is the unit that gets locked, mutated, and committed.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::{Booking, CoreError, CoreResult, InventoryKey, Passenger, PassengerStatus, Pnr, Quota};

/// A quota's sub-allocation of seats, addressed by running seat index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuotaPool {
    pub capacity: u32,
    pub first_index: u32,
    pub free: BTreeSet<u32>,
}

impl QuotaPool {
    pub fn new(first_index: u32, capacity: u32) -> Self {
        Self {
            capacity,
            first_index,
            free: (first_index..first_index + capacity).collect(),
        }
    }

    pub fn remaining(&self) -> u32 {
        self.free.len() as u32
    }

    pub fn confirmed(&self) -> u32 {
        self.capacity - self.remaining()
    }

    pub fn contains(&self, index: u32) -> bool {
        index >= self.first_index && index < self.first_index + self.capacity
    }

    pub fn lowest_free(&self) -> Option<u32> {
        self.free.iter().next().copied()
    }

    /// Take a specific free seat. Returns false when it is taken or outside the pool.
    pub fn claim(&mut self, index: u32) -> bool {
        self.free.remove(&index)
    }

    pub fn release(&mut self, index: u32) -> CoreResult<()> {
        if !self.contains(index) {
            return Err(CoreError::InvariantViolation(format!(
                "seat {} released into a pool starting at {} with capacity {}",
                index, self.first_index, self.capacity
            )));
        }
        if !self.free.insert(index) {
            return Err(CoreError::InvariantViolation(format!("seat {} released twice", index)));
        }
        Ok(())
    }
}

/// RAC slots plus the shared berths they pair up on (two passengers per berth).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RacPool {
    pub capacity: u32,
    pub remaining: u32,
    pub first_berth: u32,
    pub free_berths: BTreeSet<u32>,
}

impl RacPool {
    pub fn new(first_berth: u32, capacity: u32) -> Self {
        let berths = capacity.div_ceil(2);
        Self {
            capacity,
            remaining: capacity,
            first_berth,
            free_berths: (first_berth..first_berth + berths).collect(),
        }
    }

    pub fn berth_count(&self) -> u32 {
        self.capacity.div_ceil(2)
    }

    pub fn contains_berth(&self, index: u32) -> bool {
        index >= self.first_berth && index < self.first_berth + self.berth_count()
    }

    pub fn take_slot(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }

    pub fn return_slot(&mut self) -> CoreResult<()> {
        if self.remaining >= self.capacity {
            return Err(CoreError::InvariantViolation(
                "RAC slot returned beyond capacity".to_string(),
            ));
        }
        self.remaining += 1;
        Ok(())
    }

    pub fn take_berth(&mut self) -> Option<u32> {
        let berth = self.free_berths.iter().next().copied()?;
        self.free_berths.remove(&berth);
        Some(berth)
    }

    pub fn release_berth(&mut self, index: u32) -> CoreResult<()> {
        if !self.contains_berth(index) || !self.free_berths.insert(index) {
            return Err(CoreError::InvariantViolation(format!(
                "RAC berth {} released twice or out of range",
                index
            )));
        }
        Ok(())
    }
}

/// Seat counters for one inventory key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeatInventory {
    pub key: InventoryKey,
    pub coach_units: u32,
    pub pools: BTreeMap<Quota, QuotaPool>,
    pub rac: RacPool,
    /// Current number of waitlisted passengers.
    pub waitlist_length: u32,
    /// Total waitlist numbers ever handed out; only grows.
    pub waitlist_issued: u32,
    pub version: u64,
    pub chart_prepared: bool,
}

impl SeatInventory {
    /// Lay pools out back to back from running index 1, RAC berths after them.
    pub fn provision(
        key: InventoryKey,
        coach_units: u32,
        capacities: &[(Quota, u32)],
        rac_capacity: u32,
    ) -> CoreResult<Self> {
        let mut pools = BTreeMap::new();
        let mut next_index = 1;

        for (quota, capacity) in capacities {
            if *capacity == 0 {
                continue;
            }
            if pools.contains_key(quota) {
                return Err(CoreError::ValidationError(format!(
                    "quota {} provisioned twice for {}",
                    quota, key
                )));
            }
            pools.insert(*quota, QuotaPool::new(next_index, *capacity));
            next_index += capacity;
        }

        if pools.is_empty() {
            return Err(CoreError::ValidationError(format!("no seats provisioned for {}", key)));
        }

        Ok(Self {
            key,
            coach_units,
            pools,
            rac: RacPool::new(next_index, rac_capacity),
            waitlist_length: 0,
            waitlist_issued: 0,
            version: 0,
            chart_prepared: false,
        })
    }

    /// Highest running index in use by any pool or RAC berth.
    pub fn last_index(&self) -> u32 {
        self.rac.first_berth + self.rac.berth_count() - 1
    }

    pub fn pool(&self, quota: Quota) -> Option<&QuotaPool> {
        self.pools.get(&quota)
    }

    pub fn pool_mut(&mut self, quota: Quota) -> Option<&mut QuotaPool> {
        self.pools.get_mut(&quota)
    }

    pub fn remaining(&self, quota: Quota) -> u32 {
        self.pool(quota).map(|p| p.remaining()).unwrap_or(0)
    }

    pub fn pool_for_index(&self, index: u32) -> Option<Quota> {
        self.pools
            .iter()
            .find(|(_, pool)| pool.contains(index))
            .map(|(quota, _)| *quota)
    }
}

/// A passenger's place in the RAC or waitlist queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub pnr: Pnr,
    pub passenger_id: u32,
    pub sequence: u32,
}

/// The locked unit of work: counters plus every booking that can be touched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CoachInventory {
    pub record: SeatInventory,
    pub bookings: BTreeMap<Pnr, Booking>,
}

impl CoachInventory {
    pub fn new(record: SeatInventory) -> Self {
        Self {
            record,
            bookings: BTreeMap::new(),
        }
    }

    pub fn key(&self) -> &InventoryKey {
        &self.record.key
    }

    fn queue(&self, status: PassengerStatus) -> Vec<QueueEntry> {
        let mut entries: Vec<QueueEntry> = self
            .bookings
            .values()
            .flat_map(|b| {
                b.passengers
                    .iter()
                    .filter(move |p| p.status == status)
                    .map(move |p| QueueEntry {
                        pnr: b.pnr.clone(),
                        passenger_id: p.id,
                        sequence: p.sequence.unwrap_or(u32::MAX),
                    })
            })
            .collect();
        entries.sort_by(|a, b| {
            (a.sequence, &a.pnr, a.passenger_id).cmp(&(b.sequence, &b.pnr, b.passenger_id))
        });
        entries
    }

    /// RAC holders in sequence order.
    pub fn rac_queue(&self) -> Vec<QueueEntry> {
        self.queue(PassengerStatus::Rac)
    }

    /// Waitlisted passengers in sequence order.
    pub fn waitlist_queue(&self) -> Vec<QueueEntry> {
        self.queue(PassengerStatus::Wtl)
    }

    pub fn booking_mut(&mut self, pnr: &Pnr) -> CoreResult<&mut Booking> {
        self.bookings
            .get_mut(pnr)
            .ok_or_else(|| CoreError::NotFoundError(format!("PNR {}", pnr)))
    }

    pub fn passenger(&self, pnr: &Pnr, passenger_id: u32) -> Option<&Passenger> {
        self.bookings.get(pnr)?.passenger(passenger_id)
    }

    pub fn passenger_mut(&mut self, pnr: &Pnr, passenger_id: u32) -> CoreResult<&mut Passenger> {
        self.booking_mut(pnr)?.passenger_mut(passenger_id)
    }

    /// Reassign RAC numbers 1..N and waitlist numbers 1..M, keeping relative order.
    /// Returns how many sequence numbers changed.
    pub fn renumber(&mut self) -> u32 {
        let mut changed = 0;
        let rac = self.rac_queue();
        let waitlist = self.waitlist_queue();

        for entries in [&rac, &waitlist] {
            for (position, entry) in entries.iter().enumerate() {
                let wanted = position as u32 + 1;
                if entry.sequence == wanted {
                    continue;
                }
                if let Ok(p) = self.passenger_mut(&entry.pnr, entry.passenger_id) {
                    p.sequence = Some(wanted);
                    changed += 1;
                }
            }
        }

        self.record.waitlist_length = waitlist.len() as u32;
        changed
    }

    /// Re-check the aggregate before it is committed.
    pub fn verify(&self) -> CoreResult<()> {
        let key = &self.record.key;

        for (label, queue) in [("RAC", self.rac_queue()), ("waitlist", self.waitlist_queue())] {
            for (position, entry) in queue.iter().enumerate() {
                if entry.sequence != position as u32 + 1 {
                    return Err(CoreError::InvariantViolation(format!(
                        "{} numbers for {} are not contiguous at PNR {} passenger {} (found {}, expected {})",
                        label,
                        key,
                        entry.pnr,
                        entry.passenger_id,
                        entry.sequence,
                        position + 1
                    )));
                }
            }
        }

        let rac_holders = self.rac_queue().len() as u32;
        if rac_holders + self.record.rac.remaining != self.record.rac.capacity {
            return Err(CoreError::InvariantViolation(format!(
                "{} RAC holders plus {} free slots do not match RAC capacity {} for {}",
                rac_holders, self.record.rac.remaining, self.record.rac.capacity, key
            )));
        }

        let waitlisted = self.waitlist_queue().len() as u32;
        if waitlisted != self.record.waitlist_length {
            return Err(CoreError::InvariantViolation(format!(
                "waitlist length {} disagrees with {} waitlisted passengers for {}",
                self.record.waitlist_length, waitlisted, key
            )));
        }

        let mut occupants: HashMap<u32, u32> = HashMap::new();
        let mut rac_berths: BTreeSet<u32> = BTreeSet::new();

        for booking in self.bookings.values() {
            for p in &booking.passengers {
                match p.status {
                    PassengerStatus::Cnf => {
                        let seat = p.seat.as_ref().ok_or_else(|| {
                            CoreError::InvariantViolation(format!(
                                "confirmed passenger {} on PNR {} has no seat",
                                p.id, booking.pnr
                            ))
                        })?;
                        let index = seat.running_index;
                        let count = occupants.entry(index).or_insert(0);
                        *count += 1;

                        let shared = self.record.rac.contains_berth(index);
                        let limit = if shared { 2 } else { 1 };
                        if *count > limit {
                            return Err(CoreError::InvariantViolation(format!(
                                "seat {} of {} is allocated {} times",
                                index, key, count
                            )));
                        }
                        if !shared {
                            let pool = p.seat_pool.and_then(|q| self.record.pool(q));
                            match pool {
                                Some(pool) if pool.contains(index) && !pool.free.contains(&index) => {}
                                _ => {
                                    return Err(CoreError::InvariantViolation(format!(
                                        "seat {} of {} is confirmed but not held by its pool",
                                        index, key
                                    )))
                                }
                            }
                        }
                    }
                    PassengerStatus::Rac => {
                        if let Some(berth) = p.rac_berth {
                            if self.record.rac.free_berths.contains(&berth) || !rac_berths.insert(berth) {
                                return Err(CoreError::InvariantViolation(format!(
                                    "RAC berth {} of {} is double-booked or marked free",
                                    berth, key
                                )));
                            }
                        }
                    }
                    PassengerStatus::Wtl | PassengerStatus::Can => {}
                }
            }
        }

        for (quota, pool) in &self.record.pools {
            if pool.free.iter().any(|i| !pool.contains(*i)) {
                return Err(CoreError::InvariantViolation(format!(
                    "pool {} of {} lists a free seat outside its range",
                    quota, key
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BookingStatus, CoachClass, ContactInfo, Gender};
    use berth_shared::Masked;
    use chrono::NaiveDate;

    fn key() -> InventoryKey {
        InventoryKey::new("12951", NaiveDate::from_ymd_opt(2026, 11, 2).unwrap(), CoachClass::Sleeper)
    }

    fn booking(pnr: &str, passengers: Vec<(u32, PassengerStatus, Option<u32>)>) -> Booking {
        let now = NaiveDate::from_ymd_opt(2026, 10, 1).unwrap().and_hms_opt(10, 0, 0).unwrap();
        Booking {
            pnr: Pnr::parse(pnr).unwrap(),
            train_number: "12951".into(),
            journey_date: key().journey_date,
            coach_class: CoachClass::Sleeper,
            quota: Quota::General,
            source: "MMCT".into(),
            destination: "NDLS".into(),
            distance_km: 1384,
            contact: ContactInfo { mobile: Masked("9000000000".into()), email: None },
            status: BookingStatus::Waitlisted,
            total_fare_paise: 0,
            passengers: passengers
                .into_iter()
                .map(|(id, status, sequence)| Passenger {
                    id,
                    name: format!("P{}", id),
                    age: 40,
                    gender: Gender::Male,
                    senior: false,
                    disabled: false,
                    quota: Quota::General,
                    seat_pool: None,
                    status,
                    booked_status: status,
                    seat: None,
                    sequence,
                    rac_berth: None,
                    fare_paise: 0,
                    refund_paise: None,
                    cancellation: None,
                })
                .collect(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_provision_lays_out_pools_back_to_back() {
        let record = SeatInventory::provision(
            key(),
            2,
            &[(Quota::General, 100), (Quota::Tatkal, 20), (Quota::Ladies, 0)],
            9,
        )
        .unwrap();

        assert_eq!(record.pool(Quota::General).unwrap().first_index, 1);
        assert_eq!(record.pool(Quota::Tatkal).unwrap().first_index, 101);
        assert!(record.pool(Quota::Ladies).is_none());
        assert_eq!(record.rac.first_berth, 121);
        assert_eq!(record.rac.berth_count(), 5);
        assert_eq!(record.last_index(), 125);
        assert_eq!(record.pool_for_index(105), Some(Quota::Tatkal));
    }

    #[test]
    fn test_pool_claim_and_release() {
        let mut pool = QuotaPool::new(11, 3);
        assert_eq!(pool.lowest_free(), Some(11));
        assert!(pool.claim(12));
        assert!(!pool.claim(12));
        assert_eq!(pool.confirmed(), 1);

        pool.release(12).unwrap();
        assert!(pool.release(12).is_err());
        assert!(pool.release(40).is_err());
        assert_eq!(pool.remaining(), 3);
    }

    #[test]
    fn test_renumber_closes_gaps_in_order() {
        let record = SeatInventory::provision(key(), 1, &[(Quota::General, 2)], 0).unwrap();
        let mut inventory = CoachInventory::new(record);
        let a = booking("4000000001", vec![(1, PassengerStatus::Wtl, Some(2)), (2, PassengerStatus::Wtl, Some(5))]);
        let b = booking("4000000002", vec![(1, PassengerStatus::Wtl, Some(3))]);
        inventory.bookings.insert(a.pnr.clone(), a);
        inventory.bookings.insert(b.pnr.clone(), b);

        assert!(inventory.verify().is_err());

        let changed = inventory.renumber();
        assert_eq!(changed, 3);
        let order: Vec<(String, u32, u32)> = inventory
            .waitlist_queue()
            .into_iter()
            .map(|e| (e.pnr.to_string(), e.passenger_id, e.sequence))
            .collect();
        assert_eq!(
            order,
            vec![
                ("4000000001".to_string(), 1, 1),
                ("4000000002".to_string(), 1, 2),
                ("4000000001".to_string(), 2, 3),
            ]
        );
        assert_eq!(inventory.record.waitlist_length, 3);
        inventory.verify().unwrap();
    }

    #[test]
    fn test_verify_catches_rac_slot_drift() {
        let record = SeatInventory::provision(key(), 1, &[(Quota::General, 2)], 4).unwrap();
        let mut inventory = CoachInventory::new(record);
        let a = booking("4000000001", vec![(1, PassengerStatus::Rac, Some(1))]);
        inventory.bookings.insert(a.pnr.clone(), a);

        assert!(matches!(inventory.verify(), Err(CoreError::InvariantViolation(_))));
        inventory.record.rac.remaining = 3;
        inventory.verify().unwrap();
    }
}
