use berth_catalog::{QuotaPolicy, RefundPolicy};
use berth_core::{
    BookingStatus, CoachClass, CoachInventory, ContactInfo, CoreError, Gender, InventoryKey,
    PassengerStatus, Pnr, Quota, Route, SeatInventory,
};
use berth_order::{AllocationEngine, AllocationPlan, CancellationEngine, PassengerRequest, PlannedPassenger};
use berth_shared::Masked;
use chrono::{NaiveDate, NaiveDateTime};
use proptest::prelude::*;
use std::collections::HashSet;

#[derive(Debug, Clone)]
enum Op {
    Book { quota: Quota, party: u8 },
    Cancel { booking: usize, mask: u8 },
}

fn any_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (prop_oneof![Just(Quota::General), Just(Quota::Tatkal)], 1u8..=4)
            .prop_map(|(quota, party)| Op::Book { quota, party }),
        2 => (0usize..64, 0u8..16).prop_map(|(booking, mask)| Op::Cancel { booking, mask }),
    ]
}

fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 10, 20).unwrap().and_hms_opt(10, 0, 0).unwrap()
}

fn fresh_inventory() -> CoachInventory {
    let key = InventoryKey::new("12951", NaiveDate::from_ymd_opt(2026, 11, 2).unwrap(), CoachClass::Sleeper);
    let record = SeatInventory::provision(key, 12, &[(Quota::General, 4), (Quota::Tatkal, 2)], 3).unwrap();
    CoachInventory::new(record)
}

fn plan(serial: usize, quota: Quota, party: u8) -> AllocationPlan {
    let passengers = (0..party)
        .map(|i| PlannedPassenger {
            request: PassengerRequest {
                name: format!("P{}", i),
                age: 30,
                gender: Gender::Male,
                senior: false,
                disabled: false,
            },
            quota,
            fare_paise: 1_000,
        })
        .collect();
    AllocationPlan {
        pnr: Pnr::parse(&format!("{}", 4_100_000_000u64 + serial as u64)).unwrap(),
        train_number: "12951".to_string(),
        journey_date: NaiveDate::from_ymd_opt(2026, 11, 2).unwrap(),
        quota,
        route: Route {
            source: "AAA".to_string(),
            destination: "CCC".to_string(),
            distance_km: 500,
            departure_offset_minutes: 17 * 60,
            arrival_offset_minutes: 28 * 60,
        },
        contact: ContactInfo {
            mobile: Masked("9876543210".to_string()),
            email: None,
        },
        passengers,
        total_fare_paise: 1_000 * party as i64,
    }
}

fn check(inventory: &CoachInventory) {
    inventory.verify().unwrap();

    let mut seats = HashSet::new();
    for (quota, pool) in &inventory.record.pools {
        let holders = inventory
            .bookings
            .values()
            .flat_map(|b| &b.passengers)
            .filter(|p| p.status == PassengerStatus::Cnf && p.seat_pool == Some(*quota))
            .count() as u32;
        assert!(holders <= pool.capacity);
        assert_eq!(holders, pool.confirmed());
    }
    for booking in inventory.bookings.values() {
        for p in booking.passengers.iter().filter(|p| p.status == PassengerStatus::Cnf) {
            let index = p.seat.as_ref().map(|s| s.running_index).unwrap();
            assert!(seats.insert(index), "seat {} sold twice", index);
        }
        let all_cancelled = booking.passengers.iter().all(|p| p.status == PassengerStatus::Can);
        assert_eq!(booking.status == BookingStatus::Cancelled, all_cancelled);
    }
}

proptest! {
    #[test]
    fn no_oversell_and_gap_free_queues(ops in prop::collection::vec(any_op(), 1..60)) {
        let policy = QuotaPolicy::default();
        let refunds = RefundPolicy::standard();
        let mut inventory = fresh_inventory();
        let mut issued: Vec<Pnr> = Vec::new();

        for (serial, op) in ops.into_iter().enumerate() {
            let mut working = inventory.clone();
            let result = match op {
                Op::Book { quota, party } => {
                    let plan = plan(serial, quota, party);
                    let pnr = plan.pnr.clone();
                    AllocationEngine::new(&policy)
                        .allocate(&mut working, plan, now())
                        .map(|_| issued.push(pnr))
                }
                Op::Cancel { booking, mask } => {
                    if issued.is_empty() {
                        continue;
                    }
                    let pnr = issued[booking % issued.len()].clone();
                    let quota = working.bookings[&pnr].quota;
                    let ids: Vec<u32> = (1..=4u32).filter(|id| mask & (1 << (id - 1)) != 0).collect();
                    let assessment = refunds.assess(quota, 5 * 24 * 60).unwrap();
                    CancellationEngine::new(&policy)
                        .cancel(&mut working, &pnr, &ids, &assessment, now())
                        .map(|_| ())
                }
            };

            match result {
                Ok(()) => {
                    check(&working);
                    inventory = working;
                }
                Err(CoreError::InvariantViolation(message)) => {
                    prop_assert!(false, "invariant violated: {}", message);
                }
                // Capacity and validation rejections leave the committed copy untouched.
                Err(_) => check(&inventory),
            }
        }
    }
}
