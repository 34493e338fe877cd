//! Shared builders for the engine unit tests.

use berth_core::{
    CoachClass, CoachInventory, ContactInfo, Gender, InventoryKey, Pnr, Quota, Route, SeatInventory,
};
use berth_shared::Masked;
use chrono::{NaiveDate, NaiveDateTime};

use crate::allocation::{AllocationPlan, PlannedPassenger};
use crate::models::PassengerRequest;

pub const FARE: i64 = 10_000;

pub fn journey_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 11, 2).unwrap()
}

pub fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 10, 20).unwrap().and_hms_opt(10, 0, 0).unwrap()
}

/// Sleeper, twelve coaches: GN from index 1, then SS 2 seats, TQ 2 seats, RAC berths.
pub fn inventory(general: u32, rac: u32) -> CoachInventory {
    let key = InventoryKey::new("12951", journey_date(), CoachClass::Sleeper);
    let record = SeatInventory::provision(
        key,
        12,
        &[(Quota::General, general), (Quota::Senior, 2), (Quota::Tatkal, 2)],
        rac,
    )
    .unwrap();
    CoachInventory::new(record)
}

pub fn adult(name: &str) -> PassengerRequest {
    PassengerRequest {
        name: name.to_string(),
        age: 30,
        gender: Gender::Male,
        senior: false,
        disabled: false,
    }
}

pub fn senior(name: &str) -> PassengerRequest {
    PassengerRequest {
        age: 64,
        ..adult(name)
    }
}

/// Every passenger pays [`FARE`]; seniors booked under GN are upgraded.
pub fn plan(pnr: &str, quota: Quota, passengers: Vec<PassengerRequest>) -> AllocationPlan {
    let passengers: Vec<PlannedPassenger> = passengers
        .into_iter()
        .map(|request| PlannedPassenger {
            quota: if quota == Quota::General && request.age >= 60 {
                Quota::Senior
            } else {
                quota
            },
            request,
            fare_paise: FARE,
        })
        .collect();
    AllocationPlan {
        pnr: Pnr::parse(pnr).unwrap(),
        train_number: "12951".to_string(),
        journey_date: journey_date(),
        quota,
        route: Route {
            source: "MMCT".to_string(),
            destination: "NDLS".to_string(),
            distance_km: 1384,
            departure_offset_minutes: 17 * 60,
            arrival_offset_minutes: 32 * 60 + 32,
        },
        contact: ContactInfo {
            mobile: Masked("9876543210".to_string()),
            email: None,
        },
        total_fare_paise: FARE * passengers.len() as i64,
        passengers,
    }
}

pub fn pnr(value: &str) -> Pnr {
    Pnr::parse(value).unwrap()
}
