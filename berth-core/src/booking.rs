use berth_shared::Masked;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::{
    BookingStatus, CoachClass, CoreError, CoreResult, Gender, InventoryKey, PassengerStatus, Pnr,
    Quota, SeatAssignment,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContactInfo {
    pub mobile: Masked<String>,
    pub email: Option<Masked<String>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CancellationReason {
    PassengerRequest,
    NoShowReclaim,
}

impl CancellationReason {
    pub fn code(&self) -> &'static str {
        match self {
            CancellationReason::PassengerRequest => "PASSENGER_REQUEST",
            CancellationReason::NoShowReclaim => "NO_SHOW_RECLAIM",
        }
    }
}

/// Written once per cancelled passenger; never updated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CancellationRecord {
    /// Label of the refund tier that applied, e.g. `12h-48h`.
    pub tier: String,
    pub charge_percent: u32,
    pub reason: CancellationReason,
    pub cancelled_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Passenger {
    /// 1-based position within the booking.
    pub id: u32,
    pub name: String,
    pub age: u8,
    pub gender: Gender,
    #[serde(default)]
    pub senior: bool,
    #[serde(default)]
    pub disabled: bool,
    /// Quota after the age/gender upgrade.
    pub quota: Quota,
    /// Pool the current seat was drawn from; set only while CNF.
    pub seat_pool: Option<Quota>,
    pub status: PassengerStatus,
    pub booked_status: PassengerStatus,
    pub seat: Option<SeatAssignment>,
    /// RAC or waitlist position; cleared on CNF and CAN.
    pub sequence: Option<u32>,
    /// Shared RAC berth (running index) held while RAC.
    pub rac_berth: Option<u32>,
    pub fare_paise: i64,
    pub refund_paise: Option<i64>,
    pub cancellation: Option<CancellationRecord>,
}

impl Passenger {
    pub fn is_live(&self) -> bool {
        self.status != PassengerStatus::Can
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Booking {
    pub pnr: Pnr,
    pub train_number: String,
    pub journey_date: NaiveDate,
    pub coach_class: CoachClass,
    pub quota: Quota,
    pub source: String,
    pub destination: String,
    pub distance_km: u32,
    pub contact: ContactInfo,
    pub status: BookingStatus,
    pub total_fare_paise: i64,
    pub passengers: Vec<Passenger>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Booking {
    pub fn key(&self) -> InventoryKey {
        InventoryKey::new(self.train_number.clone(), self.journey_date, self.coach_class)
    }

    pub fn passenger(&self, id: u32) -> Option<&Passenger> {
        self.passengers.iter().find(|p| p.id == id)
    }

    pub fn passenger_mut(&mut self, id: u32) -> CoreResult<&mut Passenger> {
        let pnr = self.pnr.clone();
        self.passengers
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| CoreError::NotFoundError(format!("passenger {} not on PNR {}", id, pnr)))
    }

    /// Re-derive the overall status from passengers.
    pub fn refresh_status(&mut self, now: NaiveDateTime) {
        self.status = BookingStatus::derive(self.passengers.iter().map(|p| p.status));
        self.updated_at = now;
    }

    pub fn total_refund_paise(&self) -> i64 {
        self.passengers.iter().filter_map(|p| p.refund_paise).sum()
    }
}
