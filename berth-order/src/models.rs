use berth_core::{
    BookingStatus, CoachClass, ContactInfo, Gender, InventoryKey, PassengerStatus, Pnr, Quota,
    SeatAssignment,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PassengerRequest {
    pub name: String,
    pub age: u8,
    pub gender: Gender,
    /// Declared senior citizen, regardless of age.
    #[serde(default)]
    pub senior: bool,
    #[serde(default)]
    pub disabled: bool,
}

/// A booking request as received from the collaborator layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationRequest {
    pub train_number: String,
    pub journey_date: NaiveDate,
    pub source: String,
    pub destination: String,
    pub coach_class: CoachClass,
    pub quota: Quota,
    pub contact: ContactInfo,
    pub passengers: Vec<PassengerRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PassengerOutcome {
    pub passenger_id: u32,
    pub name: String,
    pub status: PassengerStatus,
    pub quota: Quota,
    pub seat: Option<SeatAssignment>,
    pub sequence: Option<u32>,
    pub fare_paise: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AllocationReceipt {
    pub pnr: Pnr,
    pub status: BookingStatus,
    pub passengers: Vec<PassengerOutcome>,
    pub total_fare_paise: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefundLine {
    pub passenger_id: u32,
    pub amount_paise: i64,
    pub tier: String,
    pub charge_percent: u32,
}

/// A passenger moved up the CNF/RAC/WTL ladder as a side effect.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Promotion {
    pub pnr: Pnr,
    pub passenger_id: u32,
    pub from: PassengerStatus,
    pub to: PassengerStatus,
    pub seat: Option<SeatAssignment>,
    pub sequence: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CancellationReceipt {
    pub pnr: Pnr,
    pub booking_status: BookingStatus,
    pub refunds: Vec<RefundLine>,
    pub total_refund_paise: i64,
    pub promotions: Vec<Promotion>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChartReport {
    pub key: InventoryKey,
    /// True when the key had been charted before this run; nothing changed.
    pub already_prepared: bool,
    pub rac_confirmed: u32,
    pub waitlist_cancelled: u32,
    pub promotions: Vec<Promotion>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PassengerStatusLine {
    pub passenger_id: u32,
    pub name: String,
    pub booked_status: PassengerStatus,
    pub status: PassengerStatus,
    pub seat: Option<SeatAssignment>,
    pub sequence: Option<u32>,
    pub fare_paise: i64,
    pub refund_paise: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PnrStatusView {
    pub pnr: Pnr,
    pub train_number: String,
    pub journey_date: NaiveDate,
    pub coach_class: CoachClass,
    pub quota: Quota,
    pub source: String,
    pub destination: String,
    pub status: BookingStatus,
    pub chart_prepared: bool,
    pub total_fare_paise: i64,
    pub passengers: Vec<PassengerStatusLine>,
}
