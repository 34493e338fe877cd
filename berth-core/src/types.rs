use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::CoreError;

/// Coach classes, serialized by their reservation-chart codes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(try_from = "String", into = "String")]
pub enum CoachClass {
    FirstAc,
    SecondAc,
    ThirdAc,
    ThirdAcEconomy,
    Sleeper,
    ExecutiveChair,
    ChairCar,
    SecondSitting,
}

impl CoachClass {
    pub const ALL: [CoachClass; 8] = [
        CoachClass::FirstAc,
        CoachClass::SecondAc,
        CoachClass::ThirdAc,
        CoachClass::ThirdAcEconomy,
        CoachClass::Sleeper,
        CoachClass::ExecutiveChair,
        CoachClass::ChairCar,
        CoachClass::SecondSitting,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            CoachClass::FirstAc => "1A",
            CoachClass::SecondAc => "2A",
            CoachClass::ThirdAc => "3A",
            CoachClass::ThirdAcEconomy => "3E",
            CoachClass::Sleeper => "SL",
            CoachClass::ExecutiveChair => "EC",
            CoachClass::ChairCar => "CC",
            CoachClass::SecondSitting => "2S",
        }
    }
}

impl fmt::Display for CoachClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for CoachClass {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_uppercase();
        CoachClass::ALL
            .into_iter()
            .find(|c| c.code() == code)
            .ok_or_else(|| CoreError::ValidationError(format!("unknown coach class code '{}'", s)))
    }
}

impl TryFrom<String> for CoachClass {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CoachClass> for String {
    fn from(value: CoachClass) -> Self {
        value.code().to_string()
    }
}

/// Fare quotas. Each names a sub-allocation (pool) of a coach class's seats.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(try_from = "String", into = "String")]
pub enum Quota {
    General,
    Tatkal,
    PremiumTatkal,
    Ladies,
    Senior,
    Disabled,
    Duty,
}

impl Quota {
    pub const ALL: [Quota; 7] = [
        Quota::General,
        Quota::Tatkal,
        Quota::PremiumTatkal,
        Quota::Ladies,
        Quota::Senior,
        Quota::Disabled,
        Quota::Duty,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Quota::General => "GN",
            Quota::Tatkal => "TQ",
            Quota::PremiumTatkal => "PT",
            Quota::Ladies => "LD",
            Quota::Senior => "SS",
            Quota::Disabled => "HP",
            Quota::Duty => "DF",
        }
    }

    /// Quotas whose holders are seated on lower berths where one is available.
    pub fn prefers_ground_level(&self) -> bool {
        matches!(self, Quota::Disabled | Quota::Senior | Quota::Ladies)
    }

    pub fn is_tatkal(&self) -> bool {
        matches!(self, Quota::Tatkal | Quota::PremiumTatkal)
    }
}

impl fmt::Display for Quota {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Quota {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_uppercase();
        Quota::ALL
            .into_iter()
            .find(|q| q.code() == code)
            .ok_or_else(|| CoreError::ValidationError(format!("unknown quota code '{}'", s)))
    }
}

impl TryFrom<String> for Quota {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Quota> for String {
    fn from(value: Quota) -> Self {
        value.code().to_string()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Gender {
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "F")]
    Female,
    #[serde(rename = "T")]
    Transgender,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BerthType {
    Lower,
    Middle,
    Upper,
    SideLower,
    SideUpper,
    Window,
    Aisle,
}

impl BerthType {
    pub fn is_ground_level(&self) -> bool {
        !matches!(self, BerthType::Middle | BerthType::Upper | BerthType::SideUpper)
    }

    pub fn code(&self) -> &'static str {
        match self {
            BerthType::Lower => "LB",
            BerthType::Middle => "MB",
            BerthType::Upper => "UB",
            BerthType::SideLower => "SL",
            BerthType::SideUpper => "SU",
            BerthType::Window => "WS",
            BerthType::Aisle => "AS",
        }
    }
}

/// Per-passenger allocation status. Ordering is "worse is greater" among the live states.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PassengerStatus {
    #[serde(rename = "CNF")]
    Cnf,
    #[serde(rename = "RAC")]
    Rac,
    #[serde(rename = "WTL")]
    Wtl,
    #[serde(rename = "CAN")]
    Can,
}

impl PassengerStatus {
    pub fn code(&self) -> &'static str {
        match self {
            PassengerStatus::Cnf => "CNF",
            PassengerStatus::Rac => "RAC",
            PassengerStatus::Wtl => "WTL",
            PassengerStatus::Can => "CAN",
        }
    }
}

impl fmt::Display for PassengerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Confirmed,
    Rac,
    Waitlisted,
    Cancelled,
}

impl BookingStatus {
    /// Worst live passenger status wins; CANCELLED only when nobody is left.
    pub fn derive<I>(statuses: I) -> BookingStatus
    where
        I: IntoIterator<Item = PassengerStatus>,
    {
        let worst = statuses
            .into_iter()
            .filter(|s| *s != PassengerStatus::Can)
            .max();

        match worst {
            None => BookingStatus::Cancelled,
            Some(PassengerStatus::Cnf) => BookingStatus::Confirmed,
            Some(PassengerStatus::Rac) => BookingStatus::Rac,
            Some(_) => BookingStatus::Waitlisted,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Rac => "RAC",
            BookingStatus::Waitlisted => "WAITLISTED",
            BookingStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for BookingStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONFIRMED" => Ok(BookingStatus::Confirmed),
            "RAC" => Ok(BookingStatus::Rac),
            "WAITLISTED" => Ok(BookingStatus::Waitlisted),
            "CANCELLED" => Ok(BookingStatus::Cancelled),
            other => Err(CoreError::ValidationError(format!("unknown booking status '{}'", other))),
        }
    }
}

/// Passenger Name Record: ten digits, never starting with zero.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(try_from = "String", into = "String")]
pub struct Pnr(String);

impl Pnr {
    pub fn parse(value: &str) -> Result<Self, CoreError> {
        let value = value.trim();
        let valid = value.len() == 10
            && value.bytes().all(|b| b.is_ascii_digit())
            && !value.starts_with('0');
        if !valid {
            return Err(CoreError::ValidationError(format!("malformed PNR '{}'", value)));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Pnr {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Pnr::parse(&value)
    }
}

impl From<Pnr> for String {
    fn from(pnr: Pnr) -> Self {
        pnr.0
    }
}

impl fmt::Display for Pnr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of the single shared mutable resource: one train run, one coach class.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InventoryKey {
    pub train_number: String,
    pub journey_date: NaiveDate,
    pub coach_class: CoachClass,
}

impl InventoryKey {
    pub fn new(train_number: impl Into<String>, journey_date: NaiveDate, coach_class: CoachClass) -> Self {
        Self {
            train_number: train_number.into(),
            journey_date,
            coach_class,
        }
    }
}

impl fmt::Display for InventoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.train_number, self.journey_date, self.coach_class)
    }
}

/// A physical seat or berth as printed on the ticket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeatAssignment {
    /// Coach label, e.g. `S3` or `B1`.
    pub coach: String,
    pub coach_unit: u32,
    pub seat_number: u32,
    pub berth: BerthType,
    /// 1-based index across all coach units of the class.
    pub running_index: u32,
}

impl fmt::Display for SeatAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.coach, self.seat_number, self.berth.code())
    }
}
