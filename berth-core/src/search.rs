use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::{CoachClass, Quota};

#[derive(Debug, Clone, Deserialize)]
pub struct SearchQuery {
    pub source: String,
    pub destination: String,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainOption {
    pub train_number: String,
    pub train_name: String,
    pub source: String,
    pub destination: String,
    pub departure: NaiveDateTime,
    pub arrival: NaiveDateTime,
    pub distance_km: u32,
    pub classes: Vec<ClassAvailability>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassAvailability {
    pub coach_class: CoachClass,
    pub chart_prepared: bool,
    pub rac_remaining: u32,
    pub waitlist_length: u32,
    pub quotas: Vec<QuotaAvailability>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuotaAvailability {
    pub quota: Quota,
    pub capacity: u32,
    pub remaining: u32,
    /// Fare for one adult, tax included; absent when no rate is configured.
    pub adult_fare_paise: Option<i64>,
}
