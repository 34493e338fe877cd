use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{CoachClass, CoreError, CoreResult};

/// One halt on a train's schedule.
///
/// Offsets are minutes from midnight of the day the train leaves its origin, so a
/// stop reached on the second night has an offset above 1440.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Stop {
    pub station_code: String,
    pub sequence: u32,
    pub arrival_offset_minutes: Option<i64>,
    pub departure_offset_minutes: Option<i64>,
    pub distance_km: u32,
}

/// Read-only reference data for one train.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Train {
    pub number: String,
    pub name: String,
    /// Empty means the train runs daily.
    #[serde(default)]
    pub runs_on: Vec<Weekday>,
    pub stops: Vec<Stop>,
    /// Coach units attached per class, e.g. `SL => 12`.
    pub composition: BTreeMap<CoachClass, u32>,
}

/// The slice of a schedule a passenger travels on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Route {
    pub source: String,
    pub destination: String,
    pub distance_km: u32,
    pub departure_offset_minutes: i64,
    pub arrival_offset_minutes: i64,
}

impl Route {
    pub fn departure_at(&self, journey_date: NaiveDate) -> NaiveDateTime {
        journey_date.and_time(chrono::NaiveTime::MIN) + Duration::minutes(self.departure_offset_minutes)
    }

    pub fn arrival_at(&self, journey_date: NaiveDate) -> NaiveDateTime {
        journey_date.and_time(chrono::NaiveTime::MIN) + Duration::minutes(self.arrival_offset_minutes)
    }
}

impl Train {
    pub fn runs_on_date(&self, date: NaiveDate) -> bool {
        self.runs_on.is_empty() || self.runs_on.contains(&date.weekday())
    }

    pub fn coach_units(&self, class: CoachClass) -> Option<u32> {
        self.composition.get(&class).copied().filter(|units| *units > 0)
    }

    fn stop(&self, station_code: &str) -> Option<&Stop> {
        self.stops
            .iter()
            .find(|s| s.station_code.eq_ignore_ascii_case(station_code))
    }

    /// Origin stop; chart preparation is timed off its departure.
    pub fn origin(&self) -> Option<&Stop> {
        self.stops.iter().min_by_key(|s| s.sequence)
    }

    pub fn origin_departure_at(&self, journey_date: NaiveDate) -> Option<NaiveDateTime> {
        let origin = self.origin()?;
        let offset = origin.departure_offset_minutes?;
        Some(journey_date.and_time(chrono::NaiveTime::MIN) + Duration::minutes(offset))
    }

    /// Resolve a source/destination pair against the schedule.
    pub fn route(&self, source: &str, destination: &str) -> CoreResult<Route> {
        let invalid = || {
            CoreError::NotFoundError(format!(
                "train {} has no route from {} to {}",
                self.number, source, destination
            ))
        };

        let from = self.stop(source).ok_or_else(invalid)?;
        let to = self.stop(destination).ok_or_else(invalid)?;
        if from.sequence >= to.sequence {
            return Err(invalid());
        }

        let departure = from.departure_offset_minutes.ok_or_else(invalid)?;
        let arrival = to.arrival_offset_minutes.ok_or_else(invalid)?;

        Ok(Route {
            source: from.station_code.clone(),
            destination: to.station_code.clone(),
            distance_km: to.distance_km.saturating_sub(from.distance_km),
            departure_offset_minutes: departure,
            arrival_offset_minutes: arrival,
        })
    }
}
