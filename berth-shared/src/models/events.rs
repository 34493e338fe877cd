use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BookingAllocatedEvent {
    pub pnr: String,
    pub train_number: String,
    pub journey_date: NaiveDate,
    pub coach_class: String,
    pub quota: String,
    pub booking_status: String,
    pub passenger_count: u32,
    pub total_fare_paise: i64,
    pub timestamp: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PassengersCancelledEvent {
    pub pnr: String,
    pub train_number: String,
    pub journey_date: NaiveDate,
    pub coach_class: String,
    pub passenger_ids: Vec<u32>,
    pub refund_paise: i64,
    pub booking_status: String,
    pub reason: String,
    pub timestamp: i64,
}

/// Emitted once per passenger moved up by reflow or chart preparation.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PassengerPromotedEvent {
    pub pnr: String,
    pub passenger_id: u32,
    pub from_status: String,
    pub to_status: String,
    pub seat: Option<String>,
    pub sequence: Option<u32>,
    pub timestamp: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChartPreparedEvent {
    pub train_number: String,
    pub journey_date: NaiveDate,
    pub coach_class: String,
    pub rac_confirmed: u32,
    pub waitlist_cancelled: u32,
    pub timestamp: i64,
}

/// Envelope published to the event sinks after every committed unit of work.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingEvent {
    BookingAllocated(BookingAllocatedEvent),
    PassengersCancelled(PassengersCancelledEvent),
    PassengerPromoted(PassengerPromotedEvent),
    ChartPrepared(ChartPreparedEvent),
}

impl BookingEvent {
    /// Partition key; events for one PNR (or one chart run) stay ordered.
    pub fn key(&self) -> String {
        match self {
            BookingEvent::BookingAllocated(e) => e.pnr.clone(),
            BookingEvent::PassengersCancelled(e) => e.pnr.clone(),
            BookingEvent::PassengerPromoted(e) => e.pnr.clone(),
            BookingEvent::ChartPrepared(e) => {
                format!("{}:{}:{}", e.train_number, e.journey_date, e.coach_class)
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BookingEvent::BookingAllocated(_) => "BOOKING_ALLOCATED",
            BookingEvent::PassengersCancelled(_) => "PASSENGERS_CANCELLED",
            BookingEvent::PassengerPromoted(_) => "PASSENGER_PROMOTED",
            BookingEvent::ChartPrepared(_) => "CHART_PREPARED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_envelope_is_tagged() {
        let event = BookingEvent::ChartPrepared(ChartPreparedEvent {
            train_number: "12951".to_string(),
            journey_date: NaiveDate::from_ymd_opt(2026, 11, 2).unwrap(),
            coach_class: "3A".to_string(),
            rac_confirmed: 4,
            waitlist_cancelled: 2,
            timestamp: 0,
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "CHART_PREPARED");
        assert_eq!(json["rac_confirmed"], 4);
        assert_eq!(event.key(), "12951:2026-11-02:3A");
    }
}
