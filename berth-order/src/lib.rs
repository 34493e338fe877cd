pub mod allocation;
pub mod cancellation;
pub mod chart;
pub mod models;
pub mod pnr;
pub mod service;

#[cfg(test)]
mod fixtures;

pub use allocation::{AllocationEngine, AllocationPlan, PlannedPassenger};
pub use cancellation::{CancellationEngine, CancellationOutcome};
pub use chart::{ChartOutcome, ChartWindow};
pub use models::{
    AllocationReceipt, AllocationRequest, CancellationReceipt, ChartReport, PassengerOutcome,
    PassengerRequest, PassengerStatusLine, PnrStatusView, Promotion, RefundLine,
};
pub use service::{BookingRules, ReservationService};
