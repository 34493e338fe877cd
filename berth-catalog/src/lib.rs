pub mod layout;
pub mod policy;
pub mod pricing;
pub mod refund;

pub use layout::{CoachLayout, LayoutError, SeatLayoutMapper};
pub use policy::{AllocationStrategy, OverflowPolicy, QuotaPolicy};
pub use pricing::{FareCalculator, FareError, FarePassenger, FareQuote, FareRate, PassengerFare, PricingConfig};
pub use refund::{PolicyError, RefundAssessment, RefundPolicy, RefundTier};
