pub mod models;
pub mod pii;

pub use models::events::{
    BookingAllocatedEvent, BookingEvent, ChartPreparedEvent, PassengerPromotedEvent,
    PassengersCancelledEvent,
};
pub use pii::Masked;
