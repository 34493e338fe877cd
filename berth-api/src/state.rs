use berth_order::ReservationService;
use berth_store::BroadcastEventSink;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ReservationService>,
    /// Feeds the server-sent event stream.
    pub events: BroadcastEventSink,
}
