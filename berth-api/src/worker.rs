use berth_order::ReservationService;
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};

/// Poll for runs entering their chart window and chart them, then drop runs that
/// have already left.
pub async fn start_chart_worker(service: Arc<ReservationService>, poll_seconds: u64) {
    let mut ticker = interval(Duration::from_secs(poll_seconds.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Chart worker started, polling every {}s", poll_seconds);

    loop {
        ticker.tick().await;
        match service.run_chart_window().await {
            Ok(reports) => {
                for report in reports.iter().filter(|r| !r.already_prepared) {
                    info!(
                        "Chart prepared for {}: {} RAC confirmed, {} waitlisted cancelled",
                        report.key, report.rac_confirmed, report.waitlist_cancelled
                    );
                }
            }
            Err(e) => error!("Chart pass failed: {}", e),
        }
        if let Err(e) = service.retire_past_runs().await {
            error!("Retiring past runs failed: {}", e);
        }
    }
}
