use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use transix_engine::ReservationService;

/// Periodic expiry sweep. The sweeper itself is a pure function over "now"
/// and store state; this loop only supplies the timer.
pub async fn start_sweep_worker(service: Arc<ReservationService>, every: Duration) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(interval_seconds = every.as_secs(), "expiry sweep worker started");

    loop {
        ticker.tick().await;
        match service.sweeper.sweep().await {
            Ok(report) if report.expired.is_empty() => {}
            Ok(report) => info!(
                expired = report.expired.len(),
                trips = report.trips.len(),
                "sweep expired stale reservations"
            ),
            Err(e) => error!("sweep failed: {e}"),
        }
    }
}
