use crate::components::registry::StateBus;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Periodically announce a change for each static calendar.
///
/// Static calendars never change on their own, but "now" moves; the tick
/// lets subscribed filters roll their look-ahead window forward.
pub fn start_change_ticker(
    bus: StateBus,
    entity_ids: Vec<String>,
    period: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; filters refresh on start anyway
        ticker.tick().await;

        info!("Change ticker started for {} calendars", entity_ids.len());
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    for entity_id in &entity_ids {
                        debug!(entity_id = %entity_id, "Announcing calendar tick");
                        bus.notify(entity_id);
                    }
                }
            }
        }
        info!("Change ticker stopped");
    })
}
