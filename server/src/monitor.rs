use crate::service::Service;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const MIN_SLEEP: Duration = Duration::from_millis(50);

/// Evicts participants whose heartbeat deadline elapsed.
///
/// Sleeps until the earliest deadline in the registry and re-checks; no
/// coordinator lock is held across the sleep. Exits when `shutdown` fires.
pub async fn monitor_heartbeats(service: Service, shutdown: CancellationToken) {
    info!("heartbeat monitor starting");
    loop {
        let expired = service.expired_participants(Instant::now()).await;
        for id in expired {
            info!(participant = %id, "heartbeat expired, evicting");
            service.remove_participant(&id).await;
        }

        let now = Instant::now();
        let wake_at = service.next_expiration(now).await.max(now + MIN_SLEEP);
        debug!(
            in_ms = wake_at.saturating_duration_since(now).as_millis() as u64,
            "monitor sleeping"
        );
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep_until(wake_at.into()) => {}
        }
    }
    info!("heartbeat monitor stopped");
}
