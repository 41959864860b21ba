//! Per-connection keepalive: presence TTL refresh and transport pings.

use std::sync::Arc;

use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::message::Outbound;

use super::handle::ConnectionHandle;
use super::manager::{CloseReason, ConnectionManager};

/// Run the heartbeat loop for a connection until it starts closing.
///
/// Refreshes the presence entry every heartbeat interval and pings the
/// client every ping interval. A client silent for longer than the ping
/// timeout is closed with [`CloseReason::Timeout`].
pub async fn run_heartbeat(manager: Arc<ConnectionManager>, handle: Arc<ConnectionHandle>) {
    let cancel = handle.cancel_token().clone();
    let presence_every = manager.presence_config().heartbeat_interval();
    let ping_every = manager.config().ping_interval();
    let ping_timeout = manager.config().ping_timeout();

    let mut presence_tick = time::interval_at(Instant::now() + presence_every, presence_every);
    presence_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut ping_tick = time::interval_at(Instant::now() + ping_every, ping_every);
    ping_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = presence_tick.tick() => {
                manager.refresh_presence(&handle).await;
            }
            _ = ping_tick.tick() => {
                let idle = handle.idle_for().await;
                if idle > ping_timeout {
                    warn!(
                        conn_id = %handle.id,
                        idle_secs = idle.as_secs(),
                        "Connection heartbeat timeout"
                    );
                    manager.close(&handle, CloseReason::Timeout).await;
                    break;
                }
                if handle.send(Outbound::Ping).is_err() {
                    debug!(conn_id = %handle.id, "Ping not sent, stopping heartbeat");
                    break;
                }
            }
        }
    }

    debug!(conn_id = %handle.id, "Heartbeat loop ended");
}
