//! Zombie sweeper.
//!
//! One timer with period equal to the connection timeout. Each tick gathers
//! the framed sessions whose last activity is older than the timeout (under
//! the identity-table lock) and disconnects them afterwards. Push sessions
//! are driven by their transport's own close events and are never swept.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use helphub_proto::record::now_millis;

use crate::relay::Relay;

pub fn spawn(
    relay: Arc<Relay>,
    timeout: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(timeout);
        // The first tick of a tokio interval fires immediately; the sweep
        // starts one full period after startup.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => sweep(&relay, timeout),
            }
        }

        debug!("zombie sweeper stopped");
    })
}

fn sweep(relay: &Relay, timeout: Duration) {
    debug!("running connection cleanup");
    let cutoff = now_millis() - timeout.as_millis() as i64;

    for session in relay.framed_idle_since(cutoff) {
        info!(
            client_id = %session.identity(),
            idle_ms = now_millis() - session.last_activity(),
            "client timed out, disconnecting"
        );
        session.close();
    }
}
