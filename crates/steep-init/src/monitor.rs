//! Catch-up and readiness monitors.

use std::time::Duration;

use sqlx::PgPool;
use steep_engine::replication;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;

use crate::error::{InitError, Result};

/// Ceiling on every catch-up monitor.
pub const CATCHUP_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Interval between monitor polls.
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Replication lag below which a node counts as synchronized.
pub const LAG_THRESHOLD_BYTES: u64 = 1024 * 1024;

/// Waits until every relation of `subscription` reports ready.
///
/// `on_poll` observes `(ready, total)` each round, for progress updates.
pub async fn await_relations_ready<F>(
    pool: &PgPool,
    subscription: &str,
    cancel: &CancellationToken,
    timeout: Duration,
    mut on_poll: F,
) -> Result<()>
where
    F: FnMut(usize, usize),
{
    let deadline = Instant::now() + timeout;
    loop {
        if cancel.is_cancelled() {
            return Err(InitError::Cancelled);
        }
        let states = replication::relation_sync_states(pool, subscription).await?;
        let ready = states.iter().filter(|s| s.is_ready()).count();
        let total = states.len();
        on_poll(ready, total);

        if total > 0 && ready == total {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(InitError::Timeout {
                what: "initial table synchronization",
                secs: timeout.as_secs(),
            });
        }
        tokio::select! {
            () = cancel.cancelled() => return Err(InitError::Cancelled),
            () = sleep(POLL_INTERVAL) => {}
        }
    }
}

/// Waits until `subscription` has at least `min_workers` live workers and
/// lag below `lag_threshold` bytes.
pub async fn await_caught_up(
    pool: &PgPool,
    subscription: &str,
    min_workers: u32,
    lag_threshold: u64,
    cancel: &CancellationToken,
    timeout: Duration,
) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        if cancel.is_cancelled() {
            return Err(InitError::Cancelled);
        }
        let lag = replication::subscription_lag(pool, subscription).await?;
        tracing::debug!(
            subscription,
            workers = lag.workers,
            lag_bytes = lag.lag_bytes,
            "catch-up poll"
        );
        if lag.workers >= min_workers && lag.lag_bytes < lag_threshold {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(InitError::Timeout {
                what: "replication catch-up",
                secs: timeout.as_secs(),
            });
        }
        tokio::select! {
            () = cancel.cancelled() => return Err(InitError::Cancelled),
            () = sleep(POLL_INTERVAL) => {}
        }
    }
}
