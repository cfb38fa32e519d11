//! Per-table quiesce locks.
//!
//! A quiesce lock is a session-scoped advisory lock keyed on the qualified
//! table name, taken on both nodes so cooperating writers block until the
//! merge finishes. Each side's locks live on one dedicated connection that
//! the guard owns. Release is guaranteed on every exit path: the happy
//! path unlocks explicitly; any other path (error, panic, cancellation)
//! drops the guard, which closes the dedicated connections, and the engine
//! frees session-scoped advisory locks when their session ends.

use std::time::Duration;

use sqlx::postgres::PgConnection;
use sqlx::{PgPool, Row};
use steep_engine::TableRef;
use tokio::time::{Instant, sleep};

use crate::error::{MergeError, Result};

/// Namespace seed for quiesce lock keys.
const LOCK_SEED: i64 = 0x5745_4550;

/// Poll interval while waiting on a contended lock.
const RETRY_INTERVAL: Duration = Duration::from_millis(100);

fn lock_key(table: &TableRef) -> String {
    format!("steep:quiesce:{table}")
}

/// Holds quiesce locks on both sides of a merge.
pub struct QuiesceSet {
    local: PgConnection,
    remote: PgConnection,
    held: Vec<String>,
    released: bool,
}

impl QuiesceSet {
    /// Acquires one dedicated connection per side.
    pub async fn connect(local: &PgPool, remote: &PgPool) -> Result<Self> {
        let local = local.acquire().await?.detach();
        let remote = remote.acquire().await?.detach();
        Ok(Self {
            local,
            remote,
            held: Vec::new(),
            released: false,
        })
    }

    /// Acquires the quiesce lock for `table` on both sides, local first.
    pub async fn acquire(&mut self, table: &TableRef, timeout: Duration) -> Result<()> {
        let key = lock_key(table);
        try_lock_until(&mut self.local, &key, timeout)
            .await
            .map_err(|e| annotate_timeout(e, table, "local"))?;
        try_lock_until(&mut self.remote, &key, timeout)
            .await
            .map_err(|e| annotate_timeout(e, table, "remote"))?;
        self.held.push(key);
        tracing::debug!(table = %table, "quiesce lock acquired on both nodes");
        Ok(())
    }

    /// Number of tables currently quiesced.
    pub fn held(&self) -> usize {
        self.held.len()
    }

    /// Releases every held lock. Idempotent; the dedicated sessions close
    /// when the set is dropped.
    pub async fn release_all(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        for key in &self.held {
            unlock(&mut self.local, key).await;
            unlock(&mut self.remote, key).await;
        }
        self.held.clear();
        self.released = true;
        tracing::debug!("quiesce locks released");
        Ok(())
    }
}

impl Drop for QuiesceSet {
    fn drop(&mut self) {
        if !self.released && !self.held.is_empty() {
            // Dropping the dedicated connections closes their sessions;
            // the engine releases session-scoped advisory locks with them.
            tracing::warn!(
                held = self.held.len(),
                "quiesce set dropped without explicit release; closing lock sessions"
            );
        }
    }
}

async fn try_lock_until(conn: &mut PgConnection, key: &str, timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        let row = sqlx::query("SELECT pg_try_advisory_lock(hashtextextended($1, $2)) AS ok")
            .bind(key)
            .bind(LOCK_SEED)
            .fetch_one(&mut *conn)
            .await?;
        if row.get::<bool, _>("ok") {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(MergeError::QuiesceTimeout {
                table: key.to_string(),
                side: "unknown",
                timeout_ms: timeout.as_millis() as u64,
            });
        }
        sleep(RETRY_INTERVAL).await;
    }
}

async fn unlock(conn: &mut PgConnection, key: &str) {
    let result = sqlx::query("SELECT pg_advisory_unlock(hashtextextended($1, $2))")
        .bind(key)
        .bind(LOCK_SEED)
        .execute(&mut *conn)
        .await;
    if let Err(e) = result {
        tracing::warn!(key, error = %e, "advisory unlock failed; session close will free it");
    }
}

fn annotate_timeout(err: MergeError, table: &TableRef, side: &'static str) -> MergeError {
    match err {
        MergeError::QuiesceTimeout { timeout_ms, .. } => MergeError::QuiesceTimeout {
            table: table.to_string(),
            side,
            timeout_ms,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_keys_are_table_scoped() {
        let orders = lock_key(&TableRef::new("public", "orders"));
        let users = lock_key(&TableRef::new("public", "users"));
        assert_eq!(orders, "steep:quiesce:public.orders");
        assert_ne!(orders, users);
    }
}
