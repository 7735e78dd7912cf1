//! Instrumented transactions
//!
//! Every reconciliation pass runs inside one or two write transactions. These
//! helpers log how long the pass waited for a connection and how long it held
//! it, which is what matters when the monitor shares the store with upstream
//! writers.

use spm_common::Result;
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use std::time::Instant;
use tracing::{debug, info, warn};

const SLOW_ACQUIRE_MS: u128 = 1000;
const LONG_HOLD_MS: u128 = 2000;

/// Tracks hold time and reports releases that never went through
/// commit/rollback
struct HoldTimer {
    caller: &'static str,
    acquired_at: Instant,
    released: bool,
}

impl HoldTimer {
    fn release(&mut self, how: &'static str) {
        self.released = true;
        let held_ms = self.acquired_at.elapsed().as_millis();
        if held_ms > LONG_HOLD_MS {
            warn!(caller = self.caller, held_ms, how, "Long transaction");
        } else {
            debug!(caller = self.caller, held_ms, how, "Connection released");
        }
    }
}

impl Drop for HoldTimer {
    fn drop(&mut self) {
        if !self.released {
            // sqlx rolls the transaction back when it is dropped
            info!(
                caller = self.caller,
                held_ms = self.acquired_at.elapsed().as_millis(),
                "Transaction dropped without commit, rolled back"
            );
        }
    }
}

/// A transaction that logs acquisition and release timing
pub struct MonitoredTransaction<'c> {
    tx: Transaction<'c, Sqlite>,
    timer: HoldTimer,
}

impl<'c> MonitoredTransaction<'c> {
    /// Connection to run repository calls against
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    pub async fn commit(self) -> Result<()> {
        let Self { tx, mut timer } = self;
        tx.commit().await?;
        timer.release("commit");
        Ok(())
    }

    pub async fn rollback(self) -> Result<()> {
        let Self { tx, mut timer } = self;
        tx.rollback().await?;
        timer.release("rollback");
        Ok(())
    }
}

/// Begin a transaction on `pool`, logging how long the connection took
///
/// ```ignore
/// let mut tx = begin_monitored(&pool, "learning_items::detect").await?;
/// repos.monitors.bulk_upsert(tx.conn(), &records).await?;
/// tx.commit().await?;
/// ```
pub async fn begin_monitored<'c>(
    pool: &'c SqlitePool,
    caller: &'static str,
) -> Result<MonitoredTransaction<'c>> {
    let start = Instant::now();
    let tx = pool.begin().await?;

    let wait_ms = start.elapsed().as_millis();
    if wait_ms > SLOW_ACQUIRE_MS {
        warn!(caller, wait_ms, "Slow connection acquisition, pool may be saturated");
    } else {
        debug!(caller, wait_ms, "Connection acquired");
    }

    Ok(MonitoredTransaction {
        tx,
        timer: HoldTimer {
            caller,
            acquired_at: Instant::now(),
            released: false,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query("CREATE TABLE t (v INTEGER NOT NULL)")
            .execute(&pool)
            .await
            .unwrap();
        pool
    }

    async fn count(pool: &SqlitePool) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM t")
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_commit_persists() {
        let pool = setup_pool().await;

        let mut tx = begin_monitored(&pool, "test").await.unwrap();
        sqlx::query("INSERT INTO t (v) VALUES (1)")
            .execute(tx.conn())
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(count(&pool).await, 1);
    }

    #[tokio::test]
    async fn test_rollback_and_drop_discard() {
        let pool = setup_pool().await;

        let mut tx = begin_monitored(&pool, "test").await.unwrap();
        sqlx::query("INSERT INTO t (v) VALUES (1)")
            .execute(tx.conn())
            .await
            .unwrap();
        tx.rollback().await.unwrap();

        {
            let mut tx = begin_monitored(&pool, "test").await.unwrap();
            sqlx::query("INSERT INTO t (v) VALUES (2)")
                .execute(tx.conn())
                .await
                .unwrap();
        }

        assert_eq!(count(&pool).await, 0);
    }
}
