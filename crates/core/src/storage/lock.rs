use anyhow::Context;
use chrono::{Datelike, NaiveDate};
use sqlx::pool::PoolConnection;
use sqlx::Postgres;

// Session-scoped advisory lock: one analysis run per run date at a time.
const LOCK_NAMESPACE: i64 = 0x4153_5833_3030; // "ASX300"

fn lock_key_for_date(run_date: NaiveDate) -> i64 {
    LOCK_NAMESPACE ^ (run_date.num_days_from_ce() as i64)
}

/// Held advisory lock. Pins the pooled connection that took it, since Postgres only lets the
/// owning session unlock.
#[derive(Debug)]
pub struct RunLock {
    conn: PoolConnection<Postgres>,
    key: i64,
}

/// `Ok(None)` when another session holds the lock for `run_date`.
pub async fn try_acquire_run_lock(
    pool: &sqlx::PgPool,
    run_date: NaiveDate,
) -> anyhow::Result<Option<RunLock>> {
    let key = lock_key_for_date(run_date);
    let mut conn = pool
        .acquire()
        .await
        .context("failed to acquire connection for run lock")?;

    let acquired: (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
        .persistent(false)
        .bind(key)
        .fetch_one(&mut *conn)
        .await
        .with_context(|| format!("failed to acquire advisory lock (key={key})"))?;

    Ok(acquired.0.then_some(RunLock { conn, key }))
}

impl RunLock {
    pub async fn release(mut self) -> anyhow::Result<()> {
        let key = self.key;
        let res = sqlx::query("SELECT pg_advisory_unlock($1)")
            .persistent(false)
            .bind(key)
            .execute(&mut *self.conn)
            .await;

        if let Err(e) = res {
            // Closing the session drops the lock; don't hand a locked connection back to the pool.
            drop(self.conn.detach());
            return Err(e).with_context(|| format!("failed to release advisory lock (key={key})"));
        }
        Ok(())
    }
}
