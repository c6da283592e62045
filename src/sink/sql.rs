//! The SQL sink: batches accepted payloads and inserts them into a
//! `log_records` table, flushing on a timer or when the batch fills,
//! whichever comes first.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use chrono::Utc;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use tracing::warn;

use super::{run_worker, Sink, SinkError, SinkHandle};
use crate::stats::Stats;

pub struct SqlSink {
    pool: Arc<MySqlPool>,
    stats: Arc<Stats>,
    batch: Mutex<Vec<Bytes>>,
    batch_size: usize,
}

/// Open the pool and create `log_records` if it doesn't already exist,
/// mirroring the teacher's one-shot pool-open-then-migrate pattern.
pub async fn connect(url: &str) -> anyhow::Result<Arc<MySqlPool>> {
    let pool = MySqlPoolOptions::new()
        .max_connections(4)
        .connect(url)
        .await
        .with_context(|| format!("could not open MySQL database at \"{}\"", url))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS log_records (
            id BIGINT NOT NULL AUTO_INCREMENT,
            received_at DATETIME NOT NULL,
            payload TEXT NOT NULL,
            PRIMARY KEY (id)
        ) ENGINE=INNODB
        "#,
    )
    .execute(&pool)
    .await
    .context("could not create log_records table")?;

    Ok(Arc::new(pool))
}

async fn write_batch(pool: &MySqlPool, batch: &[Bytes]) {
    if batch.is_empty() {
        return;
    }
    let now = Utc::now().naive_utc();
    for payload in batch {
        let text = String::from_utf8_lossy(payload);
        if let Err(e) = sqlx::query("INSERT INTO log_records (received_at, payload) VALUES (?, ?)")
            .bind(now)
            .bind(text.as_ref())
            .execute(pool)
            .await
        {
            warn!(error = %e, "failed to insert log record");
        }
    }
}

#[async_trait::async_trait]
impl Sink for SqlSink {
    async fn accept(&self, payload: Bytes) -> Result<(), SinkError> {
        self.stats.update(payload.len());
        let full = {
            let mut batch = self.batch.lock().unwrap();
            batch.push(payload);
            batch.len() >= self.batch_size
        };
        if full {
            self.flush().await;
        }
        Ok(())
    }

    async fn flush(&self) {
        let batch = {
            let mut batch = self.batch.lock().unwrap();
            if batch.is_empty() {
                return;
            }
            std::mem::take(&mut *batch)
        };
        write_batch(&self.pool, &batch).await;
    }
}

/// Spawn the batching worker and return a handle the collector pushes
/// accepted payloads onto. `batch_size` bounds how many rows accumulate
/// before an out-of-cycle flush.
pub fn spawn(pool: Arc<MySqlPool>, stats: Arc<Stats>, batch_size: usize, flush_period: Duration) -> SinkHandle {
    let (tx, rx) = tokio::sync::mpsc::channel::<Bytes>(super::channel_capacity());
    let sink: Arc<dyn Sink> = Arc::new(SqlSink {
        pool,
        stats,
        batch: Mutex::new(Vec::with_capacity(batch_size)),
        batch_size,
    });
    tokio::spawn(run_worker(sink, rx, flush_period));
    SinkHandle::new(tx)
}
