//! The null sink: accepts payloads and only updates stats, keeping nothing.

use std::sync::Arc;

use bytes::Bytes;

use super::{run_worker, Sink, SinkError, SinkHandle};
use crate::defaults;
use crate::stats::Stats;

pub struct NullSink {
    stats: Arc<Stats>,
}

#[async_trait::async_trait]
impl Sink for NullSink {
    async fn accept(&self, payload: Bytes) -> Result<(), SinkError> {
        self.stats.update(payload.len());
        Ok(())
    }
}

/// Spawn the worker loop and return a handle the sessions push onto. Kept
/// symmetric with the other sinks even though the sink itself does nothing
/// but record stats, so the collector never special-cases which sink is
/// active.
pub fn spawn(stats: Arc<Stats>) -> SinkHandle {
    let (tx, rx) = tokio::sync::mpsc::channel::<Bytes>(super::channel_capacity());
    let sink: Arc<dyn Sink> = Arc::new(NullSink { stats });
    tokio::spawn(run_worker(sink, rx, defaults::flush_period()));
    SinkHandle::new(tx)
}
