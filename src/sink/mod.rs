//! The downstream sink abstraction (§4.9): whatever the collector hands a
//! payload to after accepting a frame, behind one trait so the collector
//! session never needs to know which concrete sink is configured.

pub mod line_json;
pub mod null;
pub mod sql;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::defaults;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink channel closed")]
    Closed,
}

/// What happens to an accepted payload once it has been framed, enriched and
/// acked on the wire (§4.9). `accept` buffers (or immediately writes) one
/// payload; `flush` is driven by the shared worker loop below, on a timer
/// and once more at shutdown, so a sink that batches internally (the SQL and
/// line-JSON sinks) gets a place to push its buffer out. A sink with nothing
/// to batch, like the null sink, can leave the default no-op.
#[async_trait::async_trait]
pub trait Sink: Send + Sync {
    async fn accept(&self, payload: Bytes) -> Result<(), SinkError>;

    async fn flush(&self) {}
}

/// Drive `sink` from `rx` until the channel closes: every received payload
/// goes through `accept`, every tick and the final close trigger a `flush`.
/// Each concrete sink's `spawn` wraps this in a `tokio::spawn`, after doing
/// whatever async setup (connecting a pool or socket) that sink needs first.
pub(crate) async fn run_worker(sink: Arc<dyn Sink>, mut rx: mpsc::Receiver<Bytes>, flush_period: Duration) {
    let mut ticker = tokio::time::interval(flush_period);
    loop {
        tokio::select! {
            received = rx.recv() => {
                match received {
                    Some(payload) => {
                        let _ = sink.accept(payload).await;
                    }
                    None => {
                        sink.flush().await;
                        return;
                    }
                }
            }
            _ = ticker.tick() => {
                sink.flush().await;
            }
        }
    }
}

/// The cheap, cloneable channel handle the collector's session tasks push
/// accepted payloads onto.
pub struct SinkHandle {
    tx: mpsc::Sender<Bytes>,
}

impl SinkHandle {
    pub fn new(tx: mpsc::Sender<Bytes>) -> Self {
        SinkHandle { tx }
    }

    pub async fn push(&self, payload: Bytes) -> Result<(), SinkError> {
        self.tx.send(payload).await.map_err(|_| SinkError::Closed)
    }
}

impl Clone for SinkHandle {
    fn clone(&self) -> Self {
        SinkHandle {
            tx: self.tx.clone(),
        }
    }
}

/// Channel capacity shared by every sink's inbound queue.
pub fn channel_capacity() -> usize {
    defaults::sink_channel_capacity()
}
