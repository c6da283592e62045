//! The client agent (§4.3, §4.4): accepts payloads from the application,
//! queues them in the ring buffer, frames them into the outbound blob, and
//! hands flushing off to a background task.

pub mod ack_reader;
pub mod blob;
pub mod connect;
pub mod flusher;
pub mod ring;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use self::blob::Blob;
use self::connect::Address;
use self::flusher::Flusher;
use self::ring::RingBuffer;
use crate::defaults;
use crate::stats::{self, Stats};
use crate::transport::frame::encode_frame;
use crate::transport::Identity;

/// Configuration needed to stand up an `Agent`.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub addresses: Vec<Address>,
    pub identity: Identity,
    pub client_name: String,
    pub ring_capacity: usize,
    pub stats_period: Duration,
    pub flush_period: Duration,
    pub handshake_timeout: Duration,
    pub failover_backoff: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            addresses: Vec::new(),
            identity: Identity {
                ca_bundle: Default::default(),
                certificate: Default::default(),
                private_key: Default::default(),
            },
            client_name: String::new(),
            ring_capacity: defaults::ring_capacity(),
            stats_period: defaults::stats_period(),
            flush_period: defaults::flush_period(),
            handshake_timeout: defaults::handshake_timeout(),
            failover_backoff: defaults::failover_backoff(),
        }
    }
}

/// The handle the rest of the process holds: `send` queues a payload and
/// returns as soon as it has been appended to the ring and blob. All actual
/// network I/O happens on the flusher task spawned by `Agent::start`.
pub struct Agent {
    ring: Arc<RingBuffer>,
    blob: Arc<Blob>,
    stats: Arc<Stats>,
}

impl Agent {
    /// Build the shared queue/blob state and spawn the flusher and stats
    /// reporter tasks. The returned `Agent` is the only handle the caller
    /// needs to keep around.
    pub fn start(config: AgentConfig) -> Self {
        let ring = Arc::new(RingBuffer::new(config.ring_capacity));
        let blob = Arc::new(Blob::new());
        let stats = Arc::new(Stats::new());

        let flusher = Flusher::new(
            ring.clone(),
            blob.clone(),
            stats.clone(),
            config.addresses,
            config.identity,
            config.client_name,
            config.flush_period,
            config.handshake_timeout,
            config.failover_backoff,
        );
        tokio::spawn(flusher.run());
        stats::spawn_reporter(stats.clone(), "client", config.stats_period);

        Agent { ring, blob, stats }
    }

    /// Queue one log record for delivery. Blocks (asynchronously) while the
    /// ring buffer is full, providing backpressure to the caller (§4.3
    /// invariant 4).
    ///
    /// The queue lock is always acquired before the blob lock: `ring.push`
    /// completes and releases its lock before `blob.append` takes its own.
    pub async fn send(&self, payload: Bytes) {
        let mut framed = Vec::new();
        encode_frame(&payload, &mut framed);
        self.ring.push(payload).await;
        self.blob.append(&framed);
    }

    pub fn queued(&self) -> usize {
        self.ring.len()
    }

    pub fn stats(&self) -> &Arc<Stats> {
        &self.stats
    }
}
