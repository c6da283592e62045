//! The client flusher and reconnect FSM (§4.4): a single background task
//! that coalesces outbound frames on a timer and owns the connection's
//! write half, promoting/demoting between `Disconnected` and `Connected`.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWriteExt, WriteHalf};
use tokio::sync::oneshot;
use tracing::warn;

use super::ack_reader;
use super::blob::Blob;
use super::connect::{self, Address, Connection};
use super::ring::RingBuffer;
use crate::stats::Stats;
use crate::transport::frame::encode_frame;
use crate::transport::Identity;

struct Connected {
    write_half: WriteHalf<Connection>,
    done: oneshot::Receiver<()>,
}

enum State {
    Disconnected,
    Connected(Connected),
}

pub struct Flusher {
    ring: Arc<RingBuffer>,
    blob: Arc<Blob>,
    stats: Arc<Stats>,
    addresses: Vec<Address>,
    identity: Identity,
    client_name: String,
    flush_period: Duration,
    handshake_timeout: Duration,
    failover_backoff: Duration,
}

impl Flusher {
    pub fn new(
        ring: Arc<RingBuffer>,
        blob: Arc<Blob>,
        stats: Arc<Stats>,
        addresses: Vec<Address>,
        identity: Identity,
        client_name: String,
        flush_period: Duration,
        handshake_timeout: Duration,
        failover_backoff: Duration,
    ) -> Self {
        Flusher {
            ring,
            blob,
            stats,
            addresses,
            identity,
            client_name,
            flush_period,
            handshake_timeout,
            failover_backoff,
        }
    }

    /// Rebuild `blob_in` from the ring's logical contents and hand the read
    /// half off to a freshly spawned ack reader.
    async fn establish(&self) -> Connected {
        let conn = connect::connect(
            &self.addresses,
            &self.identity,
            &self.client_name,
            self.handshake_timeout,
            self.failover_backoff,
        )
        .await;
        let (read_half, write_half) = tokio::io::split(conn);

        let mut rebuilt = Vec::new();
        self.ring
            .for_each_in_order(|payload| encode_frame(payload, &mut rebuilt));
        self.blob.replace(rebuilt);

        let (done_tx, done_rx) = oneshot::channel();
        let ring = self.ring.clone();
        let stats = self.stats.clone();
        tokio::spawn(async move {
            ack_reader::run(read_half, ring, stats, done_tx).await;
        });

        Connected {
            write_half,
            done: done_rx,
        }
    }

    /// Drive the flusher forever: one tick per `self.flush_period`.
    pub async fn run(self) {
        let mut state = State::Disconnected;
        let mut ticker = tokio::time::interval(self.flush_period);
        loop {
            ticker.tick().await;

            // The ack reader may have observed the connection close with
            // nothing queued to write, in which case `flush` would never be
            // called to notice. Check here so a dead, idle connection still
            // gets torn down promptly.
            if let State::Connected(ref mut connected) = state {
                if connected.done.try_recv() != Err(oneshot::error::TryRecvError::Empty) {
                    let _ = connected.write_half.shutdown().await;
                    state = State::Disconnected;
                }
            }

            if self.ring.is_empty() && self.blob.is_empty() {
                continue;
            }

            state = match state {
                State::Disconnected => State::Connected(self.establish().await),
                State::Connected(connected) => self.flush(connected).await,
            };
        }
    }

    /// Swap-and-write one tick's accumulated blob. On success the connection
    /// is kept; on any write failure the connection is torn down and we wait
    /// for the ack reader to observe the close before reporting
    /// `Disconnected`.
    async fn flush(&self, mut connected: Connected) -> State {
        let Some(batch) = self.blob.take() else {
            return State::Connected(connected);
        };

        match connected.write_half.write_all(&batch).await {
            Ok(()) => {
                self.stats.update(batch.len());
                State::Connected(connected)
            }
            Err(e) => {
                if e.kind() == std::io::ErrorKind::UnexpectedEof {
                    warn!("connection closed by collector during write");
                } else {
                    warn!(error = %e, "write failed");
                }
                // Put the frames back so they are retransmitted on reconnect; the
                // ring buffer still has them, and `establish` rebuilds from the
                // ring, not from this blob, so this is just defensive.
                let _ = connected.write_half.shutdown().await;
                let _ = connected.done.await;
                State::Disconnected
            }
        }
    }
}
