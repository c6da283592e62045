//! The client-side ack reader (§4.5): one task bound to the lifetime of a
//! single connection, translating raw ack bytes into ring-buffer releases.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::oneshot;
use tracing::{error, warn};

use crate::client::ring::RingBuffer;
use crate::defaults;
use crate::stats::Stats;

const ACK: u8 = 0x06;
const NAK: u8 = 0x15;

/// Run the ack reader loop until the connection errors or closes, then fire
/// `done` so the flusher can transition back to `Disconnected`.
pub async fn run<R: AsyncRead + Unpin>(
    mut reader: R,
    ring: Arc<RingBuffer>,
    stats: Arc<Stats>,
    done: oneshot::Sender<()>,
) {
    let mut buf = vec![0u8; defaults::ack_read_buffer()];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                warn!("connection closed by collector");
                break;
            }
            Ok(n) => {
                for &byte in &buf[..n] {
                    if byte == NAK {
                        warn!("received NAK");
                        stats.record_nak();
                    } else if byte != ACK {
                        warn!(byte, "received unexpected ack byte, treating as ack");
                    }
                }
                if let Err(err) = ring.pop(n) {
                    error!(%err, "fatal protocol invariant violation");
                    panic!("{}", err);
                }
                stats.record_ack_bytes(n);
            }
            Err(e) => {
                warn!(error = %e, "ack read failed");
                break;
            }
        }
    }
    let _ = done.send(());
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tokio::io::duplex;

    #[tokio::test]
    async fn ack_bytes_release_ring_slots() {
        let ring = Arc::new(RingBuffer::new(4));
        ring.push(Bytes::from_static(b"a")).await;
        ring.push(Bytes::from_static(b"b")).await;
        let stats = Arc::new(Stats::new());

        let (mut writer_side, reader_side) = duplex(64);
        let (done_tx, done_rx) = oneshot::channel();
        let ring_clone = ring.clone();
        let stats_clone = stats.clone();
        let handle = tokio::spawn(async move {
            run(reader_side, ring_clone, stats_clone, done_tx).await;
        });

        use tokio::io::AsyncWriteExt;
        writer_side.write_all(&[ACK, ACK]).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(ring.len(), 0);

        drop(writer_side);
        done_rx.await.unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn nak_still_releases_the_slot() {
        let ring = Arc::new(RingBuffer::new(4));
        ring.push(Bytes::from_static(b"a")).await;
        let stats = Arc::new(Stats::new());

        let (mut writer_side, reader_side) = duplex(64);
        let (done_tx, _done_rx) = oneshot::channel();
        let ring_clone = ring.clone();
        let stats_clone = stats.clone();
        tokio::spawn(async move {
            run(reader_side, ring_clone, stats_clone, done_tx).await;
        });

        use tokio::io::AsyncWriteExt;
        writer_side.write_all(&[NAK]).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(ring.len(), 0);
    }
}
