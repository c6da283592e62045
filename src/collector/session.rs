//! The collector's per-connection session (§4.6): handshake, frame decode
//! loop, host enrichment, handoff to the sink, and a batched ack writer.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncWriteExt, WriteHalf};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::defaults;
use crate::sink::SinkHandle;
use crate::stats::Stats;
use crate::transport::frame::decode_frame;
use crate::transport::handshake;

const ACK: u8 = 0x06;

/// Splice `"host":"<host>"` into a JSON object payload that doesn't already
/// carry a `host` key. Operates at the byte-substring level: no parsing, no
/// re-serialization, matching the wire-level contract this collector
/// promises sinks.
fn enrich_with_host(payload: &[u8], host: &str) -> Bytes {
    let trimmed_start = payload.iter().position(|&b| !b.is_ascii_whitespace());
    let Some(start) = trimmed_start else {
        return Bytes::copy_from_slice(payload);
    };
    if payload[start] != b'{' {
        return Bytes::copy_from_slice(payload);
    }
    if contains_host_key(payload) {
        return Bytes::copy_from_slice(payload);
    }

    let insertion = format!("\"host\":{:?},", host);
    let mut out = Vec::with_capacity(payload.len() + insertion.len());
    out.extend_from_slice(&payload[..=start]);
    out.extend_from_slice(insertion.as_bytes());
    out.extend_from_slice(&payload[start + 1..]);
    Bytes::from(out)
}

fn contains_host_key(payload: &[u8]) -> bool {
    payload.windows(6).any(|w| w == b"\"host\"")
}

/// Build the synthetic connect/close log records the collector sink sees in
/// addition to forwarded client payloads.
fn synthetic_record(event: &str, name: &str, host: &str) -> Bytes {
    let record = serde_json::json!({
        "event": event,
        "name": name,
        "host": host,
        "time": chrono::Utc::now().to_rfc3339(),
    });
    Bytes::from(record.to_string().into_bytes())
}

/// Best-effort reverse DNS of the peer address; `"???"` on any failure,
/// trailing dot trimmed from a successful PTR lookup. The lookup is a
/// blocking libc call, so it runs on the blocking pool.
async fn reverse_dns(peer: SocketAddr) -> String {
    let ip = peer.ip();
    tokio::task::spawn_blocking(move || dns_lookup::lookup_addr(&ip))
        .await
        .ok()
        .and_then(|r| r.ok())
        .map(|host| host.trim_end_matches('.').to_string())
        .unwrap_or_else(|| "???".to_string())
}

/// Run one accepted connection to completion: handshake, frame loop, ack
/// writer, synthetic connect/close records. Never propagates an error to the
/// caller; every failure is logged and ends the session.
pub async fn run<S>(
    mut stream: S,
    peer: SocketAddr,
    sink: SinkHandle,
    stats: std::sync::Arc<Stats>,
    ack_batch_period: Duration,
) where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    let hello = match tokio::time::timeout(defaults::handshake_timeout(), handshake::server::accept(&mut stream)).await {
        Ok(Ok(hello)) => hello,
        Ok(Err(e)) => {
            warn!(%peer, error = %e, "handshake failed");
            return;
        }
        Err(_) => {
            warn!(%peer, "handshake timed out");
            return;
        }
    };

    let host = reverse_dns(peer).await;
    info!(%peer, name = %hello.name, %host, "accepted connection");
    let _ = sink
        .push(synthetic_record("accept connection", &hello.name, &host))
        .await;

    let (read_half, write_half) = tokio::io::split(stream);
    let (ack_tx, ack_rx) = mpsc::channel::<u8>(defaults::ack_read_buffer());
    let ack_writer = tokio::spawn(run_ack_writer(write_half, ack_rx, ack_batch_period));

    run_frame_loop(read_half, &hello.name, &host, &sink, &stats, &ack_tx).await;

    drop(ack_tx);
    let _ = ack_writer.await;
    let _ = sink
        .push(synthetic_record("close connection", &hello.name, &host))
        .await;
    info!(%peer, name = %hello.name, %host, "closed connection");
}

async fn run_frame_loop<R>(
    mut reader: R,
    name: &str,
    host: &str,
    sink: &SinkHandle,
    stats: &std::sync::Arc<Stats>,
    ack_tx: &mpsc::Sender<u8>,
) where
    R: tokio::io::AsyncRead + Unpin,
{
    loop {
        let payload = match decode_frame(&mut reader).await {
            Ok(payload) => payload,
            Err(e) => {
                if e.is_eof() {
                    info!(name, host, "connection closed by client");
                } else {
                    warn!(name, host, error = %e, "frame decode failed");
                }
                break;
            }
        };

        stats.update(payload.len());
        let enriched = enrich_with_host(&payload, host);
        if sink.push(enriched).await.is_err() {
            warn!(name, host, "sink channel closed, ending session");
            break;
        }
        if ack_tx.send(ACK).await.is_err() {
            break;
        }
    }
}

/// Batch ack bytes and flush every `ack_batch_period`; exits once the
/// channel closes (the frame loop ended).
async fn run_ack_writer<W>(mut writer: WriteHalf<W>, mut ack_rx: mpsc::Receiver<u8>, ack_batch_period: Duration)
where
    W: tokio::io::AsyncWrite + Unpin,
{
    let mut buffer = Vec::new();
    let mut ticker = tokio::time::interval(ack_batch_period);
    loop {
        tokio::select! {
            received = ack_rx.recv() => {
                match received {
                    Some(byte) => buffer.push(byte),
                    None => {
                        if !buffer.is_empty() {
                            let _ = writer.write_all(&buffer).await;
                        }
                        let _ = writer.shutdown().await;
                        return;
                    }
                }
            }
            _ = ticker.tick() => {
                if buffer.is_empty() {
                    continue;
                }
                if let Err(e) = writer.write_all(&buffer).await {
                    warn!(error = %e, "ack write failed");
                    continue;
                }
                buffer.clear();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enriches_json_object_missing_host() {
        let enriched = enrich_with_host(br#"{"level":"info"}"#, "10.0.0.1");
        let text = String::from_utf8(enriched.to_vec()).unwrap();
        assert!(text.starts_with(r#"{"host":"10.0.0.1","level"#));
    }

    #[test]
    fn leaves_json_object_with_host_untouched() {
        let original = br#"{"host":"already-there"}"#;
        let enriched = enrich_with_host(original, "10.0.0.1");
        assert_eq!(enriched.as_ref(), original);
    }

    #[test]
    fn leaves_non_object_payloads_untouched() {
        let original = br#""just a string""#;
        let enriched = enrich_with_host(original, "10.0.0.1");
        assert_eq!(enriched.as_ref(), original);
    }
}
