//! The line-delimited JSON forwarder: each accepted payload is appended to
//! an internal blob as one newline-terminated line, which `flush` writes out
//! to a downstream TCP peer on the worker loop's timer.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;
use tracing::warn;

use super::{run_worker, Sink, SinkError, SinkHandle};
use crate::defaults;
use crate::stats::Stats;

pub struct LineJsonSink {
    address: String,
    conn: AsyncMutex<TcpStream>,
    blob: Mutex<Vec<u8>>,
    stats: Arc<Stats>,
}

/// Normalize embedded newlines out of a payload so it can be forwarded as a
/// single line, then append the line terminator.
fn normalize_line(payload: &Bytes, out: &mut Vec<u8>) {
    out.extend(payload.iter().map(|&b| match b {
        b'\n' | b'\r' => b' ',
        other => other,
    }));
    out.push(b'\n');
}

async fn connect_with_retry(address: &str) -> TcpStream {
    loop {
        match TcpStream::connect(address).await {
            Ok(stream) => return stream,
            Err(e) => {
                warn!(address, error = %e, "failed connecting to line-json sink, retrying");
                tokio::time::sleep(defaults::failover_backoff()).await;
            }
        }
    }
}

#[async_trait::async_trait]
impl Sink for LineJsonSink {
    async fn accept(&self, payload: Bytes) -> Result<(), SinkError> {
        self.stats.update(payload.len());
        let mut blob = self.blob.lock().unwrap();
        normalize_line(&payload, &mut blob);
        Ok(())
    }

    async fn flush(&self) {
        let batch = {
            let mut blob = self.blob.lock().unwrap();
            if blob.is_empty() {
                return;
            }
            std::mem::take(&mut *blob)
        };

        let mut conn = self.conn.lock().await;
        if let Err(e) = conn.write_all(&batch).await {
            warn!(address = %self.address, error = %e, "failed forwarding to line-json sink, reconnecting");
            *conn = connect_with_retry(&self.address).await;
        }
    }
}

/// Connect to `address`, then spawn the worker loop and return a handle the
/// collector pushes accepted payloads onto.
pub fn spawn(address: String, stats: Arc<Stats>) -> SinkHandle {
    let (tx, rx) = tokio::sync::mpsc::channel::<Bytes>(super::channel_capacity());
    tokio::spawn(async move {
        let conn = connect_with_retry(&address).await;
        let sink: Arc<dyn Sink> = Arc::new(LineJsonSink {
            address,
            conn: AsyncMutex::new(conn),
            blob: Mutex::new(Vec::new()),
            stats,
        });
        run_worker(sink, rx, defaults::flush_period()).await;
    });
    SinkHandle::new(tx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_line_replaces_embedded_newlines() {
        let payload = Bytes::from_static(b"{\"a\":1}\n");
        let mut out = Vec::new();
        normalize_line(&payload, &mut out);
        assert_eq!(out, b"{\"a\":1} \n".to_vec());
    }
}
