//! The collector's accept loop (§4.6, grounded on `runAsServer`/
//! `handleClient` in the original implementation): bind, accept, spawn a
//! session per connection.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{error, info, warn};

use super::session;
use crate::sink::SinkHandle;
use crate::stats::Stats;
use crate::transport::{tls, Identity};

pub struct Listener {
    tcp: TcpListener,
    acceptor: TlsAcceptor,
    sink: SinkHandle,
    stats: Arc<Stats>,
    ack_batch_period: Duration,
}

impl Listener {
    pub async fn bind(
        address: (&str, u16),
        identity: &Identity,
        sink: SinkHandle,
        stats: Arc<Stats>,
        ack_batch_period: Duration,
    ) -> crate::error::Result<Self> {
        let acceptor = tls::acceptor(identity)?;
        let tcp = TcpListener::bind(address).await?;
        info!(host = address.0, port = address.1, "listening");
        Ok(Listener {
            tcp,
            acceptor,
            sink,
            stats,
            ack_batch_period,
        })
    }

    /// The address actually bound, useful when `bind` was given port 0.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.tcp.local_addr()
    }

    /// Accept connections forever, spawning one session task per connection.
    /// A single failed accept is logged and retried; the loop never returns
    /// except by process exit.
    pub async fn serve(self) -> ! {
        loop {
            let (socket, peer) = match self.tcp.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "accept failed");
                    continue;
                }
            };
            if let Err(e) = socket.set_nodelay(true) {
                warn!(%peer, error = %e, "failed to set TCP_NODELAY");
            }

            let acceptor = self.acceptor.clone();
            let sink = self.sink.clone();
            let stats = self.stats.clone();
            let ack_batch_period = self.ack_batch_period;
            tokio::spawn(async move {
                match acceptor.accept(socket).await {
                    Ok(stream) => session::run(stream, peer, sink, stats, ack_batch_period).await,
                    Err(e) => warn!(%peer, error = %e, "TLS accept failed"),
                }
            });
        }
    }
}
