//! The reconnect/failover state machine (§4.4): round-robin the configured
//! addresses, reload certificates on every attempt, and back off 15s after a
//! full unsuccessful round.

use std::time::Duration;

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::transport::{handshake, tls, Identity};

/// A `host:port` pair for one collector endpoint.
#[derive(Debug, Clone)]
pub struct Address {
    pub host: String,
    pub port: u16,
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl std::str::FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| Error::config(format!("address '{}' is missing a port", s)))?;
        let port: u16 = port
            .parse()
            .map_err(|_| Error::config(format!("invalid port in address '{}'", s)))?;
        Ok(Address {
            host: host.to_string(),
            port,
        })
    }
}

/// A live, handshaken connection ready for the flusher to write to.
pub type Connection = tokio_rustls::client::TlsStream<tokio::net::TcpStream>;

/// Dial one address: TLS connect (with reloaded certs), then the v1
/// handshake. Any failure is a `ConnectError`.
async fn connect_to(
    address: &Address,
    identity: &Identity,
    client_name: &str,
    handshake_timeout: Duration,
) -> Result<Connection> {
    let mut stream = tls::dial(&address.host, address.port, identity, handshake_timeout)
        .await
        .map_err(|e| Error::connect(format!("dial {} failed: {}", address, e)))?;

    tokio::time::timeout(handshake_timeout, handshake::client::run(&mut stream, client_name))
        .await
        .map_err(|_| Error::connect(format!("handshake with {} timed out", address)))?
        .map_err(|e| Error::connect(format!("handshake with {} failed: {}", address, e)))?;

    Ok(stream)
}

/// Round-robin the address list, sleeping `failover_backoff` after every
/// address fails once. Only returns once a connection succeeds; there is no
/// external cancellation other than dropping the future.
pub async fn connect(
    addresses: &[Address],
    identity: &Identity,
    client_name: &str,
    handshake_timeout: Duration,
    failover_backoff: Duration,
) -> Connection {
    assert!(!addresses.is_empty(), "no collector addresses configured");
    loop {
        for address in addresses {
            match connect_to(address, identity, client_name, handshake_timeout).await {
                Ok(conn) => {
                    info!(%address, "connected");
                    return conn;
                }
                Err(e) => {
                    if e.is_eof() {
                        warn!(%address, "connection closed by collector during connect");
                    } else {
                        warn!(%address, error = %e, "connect attempt failed");
                    }
                }
            }
        }
        warn!(
            seconds = failover_backoff.as_secs(),
            "full round of addresses failed, backing off"
        );
        tokio::time::sleep(failover_backoff).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_parses_host_and_port() {
        let addr: Address = "collector.example.com:6514".parse().unwrap();
        assert_eq!(addr.host, "collector.example.com");
        assert_eq!(addr.port, 6514);
    }

    #[test]
    fn address_rejects_missing_port() {
        assert!("collector.example.com".parse::<Address>().is_err());
    }

    #[test]
    fn address_rejects_non_numeric_port() {
        assert!("host:abc".parse::<Address>().is_err());
    }
}
