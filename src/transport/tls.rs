//! Mutual-TLS channel setup. Both client and collector load their identity
//! and the shared CA bundle fresh on every connect/accept attempt, so key
//! rotation on disk takes effect without a restart.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::rustls::{
    AllowAnyAuthenticatedClient, Certificate, ClientConfig, NoClientAuth, PrivateKey,
    RootCertStore, ServerConfig,
};
use tokio_rustls::webpki::DNSNameRef;
use tokio_rustls::{TlsAcceptor, TlsConnector};

use super::pem;
use crate::error::{Error, Result};

/// Paths to the three PEM files read at each connect/accept: the shared CA
/// bundle, this peer's certificate chain, and this peer's private key.
#[derive(Debug, Clone)]
pub struct Identity {
    pub ca_bundle: std::path::PathBuf,
    pub certificate: std::path::PathBuf,
    pub private_key: std::path::PathBuf,
}

fn root_store(ca_bundle: &std::path::Path) -> Result<RootCertStore> {
    let mut roots = RootCertStore::empty();
    for cert in pem::read_certificates(ca_bundle)? {
        roots
            .add(&cert)
            .map_err(|e| Error::config(format!("invalid CA certificate: {:?}", e)))?;
    }
    Ok(roots)
}

/// Build a client TLS config requiring the server certificate to chain to
/// the shared CA and presenting this client's own certificate for mutual
/// authentication. Called fresh on every connection attempt.
pub fn load_client_config(identity: &Identity) -> Result<ClientConfig> {
    let mut config = ClientConfig::new();
    config.root_store = root_store(&identity.ca_bundle)?;

    let certs = pem::read_certificates(&identity.certificate)?;
    let key = pem::read_private_key(&identity.private_key)?;
    config
        .set_single_client_cert(certs, key)
        .map_err(|e| Error::config(format!("invalid client certificate/key: {}", e)))?;

    Ok(config)
}

/// Build a server TLS config that requires and verifies a client
/// certificate chaining to the shared CA. Called fresh on every listener
/// startup (and could be re-built per accept to pick up rotated keys).
pub fn load_server_config(identity: &Identity) -> Result<ServerConfig> {
    let roots = root_store(&identity.ca_bundle)?;
    let mut config = ServerConfig::new(AllowAnyAuthenticatedClient::new(roots));

    let certs = pem::read_certificates(&identity.certificate)?;
    let key = pem::read_private_key(&identity.private_key)?;
    config
        .set_single_cert(certs, key)
        .map_err(|e| Error::config(format!("invalid server certificate/key: {}", e)))?;

    Ok(config)
}

/// A server config with client auth disabled, used only by test helpers that
/// want a plain TLS listener. Not reachable from the CLI.
#[cfg(test)]
pub fn load_server_config_no_client_auth(
    certificate: &std::path::Path,
    private_key: &std::path::Path,
) -> Result<ServerConfig> {
    let mut config = ServerConfig::new(NoClientAuth::new());
    let certs = pem::read_certificates(certificate)?;
    let key = pem::read_private_key(private_key)?;
    config
        .set_single_cert(certs, key)
        .map_err(|e| Error::config(format!("invalid server certificate/key: {}", e)))?;
    Ok(config)
}

/// Dial `host:port`, reloading certificates from `identity`, and return the
/// established TLS stream. Hostname verification against `host` is always
/// performed (never skipped in a release build).
pub async fn dial(
    host: &str,
    port: u16,
    identity: &Identity,
    handshake_timeout: Duration,
) -> Result<tokio_rustls::client::TlsStream<TcpStream>> {
    let config = load_client_config(identity)?;
    let connector = TlsConnector::from(Arc::new(config));
    let dns_name = DNSNameRef::try_from_ascii_str(host)
        .map_err(|e| Error::config(format!("invalid DNS name '{}': {:?}", host, e)))?;

    let tcp = timeout(handshake_timeout, TcpStream::connect((host, port)))
        .await
        .map_err(|_| Error::connect(format!("TCP connect to {}:{} timed out", host, port)))??;
    tcp.set_nodelay(true)?;

    let tls = timeout(handshake_timeout, connector.connect(dns_name, tcp))
        .await
        .map_err(|_| Error::connect(format!("TLS handshake with {}:{} timed out", host, port)))??;
    Ok(tls)
}

/// Build a `TlsAcceptor` from a freshly loaded server identity.
pub fn acceptor(identity: &Identity) -> Result<TlsAcceptor> {
    let config = load_server_config(identity)?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Marker bound used by code that is generic over "any full-duplex byte
/// stream", i.e. a TLS stream in production or an in-memory duplex in tests.
pub trait Stream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Stream for T {}
