//! The framed-stream transport: wire framing, handshake, and mutual-TLS
//! channel setup shared by the client and collector.

pub mod frame;
pub mod handshake;
pub mod pem;
pub mod tls;

pub use tls::Identity;
