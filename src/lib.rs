//! `dlc-agent`: a mutually-authenticated, reconnecting log-shipping
//! pipeline. A client agent buffers application log records in an
//! ack-driven ring, ships them over a framed TLS connection, and retries
//! through a round-robin of collector addresses; a collector accepts those
//! connections, enriches payloads with the peer's reverse-DNS host, and
//! forwards them to a configurable sink.

pub mod cli;
pub mod client;
pub mod collector;
pub mod config;
pub mod defaults;
pub mod error;
pub mod pki;
pub mod sink;
pub mod stats;
pub mod transport;

pub use error::{Error, Result};
