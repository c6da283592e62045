//! The collector role (§4.6): accepts mutually-authenticated connections,
//! decodes frames, enriches and forwards payloads to the configured sink.

pub mod listener;
pub mod session;

pub use listener::Listener;
