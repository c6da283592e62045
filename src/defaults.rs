//! Named constants for the transport's tunables.
//!
//! Every value here can be overridden by a CLI flag or config file entry; these
//! are the values used when none is given.

use std::time::Duration;

/// Fixed capacity of the client-side ring buffer.
pub const fn ring_capacity() -> usize {
    10_000
}

/// Period of the client's coalescing flush tick.
pub const fn flush_period() -> Duration {
    Duration::from_millis(250)
}

/// Deadline for the TLS handshake and the `DLC\x01`/`DLCS` exchange.
pub const fn handshake_timeout() -> Duration {
    Duration::from_secs(15)
}

/// Sleep after a full round of addresses fails to connect.
pub const fn failover_backoff() -> Duration {
    Duration::from_secs(15)
}

/// Period on which the collector flushes accumulated ack bytes.
pub const fn ack_batch_period() -> Duration {
    Duration::from_millis(250)
}

/// Period on which the stats sidecar reports.
pub const fn stats_period() -> Duration {
    Duration::from_secs(10)
}

/// Read buffer size used by the client's ack reader.
pub const fn ack_read_buffer() -> usize {
    4096
}

/// Depth of the bounded channel feeding a collector sink.
pub const fn sink_channel_capacity() -> usize {
    1024
}

/// Default listen port for the collector.
pub const fn port() -> u16 {
    6514
}
