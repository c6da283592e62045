//! The stats sidecar (§4.7): counts bytes/messages fed to it via `update`
//! and periodically reports rate, throughput and process CPU usage through
//! the structured log stream. Purely observational — it never participates
//! in transport correctness.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use sysinfo::{PidExt, ProcessExt, System, SystemExt};
use tracing::info;

/// Accumulated counters, updated from whichever code path owns the bytes
/// being measured (client send path, collector receive path, ack reader).
pub struct Stats {
    messages: AtomicU64,
    bytes: AtomicU64,
    ack_bytes: AtomicU64,
    nak_count: AtomicU64,
    started: Instant,
}

impl Stats {
    pub fn new() -> Self {
        Stats {
            messages: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            ack_bytes: AtomicU64::new(0),
            nak_count: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    /// Record one forwarded or sent message of `byte_count` bytes.
    pub fn update(&self, byte_count: usize) {
        self.messages.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(byte_count as u64, Ordering::Relaxed);
    }

    /// Record `n` ack bytes released by the ack reader.
    pub fn record_ack_bytes(&self, n: usize) {
        self.ack_bytes.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn record_nak(&self) {
        self.nak_count.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> (u64, u64, u64, u64, Duration) {
        (
            self.messages.load(Ordering::Relaxed),
            self.bytes.load(Ordering::Relaxed),
            self.ack_bytes.load(Ordering::Relaxed),
            self.nak_count.load(Ordering::Relaxed),
            self.started.elapsed(),
        )
    }

    /// Format and log one report line: average µs/message, average
    /// bytes/message, message rate in kHz, throughput in MB/s, process CPU%.
    pub fn display(&self, component: &str) {
        let (messages, bytes, ack_bytes, naks, elapsed) = self.snapshot();
        let secs = elapsed.as_secs_f64().max(f64::EPSILON);

        let avg_us_per_msg = if messages > 0 {
            (elapsed.as_micros() as f64) / (messages as f64)
        } else {
            0.0
        };
        let avg_bytes_per_msg = if messages > 0 {
            bytes as f64 / messages as f64
        } else {
            0.0
        };
        let rate_khz = (messages as f64 / secs) / 1000.0;
        let throughput_mb_s = (bytes as f64 / secs) / (1024.0 * 1024.0);

        let (cpu_percent, idle_percent) = process_cpu_percent();

        info!(
            component,
            messages,
            ack_bytes,
            naks,
            avg_us_per_msg,
            avg_bytes_per_msg,
            rate_khz,
            throughput_mb_s,
            cpu_percent,
            idle_percent,
            "stats report"
        );
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

/// Sample this process's CPU usage via the host OS. `idle_percent` is simply
/// `100.0 - cpu_percent` clamped to `[0, 100]`, matching the two columns the
/// original agent reported.
fn process_cpu_percent() -> (f32, f32) {
    let mut system = System::new();
    let pid = sysinfo::get_current_pid().ok();
    let cpu_percent = match pid {
        Some(pid) => {
            system.refresh_process(pid);
            system
                .process(pid)
                .map(|p| p.cpu_usage())
                .unwrap_or(0.0)
        }
        None => 0.0,
    };
    let idle_percent = (100.0 - cpu_percent).clamp(0.0, 100.0);
    (cpu_percent, idle_percent)
}

/// Spawn the periodic reporter task; runs until the process exits.
pub fn spawn_reporter(stats: std::sync::Arc<Stats>, component: &'static str, period: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            stats.display(component);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_accumulates_messages_and_bytes() {
        let stats = Stats::new();
        stats.update(10);
        stats.update(20);
        let (messages, bytes, _, _, _) = stats.snapshot();
        assert_eq!(messages, 2);
        assert_eq!(bytes, 30);
    }

    #[test]
    fn record_ack_bytes_and_nak_are_independent_counters() {
        let stats = Stats::new();
        stats.record_ack_bytes(5);
        stats.record_nak();
        let (_, _, ack_bytes, naks, _) = stats.snapshot();
        assert_eq!(ack_bytes, 5);
        assert_eq!(naks, 1);
    }
}
