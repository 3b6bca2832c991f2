use std::sync::atomic::{AtomicU64, Ordering::Relaxed};

/// Daemon telemetry.
///
/// `Telemetry` collects information about the daemon's own behavior: how many packets it has received, how many updates
/// were applied or rejected, how many flushes ran, and how the sends to downstream sinks went. It is shared between the
/// receive loop and the flush task.
#[derive(Default)]
pub(crate) struct Telemetry {
    packets_received: AtomicU64,
    bytes_received: AtomicU64,
    receive_errors: AtomicU64,
    updates_applied: AtomicU64,
    parse_errors: AtomicU64,
    flushes: AtomicU64,
    flush_panics: AtomicU64,
    sends_succeeded: AtomicU64,
    sends_failed: AtomicU64,
}

impl Telemetry {
    /// Tracks a received datagram.
    pub fn track_packet_received(&self, bytes_len: usize) {
        self.packets_received.fetch_add(1, Relaxed);
        self.bytes_received.fetch_add(bytes_len as u64, Relaxed);
    }

    /// Tracks a failed receive call.
    pub fn track_receive_error(&self) {
        self.receive_errors.fetch_add(1, Relaxed);
    }

    /// Tracks the outcome of processing a single datagram.
    pub fn track_updates(&self, applied: usize, parse_errors: usize) {
        self.updates_applied.fetch_add(applied as u64, Relaxed);
        self.parse_errors.fetch_add(parse_errors as u64, Relaxed);
    }

    /// Tracks a completed flush.
    pub fn track_flush(&self, sends_succeeded: usize, sends_failed: usize) {
        self.flushes.fetch_add(1, Relaxed);
        self.sends_succeeded.fetch_add(sends_succeeded as u64, Relaxed);
        self.sends_failed.fetch_add(sends_failed as u64, Relaxed);
    }

    /// Tracks a flush that panicked before completing.
    pub fn track_flush_panic(&self) {
        self.flushes.fetch_add(1, Relaxed);
        self.flush_panics.fetch_add(1, Relaxed);
    }

    /// Takes a point-in-time copy of every counter.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            packets_received: self.packets_received.load(Relaxed),
            bytes_received: self.bytes_received.load(Relaxed),
            receive_errors: self.receive_errors.load(Relaxed),
            updates_applied: self.updates_applied.load(Relaxed),
            parse_errors: self.parse_errors.load(Relaxed),
            flushes: self.flushes.load(Relaxed),
            flush_panics: self.flush_panics.load(Relaxed),
            sends_succeeded: self.sends_succeeded.load(Relaxed),
            sends_failed: self.sends_failed.load(Relaxed),
        }
    }
}

/// Point-in-time copy of the daemon telemetry.
///
/// Counters are monotonic over the life of the daemon.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    /// Datagrams received.
    pub packets_received: u64,

    /// Bytes received across all datagrams.
    pub bytes_received: u64,

    /// Receive calls that failed with an error other than a timeout.
    pub receive_errors: u64,

    /// Metric updates applied to an aggregation table.
    pub updates_applied: u64,

    /// Metric fields rejected as malformed.
    pub parse_errors: u64,

    /// Flushes attempted, whether or not they succeeded.
    pub flushes: u64,

    /// Flushes that panicked while formatting or sending.
    pub flush_panics: u64,

    /// Payloads successfully written to a sink host.
    pub sends_succeeded: u64,

    /// Payloads that could not be written to a sink host.
    pub sends_failed: u64,
}

#[cfg(test)]
mod tests {
    use super::{Telemetry, TelemetrySnapshot};

    #[test]
    fn snapshot_reflects_updates() {
        let telemetry = Telemetry::default();
        assert_eq!(telemetry.snapshot(), TelemetrySnapshot::default());

        telemetry.track_packet_received(12);
        telemetry.track_packet_received(30);
        telemetry.track_receive_error();
        telemetry.track_updates(3, 1);
        telemetry.track_flush(2, 1);
        telemetry.track_flush_panic();

        assert_eq!(
            telemetry.snapshot(),
            TelemetrySnapshot {
                packets_received: 2,
                bytes_received: 42,
                receive_errors: 1,
                updates_applied: 3,
                parse_errors: 1,
                flushes: 2,
                flush_panics: 1,
                sends_succeeded: 2,
                sends_failed: 1,
            }
        );
    }
}
