use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{debug, error, trace};

use crate::{sink::Sink, state::State, telemetry::Telemetry};

/// Longest flush interval the flusher will schedule.
pub(crate) const MAX_FLUSH_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Requests sent to the flusher.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Control {
    /// Rotate and send the live table now, without waiting for the next scheduled flush.
    Flush,

    /// Stop flushing.
    Shutdown,
}

pub(crate) struct Flusher {
    flush_interval: Duration,
    state: Arc<State>,
    sinks: Vec<Sink>,
    telemetry: Arc<Telemetry>,
    control: Receiver<Control>,
}

impl Flusher {
    /// Create a new `Flusher`.
    pub fn new(
        flush_interval: Duration,
        state: Arc<State>,
        sinks: Vec<Sink>,
        telemetry: Arc<Telemetry>,
        control: Receiver<Control>,
    ) -> Self {
        Flusher { flush_interval, state, sinks, telemetry, control }
    }

    /// Run the flusher, rotating the live table and sending it to every sink at the configured interval.
    ///
    /// Returns once shutdown is requested, or once every control sender has been dropped.
    pub fn run(self) {
        let mut next_flush = deadline_after(self.flush_interval);
        loop {
            // Wait until our target flush deadline, unless we're asked to do something else first.
            //
            // If the previous flush took longer than the flush interval, we won't wait at all.
            let wait = next_flush.saturating_duration_since(Instant::now());
            match self.control.recv_timeout(wait) {
                Err(RecvTimeoutError::Timeout) => {
                    next_flush = deadline_after(self.flush_interval);
                }
                Ok(Control::Flush) => debug!("Flush requested."),
                Ok(Control::Shutdown) | Err(RecvTimeoutError::Disconnected) => {
                    debug!("Flusher stopping.");
                    return;
                }
            }

            self.flush();
        }
    }

    fn flush(&self) {
        let table = self.state.rotate();
        let num_keys = table.len();
        trace!(num_keys, "Rotated aggregation table.");

        // Panics from formatting or sending stop here, so later intervals still flush.
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut sends_succeeded = 0;
            let mut sends_failed = 0;
            for sink in &self.sinks {
                let report = sink.send(&table);
                sends_succeeded += report.sent.len();
                sends_failed += report.failed.len();
            }
            (sends_succeeded, sends_failed)
        }));

        match result {
            Ok((sends_succeeded, sends_failed)) => {
                self.telemetry.track_flush(sends_succeeded, sends_failed);
                debug!(num_keys, sends_succeeded, sends_failed, "Flushed aggregation table.");
            }
            Err(_) => {
                self.telemetry.track_flush_panic();
                error!(num_keys, "Flush panicked. Aggregation table dropped.");
            }
        }
    }
}

fn deadline_after(interval: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(interval)
        .or_else(|| now.checked_add(MAX_FLUSH_INTERVAL))
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use std::{
        sync::Arc,
        thread,
        time::{Duration, Instant},
    };

    use crossbeam_channel::unbounded;

    use super::{deadline_after, Control, Flusher, MAX_FLUSH_INTERVAL};
    use crate::{
        parser::{MetricUpdate, MetricValue},
        state::State,
        table::TableConfiguration,
        telemetry::Telemetry,
    };

    fn state() -> Arc<State> {
        Arc::new(State::new(TableConfiguration { percent_threshold: 90.0, interval_secs: 10.0 }))
    }

    #[test]
    fn manual_flush_rotates_table() {
        let state = state();
        let telemetry = Arc::new(Telemetry::default());
        let (tx, rx) = unbounded();
        let flusher = Flusher::new(
            Duration::from_secs(3600),
            Arc::clone(&state),
            Vec::new(),
            Arc::clone(&telemetry),
            rx,
        );

        state.apply(vec![MetricUpdate { key: "foo".to_owned(), value: MetricValue::Counter(1.0) }]);

        tx.send(Control::Flush).unwrap();
        tx.send(Control::Shutdown).unwrap();
        thread::spawn(move || flusher.run()).join().unwrap();

        assert_eq!(telemetry.snapshot().flushes, 1);
        assert!(state.rotate().is_empty());
    }

    #[test]
    fn scheduled_flush_runs_without_requests() {
        let telemetry = Arc::new(Telemetry::default());
        let (tx, rx) = unbounded();
        let flusher =
            Flusher::new(Duration::from_millis(10), state(), Vec::new(), Arc::clone(&telemetry), rx);

        let handle = thread::spawn(move || flusher.run());
        while telemetry.snapshot().flushes < 2 {
            thread::sleep(Duration::from_millis(5));
        }

        drop(tx);
        handle.join().unwrap();
    }

    #[test]
    fn oversized_interval_falls_back_to_capped_deadline() {
        let before = Instant::now();
        let deadline = deadline_after(Duration::MAX);
        assert!(deadline > before);
        assert!(deadline <= Instant::now() + MAX_FLUSH_INTERVAL);
    }

    #[test]
    fn oversized_interval_does_not_kill_flusher() {
        let telemetry = Arc::new(Telemetry::default());
        let (tx, rx) = unbounded();
        let flusher = Flusher::new(
            Duration::from_secs_f64(1e19),
            state(),
            Vec::new(),
            Arc::clone(&telemetry),
            rx,
        );

        tx.send(Control::Flush).unwrap();
        tx.send(Control::Shutdown).unwrap();
        thread::spawn(move || flusher.run()).join().unwrap();

        assert_eq!(telemetry.snapshot().flushes, 1);
    }
}
