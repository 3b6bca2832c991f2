use std::mem;

use parking_lot::Mutex;

use crate::{
    parser::MetricUpdate,
    table::{AggregationTable, TableConfiguration},
};

/// Aggregator state.
///
/// Holds the single live [`AggregationTable`]. Ingestion applies updates to it, and the flush task periodically rotates
/// it out. Both go through the same lock, so every update lands in exactly one table: the one that was live when the
/// update was applied.
pub(crate) struct State {
    config: TableConfiguration,
    live: Mutex<AggregationTable>,
}

impl State {
    /// Creates a new `State` from the given configuration.
    pub fn new(config: TableConfiguration) -> Self {
        State { config, live: Mutex::new(AggregationTable::new(config)) }
    }

    /// Applies the given updates to the live table, in order, under a single lock acquisition.
    ///
    /// Returns the number of updates applied.
    pub fn apply<I>(&self, updates: I) -> usize
    where
        I: IntoIterator<Item = MetricUpdate>,
    {
        let mut updates = updates.into_iter().peekable();
        if updates.peek().is_none() {
            return 0;
        }

        let mut live = self.live.lock();
        let mut applied = 0;
        for update in updates {
            live.apply(update);
            applied += 1;
        }
        applied
    }

    /// Swaps the live table for a fresh, empty one, and returns the previous table.
    ///
    /// Once this returns, the previous table is no longer reachable from ingestion.
    pub fn rotate(&self) -> AggregationTable {
        let fresh = AggregationTable::new(self.config);
        mem::replace(&mut *self.live.lock(), fresh)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        thread,
    };

    use super::State;
    use crate::{
        parser::{parse_datagram, MetricUpdate, MetricValue},
        table::TableConfiguration,
    };

    fn state() -> State {
        State::new(TableConfiguration { percent_threshold: 90.0, interval_secs: 10.0 })
    }

    fn counter(key: &str, delta: f64) -> MetricUpdate {
        MetricUpdate { key: key.to_owned(), value: MetricValue::Counter(delta) }
    }

    #[test]
    fn rotate_returns_accumulated_table() {
        let state = state();
        assert_eq!(state.apply(vec![counter("foo", 1.0), counter("foo", 2.0)]), 2);

        let table = state.rotate();
        assert_eq!(table.counts().get("foo"), Some(&3.0));
        assert_eq!(table.config(), state.config);

        let table = state.rotate();
        assert!(table.is_empty());
    }

    #[test]
    fn gauges_reset_between_intervals() {
        let state = state();
        let updates = parse_datagram(b"foo:5|g", "").into_iter().map(Result::unwrap);
        state.apply(updates);

        let first = state.rotate();
        assert_eq!(first.gauges().get("foo"), Some(&5.0));

        state.apply(vec![counter("bar", 1.0)]);
        let second = state.rotate();
        assert!(second.gauges().is_empty());
    }

    #[test]
    fn concurrent_rotation_never_loses_or_duplicates() {
        const WRITERS: usize = 4;
        const DATAGRAMS_PER_WRITER: usize = 5_000;

        let state = Arc::new(state());
        let done = Arc::new(AtomicBool::new(false));

        // Rotate as fast as possible while writers are running, keeping every rotated table.
        let rotator = {
            let state = Arc::clone(&state);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut total = 0.0;
                let mut rotations = 0;
                while !done.load(Ordering::Acquire) {
                    total += state.rotate().counts().get("foo").copied().unwrap_or(0.0);
                    rotations += 1;
                    thread::yield_now();
                }
                (total, rotations)
            })
        };

        let writers = (0..WRITERS)
            .map(|_| {
                let state = Arc::clone(&state);
                thread::spawn(move || {
                    for _ in 0..DATAGRAMS_PER_WRITER {
                        let updates = parse_datagram(b"foo:1|c\nfoo:1|c|@0.5", "")
                            .into_iter()
                            .map(Result::unwrap);
                        state.apply(updates);
                    }
                })
            })
            .collect::<Vec<_>>();

        for writer in writers {
            writer.join().unwrap();
        }
        done.store(true, Ordering::Release);

        let (rotated_total, rotations) = rotator.join().unwrap();
        let remaining = state.rotate().counts().get("foo").copied().unwrap_or(0.0);

        assert!(rotations > 0);
        assert_eq!(rotated_total + remaining, (WRITERS * DATAGRAMS_PER_WRITER * 3) as f64);
    }
}
