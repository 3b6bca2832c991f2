use std::collections::HashMap;

use crate::parser::{MetricUpdate, MetricValue};

/// Configuration copied into every aggregation table when it is created.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TableConfiguration {
    /// Percentile threshold, in `(0, 100]`, used when summarizing timers.
    pub percent_threshold: f64,

    /// Length of the aggregation interval, in seconds.
    ///
    /// Used to turn counter totals into per-second rates.
    pub interval_secs: f64,
}

/// Per-interval aggregation of statsd metrics.
///
/// # Behavior
///
/// - Counters are aggregated by summing their (sample rate adjusted) deltas.
/// - Timers have their individual observations stored, in arrival order, as the summary statistics can only be computed
///   once the interval is over.
/// - Gauges maintain "last write wins" behavior.
///
/// Nothing is carried over between tables: a gauge that isn't updated during an interval simply doesn't appear in that
/// interval's table.
#[derive(Clone, Debug)]
pub struct AggregationTable {
    config: TableConfiguration,
    timers: HashMap<String, Vec<f64>>,
    counts: HashMap<String, f64>,
    gauges: HashMap<String, f64>,
}

impl AggregationTable {
    /// Creates a new, empty `AggregationTable`.
    pub fn new(config: TableConfiguration) -> Self {
        Self { config, timers: HashMap::new(), counts: HashMap::new(), gauges: HashMap::new() }
    }

    /// Applies a single update.
    pub fn apply(&mut self, update: MetricUpdate) {
        match update.value {
            MetricValue::Timer(value) => self.timers.entry(update.key).or_default().push(value),
            MetricValue::Counter(delta) => *self.counts.entry(update.key).or_insert(0.0) += delta,
            MetricValue::Gauge(value) => {
                self.gauges.insert(update.key, value);
            }
        }
    }

    /// Returns the configuration this table was created with.
    pub fn config(&self) -> TableConfiguration {
        self.config
    }

    /// Percentile threshold used when summarizing timers.
    pub fn percent_threshold(&self) -> f64 {
        self.config.percent_threshold
    }

    /// Length of the aggregation interval, in seconds.
    pub fn interval_secs(&self) -> f64 {
        self.config.interval_secs
    }

    /// Timer observations, keyed by metric.
    pub fn timers(&self) -> &HashMap<String, Vec<f64>> {
        &self.timers
    }

    /// Counter totals, keyed by metric.
    pub fn counts(&self) -> &HashMap<String, f64> {
        &self.counts
    }

    /// Gauge values, keyed by metric.
    pub fn gauges(&self) -> &HashMap<String, f64> {
        &self.gauges
    }

    /// Returns `true` if no metric has been updated.
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty() && self.counts.is_empty() && self.gauges.is_empty()
    }

    /// Number of distinct metric keys across all metric types.
    pub fn len(&self) -> usize {
        self.timers.len() + self.counts.len() + self.gauges.len()
    }
}

#[cfg(test)]
mod tests {
    use super::{AggregationTable, TableConfiguration};
    use crate::parser::{parse_datagram, MetricUpdate, MetricValue};

    fn table() -> AggregationTable {
        AggregationTable::new(TableConfiguration { percent_threshold: 90.0, interval_secs: 5.0 })
    }

    fn apply_packet(table: &mut AggregationTable, packet: &str) {
        for result in parse_datagram(packet.as_bytes(), "") {
            table.apply(result.expect("packet should parse"));
        }
    }

    #[test]
    fn counters() {
        let mut table = table();

        apply_packet(&mut table, "foo:1|c");
        assert_eq!(table.counts().get("foo"), Some(&1.0));

        apply_packet(&mut table, "foo:1|c");
        assert_eq!(table.counts().get("foo"), Some(&2.0));

        apply_packet(&mut table, "foo:-1|c");
        assert_eq!(table.counts().get("foo"), Some(&1.0));
        assert_eq!(table.counts().len(), 1);
    }

    #[test]
    fn counters_sampled() {
        let mut table = table();

        apply_packet(&mut table, "foo:1|c|@0.5");
        assert_eq!(table.counts().get("foo"), Some(&2.0));

        apply_packet(&mut table, "foo:1|c|@0.5");
        assert_eq!(table.counts().get("foo"), Some(&4.0));
    }

    #[test]
    fn timers_keep_arrival_order() {
        let mut table = table();

        apply_packet(&mut table, "foo:20|ms");
        apply_packet(&mut table, "foo:10|ms");
        apply_packet(&mut table, "foo:15|ms");
        assert_eq!(table.timers().get("foo"), Some(&vec![20.0, 10.0, 15.0]));
    }

    #[test]
    fn gauges_last_write_wins() {
        let mut table = table();

        apply_packet(&mut table, "foo:3|g");
        apply_packet(&mut table, "foo:-8.5|g");
        assert_eq!(table.gauges().get("foo"), Some(&-8.5));
    }

    #[test]
    fn mixed_types_share_keys_independently() {
        let mut table = table();
        assert!(table.is_empty());

        table.apply(MetricUpdate { key: "foo".to_owned(), value: MetricValue::Counter(1.0) });
        table.apply(MetricUpdate { key: "foo".to_owned(), value: MetricValue::Timer(1.0) });
        table.apply(MetricUpdate { key: "foo".to_owned(), value: MetricValue::Gauge(1.0) });

        assert!(!table.is_empty());
        assert_eq!(table.len(), 3);
        assert_eq!(table.percent_threshold(), 90.0);
        assert_eq!(table.interval_secs(), 5.0);
    }
}
