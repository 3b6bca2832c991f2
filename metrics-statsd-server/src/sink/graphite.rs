use std::{
    collections::HashMap,
    io::{self, Write as _},
    net::{SocketAddr, TcpStream},
    time::{Duration, SystemTime},
};

use tracing::{debug, error, trace, warn};

use crate::{addr::HostPort, summary::TimerSummary, table::AggregationTable};

use super::{
    writer::{LineValue, LineWriter},
    SendError, SendReport, SinkConfiguration,
};

const COUNTER_PREFIX: &str = "stats.";
const COUNTER_TOTAL_PREFIX: &str = "stats_counts.";
const TIMER_PREFIX: &str = "stats.timers.";
const NUM_STATS_KEY: &str = "statsd.numStats";

/// Sends snapshots to one or more Graphite hosts, using the plaintext protocol.
///
/// For every flush, a fresh TCP connection is opened to each host, the full payload is written, and the connection is
/// closed. Hosts are independent of each other: a host that can't be reached doesn't prevent the payload from being
/// sent to the others.
pub struct GraphiteSink {
    config: SinkConfiguration,
    hosts: Vec<HostPort>,
}

impl GraphiteSink {
    /// Creates a new `GraphiteSink` with no hosts.
    pub fn new(config: SinkConfiguration) -> Self {
        GraphiteSink { config, hosts: Vec::new() }
    }

    /// Adds a host to send snapshots to.
    pub fn add_host(&mut self, host: HostPort) {
        self.hosts.push(host);
    }

    /// Hosts that snapshots are sent to.
    pub fn hosts(&self) -> &[HostPort] {
        &self.hosts
    }

    /// Formats the given snapshot and sends it to every host.
    pub fn send(&self, table: &AggregationTable) -> SendReport {
        let (payload, num_stats) = build_payload(table, unix_timestamp());
        debug!(num_stats, payload_len = payload.len(), "Built Graphite payload.");

        let mut report = SendReport::default();
        for host in &self.hosts {
            match self.send_to(host, &payload) {
                Ok(len) => {
                    debug!(%host, bytes_sent = len, "Sent payload to Graphite.");
                    report.sent.push((host.clone(), len));
                }
                Err(e) => {
                    error!(error = %e, "Failed to send payload to Graphite.");
                    report.failed.push(e);
                }
            }
        }
        report
    }

    fn send_to(&self, host: &HostPort, payload: &[u8]) -> Result<usize, SendError> {
        let addrs = host
            .connect_addrs()
            .map_err(|source| SendError::Resolve { host: host.clone(), source })?;

        let mut stream = connect(&addrs, self.config.connect_timeout)
            .map_err(|source| SendError::Connect { host: host.clone(), source })?;

        stream
            .set_write_timeout(Some(self.config.write_timeout))
            .and_then(|()| stream.write_all(payload))
            .and_then(|()| stream.flush())
            .map_err(|source| SendError::Write { host: host.clone(), source })?;

        Ok(payload.len())
    }
}

fn connect(addrs: &[SocketAddr], timeout: Duration) -> io::Result<TcpStream> {
    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect_timeout(addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_error = Some(e),
        }
    }

    Err(last_error.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::AddrNotAvailable, "host resolved to no addresses")
    }))
}

fn unix_timestamp() -> u64 {
    SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// Formats the given snapshot as a Graphite plaintext payload.
///
/// Every line is stamped with `timestamp`, in Unix seconds. Keys are written in sorted order within each metric type:
/// timers first, then counters, then gauges, followed by a trailing `statsd.numStats` line holding the number of keys
/// that produced output.
pub fn format_payload(table: &AggregationTable, timestamp: u64) -> Vec<u8> {
    build_payload(table, timestamp).0
}

fn build_payload(table: &AggregationTable, timestamp: u64) -> (Vec<u8>, u64) {
    let mut writer = LineWriter::new(timestamp);
    let mut num_stats = 0;

    let percent_threshold = table.percent_threshold();
    let upper_threshold_suffix = format!(".upper_{}", percent_label(percent_threshold));

    for (key, values) in sorted(table.timers()) {
        let mut values = values.clone();
        let Some(summary) = TimerSummary::from_values(&mut values, percent_threshold) else {
            continue;
        };
        if !summary.mean.is_finite() {
            warn!(key = %key, "Skipping timer with non-finite mean.");
            continue;
        }

        writer.write_line(TIMER_PREFIX, key, ".mean", LineValue::FloatingPoint(summary.mean));
        writer.write_line(TIMER_PREFIX, key, ".upper", LineValue::FloatingPoint(summary.upper));
        writer.write_line(
            TIMER_PREFIX,
            key,
            &upper_threshold_suffix,
            LineValue::FloatingPoint(summary.upper_threshold),
        );
        writer.write_line(TIMER_PREFIX, key, ".lower", LineValue::FloatingPoint(summary.lower));
        writer.write_line(TIMER_PREFIX, key, ".count", LineValue::Integer(summary.count as u64));
        num_stats += 1;
    }

    let interval_secs = table.interval_secs();
    for (key, total) in sorted(table.counts()) {
        let rate = total / interval_secs;
        if !total.is_finite() || !rate.is_finite() {
            warn!(key = %key, total, "Skipping counter with non-finite total.");
            continue;
        }

        writer.write_line(COUNTER_PREFIX, key, "", LineValue::FloatingPoint(rate));
        writer.write_line(COUNTER_TOTAL_PREFIX, key, "", LineValue::FloatingPoint(*total));
        num_stats += 1;
    }

    // Gauges share the counter prefixes.
    for (key, value) in sorted(table.gauges()) {
        if !value.is_finite() {
            warn!(key = %key, value, "Skipping gauge with non-finite value.");
            continue;
        }

        writer.write_line(COUNTER_PREFIX, key, "", LineValue::FloatingPoint(*value));
        writer.write_line(COUNTER_TOTAL_PREFIX, key, "", LineValue::FloatingPoint(*value));
        num_stats += 1;
    }

    writer.write_line(NUM_STATS_KEY, "", "", LineValue::Integer(num_stats));
    trace!(num_lines = writer.lines(), "Formatted Graphite payload.");

    (writer.into_payload(), num_stats)
}

fn sorted<V>(map: &HashMap<String, V>) -> Vec<(&String, &V)> {
    let mut entries = map.iter().collect::<Vec<_>>();
    entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
    entries
}

/// Renders the percentile threshold as a metric path segment.
///
/// The threshold is truncated to an integer, so `99.9` is sent as `upper_99`. This keeps metric paths identical to what
/// existing statsd daemons send for the same configuration.
fn percent_label(percent_threshold: f64) -> u64 {
    percent_threshold.trunc() as u64
}
