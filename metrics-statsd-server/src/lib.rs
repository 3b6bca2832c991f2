//! A [statsd][statsd]-compatible aggregation daemon that flushes to [Graphite][graphite].
//!
//! [statsd]: https://github.com/statsd/statsd/blob/master/docs/metric_types.md
//! [graphite]: https://graphite.readthedocs.io/en/latest/feeding-carbon.html#the-plaintext-protocol
//!
//! # Usage
//!
//! Running the daemon is straightforward:
//!
//! ```no_run
//! # use metrics_statsd_server::StatsDaemonBuilder;
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // First, create a builder.
//! //
//! // The builder can configure many aspects of the daemon, such as the listen address, where snapshots are sent, how
//! // often they are sent, and which percentile threshold is used when summarizing timers.
//! let daemon = StatsDaemonBuilder::default()
//!     .with_bind_address(":8125")?
//!     .with_sink("graphite.example.com:2003")?
//!     .build()?;
//!
//! // A handle can be used to request a flush, read the daemon's own telemetry, or shut the daemon down, from any
//! // thread.
//! let handle = daemon.handle();
//!
//! // Starting the daemon blocks the calling thread until `handle.shutdown()` is called.
//! daemon.start()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! ## Aggregation
//!
//! Three metric types are supported, sent as newline-delimited `key:value|type[|@rate]` packets over UDP:
//!
//! - counters (`c`) are summed, after scaling each delta by the inverse of its sample rate, and reported both as a
//!   per-second rate and as a raw total
//! - timers (`ms`) keep every observation, and are reported as a summary: minimum, maximum, count, and a mean and
//!   maximum that only consider the observations under the configured percentile threshold
//! - gauges (`g`) keep the last value received, and are not carried over from one interval to the next
//!
//! Metric keys are sanitized so that every byte outside of `[A-Za-z0-9_.-]` is replaced with an underscore.
//!
//! ## Rotation
//!
//! All updates go into a single live table. At the end of each flush interval, the live table is swapped for an empty
//! one in a single step, under the same lock that updates are applied with, so a sample always lands in exactly one
//! interval. Formatting and sending happen afterwards, on the flusher thread, without holding the lock.
//!
//! ## Best-effort delivery
//!
//! Each flush opens a fresh TCP connection to every sink host, writes the payload, and closes the connection. A host
//! that cannot be reached is logged and skipped, and the others are still attempted. Nothing is retried or queued.
//!
//! ## Telemetry
//!
//! The daemon tracks its own behavior (packets and bytes received, updates applied, parse errors, flushes, and
//! sends) which can be read at any time through [`DaemonHandle::telemetry`].

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::float_cmp)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

mod addr;
pub use self::addr::{Backend, HostPort, SinkAddr};

mod builder;
pub use self::builder::{BuildError, StatsDaemonBuilder};

mod daemon;
pub use self::daemon::{DaemonHandle, StatsDaemon};

mod flusher;

mod key;
pub use self::key::sanitize_key;

mod parser;
pub use self::parser::{parse_datagram, parse_packet, MetricUpdate, MetricValue, ParseError};

mod sink;
pub use self::sink::{
    graphite::{format_payload, GraphiteSink},
    SendError, SendReport, Sink, SinkConfiguration,
};

mod state;

mod summary;
pub use self::summary::TimerSummary;

mod table;
pub use self::table::{AggregationTable, TableConfiguration};

mod telemetry;
pub use self::telemetry::TelemetrySnapshot;
