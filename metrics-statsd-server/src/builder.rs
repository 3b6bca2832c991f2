use std::{io, net::UdpSocket, time::Duration};

use thiserror::Error;

use crate::{
    addr::{Backend, HostPort, SinkAddr},
    daemon::{DaemonConfiguration, StatsDaemon},
    flusher::MAX_FLUSH_INTERVAL,
    key::sanitize_key,
    sink::{graphite::GraphiteSink, Sink, SinkConfiguration},
    table::TableConfiguration,
};

const DEFAULT_BIND_PORT: u16 = 8125;
const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_PERCENT_THRESHOLD: f64 = 90.0;
const DEFAULT_MAX_PACKET_SIZE: usize = 2048;
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(250);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Errors that could occur while building a statsd daemon.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Failed to parse the bind address.
    #[error("invalid bind address: {reason}")]
    InvalidBindAddress {
        /// Details about the parsing failure.
        reason: String,
    },

    /// Failed to parse a sink address.
    #[error("invalid sink address '{spec}': {reason}")]
    InvalidSink {
        /// Sink address as given.
        spec: String,

        /// Details about the parsing failure.
        reason: String,
    },

    /// No sink was configured.
    #[error("at least one sink must be configured")]
    NoSinks,

    /// The flush interval was zero.
    #[error("flush interval must be greater than zero")]
    InvalidFlushInterval,

    /// The flush interval was longer than the supported maximum.
    #[error("flush interval must be at most {max:?}, got {interval:?}")]
    FlushIntervalTooLong {
        /// Interval as given.
        interval: Duration,

        /// Longest supported interval.
        max: Duration,
    },

    /// The percentile threshold was outside of `(0, 100]`.
    #[error("percentile threshold must be in (0, 100], got {value}")]
    InvalidPercentThreshold {
        /// Threshold as given.
        value: f64,
    },

    /// The maximum packet size was zero.
    #[error("maximum packet size must be greater than zero")]
    InvalidMaxPacketSize,

    /// A socket timeout was zero.
    #[error("{name} timeout must be greater than zero")]
    InvalidTimeout {
        /// Which timeout was invalid.
        name: &'static str,
    },

    /// Failed to bind or configure the listening socket.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        /// Bind address.
        addr: HostPort,

        /// Underlying I/O error.
        source: io::Error,
    },
}

/// Builder for a statsd daemon.
pub struct StatsDaemonBuilder {
    bind_addr: HostPort,
    sinks: Vec<SinkAddr>,
    flush_interval: Duration,
    percent_threshold: f64,
    key_prefix: String,
    debug: bool,
    max_packet_size: usize,
    read_timeout: Duration,
    connect_timeout: Duration,
    write_timeout: Duration,
}

impl StatsDaemonBuilder {
    /// Set the address to listen for statsd packets on.
    ///
    /// The address must be in the format of `[host]:port`. When the host is omitted, the daemon listens on all
    /// interfaces.
    ///
    /// Defaults to `:8125`.
    ///
    /// # Errors
    ///
    /// If the given address is not able to be parsed as a valid address, an error will be returned indicating the
    /// reason.
    pub fn with_bind_address<A>(mut self, addr: A) -> Result<Self, BuildError>
    where
        A: AsRef<str>,
    {
        self.bind_addr = HostPort::try_from(addr.as_ref())
            .map_err(|reason| BuildError::InvalidBindAddress { reason })?;
        Ok(self)
    }

    /// Adds a sink to send snapshots to.
    ///
    /// The address must be in the format of `[backend:][host]:port`. When the backend is omitted, Graphite is used.
    /// When the host is omitted, snapshots are sent to `127.0.0.1`. Can be called multiple times to send every
    /// snapshot to several sinks.
    ///
    /// # Errors
    ///
    /// If the given address is not able to be parsed as a valid sink address, or names an unknown backend, an error
    /// will be returned indicating the reason.
    pub fn with_sink<A>(mut self, addr: A) -> Result<Self, BuildError>
    where
        A: AsRef<str>,
    {
        let spec = addr.as_ref();
        let sink = SinkAddr::try_from(spec)
            .map_err(|reason| BuildError::InvalidSink { spec: spec.to_owned(), reason })?;
        self.sinks.push(sink);
        Ok(self)
    }

    /// Set the flush interval of the aggregator.
    ///
    /// This controls how often the aggregation table is rotated and sent to every sink, and is also the divisor used
    /// to turn counter totals into per-second rates.
    ///
    /// Must be greater than zero, and at most 24 hours.
    ///
    /// Defaults to 10 seconds.
    #[must_use]
    pub fn with_flush_interval(mut self, flush_interval: Duration) -> Self {
        self.flush_interval = flush_interval;
        self
    }

    /// Set the percentile threshold used when summarizing timers.
    ///
    /// Must be in `(0, 100]`. Fractional thresholds are used as given when summarizing, but the threshold is truncated
    /// to an integer in the metric path, so `99.9` is reported under `upper_99`.
    ///
    /// Defaults to 90.
    #[must_use]
    pub fn with_percent_threshold(mut self, percent_threshold: f64) -> Self {
        self.percent_threshold = percent_threshold;
        self
    }

    /// Set a prefix to prepend to every metric key.
    ///
    /// The prefix is sanitized in the same way as metric keys, and is joined to each key with a `.`. An empty prefix
    /// disables prefixing.
    ///
    /// Defaults to no prefix.
    #[must_use]
    pub fn with_key_prefix<P>(mut self, prefix: P) -> Self
    where
        P: AsRef<str>,
    {
        self.key_prefix = sanitize_key(prefix.as_ref(), "");
        self
    }

    /// Sets whether or not to log every received packet.
    ///
    /// Packets are logged at the `DEBUG` level.
    ///
    /// Defaults to `false`.
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Set the maximum size of a received packet.
    ///
    /// Datagrams larger than this are truncated to this size, which may cause their final line to be rejected as
    /// malformed.
    ///
    /// Defaults to 2048 bytes.
    #[must_use]
    pub fn with_max_packet_size(mut self, max_packet_size: usize) -> Self {
        self.max_packet_size = max_packet_size;
        self
    }

    /// Set the read timeout of the listening socket.
    ///
    /// This bounds how long the receive loop takes to notice that it has been asked to shut down.
    ///
    /// Defaults to 250 milliseconds.
    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the connect timeout for sending snapshots.
    ///
    /// Defaults to 1 second.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the write timeout for sending snapshots.
    ///
    /// When the write timeout is reached, the write operation will be aborted and the snapshot will not be delivered
    /// to that host. There is no retry.
    ///
    /// Defaults to 1 second.
    #[must_use]
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Builds the daemon.
    ///
    /// The listening socket is bound immediately, but no packets are received and no flushes happen until
    /// [`StatsDaemon::start`] is called.
    ///
    /// # Errors
    ///
    /// If any setting is invalid, if no sink was configured, or if the listening socket cannot be bound, an error will
    /// be returned.
    pub fn build(self) -> Result<StatsDaemon, BuildError> {
        self.validate()?;

        let sink_config = SinkConfiguration {
            connect_timeout: self.connect_timeout,
            write_timeout: self.write_timeout,
        };
        let sinks = build_sinks(&self.sinks, sink_config);

        let socket = self
            .bind_addr
            .bind_addrs()
            .and_then(|addrs| UdpSocket::bind(&addrs[..]))
            .and_then(|socket| {
                socket.set_read_timeout(Some(self.read_timeout))?;
                Ok(socket)
            })
            .map_err(|source| BuildError::Bind { addr: self.bind_addr.clone(), source })?;

        let config = DaemonConfiguration {
            table: TableConfiguration {
                percent_threshold: self.percent_threshold,
                interval_secs: self.flush_interval.as_secs_f64(),
            },
            flush_interval: self.flush_interval,
            key_prefix: self.key_prefix,
            debug: self.debug,
            max_packet_size: self.max_packet_size,
        };

        StatsDaemon::new(config, socket, sinks)
            .map_err(|source| BuildError::Bind { addr: self.bind_addr, source })
    }

    fn validate(&self) -> Result<(), BuildError> {
        if self.sinks.is_empty() {
            return Err(BuildError::NoSinks);
        }

        if self.flush_interval.is_zero() {
            return Err(BuildError::InvalidFlushInterval);
        }

        if self.flush_interval > MAX_FLUSH_INTERVAL {
            return Err(BuildError::FlushIntervalTooLong {
                interval: self.flush_interval,
                max: MAX_FLUSH_INTERVAL,
            });
        }

        // Written this way so that NaN is rejected too.
        if !(self.percent_threshold > 0.0 && self.percent_threshold <= 100.0) {
            return Err(BuildError::InvalidPercentThreshold { value: self.percent_threshold });
        }

        if self.max_packet_size == 0 {
            return Err(BuildError::InvalidMaxPacketSize);
        }

        for (name, timeout) in [
            ("read", self.read_timeout),
            ("connect", self.connect_timeout),
            ("write", self.write_timeout),
        ] {
            if timeout.is_zero() {
                return Err(BuildError::InvalidTimeout { name });
            }
        }

        Ok(())
    }
}

impl Default for StatsDaemonBuilder {
    fn default() -> Self {
        StatsDaemonBuilder {
            bind_addr: HostPort::new("", DEFAULT_BIND_PORT),
            sinks: Vec::new(),
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            percent_threshold: DEFAULT_PERCENT_THRESHOLD,
            key_prefix: String::new(),
            debug: false,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            read_timeout: DEFAULT_READ_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

/// Groups sink addresses by backend, creating one sink per backend in use.
fn build_sinks(addrs: &[SinkAddr], config: SinkConfiguration) -> Vec<Sink> {
    let mut graphite = GraphiteSink::new(config);
    for addr in addrs {
        match addr.backend {
            Backend::Graphite => graphite.add_host(addr.addr.clone()),
        }
    }

    let mut sinks = Vec::new();
    if !graphite.hosts().is_empty() {
        sinks.push(Sink::Graphite(graphite));
    }
    sinks
}
