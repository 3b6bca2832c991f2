use std::{io, time::Duration};

use thiserror::Error;

use crate::{
    addr::{Backend, HostPort},
    table::AggregationTable,
};

pub mod graphite;
mod writer;

use self::graphite::GraphiteSink;

/// Errors that could occur while sending a snapshot to a single sink host.
#[derive(Debug, Error)]
pub enum SendError {
    /// The host address could not be resolved.
    #[error("failed to resolve {host}: {source}")]
    Resolve {
        /// Sink host.
        host: HostPort,

        /// Underlying I/O error.
        source: io::Error,
    },

    /// No connection could be established to any resolved address of the host.
    #[error("failed to connect to {host}: {source}")]
    Connect {
        /// Sink host.
        host: HostPort,

        /// Underlying I/O error.
        source: io::Error,
    },

    /// The payload could not be written in full.
    #[error("failed to write to {host}: {source}")]
    Write {
        /// Sink host.
        host: HostPort,

        /// Underlying I/O error.
        source: io::Error,
    },
}

/// Outcome of sending a snapshot to every host of a sink.
#[derive(Debug, Default)]
pub struct SendReport {
    /// Hosts the payload was written to, along with the payload length.
    pub sent: Vec<(HostPort, usize)>,

    /// Hosts the payload could not be delivered to.
    pub failed: Vec<SendError>,
}

impl SendReport {
    /// Returns `true` if any host could not be delivered to.
    pub fn any_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Sink connection settings.
#[derive(Clone, Copy, Debug)]
pub struct SinkConfiguration {
    /// Maximum time to wait for a connection to be established.
    pub connect_timeout: Duration,

    /// Maximum time to wait for a single write to complete.
    pub write_timeout: Duration,
}

/// A downstream collector that receives one snapshot per flush.
///
/// Backends are a closed set, selected when the daemon is configured.
pub enum Sink {
    /// Graphite plaintext protocol over TCP.
    Graphite(GraphiteSink),
}

impl Sink {
    /// Formats the given snapshot and sends it to every host of this sink.
    ///
    /// Sending is best-effort: each host is attempted independently, and failures are reported rather than retried.
    pub fn send(&self, table: &AggregationTable) -> SendReport {
        match self {
            Sink::Graphite(sink) => sink.send(table),
        }
    }

    /// Backend this sink sends with.
    pub fn backend(&self) -> Backend {
        match self {
            Sink::Graphite(_) => Backend::Graphite,
        }
    }
}
