use std::{
    io,
    net::{SocketAddr, UdpSocket},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, error, info};

use crate::{
    flusher::{Control, Flusher},
    parser::parse_datagram,
    sink::Sink,
    state::State,
    table::TableConfiguration,
    telemetry::{Telemetry, TelemetrySnapshot},
};

pub(crate) struct DaemonConfiguration {
    pub table: TableConfiguration,
    pub flush_interval: Duration,
    pub key_prefix: String,
    pub debug: bool,
    pub max_packet_size: usize,
}

/// A statsd daemon.
///
/// Receives statsd packets over UDP, aggregates them into the live table, and periodically rotates the table out and
/// sends it to every configured sink.
///
/// Created with [`StatsDaemonBuilder`][crate::StatsDaemonBuilder].
pub struct StatsDaemon {
    config: DaemonConfiguration,
    socket: UdpSocket,
    local_addr: SocketAddr,
    sinks: Vec<Sink>,
    state: Arc<State>,
    telemetry: Arc<Telemetry>,
    shutdown: Arc<AtomicBool>,
    control_tx: Sender<Control>,
    control_rx: Receiver<Control>,
}

impl StatsDaemon {
    pub(crate) fn new(
        config: DaemonConfiguration,
        socket: UdpSocket,
        sinks: Vec<Sink>,
    ) -> io::Result<Self> {
        let local_addr = socket.local_addr()?;
        let state = Arc::new(State::new(config.table));
        let (control_tx, control_rx) = unbounded();

        Ok(StatsDaemon {
            config,
            socket,
            local_addr,
            sinks,
            state,
            telemetry: Arc::new(Telemetry::default()),
            shutdown: Arc::new(AtomicBool::new(false)),
            control_tx,
            control_rx,
        })
    }

    /// Gets a handle to the daemon.
    ///
    /// Handles can be used from any thread, before or after the daemon is started.
    pub fn handle(&self) -> DaemonHandle {
        DaemonHandle {
            local_addr: self.local_addr,
            telemetry: Arc::clone(&self.telemetry),
            shutdown: Arc::clone(&self.shutdown),
            control: self.control_tx.clone(),
        }
    }

    /// Runs the daemon.
    ///
    /// Spawns the flusher on a background thread, and then receives packets on the calling thread until shutdown is
    /// requested through a [`DaemonHandle`]. When this returns, the flusher has stopped, and anything aggregated since
    /// the last flush has been dropped.
    ///
    /// # Errors
    ///
    /// If the flusher thread cannot be spawned, an error will be returned.
    pub fn start(self) -> io::Result<()> {
        let StatsDaemon {
            config,
            socket,
            local_addr,
            sinks,
            state,
            telemetry,
            shutdown,
            control_tx,
            control_rx,
        } = self;

        let num_sinks = sinks.len();
        let flusher = Flusher::new(
            config.flush_interval,
            Arc::clone(&state),
            sinks,
            Arc::clone(&telemetry),
            control_rx,
        );
        let flusher_handle = thread::Builder::new()
            .name("statsd-server-flusher".to_string())
            .spawn(move || flusher.run())?;

        info!(
            %local_addr,
            num_sinks,
            flush_interval = ?config.flush_interval,
            percent_threshold = config.table.percent_threshold,
            "Listening for statsd packets."
        );

        let receiver = PacketReceiver { config: &config, state: &state, telemetry: &telemetry };
        receiver.run(&socket, &shutdown);

        // A send error means the flusher is already gone.
        let _ = control_tx.send(Control::Shutdown);
        if flusher_handle.join().is_err() {
            error!("Flusher thread panicked.");
        }

        info!("Daemon stopped.");
        Ok(())
    }
}

// Borrowed view of what the receive loop needs.
struct PacketReceiver<'a> {
    config: &'a DaemonConfiguration,
    state: &'a State,
    telemetry: &'a Telemetry,
}

impl PacketReceiver<'_> {
    fn run(&self, socket: &UdpSocket, shutdown: &AtomicBool) {
        let mut buf = vec![0; self.config.max_packet_size];
        while !shutdown.load(Ordering::Acquire) {
            match socket.recv_from(&mut buf) {
                Ok((len, peer)) => self.process_packet(&buf[..len], peer),
                Err(e) if would_block(&e) => {}
                Err(e) => {
                    self.telemetry.track_receive_error();
                    error!(error = %e, "Failed to receive packet.");
                }
            }
        }
    }

    fn process_packet(&self, packet: &[u8], peer: SocketAddr) {
        self.telemetry.track_packet_received(packet.len());
        if self.config.debug {
            debug!(%peer, packet = %String::from_utf8_lossy(packet), "Received packet.");
        }

        let mut updates = Vec::new();
        let mut parse_errors = 0;
        for result in parse_datagram(packet, &self.config.key_prefix) {
            match result {
                Ok(update) => updates.push(update),
                Err(e) => {
                    parse_errors += 1;
                    debug!(%peer, error = %e, "Dropping malformed metric.");
                }
            }
        }

        let applied = self.state.apply(updates);
        self.telemetry.track_updates(applied, parse_errors);
    }
}

fn would_block(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}

/// A handle to a statsd daemon.
///
/// Handles are cheap to clone, and stay valid after the daemon stops: requests sent to a stopped daemon are ignored.
#[derive(Clone)]
pub struct DaemonHandle {
    local_addr: SocketAddr,
    telemetry: Arc<Telemetry>,
    shutdown: Arc<AtomicBool>,
    control: Sender<Control>,
}

impl DaemonHandle {
    /// Address the daemon is listening on.
    ///
    /// When the daemon was configured to bind to port 0, this holds the port that was actually assigned.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Requests an immediate flush.
    ///
    /// The live table is rotated out and sent to every sink right away, on the flusher thread. The regular flush
    /// schedule is unaffected, and the flush interval is still used to compute counter rates.
    pub fn flush(&self) {
        let _ = self.control.send(Control::Flush);
    }

    /// Requests that the daemon shut down.
    ///
    /// The receive loop stops within one read timeout, and a flush that is in progress completes its sends first.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        let _ = self.control.send(Control::Shutdown);
    }

    /// Takes a snapshot of the daemon telemetry.
    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.telemetry.snapshot()
    }
}
