use std::{
    fmt, io,
    net::{SocketAddr, ToSocketAddrs as _},
};

/// A `[host]:port` address.
///
/// The host may be empty, in which case its meaning depends on how the address is used: a bind address with an empty
/// host listens on all interfaces, while a sink address with an empty host connects to the local machine.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct HostPort {
    host: String,
    port: u16,
}

impl HostPort {
    /// Creates a new `HostPort`.
    pub fn new<H>(host: H, port: u16) -> Self
    where
        H: Into<String>,
    {
        HostPort { host: host.into(), port }
    }

    /// Host part of the address, possibly empty.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port part of the address.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Resolves the address to bind a listener to.
    pub(crate) fn bind_addrs(&self) -> io::Result<Vec<SocketAddr>> {
        self.resolve("0.0.0.0")
    }

    /// Resolves the address to connect to.
    pub(crate) fn connect_addrs(&self) -> io::Result<Vec<SocketAddr>> {
        self.resolve("127.0.0.1")
    }

    fn resolve(&self, default_host: &str) -> io::Result<Vec<SocketAddr>> {
        let host = if self.host.is_empty() { default_host } else { self.host.as_str() };
        (host, self.port).to_socket_addrs().map(Iterator::collect)
    }
}

impl fmt::Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl<'a> TryFrom<&'a str> for HostPort {
    type Error = String;

    fn try_from(spec: &'a str) -> Result<Self, Self::Error> {
        match spec.split(':').collect::<Vec<_>>().as_slice() {
            [port] => Ok(HostPort::new("", parse_port(port)?)),
            [host, port] => Ok(HostPort::new(*host, parse_port(port)?)),
            _ => Err(format!("expected '[host]:port' but got '{}'", spec)),
        }
    }
}

/// Downstream backends that a snapshot can be sent to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Graphite plaintext protocol over TCP.
    Graphite,
}

impl Backend {
    /// Every supported backend.
    pub const ALL: &'static [Backend] = &[Backend::Graphite];

    /// Returns the name used to select this backend in a sink address.
    pub const fn name(&self) -> &'static str {
        match self {
            Backend::Graphite => "graphite",
        }
    }

    /// Looks up a backend by name.
    pub fn from_name(name: &str) -> Option<Backend> {
        Backend::ALL.iter().copied().find(|backend| backend.name() == name)
    }
}

/// A `[backend:][host]:port` sink address.
///
/// The backend defaults to [`Backend::Graphite`] when omitted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SinkAddr {
    /// Backend to send snapshots with.
    pub backend: Backend,

    /// Address of the downstream collector.
    pub addr: HostPort,
}

impl<'a> TryFrom<&'a str> for SinkAddr {
    type Error = String;

    fn try_from(spec: &'a str) -> Result<Self, Self::Error> {
        // Only the three-part form names a backend; otherwise it's a plain `[host]:port`.
        if let [backend, host, port] = spec.split(':').collect::<Vec<_>>().as_slice() {
            let backend = Backend::from_name(backend)
                .ok_or_else(|| format!("unknown backend '{}'", backend))?;
            return Ok(SinkAddr { backend, addr: HostPort::new(*host, parse_port(port)?) });
        }

        HostPort::try_from(spec).map(|addr| SinkAddr { backend: Backend::Graphite, addr })
    }
}

fn parse_port(port: &str) -> Result<u16, String> {
    port.trim().parse().map_err(|e| format!("invalid port '{}': {}", port, e))
}

#[cfg(test)]
mod tests {
    use super::{Backend, HostPort, SinkAddr};

    #[test]
    fn host_port_known_cases() {
        let cases = &[
            ("8125", Ok(HostPort::new("", 8125))),
            (":8125", Ok(HostPort::new("", 8125))),
            ("localhost:8125", Ok(HostPort::new("localhost", 8125))),
            ("10.0.0.1:2003", Ok(HostPort::new("10.0.0.1", 2003))),
        ];

        for (input, expected) in cases {
            assert_eq!(expected, &HostPort::try_from(*input), "input: {}", input);
        }
    }

    #[test]
    fn host_port_invalid() {
        for input in ["", "foo", "foo:bar", "foo:70000", "a:b:2003", ":-1"] {
            assert!(HostPort::try_from(input).is_err(), "input: {}", input);
        }
    }

    #[test]
    fn sink_addr_known_cases() {
        assert_eq!(
            SinkAddr::try_from("2003"),
            Ok(SinkAddr { backend: Backend::Graphite, addr: HostPort::new("", 2003) })
        );
        assert_eq!(
            SinkAddr::try_from("foo:2003"),
            Ok(SinkAddr { backend: Backend::Graphite, addr: HostPort::new("foo", 2003) })
        );
        assert_eq!(
            SinkAddr::try_from("graphite:foo:2003"),
            Ok(SinkAddr { backend: Backend::Graphite, addr: HostPort::new("foo", 2003) })
        );
        assert!(SinkAddr::try_from("carbon:foo:2003").unwrap_err().contains("unknown backend"));
        assert!(SinkAddr::try_from("graphite:foo:bar").is_err());
    }

    #[test]
    fn empty_host_resolution() {
        let addr = HostPort::new("", 2003);
        assert_eq!(addr.bind_addrs().unwrap(), vec!["0.0.0.0:2003".parse().unwrap()]);
        assert_eq!(addr.connect_addrs().unwrap(), vec!["127.0.0.1:2003".parse().unwrap()]);
        assert_eq!(addr.to_string(), ":2003");
    }

    #[test]
    fn backend_names() {
        assert_eq!(Backend::from_name("graphite"), Some(Backend::Graphite));
        assert_eq!(Backend::from_name("nope"), None);
        assert_eq!(Backend::Graphite.name(), "graphite");
    }
}
