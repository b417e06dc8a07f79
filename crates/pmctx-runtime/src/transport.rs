use pmctx_types::{HostAttributes, HostSpec};
use std::fmt;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::debug;

/// Why a connection attempt did not produce a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The transport refuses to try again yet
    TooSoon(Duration),
    /// Attempted and failed
    Failed(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::TooSoon(wait) => write!(f, "too soon, retry in {:?}", wait),
            TransportError::Failed(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for TransportError {}

/// An established connection to a collector.
pub trait Connection: Send + fmt::Debug {
    /// Address actually connected to
    fn peer(&self) -> String;

    fn close(self: Box<Self>);
}

/// Opens connections for host contexts.
///
/// `hosts` is the parsed hop list; with more than one entry the last is the
/// proxy that relays to the others.
pub trait Transport: Send + Sync {
    fn connect(
        &self,
        hosts: &[HostSpec],
        attrs: &HostAttributes,
        timeout: Duration,
    ) -> Result<Box<dyn Connection>, TransportError>;
}

/// Plain TCP transport.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    default_ports: Vec<u16>,
}

impl TcpTransport {
    pub fn new(default_ports: Vec<u16>) -> Self {
        Self { default_ports }
    }

    fn candidates(&self, hop: &HostSpec) -> Vec<(String, u16)> {
        let ports = if hop.ports.is_empty() {
            &self.default_ports
        } else {
            &hop.ports
        };
        ports.iter().map(|p| (hop.name.clone(), *p)).collect()
    }
}

impl Transport for TcpTransport {
    fn connect(
        &self,
        hosts: &[HostSpec],
        _attrs: &HostAttributes,
        timeout: Duration,
    ) -> Result<Box<dyn Connection>, TransportError> {
        let Some(hop) = hosts.last() else {
            return Err(TransportError::Failed("no host given".to_string()));
        };

        let mut last_err = format!("no port to try for {}", hop.name);
        for (name, port) in self.candidates(hop) {
            let addrs: Vec<SocketAddr> = match (name.as_str(), port).to_socket_addrs() {
                Ok(addrs) => addrs.collect(),
                Err(err) => {
                    last_err = format!("{}: {}", name, err);
                    continue;
                }
            };
            for addr in addrs {
                match TcpStream::connect_timeout(&addr, timeout) {
                    Ok(stream) => {
                        debug!(%addr, "connected");
                        return Ok(Box::new(TcpConnection { stream, peer: addr }));
                    }
                    Err(err) => last_err = format!("{}: {}", addr, err),
                }
            }
        }
        Err(TransportError::Failed(last_err))
    }
}

#[derive(Debug)]
struct TcpConnection {
    stream: TcpStream,
    peer: SocketAddr,
}

impl Connection for TcpConnection {
    fn peer(&self) -> String {
        self.peer.to_string()
    }

    fn close(self: Box<Self>) {
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }
}
