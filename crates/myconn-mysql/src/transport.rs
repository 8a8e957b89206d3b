//! TCP and Unix-socket transports.

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
#[cfg(unix)]
use std::os::unix::net::UnixStream;

use myconn_core::error::{ConnectionError, ConnectionErrorKind};
use myconn_core::{Error, Result};

use crate::config::{Endpoint, MySqlConfig};

/// A connected byte stream to the server.
#[derive(Debug)]
pub enum Transport {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Transport {
    /// Dial the endpoint described by `config` and apply its timeouts.
    pub fn connect(config: &MySqlConfig) -> Result<Self> {
        let transport = match config.endpoint() {
            Endpoint::Tcp { host, port } => connect_tcp(&host, port, config)?,
            Endpoint::Socket(path) => connect_socket(&path)?,
        };
        transport
            .apply_timeouts(config)
            .map_err(|e| connect_error(ConnectionErrorKind::Connect, "configuring socket", e))?;
        Ok(transport)
    }

    fn apply_timeouts(&self, config: &MySqlConfig) -> io::Result<()> {
        match self {
            Transport::Tcp(stream) => {
                stream.set_nodelay(true)?;
                stream.set_read_timeout(config.read_timeout)?;
                stream.set_write_timeout(config.write_timeout)
            }
            #[cfg(unix)]
            Transport::Unix(stream) => {
                stream.set_read_timeout(config.read_timeout)?;
                stream.set_write_timeout(config.write_timeout)
            }
        }
    }

    /// Shut down both halves; errors are irrelevant at this point.
    pub fn shutdown(&self) {
        let _ = match self {
            Transport::Tcp(stream) => stream.shutdown(std::net::Shutdown::Both),
            #[cfg(unix)]
            Transport::Unix(stream) => stream.shutdown(std::net::Shutdown::Both),
        };
    }
}

fn connect_tcp(host: &str, port: u16, config: &MySqlConfig) -> Result<Transport> {
    let target = format!("{host}:{port}");
    let addrs: Vec<_> = (host, port)
        .to_socket_addrs()
        .map_err(|e| connect_error(ConnectionErrorKind::Address, &target, e))?
        .collect();

    let mut last_err = io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses");
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, config.connect_timeout) {
            Ok(stream) => {
                tracing::trace!(%addr, "TCP connection established");
                return Ok(Transport::Tcp(stream));
            }
            Err(e) => last_err = e,
        }
    }

    let kind = if last_err.kind() == io::ErrorKind::ConnectionRefused {
        ConnectionErrorKind::Refused
    } else {
        ConnectionErrorKind::Connect
    };
    Err(Error::Connection(ConnectionError {
        kind,
        message: format!("Can't connect to MySQL server on '{target}' ({last_err})"),
        source: Some(Box::new(last_err)),
    }))
}

#[cfg(unix)]
fn connect_socket(path: &str) -> Result<Transport> {
    UnixStream::connect(path).map(Transport::Unix).map_err(|e| {
        let kind = match e.kind() {
            io::ErrorKind::NotFound => ConnectionErrorKind::Address,
            io::ErrorKind::ConnectionRefused => ConnectionErrorKind::Refused,
            _ => ConnectionErrorKind::Connect,
        };
        Error::Connection(ConnectionError {
            kind,
            message: format!("Can't connect to local MySQL server through socket '{path}' ({e})"),
            source: Some(Box::new(e)),
        })
    })
}

#[cfg(not(unix))]
fn connect_socket(path: &str) -> Result<Transport> {
    Err(Error::config(
        "unix_socket",
        format!("Unix sockets are not available on this platform ('{path}')"),
    ))
}

fn connect_error(kind: ConnectionErrorKind, target: &str, err: io::Error) -> Error {
    Error::Connection(ConnectionError {
        kind,
        message: format!("Can't connect to MySQL server on '{target}' ({err})"),
        source: Some(Box::new(err)),
    })
}

impl Read for Transport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Transport::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            Transport::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for Transport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Transport::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            Transport::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Transport::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            Transport::Unix(stream) => stream.flush(),
        }
    }
}
