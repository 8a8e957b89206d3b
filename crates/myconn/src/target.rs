//! Connection target resolution (the DSN).
//!
//! The target is informational: it is what gets logged and shown to
//! operators. The native client is always driven by the structured
//! [`OpenParams`](myconn_core::OpenParams), never by re-parsing this string.

use std::fmt;

use crate::config::ConnectionConfig;

/// Where a connection is going.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionTarget {
    /// A Unix domain socket
    Socket {
        path: String,
        database: Option<String>,
    },
    /// A TCP host; `port` is only present when configured explicitly
    Host {
        host: String,
        port: Option<u16>,
        database: Option<String>,
    },
}

impl ConnectionTarget {
    /// Resolve the target, preferring a non-empty socket over host/port.
    pub fn resolve(config: &ConnectionConfig) -> Self {
        let database = config.database_name().map(str::to_string);
        match config.socket_path() {
            Some(path) => ConnectionTarget::Socket {
                path: path.to_string(),
                database,
            },
            None => ConnectionTarget::Host {
                host: config
                    .host
                    .as_deref()
                    .filter(|h| !h.is_empty())
                    .unwrap_or(myconn_core::DEFAULT_HOST)
                    .to_string(),
                port: config.port,
                database,
            },
        }
    }

    pub fn database(&self) -> Option<&str> {
        match self {
            ConnectionTarget::Socket { database, .. } | ConnectionTarget::Host { database, .. } => {
                database.as_deref()
            }
        }
    }

    pub fn is_socket(&self) -> bool {
        matches!(self, ConnectionTarget::Socket { .. })
    }
}

impl fmt::Display for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionTarget::Socket { path, .. } => write!(f, "mysql:unix_socket={path}")?,
            ConnectionTarget::Host { host, port, .. } => {
                write!(f, "mysql:host={host}")?;
                if let Some(port) = port {
                    write!(f, ";port={port}")?;
                }
            }
        }
        write!(f, ";dbname={}", self.database().unwrap_or(""))
    }
}
