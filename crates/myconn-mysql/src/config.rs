//! Native client configuration.
//!
//! [`MySqlConfig`] is the driver's own view of a connection. It is built
//! from the establisher's [`OpenParams`] via [`MySqlConfig::from_open_params`],
//! which also interprets the driver options map.

use std::collections::BTreeMap;
use std::time::Duration;

use myconn_core::{DEFAULT_HOST, DEFAULT_PORT, Error, OpenParams, Result};

use crate::protocol::capabilities::{
    CLIENT_CONNECT_ATTRS, CLIENT_CONNECT_WITH_DB, DEFAULT_CLIENT_FLAGS,
};

/// Driver option keys understood by [`MySqlConfig::from_open_params`].
pub mod options {
    /// Seconds to wait for the TCP/socket connect
    pub const CONNECT_TIMEOUT: &str = "connect_timeout";
    /// Seconds to wait on a blocking read
    pub const READ_TIMEOUT: &str = "read_timeout";
    /// Seconds to wait on a blocking write
    pub const WRITE_TIMEOUT: &str = "write_timeout";
    /// Sent to the server as the `program_name` connection attribute
    pub const PROGRAM_NAME: &str = "program_name";
    /// `true`/`1` allows `mysql_clear_password` over the plain connection
    pub const ENABLE_CLEARTEXT_PLUGIN: &str = "enable_cleartext_plugin";
}

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Where the client should connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// TCP host and port
    Tcp { host: String, port: u16 },
    /// Unix domain socket path
    Socket(String),
}

/// MySQL connection configuration.
#[derive(Debug, Clone)]
pub struct MySqlConfig {
    /// Hostname or IP address
    pub host: String,
    /// Port number (default: 3306)
    pub port: u16,
    /// Unix socket path; when set it wins over host/port
    pub unix_socket: Option<String>,
    /// Username for authentication
    pub user: String,
    /// Password for authentication
    pub password: Option<String>,
    /// Database to select during the handshake
    pub database: Option<String>,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Read timeout, `None` blocks forever
    pub read_timeout: Option<Duration>,
    /// Write timeout, `None` blocks forever
    pub write_timeout: Option<Duration>,
    /// Connection attributes sent with the handshake
    pub attributes: BTreeMap<String, String>,
    /// Max allowed packet size announced to the server (default: 64MB).
    /// Incoming packets larger than this are rejected.
    pub max_packet_size: u32,
    /// Answer `mysql_clear_password` requests (off by default)
    pub allow_cleartext_password: bool,
}

impl Default for MySqlConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            unix_socket: None,
            user: String::new(),
            password: None,
            database: None,
            connect_timeout: DEFAULT_TIMEOUT,
            read_timeout: Some(DEFAULT_TIMEOUT),
            write_timeout: Some(DEFAULT_TIMEOUT),
            attributes: BTreeMap::new(),
            max_packet_size: 64 * 1024 * 1024,
            allow_cleartext_password: false,
        }
    }
}

impl MySqlConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a driver config from establisher parameters.
    ///
    /// Unknown option keys are rejected so a typo does not silently fall
    /// back to a default.
    pub fn from_open_params(params: &OpenParams) -> Result<Self> {
        let mut config = Self::new()
            .host(params.host.clone())
            .port(params.port)
            .user(params.username.clone());
        config.password.clone_from(&params.password);
        config.database = params.database.clone().filter(|db| !db.is_empty());
        config.unix_socket = params.unix_socket.clone().filter(|s| !s.is_empty());

        for (key, value) in &params.options {
            match key.as_str() {
                options::CONNECT_TIMEOUT => config.connect_timeout = parse_seconds(key, value)?,
                options::READ_TIMEOUT => config.read_timeout = Some(parse_seconds(key, value)?),
                options::WRITE_TIMEOUT => config.write_timeout = Some(parse_seconds(key, value)?),
                options::PROGRAM_NAME => {
                    config = config.attribute("program_name", value.clone());
                }
                options::ENABLE_CLEARTEXT_PLUGIN => {
                    config.allow_cleartext_password = parse_flag(key, value)?;
                }
                _ => {
                    return Err(Error::config(
                        "options",
                        format!("unsupported driver option '{key}'"),
                    ));
                }
            }
        }
        Ok(config)
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn unix_socket(mut self, path: impl Into<String>) -> Self {
        self.unix_socket = Some(path.into());
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn allow_cleartext_password(mut self, allow: bool) -> Self {
        self.allow_cleartext_password = allow;
        self
    }

    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// The endpoint to dial: the socket if configured, otherwise host:port.
    pub fn endpoint(&self) -> Endpoint {
        match &self.unix_socket {
            Some(path) => Endpoint::Socket(path.clone()),
            None => Endpoint::Tcp {
                host: self.host.clone(),
                port: self.port,
            },
        }
    }

    /// Capability flags requested in the handshake response.
    pub fn capability_flags(&self) -> u32 {
        let mut flags = DEFAULT_CLIENT_FLAGS;
        if self.database.is_some() {
            flags |= CLIENT_CONNECT_WITH_DB;
        }
        if !self.attributes.is_empty() {
            flags |= CLIENT_CONNECT_ATTRS;
        }
        flags
    }
}

fn parse_seconds(key: &str, value: &str) -> Result<Duration> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|secs| *secs > 0.0)
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .ok_or_else(|| {
            Error::config(
                "options",
                format!("'{key}' must be a positive number of seconds, got '{value}'"),
            )
        })
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::config(
            "options",
            format!("'{key}' must be a boolean, got '{value}'"),
        )),
    }
}
