//! Error types for connection establishment and session setup.

use std::fmt;

use crate::lost_connection;

/// The primary error type for all myconn operations.
#[derive(Debug)]
pub enum Error {
    /// Connection-related errors (connect, authenticate, disconnect)
    Connection(ConnectionError),
    /// Statement execution errors
    Query(QueryError),
    /// Protocol errors (wire-level)
    Protocol(ProtocolError),
    /// Configuration errors
    Config(ConfigError),
    /// I/O errors
    Io(std::io::Error),
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Failed to establish connection
    Connect,
    /// Authentication failed
    Authentication,
    /// Connection lost during operation
    Disconnected,
    /// Connection refused
    Refused,
    /// Socket path or host could not be resolved
    Address,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    pub sqlstate: Option<String>,
    /// Server error number (e.g. 1045, 1193)
    pub code: Option<u16>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Syntax error in SQL
    Syntax,
    /// Unknown database, variable, or charset
    NotFound,
    /// Permission denied
    Permission,
    /// Deadlock detected
    Deadlock,
    /// Other database error
    Database,
}

#[derive(Debug)]
pub struct ProtocolError {
    pub message: String,
    pub raw_data: Option<Vec<u8>>,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug)]
pub struct ConfigError {
    /// Configuration key the error refers to, if any
    pub field: Option<&'static str>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Build a configuration error for a single key.
    pub fn config(field: &'static str, message: impl Into<String>) -> Self {
        Error::Config(ConfigError {
            field: Some(field),
            message: message.into(),
            source: None,
        })
    }

    /// Does this error's message carry a lost-connection signature?
    ///
    /// The check runs on the rendered message so that errors coming from
    /// any driver (or wrapped in a custom message) classify the same way.
    pub fn is_lost_connection(&self) -> bool {
        lost_connection::is_lost_connection(&self.to_string())
    }

    /// Is this a transient connection failure worth one reconnect attempt?
    pub fn is_transient_connection(&self) -> bool {
        self.is_lost_connection()
    }

    /// Is this a connection error that likely requires reconnection?
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Error::Connection(_) | Error::Protocol(_) | Error::Io(_)
        )
    }

    /// Get SQLSTATE if available (e.g., "42000" for a syntax error)
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sqlstate.as_deref(),
            _ => None,
        }
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "Connection error: {}", e.message),
            Error::Query(e) => match (&e.code, &e.sqlstate) {
                (Some(code), Some(state)) => {
                    write!(f, "Query error {} (SQLSTATE {}): {}", code, state, e.message)
                }
                (None, Some(state)) => write!(f, "Query error (SQLSTATE {}): {}", state, e.message),
                _ => write!(f, "Query error: {}", e.message),
            },
            Error::Protocol(e) => write!(f, "Protocol error: {}", e.message),
            Error::Config(e) => write!(f, "Configuration error: {}", e),
            Error::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connection(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Query(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Protocol(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Io(e) => Some(e),
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sqlstate) = &self.sqlstate {
            write!(f, "{} (SQLSTATE {})", self.message, sqlstate)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.field {
            Some(field) => write!(f, "'{}': {}", field, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Error::Connection(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<ProtocolError> for Error {
    fn from(err: ProtocolError) -> Self {
        Error::Protocol(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

/// Result type alias for myconn operations.
pub type Result<T> = std::result::Result<T, Error>;
