//! Client and session traits.
//!
//! This module defines the seam between connection establishment and the
//! driver that actually talks to the server:
//!
//! - [`NativeClient`] - opens a new session from structured parameters
//! - [`Session`] - a live session that can run plain-text statements
//! - [`OpenParams`] - the discrete host/port/socket arguments for `open`
//! - [`IsolationLevel`] - SQL transaction isolation levels

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::error::Result;

/// Default MySQL TCP port.
pub const DEFAULT_PORT: u16 = 3306;

/// Default host when none is configured.
pub const DEFAULT_HOST: &str = "localhost";

/// Structured arguments for [`NativeClient::open`].
///
/// The host, port and socket are passed as discrete fields. Drivers never
/// receive a DSN string to re-parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenParams {
    /// Hostname or IP address (ignored when `unix_socket` is set)
    pub host: String,
    /// TCP port
    pub port: u16,
    /// Username for authentication
    pub username: String,
    /// Password for authentication
    pub password: Option<String>,
    /// Database to select during the handshake
    pub database: Option<String>,
    /// Path to a Unix domain socket
    pub unix_socket: Option<String>,
    /// Driver-level options, passed through untouched
    pub options: BTreeMap<String, String>,
}

impl Default for OpenParams {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            username: String::new(),
            password: None,
            database: None,
            unix_socket: None,
            options: BTreeMap::new(),
        }
    }
}

/// A live database session.
///
/// Sessions are owned by whoever opened them. Nothing in this crate keeps a
/// reference to a session after handing it out.
pub trait Session {
    /// Execute a plain-text statement, discarding any result rows.
    fn execute_statement(&mut self, sql: &str) -> Result<()>;

    /// Make `name` the default database of the session.
    fn select_database(&mut self, name: &str) -> Result<()>;
}

/// A driver capable of opening new sessions.
pub trait NativeClient {
    /// The session type produced by [`open`](Self::open).
    type Session: Session;

    /// Open a new socket or TCP session and authenticate.
    fn open(&self, params: &OpenParams) -> Result<Self::Session>;
}

impl<S: Session + ?Sized> Session for Box<S> {
    fn execute_statement(&mut self, sql: &str) -> Result<()> {
        (**self).execute_statement(sql)
    }

    fn select_database(&mut self, name: &str) -> Result<()> {
        (**self).select_database(name)
    }
}

impl<C: NativeClient + ?Sized> NativeClient for &C {
    type Session = C::Session;

    fn open(&self, params: &OpenParams) -> Result<Self::Session> {
        (**self).open(params)
    }
}

/// Transaction isolation level.
///
/// Defines the degree to which one transaction must be isolated from
/// resource or data modifications made by other concurrent transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IsolationLevel {
    /// Dirty reads, non-repeatable reads and phantoms are all possible.
    #[serde(alias = "READ UNCOMMITTED")]
    ReadUncommitted,

    /// Only committed changes are visible.
    #[serde(alias = "READ COMMITTED")]
    ReadCommitted,

    /// Consistent snapshot for the whole transaction. InnoDB default.
    #[serde(alias = "REPEATABLE READ")]
    RepeatableRead,

    /// Transactions appear to execute sequentially.
    Serializable,
}

impl IsolationLevel {
    /// Get the SQL syntax for this isolation level.
    #[must_use]
    pub const fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}
