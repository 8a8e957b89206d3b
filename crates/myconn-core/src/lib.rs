//! Core types and traits for myconn.
//!
//! This crate provides the pieces shared by the establisher and drivers:
//!
//! - `Error` taxonomy for connect, statement, protocol and config failures
//! - Lost-connection detection used to decide on a single reconnect
//! - `NativeClient` and `Session` traits at the driver seam

pub mod error;
pub mod lost_connection;
pub mod session;

pub use error::{
    ConfigError, ConnectionError, ConnectionErrorKind, Error, ProtocolError, QueryError,
    QueryErrorKind, Result,
};
pub use lost_connection::{LOST_CONNECTION_SIGNATURES, is_lost_connection};
pub use session::{DEFAULT_HOST, DEFAULT_PORT, IsolationLevel, NativeClient, OpenParams, Session};
