//! MySQL session bootstrap.
//!
//! `myconn` opens a MySQL session and prepares it for application use:
//!
//! - Connects over a Unix socket or TCP through a [`NativeClient`]
//! - Retries the connect once when it fails with a lost-connection error
//! - Selects the database and applies charset/collation, time zone,
//!   `sql_mode` and transaction isolation
//!
//! # Example
//!
//! ```rust,ignore
//! use myconn::ConnectionConfig;
//!
//! let config = ConnectionConfig::new()
//!     .host("127.0.0.1")
//!     .username("app")
//!     .password("secret")
//!     .database("shop")
//!     .charset("utf8mb4")
//!     .collation("utf8mb4_unicode_ci")
//!     .strict(true);
//!
//! let session = myconn::connect(&config)?;
//! ```

pub mod config;
pub mod establisher;
pub mod statements;
pub mod target;

pub use config::ConnectionConfig;
pub use establisher::{ConnectionEstablisher, configure};
pub use statements::{NON_STRICT_SQL_MODE, STRICT_SQL_MODE, SqlMode};
pub use target::ConnectionTarget;

pub use myconn_core::{
    Error, IsolationLevel, NativeClient, OpenParams, Result, Session, is_lost_connection,
};
pub use myconn_mysql::{MySqlClient, MySqlSession};

/// Open a configured session with the bundled native client.
pub fn connect(config: &ConnectionConfig) -> Result<MySqlSession> {
    ConnectionEstablisher::new(MySqlClient::new()).establish(config)
}
