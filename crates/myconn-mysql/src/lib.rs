//! Native MySQL client for myconn.
//!
//! A small, blocking implementation of the MySQL client protocol over
//! `std::net`. It covers what session bootstrap needs:
//!
//! - TCP and Unix-socket transports
//! - Packet framing with sequence numbers
//! - Authentication (mysql_native_password, caching_sha2_password fast auth)
//! - `COM_QUERY`, `COM_INIT_DB`, `COM_PING`, `COM_QUIT`
//!
//! # Example
//!
//! ```rust,ignore
//! use myconn_mysql::{MySqlConfig, MySqlSession};
//!
//! let config = MySqlConfig::new()
//!     .host("localhost")
//!     .port(3306)
//!     .user("root")
//!     .database("mydb");
//!
//! let mut session = MySqlSession::connect(config)?;
//! session.execute("set names 'utf8mb4'")?;
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod connection;
pub mod handshake;
pub mod protocol;
pub mod transport;

pub use client::MySqlClient;
pub use config::{Endpoint, MySqlConfig};
pub use connection::MySqlSession;
pub use transport::Transport;
