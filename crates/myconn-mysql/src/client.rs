//! [`NativeClient`] implementation backed by [`MySqlSession`].

use myconn_core::{NativeClient, OpenParams, Result};

use crate::config::MySqlConfig;
use crate::connection::MySqlSession;

/// Opens blocking MySQL sessions.
///
/// The client itself holds no connections; every [`open`](NativeClient::open)
/// dials a fresh socket.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlClient;

impl MySqlClient {
    pub fn new() -> Self {
        Self
    }
}

impl NativeClient for MySqlClient {
    type Session = MySqlSession;

    fn open(&self, params: &OpenParams) -> Result<MySqlSession> {
        MySqlSession::connect(MySqlConfig::from_open_params(params)?)
    }
}
