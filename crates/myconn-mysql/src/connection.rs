//! A blocking MySQL session.
//!
//! [`MySqlSession::connect`] dials the server, runs the handshake and
//! authentication, and returns a session ready for text-protocol commands.
//! Only what session bootstrap needs is implemented: result sets are read
//! and discarded, never decoded.

use myconn_core::error::{ConnectionError, ConnectionErrorKind, QueryError, QueryErrorKind};
use myconn_core::{Error, Result, Session};

use crate::auth::{self, caching_sha2};
use crate::config::MySqlConfig;
use crate::handshake::{self, ServerGreeting, protocol_error};
use crate::protocol::capabilities::CLIENT_DEPRECATE_EOF;
use crate::protocol::{
    Command, ErrPacket, OkPacket, PacketStream, PayloadReader, PayloadWriter, ResponseKind,
    is_result_set_end,
};
use crate::transport::Transport;

/// First byte of an AuthMoreData packet.
const AUTH_MORE_DATA: u8 = 0x01;

/// An authenticated MySQL session.
pub struct MySqlSession {
    stream: PacketStream<Transport>,
    greeting: ServerGreeting,
    /// Capabilities both sides agreed on
    capabilities: u32,
    status_flags: u16,
    affected_rows: u64,
    warnings: u16,
    database: Option<String>,
}

impl std::fmt::Debug for MySqlSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlSession")
            .field("connection_id", &self.greeting.connection_id)
            .field("server_version", &self.greeting.server_version)
            .field("database", &self.database)
            .finish_non_exhaustive()
    }
}

impl MySqlSession {
    /// Connect and authenticate.
    ///
    /// 1. Dial TCP or the Unix socket
    /// 2. Read the server greeting
    /// 3. Send the handshake response
    /// 4. Follow auth-switch / fast-auth exchanges until OK or ERR
    #[tracing::instrument(level = "debug", skip(config), fields(user = %config.user))]
    pub fn connect(config: MySqlConfig) -> Result<Self> {
        let transport = Transport::connect(&config)?;
        let mut stream =
            PacketStream::new(transport).max_payload(config.max_packet_size as usize);

        let first = stream.read_packet()?;
        if ResponseKind::classify(&first) == ResponseKind::Error {
            // e.g. "Too many connections" or "Host is not allowed to connect"
            return Err(handshake_rejected(&first));
        }
        let greeting = ServerGreeting::parse(&first)?;
        tracing::debug!(
            server_version = %greeting.server_version,
            connection_id = greeting.connection_id,
            auth_plugin = %greeting.auth_plugin,
            "Received server greeting"
        );

        let capabilities = config.capability_flags() & greeting.capabilities;
        let response = handshake::build_response(&config, &greeting)?;
        stream.write_packet(&response)?;

        let mut session = Self {
            stream,
            status_flags: greeting.status_flags,
            greeting,
            capabilities,
            affected_rows: 0,
            warnings: 0,
            database: config.database.clone(),
        };
        session.authenticate(&config)?;
        tracing::debug!(
            connection_id = session.greeting.connection_id,
            "Authenticated"
        );
        Ok(session)
    }

    fn authenticate(&mut self, config: &MySqlConfig) -> Result<()> {
        let password = config.password.as_deref().unwrap_or("");
        loop {
            let payload = self.stream.read_packet()?;
            // The auth switch request reuses the 0xFE header regardless of
            // length, so dispatch on the raw first byte here.
            match payload.first() {
                Some(0x00) => {
                    if let Some(ok) = OkPacket::parse(&payload) {
                        self.status_flags = ok.status_flags;
                    }
                    return Ok(());
                }
                Some(0xFF) => return Err(auth_failed(&payload)),
                Some(0xFE) => {
                    let mut r = PayloadReader::new(&payload[1..]);
                    let plugin = r
                        .read_null_string()
                        .ok_or_else(|| protocol_error("Auth switch request without plugin name"))?;
                    let seed = r.read_rest();
                    let seed = seed.strip_suffix(&[0u8]).unwrap_or(seed);
                    tracing::debug!(plugin = %plugin, "Server requested auth switch");
                    auth::check_plugin(&plugin, config.allow_cleartext_password)?;
                    let response = auth::scramble(&plugin, password, seed);
                    self.stream.write_packet(&response)?;
                }
                Some(&AUTH_MORE_DATA) => match payload.get(1) {
                    Some(&caching_sha2::FAST_AUTH_SUCCESS) => {
                        tracing::trace!("caching_sha2_password fast auth succeeded");
                    }
                    Some(&caching_sha2::PERFORM_FULL_AUTH) => {
                        return Err(Error::Connection(ConnectionError {
                            kind: ConnectionErrorKind::Authentication,
                            message: "caching_sha2_password full authentication requires \
                                      a secure connection, which this client does not support"
                                .to_string(),
                            source: None,
                        }));
                    }
                    other => {
                        return Err(protocol_error(format!(
                            "Unexpected auth continuation: {other:02X?}"
                        )));
                    }
                },
                other => {
                    return Err(protocol_error(format!(
                        "Unexpected packet during authentication: {other:02X?}"
                    )));
                }
            }
        }
    }

    /// Server version string from the greeting.
    pub fn server_version(&self) -> &str {
        &self.greeting.server_version
    }

    /// Server-assigned connection id.
    pub fn connection_id(&self) -> u32 {
        self.greeting.connection_id
    }

    /// Database selected during the handshake or by [`select_db`](Self::select_db).
    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    /// Status flags from the most recent OK/EOF packet.
    pub fn status_flags(&self) -> u16 {
        self.status_flags
    }

    /// Warnings reported by the last statement.
    pub fn warnings(&self) -> u16 {
        self.warnings
    }

    /// Run a statement via `COM_QUERY` and return the affected row count.
    ///
    /// Any result sets are drained and discarded.
    pub fn execute(&mut self, sql: &str) -> Result<u64> {
        tracing::trace!(sql = %sql, "COM_QUERY");
        self.send_command(Command::Query, sql.as_bytes())?;

        self.affected_rows = 0;
        loop {
            let payload = self.stream.read_packet()?;
            let more = match ResponseKind::classify(&payload) {
                ResponseKind::Ok => {
                    let ok = OkPacket::parse(&payload)
                        .ok_or_else(|| protocol_error("Malformed OK packet"))?;
                    self.affected_rows += ok.affected_rows;
                    self.record_status(&ok)
                }
                ResponseKind::Error => return Err(statement_error(&payload, sql)),
                ResponseKind::LocalInfile => {
                    // Refuse by sending an empty file, then surface the refusal.
                    self.stream.write_packet(&[])?;
                    let _ = self.stream.read_packet()?;
                    return Err(Error::Query(QueryError {
                        kind: QueryErrorKind::Permission,
                        sql: Some(sql.to_string()),
                        sqlstate: None,
                        code: None,
                        message: "LOCAL INFILE is not supported".to_string(),
                        source: None,
                    }));
                }
                ResponseKind::Eof | ResponseKind::Data => self.drain_result_set(&payload, sql)?,
            };
            if !more {
                return Ok(self.affected_rows);
            }
        }
    }

    /// Change the default database via `COM_INIT_DB`.
    pub fn select_db(&mut self, name: &str) -> Result<()> {
        tracing::trace!(database = %name, "COM_INIT_DB");
        self.send_command(Command::InitDb, name.as_bytes())?;
        let payload = self.stream.read_packet()?;
        match ResponseKind::classify(&payload) {
            ResponseKind::Ok => {
                if let Some(ok) = OkPacket::parse(&payload) {
                    self.record_status(&ok);
                }
                self.database = Some(name.to_string());
                Ok(())
            }
            ResponseKind::Error => Err(statement_error(&payload, &format!("USE `{name}`"))),
            _ => Err(protocol_error("Unexpected response to COM_INIT_DB")),
        }
    }

    /// Check that the server is still answering.
    pub fn ping(&mut self) -> Result<()> {
        self.send_command(Command::Ping, &[])?;
        let payload = self.stream.read_packet()?;
        match ResponseKind::classify(&payload) {
            ResponseKind::Ok => Ok(()),
            ResponseKind::Error => Err(handshake_rejected(&payload)),
            _ => Err(protocol_error("Unexpected response to COM_PING")),
        }
    }

    /// Send `COM_QUIT` and close the socket.
    pub fn close(mut self) {
        // The server closes without replying; a failed write changes nothing.
        let _ = self.send_command(Command::Quit, &[]);
        self.stream.get_ref().shutdown();
    }

    fn send_command(&mut self, command: Command, body: &[u8]) -> Result<()> {
        let mut w = PayloadWriter::new();
        w.write_u8(command as u8);
        w.write_bytes(body);
        self.stream.reset_sequence();
        self.stream.write_packet(w.as_bytes())
    }

    /// Record status from a terminating packet; returns whether more
    /// results follow.
    fn record_status(&mut self, ok: &OkPacket) -> bool {
        self.status_flags = ok.status_flags;
        self.warnings = ok.warnings;
        ok.has_more_results()
    }

    fn drain_result_set(&mut self, header: &[u8], sql: &str) -> Result<bool> {
        let column_count = PayloadReader::new(header)
            .read_lenenc_int()
            .ok_or_else(|| protocol_error("Invalid column count"))?;
        for _ in 0..column_count {
            self.stream.read_packet()?;
        }
        let deprecate_eof = self.capabilities & CLIENT_DEPRECATE_EOF != 0;
        if !deprecate_eof {
            self.stream.read_packet()?;
        }

        loop {
            let payload = self.stream.read_packet()?;
            if is_result_set_end(&payload, deprecate_eof) {
                let end = if deprecate_eof {
                    OkPacket::parse(&payload)
                } else {
                    OkPacket::from_eof(&payload)
                }
                .ok_or_else(|| protocol_error("Malformed result set terminator"))?;
                return Ok(self.record_status(&end));
            }
            if ResponseKind::classify(&payload) == ResponseKind::Error {
                return Err(statement_error(&payload, sql));
            }
        }
    }
}

impl Session for MySqlSession {
    fn execute_statement(&mut self, sql: &str) -> Result<()> {
        self.execute(sql).map(|_| ())
    }

    fn select_database(&mut self, name: &str) -> Result<()> {
        self.select_db(name)
    }
}

fn parse_err(payload: &[u8]) -> Result<ErrPacket> {
    ErrPacket::parse(payload).ok_or_else(|| protocol_error("Invalid error packet"))
}

fn statement_error(payload: &[u8], sql: &str) -> Error {
    match parse_err(payload) {
        Ok(err) => Error::Query(QueryError {
            kind: err.query_kind(),
            sql: Some(sql.to_string()),
            sqlstate: Some(err.sql_state).filter(|s| !s.is_empty()),
            code: Some(err.error_code),
            message: err.error_message,
            source: None,
        }),
        Err(e) => e,
    }
}

fn auth_failed(payload: &[u8]) -> Error {
    match parse_err(payload) {
        Ok(err) => Error::Connection(ConnectionError {
            kind: ConnectionErrorKind::Authentication,
            message: format!("{} ({})", err.error_message, err.error_code),
            source: None,
        }),
        Err(e) => e,
    }
}

fn handshake_rejected(payload: &[u8]) -> Error {
    match parse_err(payload) {
        Ok(err) => Error::Connection(ConnectionError {
            kind: if err.is_access_denied() {
                ConnectionErrorKind::Authentication
            } else {
                ConnectionErrorKind::Connect
            },
            message: format!("{} ({})", err.error_message, err.error_code),
            source: None,
        }),
        Err(e) => e,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn err_payload(code: u16, state: &str, message: &str) -> Vec<u8> {
        let mut p = vec![0xFF];
        p.extend_from_slice(&code.to_le_bytes());
        p.push(b'#');
        p.extend_from_slice(state.as_bytes());
        p.extend_from_slice(message.as_bytes());
        p
    }

    #[test]
    fn statement_error_keeps_sql_and_code() {
        let err = statement_error(
            &err_payload(1231, "42000", "Variable 'sql_mode' can't be set to the value of 'NOPE'"),
            "set session sql_mode='NOPE'",
        );
        match err {
            Error::Query(q) => {
                assert_eq!(q.code, Some(1231));
                assert_eq!(q.sqlstate.as_deref(), Some("42000"));
                assert_eq!(q.sql.as_deref(), Some("set session sql_mode='NOPE'"));
                assert_eq!(q.kind, QueryErrorKind::Database);
            }
            other => panic!("expected query error, got {other:?}"),
        }
    }

    #[test]
    fn access_denied_is_not_transient() {
        let err = auth_failed(&err_payload(
            1045,
            "28000",
            "Access denied for user 'app'@'localhost' (using password: YES)",
        ));
        assert!(matches!(
            err,
            Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Authentication,
                ..
            })
        ));
        assert!(!err.is_lost_connection());
    }

    #[test]
    fn garbage_error_packet_is_protocol_error() {
        assert!(matches!(statement_error(&[0xFF], "select 1"), Error::Protocol(_)));
    }
}
