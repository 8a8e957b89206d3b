//! Initial handshake (protocol version 10) and the client's response.

use myconn_core::error::ProtocolError;
use myconn_core::{Error, Result};

use crate::auth;
use crate::config::MySqlConfig;
use crate::protocol::capabilities::{
    CLIENT_CONNECT_ATTRS, CLIENT_CONNECT_WITH_DB, CLIENT_PLUGIN_AUTH,
    CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA, CLIENT_SECURE_CONNECTION,
};
use crate::protocol::{HANDSHAKE_COLLATION, PayloadReader, PayloadWriter};

/// What the server announced in its greeting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerGreeting {
    pub server_version: String,
    pub connection_id: u32,
    pub capabilities: u32,
    pub status_flags: u16,
    pub auth_plugin: String,
    /// Scramble (auth plugin data), without a trailing NUL
    pub auth_data: Vec<u8>,
}

impl ServerGreeting {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut r = PayloadReader::new(payload);

        let protocol_version = r.read_u8().ok_or_else(|| malformed("protocol version"))?;
        if protocol_version != 10 {
            return Err(protocol_error(format!(
                "Unsupported protocol version: {protocol_version}"
            )));
        }
        let server_version = r.read_null_string().ok_or_else(|| malformed("server version"))?;
        let connection_id = r.read_u32_le().ok_or_else(|| malformed("connection id"))?;
        let mut auth_data = r
            .read_bytes(8)
            .ok_or_else(|| malformed("auth data"))?
            .to_vec();
        r.skip(1);

        let caps_lower = r.read_u16_le().ok_or_else(|| malformed("capability flags"))?;
        let _collation = r.read_u8();
        let status_flags = r.read_u16_le().unwrap_or(0);
        let caps_upper = r.read_u16_le().unwrap_or(0);
        let capabilities = u32::from(caps_lower) | (u32::from(caps_upper) << 16);

        let auth_data_len = if capabilities & CLIENT_PLUGIN_AUTH != 0 {
            usize::from(r.read_u8().unwrap_or(0))
        } else {
            r.skip(1);
            0
        };
        r.skip(10);

        if capabilities & CLIENT_SECURE_CONNECTION != 0 {
            let len = auth_data_len.saturating_sub(8).max(13);
            let part2 = r.read_bytes(len.min(r.remaining())).unwrap_or_default();
            let part2 = part2.strip_suffix(&[0u8]).unwrap_or(part2);
            auth_data.extend_from_slice(part2);
        }

        let auth_plugin = if capabilities & CLIENT_PLUGIN_AUTH != 0 {
            r.read_null_string().unwrap_or_default()
        } else {
            auth::plugins::MYSQL_NATIVE_PASSWORD.to_string()
        };

        Ok(Self {
            server_version,
            connection_id,
            capabilities,
            status_flags,
            auth_plugin,
            auth_data,
        })
    }
}

/// Build the HandshakeResponse41 payload.
///
/// Fails without producing any bytes when the greeting names a plugin the
/// config does not allow.
pub fn build_response(config: &MySqlConfig, greeting: &ServerGreeting) -> Result<Vec<u8>> {
    auth::check_plugin(&greeting.auth_plugin, config.allow_cleartext_password)?;
    let caps = config.capability_flags() & greeting.capabilities;
    let password = config.password.as_deref().unwrap_or("");
    let auth_response = auth::scramble(&greeting.auth_plugin, password, &greeting.auth_data);

    let mut w = PayloadWriter::new();
    w.write_u32_le(caps);
    w.write_u32_le(config.max_packet_size);
    w.write_u8(HANDSHAKE_COLLATION);
    w.write_zeros(23);
    w.write_null_string(&config.user);

    if caps & CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA != 0 {
        w.write_lenenc_bytes(&auth_response);
    } else {
        // Scrambles are 20 or 32 bytes; clear-text passwords are sent only
        // under the lenenc capability above.
        w.write_u8(auth_response.len() as u8);
        w.write_bytes(&auth_response);
    }

    if caps & CLIENT_CONNECT_WITH_DB != 0 {
        w.write_null_string(config.database.as_deref().unwrap_or(""));
    }
    if caps & CLIENT_PLUGIN_AUTH != 0 {
        w.write_null_string(&greeting.auth_plugin);
    }
    if caps & CLIENT_CONNECT_ATTRS != 0 {
        let mut attrs = PayloadWriter::new();
        for (key, value) in &config.attributes {
            attrs.write_lenenc_string(key);
            attrs.write_lenenc_string(value);
        }
        w.write_lenenc_bytes(attrs.as_bytes());
    }

    Ok(w.into_bytes())
}

pub(crate) fn protocol_error(msg: impl Into<String>) -> Error {
    Error::Protocol(ProtocolError {
        message: msg.into(),
        raw_data: None,
        source: None,
    })
}

fn malformed(what: &str) -> Error {
    protocol_error(format!("Malformed server greeting: missing {what}"))
}
