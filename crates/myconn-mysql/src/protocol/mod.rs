//! MySQL client/server protocol pieces used during session setup.
//!
//! MySQL packets have a 4-byte header:
//! - 3 bytes: payload length (little-endian)
//! - 1 byte: sequence number
//!
//! Maximum packet payload is 2^24 - 1 (16MB - 1). Larger payloads
//! are split into multiple packets.

pub mod buf;
pub mod framing;

pub use buf::{PayloadReader, PayloadWriter};
pub use framing::PacketStream;

use myconn_core::QueryErrorKind;

/// Maximum payload size for a single MySQL packet (2^24 - 1 bytes).
pub const MAX_PACKET_SIZE: usize = 0xFF_FF_FF;

/// MySQL capability flags (client and server).
pub mod capabilities {
    pub const CLIENT_LONG_PASSWORD: u32 = 1;
    pub const CLIENT_CONNECT_WITH_DB: u32 = 1 << 3;
    pub const CLIENT_PROTOCOL_41: u32 = 1 << 9;
    pub const CLIENT_TRANSACTIONS: u32 = 1 << 13;
    pub const CLIENT_SECURE_CONNECTION: u32 = 1 << 15;
    pub const CLIENT_MULTI_RESULTS: u32 = 1 << 17;
    pub const CLIENT_PLUGIN_AUTH: u32 = 1 << 19;
    pub const CLIENT_CONNECT_ATTRS: u32 = 1 << 20;
    pub const CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA: u32 = 1 << 21;
    pub const CLIENT_DEPRECATE_EOF: u32 = 1 << 24;

    /// Capabilities requested by every connection.
    pub const DEFAULT_CLIENT_FLAGS: u32 = CLIENT_PROTOCOL_41
        | CLIENT_SECURE_CONNECTION
        | CLIENT_LONG_PASSWORD
        | CLIENT_TRANSACTIONS
        | CLIENT_MULTI_RESULTS
        | CLIENT_PLUGIN_AUTH
        | CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA
        | CLIENT_DEPRECATE_EOF;
}

/// MySQL server status flags.
pub mod server_status {
    pub const SERVER_MORE_RESULTS_EXISTS: u16 = 0x0008;
}

/// Collation id sent in the handshake (utf8mb4_0900_ai_ci).
///
/// The session charset configured by the caller is applied afterwards with
/// `set names`, so this only governs the handshake itself.
pub const HANDSHAKE_COLLATION: u8 = 255;

/// Command bytes (COM_xxx) issued by this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    /// Quit connection
    Quit = 0x01,
    /// Switch database
    InitDb = 0x02,
    /// Text protocol query
    Query = 0x03,
    /// Ping server
    Ping = 0x0e,
}

/// A MySQL packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Payload length (3 bytes, max 16MB - 1)
    pub payload_length: u32,
    /// Sequence number (wraps at 255)
    pub sequence_id: u8,
}

impl PacketHeader {
    pub const SIZE: usize = 4;

    pub fn from_bytes(bytes: &[u8; 4]) -> Self {
        Self {
            payload_length: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]),
            sequence_id: bytes[3],
        }
    }

    pub fn to_bytes(self) -> [u8; 4] {
        let len = self.payload_length.to_le_bytes();
        [len[0], len[1], len[2], self.sequence_id]
    }
}

/// Classification of a server response by its first payload byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// OK packet (0x00)
    Ok,
    /// Error packet (0xFF)
    Error,
    /// EOF packet (0xFE with a short payload), also the auth-switch request
    Eof,
    /// LOCAL INFILE request (0xFB)
    LocalInfile,
    /// Anything else: result set header, row, or auth continuation data
    Data,
}

impl ResponseKind {
    pub fn classify(payload: &[u8]) -> Self {
        match payload.first() {
            Some(0x00) => ResponseKind::Ok,
            Some(0xFF) => ResponseKind::Error,
            Some(0xFE) if payload.len() < 9 => ResponseKind::Eof,
            Some(0xFB) => ResponseKind::LocalInfile,
            _ => ResponseKind::Data,
        }
    }
}

/// Does `payload` end the row stream of a result set?
///
/// With `CLIENT_DEPRECATE_EOF` the terminator is an OK packet under a 0xFE
/// header and may be 9 bytes or longer. A row only starts with 0xFE when its
/// first value needs an 8-byte length, so such a row fills a whole packet.
pub fn is_result_set_end(payload: &[u8], deprecate_eof: bool) -> bool {
    match payload.first() {
        Some(0xFE) if deprecate_eof => payload.len() < MAX_PACKET_SIZE,
        Some(0xFE) => payload.len() < 9,
        _ => false,
    }
}

/// Parsed OK packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OkPacket {
    pub affected_rows: u64,
    pub last_insert_id: u64,
    pub status_flags: u16,
    pub warnings: u16,
}

impl OkPacket {
    /// Parse an OK packet, with or without its 0x00 marker.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        let mut reader = PayloadReader::new(payload);
        if matches!(reader.peek(), Some(0x00 | 0xFE)) {
            reader.skip(1);
        }
        Some(Self {
            affected_rows: reader.read_lenenc_int()?,
            last_insert_id: reader.read_lenenc_int()?,
            status_flags: reader.read_u16_le().unwrap_or(0),
            warnings: reader.read_u16_le().unwrap_or(0),
        })
    }

    /// Read the status of a pre-4.1 style EOF packet
    /// (`0xFE`, warnings, status flags).
    pub fn from_eof(payload: &[u8]) -> Option<Self> {
        let mut reader = PayloadReader::new(payload.get(1..)?);
        let warnings = reader.read_u16_le().unwrap_or(0);
        Some(Self {
            affected_rows: 0,
            last_insert_id: 0,
            status_flags: reader.read_u16_le().unwrap_or(0),
            warnings,
        })
    }

    pub fn has_more_results(&self) -> bool {
        self.status_flags & server_status::SERVER_MORE_RESULTS_EXISTS != 0
    }
}

/// Parsed ERR packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrPacket {
    pub error_code: u16,
    /// SQL state (5 characters), empty for pre-4.1 style errors
    pub sql_state: String,
    pub error_message: String,
}

impl ErrPacket {
    /// Parse an ERR packet, with or without its 0xFF marker.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        let mut reader = PayloadReader::new(payload);
        if reader.peek() == Some(0xFF) {
            reader.skip(1);
        }
        let error_code = reader.read_u16_le()?;
        let sql_state = if reader.peek() == Some(b'#') {
            reader.skip(1);
            reader.read_string(5)?
        } else {
            String::new()
        };
        Some(Self {
            error_code,
            sql_state,
            error_message: reader.read_rest_string(),
        })
    }

    /// Map the server error number onto the shared query error kinds.
    pub fn query_kind(&self) -> QueryErrorKind {
        match self.error_code {
            // ER_PARSE_ERROR, ER_SYNTAX_ERROR
            1064 | 1149 => QueryErrorKind::Syntax,
            // ER_BAD_DB_ERROR, ER_UNKNOWN_CHARACTER_SET, ER_UNKNOWN_COLLATION,
            // ER_UNKNOWN_SYSTEM_VARIABLE, ER_UNKNOWN_TIME_ZONE
            1049 | 1115 | 1273 | 1193 | 1298 => QueryErrorKind::NotFound,
            // ER_DBACCESS_DENIED_ERROR, ER_ACCESS_DENIED_ERROR, ER_SPECIFIC_ACCESS_DENIED_ERROR
            1044 | 1045 | 1227 => QueryErrorKind::Permission,
            // ER_LOCK_DEADLOCK
            1213 => QueryErrorKind::Deadlock,
            _ => QueryErrorKind::Database,
        }
    }

    /// Errors raised by the server while the handshake is still running.
    pub fn is_access_denied(&self) -> bool {
        matches!(self.error_code, 1044 | 1045 | 1698)
    }
}
