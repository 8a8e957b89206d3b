//! Packet framing over a blocking byte stream.

use std::io::{Read, Write};

use myconn_core::error::{ConnectionError, ConnectionErrorKind, ProtocolError};
use myconn_core::{Error, Result};

use super::{MAX_PACKET_SIZE, PacketHeader};

/// Default cap on a joined incoming payload (64MB).
const DEFAULT_MAX_PAYLOAD: usize = 64 * 1024 * 1024;

/// A byte stream that speaks MySQL packets and tracks the sequence id.
#[derive(Debug)]
pub struct PacketStream<S> {
    stream: S,
    sequence_id: u8,
    max_payload: usize,
}

impl<S: Read + Write> PacketStream<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            sequence_id: 0,
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }

    /// Reject incoming logical packets longer than `max` bytes.
    pub fn max_payload(mut self, max: usize) -> Self {
        self.max_payload = max;
        self
    }

    /// Start a new command exchange.
    pub fn reset_sequence(&mut self) {
        self.sequence_id = 0;
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    /// Read one logical packet, joining continuation packets.
    ///
    /// Every frame must carry the expected sequence id, and the joined
    /// payload may not exceed the configured maximum.
    pub fn read_packet(&mut self) -> Result<Vec<u8>> {
        let mut payload = Vec::new();
        loop {
            let mut header = [0u8; PacketHeader::SIZE];
            self.stream
                .read_exact(&mut header)
                .map_err(|e| lost("reading packet header", e))?;
            let header = PacketHeader::from_bytes(&header);
            if header.sequence_id != self.sequence_id {
                return Err(framing_error(format!(
                    "Packets out of order: expected sequence {}, got {}",
                    self.sequence_id, header.sequence_id
                )));
            }
            self.sequence_id = header.sequence_id.wrapping_add(1);

            let len = header.payload_length as usize;
            let start = payload.len();
            if start + len > self.max_payload {
                return Err(framing_error(format!(
                    "Packet of at least {} bytes exceeds the {} byte limit",
                    start + len,
                    self.max_payload
                )));
            }
            payload.resize(start + len, 0);
            self.stream
                .read_exact(&mut payload[start..])
                .map_err(|e| lost("reading packet payload", e))?;

            if len < MAX_PACKET_SIZE {
                return Ok(payload);
            }
        }
    }

    /// Write one logical packet, splitting it at the 16MB boundary.
    pub fn write_packet(&mut self, payload: &[u8]) -> Result<()> {
        let mut frame = Vec::with_capacity(payload.len().min(MAX_PACKET_SIZE) + PacketHeader::SIZE);
        let mut last_len = 0;

        for chunk in payload.chunks(MAX_PACKET_SIZE) {
            frame.clear();
            frame.extend_from_slice(
                &PacketHeader {
                    payload_length: chunk.len() as u32,
                    sequence_id: self.sequence_id,
                }
                .to_bytes(),
            );
            frame.extend_from_slice(chunk);
            self.write_frame(&frame)?;
            self.sequence_id = self.sequence_id.wrapping_add(1);
            last_len = chunk.len();
        }

        // A payload that is empty or ends exactly on the boundary needs an
        // empty trailing packet.
        if last_len == MAX_PACKET_SIZE || payload.is_empty() {
            let header = PacketHeader {
                payload_length: 0,
                sequence_id: self.sequence_id,
            };
            self.write_frame(&header.to_bytes())?;
            self.sequence_id = self.sequence_id.wrapping_add(1);
        }

        self.stream
            .flush()
            .map_err(|e| write_failed("flushing", e))
    }

    fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.stream
            .write_all(frame)
            .map_err(|e| write_failed("sending packet", e))
    }
}

fn lost(context: &str, err: std::io::Error) -> Error {
    Error::Connection(ConnectionError {
        kind: ConnectionErrorKind::Disconnected,
        message: format!("Lost connection to MySQL server while {context}: {err}"),
        source: Some(Box::new(err)),
    })
}

fn framing_error(message: String) -> Error {
    Error::Protocol(ProtocolError {
        message,
        raw_data: None,
        source: None,
    })
}

fn write_failed(context: &str, err: std::io::Error) -> Error {
    Error::Connection(ConnectionError {
        kind: ConnectionErrorKind::Disconnected,
        message: format!("Error writing data to the connection while {context}: {err}"),
        source: Some(Box::new(err)),
    })
}
