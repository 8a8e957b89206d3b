//! Byte-level helpers for MySQL payloads.
//!
//! [`PayloadReader`] walks a received payload; [`PayloadWriter`] assembles
//! one to send. Both only cover the types the session bootstrap needs:
//! fixed-width little-endian integers, length-encoded integers and strings,
//! and NUL-terminated strings.

/// A cursor over a received packet payload.
#[derive(Debug)]
pub struct PayloadReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    pub fn skip(&mut self, n: usize) -> bool {
        if self.remaining() >= n {
            self.pos += n;
            true
        } else {
            false
        }
    }

    pub fn read_u8(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        Some(byte)
    }

    pub fn read_u16_le(&mut self) -> Option<u16> {
        self.read_array::<2>().map(u16::from_le_bytes)
    }

    pub fn read_u32_le(&mut self) -> Option<u32> {
        self.read_array::<4>().map(u32::from_le_bytes)
    }

    fn read_array<const N: usize>(&mut self) -> Option<[u8; N]> {
        let bytes = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Some(out)
    }

    /// Read a length-encoded integer.
    ///
    /// `0xFB` (NULL) and `0xFF` (reserved) yield `None`.
    pub fn read_lenenc_int(&mut self) -> Option<u64> {
        match self.read_u8()? {
            first @ 0x00..=0xFA => Some(u64::from(first)),
            0xFC => self.read_u16_le().map(u64::from),
            0xFD => {
                let b = self.read_array::<3>()?;
                Some(u64::from(b[0]) | (u64::from(b[1]) << 8) | (u64::from(b[2]) << 16))
            }
            0xFE => self.read_array::<8>().map(u64::from_le_bytes),
            _ => None,
        }
    }

    pub fn read_bytes(&mut self, len: usize) -> Option<&'a [u8]> {
        if self.remaining() < len {
            return None;
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Some(bytes)
    }

    pub fn read_string(&mut self, len: usize) -> Option<String> {
        self.read_bytes(len)
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    /// Read up to (and consume) the next NUL byte.
    ///
    /// A missing terminator reads to the end of the payload.
    pub fn read_null_string(&mut self) -> Option<String> {
        if self.remaining() == 0 {
            return None;
        }
        let rest = &self.data[self.pos..];
        let end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
        let s = String::from_utf8_lossy(&rest[..end]).into_owned();
        self.pos += (end + 1).min(rest.len());
        Some(s)
    }

    pub fn read_rest(&mut self) -> &'a [u8] {
        let rest = &self.data[self.pos.min(self.data.len())..];
        self.pos = self.data.len();
        rest
    }

    pub fn read_rest_string(&mut self) -> String {
        String::from_utf8_lossy(self.read_rest()).into_owned()
    }
}

/// Builder for an outgoing payload (without the 4-byte header).
#[derive(Debug, Default)]
pub struct PayloadWriter {
    buffer: Vec<u8>,
}

impl PayloadWriter {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(128),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    pub fn write_u32_le(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_zeros(&mut self, count: usize) {
        self.buffer.resize(self.buffer.len() + count, 0);
    }

    pub fn write_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Write a length-encoded integer.
    pub fn write_lenenc_int(&mut self, value: u64) {
        if value < 251 {
            self.write_u8(value as u8);
        } else if value < 0x1_0000 {
            self.write_u8(0xFC);
            self.write_bytes(&(value as u16).to_le_bytes());
        } else if value < 0x100_0000 {
            self.write_u8(0xFD);
            self.write_bytes(&(value as u32).to_le_bytes()[..3]);
        } else {
            self.write_u8(0xFE);
            self.write_bytes(&value.to_le_bytes());
        }
    }

    pub fn write_lenenc_bytes(&mut self, data: &[u8]) {
        self.write_lenenc_int(data.len() as u64);
        self.write_bytes(data);
    }

    pub fn write_lenenc_string(&mut self, s: &str) {
        self.write_lenenc_bytes(s.as_bytes());
    }

    pub fn write_null_string(&mut self, s: &str) {
        self.write_bytes(s.as_bytes());
        self.write_u8(0);
    }
}
