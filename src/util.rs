//! # MQTT Serialization Utilities
//!
//! This module provides helpers for reading and writing MQTT-specific data types
//! from and to byte buffers, such as variable-byte integers and length-prefixed
//! strings. All writes are bounds-checked and report `BufferOverflow` instead of
//! panicking, so a packet that does not fit the fixed send buffer is an error.

use crate::error::{CodecResult, MqttError, ProtocolError};

/// The largest value a variable-byte integer can carry (four bytes).
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;

/// Number of bytes needed to encode `value` as a variable-byte integer.
pub fn variable_byte_integer_len(value: usize) -> usize {
    match value {
        0..=127 => 1,
        128..=16_383 => 2,
        16_384..=2_097_151 => 3,
        _ => 4,
    }
}

/// Writes a variable-byte integer at the start of `buf`, returning the byte count.
///
/// This is the encoding MQTT uses for the remaining-length field.
pub fn write_variable_byte_integer(buf: &mut [u8], mut value: usize) -> CodecResult<usize> {
    if value > MAX_REMAINING_LENGTH {
        return Err(MqttError::Protocol(ProtocolError::PayloadTooLarge));
    }
    let mut i = 0;
    loop {
        let mut encoded_byte = (value % 128) as u8;
        value /= 128;
        if value > 0 {
            encoded_byte |= 128;
        }
        *buf.get_mut(i).ok_or(MqttError::BufferOverflow)? = encoded_byte;
        i += 1;
        if value == 0 {
            break;
        }
    }
    Ok(i)
}

/// Reads a variable-byte integer from the start of `buf`.
///
/// Returns the decoded value and the number of bytes it occupied.
pub fn read_variable_byte_integer(buf: &[u8]) -> CodecResult<(usize, usize)> {
    let mut multiplier = 1;
    let mut value = 0;
    for i in 0..4 {
        let encoded_byte = *buf
            .get(i)
            .ok_or(MqttError::Protocol(ProtocolError::MalformedPacket))?;
        value += (encoded_byte & 127) as usize * multiplier;
        if encoded_byte & 128 == 0 {
            return Ok((value, i + 1));
        }
        multiplier *= 128;
    }
    Err(MqttError::Protocol(ProtocolError::MalformedPacket))
}

/// A bounds-checked cursor for packet encoding.
pub struct Writer<'b> {
    buf: &'b mut [u8],
    pos: usize,
}

impl<'b> Writer<'b> {
    pub fn new(buf: &'b mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Number of bytes written so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn put_u8(&mut self, value: u8) -> CodecResult<()> {
        *self.buf.get_mut(self.pos).ok_or(MqttError::BufferOverflow)? = value;
        self.pos += 1;
        Ok(())
    }

    pub fn put_u16(&mut self, value: u16) -> CodecResult<()> {
        self.put_bytes(&value.to_be_bytes())
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) -> CodecResult<()> {
        let end = self.pos + bytes.len();
        self.buf
            .get_mut(self.pos..end)
            .ok_or(MqttError::BufferOverflow)?
            .copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }

    /// Writes a UTF-8 string prefixed with its 2-byte length.
    pub fn put_str(&mut self, s: &str) -> CodecResult<()> {
        self.put_binary(s.as_bytes())
    }

    /// Writes binary data prefixed with its 2-byte length.
    pub fn put_binary(&mut self, bytes: &[u8]) -> CodecResult<()> {
        let len = u16::try_from(bytes.len())
            .map_err(|_| MqttError::Protocol(ProtocolError::PayloadTooLarge))?;
        self.put_u16(len)?;
        self.put_bytes(bytes)
    }

    /// Writes the fixed header: the first byte and the remaining length.
    pub fn put_fixed_header(&mut self, first_byte: u8, remaining_len: usize) -> CodecResult<()> {
        self.put_u8(first_byte)?;
        let rest = self.buf.get_mut(self.pos..).ok_or(MqttError::BufferOverflow)?;
        self.pos += write_variable_byte_integer(rest, remaining_len)?;
        Ok(())
    }
}

/// A bounds-checked cursor for packet decoding.
pub struct Reader<'b> {
    buf: &'b [u8],
    pos: usize,
}

impl<'b> Reader<'b> {
    pub fn new(buf: &'b [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn u8(&mut self) -> CodecResult<u8> {
        let value = *self
            .buf
            .get(self.pos)
            .ok_or(MqttError::Protocol(ProtocolError::MalformedPacket))?;
        self.pos += 1;
        Ok(value)
    }

    pub fn u16(&mut self) -> CodecResult<u16> {
        let bytes = self.bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn bytes(&mut self, len: usize) -> CodecResult<&'b [u8]> {
        let end = self.pos + len;
        let slice = self
            .buf
            .get(self.pos..end)
            .ok_or(MqttError::Protocol(ProtocolError::MalformedPacket))?;
        self.pos = end;
        Ok(slice)
    }

    /// Reads a UTF-8 string prefixed with its 2-byte length.
    pub fn str(&mut self) -> CodecResult<&'b str> {
        let len = self.u16()? as usize;
        core::str::from_utf8(self.bytes(len)?)
            .map_err(|_| MqttError::Protocol(ProtocolError::InvalidUtf8String))
    }

    /// Everything that has not been read yet.
    pub fn rest(&mut self) -> &'b [u8] {
        let rest = &self.buf[self.pos..];
        self.pos = self.buf.len();
        rest
    }

    /// Reads the fixed header, returning the first byte and the remaining length.
    ///
    /// Fails if the remaining length disagrees with the size of the buffer.
    pub fn fixed_header(&mut self) -> CodecResult<(u8, usize)> {
        let first = self.u8()?;
        let (remaining_len, consumed) = read_variable_byte_integer(&self.buf[self.pos..])?;
        self.pos += consumed;
        if remaining_len != self.remaining() {
            return Err(MqttError::Protocol(ProtocolError::MalformedPacket));
        }
        Ok((first, remaining_len))
    }
}
