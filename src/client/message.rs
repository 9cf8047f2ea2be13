//! Application messages and payload classification.

use crate::packet::QoS;

/// A message payload, tagged when it is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Payload<'a> {
    /// Printable UTF-8 text.
    Text(&'a str),
    /// Arbitrary bytes.
    Bytes(&'a [u8]),
}

impl<'a> Payload<'a> {
    /// Tags untyped bytes coming from outside the application, e.g. the network.
    pub fn classify(bytes: &'a [u8]) -> Self {
        if is_raw_payload(bytes) {
            return Payload::Bytes(bytes);
        }
        match core::str::from_utf8(bytes) {
            Ok(text) => Payload::Text(text),
            Err(_) => Payload::Bytes(bytes),
        }
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        match self {
            Payload::Text(text) => text.as_bytes(),
            Payload::Bytes(bytes) => bytes,
        }
    }

    pub fn as_text(&self) -> Option<&'a str> {
        match self {
            Payload::Text(text) => Some(text),
            Payload::Bytes(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

impl<'a> From<&'a str> for Payload<'a> {
    fn from(text: &'a str) -> Self {
        Payload::Text(text)
    }
}

impl<'a> From<&'a [u8]> for Payload<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        Payload::Bytes(bytes)
    }
}

impl<'a, const N: usize> From<&'a [u8; N]> for Payload<'a> {
    fn from(bytes: &'a [u8; N]) -> Self {
        Payload::Bytes(bytes)
    }
}

/// Classifies untyped payload bytes: `true` for raw binary, `false` for text.
///
/// Text is valid UTF-8 without control characters other than tab, carriage
/// return and line feed. A single trailing NUL (a C string terminator) is
/// tolerated. The empty payload counts as text.
pub fn is_raw_payload(bytes: &[u8]) -> bool {
    let body = match bytes.split_last() {
        Some((0, body)) => body,
        _ => bytes,
    };
    match core::str::from_utf8(body) {
        Ok(text) => text
            .chars()
            .any(|c| c.is_control() && !matches!(c, '\t' | '\n' | '\r')),
        Err(_) => true,
    }
}

/// A received or to-be-published application message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Message<'a> {
    pub qos: QoS,
    pub retained: bool,
    pub dup: bool,
    /// Packet identifier, meaningful only for QoS 1 and 2.
    pub packet_id: u16,
    pub payload: Payload<'a>,
}

impl<'a> Message<'a> {
    pub fn new(qos: QoS, payload: impl Into<Payload<'a>>) -> Self {
        Self {
            qos,
            retained: false,
            dup: false,
            packet_id: 0,
            payload: payload.into(),
        }
    }

    pub fn with_retain(mut self, retained: bool) -> Self {
        self.retained = retained;
        self
    }

    /// Marks a re-publish of a QoS 1/2 message that may already have been delivered.
    pub fn with_dup(mut self, dup: bool) -> Self {
        self.dup = dup;
        self
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
