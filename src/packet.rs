//! # MQTT Packet Structures and Serialization
//!
//! This module defines the MQTT 3.1.1 control packets the client sends and receives,
//! and the traits for encoding and decoding them to and from a byte buffer.
//!
//! Encoders compute the remaining length up front and write straight into the
//! caller's buffer; decoders borrow topic and payload slices from the receive buffer.

use crate::error::{CodecResult, MqttError, ProtocolError};
use crate::util::{Reader, Writer};
use heapless::Vec;

/// Protocol name carried by every CONNECT.
const PROTOCOL_NAME: &str = "MQTT";
/// Protocol level for MQTT 3.1.1.
const PROTOCOL_LEVEL: u8 = 4;

/// SUBACK return code signalling a refused subscription.
pub const SUBACK_FAILURE: u8 = 0x80;

/// Maximum number of return codes kept from a SUBACK.
pub const MAX_SUBACK_CODES: usize = 8;

/// Represents the Quality of Service (QoS) levels for MQTT messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum QoS {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl TryFrom<u8> for QoS {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            _ => Err(ProtocolError::MalformedPacket),
        }
    }
}

/// Control packet types, as found in the upper nibble of the first header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum PacketType {
    Connect = 1,
    ConnAck = 2,
    Publish = 3,
    PubAck = 4,
    PubRec = 5,
    PubRel = 6,
    PubComp = 7,
    Subscribe = 8,
    SubAck = 9,
    Unsubscribe = 10,
    UnsubAck = 11,
    PingReq = 12,
    PingResp = 13,
    Disconnect = 14,
}

/// A trait for packets that can be encoded into a byte buffer.
pub trait EncodePacket {
    /// Encodes the packet at the start of `buf`, returning its length.
    fn encode(&self, buf: &mut [u8]) -> CodecResult<usize>;
}

/// A trait for packets that can be decoded from a complete packet buffer.
pub trait DecodePacket<'a>: Sized {
    fn decode(buf: &'a [u8]) -> CodecResult<Self>;
}

/// The packets a client can receive from a broker.
#[derive(Debug, PartialEq, Eq)]
pub enum MqttPacket<'a> {
    ConnAck(ConnAck),
    Publish(Publish<'a>),
    PubAck(u16),
    PubRec(u16),
    PubRel(u16),
    PubComp(u16),
    SubAck(SubAck),
    UnsubAck(u16),
    PingResp,
}

/// Decodes a complete inbound packet.
///
/// Packet types a broker never sends to a client are reported as
/// [`ProtocolError::InvalidPacketType`].
pub fn decode(buf: &[u8]) -> CodecResult<MqttPacket<'_>> {
    let first = *buf
        .first()
        .ok_or(MqttError::Protocol(ProtocolError::MalformedPacket))?;
    let packet_type = first >> 4;
    let packet = match packet_type {
        2 => MqttPacket::ConnAck(ConnAck::decode(buf)?),
        3 => MqttPacket::Publish(Publish::decode(buf)?),
        4 => MqttPacket::PubAck(Ack::decode(buf)?.packet_id),
        5 => MqttPacket::PubRec(Ack::decode(buf)?.packet_id),
        6 => MqttPacket::PubRel(Ack::decode(buf)?.packet_id),
        7 => MqttPacket::PubComp(Ack::decode(buf)?.packet_id),
        9 => MqttPacket::SubAck(SubAck::decode(buf)?),
        11 => MqttPacket::UnsubAck(Ack::decode(buf)?.packet_id),
        13 => {
            let mut reader = Reader::new(buf);
            reader.fixed_header()?;
            MqttPacket::PingResp
        }
        _ => {
            return Err(MqttError::Protocol(ProtocolError::InvalidPacketType(
                packet_type,
            )));
        }
    };
    Ok(packet)
}

// --- CONNECT Packet ---

/// The message the broker publishes on the client's behalf if it disappears.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LastWill<'a> {
    pub topic: &'a str,
    pub payload: &'a [u8],
    pub qos: QoS,
    pub retain: bool,
}

#[derive(Debug)]
pub struct Connect<'a> {
    pub client_id: &'a str,
    pub keep_alive: u16,
    pub clean_session: bool,
    pub username: Option<&'a str>,
    pub password: Option<&'a [u8]>,
    pub will: Option<LastWill<'a>>,
}

impl<'a> Connect<'a> {
    pub fn new(client_id: &'a str, keep_alive: u16, clean_session: bool) -> Self {
        Self {
            client_id,
            keep_alive,
            clean_session,
            username: None,
            password: None,
            will: None,
        }
    }

    fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.clean_session {
            flags |= 0x02;
        }
        if let Some(will) = &self.will {
            flags |= 0x04 | ((will.qos as u8) << 3);
            if will.retain {
                flags |= 0x20;
            }
        }
        if self.password.is_some() {
            flags |= 0x40;
        }
        if self.username.is_some() {
            flags |= 0x80;
        }
        flags
    }
}

impl EncodePacket for Connect<'_> {
    fn encode(&self, buf: &mut [u8]) -> CodecResult<usize> {
        // protocol name + level + flags + keep alive
        let mut remaining_len = 2 + PROTOCOL_NAME.len() + 1 + 1 + 2;
        remaining_len += 2 + self.client_id.len();
        if let Some(will) = &self.will {
            remaining_len += 2 + will.topic.len() + 2 + will.payload.len();
        }
        if let Some(username) = self.username {
            remaining_len += 2 + username.len();
        }
        if let Some(password) = self.password {
            remaining_len += 2 + password.len();
        }

        let mut w = Writer::new(buf);
        w.put_fixed_header(0x10, remaining_len)?;
        w.put_str(PROTOCOL_NAME)?;
        w.put_u8(PROTOCOL_LEVEL)?;
        w.put_u8(self.flags())?;
        w.put_u16(self.keep_alive)?;
        w.put_str(self.client_id)?;
        if let Some(will) = &self.will {
            w.put_str(will.topic)?;
            w.put_binary(will.payload)?;
        }
        if let Some(username) = self.username {
            w.put_str(username)?;
        }
        if let Some(password) = self.password {
            w.put_binary(password)?;
        }
        Ok(w.position())
    }
}

// --- CONNACK Packet ---
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnAck {
    pub session_present: bool,
    pub return_code: u8,
}

impl<'a> DecodePacket<'a> for ConnAck {
    fn decode(buf: &'a [u8]) -> CodecResult<Self> {
        let mut r = Reader::new(buf);
        let (_, remaining_len) = r.fixed_header()?;
        if remaining_len != 2 {
            return Err(MqttError::Protocol(ProtocolError::MalformedPacket));
        }
        let session_present = r.u8()? & 0x01 != 0;
        let return_code = r.u8()?;
        Ok(Self {
            session_present,
            return_code,
        })
    }
}

// --- PUBLISH Packet ---
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Publish<'a> {
    pub topic: &'a str,
    pub qos: QoS,
    pub dup: bool,
    pub retain: bool,
    /// Present exactly when `qos` is above `AtMostOnce`.
    pub packet_id: Option<u16>,
    pub payload: &'a [u8],
}

impl<'a> DecodePacket<'a> for Publish<'a> {
    fn decode(buf: &'a [u8]) -> CodecResult<Self> {
        let mut r = Reader::new(buf);
        let (first, _) = r.fixed_header()?;
        let qos = QoS::try_from((first >> 1) & 0x03).map_err(MqttError::Protocol)?;
        let dup = first & 0x08 != 0;
        let retain = first & 0x01 != 0;
        let topic = r.str()?;
        let packet_id = if qos != QoS::AtMostOnce {
            Some(r.u16()?)
        } else {
            None
        };
        let payload = r.rest();
        Ok(Publish {
            topic,
            qos,
            dup,
            retain,
            packet_id,
            payload,
        })
    }
}

impl EncodePacket for Publish<'_> {
    fn encode(&self, buf: &mut [u8]) -> CodecResult<usize> {
        let mut first = 0x30 | ((self.qos as u8) << 1);
        if self.dup {
            first |= 0x08;
        }
        if self.retain {
            first |= 0x01;
        }

        let with_id = self.qos != QoS::AtMostOnce;
        let remaining_len =
            2 + self.topic.len() + if with_id { 2 } else { 0 } + self.payload.len();

        let mut w = Writer::new(buf);
        w.put_fixed_header(first, remaining_len)?;
        w.put_str(self.topic)?;
        if with_id {
            let id = self
                .packet_id
                .ok_or(MqttError::Protocol(ProtocolError::MalformedPacket))?;
            w.put_u16(id)?;
        }
        w.put_bytes(self.payload)?;
        Ok(w.position())
    }
}

// --- PUBACK / PUBREC / PUBREL / PUBCOMP / UNSUBACK ---

/// A two-byte acknowledgment carrying only a packet identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub kind: PacketType,
    pub packet_id: u16,
}

impl Ack {
    pub fn new(kind: PacketType, packet_id: u16) -> Self {
        Self { kind, packet_id }
    }
}

impl<'a> DecodePacket<'a> for Ack {
    fn decode(buf: &'a [u8]) -> CodecResult<Self> {
        let mut r = Reader::new(buf);
        let (first, remaining_len) = r.fixed_header()?;
        if remaining_len != 2 {
            return Err(MqttError::Protocol(ProtocolError::MalformedPacket));
        }
        let kind = match first >> 4 {
            4 => PacketType::PubAck,
            5 => PacketType::PubRec,
            6 => PacketType::PubRel,
            7 => PacketType::PubComp,
            11 => PacketType::UnsubAck,
            other => {
                return Err(MqttError::Protocol(ProtocolError::InvalidPacketType(other)));
            }
        };
        Ok(Self {
            kind,
            packet_id: r.u16()?,
        })
    }
}

impl EncodePacket for Ack {
    fn encode(&self, buf: &mut [u8]) -> CodecResult<usize> {
        // PUBREL carries the reserved flag bits 0b0010.
        let first = match self.kind {
            PacketType::PubRel => 0x62,
            kind => (kind as u8) << 4,
        };
        let mut w = Writer::new(buf);
        w.put_fixed_header(first, 2)?;
        w.put_u16(self.packet_id)?;
        Ok(w.position())
    }
}

// --- SUBSCRIBE Packet ---
#[derive(Debug)]
pub struct Subscribe<'a> {
    pub packet_id: u16,
    pub topic: &'a str,
    pub qos: QoS,
}

impl<'a> Subscribe<'a> {
    /// Creates a new Subscribe packet with a single topic filter.
    pub fn new(packet_id: u16, topic: &'a str, qos: QoS) -> Self {
        Self {
            packet_id,
            topic,
            qos,
        }
    }
}

impl EncodePacket for Subscribe<'_> {
    fn encode(&self, buf: &mut [u8]) -> CodecResult<usize> {
        let remaining_len = 2 + 2 + self.topic.len() + 1;
        let mut w = Writer::new(buf);
        w.put_fixed_header(0x82, remaining_len)?;
        w.put_u16(self.packet_id)?;
        w.put_str(self.topic)?;
        w.put_u8(self.qos as u8)?;
        Ok(w.position())
    }
}

// --- SUBACK Packet ---
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubAck {
    pub packet_id: u16,
    pub return_codes: Vec<u8, MAX_SUBACK_CODES>,
}

impl SubAck {
    /// The return code for the first (and, for this client, only) filter.
    pub fn granted(&self) -> u8 {
        self.return_codes.first().copied().unwrap_or(SUBACK_FAILURE)
    }
}

impl<'a> DecodePacket<'a> for SubAck {
    fn decode(buf: &'a [u8]) -> CodecResult<Self> {
        let mut r = Reader::new(buf);
        let (_, remaining_len) = r.fixed_header()?;
        if remaining_len < 3 {
            return Err(MqttError::Protocol(ProtocolError::MalformedPacket));
        }
        let packet_id = r.u16()?;
        let mut return_codes = Vec::new();
        for code in r.rest() {
            return_codes
                .push(*code)
                .map_err(|_| MqttError::Protocol(ProtocolError::MalformedPacket))?;
        }
        Ok(SubAck {
            packet_id,
            return_codes,
        })
    }
}

// --- UNSUBSCRIBE Packet ---
#[derive(Debug)]
pub struct Unsubscribe<'a> {
    pub packet_id: u16,
    pub topic: &'a str,
}

impl EncodePacket for Unsubscribe<'_> {
    fn encode(&self, buf: &mut [u8]) -> CodecResult<usize> {
        let remaining_len = 2 + 2 + self.topic.len();
        let mut w = Writer::new(buf);
        w.put_fixed_header(0xA2, remaining_len)?;
        w.put_u16(self.packet_id)?;
        w.put_str(self.topic)?;
        Ok(w.position())
    }
}

// --- PINGREQ Packet ---
#[derive(Debug)]
pub struct PingReq;

impl EncodePacket for PingReq {
    fn encode(&self, buf: &mut [u8]) -> CodecResult<usize> {
        let mut w = Writer::new(buf);
        w.put_fixed_header(0xC0, 0)?;
        Ok(w.position())
    }
}

// --- DISCONNECT Packet ---
#[derive(Debug)]
pub struct Disconnect;

impl EncodePacket for Disconnect {
    fn encode(&self, buf: &mut [u8]) -> CodecResult<usize> {
        let mut w = Writer::new(buf);
        w.put_fixed_header(0xE0, 0)?;
        Ok(w.position())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_with_credentials_and_will() {
        let mut connect = Connect::new("dev", 60, true);
        connect.username = Some("u");
        connect.password = Some(b"p");
        connect.will = Some(LastWill {
            topic: "w",
            payload: b"x",
            qos: QoS::AtLeastOnce,
            retain: true,
        });
        let mut buf = [0u8; 64];
        let len = connect.encode(&mut buf).unwrap();
        let expected: &[u8] = &[
            0x10, 27, // fixed header
            0x00, 0x04, b'M', b'Q', b'T', b'T', 4, // protocol
            0xEE, // flags: user, password, will retain, will qos 1, will, clean
            0x00, 60, // keep alive
            0x00, 0x03, b'd', b'e', b'v', // client id
            0x00, 0x01, b'w', 0x00, 0x01, b'x', // will
            0x00, 0x01, b'u', 0x00, 0x01, b'p', // credentials
        ];
        assert_eq!(&buf[..len], expected);
    }

    #[test]
    fn publish_qos1_encodes_packet_id() {
        let publish = Publish {
            topic: "a/b",
            qos: QoS::AtLeastOnce,
            dup: true,
            retain: false,
            packet_id: Some(0x0102),
            payload: b"hi",
        };
        let mut buf = [0u8; 32];
        let len = publish.encode(&mut buf).unwrap();
        assert_eq!(
            &buf[..len],
            &[0x3A, 9, 0x00, 0x03, b'a', b'/', b'b', 0x01, 0x02, b'h', b'i']
        );
        assert_eq!(Publish::decode(&buf[..len]).unwrap(), publish);
    }

    #[test]
    fn publish_larger_than_buffer_overflows() {
        let publish = Publish {
            topic: "t",
            qos: QoS::AtMostOnce,
            dup: false,
            retain: false,
            packet_id: None,
            payload: &[0u8; 40],
        };
        let mut buf = [0u8; 16];
        assert_eq!(publish.encode(&mut buf), Err(MqttError::BufferOverflow));
    }

    #[test]
    fn pubrel_sets_reserved_flags() {
        let mut buf = [0u8; 4];
        let len = Ack::new(PacketType::PubRel, 7).encode(&mut buf).unwrap();
        assert_eq!(&buf[..len], &[0x62, 0x02, 0x00, 0x07]);
        assert_eq!(decode(&buf[..len]).unwrap(), MqttPacket::PubRel(7));
    }

    #[test]
    fn decodes_suback_failure() {
        let buf = [0x90, 0x03, 0x00, 0x05, 0x80];
        match decode(&buf).unwrap() {
            MqttPacket::SubAck(ack) => {
                assert_eq!(ack.packet_id, 5);
                assert_eq!(ack.granted(), SUBACK_FAILURE);
            }
            other => panic!("unexpected packet {other:?}"),
        }
    }

    #[test]
    fn decodes_connack() {
        let buf = [0x20, 0x02, 0x01, 0x05];
        assert_eq!(
            decode(&buf).unwrap(),
            MqttPacket::ConnAck(ConnAck {
                session_present: true,
                return_code: 5
            })
        );
    }

    #[test]
    fn rejects_length_mismatch() {
        let buf = [0x40, 0x03, 0x00, 0x01];
        assert_eq!(
            decode(&buf),
            Err(MqttError::Protocol(ProtocolError::MalformedPacket))
        );
    }

    #[test]
    fn rejects_broker_bound_packet_types() {
        let buf = [0xC0, 0x00];
        assert_eq!(
            decode(&buf),
            Err(MqttError::Protocol(ProtocolError::InvalidPacketType(12)))
        );
    }

    #[test]
    fn subscribe_and_unsubscribe_layout() {
        let mut buf = [0u8; 16];
        let len = Subscribe::new(10, "s/#", QoS::ExactlyOnce)
            .encode(&mut buf)
            .unwrap();
        assert_eq!(
            &buf[..len],
            &[0x82, 8, 0x00, 0x0A, 0x00, 0x03, b's', b'/', b'#', 2]
        );
        let len = Unsubscribe {
            packet_id: 11,
            topic: "s/#",
        }
        .encode(&mut buf)
        .unwrap();
        assert_eq!(&buf[..len], &[0xA2, 7, 0x00, 0x0B, 0x00, 0x03, b's', b'/', b'#']);
    }
}
