//! # Error Types
//!
//! This module defines the error types used throughout the client, from transport
//! failures to protocol violations, resource exhaustion and concurrency timeouts.
//!
//! Every error also has a stable negative result code (see [`MqttError::code`]) for
//! callers that bridge the client into C-style status reporting.

use core::convert::Infallible;

/// Result type produced by the packet codec, which never touches the transport.
pub type CodecResult<T> = Result<T, MqttError<Infallible>>;

/// The primary error enum for the MQTT client.
///
/// It is generic over the transport error type `T`, allowing it to wrap
/// specific errors from the underlying byte transport (e.g., TCP, UART).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MqttError<T> {
    /// An error occurred in the underlying transport layer.
    Transport(T),
    /// A protocol-level error occurred, indicating a violation of the MQTT specification.
    Protocol(ProtocolError),
    /// The connection was refused by the broker. The enclosed code provides the reason.
    ConnectionRefused(ConnectReasonCode),
    /// The broker answered a SUBSCRIBE with the failure return code (0x80).
    SubscribeRefused,
    /// An acknowledgment did not arrive within the command timeout.
    AckTimeout,
    /// A PINGREQ went unanswered for a whole keepalive interval.
    KeepaliveTimeout,
    /// A packet could not be completely written or read before its deadline.
    Timeout,
    /// The client is not currently connected to the broker.
    NotConnected,
    /// `connect` was called on a session that is already connected.
    AlreadyConnected,
    /// A packet does not fit in the fixed send or receive buffer.
    BufferOverflow,
    /// A fixed-capacity table (subscriptions, pending transactions) is full.
    CapacityExceeded,
    /// Every packet identifier is currently reserved by a pending transaction.
    PacketIdExhausted,
    /// The request was abandoned because the session was torn down.
    Aborted,
    /// The request mailbox stayed full for the whole post timeout.
    MailboxFull,
    /// The request mailbox stayed empty for the whole retrieve timeout.
    MailboxEmpty,
}

impl<T> MqttError<T> {
    /// Converts a codec error into an error for a concrete transport.
    ///
    /// Codec errors are produced without a transport, so the `Transport` variant
    /// is uninhabited and the conversion is total.
    pub fn cast_transport_error(other: MqttError<Infallible>) -> MqttError<T> {
        match other {
            MqttError::Transport(never) => match never {},
            MqttError::Protocol(p) => MqttError::Protocol(p),
            MqttError::ConnectionRefused(c) => MqttError::ConnectionRefused(c),
            MqttError::SubscribeRefused => MqttError::SubscribeRefused,
            MqttError::AckTimeout => MqttError::AckTimeout,
            MqttError::KeepaliveTimeout => MqttError::KeepaliveTimeout,
            MqttError::Timeout => MqttError::Timeout,
            MqttError::NotConnected => MqttError::NotConnected,
            MqttError::AlreadyConnected => MqttError::AlreadyConnected,
            MqttError::BufferOverflow => MqttError::BufferOverflow,
            MqttError::CapacityExceeded => MqttError::CapacityExceeded,
            MqttError::PacketIdExhausted => MqttError::PacketIdExhausted,
            MqttError::Aborted => MqttError::Aborted,
            MqttError::MailboxFull => MqttError::MailboxFull,
            MqttError::MailboxEmpty => MqttError::MailboxEmpty,
        }
    }

    /// The negative result code for this error. Success is `0`.
    pub fn code(&self) -> i32 {
        match self {
            MqttError::Transport(_) => -1,
            MqttError::BufferOverflow => -2,
            MqttError::Protocol(_) => -3,
            MqttError::ConnectionRefused(_) => -4,
            MqttError::SubscribeRefused => -5,
            MqttError::AckTimeout => -6,
            MqttError::KeepaliveTimeout => -7,
            MqttError::Timeout => -8,
            MqttError::NotConnected => -9,
            MqttError::AlreadyConnected => -10,
            MqttError::CapacityExceeded => -11,
            MqttError::PacketIdExhausted => -12,
            MqttError::Aborted => -13,
            MqttError::MailboxFull => -14,
            MqttError::MailboxEmpty => -15,
        }
    }

    /// Whether this error means the connection can no longer be trusted.
    ///
    /// Fatal errors close the session and abort every pending transaction.
    /// Requests rejected before anything is written (a bad filter, a packet
    /// too large to encode) are not.
    pub fn is_fatal(&self) -> bool {
        match self {
            MqttError::Protocol(ProtocolError::InvalidTopic | ProtocolError::PayloadTooLarge) => {
                false
            }
            MqttError::Transport(_)
            | MqttError::Protocol(_)
            | MqttError::AckTimeout
            | MqttError::KeepaliveTimeout
            | MqttError::Timeout => true,
            _ => false,
        }
    }
}

/// Represents the return codes of a `CONNACK` packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectReasonCode {
    /// The connection was accepted.
    Success,
    /// The broker does not support the requested MQTT protocol version.
    UnacceptableProtocolVersion,
    /// The client identifier is not valid.
    IdentifierRejected,
    /// The broker is unavailable.
    ServerUnavailable,
    /// The username or password is not valid.
    BadUserNameOrPassword,
    /// The client is not authorized to connect.
    NotAuthorized,
    /// A return code outside the MQTT 3.1.1 range.
    Other(u8),
}

impl From<u8> for ConnectReasonCode {
    fn from(val: u8) -> Self {
        match val {
            0 => Self::Success,
            1 => Self::UnacceptableProtocolVersion,
            2 => Self::IdentifierRejected,
            3 => Self::ServerUnavailable,
            4 => Self::BadUserNameOrPassword,
            5 => Self::NotAuthorized,
            _ => Self::Other(val),
        }
    }
}

impl From<ConnectReasonCode> for u8 {
    fn from(code: ConnectReasonCode) -> u8 {
        match code {
            ConnectReasonCode::Success => 0,
            ConnectReasonCode::UnacceptableProtocolVersion => 1,
            ConnectReasonCode::IdentifierRejected => 2,
            ConnectReasonCode::ServerUnavailable => 3,
            ConnectReasonCode::BadUserNameOrPassword => 4,
            ConnectReasonCode::NotAuthorized => 5,
            ConnectReasonCode::Other(val) => val,
        }
    }
}

/// Enumerates specific MQTT protocol errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolError {
    /// An invalid or unexpected packet type was received.
    InvalidPacketType(u8),
    /// The server sent an invalid or unexpected response.
    InvalidResponse,
    /// The connection was closed by the broker.
    ConnectionClosed,
    /// A packet was received that was not correctly formed.
    MalformedPacket,
    /// A string or payload exceeds what its length prefix can describe.
    PayloadTooLarge,
    /// A string was not valid UTF-8.
    InvalidUtf8String,
    /// A topic filter has misplaced wildcards or is empty.
    InvalidTopic,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_negative_and_distinct() {
        let errors: [MqttError<()>; 15] = [
            MqttError::Transport(()),
            MqttError::Protocol(ProtocolError::MalformedPacket),
            MqttError::ConnectionRefused(ConnectReasonCode::NotAuthorized),
            MqttError::SubscribeRefused,
            MqttError::AckTimeout,
            MqttError::KeepaliveTimeout,
            MqttError::Timeout,
            MqttError::NotConnected,
            MqttError::AlreadyConnected,
            MqttError::BufferOverflow,
            MqttError::CapacityExceeded,
            MqttError::PacketIdExhausted,
            MqttError::Aborted,
            MqttError::MailboxFull,
            MqttError::MailboxEmpty,
        ];
        for (i, a) in errors.iter().enumerate() {
            assert!(a.code() < 0);
            for b in &errors[i + 1..] {
                assert_ne!(a.code(), b.code());
            }
        }
    }

    #[test]
    fn local_rejections_are_not_fatal() {
        let invalid: MqttError<()> = MqttError::Protocol(ProtocolError::InvalidTopic);
        let too_large: MqttError<()> = MqttError::Protocol(ProtocolError::PayloadTooLarge);
        assert!(!invalid.is_fatal());
        assert!(!too_large.is_fatal());
        assert!(!MqttError::<()>::BufferOverflow.is_fatal());
        assert!(MqttError::<()>::Protocol(ProtocolError::MalformedPacket).is_fatal());
        assert!(MqttError::Transport(()).is_fatal());
        assert!(MqttError::<()>::AckTimeout.is_fatal());
    }

    #[test]
    fn codec_errors_cast_without_loss() {
        let err: MqttError<u8> = MqttError::cast_transport_error(MqttError::BufferOverflow);
        assert_eq!(err, MqttError::BufferOverflow);
        let err: MqttError<u8> = MqttError::cast_transport_error(MqttError::Protocol(
            ProtocolError::InvalidUtf8String,
        ));
        assert_eq!(err, MqttError::Protocol(ProtocolError::InvalidUtf8String));
    }

    #[test]
    fn connect_codes_round_trip_through_u8() {
        for raw in 0u8..=7 {
            assert_eq!(u8::from(ConnectReasonCode::from(raw)), raw);
        }
        assert_eq!(ConnectReasonCode::from(9), ConnectReasonCode::Other(9));
    }
}
