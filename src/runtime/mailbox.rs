//! Request mailbox between application tasks and the runtime.
//!
//! This is the only path from the application to the session in threaded mode:
//! requests are values handed to the background loop, so nothing but the loop
//! ever writes into the session's buffers.

use core::convert::Infallible;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::{Duration, with_timeout};

use super::completion::Ticket;
use crate::client::{Message, MessageHandler, SubAckData};
use crate::error::MqttError;
use crate::packet::QoS;

/// Default number of queued requests.
pub const MAILBOX_CAPACITY: usize = 10;

/// The operation a request asks the runtime to perform.
#[derive(Clone, Copy)]
pub enum RequestKind<'h> {
    Publish {
        topic: &'h str,
        message: Message<'h>,
    },
    Subscribe {
        filter: &'h str,
        qos: QoS,
        handler: &'h dyn MessageHandler,
    },
    Unsubscribe {
        filter: &'h str,
    },
}

impl RequestKind<'_> {
    /// Whether the request waits for an acknowledgment from the broker.
    pub fn expects_ack(&self) -> bool {
        match self {
            RequestKind::Publish { message, .. } => message.qos != QoS::AtMostOnce,
            RequestKind::Subscribe { .. } | RequestKind::Unsubscribe { .. } => true,
        }
    }
}

impl core::fmt::Debug for RequestKind<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            RequestKind::Publish { topic, message } => f
                .debug_struct("Publish")
                .field("topic", topic)
                .field("qos", &message.qos)
                .finish(),
            RequestKind::Subscribe { filter, qos, .. } => f
                .debug_struct("Subscribe")
                .field("filter", filter)
                .field("qos", qos)
                .finish(),
            RequestKind::Unsubscribe { filter } => f
                .debug_struct("Unsubscribe")
                .field("filter", filter)
                .finish(),
        }
    }
}

/// A queued request, plus the completion slot of the caller waiting on it.
///
/// Requests without a ticket are fire-and-forget.
#[derive(Debug, Clone, Copy)]
pub struct Request<'h> {
    pub kind: RequestKind<'h>,
    pub(crate) ticket: Option<Ticket>,
}

impl<'h> Request<'h> {
    pub fn new(kind: RequestKind<'h>) -> Self {
        Self { kind, ticket: None }
    }

    pub(crate) fn with_ticket(kind: RequestKind<'h>, ticket: Ticket) -> Self {
        Self {
            kind,
            ticket: Some(ticket),
        }
    }
}

/// What a completed request reports back to its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    Published,
    Subscribed(SubAckData),
    Unsubscribed,
}

/// A bounded FIFO of requests.
pub struct Mailbox<'h, const N: usize> {
    channel: Channel<CriticalSectionRawMutex, Request<'h>, N>,
}

impl<const N: usize> Default for Mailbox<'_, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'h, const N: usize> Mailbox<'h, N> {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
        }
    }

    /// Queues `request`, waiting up to `timeout` for room.
    pub async fn post(
        &self,
        request: Request<'h>,
        timeout: Duration,
    ) -> Result<(), MqttError<Infallible>> {
        with_timeout(timeout, self.channel.send(request))
            .await
            .map_err(|_| {
                warn!("mailbox: full, request dropped");
                MqttError::MailboxFull
            })
    }

    pub fn try_post(&self, request: Request<'h>) -> Result<(), MqttError<Infallible>> {
        self.channel
            .try_send(request)
            .map_err(|_| MqttError::MailboxFull)
    }

    /// Takes the oldest request, waiting up to `timeout` for one to arrive.
    pub async fn retrieve(&self, timeout: Duration) -> Result<Request<'h>, MqttError<Infallible>> {
        with_timeout(timeout, self.channel.receive())
            .await
            .map_err(|_| MqttError::MailboxEmpty)
    }

    /// Takes the oldest request, waiting for as long as it takes.
    pub async fn receive(&self) -> Request<'h> {
        self.channel.receive().await
    }

    pub fn try_retrieve(&self) -> Option<Request<'h>> {
        self.channel.try_receive().ok()
    }

    pub fn len(&self) -> usize {
        self.channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.channel.is_full()
    }
}
