//! MQTT Runtime Module
//!
//! Runs a client session in the background so several tasks can share it.
//!
//! # Overview
//!
//! [`MqttRuntime::run`] is a long-running future that owns the read side of the
//! connection: it services keepalive, dispatches inbound messages to handlers and
//! matches acknowledgments to the requests waiting for them. Spawn it on your
//! executor once the runtime has been created.
//!
//! Application tasks talk to the loop through the [`Mailbox`]:
//!
//! - `publish`, `subscribe` and `unsubscribe` post a request carrying a
//!   completion [`Ticket`] and wait for the loop to complete it;
//! - `async_subscribe` and `async_unsubscribe` post a request and return at once.
//!
//! Sent QoS 1/2 publishes and (un)subscribes are tracked in a [`PendingTable`]
//! until acknowledged. An overdue acknowledgment or a dead connection closes the
//! session and fails every pending request with [`MqttError::Aborted`].
//!
//! [`MqttError::Aborted`]: crate::error::MqttError::Aborted

pub(crate) mod completion;
pub(crate) mod event_loop;
pub(crate) mod mailbox;
pub(crate) mod pending;

pub use completion::{Claim, CompletionPool, Ticket};
pub use event_loop::{MqttRuntime, RuntimeConfig};
pub use mailbox::{MAILBOX_CAPACITY, Mailbox, Request, RequestKind, Response};
pub use pending::{Awaiting, MAX_PENDING_TRANSACTIONS, Pending, PendingTable};
