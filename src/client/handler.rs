//! Message handler capability.
//!
//! Handlers are object-safe so the subscription table can hold them as
//! `&dyn MessageHandler` without generics or heap allocation. They take `&self`;
//! handlers that keep state use interior mutability (atomics, `Cell`,
//! `blocking_mutex::Mutex`).

use super::message::Message;

/// Returned by a handler that could not process a message.
///
/// The client logs the failure and keeps servicing the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HandlerError;

/// Receives messages published on topics matching a subscription.
///
/// # Example
///
/// ```ignore
/// struct Switch(AtomicBool);
///
/// impl MessageHandler for Switch {
///     fn on_message(&self, _topic: &str, message: &Message<'_>) -> Result<(), HandlerError> {
///         match message.payload.as_bytes() {
///             b"on" => self.0.store(true, Ordering::Relaxed),
///             b"off" => self.0.store(false, Ordering::Relaxed),
///             _ => return Err(HandlerError),
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait MessageHandler {
    fn on_message(&self, topic: &str, message: &Message<'_>) -> Result<(), HandlerError>;
}

impl<F> MessageHandler for F
where
    F: Fn(&str, &Message<'_>) -> Result<(), HandlerError>,
{
    fn on_message(&self, topic: &str, message: &Message<'_>) -> Result<(), HandlerError> {
        self(topic, message)
    }
}

/// A handler that accepts and ignores every message.
pub struct NoopHandler;

impl MessageHandler for NoopHandler {
    fn on_message(&self, _topic: &str, _message: &Message<'_>) -> Result<(), HandlerError> {
        Ok(())
    }
}
