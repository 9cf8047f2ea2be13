//! # MQTT Transport Abstraction
//!
//! This module defines the `MqttTransport` trait, which abstracts the underlying
//! byte stream (TCP, UART, etc.), allowing the session engine to be hardware and
//! network-stack agnostic.
//!
//! Every call carries its own timeout. `recv` returning `Ok(0)` means nothing
//! arrived in time; a closed stream is an error. `send` may write only part of the
//! buffer, the client keeps writing until the packet is out or its deadline passes.

use embassy_net::tcp::TcpSocket;
use embassy_time::{Duration, with_timeout};
use embedded_io_async::{Read, Write};

/// A trait representing a reliable, ordered byte transport for MQTT packets.
#[allow(async_fn_in_trait)]
pub trait MqttTransport {
    /// The error type returned by the transport.
    type Error: core::fmt::Debug + Clone + Send;

    /// Writes some prefix of `buf`, returning how many bytes went out.
    async fn send(&mut self, buf: &[u8], timeout: Duration) -> Result<usize, Self::Error>;

    /// Reads up to `buf.len()` bytes, returning `Ok(0)` if none arrived within `timeout`.
    async fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, Self::Error>;
}

/// Errors raised by [`IoTransport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IoError<E> {
    /// The underlying stream failed.
    Io(E),
    /// The peer closed the stream.
    ConnectionClosed,
}

/// Transport over any `embedded-io-async` stream (UART, TCP socket, ...).
pub struct IoTransport<S> {
    io: S,
}

impl<S> IoTransport<S> {
    pub fn new(io: S) -> Self {
        Self { io }
    }

    /// Gives the stream back, e.g. to close the socket after disconnecting.
    pub fn into_inner(self) -> S {
        self.io
    }
}

impl<S> MqttTransport for IoTransport<S>
where
    S: Read + Write,
    S::Error: Clone + Send,
{
    type Error = IoError<S::Error>;

    async fn send(&mut self, buf: &[u8], timeout: Duration) -> Result<usize, Self::Error> {
        match with_timeout(timeout, self.io.write(buf)).await {
            Ok(Ok(0)) => Err(IoError::ConnectionClosed),
            Ok(Ok(n)) => {
                trace!("transport: sent {} bytes", n);
                // Flush so a completed packet actually leaves the device.
                if n == buf.len() {
                    with_timeout(timeout, self.io.flush())
                        .await
                        .map_or(Ok(()), |r| r.map_err(IoError::Io))?;
                }
                Ok(n)
            }
            Ok(Err(e)) => Err(IoError::Io(e)),
            Err(_) => Ok(0),
        }
    }

    async fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, Self::Error> {
        match with_timeout(timeout, self.io.read(buf)).await {
            // If the peer closes the connection, read returns 0.
            Ok(Ok(0)) if !buf.is_empty() => {
                debug!("transport: connection closed by peer");
                Err(IoError::ConnectionClosed)
            }
            Ok(Ok(n)) => Ok(n),
            Ok(Err(e)) => Err(IoError::Io(e)),
            Err(_) => Ok(0),
        }
    }
}

/// TCP transport implementation using `embassy-net`.
pub type TcpTransport<'a> = IoTransport<TcpSocket<'a>>;
