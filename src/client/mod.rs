//! # MQTT Session State Machine
//!
//! [`MqttClient`] owns the transport, both packet buffers and the subscription
//! table, and drives a single MQTT 3.1.1 session through
//! `Disconnected -> Connecting -> Connected -> Disconnected`.
//!
//! There is exactly one reader: every inbound packet is read by a service
//! cycle, either inside [`MqttClient::yield_for`] or inside a call that waits
//! for an acknowledgment. Inbound PUBLISH packets met along the way are handed to
//! the matching [`MessageHandler`] before the wait continues.

pub(crate) mod handler;
pub(crate) mod message;
pub(crate) mod options;
pub(crate) mod packet_id;
pub(crate) mod subscriptions;

pub use handler::{HandlerError, MessageHandler, NoopHandler};
pub use message::{Message, Payload, is_raw_payload};
pub use options::{ClientConfig, LastWill, MqttOptions};
pub use packet_id::{MAX_PACKET_ID, PacketIdAllocator};
pub use subscriptions::{
    MAX_MESSAGE_HANDLERS, MAX_TOPIC_LEN, SubscriptionTable, is_valid_filter, topic_matches,
};

use embassy_time::{Duration, Instant};

use crate::error::{ConnectReasonCode, MqttError, ProtocolError};
use crate::packet::{
    Ack, ConnAck, Disconnect, EncodePacket, MqttPacket, PacketType, PingReq, Publish, QoS,
    SUBACK_FAILURE, Subscribe, Unsubscribe, decode,
};
use crate::timer::Countdown;
use crate::transport::MqttTransport;
use crate::util::read_variable_byte_integer;

/// Default size of each packet buffer.
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Lifecycle of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

/// What the broker answered to CONNECT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnAckData {
    pub return_code: ConnectReasonCode,
    pub session_present: bool,
}

/// What the broker granted for a SUBSCRIBE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SubAckData {
    pub granted_qos: QoS,
}

impl SubAckData {
    /// Interprets a SUBACK return code.
    pub(crate) fn from_code<E>(code: u8) -> Result<Self, MqttError<E>> {
        if code == SUBACK_FAILURE {
            return Err(MqttError::SubscribeRefused);
        }
        let granted_qos = QoS::try_from(code).map_err(MqttError::Protocol)?;
        Ok(Self { granted_qos })
    }
}

/// The outcome of one service cycle, as seen by whoever is waiting on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Inbound {
    /// Nothing arrived within the poll interval.
    Nothing,
    ConnAck(ConnAck),
    /// A message was delivered to the subscription table.
    Publish,
    PubAck(u16),
    /// PUBREL has already been sent in reply.
    PubRec(u16),
    PubComp(u16),
    SubAck { packet_id: u16, return_code: u8 },
    UnsubAck(u16),
    PingResp,
    /// Handled internally (e.g. PUBREL) or dropped.
    Other,
}

/// The acknowledgment a synchronous call is blocked on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    ConnAck,
    PubAck(u16),
    PubRec(u16),
    PubComp(u16),
    SubAck(u16),
    UnsubAck(u16),
}

impl Expect {
    fn is_met_by(self, event: &Inbound) -> bool {
        match (self, *event) {
            (Expect::ConnAck, Inbound::ConnAck(_)) => true,
            (Expect::PubAck(want), Inbound::PubAck(id))
            | (Expect::PubRec(want), Inbound::PubRec(id))
            | (Expect::PubComp(want), Inbound::PubComp(id))
            | (Expect::SubAck(want), Inbound::SubAck { packet_id: id, .. })
            | (Expect::UnsubAck(want), Inbound::UnsubAck(id)) => want == id,
            _ => false,
        }
    }
}

/// An MQTT client session over a caller-supplied transport.
///
/// `MAX_HANDLERS` bounds the subscription table, `BUF_SIZE` is the size of both
/// the send and the receive buffer. Outbound packets that do not fit fail with
/// [`MqttError::BufferOverflow`]; oversized inbound packets are drained and dropped.
///
/// ```ignore
/// let mut client = MqttClient::<_, 5, 512>::new(transport, ClientConfig::default());
/// client.connect(&MqttOptions::new("sensor-42")).await?;
/// client.subscribe("sensor-42/cmd/#", QoS::AtLeastOnce, &commands).await?;
/// client.publish("sensor-42/temp", &Message::new(QoS::AtMostOnce, "21.5")).await?;
/// loop {
///     client.yield_for(Duration::from_secs(1)).await?;
/// }
/// ```
pub struct MqttClient<
    'h,
    T,
    const MAX_HANDLERS: usize = { MAX_MESSAGE_HANDLERS },
    const BUF_SIZE: usize = { DEFAULT_BUFFER_SIZE },
> where
    T: MqttTransport,
{
    transport: T,
    config: ClientConfig,
    state: SessionState,
    clean_session: bool,
    keep_alive: Duration,
    ping_outstanding: bool,
    ping_sent: Instant,
    last_sent: Instant,
    last_received: Instant,
    packet_ids: PacketIdAllocator,
    subscriptions: SubscriptionTable<'h, MAX_HANDLERS>,
    send_buf: [u8; BUF_SIZE],
    recv_buf: [u8; BUF_SIZE],
}

impl<'h, T, const MAX_HANDLERS: usize, const BUF_SIZE: usize> MqttClient<'h, T, MAX_HANDLERS, BUF_SIZE>
where
    T: MqttTransport,
{
    /// Creates a disconnected client that owns `transport`.
    pub fn new(transport: T, config: ClientConfig) -> Self {
        let epoch = Instant::from_ticks(0);
        Self {
            transport,
            config,
            state: SessionState::Disconnected,
            clean_session: true,
            keep_alive: Duration::from_ticks(0),
            ping_outstanding: false,
            ping_sent: epoch,
            last_sent: epoch,
            last_received: epoch,
            packet_ids: PacketIdAllocator::new(),
            subscriptions: SubscriptionTable::new(),
            send_buf: [0; BUF_SIZE],
            recv_buf: [0; BUF_SIZE],
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Whether the last CONNECT asked for a clean session.
    pub fn clean_session(&self) -> bool {
        self.clean_session
    }

    /// Whether a PINGREQ is waiting for its PINGRESP.
    pub fn ping_outstanding(&self) -> bool {
        self.ping_outstanding
    }

    pub fn subscriptions(&self) -> &SubscriptionTable<'h, MAX_HANDLERS> {
        &self.subscriptions
    }

    /// Gives the transport back, e.g. to close the socket.
    pub fn into_transport(self) -> T {
        self.transport
    }

    // --- Public operations ---

    /// Opens the session, see [`connect_with_results`](Self::connect_with_results).
    pub async fn connect(&mut self, options: &MqttOptions<'_>) -> Result<(), MqttError<T::Error>> {
        self.connect_with_results(options).await.map(|_| ())
    }

    /// Sends CONNECT and waits for CONNACK.
    ///
    /// A refusal fails with [`MqttError::ConnectionRefused`] and leaves the
    /// session disconnected.
    pub async fn connect_with_results(
        &mut self,
        options: &MqttOptions<'_>,
    ) -> Result<ConnAckData, MqttError<T::Error>> {
        if self.is_connected() {
            return Err(MqttError::AlreadyConnected);
        }
        info!("mqtt: connecting, keepalive {}s", options.keep_alive_secs);
        self.state = SessionState::Connecting;
        self.ping_outstanding = false;

        let result = self.handshake(options).await;
        match &result {
            Ok(ack) => {
                let now = Instant::now();
                self.last_sent = now;
                self.last_received = now;
                self.ping_outstanding = false;
                self.keep_alive = options.keep_alive();
                self.clean_session = options.clean_session;
                self.state = SessionState::Connected;
                info!("mqtt: connected, session present: {}", ack.session_present);
            }
            Err(err) => {
                warn!("mqtt: connect failed, error {}", err.code());
                self.state = SessionState::Disconnected;
            }
        }
        result
    }

    async fn handshake(
        &mut self,
        options: &MqttOptions<'_>,
    ) -> Result<ConnAckData, MqttError<T::Error>> {
        self.send_packet(&options.to_connect()).await?;
        let Inbound::ConnAck(ack) = self.wait_for(Expect::ConnAck).await? else {
            return Err(MqttError::Protocol(ProtocolError::InvalidResponse));
        };
        let return_code = ConnectReasonCode::from(ack.return_code);
        if return_code != ConnectReasonCode::Success {
            return Err(MqttError::ConnectionRefused(return_code));
        }
        Ok(ConnAckData {
            return_code,
            session_present: ack.session_present,
        })
    }

    /// Publishes `message` on `topic` and waits for its QoS flow to complete.
    ///
    /// QoS 0 returns once the packet is written. QoS 1 waits for PUBACK. QoS 2
    /// waits for PUBREC, answers with PUBREL and waits for PUBCOMP, each stage
    /// bounded by the command timeout. Nothing is retransmitted here; re-publish
    /// with [`Message::with_dup`] after reconnecting if delivery matters.
    pub async fn publish(
        &mut self,
        topic: &str,
        message: &Message<'_>,
    ) -> Result<(), MqttError<T::Error>> {
        self.ensure_connected()?;
        let result = self.publish_flow(topic, message).await;
        self.guard(result)
    }

    async fn publish_flow(
        &mut self,
        topic: &str,
        message: &Message<'_>,
    ) -> Result<(), MqttError<T::Error>> {
        let packet_id = self.start_publish(topic, message, |_| false).await?;
        match message.qos {
            QoS::AtMostOnce => {}
            QoS::AtLeastOnce => {
                self.wait_for(Expect::PubAck(packet_id)).await?;
            }
            QoS::ExactlyOnce => {
                self.wait_for(Expect::PubRec(packet_id)).await?;
                self.wait_for(Expect::PubComp(packet_id)).await?;
            }
        }
        Ok(())
    }

    /// Subscribes `handler` to `filter`, see [`subscribe_with_results`](Self::subscribe_with_results).
    pub async fn subscribe(
        &mut self,
        filter: &str,
        qos: QoS,
        handler: &'h dyn MessageHandler,
    ) -> Result<(), MqttError<T::Error>> {
        self.subscribe_with_results(filter, qos, handler)
            .await
            .map(|_| ())
    }

    /// Registers `handler` for `filter`, sends SUBSCRIBE and waits for SUBACK.
    ///
    /// The handler is registered before SUBSCRIBE goes out so a message that
    /// overtakes the SUBACK is still routed. If the subscription fails for any
    /// reason, including a refusal, the table is restored to what it was.
    pub async fn subscribe_with_results(
        &mut self,
        filter: &str,
        qos: QoS,
        handler: &'h dyn MessageHandler,
    ) -> Result<SubAckData, MqttError<T::Error>> {
        self.ensure_connected()?;
        let previous = self.register_handler(filter, handler)?;
        let result = self.subscribe_flow(filter, qos).await;
        if result.is_err() {
            debug!("mqtt: rolling back handler for refused subscription");
            self.subscriptions.restore(filter, previous);
        }
        self.guard(result)
    }

    async fn subscribe_flow(
        &mut self,
        filter: &str,
        qos: QoS,
    ) -> Result<SubAckData, MqttError<T::Error>> {
        let packet_id = self.start_subscribe(filter, qos, |_| false).await?;
        match self.wait_for(Expect::SubAck(packet_id)).await? {
            Inbound::SubAck { return_code, .. } => SubAckData::from_code(return_code),
            _ => Err(MqttError::Protocol(ProtocolError::InvalidResponse)),
        }
    }

    /// Sends UNSUBSCRIBE and removes the handler once UNSUBACK arrives.
    pub async fn unsubscribe(&mut self, filter: &str) -> Result<(), MqttError<T::Error>> {
        self.ensure_connected()?;
        let result = self.unsubscribe_flow(filter).await;
        if result.is_ok() {
            self.subscriptions.remove(filter);
        }
        self.guard(result)
    }

    async fn unsubscribe_flow(&mut self, filter: &str) -> Result<(), MqttError<T::Error>> {
        let packet_id = self.start_unsubscribe(filter, |_| false).await?;
        self.wait_for(Expect::UnsubAck(packet_id)).await?;
        Ok(())
    }

    /// Sets or (with `None`) removes the handler for `filter` without talking to the broker.
    pub fn set_message_handler(
        &mut self,
        filter: &str,
        handler: Option<&'h dyn MessageHandler>,
    ) -> Result<(), MqttError<T::Error>> {
        self.subscriptions
            .set(filter, handler)
            .map(|_| ())
            .map_err(MqttError::cast_transport_error)
    }

    /// Sets the handler for messages that match no subscription.
    pub fn set_default_message_handler(&mut self, handler: Option<&'h dyn MessageHandler>) {
        self.subscriptions.set_default(handler);
    }

    /// Sends DISCONNECT and closes the session.
    ///
    /// The session is closed even if DISCONNECT could not be written; that write
    /// error is still returned. Subscriptions are kept for the next connect.
    pub async fn disconnect(&mut self) -> Result<(), MqttError<T::Error>> {
        self.ensure_connected()?;
        let result = self.send_packet(&Disconnect).await;
        self.close_session();
        result
    }

    /// Services the connection for `duration`.
    ///
    /// Reads and dispatches inbound packets and sends keepalive pings. At least
    /// one cycle runs even for a zero duration. Any fatal error ends the call and
    /// closes the session.
    pub async fn yield_for(&mut self, duration: Duration) -> Result<(), MqttError<T::Error>> {
        self.ensure_connected()?;
        let timer = Countdown::new(duration);
        loop {
            let wait = timer.remaining().min(self.config.poll_interval);
            let result = self.cycle(wait).await;
            self.guard(result)?;
            if timer.is_expired() {
                return Ok(());
            }
        }
    }

    // --- Building blocks shared with the runtime ---

    pub(crate) fn ensure_connected(&self) -> Result<(), MqttError<T::Error>> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(MqttError::NotConnected)
        }
    }

    /// Closes the session if `result` carries a fatal error.
    pub(crate) fn guard<R>(
        &mut self,
        result: Result<R, MqttError<T::Error>>,
    ) -> Result<R, MqttError<T::Error>> {
        if let Err(err) = &result
            && err.is_fatal()
            && self.state != SessionState::Disconnected
        {
            warn!("mqtt: closing session, error {}", err.code());
            self.close_session();
        }
        result
    }

    pub(crate) fn close_session(&mut self) {
        if self.state != SessionState::Disconnected {
            info!("mqtt: session closed");
        }
        self.state = SessionState::Disconnected;
        self.ping_outstanding = false;
    }

    pub(crate) fn register_handler(
        &mut self,
        filter: &str,
        handler: &'h dyn MessageHandler,
    ) -> Result<Option<&'h dyn MessageHandler>, MqttError<T::Error>> {
        self.subscriptions
            .insert(filter, handler)
            .map_err(MqttError::cast_transport_error)
    }

    pub(crate) fn restore_handler(&mut self, filter: &str, previous: Option<&'h dyn MessageHandler>) {
        self.subscriptions.restore(filter, previous);
    }

    pub(crate) fn remove_handler(&mut self, filter: &str) {
        self.subscriptions.remove(filter);
    }

    fn allocate_id(&mut self, in_use: impl Fn(u16) -> bool) -> Result<u16, MqttError<T::Error>> {
        self.packet_ids
            .allocate(in_use)
            .ok_or(MqttError::PacketIdExhausted)
    }

    /// Sends PUBLISH, returning its packet identifier (`0` for QoS 0).
    pub(crate) async fn start_publish(
        &mut self,
        topic: &str,
        message: &Message<'_>,
        in_use: impl Fn(u16) -> bool,
    ) -> Result<u16, MqttError<T::Error>> {
        let packet_id = match message.qos {
            QoS::AtMostOnce => None,
            _ => Some(self.allocate_id(in_use)?),
        };
        let packet = Publish {
            topic,
            qos: message.qos,
            dup: message.dup,
            retain: message.retained,
            packet_id,
            payload: message.payload.as_bytes(),
        };
        self.send_packet(&packet).await?;
        trace!("mqtt: sent PUBLISH qos {}", message.qos as u8);
        Ok(packet_id.unwrap_or(0))
    }

    pub(crate) async fn start_subscribe(
        &mut self,
        filter: &str,
        qos: QoS,
        in_use: impl Fn(u16) -> bool,
    ) -> Result<u16, MqttError<T::Error>> {
        let packet_id = self.allocate_id(in_use)?;
        self.send_packet(&Subscribe::new(packet_id, filter, qos))
            .await?;
        Ok(packet_id)
    }

    pub(crate) async fn start_unsubscribe(
        &mut self,
        filter: &str,
        in_use: impl Fn(u16) -> bool,
    ) -> Result<u16, MqttError<T::Error>> {
        let packet_id = self.allocate_id(in_use)?;
        self.send_packet(&Unsubscribe {
            packet_id,
            topic: filter,
        })
        .await?;
        Ok(packet_id)
    }

    /// One service step: read at most one packet (waiting up to `wait`), handle
    /// it, then run the keepalive check.
    pub(crate) async fn cycle(&mut self, wait: Duration) -> Result<Inbound, MqttError<T::Error>> {
        let event = match self.read_packet(wait).await? {
            Some(len) => self.handle_packet(len).await?,
            None => Inbound::Nothing,
        };
        if self.is_connected() {
            self.keepalive().await?;
        }
        Ok(event)
    }

    /// Runs cycles until `expect` is met or the command timeout expires.
    async fn wait_for(&mut self, expect: Expect) -> Result<Inbound, MqttError<T::Error>> {
        let timer = Countdown::new(self.config.command_timeout);
        loop {
            if timer.is_expired() {
                warn!("mqtt: acknowledgment timed out");
                return Err(MqttError::AckTimeout);
            }
            let wait = timer.remaining().min(self.config.poll_interval);
            let event = self.cycle(wait).await?;
            if expect.is_met_by(&event) {
                return Ok(event);
            }
        }
    }

    async fn keepalive(&mut self) -> Result<(), MqttError<T::Error>> {
        if self.keep_alive.as_ticks() == 0 {
            return Ok(());
        }
        if self.ping_outstanding {
            if self.ping_sent.elapsed() >= self.keep_alive {
                warn!("mqtt: no PINGRESP within keepalive interval");
                return Err(MqttError::KeepaliveTimeout);
            }
            return Ok(());
        }
        if self.last_sent.elapsed() >= self.keep_alive
            || self.last_received.elapsed() >= self.keep_alive
        {
            self.send_packet(&PingReq).await?;
            self.ping_outstanding = true;
            self.ping_sent = Instant::now();
            debug!("mqtt: sent PINGREQ");
        }
        Ok(())
    }

    // --- Packet I/O ---

    async fn send_packet(&mut self, packet: &impl EncodePacket) -> Result<(), MqttError<T::Error>> {
        let len = packet
            .encode(&mut self.send_buf)
            .map_err(MqttError::cast_transport_error)?;
        let timer = Countdown::new(self.config.command_timeout);
        write_all(&mut self.transport, &self.send_buf[..len], &timer).await?;
        self.last_sent = Instant::now();
        Ok(())
    }

    /// Reads one whole packet into the receive buffer, returning its length.
    ///
    /// Only the first byte waits up to `wait`; once a packet has started, the
    /// rest of it must arrive within the command timeout.
    async fn read_packet(&mut self, wait: Duration) -> Result<Option<usize>, MqttError<T::Error>> {
        let n = self
            .transport
            .recv(&mut self.recv_buf[..1], wait)
            .await
            .map_err(MqttError::Transport)?;
        if n == 0 {
            return Ok(None);
        }

        let timer = Countdown::new(self.config.command_timeout);
        let mut header_len = 1;
        loop {
            if header_len > 4 {
                return Err(MqttError::Protocol(ProtocolError::MalformedPacket));
            }
            read_exact(
                &mut self.transport,
                &mut self.recv_buf[header_len..header_len + 1],
                &timer,
            )
            .await?;
            header_len += 1;
            if self.recv_buf[header_len - 1] & 0x80 == 0 {
                break;
            }
        }
        let (remaining_len, _) = read_variable_byte_integer(&self.recv_buf[1..header_len])
            .map_err(MqttError::cast_transport_error)?;
        let total = header_len + remaining_len;

        if total > BUF_SIZE {
            warn!("mqtt: dropping {} byte packet, buffer is {}", total, BUF_SIZE);
            let mut left = remaining_len;
            while left > 0 {
                let chunk = left.min(BUF_SIZE);
                read_exact(&mut self.transport, &mut self.recv_buf[..chunk], &timer).await?;
                left -= chunk;
            }
            self.last_received = Instant::now();
            return Ok(None);
        }

        read_exact(
            &mut self.transport,
            &mut self.recv_buf[header_len..total],
            &timer,
        )
        .await?;
        self.last_received = Instant::now();
        Ok(Some(total))
    }

    /// Decodes the packet in the receive buffer, dispatches it and sends the
    /// protocol reply it calls for.
    async fn handle_packet(&mut self, len: usize) -> Result<Inbound, MqttError<T::Error>> {
        let (event, reply) = {
            let packet = decode(&self.recv_buf[..len]).map_err(MqttError::cast_transport_error)?;
            match packet {
                MqttPacket::ConnAck(ack) => (Inbound::ConnAck(ack), None),
                MqttPacket::Publish(publish) => {
                    self.deliver(&publish);
                    let reply = match (publish.qos, publish.packet_id) {
                        (QoS::AtLeastOnce, Some(id)) => Some(Ack::new(PacketType::PubAck, id)),
                        (QoS::ExactlyOnce, Some(id)) => Some(Ack::new(PacketType::PubRec, id)),
                        _ => None,
                    };
                    (Inbound::Publish, reply)
                }
                MqttPacket::PubAck(id) => (Inbound::PubAck(id), None),
                MqttPacket::PubRec(id) => {
                    (Inbound::PubRec(id), Some(Ack::new(PacketType::PubRel, id)))
                }
                MqttPacket::PubRel(id) => {
                    (Inbound::Other, Some(Ack::new(PacketType::PubComp, id)))
                }
                MqttPacket::PubComp(id) => (Inbound::PubComp(id), None),
                MqttPacket::SubAck(ack) => (
                    Inbound::SubAck {
                        packet_id: ack.packet_id,
                        return_code: ack.granted(),
                    },
                    None,
                ),
                MqttPacket::UnsubAck(id) => (Inbound::UnsubAck(id), None),
                MqttPacket::PingResp => {
                    self.ping_outstanding = false;
                    trace!("mqtt: PINGRESP");
                    (Inbound::PingResp, None)
                }
            }
        };
        if let Some(ack) = reply {
            self.send_packet(&ack).await?;
        }
        Ok(event)
    }

    /// Hands an inbound message to its handler. Handler failures are logged only.
    fn deliver(&self, publish: &Publish<'_>) {
        let Some(handler) = self.subscriptions.find(publish.topic) else {
            debug!("mqtt: no handler for {}", publish.topic);
            return;
        };
        let message = Message {
            qos: publish.qos,
            retained: publish.retain,
            dup: publish.dup,
            packet_id: publish.packet_id.unwrap_or(0),
            payload: Payload::classify(publish.payload),
        };
        if handler.on_message(publish.topic, &message).is_err() {
            warn!("mqtt: handler failed for {}", publish.topic);
        }
    }
}

/// Writes all of `buf`, tolerating partial writes, before `timer` expires.
async fn write_all<T: MqttTransport>(
    transport: &mut T,
    buf: &[u8],
    timer: &Countdown,
) -> Result<(), MqttError<T::Error>> {
    let mut sent = 0;
    while sent < buf.len() {
        if timer.is_expired() {
            return Err(MqttError::Timeout);
        }
        sent += transport
            .send(&buf[sent..], timer.remaining())
            .await
            .map_err(MqttError::Transport)?;
    }
    Ok(())
}

/// Fills all of `buf` before `timer` expires.
async fn read_exact<T: MqttTransport>(
    transport: &mut T,
    buf: &mut [u8],
    timer: &Countdown,
) -> Result<(), MqttError<T::Error>> {
    let mut filled = 0;
    while filled < buf.len() {
        if timer.is_expired() {
            return Err(MqttError::Timeout);
        }
        filled += transport
            .recv(&mut buf[filled..], timer.remaining())
            .await
            .map_err(MqttError::Transport)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expectations_match_on_packet_id() {
        assert!(Expect::PubAck(3).is_met_by(&Inbound::PubAck(3)));
        assert!(!Expect::PubAck(3).is_met_by(&Inbound::PubAck(4)));
        assert!(!Expect::PubAck(3).is_met_by(&Inbound::PubComp(3)));
        assert!(Expect::SubAck(9).is_met_by(&Inbound::SubAck {
            packet_id: 9,
            return_code: 1
        }));
        assert!(!Expect::ConnAck.is_met_by(&Inbound::Nothing));
    }

    #[test]
    fn suback_codes() {
        assert_eq!(
            SubAckData::from_code::<()>(1),
            Ok(SubAckData {
                granted_qos: QoS::AtLeastOnce
            })
        );
        assert_eq!(
            SubAckData::from_code::<()>(SUBACK_FAILURE),
            Err(MqttError::SubscribeRefused)
        );
        assert!(SubAckData::from_code::<()>(3).is_err());
    }
}
