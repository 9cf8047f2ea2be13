//! The background service loop and its application-facing handle.

use embassy_futures::select::{Either, select};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::{Duration, Instant, Timer, with_timeout};

use super::completion::{CompletionPool, Ticket};
use super::mailbox::{MAILBOX_CAPACITY, Mailbox, Request, RequestKind, Response};
use super::pending::{Awaiting, MAX_PENDING_TRANSACTIONS, Pending, PendingTable};
use crate::client::{
    ConnAckData, DEFAULT_BUFFER_SIZE, Inbound, MAX_MESSAGE_HANDLERS, Message, MessageHandler,
    MqttClient, MqttOptions, SubAckData,
};
use crate::error::{MqttError, ProtocolError};
use crate::packet::QoS;
use crate::timer::Countdown;
use crate::transport::MqttTransport;

/// Timeouts for application calls routed through the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RuntimeConfig {
    /// How long a call waits for room in the mailbox.
    pub mailbox_timeout: Duration,
    /// How long a call waits for its request to be completed, queueing included.
    pub response_timeout: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            mailbox_timeout: Duration::from_secs(1),
            response_timeout: Duration::from_secs(15),
        }
    }
}

type Outcome<E> = Result<Response, MqttError<E>>;
type Completions<E, const M: usize> = CompletionPool<Outcome<E>, M>;

/// Hands `outcome` to the caller waiting on `ticket`, or logs a failure nobody waits for.
fn finish<E: Send, const M: usize>(
    completions: &Completions<E, M>,
    ticket: Option<Ticket>,
    outcome: Outcome<E>,
) {
    match ticket {
        Some(ticket) => {
            completions.complete(ticket, outcome);
        }
        None => {
            if let Err(err) = outcome {
                warn!("mqtt runtime: queued request failed, error {}", err.code());
            }
        }
    }
}

/// What sending a request left behind.
enum Sent<'h> {
    Done(Response),
    Awaiting {
        packet_id: u16,
        awaiting: Awaiting,
        previous: Option<&'h dyn MessageHandler>,
    },
}

/// Everything the session lock guards.
struct Session<'h, T, const H: usize, const B: usize, const P: usize>
where
    T: MqttTransport,
{
    client: MqttClient<'h, T, H, B>,
    pending: PendingTable<'h, P>,
}

impl<'h, T, const H: usize, const B: usize, const P: usize> Session<'h, T, H, B, P>
where
    T: MqttTransport,
{
    /// Sends one mailbox request and records it as pending if it awaits an ack.
    async fn dispatch<const M: usize>(
        &mut self,
        request: Request<'h>,
        completions: &Completions<T::Error, M>,
    ) {
        trace!("mqtt runtime: dispatching request");
        if let Err(err) = self.client.ensure_connected() {
            finish(completions, request.ticket, Err(err));
            return;
        }
        if request.kind.expects_ack() && self.pending.is_full() {
            finish(completions, request.ticket, Err(MqttError::CapacityExceeded));
            return;
        }
        match self.send(&request).await {
            Ok(Sent::Done(response)) => finish(completions, request.ticket, Ok(response)),
            Ok(Sent::Awaiting {
                packet_id,
                awaiting,
                previous,
            }) => {
                let deadline = Countdown::new(self.client.config().command_timeout).deadline();
                let entry = Pending {
                    packet_id,
                    request,
                    awaiting,
                    previous,
                    deadline,
                };
                if let Err(entry) = self.pending.register(entry) {
                    self.rollback(&entry);
                    finish(
                        completions,
                        entry.request.ticket,
                        Err(MqttError::CapacityExceeded),
                    );
                }
            }
            Err(err) => {
                finish(completions, request.ticket, Err(err.clone()));
                self.fail(err, completions);
            }
        }
    }

    async fn send(&mut self, request: &Request<'h>) -> Result<Sent<'h>, MqttError<T::Error>> {
        let Self { client, pending } = self;
        let in_use = |id: u16| pending.contains(id);
        match request.kind {
            RequestKind::Publish { topic, message } => {
                let packet_id = client.start_publish(topic, &message, in_use).await?;
                let awaiting = match message.qos {
                    QoS::AtMostOnce => return Ok(Sent::Done(Response::Published)),
                    QoS::AtLeastOnce => Awaiting::PubAck,
                    QoS::ExactlyOnce => Awaiting::PubRec,
                };
                Ok(Sent::Awaiting {
                    packet_id,
                    awaiting,
                    previous: None,
                })
            }
            RequestKind::Subscribe {
                filter,
                qos,
                handler,
            } => {
                let previous = client.register_handler(filter, handler)?;
                match client.start_subscribe(filter, qos, in_use).await {
                    Ok(packet_id) => Ok(Sent::Awaiting {
                        packet_id,
                        awaiting: Awaiting::SubAck,
                        previous,
                    }),
                    Err(err) => {
                        client.restore_handler(filter, previous);
                        Err(err)
                    }
                }
            }
            RequestKind::Unsubscribe { filter } => {
                let packet_id = client.start_unsubscribe(filter, in_use).await?;
                if request.ticket.is_none() {
                    // Nobody waits for the UNSUBACK; stop routing right away.
                    client.remove_handler(filter);
                    return Ok(Sent::Done(Response::Unsubscribed));
                }
                Ok(Sent::Awaiting {
                    packet_id,
                    awaiting: Awaiting::UnsubAck,
                    previous: None,
                })
            }
        }
    }

    /// Resolves the pending transaction an inbound acknowledgment belongs to.
    fn settle<const M: usize>(&mut self, event: Inbound, completions: &Completions<T::Error, M>) {
        let (packet_id, awaiting) = match event {
            Inbound::PubAck(id) => (id, Awaiting::PubAck),
            Inbound::PubRec(id) => {
                let deadline = Countdown::new(self.client.config().command_timeout).deadline();
                if !self.pending.advance(id, deadline) {
                    debug!("mqtt runtime: unexpected PUBREC for packet {}", id);
                }
                return;
            }
            Inbound::PubComp(id) => (id, Awaiting::PubComp),
            Inbound::SubAck { packet_id, .. } => (packet_id, Awaiting::SubAck),
            Inbound::UnsubAck(id) => (id, Awaiting::UnsubAck),
            _ => return,
        };
        if self.pending.awaiting(packet_id) != Some(awaiting) {
            debug!("mqtt runtime: late or unexpected ack for packet {}", packet_id);
            return;
        }
        let Some(entry) = self.pending.resolve(packet_id) else {
            return;
        };
        let outcome = match (event, entry.request.kind) {
            (Inbound::SubAck { return_code, .. }, RequestKind::Subscribe { filter, .. }) => {
                let result = SubAckData::from_code(return_code);
                if result.is_err() {
                    self.client.restore_handler(filter, entry.previous);
                }
                result.map(Response::Subscribed)
            }
            (_, RequestKind::Unsubscribe { filter }) => {
                self.client.remove_handler(filter);
                Ok(Response::Unsubscribed)
            }
            _ => Ok(Response::Published),
        };
        finish(completions, entry.request.ticket, outcome);
    }

    /// Fails transactions whose acknowledgment is overdue.
    ///
    /// An overdue acknowledgment means the connection is no longer trusted, so
    /// the session is closed as well.
    fn expire<const M: usize>(&mut self, completions: &Completions<T::Error, M>) {
        let mut expired = false;
        let client = &mut self.client;
        self.pending.expire(Instant::now(), |entry| {
            warn!("mqtt runtime: packet {} not acknowledged in time", entry.packet_id);
            if let RequestKind::Subscribe { filter, .. } = entry.request.kind {
                client.restore_handler(filter, entry.previous);
            }
            finish(completions, entry.request.ticket, Err(MqttError::AckTimeout));
            expired = true;
        });
        if expired {
            self.fail(MqttError::AckTimeout, completions);
        }
    }

    /// Handles a service error; fatal ones close the session and abort everything pending.
    fn fail<const M: usize>(
        &mut self,
        err: MqttError<T::Error>,
        completions: &Completions<T::Error, M>,
    ) {
        if !err.is_fatal() {
            warn!("mqtt runtime: service error {}", err.code());
            return;
        }
        let _ = self.client.guard::<()>(Err(err));
        self.abort_all(completions);
    }

    fn abort_all<const M: usize>(&mut self, completions: &Completions<T::Error, M>) {
        let client = &mut self.client;
        self.pending.abort_all(|entry| {
            if let RequestKind::Subscribe { filter, .. } = entry.request.kind {
                client.restore_handler(filter, entry.previous);
            }
            finish(completions, entry.request.ticket, Err(MqttError::Aborted));
        });
    }

    /// Undoes the table change a request made before it could be tracked.
    fn rollback(&mut self, entry: &Pending<'h>) {
        if let RequestKind::Subscribe { filter, .. } = entry.request.kind {
            self.client.restore_handler(filter, entry.previous);
        }
    }
}

/// Runs an [`MqttClient`] in the background and serves concurrent callers.
///
/// [`run`](Self::run) is the service loop. Spawn it once and let it run for the
/// life of the program. Every other method may be called from any number of
/// tasks. `publish`, `subscribe` and `unsubscribe` never touch the session
/// directly: they post a request to the mailbox and wait for the loop to
/// complete it, so acknowledgment waits never hold the session lock.
///
/// ```ignore
/// static RUNTIME: StaticCell<MqttRuntime<'static, TcpTransport<'static>>> = StaticCell::new();
///
/// let runtime = RUNTIME.init(MqttRuntime::new(client, RuntimeConfig::default()));
/// runtime.connect(&MqttOptions::new("sensor-42")).await?;
/// spawner.spawn(mqtt_task(runtime))?;
///
/// runtime.subscribe("sensor-42/cmd", QoS::AtLeastOnce, &COMMANDS).await?;
/// runtime.publish("sensor-42/temp", Message::new(QoS::AtLeastOnce, "21.5")).await?;
/// ```
pub struct MqttRuntime<
    'h,
    T,
    const MAX_HANDLERS: usize = { MAX_MESSAGE_HANDLERS },
    const BUF_SIZE: usize = { DEFAULT_BUFFER_SIZE },
    const MAX_PENDING: usize = { MAX_PENDING_TRANSACTIONS },
    const MAILBOX: usize = { MAILBOX_CAPACITY },
> where
    T: MqttTransport,
{
    session: Mutex<CriticalSectionRawMutex, Session<'h, T, MAX_HANDLERS, BUF_SIZE, MAX_PENDING>>,
    mailbox: Mailbox<'h, MAILBOX>,
    completions: Completions<T::Error, MAILBOX>,
    config: RuntimeConfig,
}

impl<'h, T, const MAX_HANDLERS: usize, const BUF_SIZE: usize, const MAX_PENDING: usize, const MAILBOX: usize>
    MqttRuntime<'h, T, MAX_HANDLERS, BUF_SIZE, MAX_PENDING, MAILBOX>
where
    T: MqttTransport,
{
    pub fn new(client: MqttClient<'h, T, MAX_HANDLERS, BUF_SIZE>, config: RuntimeConfig) -> Self {
        Self {
            session: Mutex::new(Session {
                client,
                pending: PendingTable::new(),
            }),
            mailbox: Mailbox::new(),
            completions: CompletionPool::new(),
            config,
        }
    }

    /// The service loop: one mailbox request, one service cycle, expiry, repeat.
    pub async fn run(&self) -> ! {
        info!("mqtt runtime: started");
        loop {
            self.step().await;
        }
    }

    async fn step(&self) {
        if let Some(request) = self.mailbox.try_retrieve() {
            let mut session = self.session.lock().await;
            session.dispatch(request, &self.completions).await;
        }

        let mut session = self.session.lock().await;
        let poll_interval = session.client.config().poll_interval;
        if !session.client.is_connected() {
            drop(session);
            // Idle, but answer requests as soon as they arrive.
            if let Either::First(request) =
                select(self.mailbox.receive(), Timer::after(poll_interval)).await
            {
                let mut session = self.session.lock().await;
                session.dispatch(request, &self.completions).await;
            }
            return;
        }
        match session.client.cycle(poll_interval).await {
            Ok(event) => session.settle(event, &self.completions),
            Err(err) => session.fail(err, &self.completions),
        }
        session.expire(&self.completions);
    }

    async fn request(&self, kind: RequestKind<'h>) -> Outcome<T::Error> {
        let claim = self
            .completions
            .claim()
            .ok_or(MqttError::CapacityExceeded)?;
        self.mailbox
            .post(
                Request::with_ticket(kind, claim.ticket()),
                self.config.mailbox_timeout,
            )
            .await
            .map_err(MqttError::cast_transport_error)?;
        with_timeout(self.config.response_timeout, claim.wait())
            .await
            .unwrap_or(Err(MqttError::Timeout))
    }

    /// Publishes through the runtime and waits for the QoS flow to complete.
    pub async fn publish(
        &self,
        topic: &'h str,
        message: Message<'h>,
    ) -> Result<(), MqttError<T::Error>> {
        self.request(RequestKind::Publish { topic, message })
            .await
            .map(|_| ())
    }

    /// Subscribes through the runtime and waits for the SUBACK.
    pub async fn subscribe(
        &self,
        filter: &'h str,
        qos: QoS,
        handler: &'h dyn MessageHandler,
    ) -> Result<SubAckData, MqttError<T::Error>> {
        match self
            .request(RequestKind::Subscribe {
                filter,
                qos,
                handler,
            })
            .await?
        {
            Response::Subscribed(granted) => Ok(granted),
            _ => Err(MqttError::Protocol(ProtocolError::InvalidResponse)),
        }
    }

    /// Unsubscribes through the runtime and waits for the UNSUBACK.
    pub async fn unsubscribe(&self, filter: &'h str) -> Result<(), MqttError<T::Error>> {
        self.request(RequestKind::Unsubscribe { filter })
            .await
            .map(|_| ())
    }

    /// Queues a subscription and returns without waiting for the broker.
    ///
    /// A refused subscription is logged and its handler removed.
    pub async fn async_subscribe(
        &self,
        filter: &'h str,
        qos: QoS,
        handler: &'h dyn MessageHandler,
    ) -> Result<(), MqttError<T::Error>> {
        self.post(RequestKind::Subscribe {
            filter,
            qos,
            handler,
        })
        .await
    }

    /// Queues an unsubscribe and returns without waiting for the broker.
    pub async fn async_unsubscribe(&self, filter: &'h str) -> Result<(), MqttError<T::Error>> {
        self.post(RequestKind::Unsubscribe { filter }).await
    }

    async fn post(&self, kind: RequestKind<'h>) -> Result<(), MqttError<T::Error>> {
        self.mailbox
            .post(Request::new(kind), self.config.mailbox_timeout)
            .await
            .map_err(MqttError::cast_transport_error)
    }

    /// Opens the session. Holds the session lock for the handshake.
    ///
    /// Other calls that take the lock (`is_connected`, `set_message_handler`,
    /// `pending`, ...) wait until CONNACK arrives or the command timeout expires.
    pub async fn connect(
        &self,
        options: &MqttOptions<'_>,
    ) -> Result<ConnAckData, MqttError<T::Error>> {
        let mut session = self.session.lock().await;
        session.client.connect_with_results(options).await
    }

    /// Sends DISCONNECT, closes the session and aborts every pending request.
    pub async fn disconnect(&self) -> Result<(), MqttError<T::Error>> {
        let mut session = self.session.lock().await;
        let result = session.client.disconnect().await;
        session.abort_all(&self.completions);
        result
    }

    pub async fn is_connected(&self) -> bool {
        self.session.lock().await.client.is_connected()
    }

    /// Sets or removes a handler without talking to the broker.
    pub async fn set_message_handler(
        &self,
        filter: &str,
        handler: Option<&'h dyn MessageHandler>,
    ) -> Result<(), MqttError<T::Error>> {
        self.session
            .lock()
            .await
            .client
            .set_message_handler(filter, handler)
    }

    pub async fn set_default_message_handler(&self, handler: Option<&'h dyn MessageHandler>) {
        self.session
            .lock()
            .await
            .client
            .set_default_message_handler(handler);
    }

    /// Number of requests sent and still waiting for an acknowledgment.
    pub async fn pending(&self) -> usize {
        self.session.lock().await.pending.len()
    }

    pub fn mailbox(&self) -> &Mailbox<'h, MAILBOX> {
        &self.mailbox
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }
}
