//! A scripted in-memory broker for driving the client over `MqttTransport`.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use embassy_time::{Duration, Timer};
use mqttc_embedded::MqttTransport;
use mqttc_embedded::client::{HandlerError, Message, MessageHandler, Payload};
use mqttc_embedded::packet::{EncodePacket, Publish, QoS};
use mqttc_embedded::util::read_variable_byte_integer;

pub const CONNECT: u8 = 0x10;
pub const PUBLISH: u8 = 0x30;
pub const PUBACK: u8 = 0x40;
pub const PUBREC: u8 = 0x50;
pub const PUBREL: u8 = 0x60;
pub const PUBCOMP: u8 = 0x70;
pub const SUBSCRIBE: u8 = 0x80;
pub const UNSUBSCRIBE: u8 = 0xA0;
pub const PINGREQ: u8 = 0xC0;
pub const DISCONNECT: u8 = 0xE0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockError {
    Closed,
}

/// How the mock broker answers what the client sends.
struct Broker {
    connack_code: u8,
    suback_code: u8,
    ack_publish: bool,
    complete_releases: bool,
    answer_pings: bool,
    max_write: Option<usize>,
    closed: bool,
    inbound: VecDeque<u8>,
    outbound: Vec<u8>,
    sent: Vec<Vec<u8>>,
}

impl Broker {
    fn new() -> Self {
        Self {
            connack_code: 0,
            suback_code: 1,
            ack_publish: true,
            complete_releases: true,
            answer_pings: true,
            max_write: None,
            closed: false,
            inbound: VecDeque::new(),
            outbound: Vec::new(),
            sent: Vec::new(),
        }
    }

    /// Splits the written byte stream into packets and answers each one.
    fn absorb(&mut self) {
        loop {
            if self.outbound.len() < 2 {
                return;
            }
            let header_end = match self.outbound[1..].iter().position(|b| b & 0x80 == 0) {
                Some(pos) => pos + 2,
                None => return,
            };
            let (remaining, _) = read_variable_byte_integer(&self.outbound[1..header_end])
                .expect("valid remaining length");
            let total = header_end + remaining;
            if self.outbound.len() < total {
                return;
            }
            let packet: Vec<u8> = self.outbound.drain(..total).collect();
            self.answer(&packet, header_end);
            self.sent.push(packet);
        }
    }

    fn answer(&mut self, packet: &[u8], body: usize) {
        let id = |at: usize| [packet[at], packet[at + 1]];
        match packet[0] & 0xF0 {
            CONNECT => self.queue(&[0x20, 0x02, 0x00, self.connack_code]),
            PUBLISH => {
                let qos = (packet[0] >> 1) & 0x03;
                if qos == 0 || !self.ack_publish {
                    return;
                }
                let topic_len = u16::from_be_bytes([packet[body], packet[body + 1]]) as usize;
                let [hi, lo] = id(body + 2 + topic_len);
                let kind = if qos == 1 { PUBACK } else { PUBREC };
                self.queue(&[kind, 0x02, hi, lo]);
            }
            PUBREL if self.complete_releases => {
                let [hi, lo] = id(body);
                self.queue(&[PUBCOMP, 0x02, hi, lo]);
            }
            SUBSCRIBE => {
                let [hi, lo] = id(body);
                self.queue(&[0x90, 0x03, hi, lo, self.suback_code]);
            }
            UNSUBSCRIBE => {
                let [hi, lo] = id(body);
                self.queue(&[0xB0, 0x02, hi, lo]);
            }
            PINGREQ if self.answer_pings => self.queue(&[0xD0, 0x00]),
            _ => {}
        }
    }

    fn queue(&mut self, bytes: &[u8]) {
        self.inbound.extend(bytes.iter().copied());
    }
}

/// The transport half, owned by the client.
pub struct MockTransport {
    broker: Rc<RefCell<Broker>>,
}

/// The test's half, used to script the broker and inspect traffic.
#[derive(Clone)]
pub struct MockHandle {
    broker: Rc<RefCell<Broker>>,
}

pub fn mock() -> (MockTransport, MockHandle) {
    let broker = Rc::new(RefCell::new(Broker::new()));
    (
        MockTransport {
            broker: broker.clone(),
        },
        MockHandle { broker },
    )
}

impl MqttTransport for MockTransport {
    type Error = MockError;

    async fn send(&mut self, buf: &[u8], _timeout: Duration) -> Result<usize, MockError> {
        let mut broker = self.broker.borrow_mut();
        if broker.closed {
            return Err(MockError::Closed);
        }
        let n = broker.max_write.map_or(buf.len(), |max| buf.len().min(max));
        broker.outbound.extend_from_slice(&buf[..n]);
        broker.absorb();
        Ok(n)
    }

    async fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, MockError> {
        {
            let mut broker = self.broker.borrow_mut();
            if broker.closed {
                return Err(MockError::Closed);
            }
            if !broker.inbound.is_empty() {
                let n = buf.len().min(broker.inbound.len());
                for (slot, byte) in buf.iter_mut().zip(broker.inbound.drain(..n)) {
                    *slot = byte;
                }
                return Ok(n);
            }
        }
        Timer::after(timeout).await;
        Ok(0)
    }
}

impl MockHandle {
    pub fn set_connack_code(&self, code: u8) {
        self.broker.borrow_mut().connack_code = code;
    }

    pub fn set_suback_code(&self, code: u8) {
        self.broker.borrow_mut().suback_code = code;
    }

    /// Stops answering PUBLISH with PUBACK or PUBREC.
    pub fn withhold_publish_acks(&self) {
        self.broker.borrow_mut().ack_publish = false;
    }

    /// Stops answering PUBREL with PUBCOMP.
    pub fn withhold_pubcomp(&self) {
        self.broker.borrow_mut().complete_releases = false;
    }

    pub fn ignore_pings(&self) {
        self.broker.borrow_mut().answer_pings = false;
    }

    /// Accepts at most `max` bytes per write.
    pub fn limit_writes(&self, max: usize) {
        self.broker.borrow_mut().max_write = Some(max);
    }

    pub fn close(&self) {
        self.broker.borrow_mut().closed = true;
    }

    /// Queues raw bytes for the client to read.
    pub fn push_bytes(&self, bytes: &[u8]) {
        self.broker.borrow_mut().queue(bytes);
    }

    /// Queues a PUBLISH from the broker.
    pub fn push_publish(&self, topic: &str, qos: QoS, packet_id: u16, payload: &[u8]) {
        let packet = Publish {
            topic,
            qos,
            dup: false,
            retain: false,
            packet_id: (qos != QoS::AtMostOnce).then_some(packet_id),
            payload,
        };
        let mut buf = [0u8; 512];
        let len = packet.encode(&mut buf).expect("publish fits");
        self.push_bytes(&buf[..len]);
    }

    /// Every packet the client has written, in order.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.broker.borrow().sent.clone()
    }

    /// Packet types (high nibble of the first byte) the client has written.
    pub fn sent_types(&self) -> Vec<u8> {
        self.broker
            .borrow()
            .sent
            .iter()
            .map(|p| p[0] & 0xF0)
            .collect()
    }

    pub fn count(&self, kind: u8) -> usize {
        self.sent_types().iter().filter(|&&t| t == kind).count()
    }

    /// The last packet of `kind` the client has written.
    pub fn last(&self, kind: u8) -> Option<Vec<u8>> {
        self.broker
            .borrow()
            .sent
            .iter()
            .rev()
            .find(|p| p[0] & 0xF0 == kind)
            .cloned()
    }
}

/// A handler that remembers what it was given.
#[derive(Default)]
pub struct Recorder {
    pub received: RefCell<Vec<(String, Vec<u8>, bool)>>,
    pub fail: bool,
}

impl Recorder {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn count(&self) -> usize {
        self.received.borrow().len()
    }

    pub fn topics(&self) -> Vec<String> {
        self.received
            .borrow()
            .iter()
            .map(|(topic, _, _)| topic.clone())
            .collect()
    }
}

impl MessageHandler for Recorder {
    fn on_message(&self, topic: &str, message: &Message<'_>) -> Result<(), HandlerError> {
        let is_text = matches!(message.payload, Payload::Text(_));
        self.received.borrow_mut().push((
            topic.to_string(),
            message.payload.as_bytes().to_vec(),
            is_text,
        ));
        if self.fail { Err(HandlerError) } else { Ok(()) }
    }
}
