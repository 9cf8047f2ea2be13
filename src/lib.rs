//! # MQTT Session Engine for Embedded Systems
//!
//! `mqttc-embedded` is a `no_std`, allocation-free MQTT 3.1.1 client built on the
//! [Embassy](https://embassy.dev/) async ecosystem.
//!
//! ## Core Features
//!
//! - **`no_std` & `no_alloc`:** Packet buffers, the subscription table, the
//!   pending-transaction table and the request mailbox are all fixed-capacity,
//!   sized through const generics.
//! - **QoS 0, 1 & 2:** Outbound flows wait for PUBACK or PUBREC/PUBCOMP; inbound
//!   QoS 1/2 messages are acknowledged automatically.
//! - **Bounded waits:** Every read, write and acknowledgment wait has a deadline.
//!   Nothing blocks forever.
//! - **Transport Agnostic:** Anything implementing [`MqttTransport`] works: an
//!   `embassy-net` TCP socket, a UART, or any `embedded-io-async` stream.
//!
//! ## Architecture
//!
//! The crate provides two ways to drive a session:
//!
//! ### 1. Direct Client Usage
//!
//! Use [`MqttClient`] from a single task and call
//! [`yield_for`](MqttClient::yield_for) between operations so keepalive and
//! inbound messages are serviced:
//!
//! ```ignore
//! let mut client = MqttClient::<_, 5, 512>::new(transport, ClientConfig::default());
//! client.connect(&MqttOptions::new("sensor-42")).await?;
//! client.subscribe("sensor-42/cmd", QoS::AtLeastOnce, &handler).await?;
//! client.publish("sensor-42/temp", &Message::new(QoS::AtLeastOnce, "21.5")).await?;
//! client.yield_for(Duration::from_secs(1)).await?;
//! ```
//!
//! ### 2. Background Runtime
//!
//! Wrap the client in a [`MqttRuntime`], spawn [`MqttRuntime::run`] and call the
//! runtime from as many tasks as needed. Requests reach the background loop
//! through a bounded mailbox; callers wait on a per-request completion.
//!
//! ```ignore
//! let runtime = RUNTIME.init(MqttRuntime::new(client, RuntimeConfig::default()));
//! runtime.connect(&MqttOptions::new("sensor-42")).await?;
//! spawner.spawn(mqtt_task(runtime))?;
//! runtime.publish("sensor-42/temp", Message::new(QoS::AtLeastOnce, "21.5")).await?;
//! ```

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod client;
pub mod error;
pub mod packet;
pub mod runtime;
pub mod timer;
pub mod transport;
pub mod util;

// Re-export key types for easier access at the crate root.
pub use client::{
    ClientConfig, ConnAckData, HandlerError, LastWill, Message, MessageHandler, MqttClient,
    MqttOptions, Payload, SubAckData, is_raw_payload,
};
pub use error::MqttError;
pub use packet::QoS;
pub use runtime::{MqttRuntime, RuntimeConfig};
pub use transport::{IoTransport, MqttTransport, TcpTransport};
