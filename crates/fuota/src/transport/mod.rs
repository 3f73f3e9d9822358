// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transport abstractions between the state machines and the network server.
//!
//! The protocol drivers only ever talk to two seams:
//!
//! - [`DownlinkQueue`] enqueues application-layer frames for transmission,
//!   either unicast to one device or multicast to a group. The network
//!   server owns scheduling and on-air ordering; this layer only guarantees
//!   enqueue order.
//! - [`UplinkSource`] yields device uplinks one at a time through a blocking
//!   [`UplinkSource::wait_for_message`]. The protocol is strictly
//!   request-response with a single outstanding message, so no back-pressure
//!   is needed; events arriving while nobody waits queue up FIFO.
//!
//! Production backends live in [`chirpstack`] (REST control plane) and
//! [`mqtt`] (broker subscription); tests drive the machines with in-memory
//! implementations of the same traits.

pub mod chirpstack;
pub mod mqtt;

pub use chirpstack::{Bootstrap, ChirpStackClient};
pub use mqtt::MqttUplinkSource;

use std::fmt;

/// Errors crossing the transport boundary.
#[derive(Debug)]
pub enum TransportError {
    /// The HTTP request could not be performed at all.
    Http(String),
    /// The control plane answered with a non-success status.
    Rejected { status: u16, body: String },
    /// A response or event payload was not the expected JSON shape.
    Json(String),
    /// The broker client refused an operation.
    Broker(String),
    /// The uplink source shut down; no more events will arrive.
    Disconnected,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(e) => write!(f, "HTTP error: {}", e),
            Self::Rejected { status, body } => {
                write!(f, "control plane rejected request ({}): {}", status, body)
            }
            Self::Json(e) => write!(f, "malformed JSON payload: {}", e),
            Self::Broker(e) => write!(f, "broker error: {}", e),
            Self::Disconnected => write!(f, "uplink source disconnected"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Downlink enqueue operations offered by the control plane.
pub trait DownlinkQueue {
    /// Enqueue a downlink addressed to a single device.
    fn enqueue_unicast(&self, dev_eui: &str, port: u8, data: &[u8])
        -> Result<(), TransportError>;

    /// Enqueue a downlink addressed to a multicast group.
    fn enqueue_multicast(
        &self,
        group_id: &str,
        port: u8,
        data: &[u8],
    ) -> Result<(), TransportError>;
}

/// One device uplink delivered by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UplinkEvent {
    /// EUI of the sending device, as reported by the network server.
    pub dev_eui: String,
    /// Application port the uplink arrived on.
    pub f_port: u8,
    /// Decoded frame payload.
    pub data: Vec<u8>,
}

/// Blocking source of device uplinks, filtered to one application.
pub trait UplinkSource {
    /// Block until the next uplink event arrives.
    ///
    /// Returns [`TransportError::Disconnected`] once the source is closed.
    fn wait_for_message(&self) -> Result<UplinkEvent, TransportError>;
}
