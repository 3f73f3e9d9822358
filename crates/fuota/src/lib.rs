// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # FUOTA - Firmware Update Over-The-Air for LoRaWAN
//!
//! Server-side implementation of fragmented firmware transport and clock
//! synchronization for battery-powered LoRaWAN end-devices: an image is
//! split into equal-size fragments, forward-error-encoded with a
//! deterministic XOR generator matrix, and streamed to the device through a
//! phase-ordered application-layer protocol. A companion responder answers
//! device clock-sync requests against the GPS time scale.
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------------+
//! |                        Driver Layer                                |
//! |        FuotaDriver (session machine) | ClockSyncResponder          |
//! +--------------------------------------------------------------------+
//! |                        Protocol Layer                              |
//! |   FragSessionSetup / DataFragment / Delete | AppTimeReq / Ans      |
//! +--------------------------------------------------------------------+
//! |                        Encoding Layer                              |
//! |      Fragmenter | PRBS23 generator matrix | zero padding           |
//! +--------------------------------------------------------------------+
//! |                        Transport Layer                             |
//! |   DownlinkQueue (ChirpStack REST) | UplinkSource (MQTT mailbox)    |
//! +--------------------------------------------------------------------+
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use fuota::session::{DownlinkTarget, FuotaConfig, FuotaDriver};
//! use fuota::transport::{ChirpStackClient, MqttUplinkSource};
//! use fuota::ServerContext;
//!
//! let context = ServerContext::from_env()?;
//! let control = ChirpStackClient::new(&context, 8580)?;
//! let bootstrap = control.bootstrap("ac1f09fffe071978")?;
//!
//! let uplinks = MqttUplinkSource::connect("fuota-server", &context.server, 8583)?;
//! uplinks.subscribe_application(&bootstrap.application_id)?;
//!
//! let config = FuotaConfig {
//!     dev_eui: "ac1f09fffe071978".into(),
//!     lora_port: 201,
//!     session_id: 0,
//!     group_mask: 0,
//!     frag_size: 20,
//!     redundancy: 5,
//!     target: DownlinkTarget::Unicast,
//! };
//! let image = std::fs::read("files/Input.bin")?;
//! FuotaDriver::new(config, &control, &uplinks).run(&image, None)?;
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Fragmenter`] | Uncoded + coded fragment set for one image |
//! | [`Command`] | Tagged application-layer frame, keyed on opcode |
//! | [`FuotaDriver`] | Phase-ordered session state machine |
//! | [`ClockSyncResponder`] | GPS-epoch time correction service |
//! | [`ServerContext`] | Network-server credentials from the environment |

/// Network-server credentials loaded from the environment.
pub mod context;
/// Image fragmentation and erasure coding.
pub mod fragment;
/// File-backed logging for the server binaries.
pub mod logging;
/// Application-layer command frames.
pub mod protocol;
/// FUOTA and clock-sync state machines.
pub mod session;
/// Downlink/uplink transport seams and their backends.
pub mod transport;

pub use context::{ContextError, ServerContext};
pub use fragment::Fragmenter;
pub use protocol::Command;
pub use session::{ClockSyncResponder, FuotaDriver, SessionError};
pub use transport::{DownlinkQueue, UplinkEvent, UplinkSource};
