// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Protocol drivers: the FUOTA session machine and the clock-sync responder.
//!
//! Both drivers are generic over the [`DownlinkQueue`] / [`UplinkSource`]
//! seams and run single-threaded on the caller: they suspend only inside
//! `wait_for_message` and the outbound enqueue calls. Neither driver keeps
//! state across runs; a session either reaches its terminal state or fails
//! with the phase it died in.

mod clock;
mod fuota;

pub use clock::{
    answer_for, seconds_since_gps_epoch, ClockSyncConfig, ClockSyncResponder, CLOCK_SYNC_PORT,
};
pub use fuota::{FuotaConfig, FuotaDriver};

use std::fmt;

use crate::fragment::FragmentError;
use crate::transport::{DownlinkQueue, TransportError};

/// Spurious uplinks tolerated in one answer-wait before the session aborts.
pub const MAX_SPURIOUS_UPLINKS: u32 = 8;

/// Where a downlink frame is addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownlinkTarget {
    /// Send to the configured device EUI.
    Unicast,
    /// Send to a multicast group, by control-plane group id.
    Multicast(String),
}

pub(crate) fn send_downlink<D: DownlinkQueue>(
    queue: &D,
    target: &DownlinkTarget,
    dev_eui: &str,
    port: u8,
    frame: &[u8],
) -> Result<(), TransportError> {
    match target {
        DownlinkTarget::Unicast => queue.enqueue_unicast(dev_eui, port, frame),
        DownlinkTarget::Multicast(group) => queue.enqueue_multicast(group, port, frame),
    }
}

/// True for a 16-character hexadecimal device EUI.
pub fn is_valid_dev_eui(dev_eui: &str) -> bool {
    dev_eui.len() == 16 && dev_eui.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Phases of the FUOTA session machine, in traversal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    PrepareFragments,
    CheckVersion,
    FragSessionSetup,
    FragSessionSetupAns,
    FragSessionTransfer,
    FragSessionDelete,
    FragSessionDeleteAns,
    Done,
}

impl Phase {
    /// Stable name used in logs and error reports.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PrepareFragments => "PREPARE_FRAGMENTS",
            Self::CheckVersion => "CHECK_VERSION",
            Self::FragSessionSetup => "FRAG_SESSION_SETUP",
            Self::FragSessionSetupAns => "FRAG_SESSION_SETUP_ANS",
            Self::FragSessionTransfer => "FRAG_SESSION_TRANSFER",
            Self::FragSessionDelete => "FRAG_SESSION_DELETE",
            Self::FragSessionDeleteAns => "FRAG_SESSION_DELETE_ANS",
            Self::Done => "DONE",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reason the device refused a session setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupRefusal {
    EncodingNotSupported,
    NotEnoughMemory,
    FragSessionIndexNotSupported,
    WrongDescriptor,
}

impl fmt::Display for SetupRefusal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::EncodingNotSupported => "encoding not supported",
            Self::NotEnoughMemory => "not enough memory on the device",
            Self::FragSessionIndexNotSupported => "fragmentation session index not supported",
            Self::WrongDescriptor => "wrong descriptor",
        };
        f.write_str(msg)
    }
}

/// Fatal session failure, carrying the phase it occurred in.
#[derive(Debug)]
pub struct SessionError {
    /// Last phase the machine traversed.
    pub phase: Phase,
    /// What went wrong.
    pub kind: SessionErrorKind,
}

/// Failure classes of a FUOTA session.
#[derive(Debug)]
pub enum SessionErrorKind {
    /// The session parameters cannot be transmitted as configured.
    Config(String),
    /// Building or persisting the fragment set failed.
    Fragment(FragmentError),
    /// A downlink enqueue or the uplink source failed.
    Transport(TransportError),
    /// The device refused the session setup.
    DeviceRefused(SetupRefusal),
    /// Too many spurious uplinks while waiting for an answer.
    TooManySpurious(u32),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session failed in {}: ", self.phase)?;
        match &self.kind {
            SessionErrorKind::Config(msg) => write!(f, "{}", msg),
            SessionErrorKind::Fragment(e) => write!(f, "{}", e),
            SessionErrorKind::Transport(e) => write!(f, "{}", e),
            SessionErrorKind::DeviceRefused(r) => write!(f, "device refused setup: {}", r),
            SessionErrorKind::TooManySpurious(n) => {
                write!(f, "gave up after {} spurious uplinks", n)
            }
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            SessionErrorKind::Fragment(e) => Some(e),
            SessionErrorKind::Transport(e) => Some(e),
            _ => None,
        }
    }
}
