// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Clock-sync responder.
//!
//! Answers device-initiated `AppTimeReq` uplinks with the server's seconds
//! since the GPS epoch (1980-01-06T00:00:00Z), wrapping at `2^32`. The
//! responder alternates between two states: `WAIT` blocks on the uplink
//! source, `PROCESS` computes the correction and, when the device asked for
//! one, sends an `AppTimeAns` echoing the request token.

use chrono::{DateTime, TimeZone, Utc};

use super::{send_downlink, DownlinkTarget};
use crate::protocol::{AppTimeAns, AppTimeReq, OPCODE_APP_TIME};
use crate::transport::{DownlinkQueue, TransportError, UplinkSource};

/// Application port clock-sync requests arrive on.
pub const CLOCK_SYNC_PORT: u8 = 202;

/// Start of the GPS time scale.
fn gps_epoch() -> DateTime<Utc> {
    // A fixed, valid calendar date; construction cannot fail.
    Utc.with_ymd_and_hms(1980, 1, 6, 0, 0, 0).unwrap()
}

/// Seconds between `now` and the GPS epoch, rounded and wrapped at `2^32`.
pub fn seconds_since_gps_epoch(now: DateTime<Utc>) -> u32 {
    let millis = (now - gps_epoch()).num_milliseconds();
    ((millis + 500) / 1000) as u32
}

/// Parameters of the clock-sync responder.
#[derive(Debug, Clone)]
pub struct ClockSyncConfig {
    /// Device whose requests are answered.
    pub dev_eui: String,
    /// Application port the answers are sent on.
    pub lora_port: u8,
    /// Unicast to `dev_eui` or multicast to a group.
    pub target: DownlinkTarget,
}

impl ClockSyncConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !super::is_valid_dev_eui(&self.dev_eui) {
            return Err(format!(
                "device EUI must be 16 hex characters, got '{}'",
                self.dev_eui
            ));
        }
        Ok(())
    }
}

/// Time correction for one request, or `None` when no answer was asked for.
pub fn answer_for(request: &AppTimeReq, now: DateTime<Utc>) -> Option<AppTimeAns> {
    if !request.ans_required {
        return None;
    }
    Some(AppTimeAns {
        time_correction: seconds_since_gps_epoch(now),
        token: request.token,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClockState {
    Wait,
    Process,
}

/// Serves clock-sync requests from one device until the uplink source
/// closes.
pub struct ClockSyncResponder<'a, D, U> {
    config: ClockSyncConfig,
    downlink: &'a D,
    uplink: &'a U,
    state: ClockState,
    pending: Option<AppTimeReq>,
}

impl<'a, D: DownlinkQueue, U: UplinkSource> ClockSyncResponder<'a, D, U> {
    pub fn new(config: ClockSyncConfig, downlink: &'a D, uplink: &'a U) -> Self {
        Self {
            config,
            downlink,
            uplink,
            state: ClockState::Wait,
            pending: None,
        }
    }

    /// Serve requests until the uplink source disconnects or a downlink
    /// fails.
    pub fn run(&mut self) -> Result<(), TransportError> {
        log::info!("[CLOCK-SYNC] waiting for clock sync requests");
        loop {
            self.step()?;
        }
    }

    /// Advance the responder by one state transition.
    fn step(&mut self) -> Result<(), TransportError> {
        match self.state {
            ClockState::Wait => {
                let event = self.uplink.wait_for_message()?;
                if event.dev_eui != self.config.dev_eui {
                    return Ok(());
                }
                if event.f_port == CLOCK_SYNC_PORT
                    && event.data.first() == Some(&OPCODE_APP_TIME)
                {
                    match AppTimeReq::decode(&event.data) {
                        Ok(request) => {
                            log::info!("[CLOCK-SYNC] received clock sync request");
                            self.pending = Some(request);
                            self.state = ClockState::Process;
                        }
                        Err(e) => log::warn!("[CLOCK-SYNC] undecodable request: {}", e),
                    }
                } else {
                    log::info!("[CLOCK-SYNC] received generic data on port {}", event.f_port);
                }
                Ok(())
            }
            ClockState::Process => {
                self.state = ClockState::Wait;
                let Some(request) = self.pending.take() else {
                    return Ok(());
                };
                log::info!(
                    "[CLOCK-SYNC] token {} | answer required: {}",
                    request.token,
                    request.ans_required
                );
                if let Some(answer) = answer_for(&request, Utc::now()) {
                    log::info!(
                        "[CLOCK-SYNC] seconds since GPS epoch: {}",
                        answer.time_correction
                    );
                    send_downlink(
                        self.downlink,
                        &self.config.target,
                        &self.config.dev_eui,
                        self.config.lora_port,
                        &answer.encode(),
                    )?;
                }
                Ok(())
            }
        }
    }
}
