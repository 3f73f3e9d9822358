// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! FUOTA session driver.
//!
//! Walks the session lifecycle phase by phase:
//!
//! ```text
//! PREPARE_FRAGMENTS -> CHECK_VERSION -> FRAG_SESSION_SETUP
//!   -> FRAG_SESSION_SETUP_ANS -> FRAG_SESSION_TRANSFER
//!   -> FRAG_SESSION_DELETE -> FRAG_SESSION_DELETE_ANS -> DONE
//! ```
//!
//! Answer phases block on the uplink source, skip events from other devices
//! without comment, and tolerate up to [`MAX_SPURIOUS_UPLINKS`] unexpected
//! frames before giving up. A transport or decode failure mid-session leaves
//! the device in an undefined state; no compensating delete is attempted.

use std::path::Path;

use super::{
    send_downlink, DownlinkTarget, Phase, SessionError, SessionErrorKind, SetupRefusal,
    MAX_SPURIOUS_UPLINKS,
};
use crate::fragment::Fragmenter;
use crate::protocol::{
    Command, DataFragment, FragSessionDeleteReq, FragSessionSetupAns, FragSessionSetupReq,
    OPCODE_FRAG_SESSION_DELETE, OPCODE_FRAG_SESSION_SETUP,
};
use crate::transport::{DownlinkQueue, UplinkSource};

/// Largest on-air fragment count expressible in the 14-bit wire ordinal.
const MAX_TOTAL_FRAGMENTS: usize = 0x3FFF;

/// Parameters of one FUOTA session.
#[derive(Debug, Clone)]
pub struct FuotaConfig {
    /// Target device EUI (16 hex characters).
    pub dev_eui: String,
    /// Application port the transfer runs on.
    pub lora_port: u8,
    /// Fragmentation session identifier, 0..=3.
    pub session_id: u8,
    /// Bitmask of participating multicast groups, 0..=15.
    pub group_mask: u8,
    /// Per-fragment payload size in bytes, 1..=255.
    pub frag_size: usize,
    /// Redundancy hint; logged, the coded block always equals the uncoded
    /// count under the current generator.
    pub redundancy: u8,
    /// Unicast to `dev_eui` or multicast to a group.
    pub target: DownlinkTarget,
}

impl FuotaConfig {
    /// Check parameter ranges before a session starts.
    pub fn validate(&self) -> Result<(), String> {
        if !super::is_valid_dev_eui(&self.dev_eui) {
            return Err(format!(
                "device EUI must be 16 hex characters, got '{}'",
                self.dev_eui
            ));
        }
        if self.session_id > 3 {
            return Err(format!("session id {} out of range 0..=3", self.session_id));
        }
        if self.group_mask > 15 {
            return Err(format!(
                "group mask {} out of range 0..=15",
                self.group_mask
            ));
        }
        if self.frag_size == 0 || self.frag_size > 255 {
            return Err(format!(
                "fragment size {} out of range 1..=255",
                self.frag_size
            ));
        }
        Ok(())
    }
}

/// Drives one FUOTA session over abstract transports.
pub struct FuotaDriver<'a, D, U> {
    config: FuotaConfig,
    downlink: &'a D,
    uplink: &'a U,
    phase: Phase,
}

impl<'a, D: DownlinkQueue, U: UplinkSource> FuotaDriver<'a, D, U> {
    pub fn new(config: FuotaConfig, downlink: &'a D, uplink: &'a U) -> Self {
        Self {
            config,
            downlink,
            uplink,
            phase: Phase::PrepareFragments,
        }
    }

    /// Phase the driver is in, or died in.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Run the session to completion.
    ///
    /// `sidecar` optionally names a file that receives the concatenated
    /// fragment set for inspection.
    pub fn run(&mut self, image: &[u8], sidecar: Option<&Path>) -> Result<(), SessionError> {
        self.enter(Phase::PrepareFragments);
        let fragmenter = self.prepare(image, sidecar)?;

        // Reserved for a future package-version query; advances unconditionally.
        self.enter(Phase::CheckVersion);

        self.enter(Phase::FragSessionSetup);
        self.send_setup(&fragmenter)?;

        self.enter(Phase::FragSessionSetupAns);
        self.await_setup_answer()?;

        self.enter(Phase::FragSessionTransfer);
        self.transfer(&fragmenter)?;

        self.enter(Phase::FragSessionDelete);
        self.send_delete()?;

        self.enter(Phase::FragSessionDeleteAns);
        self.await_delete_answer()?;

        self.enter(Phase::Done);
        log::info!("[FUOTA] session complete");
        Ok(())
    }

    fn enter(&mut self, phase: Phase) {
        self.phase = phase;
        log::info!("[FUOTA] state {}", phase);
    }

    fn fail(&self, kind: SessionErrorKind) -> SessionError {
        SessionError {
            phase: self.phase,
            kind,
        }
    }

    fn send(&self, frame: &[u8]) -> Result<(), SessionError> {
        send_downlink(
            self.downlink,
            &self.config.target,
            &self.config.dev_eui,
            self.config.lora_port,
            frame,
        )
        .map_err(|e| self.fail(SessionErrorKind::Transport(e)))
    }

    fn prepare(&self, image: &[u8], sidecar: Option<&Path>) -> Result<Fragmenter, SessionError> {
        log::info!(
            "[FUOTA] redundancy hint {} (coded block equals uncoded count)",
            self.config.redundancy
        );
        let fragmenter = Fragmenter::new(image, self.config.frag_size)
            .map_err(|e| self.fail(SessionErrorKind::Fragment(e)))?;

        if fragmenter.total_count() > MAX_TOTAL_FRAGMENTS {
            return Err(self.fail(SessionErrorKind::Config(format!(
                "{} fragments exceed the 14-bit wire ordinal",
                fragmenter.total_count()
            ))));
        }

        if let Some(path) = sidecar {
            fragmenter
                .write_sidecar(path)
                .map_err(|e| self.fail(SessionErrorKind::Fragment(e)))?;
        }
        Ok(fragmenter)
    }

    fn send_setup(&self, fragmenter: &Fragmenter) -> Result<(), SessionError> {
        if self.config.group_mask > 0x03 {
            // The FragSession byte only carries two group bits; the upper
            // bits of the configured mask never reach the device.
            log::warn!(
                "[FUOTA] group mask {:#06b} truncated to 2 bits on the wire",
                self.config.group_mask
            );
        }
        let request = FragSessionSetupReq {
            session_id: self.config.session_id,
            group_mask: self.config.group_mask,
            nb_frag: fragmenter.total_count() as u16,
            frag_size: fragmenter.frag_size() as u8,
            padding: fragmenter.padding() as u8,
        };
        log::info!(
            "[FUOTA] setup session {} | group mask {} | {} fragments of {} bytes | padding {}",
            self.config.session_id,
            self.config.group_mask,
            request.nb_frag,
            request.frag_size,
            request.padding
        );
        self.send(&request.encode())
    }

    fn await_setup_answer(&self) -> Result<(), SessionError> {
        let ans = self.wait_answer(OPCODE_FRAG_SESSION_SETUP, |command| match command {
            Command::FragSessionSetupAns(ans) => Some(*ans),
            _ => None,
        })?;
        self.check_setup_answer(&ans)
    }

    fn check_setup_answer(&self, ans: &FragSessionSetupAns) -> Result<(), SessionError> {
        let refusal = if ans.encoding_not_supported {
            Some(SetupRefusal::EncodingNotSupported)
        } else if ans.not_enough_memory {
            Some(SetupRefusal::NotEnoughMemory)
        } else if ans.frag_session_index_not_supported {
            Some(SetupRefusal::FragSessionIndexNotSupported)
        } else if ans.wrong_descriptor {
            Some(SetupRefusal::WrongDescriptor)
        } else {
            None
        };
        if let Some(refusal) = refusal {
            return Err(self.fail(SessionErrorKind::DeviceRefused(refusal)));
        }
        log::info!("[FUOTA] setup acknowledged for session {}", ans.frag_index);
        Ok(())
    }

    fn transfer(&self, fragmenter: &Fragmenter) -> Result<(), SessionError> {
        let total = fragmenter.total_count();
        for (i, payload) in fragmenter.fragments().enumerate() {
            let ordinal = (i + 1) as u16;
            let frame = DataFragment {
                session_id: self.config.session_id,
                ordinal,
                payload: payload.to_vec(),
            };
            log::info!("[FUOTA] fragment {} / {}", ordinal, total);
            self.send(&frame.encode())?;
        }
        Ok(())
    }

    fn send_delete(&self) -> Result<(), SessionError> {
        let request = FragSessionDeleteReq {
            session_id: self.config.session_id,
        };
        self.send(&request.encode())
    }

    fn await_delete_answer(&self) -> Result<(), SessionError> {
        let ans = self.wait_answer(OPCODE_FRAG_SESSION_DELETE, |command| match command {
            Command::FragSessionDeleteAns(ans) => Some(*ans),
            _ => None,
        })?;
        if ans.session_does_not_exist {
            // The transfer already happened; nothing to unwind.
            log::warn!(
                "[FUOTA] device reports session {} does not exist",
                self.config.session_id
            );
        }
        log::info!("[FUOTA] delete acknowledged for session {}", ans.frag_index);
        Ok(())
    }

    /// Block until the target device sends the answer `extract` recognizes.
    ///
    /// Uplinks from other devices are skipped silently. Decodable frames
    /// with another opcode and undecodable frames both count as spurious;
    /// the wait aborts after [`MAX_SPURIOUS_UPLINKS`] of them.
    fn wait_answer<T>(
        &self,
        expected: u8,
        extract: fn(&Command) -> Option<T>,
    ) -> Result<T, SessionError> {
        let mut spurious = 0u32;
        loop {
            let event = self
                .uplink
                .wait_for_message()
                .map_err(|e| self.fail(SessionErrorKind::Transport(e)))?;

            if event.dev_eui != self.config.dev_eui {
                continue;
            }

            match Command::decode_uplink(&event.data) {
                Ok(command) => {
                    if let Some(answer) = extract(&command) {
                        return Ok(answer);
                    }
                    spurious += 1;
                    log::warn!(
                        "[FUOTA] unexpected opcode 0x{:02X} while waiting for 0x{:02X}",
                        command.opcode(),
                        expected
                    );
                }
                Err(e) => {
                    spurious += 1;
                    log::warn!("[FUOTA] undecodable uplink: {}", e);
                }
            }

            if spurious >= MAX_SPURIOUS_UPLINKS {
                return Err(self.fail(SessionErrorKind::TooManySpurious(spurious)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> FuotaConfig {
        FuotaConfig {
            dev_eui: "ac1f09fffe071978".to_string(),
            lora_port: 201,
            session_id: 0,
            group_mask: 0,
            frag_size: 20,
            redundancy: 5,
            target: DownlinkTarget::Unicast,
        }
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range_parameters() {
        let mut config = valid_config();
        config.session_id = 4;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.group_mask = 16;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.frag_size = 256;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.dev_eui = "not-a-dev-eui".to_string();
        assert!(config.validate().is_err());
    }
}
