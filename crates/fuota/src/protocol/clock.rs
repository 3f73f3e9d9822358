// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Clock synchronization commands (`AppTimeReq` / `AppTimeAns`).

use super::{check_len, check_opcode, CommandError, OPCODE_APP_TIME};

/// Uplink clock-sync request sent by a device on port 202.
///
/// # Wire Format
///
/// ```text
/// B0    opcode (0x01)
/// B1-4  DeviceTime (LE), unused on the server side
/// B5    Param: bit 4 AnsRequired, bits 0-3 TokenReq
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppTimeReq {
    /// Device-reported time; carried but not interpreted by the server.
    pub device_time: u32,
    /// Whether the device expects an `AppTimeAns`.
    pub ans_required: bool,
    /// Request token, echoed in the answer.
    pub token: u8,
}

impl AppTimeReq {
    const LEN: usize = 6;

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; Self::LEN];
        buf[0] = OPCODE_APP_TIME;
        buf[1..5].copy_from_slice(&self.device_time.to_le_bytes());
        buf[5] = (u8::from(self.ans_required) << 4) | (self.token & 0x0F);
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self, CommandError> {
        check_opcode(OPCODE_APP_TIME, data)?;
        check_len(OPCODE_APP_TIME, Self::LEN, data)?;
        Ok(Self {
            device_time: u32::from_le_bytes([data[1], data[2], data[3], data[4]]),
            ans_required: data[5] & 0x10 != 0,
            token: data[5] & 0x0F,
        })
    }
}

/// Downlink time-correction reply.
///
/// # Wire Format
///
/// ```text
/// B0    opcode (0x01)
/// B1-4  TimeCorrection (LE), seconds since the GPS epoch mod 2^32
/// B5    Param: bits 0-3 TokenAns, bits 4-7 RFU
/// ```
///
/// The token MUST echo the request's `TokenReq`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppTimeAns {
    /// Seconds since 1980-01-06T00:00:00Z, wrapping at `2^32`.
    pub time_correction: u32,
    /// Echo of the request token, low nibble.
    pub token: u8,
}

impl AppTimeAns {
    const LEN: usize = 6;

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; Self::LEN];
        buf[0] = OPCODE_APP_TIME;
        buf[1..5].copy_from_slice(&self.time_correction.to_le_bytes());
        buf[5] = self.token & 0x0F;
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self, CommandError> {
        check_opcode(OPCODE_APP_TIME, data)?;
        check_len(OPCODE_APP_TIME, Self::LEN, data)?;
        Ok(Self {
            time_correction: u32::from_le_bytes([data[1], data[2], data[3], data[4]]),
            token: data[5] & 0x0F,
        })
    }
}
