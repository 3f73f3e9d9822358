// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Application-layer command frames.
//!
//! Every frame starts with a one-byte opcode followed by a bit-packed
//! parameter block. The same opcode value names a request in one direction
//! and the matching answer in the other, so decoding always dispatches on
//! opcode *and* direction:
//!
//! | Opcode | Downlink | Uplink |
//! |--------|----------|--------|
//! | `0x01` | [`AppTimeAns`] | [`AppTimeReq`] |
//! | `0x02` | [`FragSessionSetupReq`] | [`FragSessionSetupAns`] |
//! | `0x03` | [`FragSessionDeleteReq`] | [`FragSessionDeleteAns`] |
//! | `0x08` | [`DataFragment`] | - |
//!
//! Multi-byte integers are little-endian, with one frozen exception: the
//! [`DataFragment`] ordinal travels big-endian (see its module docs).

mod clock;
mod frag;

pub use clock::{AppTimeAns, AppTimeReq};
pub use frag::{
    DataFragment, FragSessionDeleteAns, FragSessionDeleteReq, FragSessionSetupAns,
    FragSessionSetupReq,
};

/// Opcode shared by `AppTimeReq` (uplink) and `AppTimeAns` (downlink).
pub const OPCODE_APP_TIME: u8 = 0x01;
/// Opcode shared by `FragSessionSetupReq` and `FragSessionSetupAns`.
pub const OPCODE_FRAG_SESSION_SETUP: u8 = 0x02;
/// Opcode shared by `FragSessionDeleteReq` and `FragSessionDeleteAns`.
pub const OPCODE_FRAG_SESSION_DELETE: u8 = 0x03;
/// Opcode of the downlink-only `DataFragment`.
pub const OPCODE_DATA_FRAGMENT: u8 = 0x08;

/// Errors raised while decoding a command frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// The frame carried no bytes at all.
    Empty,
    /// The opcode byte is not assigned in this direction.
    UnknownOpcode(u8),
    /// A typed `decode` was handed a frame with a different opcode.
    UnexpectedOpcode { expected: u8, found: u8 },
    /// The frame is shorter than the opcode's fixed layout.
    Truncated { opcode: u8, need: usize, got: usize },
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "empty frame"),
            Self::UnknownOpcode(op) => write!(f, "unknown opcode 0x{:02X}", op),
            Self::UnexpectedOpcode { expected, found } => write!(
                f,
                "unexpected opcode 0x{:02X} (expected 0x{:02X})",
                found, expected
            ),
            Self::Truncated { opcode, need, got } => write!(
                f,
                "truncated frame for opcode 0x{:02X}: need {} bytes, got {}",
                opcode, need, got
            ),
        }
    }
}

impl std::error::Error for CommandError {}

/// A decoded command frame, tagged by opcode and direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Device-initiated clock-sync request (uplink).
    AppTimeReq(AppTimeReq),
    /// Server time-correction reply (downlink).
    AppTimeAns(AppTimeAns),
    /// Fragmentation session setup (downlink).
    FragSessionSetupReq(FragSessionSetupReq),
    /// Device answer to the session setup (uplink).
    FragSessionSetupAns(FragSessionSetupAns),
    /// Fragmentation session teardown (downlink).
    FragSessionDeleteReq(FragSessionDeleteReq),
    /// Device answer to the teardown (uplink).
    FragSessionDeleteAns(FragSessionDeleteAns),
    /// One coded or uncoded fragment (downlink).
    DataFragment(DataFragment),
}

impl Command {
    /// Opcode byte of this command.
    pub fn opcode(&self) -> u8 {
        match self {
            Self::AppTimeReq(_) | Self::AppTimeAns(_) => OPCODE_APP_TIME,
            Self::FragSessionSetupReq(_) | Self::FragSessionSetupAns(_) => {
                OPCODE_FRAG_SESSION_SETUP
            }
            Self::FragSessionDeleteReq(_) | Self::FragSessionDeleteAns(_) => {
                OPCODE_FRAG_SESSION_DELETE
            }
            Self::DataFragment(_) => OPCODE_DATA_FRAGMENT,
        }
    }

    /// Serialize this command to wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::AppTimeReq(c) => c.encode(),
            Self::AppTimeAns(c) => c.encode(),
            Self::FragSessionSetupReq(c) => c.encode(),
            Self::FragSessionSetupAns(c) => c.encode(),
            Self::FragSessionDeleteReq(c) => c.encode(),
            Self::FragSessionDeleteAns(c) => c.encode(),
            Self::DataFragment(c) => c.encode(),
        }
    }

    /// Decode a frame received *from* a device.
    pub fn decode_uplink(data: &[u8]) -> Result<Self, CommandError> {
        match data.first() {
            None => Err(CommandError::Empty),
            Some(&OPCODE_APP_TIME) => AppTimeReq::decode(data).map(Self::AppTimeReq),
            Some(&OPCODE_FRAG_SESSION_SETUP) => {
                FragSessionSetupAns::decode(data).map(Self::FragSessionSetupAns)
            }
            Some(&OPCODE_FRAG_SESSION_DELETE) => {
                FragSessionDeleteAns::decode(data).map(Self::FragSessionDeleteAns)
            }
            Some(&op) => Err(CommandError::UnknownOpcode(op)),
        }
    }

    /// Decode a frame sent *to* a device.
    pub fn decode_downlink(data: &[u8]) -> Result<Self, CommandError> {
        match data.first() {
            None => Err(CommandError::Empty),
            Some(&OPCODE_APP_TIME) => AppTimeAns::decode(data).map(Self::AppTimeAns),
            Some(&OPCODE_FRAG_SESSION_SETUP) => {
                FragSessionSetupReq::decode(data).map(Self::FragSessionSetupReq)
            }
            Some(&OPCODE_FRAG_SESSION_DELETE) => {
                FragSessionDeleteReq::decode(data).map(Self::FragSessionDeleteReq)
            }
            Some(&OPCODE_DATA_FRAGMENT) => DataFragment::decode(data).map(Self::DataFragment),
            Some(&op) => Err(CommandError::UnknownOpcode(op)),
        }
    }
}

pub(crate) fn check_len(opcode: u8, need: usize, data: &[u8]) -> Result<(), CommandError> {
    if data.len() < need {
        return Err(CommandError::Truncated {
            opcode,
            need,
            got: data.len(),
        });
    }
    Ok(())
}

pub(crate) fn check_opcode(expected: u8, data: &[u8]) -> Result<(), CommandError> {
    match data.first() {
        None => Err(CommandError::Empty),
        Some(&op) if op == expected => Ok(()),
        Some(&op) => Err(CommandError::UnexpectedOpcode {
            expected,
            found: op,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_uplink_rejects_empty_and_unknown() {
        assert_eq!(Command::decode_uplink(&[]), Err(CommandError::Empty));
        assert_eq!(
            Command::decode_uplink(&[0x7F, 0x00]),
            Err(CommandError::UnknownOpcode(0x7F))
        );
    }

    #[test]
    fn test_decode_downlink_rejects_unknown() {
        assert_eq!(
            Command::decode_downlink(&[0x09]),
            Err(CommandError::UnknownOpcode(0x09))
        );
    }

    #[test]
    fn test_downlink_frames_round_trip() {
        let frames = [
            Command::FragSessionSetupReq(FragSessionSetupReq {
                session_id: 1,
                group_mask: 2,
                nb_frag: 300,
                frag_size: 20,
                padding: 15,
            }),
            Command::FragSessionDeleteReq(FragSessionDeleteReq { session_id: 3 }),
            Command::DataFragment(DataFragment {
                session_id: 2,
                ordinal: 1000,
                payload: vec![0xAA; 20],
            }),
            Command::AppTimeAns(AppTimeAns {
                time_correction: 100,
                token: 5,
            }),
        ];
        for frame in frames {
            let bytes = frame.encode();
            assert_eq!(Command::decode_downlink(&bytes).unwrap(), frame);
            assert_eq!(bytes[0], frame.opcode());
        }
    }

    #[test]
    fn test_uplink_frames_round_trip() {
        let frames = [
            Command::AppTimeReq(AppTimeReq {
                device_time: 42,
                ans_required: true,
                token: 5,
            }),
            Command::FragSessionSetupAns(FragSessionSetupAns {
                encoding_not_supported: false,
                not_enough_memory: true,
                frag_session_index_not_supported: false,
                wrong_descriptor: false,
                frag_index: 1,
            }),
            Command::FragSessionDeleteAns(FragSessionDeleteAns {
                session_does_not_exist: true,
                frag_index: 0,
            }),
        ];
        for frame in frames {
            let bytes = frame.encode();
            assert_eq!(Command::decode_uplink(&bytes).unwrap(), frame);
        }
    }
}
