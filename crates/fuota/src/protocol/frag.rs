// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fragmentation transport commands: session setup, data transfer, teardown.

use super::{
    check_len, check_opcode, CommandError, OPCODE_DATA_FRAGMENT, OPCODE_FRAG_SESSION_DELETE,
    OPCODE_FRAG_SESSION_SETUP,
};

/// Downlink request that opens a fragmentation session on the device.
///
/// # Wire Format
///
/// ```text
/// B0    opcode (0x02)
/// B1    FragSession: bits 2-3 FragIndex, bits 0-1 group mask, rest RFU
/// B2-3  NbFrag (LE), total on-air fragments
/// B4    FragSize, payload bytes per fragment
/// B5    Control (0)
/// B6    Padding, zero bytes appended to the last uncoded fragment
/// B7-10 Descriptor (zeros)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragSessionSetupReq {
    /// Session identifier, 0..=3.
    pub session_id: u8,
    /// Participating multicast groups; only the low two bits reach the wire.
    pub group_mask: u8,
    /// Total number of on-air fragments (uncoded + coded).
    pub nb_frag: u16,
    /// Per-fragment payload size in bytes.
    pub frag_size: u8,
    /// Zero bytes appended to the last uncoded fragment.
    pub padding: u8,
}

impl FragSessionSetupReq {
    const LEN: usize = 11;

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; Self::LEN];
        buf[0] = OPCODE_FRAG_SESSION_SETUP;
        buf[1] = ((self.session_id & 0x03) << 2) | (self.group_mask & 0x03);
        buf[2..4].copy_from_slice(&self.nb_frag.to_le_bytes());
        buf[4] = self.frag_size;
        buf[5] = 0; // Control
        buf[6] = self.padding;
        // B7-10: descriptor, all zeros
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self, CommandError> {
        check_opcode(OPCODE_FRAG_SESSION_SETUP, data)?;
        check_len(OPCODE_FRAG_SESSION_SETUP, Self::LEN, data)?;
        Ok(Self {
            session_id: (data[1] >> 2) & 0x03,
            group_mask: data[1] & 0x03,
            nb_frag: u16::from_le_bytes([data[2], data[3]]),
            frag_size: data[4],
            padding: data[6],
        })
    }
}

/// Uplink answer to [`FragSessionSetupReq`].
///
/// Any of the four status bits refuses the session and is fatal for the
/// transfer; `frag_index` echoes the session the device answered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragSessionSetupAns {
    /// Bit 0: the device does not support the erasure encoding.
    pub encoding_not_supported: bool,
    /// Bit 1: the device cannot hold `NbFrag` fragments.
    pub not_enough_memory: bool,
    /// Bit 2: the session index is out of range on the device.
    pub frag_session_index_not_supported: bool,
    /// Bit 3: the descriptor was rejected.
    pub wrong_descriptor: bool,
    /// Bits 6-7: session the answer refers to.
    pub frag_index: u8,
}

impl FragSessionSetupAns {
    const LEN: usize = 2;

    /// True when the device refused the session.
    pub fn refused(&self) -> bool {
        self.encoding_not_supported
            || self.not_enough_memory
            || self.frag_session_index_not_supported
            || self.wrong_descriptor
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut status = 0u8;
        status |= u8::from(self.encoding_not_supported);
        status |= u8::from(self.not_enough_memory) << 1;
        status |= u8::from(self.frag_session_index_not_supported) << 2;
        status |= u8::from(self.wrong_descriptor) << 3;
        status |= (self.frag_index & 0x03) << 6;
        vec![OPCODE_FRAG_SESSION_SETUP, status]
    }

    pub fn decode(data: &[u8]) -> Result<Self, CommandError> {
        check_opcode(OPCODE_FRAG_SESSION_SETUP, data)?;
        check_len(OPCODE_FRAG_SESSION_SETUP, Self::LEN, data)?;
        let status = data[1];
        Ok(Self {
            encoding_not_supported: status & 0x01 != 0,
            not_enough_memory: status & 0x02 != 0,
            frag_session_index_not_supported: status & 0x04 != 0,
            wrong_descriptor: status & 0x08 != 0,
            frag_index: (status >> 6) & 0x03,
        })
    }
}

/// Downlink frame carrying one fragment of the transmission sequence.
///
/// # Wire Format
///
/// ```text
/// B0    opcode (0x08)
/// B1-2  IndexAndN: bits 14-15 session id, bits 0-13 1-based ordinal
/// B3..  FragSize payload bytes
/// ```
///
/// `IndexAndN` is serialized big-endian; every other multi-byte field in
/// this protocol is little-endian. The asymmetry is frozen for wire
/// compatibility with deployed receivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFragment {
    /// Session identifier, 0..=3.
    pub session_id: u8,
    /// 1-based position in the transmission sequence, 14 bits.
    pub ordinal: u16,
    /// Fragment payload bytes.
    pub payload: Vec<u8>,
}

impl DataFragment {
    const MIN_LEN: usize = 3;

    pub fn encode(&self) -> Vec<u8> {
        let index = (u16::from(self.session_id & 0x03) << 14) | (self.ordinal & 0x3FFF);
        let mut buf = Vec::with_capacity(Self::MIN_LEN + self.payload.len());
        buf.push(OPCODE_DATA_FRAGMENT);
        buf.extend_from_slice(&index.to_be_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self, CommandError> {
        check_opcode(OPCODE_DATA_FRAGMENT, data)?;
        check_len(OPCODE_DATA_FRAGMENT, Self::MIN_LEN, data)?;
        let index = u16::from_be_bytes([data[1], data[2]]);
        Ok(Self {
            session_id: (index >> 14) as u8,
            ordinal: index & 0x3FFF,
            payload: data[3..].to_vec(),
        })
    }
}

/// Downlink request that tears the fragmentation session down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragSessionDeleteReq {
    /// Session identifier, bits 0-1 of the parameter byte.
    pub session_id: u8,
}

impl FragSessionDeleteReq {
    const LEN: usize = 2;

    pub fn encode(&self) -> Vec<u8> {
        vec![OPCODE_FRAG_SESSION_DELETE, self.session_id & 0x03]
    }

    pub fn decode(data: &[u8]) -> Result<Self, CommandError> {
        check_opcode(OPCODE_FRAG_SESSION_DELETE, data)?;
        check_len(OPCODE_FRAG_SESSION_DELETE, Self::LEN, data)?;
        Ok(Self {
            session_id: data[1] & 0x03,
        })
    }
}

/// Uplink answer to [`FragSessionDeleteReq`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragSessionDeleteAns {
    /// Bit 2: no such session existed on the device.
    pub session_does_not_exist: bool,
    /// Bits 6-7: session the answer refers to.
    pub frag_index: u8,
}

impl FragSessionDeleteAns {
    const LEN: usize = 2;

    pub fn encode(&self) -> Vec<u8> {
        let mut status = 0u8;
        status |= u8::from(self.session_does_not_exist) << 2;
        status |= (self.frag_index & 0x03) << 6;
        vec![OPCODE_FRAG_SESSION_DELETE, status]
    }

    pub fn decode(data: &[u8]) -> Result<Self, CommandError> {
        check_opcode(OPCODE_FRAG_SESSION_DELETE, data)?;
        check_len(OPCODE_FRAG_SESSION_DELETE, Self::LEN, data)?;
        let status = data[1];
        Ok(Self {
            session_does_not_exist: status & 0x04 != 0,
            frag_index: (status >> 6) & 0x03,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_req_reference_frame() {
        // SessionId=1, GroupMask=2, NbFrag=300, FragSize=20, Padding=15:
        // 02 06 2C 01 14 00 0F 00 00 00 00
        let req = FragSessionSetupReq {
            session_id: 1,
            group_mask: 2,
            nb_frag: 300,
            frag_size: 20,
            padding: 15,
        };
        assert_eq!(
            req.encode(),
            [0x02, 0x06, 0x2C, 0x01, 0x14, 0x00, 0x0F, 0x00, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn test_setup_req_truncated() {
        assert_eq!(
            FragSessionSetupReq::decode(&[0x02, 0x06, 0x2C]),
            Err(CommandError::Truncated {
                opcode: 0x02,
                need: 11,
                got: 3
            })
        );
    }

    #[test]
    fn test_setup_ans_status_bits() {
        let ans = FragSessionSetupAns::decode(&[0x02, 0b0100_0110]).unwrap();
        assert!(!ans.encoding_not_supported);
        assert!(ans.not_enough_memory);
        assert!(ans.frag_session_index_not_supported);
        assert!(!ans.wrong_descriptor);
        assert_eq!(ans.frag_index, 1);
        assert!(ans.refused());

        let clean = FragSessionSetupAns::decode(&[0x02, 0x00]).unwrap();
        assert!(!clean.refused());
    }

    #[test]
    fn test_data_fragment_reference_index() {
        // SessionId=2, n=1000: (2 << 14) | 1000 = 0x87E8, big-endian.
        let frag = DataFragment {
            session_id: 2,
            ordinal: 1000,
            payload: vec![0x11, 0x22],
        };
        assert_eq!(frag.encode(), [0x08, 0x87, 0xE8, 0x11, 0x22]);
    }

    #[test]
    fn test_data_fragment_decode() {
        let frag = DataFragment::decode(&[0x08, 0x87, 0xE8, 0xAB]).unwrap();
        assert_eq!(frag.session_id, 2);
        assert_eq!(frag.ordinal, 1000);
        assert_eq!(frag.payload, vec![0xAB]);
    }

    #[test]
    fn test_data_fragment_needs_index_bytes() {
        assert!(matches!(
            DataFragment::decode(&[0x08, 0x01]),
            Err(CommandError::Truncated { .. })
        ));
    }

    #[test]
    fn test_delete_req_layout() {
        assert_eq!(FragSessionDeleteReq { session_id: 3 }.encode(), [0x03, 0x03]);
        // Session id is masked to two bits.
        assert_eq!(FragSessionDeleteReq { session_id: 7 }.encode(), [0x03, 0x03]);
    }

    #[test]
    fn test_delete_ans_bits() {
        let ans = FragSessionDeleteAns::decode(&[0x03, 0b1000_0100]).unwrap();
        assert!(ans.session_does_not_exist);
        assert_eq!(ans.frag_index, 2);

        let clean = FragSessionDeleteAns::decode(&[0x03, 0x00]).unwrap();
        assert!(!clean.session_does_not_exist);
    }

    #[test]
    fn test_wrong_opcode_is_rejected() {
        assert_eq!(
            FragSessionSetupAns::decode(&[0x03, 0x00]),
            Err(CommandError::UnexpectedOpcode {
                expected: 0x02,
                found: 0x03
            })
        );
    }
}
