// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! End-to-end tests for the FUOTA driver and the clock-sync responder over
//! in-memory transports.

use std::collections::VecDeque;
use std::sync::Mutex;

use fuota::protocol::{
    AppTimeReq, Command, FragSessionDeleteAns, FragSessionSetupAns,
};
use fuota::session::{
    ClockSyncConfig, ClockSyncResponder, DownlinkTarget, FuotaConfig, FuotaDriver, Phase,
    SessionErrorKind, SetupRefusal, MAX_SPURIOUS_UPLINKS,
};
use fuota::transport::{DownlinkQueue, TransportError, UplinkEvent, UplinkSource};
use fuota::Fragmenter;

const DEV_EUI: &str = "ac1f09fffe071978";
const OTHER_EUI: &str = "0000000000000001";
const LORA_PORT: u8 = 201;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Sent {
    Unicast {
        dev_eui: String,
        port: u8,
        data: Vec<u8>,
    },
    Multicast {
        group_id: String,
        port: u8,
        data: Vec<u8>,
    },
}

impl Sent {
    fn data(&self) -> &[u8] {
        match self {
            Self::Unicast { data, .. } | Self::Multicast { data, .. } => data,
        }
    }
}

#[derive(Default)]
struct RecordingQueue {
    sent: Mutex<Vec<Sent>>,
}

impl RecordingQueue {
    fn take(&self) -> Vec<Sent> {
        std::mem::take(&mut self.sent.lock().unwrap())
    }
}

impl DownlinkQueue for RecordingQueue {
    fn enqueue_unicast(
        &self,
        dev_eui: &str,
        port: u8,
        data: &[u8],
    ) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push(Sent::Unicast {
            dev_eui: dev_eui.to_string(),
            port,
            data: data.to_vec(),
        });
        Ok(())
    }

    fn enqueue_multicast(
        &self,
        group_id: &str,
        port: u8,
        data: &[u8],
    ) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push(Sent::Multicast {
            group_id: group_id.to_string(),
            port,
            data: data.to_vec(),
        });
        Ok(())
    }
}

struct ScriptedUplinks {
    events: Mutex<VecDeque<UplinkEvent>>,
}

impl ScriptedUplinks {
    fn new(events: Vec<UplinkEvent>) -> Self {
        Self {
            events: Mutex::new(events.into()),
        }
    }
}

impl UplinkSource for ScriptedUplinks {
    fn wait_for_message(&self) -> Result<UplinkEvent, TransportError> {
        self.events
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(TransportError::Disconnected)
    }
}

fn uplink(dev_eui: &str, f_port: u8, data: Vec<u8>) -> UplinkEvent {
    UplinkEvent {
        dev_eui: dev_eui.to_string(),
        f_port,
        data,
    }
}

fn setup_ok() -> UplinkEvent {
    uplink(
        DEV_EUI,
        LORA_PORT,
        FragSessionSetupAns {
            encoding_not_supported: false,
            not_enough_memory: false,
            frag_session_index_not_supported: false,
            wrong_descriptor: false,
            frag_index: 0,
        }
        .encode(),
    )
}

fn delete_ok() -> UplinkEvent {
    uplink(
        DEV_EUI,
        LORA_PORT,
        FragSessionDeleteAns {
            session_does_not_exist: false,
            frag_index: 0,
        }
        .encode(),
    )
}

fn config(target: DownlinkTarget) -> FuotaConfig {
    FuotaConfig {
        dev_eui: DEV_EUI.to_string(),
        lora_port: LORA_PORT,
        session_id: 0,
        group_mask: 0,
        frag_size: 20,
        redundancy: 5,
        target,
    }
}

#[test]
fn happy_path_emits_the_full_frame_sequence() {
    let image: Vec<u8> = (0u8..45).collect();
    let downlink = RecordingQueue::default();
    let uplinks = ScriptedUplinks::new(vec![setup_ok(), delete_ok()]);

    let mut driver = FuotaDriver::new(config(DownlinkTarget::Unicast), &downlink, &uplinks);
    driver.run(&image, None).unwrap();
    assert_eq!(driver.phase(), Phase::Done);

    let sent = downlink.take();
    // Setup + 2N fragments + delete.
    assert_eq!(sent.len(), 1 + 6 + 1);
    for frame in &sent {
        match frame {
            Sent::Unicast { dev_eui, port, .. } => {
                assert_eq!(dev_eui, DEV_EUI);
                assert_eq!(*port, LORA_PORT);
            }
            Sent::Multicast { .. } => panic!("unicast session sent a multicast frame"),
        }
    }

    // Every emitted frame decodes back to its request.
    let setup = match Command::decode_downlink(sent[0].data()).unwrap() {
        Command::FragSessionSetupReq(req) => req,
        other => panic!("expected setup request, got {:?}", other),
    };
    assert_eq!(setup.nb_frag, 6);
    assert_eq!(setup.frag_size, 20);
    assert_eq!(setup.padding, 15);

    let reference = Fragmenter::new(&image, 20).unwrap();
    for (i, frame) in sent[1..7].iter().enumerate() {
        match Command::decode_downlink(frame.data()).unwrap() {
            Command::DataFragment(frag) => {
                assert_eq!(frag.session_id, 0);
                assert_eq!(frag.ordinal as usize, i + 1);
                assert_eq!(frag.payload, reference.fragment(i + 1).unwrap());
            }
            other => panic!("expected data fragment, got {:?}", other),
        }
    }

    match Command::decode_downlink(sent[7].data()).unwrap() {
        Command::FragSessionDeleteReq(req) => assert_eq!(req.session_id, 0),
        other => panic!("expected delete request, got {:?}", other),
    }
}

#[test]
fn multicast_session_addresses_the_group() {
    let downlink = RecordingQueue::default();
    let uplinks = ScriptedUplinks::new(vec![setup_ok(), delete_ok()]);

    let mut driver = FuotaDriver::new(
        config(DownlinkTarget::Multicast("group-1".to_string())),
        &downlink,
        &uplinks,
    );
    driver.run(&[1u8; 40], None).unwrap();

    for frame in downlink.take() {
        match frame {
            Sent::Multicast { group_id, .. } => assert_eq!(group_id, "group-1"),
            Sent::Unicast { .. } => panic!("multicast session sent a unicast frame"),
        }
    }
}

#[test]
fn answers_from_other_devices_are_skipped() {
    let refusing = FragSessionSetupAns {
        encoding_not_supported: true,
        not_enough_memory: true,
        frag_session_index_not_supported: false,
        wrong_descriptor: false,
        frag_index: 0,
    }
    .encode();

    let downlink = RecordingQueue::default();
    let uplinks = ScriptedUplinks::new(vec![
        // A foreign device refusing must not affect this session.
        uplink(OTHER_EUI, LORA_PORT, refusing.clone()),
        setup_ok(),
        uplink(OTHER_EUI, LORA_PORT, refusing),
        delete_ok(),
    ]);

    let mut driver = FuotaDriver::new(config(DownlinkTarget::Unicast), &downlink, &uplinks);
    driver.run(&[7u8; 10], None).unwrap();
}

#[test]
fn setup_refusal_is_fatal_with_phase() {
    let downlink = RecordingQueue::default();
    let uplinks = ScriptedUplinks::new(vec![uplink(
        DEV_EUI,
        LORA_PORT,
        FragSessionSetupAns {
            encoding_not_supported: false,
            not_enough_memory: true,
            frag_session_index_not_supported: false,
            wrong_descriptor: false,
            frag_index: 0,
        }
        .encode(),
    )]);

    let mut driver = FuotaDriver::new(config(DownlinkTarget::Unicast), &downlink, &uplinks);
    let err = driver.run(&[7u8; 10], None).unwrap_err();
    assert_eq!(err.phase, Phase::FragSessionSetupAns);
    assert!(matches!(
        err.kind,
        SessionErrorKind::DeviceRefused(SetupRefusal::NotEnoughMemory)
    ));

    // Nothing beyond the setup request went out.
    assert_eq!(downlink.take().len(), 1);
}

#[test]
fn spurious_uplinks_rewait_then_abort() {
    // A decodable frame with the wrong opcode is spurious but survivable.
    let wrong_opcode = AppTimeReq {
        device_time: 0,
        ans_required: false,
        token: 0,
    }
    .encode();

    let downlink = RecordingQueue::default();
    let uplinks = ScriptedUplinks::new(vec![
        uplink(DEV_EUI, LORA_PORT, wrong_opcode.clone()),
        uplink(DEV_EUI, LORA_PORT, vec![0x7F]),
        setup_ok(),
        delete_ok(),
    ]);
    let mut driver = FuotaDriver::new(config(DownlinkTarget::Unicast), &downlink, &uplinks);
    driver.run(&[7u8; 10], None).unwrap();

    // Once the spurious limit is exhausted the session aborts.
    let spam: Vec<UplinkEvent> = (0..MAX_SPURIOUS_UPLINKS)
        .map(|_| uplink(DEV_EUI, LORA_PORT, wrong_opcode.clone()))
        .collect();
    let uplinks = ScriptedUplinks::new(spam);
    let mut driver = FuotaDriver::new(config(DownlinkTarget::Unicast), &downlink, &uplinks);
    let err = driver.run(&[7u8; 10], None).unwrap_err();
    assert_eq!(err.phase, Phase::FragSessionSetupAns);
    assert!(matches!(
        err.kind,
        SessionErrorKind::TooManySpurious(MAX_SPURIOUS_UPLINKS)
    ));
}

#[test]
fn delete_answer_for_missing_session_still_completes() {
    let downlink = RecordingQueue::default();
    let uplinks = ScriptedUplinks::new(vec![
        setup_ok(),
        uplink(
            DEV_EUI,
            LORA_PORT,
            FragSessionDeleteAns {
                session_does_not_exist: true,
                frag_index: 0,
            }
            .encode(),
        ),
    ]);

    let mut driver = FuotaDriver::new(config(DownlinkTarget::Unicast), &downlink, &uplinks);
    driver.run(&[7u8; 10], None).unwrap();
    assert_eq!(driver.phase(), Phase::Done);
}

#[test]
fn uplink_disconnect_is_a_transport_failure() {
    let downlink = RecordingQueue::default();
    let uplinks = ScriptedUplinks::new(Vec::new());

    let mut driver = FuotaDriver::new(config(DownlinkTarget::Unicast), &downlink, &uplinks);
    let err = driver.run(&[7u8; 10], None).unwrap_err();
    assert_eq!(err.phase, Phase::FragSessionSetupAns);
    assert!(matches!(
        err.kind,
        SessionErrorKind::Transport(TransportError::Disconnected)
    ));
}

fn clock_config() -> ClockSyncConfig {
    ClockSyncConfig {
        dev_eui: DEV_EUI.to_string(),
        lora_port: 202,
        target: DownlinkTarget::Unicast,
    }
}

fn time_request(ans_required: bool, token: u8) -> Vec<u8> {
    AppTimeReq {
        device_time: 0,
        ans_required,
        token,
    }
    .encode()
}

#[test]
fn clock_sync_answers_with_echoed_token() {
    let downlink = RecordingQueue::default();
    let uplinks = ScriptedUplinks::new(vec![uplink(DEV_EUI, 202, time_request(true, 5))]);

    let mut responder = ClockSyncResponder::new(clock_config(), &downlink, &uplinks);
    // The responder only stops when the uplink source closes.
    let err = responder.run().unwrap_err();
    assert!(matches!(err, TransportError::Disconnected));

    let sent = downlink.take();
    assert_eq!(sent.len(), 1);
    let frame = sent[0].data();
    assert_eq!(frame.len(), 6);
    assert_eq!(frame[0], 0x01);
    // Low nibble of the parameter byte echoes the request token.
    assert_eq!(frame[5] & 0x0F, 5);
}

#[test]
fn clock_sync_is_silent_when_no_answer_required() {
    let downlink = RecordingQueue::default();
    let uplinks = ScriptedUplinks::new(vec![uplink(DEV_EUI, 202, time_request(false, 3))]);

    let mut responder = ClockSyncResponder::new(clock_config(), &downlink, &uplinks);
    responder.run().unwrap_err();
    assert!(downlink.take().is_empty());
}

#[test]
fn clock_sync_requires_port_202() {
    let downlink = RecordingQueue::default();
    let uplinks = ScriptedUplinks::new(vec![uplink(DEV_EUI, 201, time_request(true, 5))]);

    let mut responder = ClockSyncResponder::new(clock_config(), &downlink, &uplinks);
    responder.run().unwrap_err();
    assert!(downlink.take().is_empty());
}

#[test]
fn clock_sync_ignores_other_devices() {
    let downlink = RecordingQueue::default();
    let uplinks = ScriptedUplinks::new(vec![uplink(OTHER_EUI, 202, time_request(true, 5))]);

    let mut responder = ClockSyncResponder::new(clock_config(), &downlink, &uplinks);
    responder.run().unwrap_err();
    assert!(downlink.take().is_empty());
}
