// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! MQTT uplink source.
//!
//! Subscribes to the network server's uplink topic for one application and
//! forwards decoded events into a channel mailbox. A dedicated background
//! thread drives the MQTT event loop; [`UplinkSource::wait_for_message`] is
//! a blocking receive on the channel, so the consumer parks on a real
//! notification primitive instead of polling a shared slot.
//!
//! ```text
//! +--------------------------------------------------------+
//! |                 Driver thread (sync)                   |
//! |   wait_for_message() <- channel rx (blocking recv)     |
//! +-----------------------------^--------------------------+
//!                               |
//! +-----------------------------+--------------------------+
//! |              "fuota-mqtt" thread                       |
//! |   MQTT event loop -> JSON decode -> base64 -> tx.send  |
//! +--------------------------------------------------------+
//! ```
//!
//! Malformed events are logged and dropped here; the state machines only
//! ever see well-formed [`UplinkEvent`]s.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use crossbeam::channel::{unbounded, Receiver, Sender};
use rumqttc::{Client, Event, MqttOptions, Packet, QoS};
use serde::Deserialize;

use super::{TransportError, UplinkEvent, UplinkSource};

const KEEP_ALIVE: Duration = Duration::from_secs(60);
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Uplink event source backed by an MQTT subscription.
pub struct MqttUplinkSource {
    client: Client,
    rx: Receiver<UplinkEvent>,
}

#[derive(Debug, Deserialize)]
struct UpEvent {
    #[serde(rename = "deviceInfo")]
    device_info: DeviceInfo,
    #[serde(rename = "fPort", default)]
    f_port: u8,
    #[serde(default)]
    data: String,
}

#[derive(Debug, Deserialize)]
struct DeviceInfo {
    #[serde(rename = "devEui")]
    dev_eui: String,
}

fn parse_up_event(payload: &[u8]) -> Result<UplinkEvent, TransportError> {
    let event: UpEvent =
        serde_json::from_slice(payload).map_err(|e| TransportError::Json(e.to_string()))?;
    let data = BASE64
        .decode(event.data.as_bytes())
        .map_err(|e| TransportError::Json(format!("bad base64 data field: {}", e)))?;
    Ok(UplinkEvent {
        dev_eui: event.device_info.dev_eui,
        f_port: event.f_port,
        data,
    })
}

fn event_loop(mut connection: rumqttc::Connection, tx: Sender<UplinkEvent>) {
    for event in connection.iter() {
        match event {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                match parse_up_event(&publish.payload) {
                    Ok(uplink) => {
                        log::debug!(
                            "[MQTT] uplink from {} on port {} ({} bytes)",
                            uplink.dev_eui,
                            uplink.f_port,
                            uplink.data.len()
                        );
                        if tx.send(uplink).is_err() {
                            // Consumer dropped the source.
                            break;
                        }
                    }
                    Err(e) => {
                        log::warn!("[MQTT] dropping event on {}: {}", publish.topic, e);
                    }
                }
            }
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                log::debug!("[MQTT] connected with result code {:?}", ack.code);
            }
            Ok(_) => {}
            Err(e) => {
                log::warn!("[MQTT] connection error: {}", e);
                std::thread::sleep(RECONNECT_DELAY);
            }
        }
    }
    log::debug!("[MQTT] event loop stopped");
}

impl MqttUplinkSource {
    /// Connect to the broker and start the background event loop.
    ///
    /// `name` identifies the connecting service in broker-side client lists;
    /// the process id is appended to keep the client id unique.
    pub fn connect(name: &str, host: &str, port: u16) -> Result<Self, TransportError> {
        let client_id = format!("{}-{}", name, std::process::id());
        let mut options = MqttOptions::new(client_id, host, port);
        options.set_keep_alive(KEEP_ALIVE);

        let (client, connection) = Client::new(options, 16);
        let (tx, rx) = unbounded();

        std::thread::Builder::new()
            .name("fuota-mqtt".to_string())
            .spawn(move || event_loop(connection, tx))
            .map_err(|e| TransportError::Broker(format!("failed to spawn event loop: {}", e)))?;

        Ok(Self { client, rx })
    }

    /// Subscribe to every device uplink of one application.
    pub fn subscribe_application(&self, application_id: &str) -> Result<(), TransportError> {
        let topic = format!("application/{}/device/+/event/up", application_id);
        log::debug!("[MQTT] subscribe to {}", topic);
        self.client
            .subscribe(topic, QoS::AtMostOnce)
            .map_err(|e| TransportError::Broker(e.to_string()))
    }
}

impl UplinkSource for MqttUplinkSource {
    fn wait_for_message(&self) -> Result<UplinkEvent, TransportError> {
        self.rx.recv().map_err(|_| TransportError::Disconnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_up_event() {
        let payload = br#"{
            "deviceInfo": {"devEui": "ac1f09fffe071978", "deviceName": "node-1"},
            "fPort": 202,
            "data": "AgA="
        }"#;
        let event = parse_up_event(payload).unwrap();
        assert_eq!(event.dev_eui, "ac1f09fffe071978");
        assert_eq!(event.f_port, 202);
        assert_eq!(event.data, vec![0x02, 0x00]);
    }

    #[test]
    fn test_parse_up_event_without_payload() {
        // Join/status events carry no data field; they decode to empty bytes.
        let payload = br#"{"deviceInfo": {"devEui": "0000000000000001"}}"#;
        let event = parse_up_event(payload).unwrap();
        assert_eq!(event.f_port, 0);
        assert!(event.data.is_empty());
    }

    #[test]
    fn test_parse_up_event_rejects_garbage() {
        assert!(matches!(
            parse_up_event(b"not json"),
            Err(TransportError::Json(_))
        ));
        assert!(matches!(
            parse_up_event(br#"{"deviceInfo": {"devEui": "x"}, "data": "%%%"}"#),
            Err(TransportError::Json(_))
        ));
    }
}
