// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Clock Synchronization Server
//!
//! Answers `AppTimeReq` uplinks from one LoRaWAN end-device with the
//! server's seconds since the GPS epoch, echoing the request token. Runs
//! until interrupted.
//!
//! # Usage
//!
//! ```bash
//! export SERVER=chirpstack.local
//! export API_TOKEN=...
//!
//! fuota-time-server --deveui ac1f09fffe071978 --terminal
//! ```
//!
//! Exit codes: 1 missing credentials or invalid flags, 3 unrecoverable
//! transport error. The responder has no clean shutdown of its own.

use std::path::PathBuf;
use std::process;

use clap::Parser;

use fuota::logging::{self, LogOptions};
use fuota::session::{is_valid_dev_eui, ClockSyncConfig, ClockSyncResponder, DownlinkTarget};
use fuota::transport::{ChirpStackClient, MqttUplinkSource};
use fuota::ServerContext;

const EXIT_CONFIG: i32 = 1;
const EXIT_TRANSPORT: i32 = 3;

/// Clock synchronization server - answers device time requests
#[derive(Parser, Debug)]
#[command(name = "fuota-time-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Downlink application port
    #[arg(long, default_value_t = 202)]
    lora_port: u8,

    /// Uplink broker port
    #[arg(long, default_value_t = 8583)]
    mqtt_port: u16,

    /// Control-plane API port
    #[arg(long, default_value_t = 8580)]
    grpc_port: u16,

    /// Target device EUI (16 hex characters)
    #[arg(long)]
    deveui: String,

    /// Use multicast instead of unicast
    #[arg(long)]
    multi: bool,

    /// Mirror logs to stdout
    #[arg(long)]
    terminal: bool,

    /// Log directory
    #[arg(long, default_value = ".")]
    log: PathBuf,
}

fn main() {
    let args = Args::parse();

    if !is_valid_dev_eui(&args.deveui) {
        eprintln!(
            "device EUI must be 16 hex characters, got '{}'",
            args.deveui
        );
        process::exit(EXIT_CONFIG);
    }

    if let Err(e) = logging::init(&LogOptions {
        directory: args.log.clone(),
        terminal: args.terminal,
        ..Default::default()
    }) {
        eprintln!("failed to initialize logging: {}", e);
        process::exit(EXIT_CONFIG);
    }

    let context = match ServerContext::from_env() {
        Ok(context) => context,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(EXIT_CONFIG);
        }
    };

    log::info!(
        "[CLOCK-SYNC] server {} | device {}",
        context.server,
        args.deveui
    );

    let control = match ChirpStackClient::new(&context, args.grpc_port) {
        Ok(control) => control,
        Err(e) => fatal_transport(&e),
    };
    let bootstrap = match control.bootstrap(&args.deveui) {
        Ok(bootstrap) => bootstrap,
        Err(e) => fatal_transport(&e),
    };

    let target = if args.multi {
        match bootstrap.multicast_group_id {
            Some(group_id) => DownlinkTarget::Multicast(group_id),
            None => {
                eprintln!("--multi requested but the application has no multicast group");
                process::exit(EXIT_CONFIG);
            }
        }
    } else {
        DownlinkTarget::Unicast
    };

    let uplinks =
        match MqttUplinkSource::connect("fuota-time-server", &context.server, args.mqtt_port) {
            Ok(uplinks) => uplinks,
            Err(e) => fatal_transport(&e),
        };
    if let Err(e) = uplinks.subscribe_application(&bootstrap.application_id) {
        fatal_transport(&e);
    }

    let config = ClockSyncConfig {
        dev_eui: args.deveui,
        lora_port: args.lora_port,
        target,
    };

    let mut responder = ClockSyncResponder::new(config, &control, &uplinks);
    // The responder only returns on a transport failure.
    if let Err(e) = responder.run() {
        fatal_transport(&e);
    }
}

fn fatal_transport(e: &fuota::transport::TransportError) -> ! {
    log::error!("[CLOCK-SYNC] {}", e);
    eprintln!("{}", e);
    process::exit(EXIT_TRANSPORT);
}
