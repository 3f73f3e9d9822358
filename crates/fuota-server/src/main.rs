// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! FUOTA Update Server
//!
//! Fragments a firmware image, forward-error-encodes it, and drives the
//! fragmentation session on one LoRaWAN end-device (or a multicast group)
//! through the network server.
//!
//! # Usage
//!
//! ```bash
//! export SERVER=chirpstack.local
//! export API_TOKEN=...
//!
//! # Unicast update with defaults
//! fuota-server --deveui ac1f09fffe071978
//!
//! # Multicast, custom fragment size, logs mirrored to the terminal
//! fuota-server --deveui ac1f09fffe071978 --multi --length 48 --terminal
//! ```
//!
//! Exit codes: 0 clean shutdown, 1 missing credentials or invalid flags,
//! 2 the device refused the session setup, 3 unrecoverable transport or
//! decode error.

use std::path::PathBuf;
use std::process;

use clap::Parser;

use fuota::fragment::sidecar_path;
use fuota::logging::{self, LogOptions};
use fuota::session::{
    is_valid_dev_eui, DownlinkTarget, FuotaConfig, FuotaDriver, SessionErrorKind,
};
use fuota::transport::{ChirpStackClient, MqttUplinkSource};
use fuota::ServerContext;

const EXIT_CONFIG: i32 = 1;
const EXIT_DEVICE_REFUSED: i32 = 2;
const EXIT_TRANSPORT: i32 = 3;

/// FUOTA update server - fragment a firmware image and transfer it over the air
#[derive(Parser, Debug)]
#[command(name = "fuota-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Downlink application port
    #[arg(long, default_value_t = 201)]
    lora_port: u8,

    /// Uplink broker port
    #[arg(long, default_value_t = 8583)]
    mqtt_port: u16,

    /// Control-plane API port
    #[arg(long, default_value_t = 8580)]
    grpc_port: u16,

    /// Multicast group mask (0-15)
    #[arg(long, default_value_t = 0)]
    group: u8,

    /// Target device EUI (16 hex characters)
    #[arg(long)]
    deveui: String,

    /// Input firmware image
    #[arg(long, default_value = "files/Input.bin")]
    input: PathBuf,

    /// Fragmentation session ID (0-3)
    #[arg(long, default_value_t = 0)]
    session: u8,

    /// Fragment size in bytes
    #[arg(long, default_value_t = 20)]
    length: usize,

    /// Fragment redundancy hint
    #[arg(long, default_value_t = 5)]
    redundancy: u8,

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

fn validate_args(args: &Args) -> Result<(), String> {
    if !is_valid_dev_eui(&args.deveui) {
        return Err(format!(
            "device EUI must be 16 hex characters, got '{}'",
            args.deveui
        ));
    }
    if args.session > 3 {
        return Err(format!("session id {} out of range 0..=3", args.session));
    }
    if args.group > 15 {
        return Err(format!("group mask {} out of range 0..=15", args.group));
    }
    if args.length == 0 || args.length > 255 {
        return Err(format!("fragment size {} out of range 1..=255", args.length));
    }
    Ok(())
}

fn main() {
    let args = Args::parse();

    if let Err(msg) = validate_args(&args) {
        eprintln!("{}", msg);
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

    let image = match std::fs::read(&args.input) {
        Ok(image) => image,
        Err(e) => {
            log::error!("[FUOTA] cannot read {}: {}", args.input.display(), e);
            eprintln!("cannot read {}: {}", args.input.display(), e);
            process::exit(EXIT_CONFIG);
        }
    };

    log::info!(
        "[FUOTA] server {} | device {} | input {} ({} bytes)",
        context.server,
        args.deveui,
        args.input.display(),
        image.len()
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
                log::error!("[FUOTA] --multi requested but the application has no multicast group");
                eprintln!("--multi requested but the application has no multicast group");
                process::exit(EXIT_CONFIG);
            }
        }
    } else {
        DownlinkTarget::Unicast
    };

    let uplinks =
        match MqttUplinkSource::connect("fuota-server", &context.server, args.mqtt_port) {
            Ok(uplinks) => uplinks,
            Err(e) => fatal_transport(&e),
        };
    if let Err(e) = uplinks.subscribe_application(&bootstrap.application_id) {
        fatal_transport(&e);
    }

    let config = FuotaConfig {
        dev_eui: args.deveui,
        lora_port: args.lora_port,
        session_id: args.session,
        group_mask: args.group,
        frag_size: args.length,
        redundancy: args.redundancy,
        target,
    };

    let sidecar = sidecar_path(&args.input);
    let mut driver = FuotaDriver::new(config, &control, &uplinks);
    match driver.run(&image, Some(&sidecar)) {
        Ok(()) => log::info!("[FUOTA] clean shutdown"),
        Err(e) => {
            log::error!("[FUOTA] {}", e);
            eprintln!("{}", e);
            let code = match e.kind {
                SessionErrorKind::DeviceRefused(_) => EXIT_DEVICE_REFUSED,
                SessionErrorKind::Fragment(_) | SessionErrorKind::Config(_) => EXIT_CONFIG,
                _ => EXIT_TRANSPORT,
            };
            process::exit(code);
        }
    }
}

fn fatal_transport(e: &fuota::transport::TransportError) -> ! {
    log::error!("[FUOTA] {}", e);
    eprintln!("{}", e);
    process::exit(EXIT_TRANSPORT);
}
