// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! End-to-end demo gateway: wires RSFP, the CAN facade, HPAP and the
//! data-point engine together over an in-memory loopback link to a
//! scripted firmware stand-in, so the whole stack can be exercised
//! without real hardware.

mod bridge;
mod defs_table;
mod firmware;
mod log;
mod loopback;
mod storage;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use ehp_core::can::{Config as FacadeConfig, Mode as CanMode};
use ehp_core::convert::ConversionRegistry;
use ehp_core::datetime::{
    DateTimeSource, DATETIME_DAY_ID, DATETIME_HOUR_ID, DATETIME_MINUTE_ID, DATETIME_MONTH_ID,
    DATETIME_YEAR_ID,
};
use ehp_core::dpe::{
    self, CaptureMode, DataPointEngine, DataPointKey, SUBSCRIPTIONS_HEADER, SUBSCRIPTIONS_PATH,
    WRITABLES_HEADER, WRITABLES_PATH,
};
use ehp_core::hpap::{DeviceId, DeviceType, Dispatcher, MessageKind};
use ehp_core::platform::{Monotonic, NoYield};

use bridge::Bridge;
use defs_table::{OUTSIDE_TEMPERATURE_ID, ROOM_SET_TEMPERATURE_DAY_ID};
use firmware::Firmware;
use log::TracingLog;
use storage::FsStorage;

const DATETIME_IDS: [u16; 5] =
    [DATETIME_DAY_ID, DATETIME_MONTH_ID, DATETIME_YEAR_ID, DATETIME_HOUR_ID, DATETIME_MINUTE_ID];

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BusMode {
    Nor,
    Lis,
}

impl From<BusMode> for CanMode {
    fn from(mode: BusMode) -> Self {
        match mode {
            BusMode::Nor => CanMode::Normal,
            BusMode::Lis => CanMode::ListenOnly,
        }
    }
}

/// Run a loopback heat-pump gateway demo against a scripted firmware peer.
#[derive(Debug, Parser)]
#[command(name = "ehp-bridge", version, about)]
struct Args {
    /// Bus bitrate reported in the SETUP handshake.
    #[arg(long, default_value_t = 20_000)]
    bitrate: u32,

    /// Bus access mode requested of the co-processor.
    #[arg(long, value_enum, default_value_t = BusMode::Nor)]
    mode: BusMode,

    /// Number of maintenance ticks to run before exiting.
    #[arg(long, default_value_t = 60)]
    ticks: u64,

    /// Milliseconds of simulated monotonic time advanced per tick.
    #[arg(long, default_value_t = 250)]
    tick_ms: u64,

    /// Directory to persist subscriptions/writables between runs. Without
    /// this the demo seeds its two hardcoded data points every run.
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Debug, Error)]
enum DemoError {
    #[error("failed to open state directory: {0}")]
    Storage(#[from] std::io::Error),
    #[error("failed to persist data points: {0}")]
    Persistence(#[from] ehp_core::Error),
}

fn init_tracing(log_level: &str) {
    let default_level = log_level.parse().unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(default_level.into()))
        .init();
}

fn run(args: Args) -> Result<(), DemoError> {
    let gateway_id = DeviceId::exact(DeviceType::Display, 0x01);
    let system_id = DeviceId::exact(DeviceType::System, 0);
    let heating_circuit_id = DeviceId::exact(DeviceType::HeatingCircuit, 1);

    let (gateway_port, firmware_port) = loopback::pair();
    let mut bridge = Bridge::new(
        gateway_port,
        FacadeConfig { mode: args.mode.into(), bitrate: args.bitrate, ..FacadeConfig::default() },
    );
    let mut firmware = Firmware::new(firmware_port, heating_circuit_id);

    let mut dispatcher = Dispatcher::new();
    let mut registry = ConversionRegistry::new();
    let repo = defs_table::seed(&mut registry);
    let mut date_time = DateTimeSource::new();
    let mut engine = DataPointEngine::new(CaptureMode::Configured, false, gateway_id);

    let mut storage = args.state_dir.as_ref().map(|dir| FsStorage::new(dir.clone())).transpose()?;
    if let Some(storage) = &storage {
        for key in dpe::load_keys(storage, SUBSCRIPTIONS_PATH, SUBSCRIPTIONS_HEADER) {
            engine.add_subscription(key, &repo);
        }
        for key in dpe::load_keys(storage, WRITABLES_PATH, WRITABLES_HEADER) {
            engine.add_writable(key, &repo);
        }
    }
    if engine.entries().next().is_none() {
        engine.add_subscription(DataPointKey::new(system_id, OUTSIDE_TEMPERATURE_ID), &repo);
        engine.add_writable(
            DataPointKey::new(heating_circuit_id, ROOM_SET_TEMPERATURE_DAY_ID),
            &repo,
        );
    }

    let update_log_registry = registry.clone();
    engine.on_update(Box::new(move |key, entry| {
        match update_log_registry.to_json(entry.definition.codec_id, entry.definition.converter_id, entry.raw_value) {
            Ok(value) => {
                tracing::info!(device = ?key.device_id, value_id = key.value_id, %value, "data point updated")
            }
            Err(e) => {
                tracing::warn!(value_id = key.value_id, error = %e, "data point updated with undecodable value")
            }
        }
    }));

    let mut gateway_log = TracingLog;
    let mut firmware_log = TracingLog;
    let mut now: Monotonic = 0;

    for _ in 0..args.ticks {
        bridge.set_now(now);
        firmware.tick(now, &mut firmware_log);

        for msg in bridge.poll(&mut gateway_log) {
            if matches!(msg.kind, MessageKind::Response | MessageKind::Write) {
                if DATETIME_IDS.contains(&msg.value_id) {
                    let definition = repo.get(msg.value_id);
                    if let Some(codec) = registry.codec_for_id(definition.codec_id) {
                        date_time.on_sample(msg.value_id, codec.decode(msg.value) as u16, now);
                    }
                }
                engine.on_sample(&msg, now, &date_time, &repo);
            }
            dispatcher.dispatch(msg, now);
        }

        engine.maintenance_tick(now, &mut dispatcher, &mut bridge, &mut NoYield);

        for value_id in date_time.fields_needing_request(now) {
            let _ = dispatcher.request(&gateway_id, &system_id, value_id, &mut bridge);
        }

        now += args.tick_ms;
    }

    if let Some(storage) = &mut storage {
        let subscribed: Vec<_> = engine.iter_filtered(|_, e| e.subscribed).map(|(k, _)| *k).collect();
        let writable: Vec<_> = engine.iter_filtered(|_, e| e.writable).map(|(k, _)| *k).collect();
        dpe::save_keys(storage, SUBSCRIPTIONS_PATH, SUBSCRIPTIONS_HEADER, &subscribed, &mut NoYield)?;
        dpe::save_keys(storage, WRITABLES_PATH, WRITABLES_HEADER, &writable, &mut NoYield)?;
    }

    tracing::info!(ready = bridge.facade().ready(), "demo run complete");
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(&args.log_level);
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "demo run failed");
            ExitCode::FAILURE
        }
    }
}
