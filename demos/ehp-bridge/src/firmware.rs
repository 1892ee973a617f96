// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! A scripted stand-in for the CAN co-processor's firmware: answers
//! `SETUP`, acks `CANTX`, and periodically broadcasts date/time and
//! temperature samples the way the real device family does, so the
//! gateway side of this demo has something genuine to talk to.

use std::collections::HashMap;

use ehp_core::datetime::{
    DATETIME_DAY_ID, DATETIME_HOUR_ID, DATETIME_MINUTE_ID, DATETIME_MONTH_ID, DATETIME_YEAR_ID,
};
use ehp_core::hpap::{self, CanFrame, DeviceId, DeviceType, MessageKind, DISPLAY_BROADCAST_ADDRESS};
use ehp_core::platform::{Log, Monotonic, SerialPort};
use ehp_core::rsfp::{Config as RsfpConfig, Endpoint};

use crate::defs_table::{OUTSIDE_TEMPERATURE_ID, ROOM_SET_TEMPERATURE_DAY_ID};
use crate::loopback::LoopbackPort;

const BROADCAST_INTERVAL_MS: u64 = 2_000;

fn format_canrx(frame: &CanFrame) -> String {
    let mut id = frame.id as u32 & 0x7FF;
    if frame.extended {
        id |= 1 << 31;
    }
    if frame.rtr {
        id |= 1 << 30;
    }
    let mut s = format!("CANRX {:X} {}", id, frame.len);
    for b in &frame.data[..frame.len as usize] {
        s.push(' ');
        s.push_str(&format!("{:02X}", b));
    }
    s
}

fn parse_cantx(line: &str) -> Option<CanFrame> {
    let mut parts = line.split_whitespace();
    if parts.next()? != "CANTX" {
        return None;
    }
    let raw = u32::from_str_radix(parts.next()?, 16).ok()?;
    let len: u8 = parts.next()?.parse().ok()?;
    let extended = raw & (1 << 31) != 0;
    let rtr = raw & (1 << 30) != 0;
    let id = (raw & 0x7FF) as u16;
    let mut data = [0u8; 8];
    for (i, byte_str) in parts.enumerate().take(8) {
        data[i] = u8::from_str_radix(byte_str, 16).ok()?;
    }
    Some(CanFrame { id, extended, rtr, len: len.min(8), data })
}

pub struct Firmware {
    port: LoopbackPort,
    endpoint: Endpoint,
    system_id: DeviceId,
    values: HashMap<(DeviceId, u16), u16>,
    sent_ready: bool,
    setup_acked: bool,
    datetime_fields: Vec<(u16, u16)>,
    datetime_index: usize,
    outside_temp_raw: i32,
    last_broadcast: Monotonic,
}

impl Firmware {
    pub fn new(port: LoopbackPort, heating_circuit_id: DeviceId) -> Self {
        let system_id = DeviceId::exact(DeviceType::System, 0);
        let mut values = HashMap::new();
        values.insert((heating_circuit_id, ROOM_SET_TEMPERATURE_DAY_ID), 215);

        Self {
            port,
            endpoint: Endpoint::new(RsfpConfig::default()),
            system_id,
            values,
            sent_ready: false,
            setup_acked: false,
            // Wire format for these fields is `Unsigned8High`: the value
            // lives in the high byte of the 16-bit payload.
            datetime_fields: vec![
                (DATETIME_DAY_ID, 15 << 8),
                (DATETIME_MONTH_ID, 3 << 8),
                (DATETIME_YEAR_ID, 26 << 8),
                (DATETIME_HOUR_ID, 9 << 8),
                (DATETIME_MINUTE_ID, 0 << 8),
            ],
            datetime_index: 0,
            outside_temp_raw: 34,
            last_broadcast: 0,
        }
    }

    fn handle_line(&mut self, payload: &[u8], now: Monotonic, log: &mut impl Log) {
        let line = String::from_utf8_lossy(payload).into_owned();
        if let Some(rest) = line.strip_prefix("SETUP ") {
            let reply = format!("SETUP OK {rest}");
            let _ = self.endpoint.queue(reply.as_bytes(), now, &mut self.port);
            self.setup_acked = true;
            return;
        }
        if line.starts_with("CANTX") {
            match parse_cantx(&line) {
                Some(frame) => {
                    let ack = format!("CANTX OK {:X}", frame.id);
                    let _ = self.endpoint.queue(ack.as_bytes(), now, &mut self.port);
                    self.apply_outbound(frame, now);
                }
                None => log.warn("firmware: malformed CANTX line"),
            }
            return;
        }
        log.warn(&format!("firmware: unrecognised line from gateway: {line:?}"));
    }

    fn apply_outbound(&mut self, frame: CanFrame, now: Monotonic) {
        let Some(msg) = hpap::decode(&frame) else {
            return;
        };
        if !msg.target.is_exact() {
            return;
        }
        match msg.kind {
            MessageKind::Request => {
                if let Some(&value) = self.values.get(&(msg.target, msg.value_id)) {
                    self.respond(msg.target, msg.source, msg.value_id, value, now);
                }
            }
            MessageKind::Write => {
                self.values.insert((msg.target, msg.value_id), msg.value);
                self.respond(msg.target, msg.source, msg.value_id, msg.value, now);
            }
            _ => {}
        }
    }

    fn respond(&mut self, source: DeviceId, target: DeviceId, value_id: u16, value: u16, now: Monotonic) {
        let frame = hpap::encode(&source, &target, MessageKind::Response, value_id, value);
        let _ = self.endpoint.queue(format_canrx(&frame).as_bytes(), now, &mut self.port);
    }

    /// Broadcast one scheduled sample to the Display address so the
    /// gateway exercises the broadcast-rewrite path as well as ordinary
    /// exact-target responses.
    fn broadcast_next(&mut self, now: Monotonic) {
        let target = DeviceId::exact(DeviceType::Display, DISPLAY_BROADCAST_ADDRESS);
        let (value_id, value) = if self.datetime_index < self.datetime_fields.len() {
            let field = self.datetime_fields[self.datetime_index];
            self.datetime_index += 1;
            field
        } else {
            self.outside_temp_raw += 1;
            (OUTSIDE_TEMPERATURE_ID, self.outside_temp_raw as u16)
        };
        let frame = hpap::encode(&self.system_id, &target, MessageKind::Response, value_id, value);
        let _ = self.endpoint.queue(format_canrx(&frame).as_bytes(), now, &mut self.port);
    }

    pub fn tick(&mut self, now: Monotonic, log: &mut impl Log) {
        let mut buf = [0u8; 256];
        let n = self.port.read(&mut buf);
        for &b in &buf[..n] {
            if let Some(payload) = self.endpoint.feed(b, now, &mut self.port, log) {
                self.handle_line(&payload, now, log);
            }
        }
        self.endpoint.poll_timeout(now, &mut self.port, log);

        if !self.sent_ready {
            let _ = self.endpoint.queue(b"READY", now, &mut self.port);
            self.sent_ready = true;
            return;
        }
        if !self.setup_acked {
            return;
        }
        if now.saturating_sub(self.last_broadcast) >= BROADCAST_INTERVAL_MS {
            self.last_broadcast = now;
            self.broadcast_next(now);
        }
    }
}
