// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! End-to-end walkthroughs of the literal request/response traces, driving
//! the public API the way a host binary would rather than reaching into
//! any one module's internals.

use ehp_core::datetime::{
    DateTimeSource, DATETIME_DAY_ID, DATETIME_HOUR_ID, DATETIME_MINUTE_ID, DATETIME_MONTH_ID,
    DATETIME_YEAR_ID,
};
use ehp_core::defs::{AccessMode, Definition, Repository, Unit};
use ehp_core::dpe::{CaptureMode, DataPointEngine, DataPointKey};
use ehp_core::hpap::{CanFrame, CanTransmit, DeviceId, DeviceType, Dispatcher, Message, MessageKind};
use ehp_core::platform::{Monotonic, NullLog, SerialPort, Yield};
use ehp_core::rsfp::{Config as RsfpConfig, Endpoint};
use ehp_core::WriteResult;

#[derive(Default)]
struct MemPort {
    tx: Vec<u8>,
}

impl SerialPort for MemPort {
    fn write(&mut self, data: &[u8]) -> usize {
        self.tx.extend_from_slice(data);
        data.len()
    }
    fn read(&mut self, _buf: &mut [u8]) -> usize {
        0
    }
}

fn feed_all(ep: &mut Endpoint, bytes: &[u8], now: Monotonic, port: &mut MemPort) -> Vec<Vec<u8>> {
    let mut log = NullLog;
    let mut delivered = Vec::new();
    for &b in bytes {
        if let Some(payload) = ep.feed(b, now, port, &mut log) {
            delivered.push(payload);
        }
    }
    delivered
}

/// Two independent endpoints, a real byte-level link between them: A queues
/// a frame, B receives and delivers it, B's ack travels back and clears A's
/// window slot.
#[test]
fn rsfp_round_trip_between_two_peers() {
    let mut a = Endpoint::new(RsfpConfig::default());
    let mut b = Endpoint::new(RsfpConfig::default());
    let mut a_port = MemPort::default();
    let mut b_port = MemPort::default();

    a.queue(b"READY", 0, &mut a_port).unwrap();
    assert_eq!(a.occupancy(), 1);

    let wire = std::mem::take(&mut a_port.tx);
    let delivered = feed_all(&mut b, &wire, 10, &mut b_port);
    assert_eq!(delivered, vec![b"READY".to_vec()]);
    // b's ack went out over its own port.
    assert!(!b_port.tx.is_empty());

    let ack = std::mem::take(&mut b_port.tx);
    feed_all(&mut a, &ack, 20, &mut a_port);
    assert_eq!(a.occupancy(), 0);
    assert!(a.can_queue());
}

struct MockCan {
    ready: bool,
    sent: Vec<CanFrame>,
}

impl CanTransmit for MockCan {
    fn ready(&self) -> bool {
        self.ready
    }
    fn transmit(&mut self, frame: CanFrame) -> bool {
        self.sent.push(frame);
        true
    }
}

struct Counter(usize);
impl Yield for Counter {
    fn yield_now(&mut self) {
        self.0 += 1;
    }
}

fn fill_date_time(source: &mut DateTimeSource, now: Monotonic) {
    source.on_sample(DATETIME_DAY_ID, 15, now);
    source.on_sample(DATETIME_MONTH_ID, 3, now);
    source.on_sample(DATETIME_YEAR_ID, 26, now);
    source.on_sample(DATETIME_HOUR_ID, 10, now);
    source.on_sample(DATETIME_MINUTE_ID, 59, now);
}

fn writable_def() -> Definition {
    Definition {
        name: "room set temperature day".into(),
        unit: Unit::Celsius,
        source_pattern: DeviceId::any_address(DeviceType::HeatingCircuit),
        access_mode: AccessMode::Writable,
        update_interval_ms: 60_000,
        codec_id: 0,
        converter_id: 0,
    }
}

/// `write(..., confirm: true)` walks all three phases: an observe-first
/// read, the write itself, and a final equality check against a later
/// sample before the caller-visible state settles.
#[test]
fn write_and_confirm_three_phase_protocol() {
    let mut defs = Repository::new();
    defs.load_builtins([(0x0005, writable_def())]);

    let self_id = DeviceId::exact(DeviceType::Display, 0x01);
    let target = DeviceId::exact(DeviceType::HeatingCircuit, 1);
    let key = DataPointKey::new(target, 0x0005);

    let mut engine = DataPointEngine::new(CaptureMode::Configured, false, self_id);
    engine.add_writable(key, &defs);

    let mut date_time = DateTimeSource::new();
    fill_date_time(&mut date_time, 0);

    assert_eq!(engine.write(key, 0x00C8, true), WriteResult::Accepted);
    assert_eq!(engine.get(&key).unwrap().pending_write, Some(0x00C8));

    // Phase 1: nothing has ever been read, so maintenance asks for one.
    let mut dispatcher = Dispatcher::new();
    let mut can = MockCan { ready: true, sent: vec![] };
    engine.maintenance_tick(100_000, &mut dispatcher, &mut can, &mut Counter(0));
    assert_eq!(can.sent.len(), 1);
    assert_eq!(MessageKind::from_nibble(can.sent[0].data[0]), MessageKind::Request);

    // An arbitrary prior value comes back; it doesn't match the pending
    // write, so the entry is merely observed, not confirmed.
    let observed = Message {
        kind: MessageKind::Response,
        source: target,
        target: self_id,
        value_id: 0x0005,
        value: 0x0096,
    };
    engine.on_sample(&observed, 100_100, &date_time, &defs);
    assert_eq!(engine.get(&key).unwrap().raw_value, 0x0096);
    assert_eq!(engine.get(&key).unwrap().pending_write, Some(0x00C8));

    // Phase 2: a value is now known, so the next tick issues the write.
    can.sent.clear();
    engine.maintenance_tick(200_000, &mut dispatcher, &mut can, &mut Counter(0));
    assert_eq!(can.sent.len(), 1);
    assert_eq!(MessageKind::from_nibble(can.sent[0].data[0]), MessageKind::Write);

    // Phase 3: only a sample matching the written value clears the pending
    // write and counts as confirmation.
    let mismatch = Message {
        kind: MessageKind::Response,
        source: target,
        target: self_id,
        value_id: 0x0005,
        value: 0x0096,
    };
    engine.on_sample(&mismatch, 200_200, &date_time, &defs);
    assert_eq!(engine.get(&key).unwrap().pending_write, Some(0x00C8));

    let confirmation = Message {
        kind: MessageKind::Response,
        source: target,
        target: self_id,
        value_id: 0x0005,
        value: 0x00C8,
    };
    engine.on_sample(&confirmation, 200_300, &date_time, &defs);
    let entry = engine.get(&key).unwrap();
    assert_eq!(entry.raw_value, 0x00C8);
    assert!(entry.pending_write.is_none());
}

/// Samples are dropped outright until the date/time source has all five
/// constituent fields, independent of capture mode.
#[test]
fn samples_ignored_before_date_time_available() {
    let mut defs = Repository::new();
    defs.load_builtins([(0x0005, writable_def())]);
    let self_id = DeviceId::exact(DeviceType::Display, 0x01);
    let target = DeviceId::exact(DeviceType::HeatingCircuit, 1);
    let key = DataPointKey::new(target, 0x0005);

    let mut engine = DataPointEngine::new(CaptureMode::Configured, false, self_id);
    engine.add_writable(key, &defs);

    let date_time = DateTimeSource::new();
    let msg = Message {
        kind: MessageKind::Response,
        source: target,
        target: self_id,
        value_id: 0x0005,
        value: 0x00C8,
    };
    engine.on_sample(&msg, 1_000, &date_time, &defs);
    assert_eq!(engine.get(&key).unwrap().raw_value, 0);
    assert!(engine.get(&key).unwrap().last_update.is_none());
}
