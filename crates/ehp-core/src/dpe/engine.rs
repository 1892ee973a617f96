// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The data-point engine: keyed store, periodic maintenance scheduler,
//! three-phase write protocol, update fanout (spec.md §4.7).

use std::collections::HashMap;

use crate::datetime::DateTimeSource;
use crate::defs::{AccessMode, Repository};
use crate::error::WriteResult;
use crate::hpap::{CanTransmit, DeviceId, Dispatcher, Message, MessageKind};
use crate::platform::{Monotonic, Yield};

use super::entry::{CachedDefinitionRef, DataPointEntry};
use super::key::DataPointKey;

/// How the engine reacts to inbound samples for keys it doesn't already
/// track (spec.md §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    /// Never create entries; never update existing ones either.
    None,
    /// Update existing entries only; no implicit creation.
    Configured,
    /// Create an entry whenever a definition exists for the value id.
    Defined,
    /// Create an entry for every received `(source, value-id)`.
    Any,
}

impl Default for CaptureMode {
    fn default() -> Self {
        CaptureMode::Configured
    }
}

pub const MAINTENANCE_INTERVAL_MS: u64 = 375;
pub const WRITE_INTERVAL_MS: u64 = 30_000;
pub const MIN_UPDATE_INTERVAL_MS: u64 = 30_000;
pub const MAX_CONCURRENT_OPERATIONS: usize = 2;

type UpdateListener = Box<dyn FnMut(&DataPointKey, &DataPointEntry)>;

/// Owns the keyed data-point store and drives the periodic read/write
/// scheduler. One engine per gateway instance.
pub struct DataPointEngine {
    mode: CaptureMode,
    read_only: bool,
    self_id: DeviceId,
    store: Vec<(DataPointKey, DataPointEntry)>,
    index: HashMap<DataPointKey, usize>,
    cursor: usize,
    listeners: Vec<UpdateListener>,
}

impl DataPointEngine {
    /// `self_id` is the exact device identifier the engine uses as the
    /// source of its own outbound request/write traffic.
    pub fn new(mode: CaptureMode, read_only: bool, self_id: DeviceId) -> Self {
        Self {
            mode,
            read_only,
            self_id,
            store: Vec::new(),
            index: HashMap::new(),
            cursor: 0,
            listeners: Vec::new(),
        }
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    pub fn get(&self, key: &DataPointKey) -> Option<&DataPointEntry> {
        self.index.get(key).map(|&idx| &self.store[idx].1)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&DataPointKey, &DataPointEntry)> {
        self.store.iter().map(|(k, e)| (k, e))
    }

    /// Entries matching `predicate`, without collecting into an
    /// intermediate vector.
    pub fn iter_filtered<'a>(
        &'a self,
        predicate: impl Fn(&DataPointKey, &DataPointEntry) -> bool + 'a,
    ) -> impl Iterator<Item = (&'a DataPointKey, &'a DataPointEntry)> {
        self.store
            .iter()
            .map(|(k, e)| (k, e))
            .filter(move |(k, e)| predicate(k, e))
    }

    /// Force `key`'s next maintenance tick to issue a request immediately,
    /// bypassing the minimum-interval gate. No-op if `key` has no entry.
    pub fn touch(&mut self, key: &DataPointKey) -> bool {
        if let Some(&idx) = self.index.get(key) {
            self.store[idx].1.last_request_monotonic = 0;
            true
        } else {
            false
        }
    }

    pub fn on_update(&mut self, listener: UpdateListener) {
        self.listeners.push(listener);
    }

    fn create_entry(&mut self, key: DataPointKey, defs: &Repository) -> usize {
        let definition = defs.get(key.value_id);
        let entry = DataPointEntry::new(CachedDefinitionRef {
            update_interval_ms: definition.update_interval_ms,
            codec_id: definition.codec_id,
            converter_id: definition.converter_id,
        });
        let idx = self.store.len();
        self.store.push((key, entry));
        self.index.insert(key, idx);
        idx
    }

    fn get_or_create_for_config(&mut self, key: DataPointKey, defs: &Repository) -> usize {
        match self.index.get(&key) {
            Some(&idx) => idx,
            None => self.create_entry(key, defs),
        }
    }

    /// `(device-id, value-id)` must be exact; neither endpoint may be the
    /// `ANY` wildcard (spec.md §3).
    fn key_is_well_formed(key: &DataPointKey) -> bool {
        key.device_id.is_exact()
    }

    pub fn add_subscription(&mut self, key: DataPointKey, defs: &Repository) -> bool {
        if !Self::key_is_well_formed(&key) {
            return false;
        }
        let definition = defs.get(key.value_id);
        if definition.access_mode < AccessMode::Readable {
            return false;
        }
        if !definition.source_pattern.includes(&key.device_id) {
            return false;
        }
        let idx = self.get_or_create_for_config(key, defs);
        self.store[idx].1.subscribed = true;
        true
    }

    pub fn remove_subscription(&mut self, key: &DataPointKey) {
        if let Some(&idx) = self.index.get(key) {
            self.store[idx].1.subscribed = false;
        }
        self.maybe_gc(key);
    }

    pub fn add_writable(&mut self, key: DataPointKey, defs: &Repository) -> bool {
        if !Self::key_is_well_formed(&key) {
            return false;
        }
        let definition = defs.get(key.value_id);
        if !matches!(
            definition.access_mode,
            AccessMode::Writable | AccessMode::WritableProtected | AccessMode::WritableExtraProtected
        ) {
            return false;
        }
        let idx = self.get_or_create_for_config(key, defs);
        self.store[idx].1.writable = true;
        true
    }

    pub fn remove_writable(&mut self, key: &DataPointKey) {
        if let Some(&idx) = self.index.get(key) {
            self.store[idx].1.writable = false;
        }
        self.maybe_gc(key);
    }

    /// Entries the engine only ever creates via explicit configuration
    /// (`Configured` mode) are torn down once neither promise remains,
    /// keeping the invariant "store keys == subscribed ∪ writable keys"
    /// (spec.md §8) intact. Other capture modes keep entries around per
    /// spec.md §3's "destroyed only on factory reset".
    fn maybe_gc(&mut self, key: &DataPointKey) {
        if self.mode != CaptureMode::Configured {
            return;
        }
        if let Some(&idx) = self.index.get(key) {
            let (subscribed, writable) = {
                let e = &self.store[idx].1;
                (e.subscribed, e.writable)
            };
            if !subscribed && !writable {
                self.remove_at(idx);
            }
        }
    }

    fn remove_at(&mut self, idx: usize) {
        self.index.remove(&self.store[idx].0);
        let last = self.store.len() - 1;
        self.store.swap_remove(idx);
        if idx != last {
            let moved_key = self.store[idx].0;
            self.index.insert(moved_key, idx);
        }
        self.cursor = if self.store.is_empty() {
            0
        } else {
            self.cursor % self.store.len()
        };
    }

    /// Stage a write. Returns immediately with the outcome of *queueing*
    /// the write; full confirmation (phase 3 of spec.md §4.7's write
    /// protocol) is observable later through [`Self::on_update`].
    /// `confirm = true` forces a fresh observe-first read before the
    /// write is sent, even if a value was already known.
    pub fn write(&mut self, key: DataPointKey, value: u16, confirm: bool) -> WriteResult {
        if self.read_only {
            return WriteResult::ReadOnly;
        }
        let Some(&idx) = self.index.get(&key) else {
            return WriteResult::NotConfigured;
        };
        let entry = &mut self.store[idx].1;
        if !entry.writable {
            return WriteResult::NotWritable;
        }
        entry.pending_write = Some(value);
        if confirm {
            entry.last_update_monotonic = 0;
        }
        WriteResult::Accepted
    }

    fn fire_update(&mut self, idx: usize) {
        let (key, entry) = &self.store[idx];
        for listener in &mut self.listeners {
            listener(key, entry);
        }
    }

    /// Apply an inbound `Response`/`Write` sample (spec.md §4.7). Samples
    /// are dropped while the date/time source isn't available yet.
    pub fn on_sample(&mut self, msg: &Message, now: Monotonic, date_time: &DateTimeSource, defs: &Repository) {
        if !matches!(msg.kind, MessageKind::Response | MessageKind::Write) {
            return;
        }
        if !msg.source.is_exact() {
            return;
        }
        let Some(wall_clock) = date_time.current(now) else {
            return;
        };
        let key = DataPointKey::new(msg.source, msg.value_id);
        let idx = match self.select_or_create_for_sample(key, defs) {
            Some(idx) => idx,
            None => return,
        };
        self.store[idx].1.apply_sample(msg.value, wall_clock, now);
        self.fire_update(idx);
    }

    fn select_or_create_for_sample(&mut self, key: DataPointKey, defs: &Repository) -> Option<usize> {
        if let Some(&idx) = self.index.get(&key) {
            return Some(idx);
        }
        match self.mode {
            CaptureMode::None | CaptureMode::Configured => None,
            CaptureMode::Defined => {
                if defs.contains(key.value_id) {
                    Some(self.create_entry(key, defs))
                } else {
                    None
                }
            }
            CaptureMode::Any => Some(self.create_entry(key, defs)),
        }
    }

    /// Advance the round-robin cursor, budgeting up to
    /// [`MAX_CONCURRENT_OPERATIONS`] outbound requests/writes.
    pub fn maintenance_tick(
        &mut self,
        now: Monotonic,
        dispatcher: &mut Dispatcher,
        can: &mut impl CanTransmit,
        yielder: &mut impl Yield,
    ) {
        let n = self.store.len();
        if n == 0 {
            return;
        }
        let mut budget = MAX_CONCURRENT_OPERATIONS;
        let mut visited = 0;
        while budget > 0 && visited < n {
            let idx = self.cursor;
            self.cursor = (self.cursor + 1) % n;
            visited += 1;
            yielder.yield_now();

            let key = self.store[idx].0;
            let writable = self.store[idx].1.writable;
            let pending_write = self.store[idx].1.pending_write;
            let has_ever_been_read = self.store[idx].1.has_ever_been_read();
            let has_ever_been_requested = self.store[idx].1.has_ever_been_requested();
            let last_request_monotonic = self.store[idx].1.last_request_monotonic;
            let last_write_monotonic = self.store[idx].1.last_write_monotonic;
            let subscribed = self.store[idx].1.subscribed;
            let last_update_monotonic = self.store[idx].1.last_update_monotonic;
            let update_interval_ms = self.store[idx].1.definition.update_interval_ms;

            if writable {
                if let Some(v) = pending_write {
                    if !has_ever_been_read {
                        if (!has_ever_been_requested
                            || now.saturating_sub(last_request_monotonic) > MIN_UPDATE_INTERVAL_MS)
                            && dispatcher
                                .request(&self.self_id, &key.device_id, key.value_id, can)
                                .is_ok()
                        {
                            self.store[idx].1.last_request_monotonic = now;
                            self.store[idx].1.ever_requested = true;
                            budget -= 1;
                        }
                    } else if last_write_monotonic + WRITE_INTERVAL_MS < now
                        && dispatcher
                            .write(&self.self_id, &key.device_id, key.value_id, v, can)
                            .is_ok()
                    {
                        self.store[idx].1.last_write_monotonic = now;
                        self.store[idx].1.last_update_monotonic = 0;
                        budget -= 1;
                    }
                    continue;
                }
            }

            if subscribed {
                let min_interval = MIN_UPDATE_INTERVAL_MS.max(update_interval_ms);
                // A never-updated entry (last_update_monotonic == 0, the
                // sentinel "no value yet") is always stale, mirroring the
                // writable branch's own has-ever-been-read check above.
                let stale = !has_ever_been_read || now.saturating_sub(last_update_monotonic) > min_interval;
                let can_ask = !has_ever_been_requested
                    || now.saturating_sub(last_request_monotonic) > MIN_UPDATE_INTERVAL_MS;
                if stale
                    && can_ask
                    && dispatcher
                        .request(&self.self_id, &key.device_id, key.value_id, can)
                        .is_ok()
                {
                    self.store[idx].1.last_request_monotonic = now;
                    self.store[idx].1.ever_requested = true;
                    budget -= 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defs::{Definition, Unit};
    use crate::hpap::{CanFrame, DeviceType};
    use crate::platform::NoYield;

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

    fn readable_def() -> Definition {
        Definition {
            name: "test".into(),
            unit: Unit::None,
            source_pattern: DeviceId::ANY,
            access_mode: AccessMode::Readable,
            update_interval_ms: 60_000,
            codec_id: 0,
            converter_id: 0,
        }
    }

    fn writable_def() -> Definition {
        Definition {
            access_mode: AccessMode::Writable,
            ..readable_def()
        }
    }

    #[test]
    fn add_subscription_requires_readable_and_matching_pattern() {
        let mut defs = Repository::new();
        defs.load_builtins([(5, readable_def())]);
        let mut engine = DataPointEngine::new(CaptureMode::Configured, true, DeviceId::exact(DeviceType::System, 0));
        let key = DataPointKey::new(DeviceId::exact(DeviceType::System, 0), 5);
        assert!(engine.add_subscription(key, &defs));
        assert!(engine.get(&key).unwrap().subscribed);
    }

    #[test]
    fn configured_mode_gcs_orphaned_entries() {
        let mut defs = Repository::new();
        defs.load_builtins([(5, readable_def())]);
        let mut engine = DataPointEngine::new(CaptureMode::Configured, true, DeviceId::exact(DeviceType::System, 0));
        let key = DataPointKey::new(DeviceId::exact(DeviceType::System, 0), 5);
        engine.add_subscription(key, &defs);
        engine.remove_subscription(&key);
        assert!(engine.get(&key).is_none());
    }

    #[test]
    fn write_rejected_when_read_only() {
        let mut engine = DataPointEngine::new(CaptureMode::Configured, true, DeviceId::exact(DeviceType::System, 0));
        let key = DataPointKey::new(DeviceId::exact(DeviceType::System, 0), 5);
        assert_eq!(engine.write(key, 1, false), WriteResult::ReadOnly);
    }

    #[test]
    fn write_not_configured_without_entry() {
        let mut engine = DataPointEngine::new(CaptureMode::Configured, false, DeviceId::exact(DeviceType::System, 0));
        let key = DataPointKey::new(DeviceId::exact(DeviceType::System, 0), 5);
        assert_eq!(engine.write(key, 1, false), WriteResult::NotConfigured);
    }

    #[test]
    fn write_accepted_and_maintenance_issues_request_first() {
        let mut defs = Repository::new();
        defs.load_builtins([(5, writable_def())]);
        let mut engine = DataPointEngine::new(CaptureMode::Configured, false, DeviceId::exact(DeviceType::System, 0));
        let key = DataPointKey::new(DeviceId::exact(DeviceType::HeatingCircuit, 1), 5);
        engine.add_writable(key, &defs);
        assert_eq!(engine.write(key, 200, true), WriteResult::Accepted);

        let mut dispatcher = Dispatcher::new();
        let mut can = MockCan { ready: true, sent: vec![] };
        engine.maintenance_tick(100_000, &mut dispatcher, &mut can, &mut NoYield);
        assert_eq!(can.sent.len(), 1);
        assert_eq!(can.sent[0].data[0] & 0x0F, 1); // Request
    }

    #[test]
    fn subscription_read_scheduling_matches_scenario() {
        // spec.md §8 scenario 5
        let mut defs = Repository::new();
        defs.load_builtins([(5, readable_def())]);
        let mut engine = DataPointEngine::new(CaptureMode::Configured, true, DeviceId::exact(DeviceType::System, 0));
        let key = DataPointKey::new(DeviceId::exact(DeviceType::HeatingCircuit, 1), 5);
        engine.add_subscription(key, &defs);

        let mut dispatcher = Dispatcher::new();
        let mut can = MockCan { ready: true, sent: vec![] };

        engine.maintenance_tick(0, &mut dispatcher, &mut can, &mut NoYield);
        assert_eq!(can.sent.len(), 1);

        can.sent.clear();
        engine.maintenance_tick(30_000, &mut dispatcher, &mut can, &mut NoYield);
        assert_eq!(can.sent.len(), 0);

        can.sent.clear();
        engine.maintenance_tick(60_001, &mut dispatcher, &mut can, &mut NoYield);
        assert_eq!(can.sent.len(), 1);
    }
}
