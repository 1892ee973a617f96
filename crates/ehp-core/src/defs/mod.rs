// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Definition repository: `value-id → definition`, with built-ins
//! overlaid by user configuration and transactional mutation (spec.md
//! §4.6).

use crate::error::Result;
use crate::hpap::DeviceId;

/// Physical unit a value is measured in. Not exhaustive of every unit the
/// device family uses, but closed for this core: unknown units are
/// represented as `None` at the definition-authoring boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    None,
    Celsius,
    Kelvin,
    Percent,
    Hours,
    Minutes,
    Seconds,
    Weekday,
    Bar,
    Hertz,
}

/// What a caller may do with a data point governed by this definition.
/// Ordered: later variants are supersets of access granted by earlier ones
/// (`writable ⇒ access-mode ∈ {..}` checks in spec.md §3 compare by this
/// order).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AccessMode {
    None,
    Readable,
    Writable,
    WritableProtected,
    WritableExtraProtected,
}

/// A value-id's metadata: human name, unit, which devices may originate
/// it, access policy, refresh cadence, and which conversion pipeline to
/// apply.
#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    pub name: String,
    pub unit: Unit,
    pub source_pattern: DeviceId,
    pub access_mode: AccessMode,
    pub update_interval_ms: u64,
    pub codec_id: u16,
    pub converter_id: u16,
}

impl Definition {
    /// Returned by [`Repository::get`] for an id with no definition.
    pub fn undefined() -> Self {
        Self {
            name: String::new(),
            unit: Unit::None,
            source_pattern: DeviceId::ANY,
            access_mode: AccessMode::None,
            update_interval_ms: 0,
            codec_id: 0,
            converter_id: 0,
        }
    }
}

#[derive(Debug, Clone)]
enum PendingChange {
    Store(u16, Definition),
    Remove(u16),
}

/// `value-id → Definition`, sorted by id for O(log n) lookup, with a
/// transactional mutation interface so a caller can stage several changes
/// and commit or discard them atomically.
#[derive(Debug, Clone, Default)]
pub struct Repository {
    entries: Vec<(u16, Definition)>,
    pending: Option<Vec<PendingChange>>,
}

impl Repository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with the compile-time built-in table. Entries already present
    /// (by id) are overwritten, matching "user definitions take
    /// precedence" when user definitions are loaded after built-ins.
    pub fn load_builtins(&mut self, builtins: impl IntoIterator<Item = (u16, Definition)>) {
        for (id, def) in builtins {
            self.insert_sorted(id, def);
        }
    }

    fn index_of(&self, id: u16) -> std::result::Result<usize, usize> {
        self.entries.binary_search_by_key(&id, |(k, _)| *k)
    }

    fn insert_sorted(&mut self, id: u16, def: Definition) {
        match self.index_of(id) {
            Ok(pos) => self.entries[pos].1 = def,
            Err(pos) => self.entries.insert(pos, (id, def)),
        }
    }

    fn remove_sorted(&mut self, id: u16) {
        if let Ok(pos) = self.index_of(id) {
            self.entries.remove(pos);
        }
    }

    /// Look up a definition; returns the sentinel "undefined" definition
    /// (access mode `None`) if `id` carries no definition.
    pub fn get(&self, id: u16) -> Definition {
        match self.index_of(id) {
            Ok(pos) => self.entries[pos].1.clone(),
            Err(_) => Definition::undefined(),
        }
    }

    pub fn contains(&self, id: u16) -> bool {
        self.index_of(id).is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u16, &Definition)> {
        self.entries.iter().map(|(id, def)| (*id, def))
    }

    /// Begin staging mutations. Panics if a transaction is already open,
    /// mirroring the single-threaded cooperative model where only one
    /// caller ever mutates this repository.
    pub fn begin_transaction(&mut self) {
        assert!(self.pending.is_none(), "definition transaction already open");
        self.pending = Some(Vec::new());
    }

    pub fn store(&mut self, id: u16, definition: Definition) {
        self.pending
            .as_mut()
            .expect("store() outside a transaction")
            .push(PendingChange::Store(id, definition));
    }

    pub fn remove(&mut self, id: u16) {
        self.pending
            .as_mut()
            .expect("remove() outside a transaction")
            .push(PendingChange::Remove(id));
    }

    /// Apply all staged changes atomically: either every change lands or
    /// (on persistence failure) none does.
    pub fn commit(&mut self, persist: impl FnOnce(&[(u16, Definition)]) -> Result<()>) -> Result<()> {
        let pending = self.pending.take().expect("commit() outside a transaction");
        let snapshot: Vec<(u16, Definition)> = pending
            .iter()
            .filter_map(|c| match c {
                PendingChange::Store(id, def) => Some((*id, def.clone())),
                PendingChange::Remove(_) => None,
            })
            .collect();
        persist(&snapshot)?;
        for change in pending {
            match change {
                PendingChange::Store(id, def) => self.insert_sorted(id, def),
                PendingChange::Remove(id) => self.remove_sorted(id),
            }
        }
        Ok(())
    }

    /// Discard all staged changes without touching the repository.
    pub fn rollback(&mut self) {
        self.pending = None;
    }
}
