// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Data-point engine: the keyed store, read/write scheduler and
//! subscription/writable persistence at the core of the core (spec.md
//! §4.7).

mod engine;
mod entry;
mod key;
mod persistence;

pub use engine::{
    CaptureMode, DataPointEngine, MAINTENANCE_INTERVAL_MS, MAX_CONCURRENT_OPERATIONS,
    MIN_UPDATE_INTERVAL_MS, WRITE_INTERVAL_MS,
};
pub use entry::{CachedDefinitionRef, DataPointEntry};
pub use key::DataPointKey;
pub use persistence::{
    load as load_keys, save as save_keys, SUBSCRIPTIONS_HEADER, SUBSCRIPTIONS_PATH,
    WRITABLES_HEADER, WRITABLES_PATH,
};
