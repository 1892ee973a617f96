// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for ehp-core

use std::fmt;

/// Result type for ehp-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type shared across RSFP, HPAP and the data-point engine.
///
/// Variants map directly onto the error kinds in spec.md §7; recovery
/// policy (retry locally vs. surface to caller) lives with the caller, not
/// with this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// RSFP: bad terminator, oversize frame, missing SP, unknown start byte,
    /// unknown control op, wrong control-frame size.
    Framing,

    /// RSFP: unexpected sequence number on an inbound data frame.
    Sequence,

    /// RSFP: retransmission budget exhausted for a queued slot.
    BudgetExhausted,

    /// RSFP transmit queue has no free slot.
    QueueFull,

    /// CAN facade or HPAP dispatcher is not ready yet.
    NotReady,

    /// An outbound operation required an exact device id and didn't get one.
    InvalidTarget,

    /// Data point is read-only; write rejected.
    ReadOnly,

    /// Data point is not subscribed.
    Unsubscribed,

    /// Data point is not writable.
    NotWritable,

    /// Value id has no definition.
    NotDefined,

    /// Value outside the legal range for its codec/converter.
    OutOfRange,

    /// A persisted file was truncated or carried an unrecognised header.
    PersistenceTruncated,

    /// Generic buffer-too-small condition (framing, CDR-style encoders).
    BufferTooSmall,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Framing => write!(f, "framing error"),
            Error::Sequence => write!(f, "unexpected sequence number"),
            Error::BudgetExhausted => write!(f, "retransmission budget exhausted"),
            Error::QueueFull => write!(f, "transmit queue full"),
            Error::NotReady => write!(f, "not ready"),
            Error::InvalidTarget => write!(f, "target device id is not exact"),
            Error::ReadOnly => write!(f, "data point is read-only"),
            Error::Unsubscribed => write!(f, "data point is not subscribed"),
            Error::NotWritable => write!(f, "data point is not writable"),
            Error::NotDefined => write!(f, "value id is not defined"),
            Error::OutOfRange => write!(f, "value out of range"),
            Error::PersistenceTruncated => write!(f, "persisted file truncated or header mismatch"),
            Error::BufferTooSmall => write!(f, "buffer too small"),
        }
    }
}

impl std::error::Error for Error {}

/// The closed set of outcomes `DataPointEngine::write` may return (spec.md §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteResult {
    /// Write accepted (queued, or confirmed if the caller asked for confirm).
    Accepted,
    /// Data point engine is read-only.
    ReadOnly,
    /// Data point is not writable.
    NotWritable,
    /// No entry exists for the key and none could be created.
    NotConfigured,
    /// HPAP dispatcher isn't ready.
    NotReady,
    /// Value rejected by the codec/converter.
    OutOfRange,
    /// RSFP transmit queue is full.
    QueueFull,
}
