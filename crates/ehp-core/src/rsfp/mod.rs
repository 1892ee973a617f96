// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reliable Serial Framing Protocol: a windowed, retransmitting,
//! sequence-numbered framing layer over an unreliable byte stream
//! (spec.md §4.1).

mod endpoint;
mod frame;

pub use endpoint::{Config, Endpoint, DEFAULT_RESEND_LIMIT, DEFAULT_TIMEOUT_MS, WINDOW_SIZE};
pub use frame::{
    char_to_seq, err_arg, op, seq_to_char, Frame, LineError, MAX_FRAME_SIZE, MAX_PAYLOAD_LEN,
    SEQ_SPACE,
};
