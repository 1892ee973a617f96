// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Heat-pump application protocol: device addressing, CAN payload codec,
//! and message routing (spec.md §4.3, §4.4).

mod codec;
mod device;
mod dispatcher;

pub use codec::{decode, encode, CanFrame, Message, MessageKind, EXTENDED_VALUE_ID_MARKER};
pub use device::{DeviceId, DeviceType, DISPLAY_BROADCAST_ADDRESS};
pub use dispatcher::{CanTransmit, Dispatcher, VirtualDevice};
