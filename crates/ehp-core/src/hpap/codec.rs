// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HPAP codec: CAN payload bytes ↔ `(source, target, kind, value-id, value)`
//! (spec.md §4.3).
//!
//! ```text
//! byte 0: [ target type (7..4) | message kind (3..0) ]
//! byte 1: [ _ | target address (6..0) ]
//! byte 2: short value id, or 0xFA extended-id marker
//! byte 3,4: extended value id (iff byte 2 == 0xFA)
//! n, n+1: big-endian u16 value (n = 3 short form, n = 5 extended form)
//! ```

use super::device::DeviceId;

/// Marker in payload byte 2 introducing a two-byte extended value id.
pub const EXTENDED_VALUE_ID_MARKER: u8 = 0xFA;

/// One CAN frame, in the application view HPAP cares about: 11-bit id,
/// standard (non-extended, non-RTR), up to 7 bytes of payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanFrame {
    pub id: u16,
    pub extended: bool,
    pub rtr: bool,
    pub len: u8,
    pub data: [u8; 8],
}

/// Message kind carried in the low nibble of payload byte 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Write,
    Request,
    Response,
    Register,
    /// Values other than 0, 1, 2, 6; reserved, logged by the caller.
    Reserved(u8),
}

impl MessageKind {
    pub const fn from_nibble(n: u8) -> Self {
        match n & 0x0F {
            0 => MessageKind::Write,
            1 => MessageKind::Request,
            2 => MessageKind::Response,
            6 => MessageKind::Register,
            other => MessageKind::Reserved(other),
        }
    }

    pub const fn to_nibble(self) -> u8 {
        match self {
            MessageKind::Write => 0,
            MessageKind::Request => 1,
            MessageKind::Response => 2,
            MessageKind::Register => 6,
            MessageKind::Reserved(n) => n & 0x0F,
        }
    }
}

/// A fully decoded HPAP message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    pub source: DeviceId,
    pub target: DeviceId,
    pub value_id: u16,
    pub value: u16,
}

/// Decode a CAN frame into an HPAP message. Returns `None` for extended or
/// RTR frames (spec.md §3: "Extended or RTR frames are ignored by HPAP"),
/// or for a payload too short to carry a value id and value.
pub fn decode(frame: &CanFrame) -> Option<Message> {
    if frame.extended || frame.rtr {
        return None;
    }
    let data = &frame.data[..frame.len as usize];
    if data.len() < 4 {
        return None;
    }

    let target_type = (data[0] >> 4) & 0x0F;
    let kind = MessageKind::from_nibble(data[0]);
    let target_address = data[1] & 0x7F;
    let target =
        DeviceId::exact(super::device::DeviceType::from_nibble(target_type), target_address)
            .rewrite_broadcast();

    let (value_id, value_offset) = if data[2] == EXTENDED_VALUE_ID_MARKER {
        if data.len() < 7 {
            return None;
        }
        (u16::from_be_bytes([data[3], data[4]]), 5)
    } else {
        (data[2] as u16, 3)
    };

    if data.len() < value_offset + 2 {
        return None;
    }
    let value = u16::from_be_bytes([data[value_offset], data[value_offset + 1]]);
    let source = DeviceId::from_can_id(frame.id & 0x07FF);

    Some(Message {
        kind,
        source,
        target,
        value_id,
        value,
    })
}

/// Encode an HPAP message into a CAN frame. `source` and `target` must both
/// be exact device ids. Always emits the extended value-id form and zeroes
/// unused value bytes for `Request`, per spec.md §4.3.
pub fn encode(source: &DeviceId, target: &DeviceId, kind: MessageKind, value_id: u16, value: u16) -> CanFrame {
    debug_assert!(source.is_exact() && target.is_exact());

    let mut data = [0u8; 8];
    data[0] = ((target.device_type().unwrap().to_nibble()) << 4) | kind.to_nibble();
    data[1] = target.address().unwrap() & 0x7F;
    data[2] = EXTENDED_VALUE_ID_MARKER;
    let [hi, lo] = value_id.to_be_bytes();
    data[3] = hi;
    data[4] = lo;

    let value = match kind {
        MessageKind::Request => 0,
        _ => value,
    };
    let [vhi, vlo] = value.to_be_bytes();
    data[5] = vhi;
    data[6] = vlo;

    CanFrame {
        id: source.to_can_id(),
        extended: false,
        rtr: false,
        len: 7,
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hpap::device::DeviceType;

    #[test]
    fn decode_literal_scenario() {
        // spec.md §8 scenario 4
        let frame = CanFrame {
            id: 0x180,
            extended: false,
            rtr: false,
            len: 7,
            data: [0xD2, 0x1F, 0xFA, 0x01, 0x26, 0x00, 0x2A, 0x00],
        };
        let msg = decode(&frame).unwrap();
        assert_eq!(msg.kind, MessageKind::Response);
        assert_eq!(msg.source, DeviceId::exact(DeviceType::System, 0));
        assert_eq!(msg.target, DeviceId::exact(DeviceType::Display, 0x1F));
        assert_eq!(msg.value_id, 0x0126);
        assert_eq!(msg.value, 0x002A);
    }

    #[test]
    fn extended_and_rtr_frames_ignored() {
        let mut frame = CanFrame {
            id: 0x180,
            extended: true,
            rtr: false,
            len: 7,
            data: [0xD2, 0x1F, 0xFA, 0x01, 0x26, 0x00, 0x2A, 0x00],
        };
        assert!(decode(&frame).is_none());
        frame.extended = false;
        frame.rtr = true;
        assert!(decode(&frame).is_none());
    }

    #[test]
    fn encode_decode_roundtrip_short_id() {
        let source = DeviceId::exact(DeviceType::System, 0);
        let target = DeviceId::exact(DeviceType::HeatingCircuit, 0x12);
        let frame = encode(&source, &target, MessageKind::Write, 0x0005, 0x00C8);
        let decoded = decode(&frame).unwrap();
        assert_eq!(decoded.source, source);
        assert_eq!(decoded.target, target);
        assert_eq!(decoded.kind, MessageKind::Write);
        assert_eq!(decoded.value_id, 0x0005);
        assert_eq!(decoded.value, 0x00C8);
    }

    #[test]
    fn request_zeroes_value_bytes() {
        let source = DeviceId::exact(DeviceType::System, 0);
        let target = DeviceId::exact(DeviceType::Sensor, 1);
        let frame = encode(&source, &target, MessageKind::Request, 0x0010, 0xBEEF);
        assert_eq!(frame.data[5], 0);
        assert_eq!(frame.data[6], 0);
    }

    #[test]
    fn broadcast_target_rewritten_on_decode() {
        let frame = CanFrame {
            id: 0x000,
            extended: false,
            rtr: false,
            len: 7,
            data: [0x32, 0x3C, 0x05, 0x00, 0x00, 0x00, 0x00, 0x00],
        };
        let msg = decode(&frame).unwrap();
        assert_eq!(msg.target, DeviceId::any_address(DeviceType::Display));
    }
}
