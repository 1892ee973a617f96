// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Subscription/writable persistence: versioned headers, fixed-size
//! records, whole-file rewrite on every change (spec.md §4.7, §6).

use crate::error::{Error, Result};
use crate::hpap::{DeviceId, DeviceType};
use crate::platform::{Storage, Yield};

use super::key::DataPointKey;

pub const SUBSCRIPTIONS_HEADER: &[u8; 5] = b"~S1.0";
pub const WRITABLES_HEADER: &[u8; 5] = b"~W1.0";
pub const SUBSCRIPTIONS_PATH: &str = "/subscriptions";
pub const WRITABLES_PATH: &str = "/writables";

const RECORD_LEN: usize = 4;

fn encode_record(key: &DataPointKey, buf: &mut Vec<u8>) -> Option<()> {
    let device_type = key.device_id.device_type()?;
    let address = key.device_id.address()?;
    let [vid_hi, vid_lo] = key.value_id.to_be_bytes();
    buf.push(vid_hi);
    buf.push(vid_lo);
    buf.push(device_type.to_nibble());
    buf.push(address);
    Some(())
}

fn decode_record(record: &[u8]) -> DataPointKey {
    let value_id = u16::from_be_bytes([record[0], record[1]]);
    let device_type = DeviceType::from_nibble(record[2]);
    let address = record[3];
    DataPointKey::new(DeviceId::exact(device_type, address), value_id)
}

/// Serialise `keys` (in the given order) into `path` behind `header`,
/// yielding between each record per spec.md §5's suspension-point rules.
pub fn save(
    storage: &mut impl Storage,
    path: &str,
    header: &[u8; 5],
    keys: &[DataPointKey],
    yielder: &mut impl Yield,
) -> Result<()> {
    let mut buf = Vec::with_capacity(header.len() + keys.len() * RECORD_LEN);
    buf.extend_from_slice(header);
    for key in keys {
        encode_record(key, &mut buf);
        yielder.yield_now();
    }
    storage.write_all(path, &buf).map_err(|_| Error::PersistenceTruncated)
}

/// Load keys from `path`. A missing file, a short file, or a header that
/// doesn't match is treated as empty (spec.md §4.7: "unknown headers are
/// ignored, no data inherited").
pub fn load(storage: &impl Storage, path: &str, header: &[u8; 5]) -> Vec<DataPointKey> {
    let Ok(Some(data)) = storage.read_all(path) else {
        return Vec::new();
    };
    if data.len() < header.len() || &data[..header.len()] != header.as_slice() {
        return Vec::new();
    }
    let body = &data[header.len()..];
    body.chunks_exact(RECORD_LEN).map(decode_record).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hpap::DeviceType;
    use crate::platform::NoYield;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MemStorage(HashMap<String, Vec<u8>>);
    impl Storage for MemStorage {
        fn write_all(&mut self, path: &str, data: &[u8]) -> std::io::Result<()> {
            self.0.insert(path.to_string(), data.to_vec());
            Ok(())
        }
        fn read_all(&self, path: &str) -> std::io::Result<Option<Vec<u8>>> {
            Ok(self.0.get(path).cloned())
        }
    }

    #[test]
    fn roundtrip_through_storage() {
        let mut storage = MemStorage::default();
        let keys = vec![
            DataPointKey::new(DeviceId::exact(DeviceType::System, 0), 0x0126),
            DataPointKey::new(DeviceId::exact(DeviceType::Display, 0x1F), 0x0005),
        ];
        save(&mut storage, SUBSCRIPTIONS_PATH, SUBSCRIPTIONS_HEADER, &keys, &mut NoYield).unwrap();
        let loaded = load(&storage, SUBSCRIPTIONS_PATH, SUBSCRIPTIONS_HEADER);
        assert_eq!(loaded, keys);
    }

    #[test]
    fn missing_file_is_empty() {
        let storage = MemStorage::default();
        assert!(load(&storage, SUBSCRIPTIONS_PATH, SUBSCRIPTIONS_HEADER).is_empty());
    }

    #[test]
    fn mismatched_header_is_treated_as_empty() {
        let mut storage = MemStorage::default();
        storage.write_all(SUBSCRIPTIONS_PATH, b"~S0.9garbage").unwrap();
        assert!(load(&storage, SUBSCRIPTIONS_PATH, SUBSCRIPTIONS_HEADER).is_empty());
    }
}
