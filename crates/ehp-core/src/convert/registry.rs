// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Codec/converter registry: small dense ids, stable across restarts for a
//! given persisted configuration (spec.md §4.5, §9).

use serde_json::Value;

use super::codec::Codec;
use super::converter::Converter;
use crate::error::{Error, Result};

/// `Boolean` and `Identity` need no parameters, so they are always present
/// at these fixed ids; every other converter configuration is appended in
/// registration order starting at [`FIRST_DYNAMIC_CONVERTER_ID`].
fn builtin_converters() -> Vec<Converter> {
    vec![Converter::Boolean, Converter::Identity]
}
pub const BOOLEAN_CONVERTER_ID: u16 = 0;
pub const IDENTITY_CONVERTER_ID: u16 = 1;
pub const FIRST_DYNAMIC_CONVERTER_ID: u16 = 2;

const BUILTIN_CODECS: [Codec; 3] = [Codec::Unsigned16, Codec::Signed16, Codec::Unsigned8High];

/// Bidirectional raw↔integer↔JSON conversion pipelines, keyed by small
/// dense ids so a [`crate::defs`] definition can reference a pipeline
/// without owning it.
#[derive(Debug, Clone, Default)]
pub struct ConversionRegistry {
    converters: Vec<Converter>,
}

impl ConversionRegistry {
    /// A registry containing only the fixed built-in converters, ready to
    /// have persisted custom converters appended in their saved order.
    pub fn new() -> Self {
        Self {
            converters: builtin_converters(),
        }
    }

    pub fn codec_for_id(&self, id: u16) -> Option<Codec> {
        BUILTIN_CODECS.get(id as usize).copied()
    }

    pub fn codec_id(&self, codec: Codec) -> Option<u16> {
        BUILTIN_CODECS.iter().position(|&c| c == codec).map(|i| i as u16)
    }

    pub fn converter_for_id(&self, id: u16) -> Option<&Converter> {
        self.converters.get(id as usize)
    }

    /// Append a custom converter configuration, returning its new id.
    /// Callers restoring persisted converters must call this in the exact
    /// order the converters were originally persisted, so ids stay stable.
    pub fn register_converter(&mut self, converter: Converter) -> u16 {
        self.converters.push(converter);
        (self.converters.len() - 1) as u16
    }

    /// Decode a raw bus value into its semantic JSON representation.
    pub fn to_json(&self, codec_id: u16, converter_id: u16, raw: u16) -> Result<Value> {
        let codec = self.codec_for_id(codec_id).ok_or(Error::NotDefined)?;
        let converter = self.converter_for_id(converter_id).ok_or(Error::NotDefined)?;
        Ok(converter.from_integer(codec.decode(raw)))
    }

    /// Encode a semantic JSON value back to a raw bus value.
    pub fn from_json(&self, codec_id: u16, converter_id: u16, value: &Value) -> Result<u16> {
        let codec = self.codec_for_id(codec_id).ok_or(Error::NotDefined)?;
        let converter = self.converter_for_id(converter_id).ok_or(Error::NotDefined)?;
        let integer = converter.to_integer(value)?;
        codec.encode(integer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builtin_ids_are_fixed() {
        let registry = ConversionRegistry::new();
        assert_eq!(registry.converter_for_id(BOOLEAN_CONVERTER_ID), Some(&Converter::Boolean));
        assert_eq!(registry.converter_for_id(IDENTITY_CONVERTER_ID), Some(&Converter::Identity));
        assert_eq!(registry.codec_id(Codec::Unsigned16), Some(0));
    }

    #[test]
    fn dynamic_registration_is_stable_given_same_order() {
        let mut a = ConversionRegistry::new();
        let id_a = a.register_converter(Converter::Numeric { decimal_point: -2 });

        let mut b = ConversionRegistry::new();
        let id_b = b.register_converter(Converter::Numeric { decimal_point: -2 });

        assert_eq!(id_a, id_b);
        assert_eq!(id_a, FIRST_DYNAMIC_CONVERTER_ID);
    }

    #[test]
    fn to_json_and_back() {
        let mut registry = ConversionRegistry::new();
        let vid = registry.register_converter(Converter::Numeric { decimal_point: -1 });
        let codec_id = registry.codec_id(Codec::Unsigned16).unwrap();
        let value = registry.to_json(codec_id, vid, 65568).unwrap();
        assert_eq!(value, json!(6556.8));
        assert_eq!(registry.from_json(codec_id, vid, &value).unwrap(), 65568);
    }
}
