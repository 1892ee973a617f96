// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Integer ↔ semantic JSON converters (spec.md §4.5).
//!
//! `Numeric`'s decimal-point formatting follows the original firmware's
//! text-based digit shifting (insert/strip a decimal point, or append
//! zeroes) rather than floating point, to avoid rounding surprises at the
//! edges of the representable range.

use serde_json::{json, Value};

use crate::error::{Error, Result};

/// Integer ↔ semantic JSON conversion.
#[derive(Debug, Clone, PartialEq)]
pub enum Converter {
    /// Decimal-point placement, `d ∈ [-6, 6]`.
    Numeric { decimal_point: i8 },
    Boolean,
    /// Named bits, indexed by bit position (`0..=15`).
    Bitfield { bits: Vec<(u8, String)> },
    /// `(integer, name)` pairs.
    Enumeration { entries: Vec<(i32, String)> },
    /// Supplemented built-in: a plain pass-through, used by definitions
    /// with no semantic converter configured.
    Identity,
}

impl Converter {
    pub fn from_integer(&self, value: i32) -> Value {
        match self {
            Converter::Numeric { decimal_point } => numeric_from_integer(value, *decimal_point),
            Converter::Boolean => match value {
                0 => json!(false),
                1 => json!(true),
                _ => Value::Null,
            },
            Converter::Bitfield { bits } => {
                let mut obj = serde_json::Map::with_capacity(bits.len());
                for (bit, name) in bits {
                    obj.insert(name.clone(), json!((value >> bit) & 1 == 1));
                }
                Value::Object(obj)
            }
            Converter::Enumeration { entries } => entries
                .iter()
                .find(|(i, _)| *i == value)
                .map(|(_, name)| json!(name))
                .unwrap_or(Value::Null),
            Converter::Identity => json!(value),
        }
    }

    pub fn to_integer(&self, value: &Value) -> Result<i32> {
        match self {
            Converter::Numeric { decimal_point } => numeric_to_integer(value, *decimal_point),
            Converter::Boolean => match value.as_bool() {
                Some(true) => Ok(1),
                Some(false) => Ok(0),
                None => Err(Error::OutOfRange),
            },
            Converter::Bitfield { bits } => {
                let obj = value.as_object().ok_or(Error::OutOfRange)?;
                let mut acc = 0i32;
                for (bit, name) in bits {
                    if obj.get(name).and_then(Value::as_bool).unwrap_or(false) {
                        acc |= 1 << bit;
                    }
                }
                Ok(acc)
            }
            Converter::Enumeration { entries } => {
                let name = value.as_str().ok_or(Error::OutOfRange)?;
                entries
                    .iter()
                    .find(|(_, n)| n == name)
                    .map(|(i, _)| *i)
                    .ok_or(Error::OutOfRange)
            }
            Converter::Identity => value
                .as_i64()
                .filter(|v| (i32::MIN as i64..=i32::MAX as i64).contains(v))
                .map(|v| v as i32)
                .ok_or(Error::OutOfRange),
        }
    }
}

fn numeric_from_integer(value: i32, decimal_point: i8) -> Value {
    if decimal_point == 0 {
        return json!(value);
    }
    if decimal_point > 0 {
        let scale = 10i64.pow(decimal_point as u32);
        return json!(value as i64 * scale);
    }

    let digits = decimal_point.unsigned_abs() as usize;
    let negative = value < 0;
    let magnitude = (value as i64).unsigned_abs();
    let digit_str = magnitude.to_string();
    let padded = if digit_str.len() <= digits {
        format!("{:0>width$}", digit_str, width = digits + 1)
    } else {
        digit_str
    };
    let split_at = padded.len() - digits;
    let (int_part, frac_part) = padded.split_at(split_at);
    let text = format!("{}{}.{}", if negative { "-" } else { "" }, int_part, frac_part);
    text.parse::<f64>().map(|f| json!(f)).unwrap_or(Value::Null)
}

fn numeric_to_integer(value: &Value, decimal_point: i8) -> Result<i32> {
    let number = value.as_f64().ok_or(Error::OutOfRange)?;
    if decimal_point == 0 {
        return Ok(number.round() as i32);
    }
    if decimal_point > 0 {
        let scale = 10i64.pow(decimal_point as u32) as f64;
        return Ok((number / scale).trunc() as i32);
    }
    let scale = 10i64.pow(decimal_point.unsigned_abs() as u32) as f64;
    Ok((number * scale).round() as i32)
}
