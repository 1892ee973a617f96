// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! A small definition table for the demo: the five date/time fields plus
//! one reading and one writable setpoint, grounded in the value ids the
//! real device family publishes (outside temperature, HC day setpoint).

use ehp_core::convert::{Codec, ConversionRegistry, Converter};
use ehp_core::datetime::{
    DATETIME_DAY_ID, DATETIME_HOUR_ID, DATETIME_MINUTE_ID, DATETIME_MONTH_ID, DATETIME_YEAR_ID,
};
use ehp_core::defs::{AccessMode, Definition, Repository, Unit};
use ehp_core::hpap::{DeviceId, DeviceType};

pub const OUTSIDE_TEMPERATURE_ID: u16 = 0x000C;
pub const ROOM_SET_TEMPERATURE_DAY_ID: u16 = 0x0005;

fn datetime_def(name: &str, codec_id: u16, converter_id: u16) -> Definition {
    Definition {
        name: name.to_string(),
        unit: Unit::None,
        source_pattern: DeviceId::exact(DeviceType::System, 0),
        access_mode: AccessMode::Readable,
        update_interval_ms: 60_000,
        codec_id,
        converter_id,
    }
}

/// Register the converters this table needs and build the repository.
pub fn seed(registry: &mut ConversionRegistry) -> Repository {
    let mut repo = Repository::new();

    let tenths = registry.register_converter(Converter::Numeric { decimal_point: -1 });
    let whole = registry.register_converter(Converter::Numeric { decimal_point: 0 });
    let signed16 = registry.codec_id(Codec::Signed16).expect("builtin codec registered");
    let unsigned8_high =
        registry.codec_id(Codec::Unsigned8High).expect("builtin codec registered");

    repo.load_builtins([
        (
            OUTSIDE_TEMPERATURE_ID,
            Definition {
                name: "outside temperature".to_string(),
                unit: Unit::Celsius,
                source_pattern: DeviceId::exact(DeviceType::System, 0),
                access_mode: AccessMode::Readable,
                update_interval_ms: 60_000,
                codec_id: signed16,
                converter_id: tenths,
            },
        ),
        (
            ROOM_SET_TEMPERATURE_DAY_ID,
            Definition {
                name: "set room temperature day".to_string(),
                unit: Unit::Celsius,
                source_pattern: DeviceId::any_address(DeviceType::HeatingCircuit),
                access_mode: AccessMode::Writable,
                update_interval_ms: 60_000,
                codec_id: signed16,
                converter_id: tenths,
            },
        ),
        (DATETIME_DAY_ID, datetime_def("current day", unsigned8_high, whole)),
        (DATETIME_MONTH_ID, datetime_def("current month", unsigned8_high, whole)),
        (DATETIME_YEAR_ID, datetime_def("current year", unsigned8_high, whole)),
        (DATETIME_HOUR_ID, datetime_def("current hour", unsigned8_high, whole)),
        (DATETIME_MINUTE_ID, datetime_def("current minute", unsigned8_high, whole)),
    ]);

    repo
}
