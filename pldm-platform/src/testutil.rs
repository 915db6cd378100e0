// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * PDR fixtures for tests.
 *
 * Copyright (c) 2025 Code Construct
 */

//! Platform fixtures shared by tests of this crate and its dependents.
//!
//! Available to other crates with the `test-utils` feature.

use deku::DekuContainerWrite;

use pldm::Result;

use crate::codec::to_vec;
use crate::pdr::*;
use crate::proto::*;

/// A temperature sensor with u8 readings and unit conversion.
///
/// Upper and lower warning thresholds are 40 and 30, with hysteresis 2.
pub fn temp_sensor_pdr(id: u16) -> NumericSensorPdr {
    NumericSensorPdr {
        terminus_handle: 0,
        sensor_id: SensorId(id),
        entity_type: 0x87,
        entity_instance: 1,
        container_id: 0,
        sensor_init: 0,
        aux_names_pdr: false,
        base_unit: 2,
        unit_modifier: 0,
        rate_unit: 0,
        base_oem_unit_handle: 0,
        aux_unit: 0,
        aux_unit_modifier: 0,
        aux_rate_unit: 0,
        rel: 0,
        aux_oem_unit_handle: 0,
        is_linear: true,
        resolution: 1.0,
        offset: 0.0,
        accuracy: 0,
        plus_tolerance: 0,
        minus_tolerance: 0,
        hysteresis: NumericData::U8(2),
        // upper and lower warning
        supported_thresholds: 0b1001,
        threshold_volatility: 0,
        state_transition_interval: 0.0,
        update_interval: 0.0,
        max_readable: NumericData::U8(255),
        min_readable: NumericData::U8(0),
        range_field_support: 0,
        nominal_value: RangeData::U8(35),
        normal_max: RangeData::U8(40),
        normal_min: RangeData::U8(30),
        warning_high: RangeData::U8(40),
        warning_low: RangeData::U8(30),
        critical_high: RangeData::U8(0),
        critical_low: RangeData::U8(0),
        fatal_high: RangeData::U8(0),
        fatal_low: RangeData::U8(0),
    }
}

/// Wrap a numeric sensor PDR in a common header
pub fn record_bytes(handle: u32, pdr: &NumericSensorPdr) -> Result<Vec<u8>> {
    let body = to_vec(pdr)?;
    let mut v = PdrHeader {
        record_handle: handle,
        version: PDR_HEADER_VERSION,
        pdr_type: PDR_TYPE_NUMERIC_SENSOR,
        record_change: 0,
        data_length: body.len() as u16,
    }
    .to_bytes()?;
    v.extend_from_slice(&body);
    Ok(v)
}
