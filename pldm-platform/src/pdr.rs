// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * Platform Descriptor Record decoding.
 *
 * Copyright (c) 2025 Code Construct
 */

//! Platform Descriptor Records (PDRs), as retrieved with GetPDR.
//!
//! Numeric Sensor PDRs are decoded in full. Other record types are kept
//! as opaque data.

#[allow(unused)]
use log::{debug, error, info, trace, warn};

use deku::{deku_derive, DekuContainerRead, DekuRead, DekuWrite};
use enumset::{EnumSet, EnumSetType};

use pldm::{PldmError, Result};

use crate::codec::{decode, PlatformMessage};
use crate::proto::{NumericData, RangeData, SensorId};

/// Length of the common PDR header
pub const PDR_HEADER_LEN: usize = 10;

/// Supported PDR header version
pub const PDR_HEADER_VERSION: u8 = 1;

/// PDR type of a Numeric Sensor PDR
pub const PDR_TYPE_NUMERIC_SENSOR: u8 = 2;

/// Common PDR header
#[derive(Debug, DekuRead, DekuWrite, PartialEq, Eq, Clone)]
#[deku(endian = "little")]
pub struct PdrHeader {
    pub record_handle: u32,
    pub version: u8,
    pub pdr_type: u8,
    pub record_change: u16,
    pub data_length: u16,
}

/// Sensor threshold levels, as bits of `supportedThresholds`.
#[derive(EnumSetType, Debug)]
pub enum Threshold {
    UpperWarning = 0,
    UpperCritical = 1,
    UpperFatal = 2,
    LowerWarning = 3,
    LowerCritical = 4,
    LowerFatal = 5,
}

impl Threshold {
    /// Whether the threshold is crossed by rising readings.
    pub fn is_high(self) -> bool {
        matches!(
            self,
            Self::UpperWarning | Self::UpperCritical | Self::UpperFatal
        )
    }
}

/// Numeric Sensor PDR body, following the common header.
#[deku_derive(DekuRead, DekuWrite)]
#[derive(Debug, Clone, PartialEq)]
pub struct NumericSensorPdr {
    #[deku(endian = "little")]
    pub terminus_handle: u16,
    pub sensor_id: SensorId,
    #[deku(endian = "little")]
    pub entity_type: u16,
    #[deku(endian = "little")]
    pub entity_instance: u16,
    #[deku(endian = "little")]
    pub container_id: u16,
    pub sensor_init: u8,
    pub aux_names_pdr: bool,
    pub base_unit: u8,
    pub unit_modifier: i8,
    pub rate_unit: u8,
    pub base_oem_unit_handle: u8,
    pub aux_unit: u8,
    pub aux_unit_modifier: i8,
    pub aux_rate_unit: u8,
    pub rel: u8,
    pub aux_oem_unit_handle: u8,
    pub is_linear: bool,
    #[deku(temp, temp_value = "self.hysteresis.data_size()")]
    sensor_data_size: u8,
    #[deku(endian = "little")]
    pub resolution: f32,
    #[deku(endian = "little")]
    pub offset: f32,
    #[deku(endian = "little")]
    pub accuracy: u16,
    pub plus_tolerance: u8,
    pub minus_tolerance: u8,
    #[deku(ctx = "*sensor_data_size")]
    pub hysteresis: NumericData,
    pub supported_thresholds: u8,
    pub threshold_volatility: u8,
    #[deku(endian = "little")]
    pub state_transition_interval: f32,
    #[deku(endian = "little")]
    pub update_interval: f32,
    #[deku(ctx = "*sensor_data_size")]
    pub max_readable: NumericData,
    #[deku(ctx = "*sensor_data_size")]
    pub min_readable: NumericData,
    #[deku(temp, temp_value = "self.nominal_value.data_size()")]
    range_field_format: u8,
    pub range_field_support: u8,
    #[deku(ctx = "*range_field_format")]
    pub nominal_value: RangeData,
    #[deku(ctx = "*range_field_format")]
    pub normal_max: RangeData,
    #[deku(ctx = "*range_field_format")]
    pub normal_min: RangeData,
    #[deku(ctx = "*range_field_format")]
    pub warning_high: RangeData,
    #[deku(ctx = "*range_field_format")]
    pub warning_low: RangeData,
    #[deku(ctx = "*range_field_format")]
    pub critical_high: RangeData,
    #[deku(ctx = "*range_field_format")]
    pub critical_low: RangeData,
    #[deku(ctx = "*range_field_format")]
    pub fatal_high: RangeData,
    #[deku(ctx = "*range_field_format")]
    pub fatal_low: RangeData,
}

impl PlatformMessage for NumericSensorPdr {
    const MIN_LEN: usize = 59;

    fn validate(&self) -> Result<()> {
        let size = self.hysteresis.data_size();
        if self.max_readable.data_size() != size
            || self.min_readable.data_size() != size
        {
            return Err(PldmError::InvalidData);
        }
        let fmt = self.nominal_value.data_size();
        let range = [
            &self.normal_max,
            &self.normal_min,
            &self.warning_high,
            &self.warning_low,
            &self.critical_high,
            &self.critical_low,
            &self.fatal_high,
            &self.fatal_low,
        ];
        if range.iter().any(|r| r.data_size() != fmt) {
            return Err(PldmError::InvalidData);
        }
        Ok(())
    }
}

impl NumericSensorPdr {
    /// Threshold levels the sensor reports.
    ///
    /// Reserved bits are ignored.
    pub fn thresholds(&self) -> EnumSet<Threshold> {
        EnumSet::from_u8_truncated(self.supported_thresholds)
    }

    /// Raw value of a supported threshold, `None` if unsupported.
    pub fn threshold(&self, t: Threshold) -> Option<&RangeData> {
        if !self.thresholds().contains(t) {
            return None;
        }
        Some(match t {
            Threshold::UpperWarning => &self.warning_high,
            Threshold::UpperCritical => &self.critical_high,
            Threshold::UpperFatal => &self.fatal_high,
            Threshold::LowerWarning => &self.warning_low,
            Threshold::LowerCritical => &self.critical_low,
            Threshold::LowerFatal => &self.fatal_low,
        })
    }
}

/// Decoded body of a PDR
#[derive(Debug, Clone, PartialEq)]
pub enum PdrBody {
    /// Numeric Sensor PDR
    NumericSensor(NumericSensorPdr),
    /// Any other record type, undecoded
    Other(Vec<u8>),
}

/// A complete PDR
#[derive(Debug, Clone, PartialEq)]
pub struct PdrRecord {
    pub header: PdrHeader,
    pub body: PdrBody,
}

impl PdrRecord {
    /// Decode a full record, as returned in GetPDR record data.
    ///
    /// The header's data length must match the remaining data exactly.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < PDR_HEADER_LEN {
            return Err(PldmError::InvalidLength);
        }
        let ((rest, _), header) = PdrHeader::from_bytes((buf, 0))?;

        if header.version != PDR_HEADER_VERSION {
            debug!(
                "PDR {} has unsupported header version {}",
                header.record_handle, header.version
            );
            return Err(PldmError::InvalidData);
        }

        if rest.len() != header.data_length as usize {
            debug!(
                "PDR {} length {} doesn't match data {}",
                header.record_handle,
                header.data_length,
                rest.len()
            );
            return Err(PldmError::InvalidLength);
        }

        let body = match header.pdr_type {
            PDR_TYPE_NUMERIC_SENSOR => PdrBody::NumericSensor(decode(rest)?),
            t => {
                trace!("Opaque PDR type {t}");
                PdrBody::Other(rest.to_vec())
            }
        };

        Ok(Self { header, body })
    }

    /// Returns the numeric sensor body, if this is a Numeric Sensor PDR.
    pub fn numeric_sensor(&self) -> Option<&NumericSensorPdr> {
        match &self.body {
            PdrBody::NumericSensor(n) => Some(n),
            PdrBody::Other(_) => None,
        }
    }
}
