// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * PLDM Platform Monitoring and Control message definitions.
 *
 * Copyright (c) 2024-2025 Code Construct
 */

use core::{num::ParseIntError, str::FromStr};

#[allow(unused)]
use log::{debug, error, info, trace, warn};

use num_derive::FromPrimitive;

use deku::{deku_derive, DekuRead, DekuWrite};

use pldm::{PldmError, Result};

use crate::codec::PlatformMessage;

/// PLDM Platform Commands
#[allow(missing_docs)]
#[derive(FromPrimitive, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Clone, Copy)]
#[repr(u8)]
pub enum Cmd {
    GetTerminusUID = 0x03,
    SetEventReceiver = 0x04,
    GetEventReceiver = 0x05,
    PlatformEventMessage = 0x0A,
    PollForPlatformEventMessage = 0x0B,
    SetNumericSensorEnable = 0x10,
    GetSensorReading = 0x11,
    GetSensorThresholds = 0x12,
    SetNumericEffecterEnable = 0x30,
    SetNumericEffecterValue = 0x31,
    GetNumericEffecterValue = 0x32,
    SetStateEffecterEnables = 0x38,
    SetStateEffecterStates = 0x39,
    GetStateEffecterStates = 0x3A,
    GetPDRRepositoryInfo = 0x50,
    GetPDR = 0x51,
    FindPDR = 0x52,
}

/// PLDM platform response codes
#[allow(missing_docs)]
mod plat_codes {
    pub const INVALID_SENSOR_ID: u8 = 0x80;
    pub const INVALID_EFFECTER_ID: u8 = 0x80;
    pub const INVALID_SEARCH_TYPE: u8 = 0x80;
    pub const REARM_UNAVAILABLE_IN_PRESENT_STATE: u8 = 0x81;
    pub const INVALID_STATE_VALUE: u8 = 0x81;
    pub const INVALID_DATA_TRANSFER_HANDLE: u8 = 0x80;
    pub const INVALID_TRANSFER_OPERATION_FLAG: u8 = 0x81;
    pub const INVALID_RECORD_HANDLE: u8 = 0x82;
    pub const INVALID_RECORD_CHANGE_NUMBER: u8 = 0x83;
    pub const TRANSFER_TIMEOUT: u8 = 0x84;
    pub const REPOSITORY_UPDATE_IN_PROGRESS: u8 = 0x85;
    pub const UNSUPPORTED_SENSORSTATE: u8 = 0x82;
    pub const EVENT_GENERATION_NOT_SUPPORTED: u8 = 0x82;
}

pub use plat_codes::*;

/// Data size tag for an 8-bit unsigned value
pub const DATA_SIZE_U8: u8 = 0;
/// Data size tag for an 8-bit signed value
pub const DATA_SIZE_I8: u8 = 1;
/// Data size tag for a 16-bit unsigned value
pub const DATA_SIZE_U16: u8 = 2;
/// Data size tag for a 16-bit signed value
pub const DATA_SIZE_I16: u8 = 3;
/// Data size tag for a 32-bit unsigned value
pub const DATA_SIZE_U32: u8 = 4;
/// Data size tag for a 32-bit signed value
pub const DATA_SIZE_I32: u8 = 5;
/// Range field format tag for a real32 value. Only valid for PDR range fields.
pub const DATA_SIZE_REAL32: u8 = 6;

/// A numeric sensor or effecter value, tagged by its data size.
///
/// The data size tag is carried separately on the wire, so is supplied as
/// context when decoding.
// repr(u8) doesn't work with with field-less variants for Deku
#[derive(Debug, Eq, PartialEq, Hash, Clone, Copy, DekuWrite, DekuRead)]
#[deku(endian = "little", ctx = "data_size: u8", id = "data_size")]
pub enum NumericData {
    #[deku(id = 0)]
    U8(u8),
    #[deku(id = 1)]
    I8(i8),
    #[deku(id = 2)]
    U16(u16),
    #[deku(id = 3)]
    I16(i16),
    #[deku(id = 4)]
    U32(u32),
    #[deku(id = 5)]
    I32(i32),
}

impl NumericData {
    /// Returns the wire data size tag for this value.
    pub fn data_size(&self) -> u8 {
        match self {
            Self::U8(_) => DATA_SIZE_U8,
            Self::I8(_) => DATA_SIZE_I8,
            Self::U16(_) => DATA_SIZE_U16,
            Self::I16(_) => DATA_SIZE_I16,
            Self::U32(_) => DATA_SIZE_U32,
            Self::I32(_) => DATA_SIZE_I32,
        }
    }

    /// Returns the raw value, widened to `f64`.
    pub fn as_f64(&self) -> f64 {
        match *self {
            Self::U8(v) => v.into(),
            Self::I8(v) => v.into(),
            Self::U16(v) => v.into(),
            Self::I16(v) => v.into(),
            Self::U32(v) => v.into(),
            Self::I32(v) => v.into(),
        }
    }

    /// Construct a value from a runtime data size tag.
    ///
    /// Fails with [`PldmError::InvalidData`] for an unknown tag, or when
    /// `raw` does not fit the tagged width.
    pub fn from_raw(data_size: u8, raw: i64) -> Result<Self> {
        let v = match data_size {
            DATA_SIZE_U8 => raw.try_into().map(Self::U8),
            DATA_SIZE_I8 => raw.try_into().map(Self::I8),
            DATA_SIZE_U16 => raw.try_into().map(Self::U16),
            DATA_SIZE_I16 => raw.try_into().map(Self::I16),
            DATA_SIZE_U32 => raw.try_into().map(Self::U32),
            DATA_SIZE_I32 => raw.try_into().map(Self::I32),
            _ => {
                debug!("Unknown numeric data size {data_size}");
                return Err(PldmError::InvalidData);
            }
        };
        v.map_err(|_| {
            debug!("Value {raw} out of range for data size {data_size}");
            PldmError::InvalidData
        })
    }
}

/// A PDR range field value, tagged by the range field format.
///
/// As [`NumericData`], with an additional real32 format.
#[derive(Debug, PartialEq, Clone, Copy, DekuWrite, DekuRead)]
#[deku(endian = "little", ctx = "data_size: u8", id = "data_size")]
pub enum RangeData {
    #[deku(id = 0)]
    U8(u8),
    #[deku(id = 1)]
    I8(i8),
    #[deku(id = 2)]
    U16(u16),
    #[deku(id = 3)]
    I16(i16),
    #[deku(id = 4)]
    U32(u32),
    #[deku(id = 5)]
    I32(i32),
    #[deku(id = 6)]
    F32(f32),
}

impl RangeData {
    /// Returns the wire range field format tag for this value.
    pub fn data_size(&self) -> u8 {
        match self {
            Self::U8(_) => DATA_SIZE_U8,
            Self::I8(_) => DATA_SIZE_I8,
            Self::U16(_) => DATA_SIZE_U16,
            Self::I16(_) => DATA_SIZE_I16,
            Self::U32(_) => DATA_SIZE_U32,
            Self::I32(_) => DATA_SIZE_I32,
            Self::F32(_) => DATA_SIZE_REAL32,
        }
    }

    /// Returns the raw value, widened to `f64`.
    pub fn as_f64(&self) -> f64 {
        match *self {
            Self::U8(v) => v.into(),
            Self::I8(v) => v.into(),
            Self::U16(v) => v.into(),
            Self::I16(v) => v.into(),
            Self::U32(v) => v.into(),
            Self::I32(v) => v.into(),
            Self::F32(v) => v.into(),
        }
    }
}

#[allow(missing_docs)]
#[derive(
    FromPrimitive, Debug, PartialEq, Eq, Copy, Clone, DekuRead, DekuWrite,
)]
#[deku(id_type = "u8")]
#[repr(u8)]
pub enum SensorOperationalState {
    Enabled = 0,
    Disabled,
    Unavailable,
    StatusUnknown,
    Failed,
    Initializing,
    ShuttingDown,
    InTest,
}

#[allow(missing_docs)]
#[derive(
    FromPrimitive, Debug, PartialEq, Eq, Copy, Clone, DekuRead, DekuWrite,
)]
#[deku(id_type = "u8")]
#[repr(u8)]
pub enum SensorEventMessageEnable {
    /// NoEventGeneration for GetSensor, NoChange for SetSensorEnable
    NoEventGeneration = 0,
    EventsDisabled,
    EventsEnabled,
    OpEventsOnlyEnabled,
    StateEventsOnlyEnabled,
}

#[allow(missing_docs)]
#[derive(
    FromPrimitive, Debug, PartialEq, Eq, Copy, Clone, DekuRead, DekuWrite,
)]
#[deku(id_type = "u8")]
#[repr(u8)]
pub enum SensorState {
    Unknown = 0,
    Normal,
    Warning,
    Critical,
    Fatal,
    LowerWarning,
    LowerCritical,
    LowerFatal,
    UpperWarning,
    UpperCritical,
    UpperFatal,
}

#[allow(missing_docs)]
#[derive(
    FromPrimitive, Debug, PartialEq, Eq, Copy, Clone, DekuRead, DekuWrite,
)]
#[deku(id_type = "u8")]
#[repr(u8)]
pub enum EffecterOperationalState {
    EnabledUpdatePending = 0,
    EnabledNoUpdatePending,
    Disabled,
    Unavailable,
    StatusUnknown,
    Failed,
    Initializing,
    ShuttingDown,
    InTest,
}

#[derive(
    Debug, DekuRead, DekuWrite, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy,
)]
#[deku(endian = "little")]
pub struct SensorId(pub u16);

impl FromStr for SensorId {
    type Err = ParseIntError;
    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        Ok(Self(if let Some(s) = s.strip_prefix("0x") {
            u16::from_str_radix(s, 16)
        } else {
            s.parse()
        }?))
    }
}

impl core::fmt::Display for SensorId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(
    Debug, DekuRead, DekuWrite, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy,
)]
#[deku(endian = "little")]
pub struct EffecterId(pub u16);

impl FromStr for EffecterId {
    type Err = ParseIntError;
    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        SensorId::from_str(s).map(|s| Self(s.0))
    }
}

#[derive(Debug, DekuRead, DekuWrite, PartialEq, Eq, Clone)]
pub struct GetSensorReadingReq {
    pub sensor: SensorId,
    pub rearm: bool,
}

#[deku_derive(DekuRead, DekuWrite)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetSensorReadingResp {
    #[deku(temp, temp_value = "self.reading.data_size()")]
    data_size: u8,
    pub op_state: SensorOperationalState,
    pub event_enable: SensorEventMessageEnable,
    pub present_state: SensorState,
    pub previous_state: SensorState,
    pub event_state: SensorState,
    #[deku(ctx = "*data_size")]
    pub reading: NumericData,
}

#[deku_derive(DekuRead, DekuWrite)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetNumericEffecterValueReq {
    pub effecter: EffecterId,
    #[deku(temp, temp_value = "self.value.data_size()")]
    data_size: u8,
    #[deku(ctx = "*data_size")]
    pub value: NumericData,
}

#[derive(Debug, DekuRead, DekuWrite, PartialEq, Eq, Clone)]
pub struct GetNumericEffecterValueReq {
    pub effecter: EffecterId,
}

/// GetNumericEffecterValue response.
///
/// `pending` and `present` share a single data size on the wire, so must
/// hold the same variant.
#[deku_derive(DekuRead, DekuWrite)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetNumericEffecterValueResp {
    #[deku(temp, temp_value = "self.present.data_size()")]
    data_size: u8,
    pub op_state: EffecterOperationalState,
    #[deku(ctx = "*data_size")]
    pub pending: NumericData,
    #[deku(ctx = "*data_size")]
    pub present: NumericData,
}

#[allow(missing_docs)]
#[derive(
    FromPrimitive, Debug, PartialEq, Eq, Copy, Clone, DekuRead, DekuWrite,
)]
#[deku(id_type = "u8")]
#[repr(u8)]
pub enum SetRequest {
    NoChange = 0,
    RequestSet = 1,
}

#[derive(Debug, DekuRead, DekuWrite, PartialEq, Eq, Clone, Copy)]
pub struct StateEffecterField {
    pub set_request: SetRequest,
    pub effecter_state: u8,
}

/// Maximum composite effecter count for SetStateEffecterStates
pub const MAX_COMPOSITE_EFFECTERS: usize = 8;

#[deku_derive(DekuRead, DekuWrite)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetStateEffecterStatesReq {
    pub effecter: EffecterId,
    #[deku(temp, temp_value = "self.fields.len() as u8")]
    composite_effecter_count: u8,
    #[deku(count = "composite_effecter_count")]
    pub fields: Vec<StateEffecterField>,
}

#[allow(missing_docs)]
#[derive(
    FromPrimitive, Debug, PartialEq, Eq, Copy, Clone, DekuRead, DekuWrite,
)]
#[deku(id_type = "u8")]
#[repr(u8)]
pub enum TransferOperationFlag {
    GetNextPart = 0,
    GetFirstPart = 1,
}

#[allow(missing_docs)]
#[derive(
    FromPrimitive, Debug, PartialEq, Eq, Copy, Clone, DekuRead, DekuWrite,
)]
#[deku(id_type = "u8")]
#[repr(u8)]
pub enum TransferFlag {
    Start = 0x00,
    Middle = 0x01,
    End = 0x04,
    StartAndEnd = 0x05,
}

#[derive(Debug, DekuRead, DekuWrite, PartialEq, Eq, Clone)]
pub struct GetPDRReq {
    #[deku(endian = "little")]
    pub record_handle: u32,
    #[deku(endian = "little")]
    pub data_transfer_handle: u32,
    pub transfer_operation_flag: TransferOperationFlag,
    #[deku(endian = "little")]
    pub request_count: u16,
    #[deku(endian = "little")]
    pub record_change_number: u16,
}

/// GetPDR response.
///
/// `transfer_crc` is present only for the final part of a multipart
/// transfer.
#[deku_derive(DekuRead, DekuWrite)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetPDRResp {
    #[deku(endian = "little")]
    pub next_record_handle: u32,
    #[deku(endian = "little")]
    pub next_data_transfer_handle: u32,
    pub transfer_flag: TransferFlag,
    #[deku(endian = "little", temp, temp_value = "self.record_data.len() as u16")]
    response_count: u16,
    #[deku(count = "response_count")]
    pub record_data: Vec<u8>,
    #[deku(cond = "*transfer_flag == TransferFlag::End")]
    pub transfer_crc: Option<u8>,
}

impl PlatformMessage for GetSensorReadingReq {
    const MIN_LEN: usize = 3;
}

impl PlatformMessage for GetSensorReadingResp {
    const MIN_LEN: usize = 7;
}

impl PlatformMessage for SetNumericEffecterValueReq {
    const MIN_LEN: usize = 4;
}

impl PlatformMessage for GetNumericEffecterValueReq {
    const MIN_LEN: usize = 2;
}

impl PlatformMessage for GetNumericEffecterValueResp {
    const MIN_LEN: usize = 4;

    fn validate(&self) -> Result<()> {
        if self.pending.data_size() != self.present.data_size() {
            return Err(PldmError::InvalidData);
        }
        Ok(())
    }
}

impl PlatformMessage for SetStateEffecterStatesReq {
    const MIN_LEN: usize = 5;

    fn validate(&self) -> Result<()> {
        if !(1..=MAX_COMPOSITE_EFFECTERS).contains(&self.fields.len()) {
            debug!("Bad composite effecter count {}", self.fields.len());
            return Err(PldmError::InvalidData);
        }
        Ok(())
    }
}

impl PlatformMessage for GetPDRReq {
    const MIN_LEN: usize = 13;
}

impl PlatformMessage for GetPDRResp {
    const MIN_LEN: usize = 11;

    fn validate(&self) -> Result<()> {
        if (self.transfer_flag == TransferFlag::End) != self.transfer_crc.is_some()
        {
            return Err(PldmError::InvalidData);
        }
        Ok(())
    }
}
