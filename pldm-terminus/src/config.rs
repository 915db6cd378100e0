// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * Terminus manager configuration.
 *
 * Copyright (c) 2025 Code Construct
 */

//! Runtime tunables and sensor/effecter mapping records.
//!
//! Mapping records describe how object properties relate to PLDM sensors
//! and effecters. They are loaded through a [`ConfigSource`] and validated
//! before use.

#[allow(unused)]
use log::{debug, error, info, trace, warn};

use pldm_platform::pdr::PDR_TYPE_NUMERIC_SENSOR;
use pldm_platform::proto::{EffecterId, SensorId, DATA_SIZE_I32};

use crate::poller::PollerConfig;
use crate::requester::RequesterConfig;
use crate::sink::PropertyValue;
use crate::{Error, Result};

/// PDR type of a State Sensor PDR
pub const PDR_TYPE_STATE_SENSOR: u8 = 4;

/// Settings for a [`Manager`](crate::Manager)
#[derive(Debug, Clone, Default)]
pub struct ManagerConfig {
    pub requester: RequesterConfig,
    pub poller: PollerConfig,
}

/// Type of a mapped property
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyType {
    Bool,
    Int,
    Double,
    String,
}

impl PropertyType {
    /// Whether `v` is a value of this type.
    pub fn accepts(&self, v: &PropertyValue) -> bool {
        matches!(
            (self, v),
            (Self::Bool, PropertyValue::Bool(_))
                | (Self::Int, PropertyValue::Int(_))
                | (Self::Double, PropertyValue::Double(_))
                | (Self::String, PropertyValue::String(_))
        )
    }
}

/// Maps an object property to a sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorDescriptor {
    pub path: String,
    pub interface: String,
    pub property: String,
    pub property_type: PropertyType,
    pub sensor_id: SensorId,
    pub pdr_type: u8,
}

impl SensorDescriptor {
    pub fn validate(&self) -> Result<()> {
        if self.path.is_empty() {
            return Err(Error::Config(format!(
                "sensor {} has no path",
                self.sensor_id
            )));
        }
        if self.pdr_type != PDR_TYPE_NUMERIC_SENSOR
            && self.pdr_type != PDR_TYPE_STATE_SENSOR
        {
            return Err(Error::Config(format!(
                "{}: unsupported PDR type {}",
                self.path, self.pdr_type
            )));
        }
        Ok(())
    }

    /// The object name, the final component of the path.
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// How an effecter is set
#[derive(Debug, Clone, PartialEq)]
pub enum EffecterKind {
    /// A numeric effecter with a given data size tag
    Numeric { data_size: u8 },
    /// A state effecter. `property_values[n]` sets state `states[n]`.
    State {
        states: Vec<u8>,
        property_values: Vec<PropertyValue>,
    },
}

/// Maps an object property to an effecter.
#[derive(Debug, Clone, PartialEq)]
pub struct EffecterDescriptor {
    pub path: String,
    pub interface: String,
    pub property: String,
    pub property_type: PropertyType,
    /// Endpoint of the terminus owning the effecter
    pub eid: u8,
    pub effecter_id: EffecterId,
    pub kind: EffecterKind,
}

impl EffecterDescriptor {
    pub fn validate(&self) -> Result<()> {
        match &self.kind {
            EffecterKind::Numeric { data_size } => {
                if *data_size > DATA_SIZE_I32 {
                    return Err(Error::Config(format!(
                        "{} {}: bad effecter data size {data_size}",
                        self.path, self.property
                    )));
                }
                if matches!(self.property_type, PropertyType::String) {
                    return Err(Error::Config(format!(
                        "{} {}: numeric effecter with string property",
                        self.path, self.property
                    )));
                }
            }
            EffecterKind::State {
                states,
                property_values,
            } => {
                if states.is_empty() || states.len() != property_values.len() {
                    return Err(Error::Config(format!(
                        "{} {}: {} states for {} property values",
                        self.path,
                        self.property,
                        states.len(),
                        property_values.len()
                    )));
                }
                if let Some(v) = property_values
                    .iter()
                    .find(|v| !self.property_type.accepts(v))
                {
                    return Err(Error::Config(format!(
                        "{} {}: value {v} is not {:?}",
                        self.path, self.property, self.property_type
                    )));
                }
            }
        }
        Ok(())
    }
}

/// A source of mapping records.
pub trait ConfigSource {
    fn load_sensor_config(&self, path: &str) -> Result<Vec<SensorDescriptor>>;

    fn load_effecter_config(&self, path: &str)
        -> Result<Vec<EffecterDescriptor>>;
}

/// Mapping records held in memory.
///
/// The load path is ignored.
#[derive(Debug, Clone, Default)]
pub struct StaticConfig {
    pub sensors: Vec<SensorDescriptor>,
    pub effecters: Vec<EffecterDescriptor>,
}

impl ConfigSource for StaticConfig {
    fn load_sensor_config(&self, _path: &str) -> Result<Vec<SensorDescriptor>> {
        Ok(self.sensors.clone())
    }

    fn load_effecter_config(
        &self,
        _path: &str,
    ) -> Result<Vec<EffecterDescriptor>> {
        Ok(self.effecters.clone())
    }
}

/// Loads and validates both sets of records.
pub fn load(
    source: &dyn ConfigSource,
    sensor_path: &str,
    effecter_path: &str,
) -> Result<(Vec<SensorDescriptor>, Vec<EffecterDescriptor>)> {
    let sensors = source.load_sensor_config(sensor_path)?;
    sensors.iter().try_for_each(SensorDescriptor::validate)?;

    let effecters = source.load_effecter_config(effecter_path)?;
    effecters.iter().try_for_each(EffecterDescriptor::validate)?;

    debug!(
        "Loaded {} sensor and {} effecter mappings",
        sensors.len(),
        effecters.len()
    );
    Ok((sensors, effecters))
}
