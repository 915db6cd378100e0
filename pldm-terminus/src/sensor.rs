// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * Numeric sensor state.
 *
 * Copyright (c) 2025 Code Construct
 */

//! Numeric sensors, their readings and threshold alarms.

use core::fmt;

#[allow(unused)]
use log::{debug, error, info, trace, warn};

use enumset::EnumSet;
use pldm_platform::pdr::{NumericSensorPdr, Threshold};
use pldm_platform::proto::{GetSensorReadingResp, SensorId, SensorOperationalState};

use crate::sink::{PropertySink, PropertyValue};
use crate::Tid;

/// Object path prefix for sensors
pub const SENSOR_PATH_PREFIX: &str = "/xyz/openbmc_project/sensors";

/// Identifies a sensor across all termini.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SensorKey {
    pub tid: Tid,
    pub sensor: SensorId,
}

impl fmt::Display for SensorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tid {} sensor {}", self.tid, self.sensor)
    }
}

/// Converts raw readings to engineering units.
///
/// `value = (resolution * raw + offset) * 10^unit_modifier`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Conversion {
    pub resolution: f64,
    pub offset: f64,
    pub unit_modifier: i8,
}

impl Conversion {
    pub fn from_pdr(pdr: &NumericSensorPdr) -> Self {
        Self {
            resolution: pdr.resolution.into(),
            offset: pdr.offset.into(),
            unit_modifier: pdr.unit_modifier,
        }
    }

    pub fn apply(&self, raw: f64) -> f64 {
        (self.resolution * raw + self.offset) * self.scale()
    }

    /// Converts a difference between raw values. The offset cancels.
    pub fn apply_delta(&self, raw: f64) -> f64 {
        self.resolution * raw * self.scale()
    }

    fn scale(&self) -> f64 {
        10f64.powi(self.unit_modifier.into())
    }
}

/// Evaluates a threshold alarm with hysteresis.
///
/// A high alarm asserts once `reading >= threshold`, and deasserts only
/// once `reading < threshold - hysteresis`. A low alarm asserts at
/// `reading <= threshold` and deasserts above `threshold + hysteresis`.
/// Between those the previous `alarm` state holds.
pub fn check_threshold(
    alarm: bool,
    high: bool,
    reading: f64,
    threshold: f64,
    hysteresis: f64,
) -> bool {
    if high {
        if reading >= threshold {
            true
        } else if reading < threshold - hysteresis {
            false
        } else {
            alarm
        }
    } else if reading <= threshold {
        true
    } else if reading > threshold + hysteresis {
        false
    } else {
        alarm
    }
}

/// Sensor unit, from the PDR base unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorUnit {
    DegreesC,
    Volts,
    Amperes,
    Watts,
    Joules,
    Rpms,
    Other(u8),
}

impl SensorUnit {
    pub fn from_base_unit(unit: u8) -> Self {
        match unit {
            2 => Self::DegreesC,
            5 => Self::Volts,
            6 => Self::Amperes,
            7 => Self::Watts,
            8 => Self::Joules,
            19 => Self::Rpms,
            u => Self::Other(u),
        }
    }

    /// Path namespace for sensors of this unit
    pub fn namespace(&self) -> &'static str {
        match self {
            Self::DegreesC => "temperature",
            Self::Volts => "voltage",
            Self::Amperes => "current",
            Self::Watts => "power",
            Self::Joules => "energy",
            Self::Rpms => "fan_tach",
            Self::Other(_) => "unknown",
        }
    }

    /// Published unit property
    pub fn property(&self) -> String {
        let name = match self {
            Self::DegreesC => "DegreesC",
            Self::Volts => "Volts",
            Self::Amperes => "Amperes",
            Self::Watts => "Watts",
            Self::Joules => "Joules",
            Self::Rpms => "RPMS",
            Self::Other(_) => return String::new(),
        };
        format!("xyz.openbmc_project.Sensor.Value.Unit.{name}")
    }
}

/// Alarm state for one threshold level
#[derive(Debug, Clone)]
pub struct ThresholdAlarm {
    pub level: Threshold,
    /// Threshold in engineering units
    pub value: f64,
    pub asserted: bool,
}

impl ThresholdAlarm {
    fn alarm_property(&self) -> &'static str {
        match self.level {
            Threshold::UpperWarning => "WarningAlarmHigh",
            Threshold::LowerWarning => "WarningAlarmLow",
            Threshold::UpperCritical => "CriticalAlarmHigh",
            Threshold::LowerCritical => "CriticalAlarmLow",
            Threshold::UpperFatal => "HardShutdownAlarmHigh",
            Threshold::LowerFatal => "HardShutdownAlarmLow",
        }
    }

    fn value_property(&self) -> &'static str {
        match self.level {
            Threshold::UpperWarning => "WarningHigh",
            Threshold::LowerWarning => "WarningLow",
            Threshold::UpperCritical => "CriticalHigh",
            Threshold::LowerCritical => "CriticalLow",
            Threshold::UpperFatal => "HardShutdownHigh",
            Threshold::LowerFatal => "HardShutdownLow",
        }
    }
}

/// A numeric sensor on a terminus.
///
/// The value is NaN whenever the sensor is not both available and
/// functional. A sensor starts non-functional until its first reading.
#[derive(Debug, Clone)]
pub struct NumericSensor {
    pub key: SensorKey,
    pub name: String,
    pub path: String,
    pub unit: SensorUnit,
    /// Minimum time between readings, 0 to read on every poll
    pub update_interval_ms: u64,
    pub max_value: f64,
    pub min_value: f64,
    conversion: Conversion,
    hysteresis: f64,
    thresholds: Vec<ThresholdAlarm>,
    value: f64,
    available: bool,
    functional: bool,
}

impl NumericSensor {
    /// Create a sensor from its PDR.
    ///
    /// `path` overrides the default object path derived from `name`.
    pub fn from_pdr(
        tid: Tid,
        pdr: &NumericSensorPdr,
        name: String,
        path: Option<String>,
    ) -> Self {
        let conversion = Conversion::from_pdr(pdr);
        let unit = SensorUnit::from_base_unit(pdr.base_unit);
        let path = path.unwrap_or_else(|| {
            format!("{SENSOR_PATH_PREFIX}/{}/{name}", unit.namespace())
        });

        let thresholds = pdr
            .thresholds()
            .iter()
            .filter_map(|level| {
                pdr.threshold(level).map(|raw| ThresholdAlarm {
                    level,
                    value: conversion.apply(raw.as_f64()),
                    asserted: false,
                })
            })
            .collect();

        let interval = f64::from(pdr.update_interval);
        let update_interval_ms = if interval.is_finite() && interval > 0.0 {
            (interval * 1000.0) as u64
        } else {
            0
        };

        Self {
            key: SensorKey {
                tid,
                sensor: pdr.sensor_id,
            },
            name,
            path,
            unit,
            update_interval_ms,
            max_value: conversion.apply(pdr.max_readable.as_f64()),
            min_value: conversion.apply(pdr.min_readable.as_f64()),
            conversion,
            hysteresis: conversion.apply_delta(pdr.hysteresis.as_f64()),
            thresholds,
            value: f64::NAN,
            available: true,
            functional: false,
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn available(&self) -> bool {
        self.available
    }

    pub fn functional(&self) -> bool {
        self.functional
    }

    pub fn conversion(&self) -> &Conversion {
        &self.conversion
    }

    /// Hysteresis in engineering units
    pub fn hysteresis(&self) -> f64 {
        self.hysteresis
    }

    /// Threshold levels reported by this sensor
    pub fn levels(&self) -> EnumSet<Threshold> {
        self.thresholds.iter().map(|t| t.level).collect()
    }

    /// Alarm state of a level, `None` if the sensor has no such threshold.
    pub fn alarm(&self, level: Threshold) -> Option<bool> {
        self.thresholds
            .iter()
            .find(|t| t.level == level)
            .map(|t| t.asserted)
    }

    /// Applies a GetSensorReading response.
    pub fn update_reading(&mut self, resp: &GetSensorReadingResp) {
        match resp.op_state {
            SensorOperationalState::Enabled => {
                let v = self.conversion.apply(resp.reading.as_f64());
                trace!("{} raw {:?} value {v}", self.name, resp.reading);
                self.set_value(v);
            }
            SensorOperationalState::Unavailable => {
                self.set_state(false, false);
            }
            SensorOperationalState::Disabled => {
                self.set_state(true, false);
            }
            s => {
                debug!("{} operational state {s:?}", self.name);
                self.set_state(true, false);
            }
        }
    }

    /// Marks the sensor non-functional after a failed reading.
    ///
    /// Availability is unchanged.
    pub fn handle_error(&mut self) {
        let available = self.available;
        self.set_state(available, false);
    }

    /// Marks the sensor unavailable, when its terminus is unreachable.
    pub fn set_unavailable(&mut self) {
        self.set_state(false, self.functional);
    }

    fn set_state(&mut self, available: bool, functional: bool) {
        self.available = available;
        self.functional = functional;
        self.value = f64::NAN;
    }

    fn set_value(&mut self, v: f64) {
        if !v.is_finite() {
            warn!("{} reading converts to {v}", self.name);
            self.handle_error();
            return;
        }
        self.available = true;
        self.functional = true;
        self.value = v;

        for t in self.thresholds.iter_mut() {
            let prev = t.asserted;
            t.asserted = check_threshold(
                prev,
                t.level.is_high(),
                v,
                t.value,
                self.hysteresis,
            );
            if t.asserted != prev {
                let change = if t.asserted { "asserted" } else { "deasserted" };
                info!(
                    "{} {:?} {change} at {v}, threshold {}",
                    self.name, t.level, t.value
                );
            }
        }
    }

    /// Publishes current state to `sink`.
    pub fn publish(&self, sink: &mut dyn PropertySink) {
        let mut props = vec![
            ("Value", PropertyValue::Double(self.value)),
            ("Unit", PropertyValue::String(self.unit.property())),
            ("MaxValue", PropertyValue::Double(self.max_value)),
            ("MinValue", PropertyValue::Double(self.min_value)),
            ("Available", PropertyValue::Bool(self.available)),
            ("Functional", PropertyValue::Bool(self.functional)),
        ];
        for t in &self.thresholds {
            props.push((t.value_property(), PropertyValue::Double(t.value)));
            props.push((t.alarm_property(), PropertyValue::Bool(t.asserted)));
        }
        sink.publish(&self.path, &props);
    }
}
