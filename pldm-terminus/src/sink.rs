// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * Copyright (c) 2025 Code Construct
 */

//! Publication of sensor state to an external object model.

use core::fmt;

#[allow(unused)]
use log::{debug, error, info, trace, warn};

/// A published property value
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Double(f64),
    Int(i64),
    Bool(bool),
    String(String),
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Double(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{:?}", v),
        }
    }
}

/// Receives property updates for objects.
///
/// Publication is one-way, the sink has no way to report failure.
pub trait PropertySink {
    /// Sets properties of the object at `path`, creating it if needed.
    fn publish(&mut self, path: &str, props: &[(&str, PropertyValue)]);

    /// Removes the object at `path`.
    fn remove(&mut self, _path: &str) {}
}

/// A sink that logs updates.
#[derive(Debug, Default)]
pub struct LogSink;

impl PropertySink for LogSink {
    fn publish(&mut self, path: &str, props: &[(&str, PropertyValue)]) {
        for (name, value) in props {
            debug!("{path} {name} = {value}");
        }
    }

    fn remove(&mut self, path: &str) {
        debug!("{path} removed");
    }
}
