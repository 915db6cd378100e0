// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * PLDM terminus monitoring.
 *
 * Copyright (c) 2025 Code Construct
 */

#![forbid(unsafe_code)]

//! PLDM terminus monitoring core
//!
//! This crate manages remote PLDM termini reachable over MCTP. It
//! correlates requests with responses using per-endpoint instance IDs,
//! discovers numeric sensors from terminus PDRs, polls them periodically,
//! and tracks sensor values against their thresholds. A firmware inventory
//! tracks update managers for each component.
//!
//! The core is sans-IO. State machines are driven with a millisecond
//! timestamp and with received messages, and report the delay until their
//! next timeout. [`daemon::Daemon`] provides an async loop running a
//! [`manager::Manager`] on `smol`.

#[allow(unused)]
use log::{debug, error, info, trace, warn};

use thiserror::Error;

pub mod config;
pub mod daemon;
pub mod iid;
pub mod inventory;
pub mod manager;
pub mod poller;
pub mod requester;
pub mod sensor;
pub mod sink;

#[cfg(test)]
mod testutil;

pub use iid::{InstanceId, InstanceIds};
pub use inventory::SoftwareIdentifier;
pub use manager::Manager;
pub use requester::{Requester, Transport};

pub use mctp::Eid;
pub use pldm::PldmError;

/// Terminus monitoring error
#[derive(Error, Debug)]
pub enum Error {
    /// No instance ID is available for the endpoint
    #[error("Resource exhausted")]
    ResourceExhausted,
    /// The transport failed to send a message
    #[error("Transport error: {0}")]
    Transport(#[from] mctp::Error),
    /// No response arrived before the deadline
    #[error("Timed out")]
    TimedOut,
    /// An API contract was violated
    #[error("Invalid state: {0}")]
    InvalidState(&'static str),
    /// A firmware update is already running
    #[error("Update in progress for {0}")]
    UpdateInProgress(SoftwareIdentifier),
    /// No terminus with the given TID
    #[error("Unknown terminus {0}")]
    UnknownTerminus(u8),
    /// No effecter is configured for a property
    #[error("Unknown property {0}")]
    UnknownProperty(String),
    /// Configuration records are inconsistent
    #[error("Configuration error: {0}")]
    Config(String),
    /// PLDM protocol error
    #[error("PLDM error: {0}")]
    Pldm(#[from] PldmError),
}

/// Terminus monitoring result type
pub type Result<T> = core::result::Result<T, Error>;

/// PLDM terminus ID
pub type Tid = u8;
