// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * PLDM Platform Monitoring and Control.
 *
 * Copyright (c) 2024-2025 Code Construct
 */

#![forbid(unsafe_code)]

//! PLDM Platform Monitoring and Control (DSP0248) messages.
//!
//! Message bodies are defined in [`proto`], with PDR decoding in [`pdr`].
//! [`codec`] provides length-checked encoding, and [`requester`] builds
//! requests and parses their responses.

pub mod codec;
pub mod pdr;
pub mod proto;
pub mod requester;

#[cfg(any(test, feature = "test-utils"))]
pub mod testutil;

/// Re-export of `deku`, for callers using the message types directly.
pub use deku;

/// PLDM type for Platform Monitoring and Control
pub const PLDM_TYPE_PLATFORM: u8 = 2;
