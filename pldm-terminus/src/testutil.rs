// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * Copyright (c) 2025 Code Construct
 */

//! Shared helpers for unit tests.

use std::collections::BTreeMap;

use mctp::Eid;
use pldm::{PldmRequest, PldmResponse};

use crate::requester::Transport;
use crate::sink::{PropertySink, PropertyValue};

pub(crate) fn start_log() {
    let _ = env_logger::Builder::new()
        .filter(None, log::LevelFilter::Trace)
        .is_test(true)
        .try_init();
}

/// Records sent messages, optionally failing every send.
#[derive(Debug, Default)]
pub(crate) struct MockTransport {
    pub sent: Vec<(Eid, Vec<u8>)>,
    pub fail: bool,
}

impl Transport for MockTransport {
    fn send(&mut self, eid: Eid, msg: &[u8]) -> mctp::Result<()> {
        if self.fail {
            return Err(mctp::Error::TxFailure);
        }
        self.sent.push((eid, msg.to_vec()));
        Ok(())
    }
}

impl MockTransport {
    /// Takes the most recently sent request.
    pub fn pop(&mut self) -> (Eid, PldmRequest) {
        let (eid, b) = self.sent.pop().unwrap();
        (eid, PldmRequest::from_buf(&b).unwrap())
    }
}

/// Encodes a response to `req`.
pub(crate) fn respond(req: &PldmRequest, cc: u8, data: Vec<u8>) -> Vec<u8> {
    PldmResponse {
        data,
        ..req.response_cc(cc)
    }
    .to_bytes()
    .unwrap()
}

/// Keeps the latest value of each property.
#[derive(Debug, Default)]
pub(crate) struct RecordingSink {
    pub props: BTreeMap<(String, String), PropertyValue>,
    pub publishes: usize,
}

impl RecordingSink {
    pub fn get(&self, path: &str, prop: &str) -> Option<&PropertyValue> {
        self.props.get(&(path.to_string(), prop.to_string()))
    }
}

impl PropertySink for RecordingSink {
    fn publish(&mut self, path: &str, props: &[(&str, PropertyValue)]) {
        self.publishes += 1;
        for (k, v) in props {
            self.props
                .insert((path.to_string(), k.to_string()), v.clone());
        }
    }

    fn remove(&mut self, path: &str) {
        self.props.retain(|(p, _), _| p != path);
    }
}
