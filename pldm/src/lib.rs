// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * PLDM base message definitions.
 *
 * Copyright (c) 2023-2025 Code Construct
 */

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Platform Level Data Model (PLDM) base protocol support
//!
//! This crate implements the PLDM message header (DSP0240) and the base
//! request and response types used by higher-level PLDM requesters.
//!
//! No I/O is performed here. Messages are encoded into, and decoded from,
//! byte buffers exchanged with an MCTP transport. The MCTP message type byte
//! is not part of these buffers.

#[allow(unused)]
use log::{debug, error, info, trace, warn};

use deku::DekuError;
use num_derive::FromPrimitive;
use thiserror::Error;

/// Maximum size of a PLDM message, defining our buffer sizes.
pub const PLDM_MAX_MSGSIZE: usize = 1024;

/// Length of the PLDM message header.
pub const PLDM_HEADER_LEN: usize = 3;

/// Length of a PLDM response header, including the completion code.
pub const PLDM_RESP_HEADER_LEN: usize = PLDM_HEADER_LEN + 1;

/// Maximum instance ID value. Instance IDs are 5 bits.
pub const PLDM_IID_MAX: u8 = 0x1f;

/// Maximum PLDM type value. Types are 6 bits.
pub const PLDM_TYPE_MAX: u8 = 0x3f;

const HDR_RQ: u8 = 0x80;
const HDR_DATAGRAM: u8 = 0x40;
const HDR_VERSION_MASK: u8 = 0xc0;

/// Generic PLDM error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PldmError {
    /// Buffer is too short, truncated, or has trailing data
    #[error("invalid message length")]
    InvalidLength,
    /// A field holds a value outside its defined domain
    #[error("invalid message data")]
    InvalidData,
    /// Responder returned a non-success completion code
    #[error("PLDM command failed with completion code 0x{0:02x}")]
    Command(u8),
    /// PLDM protocol error
    #[error("PLDM protocol error: {0}")]
    Protocol(String),
}

impl From<DekuError> for PldmError {
    fn from(e: DekuError) -> Self {
        trace!("deku error {e}");
        match e {
            DekuError::Incomplete(_) => Self::InvalidLength,
            _ => Self::InvalidData,
        }
    }
}

/// Constructs a [`PldmError::Protocol`] from a message, with optional
/// format arguments for detail.
#[macro_export]
macro_rules! proto_error {
    ($msg: expr) => {
        $crate::PldmError::Protocol(::std::string::String::from($msg))
    };
    ($msg: expr, $($arg: tt)+) => {
        $crate::PldmError::Protocol(::std::format!(
            "{}: {}",
            $msg,
            ::std::format!($($arg)+)
        ))
    };
}

/// PLDM protocol return type
pub type Result<T> = core::result::Result<T, PldmError>;

/// Generic PLDM completion codes, from DSP0240.
///
/// Type-specific codes (0x80 and above) are defined by each PLDM type.
#[allow(missing_docs)]
#[allow(non_camel_case_types)]
#[derive(FromPrimitive, Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
pub enum CCode {
    SUCCESS = 0,
    ERROR = 1,
    ERROR_INVALID_DATA = 2,
    ERROR_INVALID_LENGTH = 3,
    ERROR_NOT_READY = 4,
    ERROR_UNSUPPORTED_PLDM_CMD = 5,
    ERROR_INVALID_PLDM_TYPE = 32,
}

/// Converts a completion code into a `Result`.
///
/// Any value other than [`CCode::SUCCESS`] is a [`PldmError::Command`].
pub fn ccode_result(cc: u8) -> Result<()> {
    if cc == CCode::SUCCESS as u8 {
        Ok(())
    } else {
        Err(PldmError::Command(cc))
    }
}

/// PLDM message header.
///
/// Wire layout:
///
/// | byte | bits                                                     |
/// |------|----------------------------------------------------------|
/// | 0    | Rq (7), D (6), reserved (5), Instance ID (4:0)           |
/// | 1    | Header version (7:6) = 0, PLDM type (5:0)                |
/// | 2    | Command code                                             |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PldmHeader {
    /// Request bit. Clear for responses.
    pub request: bool,
    /// Datagram bit. Unacknowledged request.
    pub datagram: bool,
    /// Instance ID
    pub iid: u8,
    /// PLDM type
    pub typ: u8,
    /// PLDM command code
    pub cmd: u8,
}

impl PldmHeader {
    /// Create a header for a request message.
    pub fn new_request(iid: u8, typ: u8, cmd: u8) -> Self {
        Self {
            request: true,
            datagram: false,
            iid,
            typ,
            cmd,
        }
    }

    /// Create a header for a response message.
    pub fn new_response(iid: u8, typ: u8, cmd: u8) -> Self {
        Self {
            request: false,
            datagram: false,
            iid,
            typ,
            cmd,
        }
    }

    /// Write the header to the start of `buf`.
    ///
    /// Returns the written length. Fails with [`PldmError::InvalidLength`]
    /// if `buf` is too short, and [`PldmError::InvalidData`] if the
    /// instance ID or type do not fit their bit fields. Nothing is written
    /// on failure.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        if self.iid > PLDM_IID_MAX || self.typ > PLDM_TYPE_MAX {
            return Err(PldmError::InvalidData);
        }
        let out = buf
            .get_mut(..PLDM_HEADER_LEN)
            .ok_or(PldmError::InvalidLength)?;

        let mut b0 = self.iid;
        if self.request {
            b0 |= HDR_RQ;
        }
        if self.datagram {
            b0 |= HDR_DATAGRAM;
        }
        out[0] = b0;
        out[1] = self.typ;
        out[2] = self.cmd;
        Ok(PLDM_HEADER_LEN)
    }

    /// Parse a header from the start of `buf`.
    ///
    /// Only header version 0 is accepted.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let hdr = buf.get(..PLDM_HEADER_LEN).ok_or(PldmError::InvalidLength)?;

        if hdr[1] & HDR_VERSION_MASK != 0 {
            debug!("Unsupported PLDM header version byte 0x{:02x}", hdr[1]);
            return Err(PldmError::InvalidData);
        }

        Ok(Self {
            request: hdr[0] & HDR_RQ != 0,
            datagram: hdr[0] & HDR_DATAGRAM != 0,
            iid: hdr[0] & PLDM_IID_MAX,
            typ: hdr[1] & PLDM_TYPE_MAX,
            cmd: hdr[2],
        })
    }
}

/// Base PLDM request type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PldmRequest {
    /// PLDM Instance ID
    pub iid: u8,
    /// PLDM type
    pub typ: u8,
    /// PLDM command code
    pub cmd: u8,
    /// PLDM command data payload
    pub data: Vec<u8>,
}

impl PldmRequest {
    /// Create a new PLDM request for a given PLDM message type and command
    /// number, with an empty payload.
    ///
    /// The instance ID is left as zero, and is expected to be set once
    /// allocated.
    pub fn new(typ: u8, cmd: u8) -> Self {
        Self::new_data(typ, cmd, Vec::new())
    }

    /// Create a new PLDM request with a data payload.
    pub fn new_data(typ: u8, cmd: u8, data: Vec<u8>) -> Self {
        Self {
            iid: 0,
            typ,
            cmd,
            data,
        }
    }

    /// Parse a PLDM request from a message buffer.
    ///
    /// Fails with [`PldmError::InvalidData`] if the message is a response.
    pub fn from_buf(buf: &[u8]) -> Result<Self> {
        let hdr = PldmHeader::decode(buf)?;
        if !hdr.request {
            return Err(PldmError::InvalidData);
        }

        Ok(Self {
            iid: hdr.iid,
            typ: hdr.typ,
            cmd: hdr.cmd,
            data: buf[PLDM_HEADER_LEN..].to_vec(),
        })
    }

    /// Returns the header for this request.
    pub fn header(&self) -> PldmHeader {
        PldmHeader::new_request(self.iid, self.typ, self.cmd)
    }

    /// Encode the complete request message, header and payload.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut v = vec![0u8; PLDM_HEADER_LEN + self.data.len()];
        self.header().encode(&mut v)?;
        v[PLDM_HEADER_LEN..].copy_from_slice(&self.data);
        Ok(v)
    }

    /// Create a success response to this request, using the instance,
    /// type and command from the request.
    pub fn response(&self) -> PldmResponse {
        self.response_cc(CCode::SUCCESS as u8)
    }

    /// Create a response to this request with a given completion code,
    /// and no payload.
    pub fn response_cc(&self, cc: u8) -> PldmResponse {
        PldmResponse {
            iid: self.iid,
            typ: self.typ,
            cmd: self.cmd,
            cc,
            data: Vec::new(),
        }
    }
}

/// Base PLDM response type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PldmResponse {
    /// PLDM Instance ID
    pub iid: u8,
    /// PLDM type
    pub typ: u8,
    /// PLDM command code (defined by the original request)
    pub cmd: u8,
    /// PLDM completion code
    pub cc: u8,
    /// PLDM response data payload. Does not include the cc field.
    pub data: Vec<u8>,
}

impl PldmResponse {
    /// Parse a PLDM response from a message buffer.
    ///
    /// The buffer must hold at least the header and the completion code.
    /// Fails with [`PldmError::InvalidData`] if the message is a request.
    pub fn from_buf(buf: &[u8]) -> Result<Self> {
        let hdr = PldmHeader::decode(buf)?;
        if hdr.request {
            return Err(PldmError::InvalidData);
        }
        let Some((&cc, data)) =
            buf.get(PLDM_HEADER_LEN..).and_then(|r| r.split_first())
        else {
            return Err(PldmError::InvalidLength);
        };

        Ok(Self {
            iid: hdr.iid,
            typ: hdr.typ,
            cmd: hdr.cmd,
            cc,
            data: data.to_vec(),
        })
    }

    /// Returns the header for this response.
    pub fn header(&self) -> PldmHeader {
        PldmHeader::new_response(self.iid, self.typ, self.cmd)
    }

    /// Encode the complete response message, header, completion code and
    /// payload.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut v = vec![0u8; PLDM_RESP_HEADER_LEN + self.data.len()];
        self.header().encode(&mut v)?;
        v[PLDM_HEADER_LEN] = self.cc;
        v[PLDM_RESP_HEADER_LEN..].copy_from_slice(&self.data);
        Ok(v)
    }

    /// Returns `Ok` for a successful completion code.
    pub fn ccode_result(&self) -> Result<()> {
        ccode_result(self.cc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn header_layout() {
        let h = PldmHeader::new_request(0x1a, 0x02, 0x11);
        let mut buf = [0u8; 3];
        assert_eq!(h.encode(&mut buf).unwrap(), 3);
        assert_eq!(buf, [0x9a, 0x02, 0x11]);

        let h = PldmHeader::new_response(3, 0x05, 0x15);
        h.encode(&mut buf).unwrap();
        assert_eq!(buf, [0x03, 0x05, 0x15]);
    }

    #[test]
    fn header_short() {
        let h = PldmHeader::new_request(1, 2, 3);
        let mut buf = [0xaa; 2];
        assert_eq!(h.encode(&mut buf), Err(PldmError::InvalidLength));
        assert_eq!(buf, [0xaa; 2]);

        assert_eq!(PldmHeader::decode(&[0x80, 0x02]), Err(PldmError::InvalidLength));
    }

    #[test]
    fn header_bad_fields() {
        let mut buf = [0u8; 3];
        let h = PldmHeader::new_request(32, 2, 3);
        assert_eq!(h.encode(&mut buf), Err(PldmError::InvalidData));
        let h = PldmHeader::new_request(0, 0x40, 3);
        assert_eq!(h.encode(&mut buf), Err(PldmError::InvalidData));

        // header version 1
        assert_eq!(
            PldmHeader::decode(&[0x80, 0x42, 0x11]),
            Err(PldmError::InvalidData)
        );
    }

    #[test]
    fn response_parse() {
        let r = PldmResponse::from_buf(&[0x07, 0x02, 0x11, 0x00, 0xaa, 0xbb])
            .unwrap();
        assert_eq!(r.iid, 7);
        assert_eq!(r.typ, 2);
        assert_eq!(r.cmd, 0x11);
        assert_eq!(r.cc, 0);
        assert_eq!(r.data, [0xaa, 0xbb]);
        assert!(r.ccode_result().is_ok());

        // missing completion code
        assert_eq!(
            PldmResponse::from_buf(&[0x07, 0x02, 0x11]),
            Err(PldmError::InvalidLength)
        );
        // a request is not a response
        assert_eq!(
            PldmResponse::from_buf(&[0x87, 0x02, 0x11, 0x00]),
            Err(PldmError::InvalidData)
        );
    }

    #[test]
    fn request_response() {
        let mut req = PldmRequest::new_data(2, 0x11, vec![1, 2, 3]);
        req.iid = 9;
        let b = req.to_bytes().unwrap();
        assert_eq!(b, [0x89, 0x02, 0x11, 1, 2, 3]);
        assert_eq!(PldmRequest::from_buf(&b).unwrap(), req);

        let resp = req.response_cc(0x88);
        assert_eq!(resp.to_bytes().unwrap(), [0x09, 0x02, 0x11, 0x88]);
        assert_eq!(resp.ccode_result(), Err(PldmError::Command(0x88)));
    }

    #[test]
    fn proto_error_format() {
        let cc = 0x80;
        let e = proto_error!("Error response", "{cc:02x}");
        assert_eq!(e, PldmError::Protocol("Error response: 80".into()));
    }

    proptest! {
        #[test]
        fn header_roundtrip(
            request: bool,
            datagram: bool,
            iid in 0..=PLDM_IID_MAX,
            typ in 0..=PLDM_TYPE_MAX,
            cmd: u8,
        ) {
            let h = PldmHeader { request, datagram, iid, typ, cmd };
            let mut buf = [0u8; PLDM_HEADER_LEN];
            h.encode(&mut buf).unwrap();
            prop_assert_eq!(PldmHeader::decode(&buf).unwrap(), h);
        }
    }
}
