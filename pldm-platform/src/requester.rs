// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * PLDM Platform requester message construction.
 *
 * Copyright (c) 2024-2025 Code Construct
 */

//! Request builders and response parsers for the platform commands.
//!
//! These perform no I/O. Requests are returned as [`PldmRequest`]s with an
//! unassigned instance ID, for a correlator to allocate and send.

#[allow(unused)]
use log::{debug, error, info, trace, warn};

use pldm::{proto_error, PldmRequest, PldmResponse, Result};

use crate::codec::{decode_empty_response, decode_response, to_vec};
use crate::pdr::PdrRecord;
use crate::proto::*;
use crate::PLDM_TYPE_PLATFORM;

/// Largest PDR data count requested by [`get_pdr`].
pub const PDR_REQUEST_COUNT: u16 = 1000;

fn check_cmd(resp: &PldmResponse, cmd: Cmd) -> Result<()> {
    if resp.typ != PLDM_TYPE_PLATFORM || resp.cmd != cmd as u8 {
        return Err(proto_error!(
            "Unexpected response",
            "type {} cmd 0x{:02x}, expected {cmd:?}",
            resp.typ,
            resp.cmd
        ));
    }
    Ok(())
}

/// Reads a numeric sensor.
pub fn get_sensor_reading(sensor: SensorId, rearm: bool) -> Result<PldmRequest> {
    let r = GetSensorReadingReq { sensor, rearm };
    Ok(PldmRequest::new_data(
        PLDM_TYPE_PLATFORM,
        Cmd::GetSensorReading as u8,
        to_vec(&r)?,
    ))
}

/// Parses a GetSensorReading response.
pub fn parse_get_sensor_reading(
    resp: &PldmResponse,
) -> Result<GetSensorReadingResp> {
    check_cmd(resp, Cmd::GetSensorReading)?;
    decode_response(resp).inspect_err(|e| {
        trace!("GetSensorReading failed: {e}");
    })
}

/// Sets a numeric effecter.
///
/// The effecter's data size is taken from the variant of `value`.
pub fn set_numeric_effecter_value(
    effecter: EffecterId,
    value: NumericData,
) -> Result<PldmRequest> {
    let r = SetNumericEffecterValueReq { effecter, value };
    Ok(PldmRequest::new_data(
        PLDM_TYPE_PLATFORM,
        Cmd::SetNumericEffecterValue as u8,
        to_vec(&r)?,
    ))
}

/// Parses a SetNumericEffecterValue response.
pub fn parse_set_numeric_effecter_value(resp: &PldmResponse) -> Result<()> {
    check_cmd(resp, Cmd::SetNumericEffecterValue)?;
    decode_empty_response(resp)
}

/// Reads a numeric effecter.
pub fn get_numeric_effecter_value(effecter: EffecterId) -> Result<PldmRequest> {
    let r = GetNumericEffecterValueReq { effecter };
    Ok(PldmRequest::new_data(
        PLDM_TYPE_PLATFORM,
        Cmd::GetNumericEffecterValue as u8,
        to_vec(&r)?,
    ))
}

/// Parses a GetNumericEffecterValue response.
pub fn parse_get_numeric_effecter_value(
    resp: &PldmResponse,
) -> Result<GetNumericEffecterValueResp> {
    check_cmd(resp, Cmd::GetNumericEffecterValue)?;
    decode_response(resp)
}

/// Sets states of a composite state effecter.
///
/// Between one and eight fields are required.
pub fn set_state_effecter_states(
    effecter: EffecterId,
    fields: &[StateEffecterField],
) -> Result<PldmRequest> {
    let r = SetStateEffecterStatesReq {
        effecter,
        fields: fields.to_vec(),
    };
    Ok(PldmRequest::new_data(
        PLDM_TYPE_PLATFORM,
        Cmd::SetStateEffecterStates as u8,
        to_vec(&r)?,
    ))
}

/// Parses a SetStateEffecterStates response.
pub fn parse_set_state_effecter_states(resp: &PldmResponse) -> Result<()> {
    check_cmd(resp, Cmd::SetStateEffecterStates)?;
    decode_empty_response(resp)
}

/// Requests the first part of a PDR.
///
/// Record handle 0 retrieves the first record in the repository.
pub fn get_pdr(record_handle: u32) -> Result<PldmRequest> {
    let r = GetPDRReq {
        record_handle,
        data_transfer_handle: 0,
        transfer_operation_flag: TransferOperationFlag::GetFirstPart,
        request_count: PDR_REQUEST_COUNT,
        record_change_number: 0,
    };
    Ok(PldmRequest::new_data(
        PLDM_TYPE_PLATFORM,
        Cmd::GetPDR as u8,
        to_vec(&r)?,
    ))
}

/// Parses a GetPDR response holding a complete record.
///
/// Returns the record and the next record handle, 0 at the end of the
/// repository. Multipart transfers are rejected.
pub fn parse_get_pdr(resp: &PldmResponse) -> Result<(PdrRecord, u32)> {
    check_cmd(resp, Cmd::GetPDR)?;
    let r: GetPDRResp = decode_response(resp)?;

    if r.transfer_flag != TransferFlag::StartAndEnd {
        return Err(proto_error!(
            "Multipart PDR transfer unsupported",
            "flag {:?}",
            r.transfer_flag
        ));
    }

    let rec = PdrRecord::from_bytes(&r.record_data)?;
    Ok((rec, r.next_record_handle))
}
