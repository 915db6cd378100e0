// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * PLDM Platform message encoding and decoding.
 *
 * Copyright (c) 2025 Code Construct
 */

//! Length-checked encode and decode of platform message bodies.
//!
//! Encoding never partially writes the destination buffer. Decoding
//! requires the input to be consumed exactly.

#[allow(unused)]
use log::{debug, error, info, trace, warn};

use deku::{DekuContainerRead, DekuContainerWrite};

use pldm::{PldmError, PldmHeader, PldmResponse, Result, PLDM_HEADER_LEN};

use crate::proto::Cmd;
use crate::PLDM_TYPE_PLATFORM;

/// A PLDM Platform message body.
pub trait PlatformMessage:
    for<'a> DekuContainerRead<'a> + DekuContainerWrite
{
    /// Shortest valid encoding of this message.
    const MIN_LEN: usize;

    /// Checks constraints between fields that the wire format alone
    /// does not express.
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// Encode a message body into `buf`, returning the encoded length.
///
/// Fails with [`PldmError::InvalidLength`] if `buf` is too short, in which
/// case `buf` is left untouched.
pub fn encode<M: PlatformMessage>(msg: &M, buf: &mut [u8]) -> Result<usize> {
    let b = to_vec(msg)?;
    let have = buf.len();
    let out = buf.get_mut(..b.len()).ok_or_else(|| {
        trace!("Encode needs {} bytes, have {have}", b.len());
        PldmError::InvalidLength
    })?;
    out.copy_from_slice(&b);
    Ok(b.len())
}

/// Encode a message body to a new `Vec`.
pub fn to_vec<M: PlatformMessage>(msg: &M) -> Result<Vec<u8>> {
    msg.validate()?;
    Ok(msg.to_bytes()?)
}

/// Encode a complete platform request message, header and body, into
/// `buf`.
///
/// As for [`encode`], nothing is written if `buf` is too short.
pub fn encode_request<M: PlatformMessage>(
    iid: u8,
    cmd: Cmd,
    msg: &M,
    buf: &mut [u8],
) -> Result<usize> {
    let body = to_vec(msg)?;
    let total = PLDM_HEADER_LEN + body.len();
    if buf.len() < total {
        return Err(PldmError::InvalidLength);
    }
    let hdr = PldmHeader::new_request(iid, PLDM_TYPE_PLATFORM, cmd as u8);
    hdr.encode(buf)?;
    buf[PLDM_HEADER_LEN..total].copy_from_slice(&body);
    Ok(total)
}

/// Decode a message body, requiring all of `buf` to be consumed.
pub fn decode<M: PlatformMessage>(buf: &[u8]) -> Result<M> {
    if buf.len() < M::MIN_LEN {
        return Err(PldmError::InvalidLength);
    }
    let ((rest, offset), msg) = M::from_bytes((buf, 0))?;
    if !rest.is_empty() || offset != 0 {
        trace!("{} trailing bytes", rest.len());
        return Err(PldmError::InvalidLength);
    }
    msg.validate()?;
    Ok(msg)
}

/// Decode the body of a response.
///
/// A non-success completion code fails with [`PldmError::Command`] without
/// examining the body.
pub fn decode_response<M: PlatformMessage>(resp: &PldmResponse) -> Result<M> {
    resp.ccode_result()?;
    decode(&resp.data)
}

/// Check a response that carries only a completion code.
pub fn decode_empty_response(resp: &PldmResponse) -> Result<()> {
    resp.ccode_result()?;
    if !resp.data.is_empty() {
        return Err(PldmError::InvalidLength);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::*;
    use proptest::prelude::*;

    fn numeric_data() -> impl Strategy<Value = NumericData> {
        prop_oneof![
            any::<u8>().prop_map(NumericData::U8),
            any::<i8>().prop_map(NumericData::I8),
            any::<u16>().prop_map(NumericData::U16),
            any::<i16>().prop_map(NumericData::I16),
            any::<u32>().prop_map(NumericData::U32),
            any::<i32>().prop_map(NumericData::I32),
        ]
    }

    // pending and present values share a data size
    fn numeric_pair() -> impl Strategy<Value = (NumericData, NumericData)> {
        use NumericData::*;
        prop_oneof![
            any::<(u8, u8)>().prop_map(|(a, b)| (U8(a), U8(b))),
            any::<(i8, i8)>().prop_map(|(a, b)| (I8(a), I8(b))),
            any::<(u16, u16)>().prop_map(|(a, b)| (U16(a), U16(b))),
            any::<(i16, i16)>().prop_map(|(a, b)| (I16(a), I16(b))),
            any::<(u32, u32)>().prop_map(|(a, b)| (U32(a), U32(b))),
            any::<(i32, i32)>().prop_map(|(a, b)| (I32(a), I32(b))),
        ]
    }

    fn effecter_op_state() -> impl Strategy<Value = EffecterOperationalState> {
        (0u8..9).prop_map(|v| {
            num_traits::FromPrimitive::from_u8(v)
                .unwrap_or(EffecterOperationalState::Failed)
        })
    }

    fn sensor_op_state() -> impl Strategy<Value = SensorOperationalState> {
        (0u8..8).prop_map(|v| {
            num_traits::FromPrimitive::from_u8(v)
                .unwrap_or(SensorOperationalState::Enabled)
        })
    }

    fn sensor_state() -> impl Strategy<Value = SensorState> {
        (0u8..11).prop_map(|v| {
            num_traits::FromPrimitive::from_u8(v).unwrap_or(SensorState::Unknown)
        })
    }

    #[test]
    fn short_buffer_untouched() {
        let req = GetPDRReq {
            record_handle: 7,
            data_transfer_handle: 0,
            transfer_operation_flag: TransferOperationFlag::GetFirstPart,
            request_count: 100,
            record_change_number: 0,
        };
        let mut buf = [0xa5u8; 12];
        assert_eq!(encode(&req, &mut buf), Err(PldmError::InvalidLength));
        assert_eq!(buf, [0xa5; 12]);

        let mut buf = [0xa5u8; 15];
        assert_eq!(
            encode_request(1, Cmd::GetPDR, &req, &mut buf),
            Err(PldmError::InvalidLength)
        );
        assert_eq!(buf, [0xa5; 15]);

        let mut buf = [0u8; 16];
        assert_eq!(encode_request(1, Cmd::GetPDR, &req, &mut buf), Ok(16));
        assert_eq!(&buf[..3], [0x81, 0x02, 0x51]);
    }

    #[test]
    fn trailing_bytes() {
        let buf = [0x01, 0x00, 0x00, 0xff];
        assert_eq!(
            decode::<GetSensorReadingReq>(&buf),
            Err(PldmError::InvalidLength)
        );
        assert_eq!(
            decode::<GetSensorReadingReq>(&buf[..3]),
            Ok(GetSensorReadingReq {
                sensor: SensorId(1),
                rearm: false
            })
        );
    }

    #[test]
    fn effecter_value_size_mismatch() {
        let resp = GetNumericEffecterValueResp {
            op_state: EffecterOperationalState::EnabledNoUpdatePending,
            pending: NumericData::U8(3),
            present: NumericData::U16(3),
        };
        assert_eq!(to_vec(&resp), Err(PldmError::InvalidData));

        // u16 data size, op state, pending, then a truncated present
        let buf = [0x02, 0x01, 0x10, 0x00, 0x20];
        assert_eq!(
            decode::<GetNumericEffecterValueResp>(&buf),
            Err(PldmError::InvalidLength)
        );
        let buf = [0x02, 0x01, 0x10, 0x00, 0x20, 0x00];
        assert_eq!(
            decode::<GetNumericEffecterValueResp>(&buf),
            Ok(GetNumericEffecterValueResp {
                op_state: EffecterOperationalState::EnabledNoUpdatePending,
                pending: NumericData::U16(0x10),
                present: NumericData::U16(0x20),
            })
        );
    }

    #[test]
    fn error_response_stops_decode() {
        let resp = PldmResponse {
            iid: 1,
            typ: PLDM_TYPE_PLATFORM,
            cmd: Cmd::GetSensorReading as u8,
            cc: INVALID_SENSOR_ID,
            data: vec![],
        };
        assert_eq!(
            decode_response::<GetSensorReadingResp>(&resp),
            Err(PldmError::Command(INVALID_SENSOR_ID))
        );
        assert_eq!(
            decode_empty_response(&resp),
            Err(PldmError::Command(INVALID_SENSOR_ID))
        );
    }

    proptest! {
        #[test]
        fn sensor_reading_resp(
            op_state in sensor_op_state(),
            present_state in sensor_state(),
            previous_state in sensor_state(),
            event_state in sensor_state(),
            reading in numeric_data(),
        ) {
            let resp = GetSensorReadingResp {
                op_state,
                event_enable: SensorEventMessageEnable::NoEventGeneration,
                present_state,
                previous_state,
                event_state,
                reading,
            };
            let mut buf = [0u8; 16];
            let l = encode(&resp, &mut buf).unwrap();
            prop_assert_eq!(decode::<GetSensorReadingResp>(&buf[..l]).unwrap(), resp);
        }

        #[test]
        fn sensor_reading_req(sensor: u16, rearm: bool) {
            let req = GetSensorReadingReq {
                sensor: SensorId(sensor),
                rearm,
            };
            let b = to_vec(&req).unwrap();
            prop_assert_eq!(b.len(), GetSensorReadingReq::MIN_LEN);
            prop_assert_eq!(decode::<GetSensorReadingReq>(&b).unwrap(), req);
        }

        #[test]
        fn get_numeric_effecter_req(effecter: u16) {
            let req = GetNumericEffecterValueReq {
                effecter: EffecterId(effecter),
            };
            let b = to_vec(&req).unwrap();
            prop_assert_eq!(&b, &effecter.to_le_bytes());
            prop_assert_eq!(decode::<GetNumericEffecterValueReq>(&b).unwrap(), req);
        }

        #[test]
        fn get_numeric_effecter_resp(
            op_state in effecter_op_state(),
            (pending, present) in numeric_pair(),
        ) {
            let resp = GetNumericEffecterValueResp {
                op_state,
                pending,
                present,
            };
            let b = to_vec(&resp).unwrap();
            prop_assert_eq!(b[0], present.data_size());
            prop_assert_eq!(decode::<GetNumericEffecterValueResp>(&b).unwrap(), resp);
        }

        #[test]
        fn get_pdr_req(
            record_handle: u32,
            data_transfer_handle: u32,
            first: bool,
            request_count: u16,
            record_change_number: u16,
        ) {
            let req = GetPDRReq {
                record_handle,
                data_transfer_handle,
                transfer_operation_flag: if first {
                    TransferOperationFlag::GetFirstPart
                } else {
                    TransferOperationFlag::GetNextPart
                },
                request_count,
                record_change_number,
            };
            let b = to_vec(&req).unwrap();
            prop_assert_eq!(b.len(), GetPDRReq::MIN_LEN);
            prop_assert_eq!(&b[..4], &record_handle.to_le_bytes());
            prop_assert_eq!(decode::<GetPDRReq>(&b).unwrap(), req);
        }

        #[test]
        fn set_numeric_effecter(effecter: u16, value in numeric_data()) {
            let req = SetNumericEffecterValueReq {
                effecter: EffecterId(effecter),
                value,
            };
            let b = to_vec(&req).unwrap();
            prop_assert_eq!(b.len(), 3 + match value.data_size() {
                DATA_SIZE_U8 | DATA_SIZE_I8 => 1,
                DATA_SIZE_U16 | DATA_SIZE_I16 => 2,
                _ => 4,
            });
            prop_assert_eq!(decode::<SetNumericEffecterValueReq>(&b).unwrap(), req);
        }

        #[test]
        fn state_effecter(effecter: u16, states in prop::collection::vec(any::<u8>(), 1..=8)) {
            let req = SetStateEffecterStatesReq {
                effecter: EffecterId(effecter),
                fields: states.iter().map(|&s| StateEffecterField {
                    set_request: SetRequest::RequestSet,
                    effecter_state: s,
                }).collect(),
            };
            let b = to_vec(&req).unwrap();
            prop_assert_eq!(b.len(), 3 + 2 * states.len());
            prop_assert_eq!(decode::<SetStateEffecterStatesReq>(&b).unwrap(), req);
        }

        #[test]
        fn get_pdr_resp(
            next: u32,
            data in prop::collection::vec(any::<u8>(), 0..64),
            crc: u8,
            end: bool,
        ) {
            let resp = GetPDRResp {
                next_record_handle: next,
                next_data_transfer_handle: 0,
                transfer_flag: if end { TransferFlag::End } else { TransferFlag::StartAndEnd },
                record_data: data,
                transfer_crc: end.then_some(crc),
            };
            let b = to_vec(&resp).unwrap();
            prop_assert_eq!(decode::<GetPDRResp>(&b).unwrap(), resp);
        }

        #[test]
        fn encode_never_partial(len in 0usize..8, value in numeric_data()) {
            let req = SetNumericEffecterValueReq {
                effecter: EffecterId(1),
                value,
            };
            let mut buf = vec![0x5au8; len];
            match encode(&req, &mut buf) {
                Ok(l) => prop_assert!(l <= len),
                Err(e) => {
                    prop_assert_eq!(e, PldmError::InvalidLength);
                    prop_assert!(buf.iter().all(|&b| b == 0x5a));
                }
            }
        }
    }
}
