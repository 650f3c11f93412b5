use super::{
    super::error::{Error, ErrorCode, Result},
    types::S7PduType,
};
use bytes::BufMut;
use nom::{
    number::complete::{be_u16, u8 as nom_u8},
    sequence::tuple,
    IResult,
};

/// Protocol id that opens every S7 header
pub const S7_PROTOCOL_ID: u8 = 0x32;

/// `32 type reserved:2 pdu_ref:2 param_len:2 payload_len:2`
fn header_fields(input: &[u8]) -> IResult<&[u8], (u8, u8, u16, u16, u16, u16)> {
    tuple((nom_u8, nom_u8, be_u16, be_u16, be_u16, be_u16))(input)
}

/// Common S7 header. Ack/AckData append a 2-byte error code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S7Header {
    pub pdu_type: S7PduType,
    pub pdu_ref: u16,
    pub param_len: u16,
    pub payload_len: u16,
    pub error_code: Option<ErrorCode>,
}

impl S7Header {
    pub fn job(pdu_ref: u16) -> Self {
        Self {
            pdu_type: S7PduType::Job,
            pdu_ref,
            param_len: 0,
            payload_len: 0,
            error_code: None,
        }
    }

    pub fn ack_data(pdu_ref: u16, error_code: ErrorCode) -> Self {
        Self {
            pdu_type: S7PduType::AckData,
            pdu_ref,
            param_len: 0,
            payload_len: 0,
            error_code: Some(error_code),
        }
    }

    /// 10 bytes, or 12 for Ack/AckData.
    #[inline]
    pub fn encoded_len(&self) -> usize {
        if self.pdu_type.has_error_code() {
            12
        } else {
            10
        }
    }

    /// Parse the header and return the bytes that follow it.
    pub fn parse(input: &[u8]) -> Result<(S7Header, &[u8])> {
        let (rest, (protocol_id, pdu_type, _reserved, pdu_ref, param_len, payload_len)) =
            header_fields(input).map_err(|_| Error::InsufficientData {
                needed: 10,
                available: input.len(),
            })?;
        if protocol_id != S7_PROTOCOL_ID {
            return Err(Error::ProtocolViolation {
                context: "S7 protocol id must be 0x32",
            });
        }
        let pdu_type = S7PduType::try_from(pdu_type).map_err(|_| Error::ErrUnexpectedPdu)?;

        let (rest, error_code) = if pdu_type.has_error_code() {
            let (rest, raw) = be_u16::<_, nom::error::Error<&[u8]>>(rest).map_err(|_| {
                Error::InsufficientData {
                    needed: 12,
                    available: input.len(),
                }
            })?;
            (rest, Some(ErrorCode::from(raw)))
        } else {
            (rest, None)
        };
        Ok((
            S7Header {
                pdu_type,
                pdu_ref,
                param_len,
                payload_len,
                error_code,
            },
            rest,
        ))
    }

    pub fn encode_to<B: BufMut>(&self, dst: &mut B) {
        dst.put_u8(S7_PROTOCOL_ID);
        dst.put_u8(self.pdu_type as u8);
        dst.put_u16(0x0000);
        dst.put_u16(self.pdu_ref);
        dst.put_u16(self.param_len);
        dst.put_u16(self.payload_len);
        if self.pdu_type.has_error_code() {
            dst.put_u16(self.error_code.unwrap_or(ErrorCode::Success).raw());
        }
    }
}
