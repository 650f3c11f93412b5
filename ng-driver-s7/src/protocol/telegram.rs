//! Single-item telegrams: complete TPKT + COTP + S7 frames as raw bytes and
//! the matching response checks.

use super::{
    codec::Codec,
    error::{Error, ErrorCode, Result},
    frame::{
        build_data_message, build_read_var, build_write_var, parse_data_items,
        parse_return_codes, Cotp, S7Address, S7DataValue, S7Function, S7Header, S7Pdu,
        S7PduType, S7ReturnCode, S7VarSpec, Tpkt, WireDecode,
    },
};
use crate::{codec::S7Codec, types::Endianness};
use bytes::{Bytes, BytesMut};
use tokio_util::codec::Encoder;

/// S7 response header as seen at the front of a raw telegram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    /// TPKT length of the whole telegram
    pub total_length: u16,
    pub pdu_type: S7PduType,
    pub pdu_ref: u16,
    /// `Success` for PDU types without an error field
    pub error_code: ErrorCode,
}

fn frame_pdu(pdu: S7Pdu) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(7 + pdu.header.encoded_len() + 64);
    Codec.encode(build_data_message(pdu), &mut buf)?;
    Ok(buf.freeze())
}

/// ReadVar telegram for one item.
pub fn build_read_request(pdu_ref: u16, spec: &S7VarSpec) -> Result<Bytes> {
    frame_pdu(build_read_var(pdu_ref, std::slice::from_ref(spec))?)
}

/// WriteVar telegram for one item; `value` is the already encoded payload.
pub fn build_write_request(pdu_ref: u16, address: &S7Address, value: &[u8]) -> Result<Bytes> {
    let spec = S7VarSpec::try_from(address)?;
    frame_pdu(build_write_var(pdu_ref, &[(spec, value)])?)
}

/// Split a raw telegram into its TPKT length and S7 PDU.
fn parse_telegram(bytes: &Bytes) -> Result<(Tpkt, S7Pdu)> {
    let (cotp_bytes, tpkt) = Tpkt::parse(bytes, bytes, &())?;
    let (user, cotp) = Cotp::parse(cotp_bytes, bytes, &())?;
    match cotp {
        Cotp::D(params) if params.eot => {}
        Cotp::D(_) => {
            return Err(Error::ProtocolViolation {
                context: "segmented telegram",
            })
        }
        _ => return Err(Error::ErrUnexpectedPdu),
    }
    let (_rest, pdu) = S7Pdu::parse(user, bytes, &())?;
    Ok((tpkt, pdu))
}

pub fn parse_response_header(bytes: &[u8]) -> Result<ResponseHeader> {
    let (cotp_bytes, tpkt) = Tpkt::parse(bytes, &Bytes::new(), &())?;
    let (user, cotp) = Cotp::parse(cotp_bytes, &Bytes::new(), &())?;
    if !matches!(cotp, Cotp::D(_)) {
        return Err(Error::ErrUnexpectedPdu);
    }
    let (header, _) = S7Header::parse(user)?;
    Ok(ResponseHeader {
        total_length: tpkt.length,
        pdu_type: header.pdu_type,
        pdu_ref: header.pdu_ref,
        error_code: header.error_code.unwrap_or(ErrorCode::Success),
    })
}

#[inline]
fn item_count(pdu: &S7Pdu, expected: S7Function) -> Result<u8> {
    if pdu.function() != Some(expected) {
        return Err(Error::ErrUnexpectedPdu);
    }
    pdu.param.get(1).copied().ok_or(Error::InsufficientData {
        needed: 2,
        available: pdu.param.len(),
    })
}

/// First item of a ReadVar AckData, truncated to `expected` bytes.
pub fn read_response_data(pdu: &S7Pdu, expected: usize) -> Result<Bytes> {
    pdu.validate_response()?;
    let count = item_count(pdu, S7Function::ReadVar)?;
    let items = parse_data_items(count, &pdu.payload)?;
    let item = items.first().ok_or(Error::ProtocolViolation {
        context: "ReadVar response without items",
    })?;
    if item.return_code != S7ReturnCode::Success {
        return Err(Error::ItemRejected {
            code: item.return_code,
        });
    }
    let data = item.data.get(..expected).ok_or(Error::InsufficientData {
        needed: expected,
        available: item.data.len(),
    })?;
    Ok(pdu.payload.slice_ref(data))
}

/// Validate a raw ReadVar response and return the bytes of its first item.
pub fn extract_area_bytes(bytes: &Bytes, expected: usize) -> Result<Bytes> {
    let (_, pdu) = parse_telegram(bytes)?;
    read_response_data(&pdu, expected)
}

/// Per-item status of a WriteVar AckData; the first failure wins.
pub fn write_response_status(pdu: &S7Pdu, expected_items: usize) -> Result<()> {
    pdu.validate_response()?;
    let count = item_count(pdu, S7Function::WriteVar)?;
    if count as usize != expected_items {
        return Err(Error::ProtocolViolation {
            context: "WriteVar response item count mismatch",
        });
    }
    match parse_return_codes(count, &pdu.payload)?
        .into_iter()
        .find(|c| *c != S7ReturnCode::Success)
    {
        Some(code) => Err(Error::ItemRejected { code }),
        None => Ok(()),
    }
}

pub fn check_write_response(bytes: &Bytes, expected_items: usize) -> Result<()> {
    let (_, pdu) = parse_telegram(bytes)?;
    write_response_status(&pdu, expected_items)
}

/// Value of `address` inside a block of bytes fetched from `offset` 0 of the block.
pub fn extract_value(
    area: &[u8],
    offset: usize,
    address: &S7Address,
    order: Endianness,
) -> Result<S7DataValue> {
    let bytes = area.get(offset..).ok_or(Error::InsufficientData {
        needed: offset + address.span() as usize,
        available: area.len(),
    })?;
    S7Codec::decode(bytes, address, order)
}
