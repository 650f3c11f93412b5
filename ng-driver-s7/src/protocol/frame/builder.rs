use super::{
    super::error::{Error, ErrorCode, Result},
    comm::S7Header,
    cotp::{Cotp, CotpConnParams, CotpDataParams},
    item::{S7DataItem, S7VarSpec},
    types::{S7DataVariableType, S7Function, S7ReturnCode, S7TransportSize},
    S7AppBody, S7Message, S7Pdu, Tpkt, WireEncode,
};
use bytes::{BufMut, Bytes, BytesMut};

/// Setup Communication parameter: `F0 00 amq_caller:2 amq_callee:2 pdu_len:2`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupCommParams {
    pub amq_caller: u16,
    pub amq_callee: u16,
    pub pdu_len: u16,
}

impl Default for SetupCommParams {
    fn default() -> Self {
        Self {
            amq_caller: 8,
            amq_callee: 8,
            pdu_len: 480,
        }
    }
}

impl SetupCommParams {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(8);
        buf.put_u8(S7Function::SetupCommunication as u8);
        buf.put_u8(0x00);
        buf.put_u16(self.amq_caller);
        buf.put_u16(self.amq_callee);
        buf.put_u16(self.pdu_len);
        buf.freeze()
    }

    pub fn parse(param: &[u8]) -> Result<Self> {
        if param.len() < 8 {
            return Err(Error::InsufficientData {
                needed: 8,
                available: param.len(),
            });
        }
        if param[0] != S7Function::SetupCommunication as u8 {
            return Err(Error::ErrUnexpectedPdu);
        }
        Ok(Self {
            amq_caller: u16::from_be_bytes([param[2], param[3]]),
            amq_callee: u16::from_be_bytes([param[4], param[5]]),
            pdu_len: u16::from_be_bytes([param[6], param[7]]),
        })
    }
}

/// Setup Communication job.
pub fn build_setup_comm(pdu_ref: u16, params: SetupCommParams) -> Result<S7Pdu> {
    S7Pdu::new(S7Header::job(pdu_ref), params.encode(), Bytes::new())
}

fn item_count(len: usize) -> Result<u8> {
    u8::try_from(len).map_err(|_| Error::ErrInvalidParam(format!("{len} items in one PDU")))
}

fn encode_specs(function: S7Function, specs: &[S7VarSpec]) -> Result<Bytes> {
    let mut param = BytesMut::with_capacity(2 + specs.len() * 12);
    param.put_u8(function as u8);
    param.put_u8(item_count(specs.len())?);
    for spec in specs {
        spec.encode_to(&mut param, &())?;
    }
    Ok(param.freeze())
}

/// ReadVar job. Non-bit specs are normalised to byte transport with the byte count.
pub fn build_read_var(pdu_ref: u16, specs: &[S7VarSpec]) -> Result<S7Pdu> {
    let wire: Vec<S7VarSpec> = specs
        .iter()
        .map(|s| match s.transport_size {
            S7TransportSize::Bit | S7TransportSize::Byte => *s,
            _ => S7VarSpec {
                transport_size: S7TransportSize::Byte,
                count: u16::try_from(s.byte_len()).unwrap_or(u16::MAX),
                bit_index: 0,
                ..*s
            },
        })
        .collect();
    let param = encode_specs(S7Function::ReadVar, &wire)?;
    S7Pdu::new(S7Header::job(pdu_ref), param, Bytes::new())
}

/// WriteVar job from `(spec, data)` pairs.
///
/// Bit specs send tag 0x03 with a byte length; everything else is written as
/// bytes with tag 0x04 and a bit length.
pub fn build_write_var(pdu_ref: u16, items: &[(S7VarSpec, &[u8])]) -> Result<S7Pdu> {
    let mut specs = Vec::with_capacity(items.len());
    let mut data_items = Vec::with_capacity(items.len());
    for (spec, data) in items {
        if spec.transport_size == S7TransportSize::Bit {
            if data.len() != 1 {
                return Err(Error::ErrInvalidParam(
                    "bit write carries exactly one byte".into(),
                ));
            }
            specs.push(*spec);
            data_items.push(S7DataItem::request(S7DataVariableType::Bit, data));
        } else {
            let count = u16::try_from(data.len())
                .map_err(|_| Error::ErrInvalidParam("write data too long".into()))?;
            specs.push(S7VarSpec {
                transport_size: S7TransportSize::Byte,
                count,
                bit_index: 0,
                ..*spec
            });
            data_items.push(S7DataItem::request(
                S7DataVariableType::ByteWordDWord,
                data,
            ));
        }
    }
    let param = encode_specs(S7Function::WriteVar, &specs)?;
    let last = data_items.len().saturating_sub(1);
    let mut payload = BytesMut::with_capacity(
        data_items
            .iter()
            .enumerate()
            .map(|(i, d)| d.encoded_len(i == last))
            .sum(),
    );
    for (i, item) in data_items.iter().enumerate() {
        item.encode_to(&mut payload, i == last)?;
    }
    S7Pdu::new(S7Header::job(pdu_ref), param, payload.freeze())
}

/// ReadVar AckData, as a PLC would answer. Failed items carry no data.
pub fn build_read_var_response(pdu_ref: u16, items: &[(S7ReturnCode, &[u8])]) -> Result<S7Pdu> {
    let param = Bytes::from(vec![S7Function::ReadVar as u8, item_count(items.len())?]);
    let last = items.len().saturating_sub(1);
    let mut payload = BytesMut::new();
    for (i, (code, data)) in items.iter().enumerate() {
        let item = if *code == S7ReturnCode::Success {
            S7DataItem {
                return_code: *code,
                var_type: S7DataVariableType::ByteWordDWord,
                data: *data,
            }
        } else {
            S7DataItem {
                return_code: *code,
                var_type: S7DataVariableType::Null,
                data: &[],
            }
        };
        item.encode_to(&mut payload, i == last)?;
    }
    S7Pdu::new(
        S7Header::ack_data(pdu_ref, ErrorCode::Success),
        param,
        payload.freeze(),
    )
}

/// WriteVar AckData with one status byte per item.
pub fn build_write_var_response(pdu_ref: u16, codes: &[S7ReturnCode]) -> Result<S7Pdu> {
    let param = Bytes::from(vec![S7Function::WriteVar as u8, item_count(codes.len())?]);
    let payload: Bytes = codes.iter().map(|c| u8::from(*c)).collect::<Vec<_>>().into();
    S7Pdu::new(
        S7Header::ack_data(pdu_ref, ErrorCode::Success),
        param,
        payload,
    )
}

/// Setup Communication AckData echoing the negotiated values.
pub fn build_setup_comm_response(pdu_ref: u16, params: SetupCommParams) -> Result<S7Pdu> {
    S7Pdu::new(
        S7Header::ack_data(pdu_ref, ErrorCode::Success),
        params.encode(),
        Bytes::new(),
    )
}

/// Wrap a COTP TPDU; the TPKT length is filled in by the codec.
pub fn build_message_from_cotp(cotp: Cotp) -> S7Message {
    S7Message {
        tpkt: Tpkt { length: 0 },
        cotp,
        app: None,
    }
}

pub fn build_cotp_cr_message(params: CotpConnParams) -> S7Message {
    build_message_from_cotp(Cotp::Cr(params))
}

pub fn build_cotp_cc_message(params: CotpConnParams) -> S7Message {
    build_message_from_cotp(Cotp::Cc(params))
}

/// Data TPDU carrying one complete S7 PDU.
pub fn build_data_message(pdu: S7Pdu) -> S7Message {
    let mut msg = build_message_from_cotp(Cotp::D(CotpDataParams::default()));
    msg.app = Some(S7AppBody::Parsed(pdu));
    msg
}
