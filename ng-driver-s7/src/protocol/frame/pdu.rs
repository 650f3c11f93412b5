use super::{
    super::error::{Error, Result},
    comm::S7Header,
    types::{S7Function, S7PduType},
    WireDecode, WireEncode,
};
use bytes::{BufMut, Bytes, BytesMut};

/// S7 PDU: header plus zero-copy parameter and payload slices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S7Pdu {
    pub header: S7Header,
    pub param: Bytes,
    pub payload: Bytes,
}

impl S7Pdu {
    /// Assemble a PDU; header lengths are taken from the slices.
    pub fn new(mut header: S7Header, param: Bytes, payload: Bytes) -> Result<Self> {
        header.param_len = u16::try_from(param.len())
            .map_err(|_| Error::ErrInvalidParam("S7 parameter too long".into()))?;
        header.payload_len = u16::try_from(payload.len())
            .map_err(|_| Error::ErrInvalidParam("S7 payload too long".into()))?;
        Ok(Self {
            header,
            param,
            payload,
        })
    }

    /// First parameter byte, the function code for Job/AckData.
    pub fn function(&self) -> Option<S7Function> {
        self.param
            .first()
            .and_then(|b| S7Function::try_from(*b).ok())
    }

    /// Fail with `S7Error` when an Ack/AckData carries a non-zero error code.
    pub fn validate_response(&self) -> Result<()> {
        if !matches!(self.header.pdu_type, S7PduType::Ack | S7PduType::AckData) {
            return Err(Error::ErrUnexpectedPdu);
        }
        match self.header.error_code {
            Some(code) if !code.is_success() => Err(Error::S7Error { code }),
            _ => Ok(()),
        }
    }

    pub fn into_bytes(self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len(&()));
        self.header.encode_to(&mut buf);
        buf.put_slice(&self.param);
        buf.put_slice(&self.payload);
        buf.freeze()
    }
}

impl WireEncode for S7Pdu {
    type Error = Error;
    type Context = ();

    fn encoded_len(&self, _ctx: &Self::Context) -> usize {
        self.header.encoded_len() + self.param.len() + self.payload.len()
    }

    fn encode_to<B: BufMut>(&self, dst: &mut B, _ctx: &Self::Context) -> Result<()> {
        self.header.encode_to(dst);
        dst.put_slice(&self.param);
        dst.put_slice(&self.payload);
        Ok(())
    }
}

impl WireDecode for S7Pdu {
    type Error = Error;
    type Context = ();

    fn parse<'a>(
        input: &'a [u8],
        parent: &Bytes,
        _ctx: &Self::Context,
    ) -> Result<(&'a [u8], Self)> {
        let (header, rest) = S7Header::parse(input)?;
        let need = header.param_len as usize + header.payload_len as usize;
        if rest.len() < need {
            return Err(Error::InsufficientData {
                needed: need,
                available: rest.len(),
            });
        }
        let (param, tail) = rest.split_at(header.param_len as usize);
        let (payload, remain) = tail.split_at(header.payload_len as usize);
        Ok((
            remain,
            S7Pdu {
                header,
                param: Bytes::slice_ref(parent, param),
                payload: Bytes::slice_ref(parent, payload),
            },
        ))
    }
}
