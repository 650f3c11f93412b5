use super::{
    super::error::{Error, Result},
    types::CotpType,
    WireDecode, WireEncode,
};
use bytes::{BufMut, Bytes};
use nom::{
    multi::length_data,
    number::complete::{be_u16, u8 as nom_u8},
    sequence::tuple,
    IResult,
};

/// TPDU size code for 1024 byte TPDUs (2^10)
pub const DEFAULT_TPDU_SIZE_CODE: u8 = 0x0A;

const PARAM_TPDU_SIZE: u8 = 0xC0;
const PARAM_SRC_TSAP: u8 = 0xC1;
const PARAM_DST_TSAP: u8 = 0xC2;

/// Fields shared by Connection Request and Connection Confirm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CotpConnParams {
    pub dst_ref: u16,
    pub src_ref: u16,
    pub class_option: u8,
    /// TPDU size code (2^n bytes)
    pub tpdu_size: u8,
    pub src_tsap: u16,
    pub dst_tsap: u16,
}

impl CotpConnParams {
    /// Connection Request with the usual refs: dst 0, src 1, class 0.
    pub fn request(src_tsap: u16, dst_tsap: u16) -> Self {
        Self {
            dst_ref: 0x0000,
            src_ref: 0x0001,
            class_option: 0x00,
            tpdu_size: DEFAULT_TPDU_SIZE_CODE,
            src_tsap,
            dst_tsap,
        }
    }

    /// Confirm that mirrors a request: refs swapped, TSAPs echoed.
    pub fn confirm_for(req: &CotpConnParams) -> Self {
        Self {
            dst_ref: req.src_ref,
            src_ref: 0x0044,
            class_option: req.class_option,
            tpdu_size: req.tpdu_size,
            src_tsap: req.src_tsap,
            dst_tsap: req.dst_tsap,
        }
    }

    pub fn tpdu_size_bytes(&self) -> Option<usize> {
        1usize.checked_shl(self.tpdu_size as u32)
    }

    fn parse_body(body: &[u8]) -> Result<Self> {
        let (mut tlvs, (dst_ref, src_ref, class_option)) = conn_fixed_part(body).map_err(|_| {
            Error::InsufficientData {
                needed: 5,
                available: body.len(),
            }
        })?;
        let mut params = CotpConnParams {
            dst_ref,
            src_ref,
            class_option,
            tpdu_size: DEFAULT_TPDU_SIZE_CODE,
            src_tsap: 0,
            dst_tsap: 0,
        };

        // TLVs in any order; unknown codes are skipped
        while tlvs.len() >= 2 {
            let (rest, (code, value)) = tlv(tlvs).map_err(|_| Error::ProtocolViolation {
                context: "COTP parameter overruns TPDU",
            })?;
            match (code, value) {
                (PARAM_TPDU_SIZE, [size]) => params.tpdu_size = *size,
                (PARAM_SRC_TSAP, [hi, lo]) => params.src_tsap = u16::from_be_bytes([*hi, *lo]),
                (PARAM_DST_TSAP, [hi, lo]) => params.dst_tsap = u16::from_be_bytes([*hi, *lo]),
                _ => {}
            }
            tlvs = rest;
        }
        Ok(params)
    }
}

/// `dst_ref:2 src_ref:2 class_option:1`
fn conn_fixed_part(input: &[u8]) -> IResult<&[u8], (u16, u16, u8)> {
    tuple((be_u16, be_u16, nom_u8))(input)
}

/// `code:1 len:1 value:len`
fn tlv(input: &[u8]) -> IResult<&[u8], (u8, &[u8])> {
    tuple((nom_u8, length_data(nom_u8)))(input)
}

impl WireEncode for CotpConnParams {
    type Error = Error;
    type Context = ();

    fn encoded_len(&self, _ctx: &Self::Context) -> usize {
        5 + 3 + 4 + 4
    }

    fn encode_to<B: BufMut>(&self, dst: &mut B, _ctx: &Self::Context) -> Result<()> {
        dst.put_u16(self.dst_ref);
        dst.put_u16(self.src_ref);
        dst.put_u8(self.class_option);
        write_tlv(dst, PARAM_TPDU_SIZE, &[self.tpdu_size]);
        write_tlv(dst, PARAM_SRC_TSAP, &self.src_tsap.to_be_bytes());
        write_tlv(dst, PARAM_DST_TSAP, &self.dst_tsap.to_be_bytes());
        Ok(())
    }
}

#[inline]
fn write_tlv<B: BufMut>(dst: &mut B, code: u8, value: &[u8]) {
    dst.put_u8(code);
    dst.put_u8(value.len() as u8);
    dst.put_slice(value);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CotpDrParams {
    pub dst_ref: u16,
    pub src_ref: u16,
    pub reason: u8,
}

/// Data TPDU header (`02 F0 80` for a single, final segment)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CotpDataParams {
    pub eot: bool,
    pub tpdu_nr: u8,
}

impl Default for CotpDataParams {
    fn default() -> Self {
        Self {
            eot: true,
            tpdu_nr: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cotp {
    Cr(CotpConnParams),
    Cc(CotpConnParams),
    Dr(CotpDrParams),
    D(CotpDataParams),
}

impl Cotp {
    #[inline]
    pub fn kind(&self) -> CotpType {
        match self {
            Cotp::Cr(_) => CotpType::Cr,
            Cotp::Cc(_) => CotpType::Cc,
            Cotp::Dr(_) => CotpType::Dr,
            Cotp::D(_) => CotpType::D,
        }
    }

    fn body_len(&self) -> usize {
        match self {
            Cotp::Cr(p) | Cotp::Cc(p) => p.encoded_len(&()),
            Cotp::Dr(_) => 5,
            Cotp::D(_) => 1,
        }
    }
}

impl WireEncode for Cotp {
    type Error = Error;
    type Context = ();

    /// LI byte + type byte + body
    fn encoded_len(&self, _ctx: &Self::Context) -> usize {
        2 + self.body_len()
    }

    fn encode_to<B: BufMut>(&self, dst: &mut B, ctx: &Self::Context) -> Result<()> {
        // LI excludes itself
        dst.put_u8((1 + self.body_len()) as u8);
        dst.put_u8(self.kind() as u8);
        match self {
            Cotp::Cr(p) | Cotp::Cc(p) => p.encode_to(dst, ctx)?,
            Cotp::Dr(p) => {
                dst.put_u16(p.dst_ref);
                dst.put_u16(p.src_ref);
                dst.put_u8(p.reason);
            }
            Cotp::D(p) => {
                let nr = p.tpdu_nr & 0x7F;
                dst.put_u8(if p.eot { 0x80 | nr } else { nr });
            }
        }
        Ok(())
    }
}

impl WireDecode for Cotp {
    type Error = Error;
    type Context = ();

    /// Consumes exactly `LI + 1` bytes; for Data TPDUs the rest is the S7 payload.
    fn parse<'a>(
        input: &'a [u8],
        _parent: &Bytes,
        _ctx: &Self::Context,
    ) -> Result<(&'a [u8], Self)> {
        if input.len() < 2 {
            return Err(Error::InsufficientData {
                needed: 2,
                available: input.len(),
            });
        }
        let li = input[0] as usize;
        let total = 1 + li;
        if li < 1 || total > input.len() {
            return Err(Error::ProtocolViolation {
                context: "invalid COTP LI",
            });
        }
        let body = &input[2..total];
        let rest = &input[total..];
        let kind = CotpType::try_from(input[1]).map_err(|_| Error::ProtocolViolation {
            context: "unknown COTP PDU type",
        })?;
        let cotp = match kind {
            CotpType::Cr => Cotp::Cr(CotpConnParams::parse_body(body)?),
            CotpType::Cc => Cotp::Cc(CotpConnParams::parse_body(body)?),
            CotpType::Dr => {
                let (_, (dst_ref, src_ref, reason)) =
                    conn_fixed_part(body).map_err(|_| Error::ErrInvalidFrame)?;
                Cotp::Dr(CotpDrParams {
                    dst_ref,
                    src_ref,
                    reason,
                })
            }
            CotpType::D => {
                let eot_nr = *body.first().ok_or(Error::ErrInvalidFrame)?;
                Cotp::D(CotpDataParams {
                    eot: eot_nr & 0x80 != 0,
                    tpdu_nr: eot_nr & 0x7F,
                })
            }
        };
        Ok((rest, cotp))
    }
}
