use super::{
    super::error::{Error, Result},
    addr::{S7Address, S7Unit},
    types::{
        S7Area, S7DataVariableType, S7ReturnCode, S7TransportSize, S7_ANY_SYNTAX_ID,
        VAR_SPEC_LEN, VAR_SPEC_TYPE,
    },
    WireEncode,
};
use bytes::BufMut;
use nom::{
    bytes::complete::take,
    number::complete::{be_u16, be_u24, u8 as nom_u8},
    sequence::tuple,
    IResult,
};

/// Encoded size of one S7-Any variable specification
pub const VAR_SPEC_WIRE_LEN: usize = 12;

/// Highest byte offset a 24-bit bit address can reach
pub const MAX_BYTE_ADDRESS: u32 = 0x00FF_FFFF >> 3;

/// S7-Any variable specification: `12 0A 10 ts count:2 db:2 area addr:3`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct S7VarSpec {
    pub transport_size: S7TransportSize,
    /// Number of elements of `transport_size`
    pub count: u16,
    /// 0 outside the DB area
    pub db_number: u16,
    pub area: S7Area,
    pub byte_address: u32,
    pub bit_index: u8,
}

impl S7VarSpec {
    /// Byte region read or written as raw bytes.
    pub fn bytes(area: S7Area, db_number: u16, start: u32, len: u16) -> Self {
        Self {
            transport_size: S7TransportSize::Byte,
            count: len,
            db_number,
            area,
            byte_address: start,
            bit_index: 0,
        }
    }

    /// Read spec for a single address. Bits are fetched as their containing byte.
    pub fn read_of(address: &S7Address) -> Self {
        Self::bytes(
            address.area.wire_code(),
            address.db_number,
            address.byte_address,
            address.span() as u16,
        )
    }

    /// 24-bit bit address: `byte * 8 + bit`
    #[inline]
    pub fn bit_address(&self) -> u32 {
        ((self.byte_address << 3) | (self.bit_index as u32 & 0x07)) & 0x00FF_FFFF
    }

    /// Payload bytes this spec selects.
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.count as usize * self.transport_size.element_bytes()
    }
}

impl TryFrom<&S7Address> for S7VarSpec {
    type Error = Error;

    /// Write spec for an address: bit units use transport size Bit with count 1.
    fn try_from(address: &S7Address) -> Result<Self> {
        let count = u16::try_from(address.span())
            .map_err(|_| Error::ErrInvalidAddress(address.text.clone()))?;
        Ok(match address.unit {
            S7Unit::Bit => Self {
                transport_size: S7TransportSize::Bit,
                count: 1,
                db_number: address.db_number,
                area: address.area.wire_code(),
                byte_address: address.byte_address,
                bit_index: address.bit_index,
            },
            _ => Self::bytes(
                address.area.wire_code(),
                address.db_number,
                address.byte_address,
                count,
            ),
        })
    }
}

impl WireEncode for S7VarSpec {
    type Error = Error;
    type Context = ();

    fn encoded_len(&self, _ctx: &Self::Context) -> usize {
        VAR_SPEC_WIRE_LEN
    }

    fn encode_to<B: BufMut>(&self, dst: &mut B, _ctx: &Self::Context) -> Result<()> {
        if self.byte_address > 0x001F_FFFF {
            return Err(Error::ErrInvalidParam(format!(
                "byte address {} exceeds 24-bit bit addressing",
                self.byte_address
            )));
        }
        dst.put_u8(VAR_SPEC_TYPE);
        dst.put_u8(VAR_SPEC_LEN);
        dst.put_u8(S7_ANY_SYNTAX_ID);
        dst.put_u8(self.transport_size as u8);
        dst.put_u16(self.count);
        dst.put_u16(self.db_number);
        dst.put_u8(self.area as u8);
        let addr = self.bit_address();
        dst.put_u8((addr >> 16) as u8);
        dst.put_u16(addr as u16);
        Ok(())
    }
}

#[allow(clippy::type_complexity)]
fn var_spec_fields(input: &[u8]) -> IResult<&[u8], (u8, u8, u8, u8, u16, u16, u8, u32)> {
    tuple((nom_u8, nom_u8, nom_u8, nom_u8, be_u16, be_u16, nom_u8, be_u24))(input)
}

/// Parse one 12-byte variable specification.
pub fn parse_var_spec(input: &[u8]) -> Result<(&[u8], S7VarSpec)> {
    let (rest, (spec_type, len, syntax, ts, count, db_number, area, addr)) =
        var_spec_fields(input).map_err(|_| Error::InsufficientData {
            needed: VAR_SPEC_WIRE_LEN,
            available: input.len(),
        })?;
    if spec_type != VAR_SPEC_TYPE || len != VAR_SPEC_LEN || syntax != S7_ANY_SYNTAX_ID {
        return Err(Error::ProtocolViolation {
            context: "unsupported variable specification",
        });
    }
    let transport_size = S7TransportSize::try_from(ts).map_err(|_| Error::Decode {
        context: "unknown transport size",
    })?;
    let area = S7Area::try_from(area).map_err(|_| Error::Decode {
        context: "unknown area code",
    })?;
    Ok((
        rest,
        S7VarSpec {
            transport_size,
            count,
            db_number,
            area,
            byte_address: addr >> 3,
            bit_index: (addr & 0x07) as u8,
        },
    ))
}

/// Parse `count` consecutive variable specifications.
pub fn parse_var_specs(count: u8, mut input: &[u8]) -> Result<Vec<S7VarSpec>> {
    let mut specs = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let (rest, spec) = parse_var_spec(input)?;
        specs.push(spec);
        input = rest;
    }
    Ok(specs)
}

/// Data item of a WriteVar request or ReadVar response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct S7DataItem<'a> {
    pub return_code: S7ReturnCode,
    pub var_type: S7DataVariableType,
    pub data: &'a [u8],
}

impl<'a> S7DataItem<'a> {
    /// Request-side item; the return code field is reserved (0x00).
    pub fn request(var_type: S7DataVariableType, data: &'a [u8]) -> Self {
        Self {
            return_code: S7ReturnCode::Reserved,
            var_type,
            data,
        }
    }

    /// Length field as sent: bits for byte-like tags, bytes otherwise.
    fn wire_len(&self) -> Result<u16> {
        let len = match self.var_type {
            S7DataVariableType::ByteWordDWord | S7DataVariableType::Integer => self.data.len() * 8,
            _ => self.data.len(),
        };
        u16::try_from(len).map_err(|_| Error::ErrInvalidParam("data item too long".into()))
    }

    /// Pad byte follows a one-byte item unless it is the last one.
    #[inline]
    pub fn needs_pad(&self, is_last: bool) -> bool {
        self.data.len() == 1 && !is_last
    }

    pub fn encoded_len(&self, is_last: bool) -> usize {
        4 + self.data.len() + usize::from(self.needs_pad(is_last))
    }

    pub fn encode_to<B: BufMut>(&self, dst: &mut B, is_last: bool) -> Result<()> {
        let len = self.wire_len()?;
        dst.put_u8(self.return_code.into());
        dst.put_u8(self.var_type as u8);
        dst.put_u16(len);
        dst.put_slice(self.data);
        if self.needs_pad(is_last) {
            dst.put_u8(0x00);
        }
        Ok(())
    }
}

fn data_item_header(input: &[u8]) -> IResult<&[u8], (u8, u8, u16)> {
    tuple((nom_u8, nom_u8, be_u16))(input)
}

fn parse_data_item(input: &[u8], is_last: bool) -> Result<(&[u8], S7DataItem<'_>)> {
    let (rest, (rc, tag, raw_len)) = data_item_header(input).map_err(|_| Error::InsufficientData {
        needed: 4,
        available: input.len(),
    })?;
    let return_code = S7ReturnCode::from(rc);
    // Failed items may carry a null tag and no data
    if return_code != S7ReturnCode::Success && raw_len == 0 {
        let var_type = S7DataVariableType::try_from(tag).unwrap_or(S7DataVariableType::Null);
        return Ok((
            rest,
            S7DataItem {
                return_code,
                var_type,
                data: &[],
            },
        ));
    }
    let var_type = S7DataVariableType::try_from(tag).map_err(|_| Error::Decode {
        context: "unknown data item tag",
    })?;
    let len = var_type.data_len_in_bytes(raw_len);
    let (mut rest, data) = take::<_, _, nom::error::Error<&[u8]>>(len)(rest).map_err(|_| {
        Error::InsufficientData {
            needed: len,
            available: rest.len(),
        }
    })?;
    // Responders word-align the next item
    if !is_last && len % 2 == 1 && !rest.is_empty() {
        rest = &rest[1..];
    }
    Ok((
        rest,
        S7DataItem {
            return_code,
            var_type,
            data,
        },
    ))
}

/// Parse `count` data items.
pub fn parse_data_items(count: u8, mut input: &[u8]) -> Result<Vec<S7DataItem<'_>>> {
    let mut items = Vec::with_capacity(count as usize);
    for i in 0..count {
        let (rest, item) = parse_data_item(input, i + 1 == count)?;
        items.push(item);
        input = rest;
    }
    Ok(items)
}

/// Parse the one-byte-per-item status list of a WriteVar response.
pub fn parse_return_codes(count: u8, input: &[u8]) -> Result<Vec<S7ReturnCode>> {
    let (_, codes) = take::<_, _, nom::error::Error<&[u8]>>(count as usize)(input).map_err(|_| {
        Error::InsufficientData {
            needed: count as usize,
            available: input.len(),
        }
    })?;
    Ok(codes.iter().map(|b| S7ReturnCode::from(*b)).collect())
}
