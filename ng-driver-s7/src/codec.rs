use crate::{
    protocol::{
        error::{Error, Result},
        frame::{S7Address, S7DataType, S7DataValue},
    },
    types::Endianness,
};
use bytes::Bytes;

/// Conversions between typed S7 values and PLC memory bytes.
pub struct S7Codec;

#[inline]
fn take<const N: usize>(bytes: &[u8], order: Endianness) -> Result<[u8; N]> {
    let slice = bytes.get(..N).ok_or(Error::InsufficientData {
        needed: N,
        available: bytes.len(),
    })?;
    let mut raw = [0u8; N];
    raw.copy_from_slice(slice);
    if order == Endianness::LittleEndian {
        raw.reverse();
    }
    Ok(raw)
}

#[inline]
fn ordered<const N: usize>(mut raw: [u8; N], order: Endianness) -> Bytes {
    if order == Endianness::LittleEndian {
        raw.reverse();
    }
    Bytes::copy_from_slice(&raw)
}

impl S7Codec {
    /// Interpret bytes starting at the address as its target type.
    ///
    /// Bit addresses test the bit mask in the first byte.
    pub fn decode(bytes: &[u8], address: &S7Address, order: Endianness) -> Result<S7DataValue> {
        let value = match address.data_type {
            S7DataType::Bool => {
                let [b] = take::<1>(bytes, order)?;
                if address.is_bit() {
                    S7DataValue::Bool(b & (1u8 << address.bit_index) != 0)
                } else {
                    S7DataValue::Bool(b != 0)
                }
            }
            S7DataType::Byte => S7DataValue::Byte(take::<1>(bytes, order)?[0]),
            S7DataType::SInt => S7DataValue::SInt(i8::from_be_bytes(take(bytes, order)?)),
            S7DataType::Word => S7DataValue::Word(u16::from_be_bytes(take(bytes, order)?)),
            S7DataType::Int => S7DataValue::Int(i16::from_be_bytes(take(bytes, order)?)),
            S7DataType::DWord => S7DataValue::DWord(u32::from_be_bytes(take(bytes, order)?)),
            S7DataType::DInt => S7DataValue::DInt(i32::from_be_bytes(take(bytes, order)?)),
            S7DataType::Real => S7DataValue::Real(f32::from_be_bytes(take(bytes, order)?)),
            S7DataType::LWord => S7DataValue::LWord(u64::from_be_bytes(take(bytes, order)?)),
            S7DataType::LInt => S7DataValue::LInt(i64::from_be_bytes(take(bytes, order)?)),
            S7DataType::LReal => S7DataValue::LReal(f64::from_be_bytes(take(bytes, order)?)),
        };
        Ok(value)
    }

    /// Bytes to write for `value` at `address`.
    ///
    /// A boolean on a bit address becomes its mask (`1 << bit`) or `0`.
    pub fn encode(value: &S7DataValue, address: &S7Address, order: Endianness) -> Result<Bytes> {
        if value.data_type() != address.data_type {
            return Err(Error::TypeMismatch {
                expected: address.data_type,
                actual: value.data_type(),
            });
        }
        let bytes = match *value {
            S7DataValue::Bool(b) => {
                let byte = match (b, address.is_bit()) {
                    (false, _) => 0,
                    (true, true) => 1u8 << address.bit_index,
                    (true, false) => 1,
                };
                Bytes::copy_from_slice(&[byte])
            }
            S7DataValue::Byte(v) => Bytes::copy_from_slice(&[v]),
            S7DataValue::SInt(v) => ordered(v.to_be_bytes(), order),
            S7DataValue::Word(v) => ordered(v.to_be_bytes(), order),
            S7DataValue::Int(v) => ordered(v.to_be_bytes(), order),
            S7DataValue::DWord(v) => ordered(v.to_be_bytes(), order),
            S7DataValue::DInt(v) => ordered(v.to_be_bytes(), order),
            S7DataValue::Real(v) => ordered(v.to_be_bytes(), order),
            S7DataValue::LWord(v) => ordered(v.to_be_bytes(), order),
            S7DataValue::LInt(v) => ordered(v.to_be_bytes(), order),
            S7DataValue::LReal(v) => ordered(v.to_be_bytes(), order),
        };
        Ok(bytes)
    }

    /// Parse user text (CLI, config) into a value of `data_type`.
    ///
    /// Unsigned types also accept `0x` hex.
    pub fn parse_value(text: &str, data_type: S7DataType) -> Result<S7DataValue> {
        let s = text.trim();
        let bad = || Error::ErrInvalidParam(format!("'{text}' is not a valid {data_type}"));
        macro_rules! unsigned {
            ($t:ty, $variant:ident) => {{
                let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                    Some(hex) => <$t>::from_str_radix(hex, 16),
                    None => s.parse::<$t>(),
                };
                S7DataValue::$variant(parsed.map_err(|_| bad())?)
            }};
        }
        let value = match data_type {
            S7DataType::Bool => match s.to_ascii_lowercase().as_str() {
                "true" | "1" | "on" => S7DataValue::Bool(true),
                "false" | "0" | "off" => S7DataValue::Bool(false),
                _ => return Err(bad()),
            },
            S7DataType::Byte => unsigned!(u8, Byte),
            S7DataType::Word => unsigned!(u16, Word),
            S7DataType::DWord => unsigned!(u32, DWord),
            S7DataType::LWord => unsigned!(u64, LWord),
            S7DataType::SInt => S7DataValue::SInt(s.parse().map_err(|_| bad())?),
            S7DataType::Int => S7DataValue::Int(s.parse().map_err(|_| bad())?),
            S7DataType::DInt => S7DataValue::DInt(s.parse().map_err(|_| bad())?),
            S7DataType::LInt => S7DataValue::LInt(s.parse().map_err(|_| bad())?),
            S7DataType::Real => S7DataValue::Real(s.parse().map_err(|_| bad())?),
            S7DataType::LReal => S7DataValue::LReal(s.parse().map_err(|_| bad())?),
        };
        Ok(value)
    }
}
