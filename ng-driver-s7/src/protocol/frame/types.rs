use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// COTP TPDU codes used on an ISO-on-TCP link
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CotpType {
    /// Connection Request
    Cr = 0xE0,
    /// Connection Confirm
    Cc = 0xD0,
    /// Disconnect Request
    Dr = 0x80,
    /// Data
    D = 0xF0,
}

impl TryFrom<u8> for CotpType {
    type Error = ();

    fn try_from(v: u8) -> std::result::Result<Self, Self::Error> {
        match v {
            0xE0 => Ok(CotpType::Cr),
            0xD0 => Ok(CotpType::Cc),
            0x80 => Ok(CotpType::Dr),
            0xF0 => Ok(CotpType::D),
            _ => Err(()),
        }
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum S7PduType {
    Job = 0x01,
    Ack = 0x02,
    AckData = 0x03,
    UserData = 0x07,
}

impl S7PduType {
    /// Ack and AckData carry a 2-byte error code after the common header.
    #[inline]
    pub fn has_error_code(self) -> bool {
        matches!(self, S7PduType::Ack | S7PduType::AckData)
    }
}

impl TryFrom<u8> for S7PduType {
    type Error = ();
    fn try_from(v: u8) -> std::result::Result<Self, Self::Error> {
        match v {
            0x01 => Ok(S7PduType::Job),
            0x02 => Ok(S7PduType::Ack),
            0x03 => Ok(S7PduType::AckData),
            0x07 => Ok(S7PduType::UserData),
            _ => Err(()),
        }
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum S7Function {
    ReadVar = 0x04,
    WriteVar = 0x05,
    /// Parameter layout: `F0 00 amq_caller amq_callee pdu_len`
    SetupCommunication = 0xF0,
}

impl TryFrom<u8> for S7Function {
    type Error = ();

    fn try_from(v: u8) -> std::result::Result<Self, Self::Error> {
        match v {
            0x04 => Ok(S7Function::ReadVar),
            0x05 => Ok(S7Function::WriteVar),
            0xF0 => Ok(S7Function::SetupCommunication),
            _ => Err(()),
        }
    }
}

/// Syntax id of an S7-Any variable specification
pub const S7_ANY_SYNTAX_ID: u8 = 0x10;
/// Variable specification type marker
pub const VAR_SPEC_TYPE: u8 = 0x12;
/// Length of an S7-Any variable specification after the length byte
pub const VAR_SPEC_LEN: u8 = 0x0A;

/// Memory area codes on the wire
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum S7Area {
    /// Process inputs
    I = 0x81,
    /// Process outputs
    Q = 0x82,
    /// Markers
    M = 0x83,
    /// Data blocks
    DB = 0x84,
}

impl TryFrom<u8> for S7Area {
    type Error = ();
    fn try_from(v: u8) -> std::result::Result<Self, Self::Error> {
        match v {
            0x81 => Ok(S7Area::I),
            0x82 => Ok(S7Area::Q),
            0x83 => Ok(S7Area::M),
            0x84 => Ok(S7Area::DB),
            _ => Err(()),
        }
    }
}

/// Transport size codes of a variable specification
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum S7TransportSize {
    Bit = 0x01,
    Byte = 0x02,
    Char = 0x03,
    Word = 0x04,
    Int = 0x05,
    DWord = 0x06,
    DInt = 0x07,
    Real = 0x08,
}

impl TryFrom<u8> for S7TransportSize {
    type Error = ();
    fn try_from(v: u8) -> std::result::Result<Self, Self::Error> {
        use S7TransportSize::*;
        Ok(match v {
            0x01 => Bit,
            0x02 => Byte,
            0x03 => Char,
            0x04 => Word,
            0x05 => Int,
            0x06 => DWord,
            0x07 => DInt,
            0x08 => Real,
            _ => Err(())?,
        })
    }
}

impl S7TransportSize {
    /// Bytes per element; a bit still occupies one byte of payload.
    #[inline]
    pub fn element_bytes(self) -> usize {
        match self {
            S7TransportSize::Bit | S7TransportSize::Byte | S7TransportSize::Char => 1,
            S7TransportSize::Word | S7TransportSize::Int => 2,
            S7TransportSize::DWord | S7TransportSize::DInt | S7TransportSize::Real => 4,
        }
    }
}

/// Per-item status byte in ReadVar/WriteVar responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum S7ReturnCode {
    Reserved,
    Success,
    HardwareFault,
    AccessDenied,
    AddressOutOfRange,
    DataTypeNotSupported,
    DataTypeInconsistent,
    ObjectDoesNotExist,
    ObjectNotAvailable,
    Unknown(u8),
}

impl From<u8> for S7ReturnCode {
    fn from(v: u8) -> Self {
        match v {
            0x00 => S7ReturnCode::Reserved,
            0xFF => S7ReturnCode::Success,
            0x01 => S7ReturnCode::HardwareFault,
            0x03 => S7ReturnCode::AccessDenied,
            0x05 => S7ReturnCode::AddressOutOfRange,
            0x06 => S7ReturnCode::DataTypeNotSupported,
            0x07 => S7ReturnCode::DataTypeInconsistent,
            0x0A => S7ReturnCode::ObjectDoesNotExist,
            0x0B => S7ReturnCode::ObjectNotAvailable,
            other => S7ReturnCode::Unknown(other),
        }
    }
}

impl From<S7ReturnCode> for u8 {
    fn from(value: S7ReturnCode) -> Self {
        match value {
            S7ReturnCode::Reserved => 0x00,
            S7ReturnCode::Success => 0xFF,
            S7ReturnCode::HardwareFault => 0x01,
            S7ReturnCode::AccessDenied => 0x03,
            S7ReturnCode::AddressOutOfRange => 0x05,
            S7ReturnCode::DataTypeNotSupported => 0x06,
            S7ReturnCode::DataTypeInconsistent => 0x07,
            S7ReturnCode::ObjectDoesNotExist => 0x0A,
            S7ReturnCode::ObjectNotAvailable => 0x0B,
            S7ReturnCode::Unknown(v) => v,
        }
    }
}

/// Data item tag; decides whether the length field counts bits or bytes.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum S7DataVariableType {
    Null = 0x00,
    /// Length in bytes
    Bit = 0x03,
    /// Length in bits
    ByteWordDWord = 0x04,
    /// Length in bits
    Integer = 0x05,
    /// Length in bytes
    Real = 0x07,
    /// Length in bytes
    OctetString = 0x09,
}

impl TryFrom<u8> for S7DataVariableType {
    type Error = ();
    fn try_from(v: u8) -> std::result::Result<Self, Self::Error> {
        Ok(match v {
            0x00 => S7DataVariableType::Null,
            0x03 => S7DataVariableType::Bit,
            0x04 => S7DataVariableType::ByteWordDWord,
            0x05 => S7DataVariableType::Integer,
            0x07 => S7DataVariableType::Real,
            0x09 => S7DataVariableType::OctetString,
            _ => Err(())?,
        })
    }
}

impl S7DataVariableType {
    /// Convert the on-wire length field into a byte count.
    #[inline]
    pub fn data_len_in_bytes(self, raw_len: u16) -> usize {
        match self {
            S7DataVariableType::ByteWordDWord | S7DataVariableType::Integer => {
                (raw_len as usize).div_ceil(8)
            }
            _ => raw_len as usize,
        }
    }
}

/// Value type requested by a caller for an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum S7DataType {
    Bool,
    Byte,
    SInt,
    Word,
    Int,
    DWord,
    DInt,
    LWord,
    LInt,
    Real,
    LReal,
}

impl S7DataType {
    /// Encoded width in bytes; `Bool` reports the byte that carries it.
    pub const fn size(self) -> usize {
        match self {
            S7DataType::Bool | S7DataType::Byte | S7DataType::SInt => 1,
            S7DataType::Word | S7DataType::Int => 2,
            S7DataType::DWord | S7DataType::DInt | S7DataType::Real => 4,
            S7DataType::LWord | S7DataType::LInt | S7DataType::LReal => 8,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            S7DataType::Bool => "bool",
            S7DataType::Byte => "byte",
            S7DataType::SInt => "sint",
            S7DataType::Word => "word",
            S7DataType::Int => "int",
            S7DataType::DWord => "dword",
            S7DataType::DInt => "dint",
            S7DataType::LWord => "lword",
            S7DataType::LInt => "lint",
            S7DataType::Real => "real",
            S7DataType::LReal => "lreal",
        }
    }
}

const ALL_DATA_TYPES: [S7DataType; 11] = [
    S7DataType::Bool,
    S7DataType::Byte,
    S7DataType::SInt,
    S7DataType::Word,
    S7DataType::Int,
    S7DataType::DWord,
    S7DataType::DInt,
    S7DataType::LWord,
    S7DataType::LInt,
    S7DataType::Real,
    S7DataType::LReal,
];

impl FromStr for S7DataType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        ALL_DATA_TYPES
            .iter()
            .copied()
            .find(|t| t.name() == lower)
            .ok_or_else(|| format!("unknown data type '{s}'"))
    }
}

impl fmt::Display for S7DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Typed scalar read from or written to a PLC.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum S7DataValue {
    Bool(bool),
    Byte(u8),
    SInt(i8),
    Word(u16),
    Int(i16),
    DWord(u32),
    DInt(i32),
    LWord(u64),
    LInt(i64),
    Real(f32),
    LReal(f64),
}

impl S7DataValue {
    pub fn data_type(&self) -> S7DataType {
        match self {
            S7DataValue::Bool(_) => S7DataType::Bool,
            S7DataValue::Byte(_) => S7DataType::Byte,
            S7DataValue::SInt(_) => S7DataType::SInt,
            S7DataValue::Word(_) => S7DataType::Word,
            S7DataValue::Int(_) => S7DataType::Int,
            S7DataValue::DWord(_) => S7DataType::DWord,
            S7DataValue::DInt(_) => S7DataType::DInt,
            S7DataValue::LWord(_) => S7DataType::LWord,
            S7DataValue::LInt(_) => S7DataType::LInt,
            S7DataValue::Real(_) => S7DataType::Real,
            S7DataValue::LReal(_) => S7DataType::LReal,
        }
    }
}

impl fmt::Display for S7DataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            S7DataValue::Bool(v) => write!(f, "{v}"),
            S7DataValue::Byte(v) => write!(f, "{v}"),
            S7DataValue::SInt(v) => write!(f, "{v}"),
            S7DataValue::Word(v) => write!(f, "{v}"),
            S7DataValue::Int(v) => write!(f, "{v}"),
            S7DataValue::DWord(v) => write!(f, "{v}"),
            S7DataValue::DInt(v) => write!(f, "{v}"),
            S7DataValue::LWord(v) => write!(f, "{v}"),
            S7DataValue::LInt(v) => write!(f, "{v}"),
            S7DataValue::Real(v) => write!(f, "{v}"),
            S7DataValue::LReal(v) => write!(f, "{v}"),
        }
    }
}
