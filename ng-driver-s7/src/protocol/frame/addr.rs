use super::{
    super::error::{Error, Result},
    item::MAX_BYTE_ADDRESS,
    types::{S7Area, S7DataType, S7TransportSize},
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Memory area an address lives in. V-memory is folded into `DataBlock` 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum S7AreaKind {
    DataBlock,
    Input,
    Output,
    Marker,
}

/// Width of the addressed wire unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum S7Unit {
    Bit,
    Byte,
    Word,
    DWord,
}

// (area, wire code, textual prefix)
const AREA_TABLE: [(S7AreaKind, S7Area, &str); 4] = [
    (S7AreaKind::DataBlock, S7Area::DB, "DB"),
    (S7AreaKind::Input, S7Area::I, "I"),
    (S7AreaKind::Output, S7Area::Q, "Q"),
    (S7AreaKind::Marker, S7Area::M, "M"),
];

// (unit, transport size, unit length, sub-type letter)
const UNIT_TABLE: [(S7Unit, S7TransportSize, u8, char); 4] = [
    (S7Unit::Bit, S7TransportSize::Bit, 1, 'X'),
    (S7Unit::Byte, S7TransportSize::Byte, 1, 'B'),
    (S7Unit::Word, S7TransportSize::Byte, 2, 'W'),
    (S7Unit::DWord, S7TransportSize::Byte, 4, 'D'),
];

impl S7AreaKind {
    #[inline]
    fn entry(self) -> &'static (S7AreaKind, S7Area, &'static str) {
        // Rows are ordered by discriminant
        &AREA_TABLE[self as usize]
    }

    #[inline]
    pub fn wire_code(self) -> S7Area {
        self.entry().1
    }

    #[inline]
    pub fn prefix(self) -> &'static str {
        self.entry().2
    }
}

impl S7Unit {
    #[inline]
    fn entry(self) -> &'static (S7Unit, S7TransportSize, u8, char) {
        &UNIT_TABLE[self as usize]
    }

    /// Transport size used when this unit is written on its own.
    #[inline]
    pub fn transport(self) -> S7TransportSize {
        self.entry().1
    }

    #[inline]
    pub fn byte_len(self) -> u32 {
        self.entry().2 as u32
    }

    #[inline]
    pub fn letter(self) -> char {
        self.entry().3
    }

    fn from_letter(c: char) -> Option<Self> {
        UNIT_TABLE.iter().find(|e| e.3 == c).map(|e| e.0)
    }
}

/// Parsed symbolic address. Built once by [`parse_s7_address`], immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct S7Address {
    /// Address text as given by the caller
    pub text: String,
    pub area: S7AreaKind,
    /// Data block number, 0 outside the DB area
    pub db_number: u16,
    pub byte_address: u32,
    /// 0..=7, non-zero only for bit units
    pub bit_index: u8,
    pub unit: S7Unit,
    /// Interpretation of the fetched bytes; does not affect addressing
    pub data_type: S7DataType,
}

impl S7Address {
    /// Bytes occupied on the wire. A 64-bit type on a `DWord` unit covers two units.
    #[inline]
    pub fn span(&self) -> u32 {
        span_of(self.unit, self.data_type)
    }

    #[inline]
    pub fn is_bit(&self) -> bool {
        self.unit == S7Unit::Bit
    }

    #[inline]
    pub fn end(&self) -> u32 {
        self.byte_address + self.span()
    }

    /// Same location and unit, ignoring text and target type.
    pub fn equivalent(&self, other: &S7Address) -> bool {
        self.area == other.area
            && self.db_number == other.db_number
            && self.byte_address == other.byte_address
            && self.bit_index == other.bit_index
            && self.unit == other.unit
    }

    /// Canonical textual form, e.g. `DB1.DBW10`, `IX0.3`, `MB7`.
    pub fn to_address_string(&self) -> String {
        let letter = self.unit.letter();
        let head = match self.area {
            S7AreaKind::DataBlock => format!("DB{}.DB{letter}{}", self.db_number, self.byte_address),
            other => format!("{}{letter}{}", other.prefix(), self.byte_address),
        };
        if self.is_bit() {
            format!("{head}.{}", self.bit_index)
        } else {
            head
        }
    }
}

impl fmt::Display for S7Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl TryFrom<&str> for S7Address {
    type Error = Error;

    /// Parse with the natural type of the unit (Bool, Byte, Word, DWord).
    fn try_from(value: &str) -> Result<Self> {
        let loc = parse_location(&normalize(value))
            .map_err(|e| with_input(value, e))?;
        let data_type = match loc.unit {
            S7Unit::Bit => S7DataType::Bool,
            S7Unit::Byte => S7DataType::Byte,
            S7Unit::Word => S7DataType::Word,
            S7Unit::DWord => S7DataType::DWord,
        };
        Ok(loc.into_address(value, data_type))
    }
}

#[inline]
fn span_of(unit: S7Unit, data_type: S7DataType) -> u32 {
    if unit == S7Unit::DWord && data_type.size() == 8 {
        8
    } else {
        unit.byte_len()
    }
}

struct Location {
    area: S7AreaKind,
    db_number: u16,
    byte_address: u32,
    bit_index: u8,
    unit: S7Unit,
}

impl Location {
    fn into_address(self, text: &str, data_type: S7DataType) -> S7Address {
        S7Address {
            text: text.to_string(),
            area: self.area,
            db_number: self.db_number,
            byte_address: self.byte_address,
            bit_index: self.bit_index,
            unit: self.unit,
            data_type,
        }
    }
}

/// Parse a symbolic address such as `DB1.DBW10`, `V700.3`, `VD4`, `Q1.3` or `MB7`.
///
/// Bare `I<n>`/`Q<n>` read a word and bare `M<n>` reads a byte; the asymmetry is
/// legacy behaviour kept for compatibility. The target type must fit the unit.
pub fn parse_s7_address(input: &str, data_type: S7DataType) -> Result<S7Address> {
    let loc = parse_location(&normalize(input)).map_err(|e| with_input(input, e))?;
    check_type(loc.unit, data_type).map_err(|e| with_input(input, e))?;
    Ok(loc.into_address(input, data_type))
}

/// Parse many addresses, keeping only the ones that parse.
///
/// Failures are logged and dropped; callers compare the output with their input to
/// find them.
pub fn parse_s7_addresses<I, S>(entries: I) -> Vec<S7Address>
where
    I: IntoIterator<Item = (S, S7DataType)>,
    S: AsRef<str>,
{
    entries
        .into_iter()
        .filter_map(|(text, data_type)| {
            match parse_s7_address(text.as_ref(), data_type) {
                Ok(addr) => Some(addr),
                Err(e) => {
                    tracing::debug!(address = text.as_ref(), error = %e, "Dropping unparsable S7 address");
                    None
                }
            }
        })
        .collect()
}

#[inline]
fn normalize(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase()
}

fn with_input(input: &str, e: Error) -> Error {
    match e {
        Error::ErrInvalidAddress(reason) => Error::ErrInvalidAddress(format!("'{input}': {reason}")),
        other => other,
    }
}

fn invalid(reason: impl Into<String>) -> Error {
    Error::ErrInvalidAddress(reason.into())
}

fn parse_location(s: &str) -> Result<Location> {
    if s.is_empty() {
        return Err(invalid("empty address"));
    }
    if let Some(rest) = s.strip_prefix("DB") {
        return parse_db_area(rest);
    }
    let mut chars = s.chars();
    let head = chars.next().ok_or_else(|| invalid("empty address"))?;
    let rest = chars.as_str();
    let (area, db_number, bare_unit) = match head {
        'V' => (S7AreaKind::DataBlock, 1, S7Unit::Byte),
        'I' => (S7AreaKind::Input, 0, S7Unit::Word),
        'Q' => (S7AreaKind::Output, 0, S7Unit::Word),
        'M' => (S7AreaKind::Marker, 0, S7Unit::Byte),
        other => return Err(invalid(format!("unknown area prefix '{other}'"))),
    };
    let (unit, offset) = match rest.chars().next().and_then(S7Unit::from_letter) {
        Some(unit) => (unit, &rest[1..]),
        // No sub-type letter: a dot means bit access
        None if rest.contains('.') => (S7Unit::Bit, rest),
        None => (bare_unit, rest),
    };
    let (byte_address, bit_index) = parse_offset(unit, offset)?;
    Ok(Location {
        area,
        db_number,
        byte_address,
        bit_index,
        unit,
    })
}

/// `<n>.DB<X|B|W|D><offset>[.<bit>]`
fn parse_db_area(rest: &str) -> Result<Location> {
    let (dbn, tail) = rest
        .split_once('.')
        .ok_or_else(|| invalid("missing '.' after data block number"))?;
    let db_number = dbn
        .parse::<u16>()
        .map_err(|_| invalid(format!("bad data block number '{dbn}'")))
        .and_then(check_db)?;
    let tail = tail.strip_prefix("DB").unwrap_or(tail);
    let unit = tail
        .chars()
        .next()
        .and_then(S7Unit::from_letter)
        .ok_or_else(|| invalid("expected DBX, DBB, DBW or DBD"))?;
    let (byte_address, bit_index) = parse_offset(unit, &tail[1..])?;
    Ok(Location {
        area: S7AreaKind::DataBlock,
        db_number,
        byte_address,
        bit_index,
        unit,
    })
}

fn parse_offset(unit: S7Unit, s: &str) -> Result<(u32, u8)> {
    match (unit, s.split_once('.')) {
        (S7Unit::Bit, Some((byte, bit))) => Ok((parse_byte(byte)?, parse_bit(bit)?)),
        (S7Unit::Bit, None) => Err(invalid("bit address requires '.<bit>'")),
        (_, Some(_)) => Err(invalid("only bit addresses take a '.<bit>' suffix")),
        (_, None) => Ok((parse_byte(s)?, 0)),
    }
}

#[inline]
fn parse_byte(s: &str) -> Result<u32> {
    s.parse::<u32>()
        .map_err(|_| invalid(format!("bad byte offset '{s}'")))
        .and_then(check_byte)
}

#[inline]
fn parse_bit(s: &str) -> Result<u8> {
    s.parse::<u8>()
        .map_err(|_| invalid(format!("bad bit offset '{s}'")))
        .and_then(check_bit)
}

fn check_type(unit: S7Unit, data_type: S7DataType) -> Result<()> {
    match (unit, data_type) {
        (S7Unit::Bit, S7DataType::Bool) => Ok(()),
        (S7Unit::Bit, t) => Err(invalid(format!("bit address cannot hold {t}"))),
        (_, S7DataType::Bool) => Err(invalid("bool requires a bit address")),
        (u, t) if t.size() as u32 > span_of(u, t) => {
            Err(invalid(format!("{t} does not fit a {u:?} unit")))
        }
        _ => Ok(()),
    }
}

#[inline]
fn check_db(n: u16) -> Result<u16> {
    if (1..=64000).contains(&n) {
        Ok(n)
    } else {
        Err(invalid(format!("db out of range: {n}")))
    }
}

#[inline]
fn check_byte(n: u32) -> Result<u32> {
    if n <= MAX_BYTE_ADDRESS {
        Ok(n)
    } else {
        Err(invalid(format!("byte out of range: {n}")))
    }
}

#[inline]
fn check_bit(n: u8) -> Result<u8> {
    if n <= 7 {
        Ok(n)
    } else {
        Err(invalid(format!("bit out of range: {n}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Parse or panic with the offending input.
    fn addr(input: &str, t: S7DataType) -> S7Address {
        match parse_s7_address(input, t) {
            Ok(a) => a,
            Err(e) => panic!("parse_s7_address failed for '{input}': {e:?}"),
        }
    }

    #[test]
    fn test_parse_all_forms() {
        let check = |s: &str,
                     t: S7DataType,
                     area: S7AreaKind,
                     db: u16,
                     byte: u32,
                     bit: u8,
                     unit: S7Unit| {
            let a = addr(s, t);
            assert_eq!(a.area, area, "area for {s}");
            assert_eq!(a.db_number, db, "db for {s}");
            assert_eq!(a.byte_address, byte, "byte for {s}");
            assert_eq!(a.bit_index, bit, "bit for {s}");
            assert_eq!(a.unit, unit, "unit for {s}");
        };
        use S7AreaKind::*;
        use S7DataType as T;

        check("DB1.DBX5.3", T::Bool, DataBlock, 1, 5, 3, S7Unit::Bit);
        check("DB2.DBB7", T::Byte, DataBlock, 2, 7, 0, S7Unit::Byte);
        check("DB1.DBW10", T::Word, DataBlock, 1, 10, 0, S7Unit::Word);
        check("DB10.DBD4", T::Real, DataBlock, 10, 4, 0, S7Unit::DWord);
        check("db1.dbw10", T::Int, DataBlock, 1, 10, 0, S7Unit::Word);
        check(" DB1 . DBW 10 ", T::Word, DataBlock, 1, 10, 0, S7Unit::Word);

        check("V700", T::Byte, DataBlock, 1, 700, 0, S7Unit::Byte);
        check("V700.3", T::Bool, DataBlock, 1, 700, 3, S7Unit::Bit);
        check("VB10", T::SInt, DataBlock, 1, 10, 0, S7Unit::Byte);
        check("VW10", T::Word, DataBlock, 1, 10, 0, S7Unit::Word);
        check("VD10", T::DInt, DataBlock, 1, 10, 0, S7Unit::DWord);

        check("Q1.3", T::Bool, Output, 0, 1, 3, S7Unit::Bit);
        check("I0.0", T::Bool, Input, 0, 0, 0, S7Unit::Bit);
        check("M10.7", T::Bool, Marker, 0, 10, 7, S7Unit::Bit);
        check("IX2.1", T::Bool, Input, 0, 2, 1, S7Unit::Bit);
        check("MB3", T::Byte, Marker, 0, 3, 0, S7Unit::Byte);
        check("QW4", T::Int, Output, 0, 4, 0, S7Unit::Word);
        check("ID8", T::DWord, Input, 0, 8, 0, S7Unit::DWord);
    }

    #[test]
    fn test_bare_area_default_units() {
        assert_eq!(addr("I10", S7DataType::Word).unit, S7Unit::Word);
        assert_eq!(addr("Q10", S7DataType::Word).unit, S7Unit::Word);
        assert_eq!(addr("M10", S7DataType::Byte).unit, S7Unit::Byte);
        assert_eq!(addr("V10", S7DataType::Byte).unit, S7Unit::Byte);
    }

    #[test]
    fn test_64bit_span() {
        let a = addr("DB1.DBD0", S7DataType::LReal);
        assert_eq!(a.unit.byte_len(), 4);
        assert_eq!(a.span(), 8);
        assert_eq!(addr("DB1.DBD0", S7DataType::Real).span(), 4);
    }

    #[test]
    fn test_invalid_addresses() {
        let bad = [
            ("", S7DataType::Byte),
            ("X1", S7DataType::Byte),
            ("DB1.DBX1", S7DataType::Bool),
            ("DB1.DBW1.1", S7DataType::Word),
            ("DB0.DBB1", S7DataType::Byte),
            ("DB70000.DBB1", S7DataType::Byte),
            ("DB1.DBB", S7DataType::Byte),
            ("DB1DBB1", S7DataType::Byte),
            ("I1.8", S7DataType::Bool),
            ("M2097152", S7DataType::Byte),
            ("MX1", S7DataType::Bool),
        ];
        for (s, t) in bad {
            assert!(
                matches!(parse_s7_address(s, t), Err(Error::ErrInvalidAddress(_))),
                "expected '{s}' to fail"
            );
        }
    }

    #[test]
    fn test_type_must_fit_unit() {
        assert!(parse_s7_address("DB1.DBX0.0", S7DataType::Byte).is_err());
        assert!(parse_s7_address("DB1.DBB0", S7DataType::Bool).is_err());
        assert!(parse_s7_address("DB1.DBB0", S7DataType::Word).is_err());
        assert!(parse_s7_address("DB1.DBW0", S7DataType::Real).is_err());
        assert!(parse_s7_address("DB1.DBW0", S7DataType::Byte).is_ok());
    }

    #[test]
    fn test_parse_is_idempotent() {
        for s in ["DB3.DBW20", "V5.1", "I10", "M3", "QD12"] {
            let a = S7Address::try_from(s).unwrap();
            let b = S7Address::try_from(s).unwrap();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_address_string_roundtrip() {
        let inputs = [
            ("DB1.DBX5.3", S7DataType::Bool),
            ("DB7.DBB1", S7DataType::Byte),
            ("V700", S7DataType::Byte),
            ("VW2", S7DataType::Int),
            ("I10", S7DataType::Word),
            ("Q1.3", S7DataType::Bool),
            ("M10", S7DataType::Byte),
            ("MD4", S7DataType::Real),
        ];
        for (s, t) in inputs {
            let a = addr(s, t);
            let text = a.to_address_string();
            let b = addr(&text, t);
            assert!(a.equivalent(&b), "{s} -> {text} is not equivalent");
        }
        assert_eq!(addr("V700.3", S7DataType::Bool).to_address_string(), "DB1.DBX700.3");
        assert_eq!(addr("I10", S7DataType::Word).to_address_string(), "IW10");
    }

    #[test]
    fn test_batch_parse_drops_failures() {
        let mut input = HashMap::new();
        input.insert("DB1.DBW0".to_string(), S7DataType::Word);
        input.insert("NOPE".to_string(), S7DataType::Word);
        input.insert("M1.1".to_string(), S7DataType::Bool);
        let parsed = parse_s7_addresses(input.iter().map(|(k, t)| (k, *t)));
        assert_eq!(parsed.len(), 2);
        assert!(parsed.iter().all(|a| a.text != "NOPE"));
    }

    #[test]
    fn test_wire_lookup() {
        assert_eq!(S7AreaKind::Output.wire_code(), S7Area::Q);
        assert_eq!(S7AreaKind::DataBlock.wire_code(), S7Area::DB);
        assert_eq!(S7Unit::Bit.transport(), S7TransportSize::Bit);
        assert_eq!(S7Unit::Word.transport(), S7TransportSize::Byte);
        assert_eq!(S7Unit::DWord.byte_len(), 4);
    }
}
