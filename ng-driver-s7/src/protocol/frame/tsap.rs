use super::{
    super::error::{Error, Result},
    CpuType,
};
use std::str::FromStr;

/// Transport service access point as (high byte, low byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tsap(pub u8, pub u8);

impl From<Tsap> for u16 {
    #[inline]
    fn from(tsap: Tsap) -> Self {
        u16::from_be_bytes([tsap.0, tsap.1])
    }
}

impl From<u16> for Tsap {
    #[inline]
    fn from(v: u16) -> Self {
        let [hi, lo] = v.to_be_bytes();
        Tsap(hi, lo)
    }
}

impl FromStr for Tsap {
    type Err = Error;

    /// Accepts `HH:LL` hex bytes, `0xHHLL`, or a decimal u16.
    fn from_str(value: &str) -> Result<Self> {
        let s = value.trim();
        let bad = || Error::InvalidConfiguration(format!("invalid TSAP '{value}'"));
        let hex_byte = |h: &str| {
            let h = h.trim();
            let h = h
                .strip_prefix("0x")
                .or_else(|| h.strip_prefix("0X"))
                .unwrap_or(h);
            u8::from_str_radix(h, 16).map_err(|_| bad())
        };
        if let Some((h, l)) = s.split_once(':') {
            return Ok(Tsap(hex_byte(h)?, hex_byte(l)?));
        }
        if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            return u16::from_str_radix(hex, 16).map(Tsap::from).map_err(|_| bad());
        }
        s.parse::<u16>().map(Tsap::from).map_err(|_| bad())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TsapPair {
    pub local: Tsap,
    pub remote: Tsap,
}

impl TsapPair {
    pub fn new(local: impl Into<Tsap>, remote: impl Into<Tsap>) -> Self {
        Self {
            local: local.into(),
            remote: remote.into(),
        }
    }
}

#[inline]
fn validate_rack_slot(rack: u8, slot: u8) -> Result<()> {
    if rack > 0x0F {
        return Err(Error::InvalidRack(rack));
    }
    if slot > 0x0F {
        return Err(Error::InvalidSlot(slot));
    }
    Ok(())
}

/// TSAP pair a CPU family expects for the given rack/slot.
///
/// S7-200, S7-200 Smart and LOGO use fixed pairs; the other families encode
/// `rack * 0x20 + slot` into the remote TSAP.
pub fn default_tsap_pair(cpu: CpuType, rack: u8, slot: u8) -> Result<TsapPair> {
    validate_rack_slot(rack, slot)?;

    let pair = match cpu {
        CpuType::S7200 => TsapPair::new(Tsap(0x10, 0x00), Tsap(0x10, 0x01)),
        CpuType::S7200Smart => TsapPair::new(Tsap(0x10, 0x00), Tsap(0x03, 0x00)),
        CpuType::Logo0BA8 => TsapPair::new(Tsap(0x01, 0x00), Tsap(0x01, 0x02)),
        CpuType::S7300 | CpuType::S7400 | CpuType::S71200 | CpuType::S71500 => {
            TsapPair::new(Tsap(0x01, 0x00), Tsap(0x03, (rack << 5) | slot))
        }
    };

    Ok(pair)
}
