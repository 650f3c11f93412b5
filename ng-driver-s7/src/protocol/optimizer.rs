use super::{
    error::{Error, Result},
    frame::{S7Address, S7AreaKind, S7VarSpec},
};
use std::collections::BTreeMap;

/// Default largest span, in bytes, a merged block may cover
pub const DEFAULT_MAX_BLOCK_SIZE: u32 = 180;

/// Tuning of the batch block optimizer.
///
/// Two byte-like addresses end up in the same block only when the useful bytes
/// cover at least `min_efficiency_ratio` of the resulting span and the span stays
/// within `max_block_size`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimizerConfig {
    pub min_efficiency_ratio: f64,
    pub max_block_size: u32,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            min_efficiency_ratio: 0.8,
            max_block_size: DEFAULT_MAX_BLOCK_SIZE,
        }
    }
}

impl OptimizerConfig {
    /// Clamped to `[0.0, 1.0]`.
    #[inline]
    pub fn with_min_efficiency_ratio(mut self, ratio: f64) -> Self {
        self.min_efficiency_ratio = if ratio.is_nan() {
            0.0
        } else {
            ratio.clamp(0.0, 1.0)
        };
        self
    }

    #[inline]
    pub fn with_max_block_size(mut self, size: u32) -> Self {
        self.max_block_size = size.max(1);
        self
    }
}

/// Identity of a block's byte region, used to cache fetched bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockKey {
    pub area: S7AreaKind,
    pub db_number: u16,
    pub start: u32,
    pub length: u32,
}

/// Contiguous byte region fetched with one read, together with the addresses it serves.
#[derive(Debug, Clone, PartialEq)]
pub struct AddressBlock {
    pub area: S7AreaKind,
    pub db_number: u16,
    pub start: u32,
    /// Always 1 for bit blocks
    pub length: u32,
    pub members: Vec<S7Address>,
    /// Useful bytes over span, in `(0, 1]`
    pub efficiency: f64,
}

impl AddressBlock {
    #[inline]
    pub fn key(&self) -> BlockKey {
        BlockKey {
            area: self.area,
            db_number: self.db_number,
            start: self.start,
            length: self.length,
        }
    }

    /// Offset of a member inside the block's bytes.
    #[inline]
    pub fn offset_of(&self, address: &S7Address) -> usize {
        address.byte_address.saturating_sub(self.start) as usize
    }

    fn seed(first: &S7Address) -> Self {
        Self {
            area: first.area,
            db_number: first.db_number,
            start: first.byte_address,
            length: if first.is_bit() { 1 } else { first.span() },
            members: vec![first.clone()],
            efficiency: 1.0,
        }
    }
}

impl TryFrom<&AddressBlock> for S7VarSpec {
    type Error = Error;

    /// Byte read of the whole block; one item carries at most `u16::MAX` bytes.
    fn try_from(block: &AddressBlock) -> Result<Self> {
        let count = u16::try_from(block.length).map_err(|_| {
            Error::ErrInvalidParam(format!("block of {} bytes exceeds one item", block.length))
        })?;
        Ok(S7VarSpec::bytes(
            block.area.wire_code(),
            block.db_number,
            block.start,
            count,
        ))
    }
}

/// Merge addresses into as few reads as the efficiency and size limits allow.
///
/// Output order is deterministic: groups by ascending (area, db), bit blocks first.
pub fn optimize(addresses: &[S7Address], config: &OptimizerConfig) -> Vec<AddressBlock> {
    let mut groups: BTreeMap<(S7AreaKind, u16), (Vec<&S7Address>, Vec<&S7Address>)> =
        BTreeMap::new();
    for address in addresses {
        let (bits, bytes) = groups
            .entry((address.area, address.db_number))
            .or_default();
        if address.is_bit() {
            bits.push(address);
        } else {
            bytes.push(address);
        }
    }

    let mut blocks = Vec::new();
    for (_, (bits, bytes)) in groups {
        merge_bits(bits, &mut blocks);
        merge_bytes(bytes, config, &mut blocks);
    }
    blocks
}

/// One block per distinct byte holding every requested bit of it.
fn merge_bits(mut bits: Vec<&S7Address>, out: &mut Vec<AddressBlock>) {
    bits.sort_by_key(|a| (a.bit_index, a.byte_address, a.db_number));
    let mut by_byte: BTreeMap<u32, AddressBlock> = BTreeMap::new();
    for address in bits {
        by_byte
            .entry(address.byte_address)
            .and_modify(|b| b.members.push(address.clone()))
            .or_insert_with(|| AddressBlock::seed(address));
    }
    out.extend(by_byte.into_values());
}

struct Pending {
    block: AddressBlock,
    end: u32,
    useful: u32,
}

impl Pending {
    fn new(first: &S7Address) -> Self {
        Self {
            block: AddressBlock::seed(first),
            end: first.end(),
            useful: first.span(),
        }
    }

    fn close(mut self) -> AddressBlock {
        self.block.length = self.end - self.block.start;
        self.block.efficiency = if self.block.length == 0 {
            1.0
        } else {
            (self.useful as f64 / self.block.length as f64).min(1.0)
        };
        self.block
    }
}

/// Greedy left-to-right merge of byte, word and dword addresses.
fn merge_bytes(mut bytes: Vec<&S7Address>, config: &OptimizerConfig, out: &mut Vec<AddressBlock>) {
    bytes.sort_by_key(|a| (a.db_number, a.byte_address, a.end()));
    let mut current: Option<Pending> = None;
    for address in bytes {
        let Some(mut pending) = current.take() else {
            current = Some(Pending::new(address));
            continue;
        };
        let end = pending.end.max(address.end());
        let span = end - pending.block.start;
        let useful = pending.useful + address.span();
        let fits = span <= config.max_block_size
            && useful as f64 / span as f64 >= config.min_efficiency_ratio;
        if fits {
            pending.end = end;
            pending.useful = useful;
            pending.block.members.push(address.clone());
            current = Some(pending);
        } else {
            out.push(pending.close());
            current = Some(Pending::new(address));
        }
    }
    if let Some(pending) = current {
        out.push(pending.close());
    }
}

/// Split `[start, start + length)` into consecutive chunks of at most `max_chunk` bytes.
///
/// The region is cut short at `u32::MAX`; callers bound it to the addressable range first.
pub fn paginate(start: u32, length: u32, max_chunk: u32) -> Vec<(u32, u32)> {
    let max_chunk = max_chunk.max(1);
    let length = length.min(u32::MAX - start);
    let mut chunks = Vec::with_capacity(length.div_ceil(max_chunk) as usize);
    let mut offset: u32 = 0;
    while offset < length {
        let len = max_chunk.min(length - offset);
        let Some(chunk_start) = start.checked_add(offset) else {
            break;
        };
        chunks.push((chunk_start, len));
        offset += len;
    }
    chunks
}
