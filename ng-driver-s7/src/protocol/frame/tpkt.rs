use super::{
    super::error::{Error, Result},
    WireDecode, WireEncode,
};
use bytes::{BufMut, Bytes};

/// RFC1006 version byte
pub const TPKT_VERSION: u8 = 0x03;
/// Header size; the length field counts it too
pub const TPKT_HEADER_LEN: usize = 4;

/// RFC1006 framing header
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Tpkt {
    /// Total frame length including the 4 header bytes
    pub length: u16,
}

impl Tpkt {
    /// Header for a frame whose payload (COTP and above) is `payload_len` bytes.
    pub fn for_payload(payload_len: usize) -> Result<Self> {
        let total = TPKT_HEADER_LEN + payload_len;
        let length = u16::try_from(total).map_err(|_| {
            Error::ErrInvalidParam(format!("frame of {total} bytes exceeds TPKT length"))
        })?;
        Ok(Self { length })
    }

    #[inline]
    pub fn payload_len(&self) -> usize {
        (self.length as usize).saturating_sub(TPKT_HEADER_LEN)
    }

    /// Peek the declared frame length without consuming anything.
    ///
    /// Returns `Ok(None)` while fewer than 4 bytes are buffered.
    pub fn peek_len(input: &[u8]) -> Result<Option<usize>> {
        if input.len() < TPKT_HEADER_LEN {
            return Ok(None);
        }
        if input[0] != TPKT_VERSION || input[1] != 0x00 {
            return Err(Error::ErrInvalidFrame);
        }
        let length = u16::from_be_bytes([input[2], input[3]]) as usize;
        if length < TPKT_HEADER_LEN + 2 {
            return Err(Error::ErrInvalidFrame);
        }
        Ok(Some(length))
    }
}

impl WireEncode for Tpkt {
    type Error = Error;
    type Context = ();

    fn encoded_len(&self, _ctx: &Self::Context) -> usize {
        TPKT_HEADER_LEN
    }

    fn encode_to<B: BufMut>(&self, dst: &mut B, _ctx: &Self::Context) -> Result<()> {
        dst.put_u8(TPKT_VERSION);
        dst.put_u8(0x00);
        dst.put_u16(self.length);
        Ok(())
    }
}

impl WireDecode for Tpkt {
    type Error = Error;
    type Context = ();

    fn parse<'a>(
        input: &'a [u8],
        _parent: &Bytes,
        _ctx: &Self::Context,
    ) -> Result<(&'a [u8], Self)> {
        let length = Self::peek_len(input)?.ok_or(Error::InsufficientData {
            needed: TPKT_HEADER_LEN,
            available: input.len(),
        })?;
        if length > input.len() {
            return Err(Error::InsufficientData {
                needed: length,
                available: input.len(),
            });
        }
        Ok((
            &input[TPKT_HEADER_LEN..length],
            Tpkt {
                length: length as u16,
            },
        ))
    }
}
