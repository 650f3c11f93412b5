use bytes::{BufMut, Bytes, BytesMut};

/// Encoding side of a protocol layer (TPKT, COTP, S7 header, items).
pub trait WireEncode {
    type Error: std::fmt::Debug + Send + Sync + 'static;
    /// Extra input the layer needs, e.g. whether an item is the last one
    type Context;

    fn encoded_len(&self, ctx: &Self::Context) -> usize;
    fn encode_to<B: BufMut>(&self, dst: &mut B, ctx: &Self::Context) -> Result<(), Self::Error>;

    /// Encode into a buffer sized by `encoded_len`.
    fn to_bytes(&self, ctx: &Self::Context) -> Result<Bytes, Self::Error> {
        let mut buf = BytesMut::with_capacity(self.encoded_len(ctx));
        self.encode_to(&mut buf, ctx)?;
        Ok(buf.freeze())
    }
}

/// Decoding side; implementations borrow from `parent` instead of copying.
pub trait WireDecode: Sized {
    type Error: std::fmt::Debug + Send + Sync + 'static;
    type Context;

    /// Parse from `input`, returning the remaining slice and the parsed value.
    /// `input` must borrow from `parent` so payloads can be handed out as
    /// `Bytes::slice_ref` views.
    fn parse<'a>(
        input: &'a [u8],
        parent: &Bytes,
        ctx: &Self::Context,
    ) -> Result<(&'a [u8], Self), Self::Error>;
}
