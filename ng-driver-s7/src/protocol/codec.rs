use super::{
    error::Error,
    frame::{Cotp, S7AppBody, S7Message, S7Pdu, Tpkt, WireDecode, WireEncode},
};
use bytes::{BufMut, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

/// RFC1006 (TPKT) + COTP + S7 framing for `tokio_util::codec::Framed`
#[derive(Debug, Default, Clone)]
pub struct Codec;

#[inline]
fn invalid_data(e: Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e.to_string())
}

impl Decoder for Codec {
    type Item = S7Message;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let length = match Tpkt::peek_len(src).map_err(invalid_data)? {
            Some(len) => len,
            None => return Ok(None),
        };
        if src.len() < length {
            src.reserve(length - src.len());
            return Ok(None);
        }

        let frame = src.split_to(length).freeze();
        let (cotp_bytes, tpkt) = Tpkt::parse(&frame, &frame, &()).map_err(invalid_data)?;
        let (user, cotp) = Cotp::parse(cotp_bytes, &frame, &()).map_err(invalid_data)?;

        let app = match &cotp {
            Cotp::D(_) if user.is_empty() => None,
            // The final TPDU of a segmented PDU does not parse alone; the session joins it
            Cotp::D(params) if params.eot => match S7Pdu::parse(user, &frame, &()) {
                Ok((_, pdu)) => Some(S7AppBody::Parsed(pdu)),
                Err(_) => Some(S7AppBody::Segmented(frame.slice_ref(user))),
            },
            Cotp::D(_) => Some(S7AppBody::Segmented(frame.slice_ref(user))),
            _ => None,
        };
        Ok(Some(S7Message { tpkt, cotp, app }))
    }
}

impl Encoder<S7Message> for Codec {
    type Error = io::Error;

    fn encode(&mut self, item: S7Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let cotp_len = item.cotp.encoded_len(&());
        let app_len = match (&item.cotp, &item.app) {
            (Cotp::D(_), Some(S7AppBody::Segmented(b))) => b.len(),
            (Cotp::D(_), Some(S7AppBody::Parsed(p))) => p.encoded_len(&()),
            _ => 0,
        };
        let tpkt = Tpkt::for_payload(cotp_len + app_len).map_err(invalid_data)?;
        dst.reserve(tpkt.length as usize);

        tpkt.encode_to(dst, &()).map_err(invalid_data)?;
        item.cotp.encode_to(dst, &()).map_err(invalid_data)?;
        match (&item.cotp, item.app) {
            (Cotp::D(_), Some(S7AppBody::Segmented(b))) => dst.put_slice(&b),
            (Cotp::D(_), Some(S7AppBody::Parsed(p))) => p.encode_to(dst, &()).map_err(invalid_data)?,
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frame::{
        build_cotp_cr_message, build_data_message, build_setup_comm, CotpConnParams,
        CotpDataParams, SetupCommParams,
    };

    #[test]
    fn test_partial_frame_waits() {
        let mut codec = Codec;
        let mut buf = BytesMut::from(&[0x03, 0x00, 0x00, 0x16, 0x11][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 5);
    }

    #[test]
    fn test_bad_version_is_invalid_data() {
        let mut codec = Codec;
        let mut buf = BytesMut::from(&[0x04, 0x00, 0x00, 0x07, 0x02, 0xF0, 0x80][..]);
        let err = codec.decode(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_cr_encode_and_decode() {
        let mut codec = Codec;
        let mut buf = BytesMut::new();
        codec
            .encode(
                build_cotp_cr_message(CotpConnParams::request(0x0100, 0x0302)),
                &mut buf,
            )
            .unwrap();
        assert_eq!(&buf[..4], &[0x03, 0x00, 0x00, 0x16]);

        let msg = codec.decode(&mut buf).unwrap().unwrap();
        assert!(buf.is_empty());
        assert!(matches!(msg.cotp, Cotp::Cr(p) if p.dst_tsap == 0x0302));
        assert!(msg.app.is_none());
    }

    #[test]
    fn test_data_frame_yields_parsed_pdu() {
        let mut codec = Codec;
        let mut buf = BytesMut::new();
        let pdu = build_setup_comm(7, SetupCommParams::default()).unwrap();
        codec.encode(build_data_message(pdu.clone()), &mut buf).unwrap();
        assert_eq!(&buf[4..7], &[0x02, 0xF0, 0x80]);

        match codec.decode(&mut buf).unwrap().unwrap().app {
            Some(S7AppBody::Parsed(got)) => assert_eq!(got, pdu),
            other => panic!("expected parsed PDU, got {other:?}"),
        }
    }

    #[test]
    fn test_non_final_segment_kept_raw() {
        let mut codec = Codec;
        let mut buf = BytesMut::new();
        codec
            .encode(
                S7Message {
                    tpkt: Tpkt { length: 0 },
                    cotp: Cotp::D(CotpDataParams {
                        eot: false,
                        tpdu_nr: 0,
                    }),
                    app: Some(S7AppBody::Segmented(bytes::Bytes::from_static(&[0x32, 0x03]))),
                },
                &mut buf,
            )
            .unwrap();
        match codec.decode(&mut buf).unwrap().unwrap().app {
            Some(S7AppBody::Segmented(b)) => assert_eq!(&b[..], &[0x32, 0x03]),
            other => panic!("expected segment, got {other:?}"),
        }
    }

    #[test]
    fn test_two_frames_in_one_buffer() {
        let mut codec = Codec;
        let mut buf = BytesMut::new();
        for r in [1u16, 2] {
            let pdu = build_setup_comm(r, SetupCommParams::default()).unwrap();
            codec.encode(build_data_message(pdu), &mut buf).unwrap();
        }
        for r in [1u16, 2] {
            match codec.decode(&mut buf).unwrap().unwrap().app {
                Some(S7AppBody::Parsed(p)) => assert_eq!(p.header.pdu_ref, r),
                other => panic!("unexpected {other:?}"),
            }
        }
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }
}
