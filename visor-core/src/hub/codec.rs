//! Framed TCP codec for hub messages.
//!
//! ## Wire format (little-endian)
//!
//! ```text
//! length:  u32  (4)   method + payload bytes that follow
//! method:  u16  (2)
//! payload: [u8] (variable)
//! ```
//!
//! Oversized frames are rejected on both sides; incomplete input yields
//! `Ok(None)` until more bytes arrive.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::VisorError;
use crate::hub::message::HubFrame;

/// Hard cap on one frame (method id + payload). Large screen frames are
/// chunked well below this by the streaming send path.
pub const MAX_FRAME_SIZE: usize = 4 * 1024 * 1024;

const LEN_PREFIX: usize = 4;
const METHOD_SIZE: usize = 2;

/// Length-prefixed [`HubFrame`] codec.
#[derive(Debug, Default)]
pub struct HubCodec;

impl Decoder for HubCodec {
    type Item = HubFrame;
    type Error = VisorError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<HubFrame>, VisorError> {
        if src.len() < LEN_PREFIX {
            return Ok(None);
        }

        let len = u32::from_le_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if len > MAX_FRAME_SIZE {
            return Err(VisorError::FrameTooLarge {
                size: len,
                max: MAX_FRAME_SIZE,
            });
        }
        if len < METHOD_SIZE {
            return Err(VisorError::ProtocolViolation("frame shorter than method id"));
        }
        if src.len() < LEN_PREFIX + len {
            src.reserve(LEN_PREFIX + len - src.len());
            return Ok(None);
        }

        src.advance(LEN_PREFIX);
        let body = src.split_to(len);
        let method = u16::from_le_bytes([body[0], body[1]]);
        Ok(Some(HubFrame::from_raw(method, body[METHOD_SIZE..].to_vec())))
    }
}

impl Encoder<HubFrame> for HubCodec {
    type Error = VisorError;

    fn encode(&mut self, item: HubFrame, dst: &mut BytesMut) -> Result<(), VisorError> {
        let len = item.encoded_len();
        if len > MAX_FRAME_SIZE {
            return Err(VisorError::PayloadTooLarge {
                size: len,
                max: MAX_FRAME_SIZE,
            });
        }

        dst.reserve(LEN_PREFIX + len);
        dst.put_u32_le(len as u32);
        dst.put_u16_le(item.method_raw());
        dst.put_slice(item.payload());
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::message::HubMethod;

    #[test]
    fn encode_decode_roundtrip() {
        let mut codec = HubCodec;
        let mut buf = BytesMut::new();

        let frame = HubFrame::new(HubMethod::SessionStarted, b"payload".to_vec());
        codec.encode(frame.clone(), &mut buf).unwrap();

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, frame);
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_input_waits_for_more() {
        let mut codec = HubCodec;
        let mut buf = BytesMut::new();

        let frame = HubFrame::new(HubMethod::ScreenData, vec![0xAA; 64]);
        codec.encode(frame.clone(), &mut buf).unwrap();

        // Feed one byte at a time; only the final byte completes a frame.
        let full = buf.split();
        let mut feed = BytesMut::new();
        for (i, byte) in full.iter().enumerate() {
            feed.put_u8(*byte);
            let result = codec.decode(&mut feed).unwrap();
            if i + 1 < full.len() {
                assert!(result.is_none());
            } else {
                assert_eq!(result.unwrap(), frame);
            }
        }
    }

    #[test]
    fn several_frames_in_one_buffer() {
        let mut codec = HubCodec;
        let mut buf = BytesMut::new();
        for i in 0..3u8 {
            codec
                .encode(HubFrame::new(HubMethod::ReportHealth, vec![i]), &mut buf)
                .unwrap();
        }
        for i in 0..3u8 {
            let frame = codec.decode(&mut buf).unwrap().unwrap();
            assert_eq!(frame.payload(), &[i]);
        }
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn oversized_inbound_frame_rejected() {
        let mut codec = HubCodec;
        let mut buf = BytesMut::new();
        buf.put_u32_le((MAX_FRAME_SIZE + 1) as u32);
        buf.put_u16_le(0x0001);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(VisorError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn oversized_outbound_frame_rejected() {
        let mut codec = HubCodec;
        let mut buf = BytesMut::new();
        let frame = HubFrame::new(HubMethod::ScreenData, vec![0u8; MAX_FRAME_SIZE]);
        assert!(matches!(
            codec.encode(frame, &mut buf),
            Err(VisorError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn unknown_method_decodes_as_raw() {
        let mut codec = HubCodec;
        let mut buf = BytesMut::new();
        codec
            .encode(HubFrame::from_raw(0x7777, b"x".to_vec()), &mut buf)
            .unwrap();
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.method_raw(), 0x7777);
        assert!(frame.method().is_err());
    }
}
