//! Framed wire protocol (§4.9): `magic:u16 (0xC0C1) | type:u8 | length:u32 |
//! payload:[length]`. Grounded on the teacher's `rlpx/frame.rs`
//! `tokio_util::codec::{Decoder, Encoder}` split — the encryption/MAC layer
//! there doesn't apply to this protocol's plain-JSON payloads, only the
//! framing shape does.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::P2PError;
use crate::message::Message;

pub const MAGIC: u16 = 0xC0C1;
const HEADER_LEN: usize = 2 + 1 + 4;
pub const MAX_PAYLOAD: usize = 16 * 1024 * 1024;
pub const MAX_BUFFER: usize = 32 * 1024 * 1024;

#[derive(Default)]
pub struct FrameCodec;

impl Decoder for FrameCodec {
    type Item = Message;
    type Error = P2PError;

    /// A streaming accumulator: `BytesMut::reserve` grows the buffer
    /// geometrically as more bytes are needed, so repeated partial reads
    /// don't pay O(n) per byte. `decode` is called in a loop by `Framed`
    /// until it returns `Ok(None)`, so each call only has to handle a
    /// single frame.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, P2PError> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let magic = u16::from_be_bytes([src[0], src[1]]);
        if magic != MAGIC {
            src.clear();
            return Err(P2PError::BadMagic(magic));
        }

        let type_byte = src[2];
        let length = u32::from_be_bytes([src[3], src[4], src[5], src[6]]) as usize;
        if length > MAX_PAYLOAD {
            src.clear();
            return Err(P2PError::FrameTooLarge(length));
        }

        let frame_len = HEADER_LEN + length;
        if frame_len > MAX_BUFFER {
            src.clear();
            return Err(P2PError::BufferOverflow);
        }

        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        let mut frame = src.split_to(frame_len);
        frame.advance(HEADER_LEN);
        let message = Message::decode(type_byte, &frame)?;
        Ok(Some(message))
    }
}

impl Encoder<Message> for FrameCodec {
    type Error = P2PError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), P2PError> {
        let payload = item.encode_payload()?;
        if payload.len() > MAX_PAYLOAD {
            return Err(P2PError::FrameTooLarge(payload.len()));
        }
        dst.reserve(HEADER_LEN + payload.len());
        dst.put_u16(MAGIC);
        dst.put_u8(item.type_byte());
        dst.put_u32(payload.len() as u32);
        dst.put_slice(&payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::PingPong;

    #[test]
    fn encodes_and_decodes_a_single_frame() {
        let mut codec = FrameCodec;
        let mut buf = BytesMut::new();
        codec
            .encode(Message::Ping(PingPong { nonce: 7 }), &mut buf)
            .unwrap();

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        match decoded {
            Message::Ping(p) => assert_eq!(p.nonce, 7),
            _ => panic!("wrong variant"),
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_frame_returns_none_until_complete() {
        let mut codec = FrameCodec;
        let mut buf = BytesMut::new();
        codec
            .encode(Message::Ping(PingPong { nonce: 1 }), &mut buf)
            .unwrap();
        let whole = buf.split();
        let mut partial = BytesMut::from(&whole[..whole.len() - 1]);
        assert!(codec.decode(&mut partial).unwrap().is_none());
    }

    #[test]
    fn oversized_declared_length_is_rejected() {
        let mut codec = FrameCodec;
        let mut buf = BytesMut::new();
        buf.put_u16(MAGIC);
        buf.put_u8(0xF0);
        buf.put_u32((MAX_PAYLOAD + 1) as u32);
        assert!(matches!(codec.decode(&mut buf), Err(P2PError::FrameTooLarge(_))));
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut codec = FrameCodec;
        let mut buf = BytesMut::new();
        buf.put_u16(0xDEAD);
        buf.put_u8(0xF0);
        buf.put_u32(0);
        assert!(matches!(codec.decode(&mut buf), Err(P2PError::BadMagic(0xDEAD))));
    }
}
