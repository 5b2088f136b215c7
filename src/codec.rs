//! Phase-by-phase RFC 6455 frame decoder/encoder, expressed as a
//! [`tokio_util::codec`] pair over a cumulative [`BytesMut`] buffer.
//!
//! `Decoder::decode` returning `Ok(None)` is "need more bytes"; `Ok(Some(_))`
//! is a successful decode; `Err(_)` is fatal. No phase below mutates `src`
//! until every byte the frame needs is already present.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::WsError;
use crate::frame::{apply_mask, DecodedFrame, OpCode};

/// What an application can ask a [`crate::Connection`] to send.
///
/// Deliberately has only these two variants: "neither text nor bytes" is the
/// `ApplicationError` case in `spec.md` §7, and here it is simply
/// unrepresentable.
#[derive(Debug, Clone)]
pub enum Outgoing {
    /// A TEXT frame; UTF-8 encoding is applied here.
    Text(String),
    /// A BINARY frame.
    Binary(Bytes),
}

/// Every frame kind the codec can put on the wire, including the control
/// frames the connection state machine generates itself (auto-PONG,
/// keepalive PING, CLOSE). Not exposed outside the crate: applications only
/// ever produce [`Outgoing`].
#[derive(Debug, Clone)]
pub(crate) enum WireFrame {
    Text(String),
    Binary(Bytes),
    Ping(Bytes),
    Pong(Bytes),
    Close { code: u16, reason: String },
}

impl From<Outgoing> for WireFrame {
    fn from(msg: Outgoing) -> Self {
        match msg {
            Outgoing::Text(s) => WireFrame::Text(s),
            Outgoing::Binary(b) => WireFrame::Binary(b),
        }
    }
}

/// RFC 6455 frame codec, parameterized by which side of the connection must
/// mask its payloads.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    /// True when frames *received* on this connection must be masked
    /// (server role).
    pub remote_must_mask: bool,
    /// True when frames *sent* on this connection must be masked
    /// (client role).
    pub local_should_mask: bool,
}

impl FrameCodec {
    pub fn new(remote_must_mask: bool, local_should_mask: bool) -> Self {
        Self {
            remote_must_mask,
            local_should_mask,
        }
    }

    /// Encode a single, unfragmented frame for the given opcode and payload,
    /// applying this codec's masking policy.
    pub fn encode_control(&self, opcode: OpCode, payload: &[u8]) -> Result<BytesMut, WsError> {
        self.encode_frame(opcode, payload)
    }

    fn encode_frame(&self, opcode: OpCode, payload: &[u8]) -> Result<BytesMut, WsError> {
        if payload.len() as u64 > u32::MAX as u64 {
            return Err(WsError::ProtocolViolation(
                "payload exceeds 2^32-1 bytes".into(),
            ));
        }
        if opcode.is_control() && payload.len() > 125 {
            return Err(WsError::ProtocolViolation(
                "control frame payload exceeds 125 bytes".into(),
            ));
        }

        let mask_key = self.local_should_mask.then(rand::random::<[u8; 4]>);
        let len = payload.len() as u64;

        let mut buf = BytesMut::with_capacity(14 + payload.len());
        buf.put_u8(0x80 | opcode.as_u8()); // FIN=1 always; this core never fragments outbound.
        let mask_bit = if mask_key.is_some() { 0x80 } else { 0 };
        match len {
            0..=125 => buf.put_u8(mask_bit | len as u8),
            126..=65535 => {
                buf.put_u8(mask_bit | 126);
                buf.put_u16(len as u16);
            }
            _ => {
                buf.put_u8(mask_bit | 127);
                buf.put_u64(len);
            }
        }

        let mut masked_payload = BytesMut::from(payload);
        if let Some(mask) = mask_key {
            buf.put_slice(&mask);
            apply_mask(&mut masked_payload, mask);
        }
        buf.extend_from_slice(&masked_payload);
        Ok(buf)
    }
}

impl Encoder<WireFrame> for FrameCodec {
    type Error = WsError;

    fn encode(&mut self, item: WireFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (opcode, payload) = match item {
            WireFrame::Text(s) => (OpCode::Text, Bytes::from(s.into_bytes())),
            WireFrame::Binary(b) => (OpCode::Binary, b),
            WireFrame::Ping(b) => (OpCode::Ping, b),
            WireFrame::Pong(b) => (OpCode::Pong, b),
            WireFrame::Close { code, reason } => {
                let mut payload = BytesMut::with_capacity(2 + reason.len());
                payload.put_u16(code);
                payload.extend_from_slice(reason.as_bytes());
                (OpCode::Close, payload.freeze())
            }
        };
        let frame = self.encode_frame(opcode, &payload)?;
        dst.extend_from_slice(&frame);
        Ok(())
    }
}

impl Decoder for FrameCodec {
    type Item = DecodedFrame;
    type Error = WsError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Phase 1: 2-byte base header.
        if src.len() < 2 {
            return Ok(None);
        }
        if &src[0..2] == b"HT" {
            return Err(WsError::StreamMisdirection);
        }

        let b0 = src[0];
        let b1 = src[1];
        let fin = b0 & 0x80 != 0;
        let opcode = OpCode::try_from(b0 & 0x0F)
            .map_err(|bad| WsError::ProtocolViolation(format!("invalid opcode {bad:#x}")))?;
        let masked = b1 & 0x80 != 0;
        let len0 = b1 & 0x7F;

        // Phase 2: extended payload length.
        let mut offset = 2usize;
        let payload_len: u64 = match len0 {
            0..=125 => len0 as u64,
            126 => {
                if src.len() < offset + 2 {
                    return Ok(None);
                }
                let len = u16::from_be_bytes([src[offset], src[offset + 1]]) as u64;
                offset += 2;
                len
            }
            127 => {
                if src.len() < offset + 8 {
                    return Ok(None);
                }
                let hi = u32::from_be_bytes([
                    src[offset],
                    src[offset + 1],
                    src[offset + 2],
                    src[offset + 3],
                ]);
                if hi != 0 {
                    return Err(WsError::ProtocolViolation(
                        "payload length exceeds 2^32-1".into(),
                    ));
                }
                let lo = u32::from_be_bytes([
                    src[offset + 4],
                    src[offset + 5],
                    src[offset + 6],
                    src[offset + 7],
                ]);
                offset += 8;
                lo as u64
            }
            _ => unreachable!("7-bit field"),
        };

        if masked != self.remote_must_mask {
            return Err(WsError::ProtocolViolation(format!(
                "mask bit must be {} for this role, got {}",
                self.remote_must_mask, masked
            )));
        }

        // Phase 3: mask key.
        let mut mask_key = None;
        if masked {
            if src.len() < offset + 4 {
                return Ok(None);
            }
            mask_key = Some([
                src[offset],
                src[offset + 1],
                src[offset + 2],
                src[offset + 3],
            ]);
            offset += 4;
        }

        // Phase 4: payload.
        let payload_len = payload_len as usize;
        let total_len = offset + payload_len;
        if src.len() < total_len {
            src.reserve(total_len - src.len());
            return Ok(None);
        }

        let mut frame_bytes = src.split_to(total_len);
        frame_bytes.advance(offset);
        let mut payload = frame_bytes;
        // Phase 5: unmask in place.
        if let Some(mask) = mask_key {
            apply_mask(&mut payload, mask);
        }

        Ok(Some(DecodedFrame {
            fin,
            opcode,
            payload: payload.freeze(),
        }))
    }
}
