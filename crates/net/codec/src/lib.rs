//! Length-prefixed framing for overlay messages.
//!
//! Every frame starts with a 4-byte header `{size: u16, type: u16}` in network
//! byte order, where `size` counts the header itself. Message bodies are
//! produced and parsed by a [`WireMessage`] implementation; this crate only
//! owns the header and the bounds-checked primitives in [`utils`].

use std::marker::PhantomData;

use bytes::{Buf, BufMut, Bytes, BytesMut};

mod error;
pub mod utils;

pub use error::CodecError;
pub use utils::WireReader;

/// Size of the frame header in bytes.
pub const HEADER_LEN: usize = 4;

/// Largest frame the header can describe.
pub const MAX_FRAME_SIZE: usize = u16::MAX as usize;

/// A message with a fixed type code and a self-describing body.
pub trait WireMessage: Sized {
    /// Type code written into the frame header.
    fn message_type(&self) -> u16;

    /// Encoded body length, excluding the header.
    fn body_len(&self) -> usize;

    /// Append the body to `dst`.
    fn encode_body(&self, dst: &mut BytesMut);

    /// Parse a body of the given type. `body` is exactly the frame payload.
    fn decode_body(message_type: u16, body: &[u8]) -> Result<Self, CodecError>;

    /// Total encoded size including the header.
    fn frame_len(&self) -> usize {
        HEADER_LEN + self.body_len()
    }
}

/// A frame whose body is carried without being interpreted.
///
/// Links that only move frames between peers use this to find frame
/// boundaries in a byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub message_type: u16,
    pub body: Bytes,
}

impl WireMessage for RawFrame {
    fn message_type(&self) -> u16 {
        self.message_type
    }

    fn body_len(&self) -> usize {
        self.body.len()
    }

    fn encode_body(&self, dst: &mut BytesMut) {
        dst.put_slice(&self.body);
    }

    fn decode_body(message_type: u16, body: &[u8]) -> Result<Self, CodecError> {
        Ok(Self {
            message_type,
            body: Bytes::copy_from_slice(body),
        })
    }
}

/// Encode a message into a standalone frame.
pub fn encode_frame<M: WireMessage>(message: &M) -> Result<Bytes, CodecError> {
    let mut dst = BytesMut::with_capacity(message.frame_len());
    write_frame(message, &mut dst)?;
    Ok(dst.freeze())
}

/// Decode one complete frame. The buffer must hold exactly one frame.
pub fn decode_frame<M: WireMessage>(frame: &[u8]) -> Result<M, CodecError> {
    let mut reader = WireReader::new(frame);
    let size = reader.read_u16()? as usize;
    let message_type = reader.read_u16()?;
    if size != frame.len() {
        return Err(CodecError::LengthMismatch {
            declared: size,
            actual: frame.len(),
        });
    }
    M::decode_body(message_type, reader.rest())
}

fn write_frame<M: WireMessage>(message: &M, dst: &mut BytesMut) -> Result<(), CodecError> {
    let size = message.frame_len();
    if size > MAX_FRAME_SIZE {
        return Err(CodecError::Oversize {
            size,
            max: MAX_FRAME_SIZE,
        });
    }
    dst.reserve(size);
    dst.put_u16(size as u16);
    dst.put_u16(message.message_type());
    message.encode_body(dst);
    Ok(())
}

/// Stream codec for [`WireMessage`] frames.
///
/// `E` lets protocol crates surface their own error type, as long as it can
/// absorb codec and IO errors.
pub struct FrameCodec<M, E = CodecError>(PhantomData<(M, E)>);

impl<M, E> FrameCodec<M, E> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<M, E> Default for FrameCodec<M, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M, E> asynchronous_codec::Encoder for FrameCodec<M, E>
where
    M: WireMessage,
    E: From<CodecError> + From<std::io::Error>,
{
    type Item<'a> = M;
    type Error = E;

    fn encode(&mut self, item: Self::Item<'_>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        write_frame(&item, dst).map_err(Into::into)
    }
}

impl<M, E> asynchronous_codec::Decoder for FrameCodec<M, E>
where
    M: WireMessage,
    E: From<CodecError> + From<std::io::Error>,
{
    type Item = M;
    type Error = E;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }
        let mut peek: &[u8] = src.as_ref();
        let size = peek.get_u16() as usize;
        if size < HEADER_LEN {
            return Err(CodecError::LengthMismatch {
                declared: size,
                actual: HEADER_LEN,
            }
            .into());
        }
        if src.len() < size {
            src.reserve(size - src.len());
            return Ok(None);
        }

        let mut frame = src.split_to(size);
        frame.advance(2);
        let message_type = frame.get_u16();
        M::decode_body(message_type, &frame).map(Some).map_err(Into::into)
    }
}
