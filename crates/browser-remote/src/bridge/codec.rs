//! Framed codec for native peer communication.
//!
//! Uses LengthDelimitedCodec for framing (4-byte length in host byte order)
//! + serde_json for serialization. Works over any AsyncRead/AsyncWrite
//! (stdio, pipes, in-memory duplex streams).

use std::io;
use std::marker::PhantomData;
use std::sync::OnceLock;

use serde::{Serialize, de::DeserializeOwned};
use tokio_util::bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

/// Frames above this size are still read but flagged as likely undecodable.
pub const DEFAULT_SOFT_FRAME_LIMIT: usize = 8 * 1024;

/// Frames above this size are a transport error.
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 64 * 1024 * 1024;

const LENGTH_FIELD_LEN: usize = 4;

/// Byte order of the frame length prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    /// Host byte order, probed once per process.
    pub fn native() -> Self {
        static NATIVE: OnceLock<ByteOrder> = OnceLock::new();
        *NATIVE.get_or_init(|| {
            if 1u16.to_ne_bytes()[0] == 1 {
                ByteOrder::Little
            } else {
                ByteOrder::Big
            }
        })
    }

    fn read_u32(self, bytes: [u8; LENGTH_FIELD_LEN]) -> u32 {
        match self {
            ByteOrder::Little => u32::from_le_bytes(bytes),
            ByteOrder::Big => u32::from_be_bytes(bytes),
        }
    }
}

impl std::fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ByteOrder::Little => f.write_str("little-endian"),
            ByteOrder::Big => f.write_str("big-endian"),
        }
    }
}

/// One frame read off the wire.
///
/// JSON errors stay inside the frame so a bad payload never ends the stream.
#[derive(Debug)]
pub struct DecodedFrame<T> {
    /// Declared payload length.
    pub len: usize,
    /// Declared length exceeded the soft limit.
    pub oversized: bool,
    pub message: Result<T, serde_json::Error>,
}

/// Codec that frames messages with a length prefix and serializes with JSON.
///
/// Wraps LengthDelimitedCodec and adds serde_json serialization plus the
/// oversized-frame warning.
pub struct JsonCodec<T> {
    inner: LengthDelimitedCodec,
    byte_order: ByteOrder,
    soft_limit: usize,
    // Set once the length prefix of the current frame has been inspected;
    // the inner codec consumes the prefix as soon as it is buffered.
    in_frame: bool,
    current_oversized: bool,
    _phantom: PhantomData<T>,
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> JsonCodec<T> {
    pub fn new() -> Self {
        Self::with_byte_order(ByteOrder::native())
    }

    pub fn with_byte_order(byte_order: ByteOrder) -> Self {
        Self::with_limits(byte_order, DEFAULT_SOFT_FRAME_LIMIT, DEFAULT_MAX_FRAME_LENGTH)
    }

    pub fn with_limits(byte_order: ByteOrder, soft_limit: usize, max_frame_length: usize) -> Self {
        let mut builder = LengthDelimitedCodec::builder();
        builder
            .length_field_length(LENGTH_FIELD_LEN)
            .max_frame_length(max_frame_length);
        match byte_order {
            ByteOrder::Little => builder.little_endian(),
            ByteOrder::Big => builder.big_endian(),
        };

        Self {
            inner: builder.new_codec(),
            byte_order,
            soft_limit,
            in_frame: false,
            current_oversized: false,
            _phantom: PhantomData,
        }
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    fn inspect_length_prefix(&mut self, src: &BytesMut) {
        if self.in_frame || src.len() < LENGTH_FIELD_LEN {
            return;
        }
        let mut prefix = [0u8; LENGTH_FIELD_LEN];
        prefix.copy_from_slice(&src[..LENGTH_FIELD_LEN]);
        let declared = self.byte_order.read_u32(prefix) as usize;

        tracing::trace!(frame_len = declared, "Frame header read");
        self.in_frame = true;
        self.current_oversized = declared > self.soft_limit;
        if self.current_oversized {
            tracing::warn!(
                frame_len = declared,
                soft_limit = self.soft_limit,
                "Frame exceeds buffer size and is unlikely to decode"
            );
        }
    }
}

impl<T: DeserializeOwned> Decoder for JsonCodec<T> {
    type Item = DecodedFrame<T>;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.inspect_length_prefix(src);

        match self.inner.decode(src)? {
            Some(bytes) => {
                let oversized = self.current_oversized;
                self.in_frame = false;
                self.current_oversized = false;
                Ok(Some(DecodedFrame {
                    len: bytes.len(),
                    oversized,
                    message: serde_json::from_slice(&bytes),
                }))
            }
            None => Ok(None),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        // The inner codec drops the length prefix once it is buffered, so an
        // empty buffer alone does not mean we stopped between frames.
        if self.in_frame || !src.is_empty() {
            self.in_frame = false;
            self.current_oversized = false;
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "native stream closed mid-frame",
            ));
        }
        Ok(None)
    }
}

impl<T: Serialize> Encoder<T> for JsonCodec<T> {
    type Error = io::Error;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let json =
            serde_json::to_vec(&item).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let json_len = json.len();
        tracing::trace!(json_size_bytes = json_len, "Encoding frame");
        if json_len > self.soft_limit {
            tracing::debug!(
                json_size_bytes = json_len,
                soft_limit = self.soft_limit,
                "Large frame being encoded"
            );
        }
        self.inner.encode(Bytes::from(json), dst)
    }
}
