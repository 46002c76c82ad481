//! VarInt length-prefixed framing for TCP streams.
//!
//! Every packet on the wire is a frame:
//!
//! ```text
//! +-------------------+------------------+------------------+
//! | length (VarInt)   | packet id        | field bytes      |
//! |                   | (VarInt)         |                  |
//! +-------------------+------------------+------------------+
//!                     |<------------ length bytes --------->|
//! ```
//!
//! The length counts the packet id and the field bytes, not itself.
//!
//! [`FrameBuffer`] accumulates stream reads and hands out complete frames.
//! After each frame the remaining bytes are shifted to the front of the
//! buffer, so several frames arriving in one read and one frame spread over
//! many reads are both handled.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::codec::{MAX_VAR_INT_BYTES, PacketReader, PacketWriter, peek_var_int, var_int_len};
use crate::error::CodecError;

/// Largest frame length a three-byte VarInt can declare.
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 2_097_151;

/// Configuration for the framing layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameConfig {
    /// Maximum declared frame length in bytes. Default: 2 MiB - 1.
    pub max_frame_length: usize,
    /// Initial receive buffer size. Default: 4 KiB.
    pub read_buffer_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            read_buffer_size: 4096,
        }
    }
}

/// Errors that can occur during framing operations.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The length prefix is not a valid VarInt or is negative.
    #[error("malformed frame length: {0}")]
    MalformedLength(#[source] CodecError),

    /// A frame declared zero bytes, so it has no packet id.
    #[error("empty frame")]
    EmptyFrame {
        /// Bytes the frame occupied in the stream.
        consumed: usize,
    },

    /// The declared length exceeds the configured maximum.
    #[error("frame length {length} exceeds maximum {max}")]
    FrameTooLarge {
        /// The declared length.
        length: usize,
        /// The configured maximum.
        max: usize,
    },

    /// The packet id at the start of the frame could not be read.
    #[error("malformed packet id: {source}")]
    MalformedPacketId {
        /// Bytes the frame occupied in the stream.
        consumed: usize,
        #[source]
        source: CodecError,
    },

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameError {
    /// Whether the stream can no longer be trusted to be on a frame boundary.
    ///
    /// Fatal errors close the connection; the others drop one frame.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            FrameError::EmptyFrame { .. } | FrameError::MalformedPacketId { .. }
        )
    }

    /// Bytes to skip past a non-fatal bad frame.
    fn consumed(&self) -> Option<usize> {
        match self {
            FrameError::EmptyFrame { consumed } | FrameError::MalformedPacketId { consumed, .. } => {
                Some(*consumed)
            }
            _ => None,
        }
    }
}

/// A fully reassembled packet payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The packet id read from the start of the frame.
    pub packet_id: i32,
    /// The encoded fields following the id.
    pub body: Vec<u8>,
}

/// Try to extract one frame from the start of `buf`.
///
/// Returns `Ok(None)` when more bytes are needed, otherwise the frame and the
/// number of bytes it occupied. `buf` itself is never modified.
pub fn try_extract_frame(
    buf: &[u8],
    max_frame_length: usize,
) -> Result<Option<(Frame, usize)>, FrameError> {
    let Some((length, header)) = peek_var_int(buf).map_err(FrameError::MalformedLength)? else {
        return Ok(None);
    };
    let length = usize::try_from(length)
        .map_err(|_| FrameError::MalformedLength(CodecError::NegativeLength(length)))?;
    if length > max_frame_length {
        return Err(FrameError::FrameTooLarge {
            length,
            max: max_frame_length,
        });
    }

    let consumed = header + length;
    if buf.len() < consumed {
        return Ok(None);
    }
    if length == 0 {
        return Err(FrameError::EmptyFrame { consumed });
    }

    let mut reader = PacketReader::new(&buf[header..consumed]);
    let packet_id = reader
        .read_var_int()
        .map_err(|source| FrameError::MalformedPacketId { consumed, source })?;
    let body = reader.read_remaining();
    Ok(Some((Frame { packet_id, body }, consumed)))
}

/// Encode a complete frame from a packet id and its encoded fields.
pub fn encode_frame(packet_id: i32, fields: &[u8]) -> Vec<u8> {
    let length = var_int_len(packet_id) + fields.len();
    let mut writer = PacketWriter::with_capacity(var_int_len(length as i32) + length);
    writer.write_var_int(length as i32);
    writer.write_var_int(packet_id);
    writer.write_bytes(fields);
    writer.into_inner()
}

// ---------------------------------------------------------------------------
// Receive buffer
// ---------------------------------------------------------------------------

/// A receive buffer with a filled-length cursor.
#[derive(Debug)]
pub struct FrameBuffer {
    buf: Vec<u8>,
    filled: usize,
    config: FrameConfig,
}

impl FrameBuffer {
    pub fn new(config: FrameConfig) -> Self {
        Self {
            buf: vec![0; config.read_buffer_size.max(MAX_VAR_INT_BYTES)],
            filled: 0,
            config,
        }
    }

    /// Bytes received but not yet handed out as frames.
    pub fn filled(&self) -> usize {
        self.filled
    }

    /// Current buffer capacity.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Read once from `reader` into the free space after the fill cursor.
    ///
    /// Returns the number of bytes read; `0` means the peer closed.
    pub async fn read_from<R: AsyncRead + Unpin>(&mut self, reader: &mut R) -> std::io::Result<usize> {
        self.reserve();
        let n = reader.read(&mut self.buf[self.filled..]).await?;
        self.filled += n;
        Ok(n)
    }

    /// Append bytes that were received by other means.
    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        let needed = self.filled + bytes.len();
        if needed > self.buf.len() {
            self.buf.resize(needed, 0);
        }
        self.buf[self.filled..needed].copy_from_slice(bytes);
        self.filled = needed;
    }

    /// Extract the next complete frame, compacting the buffer behind it.
    ///
    /// Non-fatal errors have already skipped the bad frame when returned, so
    /// the caller may keep calling.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, FrameError> {
        match try_extract_frame(&self.buf[..self.filled], self.config.max_frame_length) {
            Ok(Some((frame, consumed))) => {
                self.consume(consumed);
                Ok(Some(frame))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                if let Some(consumed) = e.consumed() {
                    self.consume(consumed);
                }
                Err(e)
            }
        }
    }

    fn consume(&mut self, n: usize) {
        self.buf.copy_within(n..self.filled, 0);
        self.filled -= n;
    }

    /// Make sure there is free space to read into.
    ///
    /// The buffer doubles when full, up to the size of the largest legal frame.
    fn reserve(&mut self) {
        if self.filled < self.buf.len() {
            return;
        }
        let limit = self.config.max_frame_length + MAX_VAR_INT_BYTES;
        let grown = (self.buf.len() * 2).clamp(self.buf.len() + 1, limit.max(self.buf.len() + 1));
        self.buf.resize(grown, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncWriteExt, duplex};

    fn sample_frames() -> Vec<u8> {
        let mut bytes = encode_frame(0x00, &[]);
        bytes.extend(encode_frame(0x01, &42i64.to_be_bytes()));
        bytes.extend(encode_frame(0x2B, &[7; 300]));
        bytes
    }

    #[test]
    fn test_encode_frame_layout() {
        assert_eq!(encode_frame(0x01, &[0xAA, 0xBB]), vec![0x03, 0x01, 0xAA, 0xBB]);

        let big = encode_frame(0x00, &[0; 200]);
        assert_eq!(&big[..3], &[0xC9, 0x01, 0x00]);
        assert_eq!(big.len(), 2 + 201);
    }

    #[test]
    fn test_incomplete_header_and_body() {
        assert!(try_extract_frame(&[], 16).unwrap().is_none());
        assert!(try_extract_frame(&[0x80], 1000).unwrap().is_none());
        assert!(try_extract_frame(&[0x03, 0x01, 0xAA], 16).unwrap().is_none());
    }

    #[test]
    fn test_extract_leaves_following_bytes() {
        let mut bytes = encode_frame(0x05, &[1, 2]);
        bytes.extend_from_slice(&[0x09, 0x09]);
        let (frame, consumed) = try_extract_frame(&bytes, 16).unwrap().unwrap();
        assert_eq!(frame, Frame { packet_id: 5, body: vec![1, 2] });
        assert_eq!(consumed, 4);
    }

    #[test]
    fn test_multiple_frames_in_one_read() {
        let mut buffer = FrameBuffer::new(FrameConfig::default());
        buffer.extend_from_slice(&sample_frames());

        let ids: Vec<i32> = std::iter::from_fn(|| buffer.next_frame().unwrap())
            .map(|f| f.packet_id)
            .collect();
        assert_eq!(ids, vec![0x00, 0x01, 0x2B]);
        assert_eq!(buffer.filled(), 0);
    }

    #[test]
    fn test_reassembly_across_every_split_point() {
        let frame = encode_frame(0x07, &(0u8..=200).collect::<Vec<_>>());
        for split in 0..=frame.len() {
            let mut buffer = FrameBuffer::new(FrameConfig::default());
            buffer.extend_from_slice(&frame[..split]);
            let first = buffer.next_frame().unwrap();
            buffer.extend_from_slice(&frame[split..]);
            let frames: Vec<Frame> = first
                .into_iter()
                .chain(std::iter::from_fn(|| buffer.next_frame().unwrap()))
                .collect();
            assert_eq!(frames.len(), 1, "split at {split}");
            assert_eq!(frames[0].packet_id, 0x07);
            assert_eq!(frames[0].body.len(), 201);
        }
    }

    #[test]
    fn test_reassembly_byte_by_byte() {
        let bytes = sample_frames();
        let mut buffer = FrameBuffer::new(FrameConfig::default());
        let mut frames = Vec::new();
        for byte in bytes {
            buffer.extend_from_slice(&[byte]);
            while let Some(frame) = buffer.next_frame().unwrap() {
                frames.push(frame);
            }
        }
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[1].body, 42i64.to_be_bytes());
    }

    #[test]
    fn test_oversized_frame_is_fatal() {
        let err = try_extract_frame(&[0xFF, 0x01], 16).unwrap_err();
        assert!(matches!(err, FrameError::FrameTooLarge { length: 255, max: 16 }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_malformed_length_is_fatal() {
        let err = try_extract_frame(&[0xFF; 6], 16).unwrap_err();
        assert!(matches!(err, FrameError::MalformedLength(_)));
        assert!(err.is_fatal());

        let negative = try_extract_frame(&[0xFF, 0xFF, 0xFF, 0xFF, 0x0F], usize::MAX).unwrap_err();
        assert!(matches!(negative, FrameError::MalformedLength(CodecError::NegativeLength(-1))));
    }

    #[test]
    fn test_empty_frame_is_skipped() {
        let mut buffer = FrameBuffer::new(FrameConfig::default());
        buffer.extend_from_slice(&[0x00]);
        buffer.extend_from_slice(&encode_frame(0x01, &[]));

        let err = buffer.next_frame().unwrap_err();
        assert!(!err.is_fatal());
        assert_eq!(buffer.next_frame().unwrap().unwrap().packet_id, 0x01);
    }

    #[test]
    fn test_malformed_packet_id_is_skipped() {
        let mut buffer = FrameBuffer::new(FrameConfig::default());
        buffer.extend_from_slice(&[0x02, 0x80, 0x80]);
        buffer.extend_from_slice(&encode_frame(0x03, &[1]));

        let err = buffer.next_frame().unwrap_err();
        assert!(matches!(err, FrameError::MalformedPacketId { consumed: 3, .. }));
        let frame = buffer.next_frame().unwrap().unwrap();
        assert_eq!(frame, Frame { packet_id: 3, body: vec![1] });
    }

    #[tokio::test]
    async fn test_read_from_stream_grows_buffer() {
        let (mut client, mut server) = duplex(64);
        let frame = encode_frame(0x10, &[0x55; 100]);
        let expected = frame.clone();
        tokio::spawn(async move {
            for chunk in frame.chunks(7) {
                client.write_all(chunk).await.unwrap();
            }
        });

        let mut buffer = FrameBuffer::new(FrameConfig {
            max_frame_length: 1024,
            read_buffer_size: 8,
        });
        let received = loop {
            if let Some(frame) = buffer.next_frame().unwrap() {
                break frame;
            }
            let n = buffer.read_from(&mut server).await.unwrap();
            assert!(n > 0, "stream closed early");
        };
        assert_eq!(received.packet_id, 0x10);
        assert_eq!(received.body, expected[2..]);
        assert!(buffer.capacity() >= expected.len());
    }
}
