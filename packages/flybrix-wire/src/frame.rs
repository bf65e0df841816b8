//! COBS frame codec.
//!
//! Every frame is a [COBS](https://en.wikipedia.org/wiki/Consistent_Overhead_Byte_Stuffing)
//! encoded body followed by a single [`FRAME_DELIMITER`]. The body never
//! contains the delimiter, so a receiver that lost bytes resynchronizes at the
//! next zero.

use alloc::vec::Vec;
use thiserror::Error;

/// Terminates every frame on the wire.
pub const FRAME_DELIMITER: u8 = 0x00;

/// Response frames: header plus the ack mask.
pub const RESPONSE_CAPACITY: usize = 12;

/// Small fixed messages such as the recording state report.
pub const SMALL_CAPACITY: usize = 20;

/// Configuration and telemetry messages.
pub const LARGE_CAPACITY: usize = 1000;

/// Debug strings.
pub const DEBUG_CAPACITY: usize = 2000;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame is empty")]
    Empty,

    #[error("Frame contains a delimiter before its end")]
    UnexpectedDelimiter,

    #[error("Frame is not valid COBS")]
    Malformed,
}

/// The COBS body of the empty sequence.
const EMPTY_BODY: [u8; 1] = [0x01];

/// Encodes `bytes` into a delimited frame.
pub fn encode_frame(bytes: &[u8]) -> Vec<u8> {
    if bytes.is_empty() {
        return alloc::vec![EMPTY_BODY[0], FRAME_DELIMITER];
    }

    let mut frame = alloc::vec![0; cobs::max_encoding_length(bytes.len()) + 1];
    let len = cobs::encode(bytes, &mut frame);
    frame.truncate(len);
    frame.push(FRAME_DELIMITER);
    frame
}

/// Decodes a single frame. The trailing delimiter is optional.
///
/// # Errors
///
/// Returns a [`FrameError`] if the frame is empty, holds a delimiter before
/// its end or is not valid COBS.
pub fn decode_frame(frame: &[u8]) -> Result<Vec<u8>, FrameError> {
    let body = frame.strip_suffix(&[FRAME_DELIMITER]).unwrap_or(frame);

    if body.is_empty() {
        return Err(FrameError::Empty);
    }
    if body.contains(&FRAME_DELIMITER) {
        return Err(FrameError::UnexpectedDelimiter);
    }
    if body == EMPTY_BODY {
        return Ok(Vec::new());
    }

    // Decoding never grows the data.
    let mut data = alloc::vec![0; body.len()];
    let len = cobs::decode(body, &mut data).map_err(|_| FrameError::Malformed)?;
    data.truncate(len);

    Ok(data)
}

/// Splits a byte stream into frames.
///
/// Bytes are buffered until a delimiter arrives. Frames whose encoded body
/// grows past `N` bytes are dropped, and the reader picks up again after the
/// next delimiter.
#[derive(Debug, Clone, Default)]
pub struct FrameReader<const N: usize> {
    buffer: Vec<u8>,
    overflowed: bool,
}

impl<const N: usize> FrameReader<N> {
    pub const fn new() -> Self {
        Self {
            buffer: Vec::new(),
            overflowed: false,
        }
    }

    /// Ingests `bytes` and returns every frame body completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();

        for &byte in bytes {
            if byte == FRAME_DELIMITER {
                if !self.overflowed && !self.buffer.is_empty() {
                    frames.push(core::mem::take(&mut self.buffer));
                }
                self.buffer.clear();
                self.overflowed = false;
            } else if self.buffer.len() < N {
                self.buffer.push(byte);
            } else {
                self.overflowed = true;
            }
        }

        frames
    }

    /// Number of bytes waiting for a delimiter.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.overflowed = false;
    }
}
