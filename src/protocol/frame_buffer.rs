//! Frame buffer for accumulating serial bytes.
//!
//! Bytes are consumed one at a time. The buffer tracks two states:
//! - `Seeking`: no start marker seen yet, bytes are noise
//! - `InFrame`: buffer begins with `FF 55`, waiting for `0D 0A`
//!
//! A start marker anywhere in the trailing window resets the buffer to begin
//! at that marker, so a garbled or truncated frame is dropped in favour of
//! the next one. The buffer is capped; reaching the cap clears it.
//!
//! Payload bytes equal to `0D 0A` end the frame early. The robot does not
//! escape them.
//!
//! # Example
//!
//! ```
//! use coconut_link::protocol::FrameBuffer;
//!
//! let mut buffer = FrameBuffer::new();
//! let frames = buffer.push(&[0x00, 0xFF, 0x55, 0x00, 0x04, 0x0D, 0x0A]);
//! assert_eq!(frames.len(), 1);
//! assert_eq!(&frames[0][..], &[0xFF, 0x55, 0x00, 0x04]);
//! ```

use bytes::{Bytes, BytesMut};

use super::wire_format::{DEFAULT_MAX_BUFFER, END_MARKER, START_MARKER};

/// Scanner state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Waiting for `FF 55`.
    Seeking,
    /// Start marker seen, waiting for `0D 0A`.
    InFrame,
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
pub struct FrameBuffer {
    /// Accumulated bytes.
    buffer: BytesMut,
    /// Current scanner state.
    state: State,
    /// Roll-over threshold.
    max_len: usize,
}

impl FrameBuffer {
    /// Create a new frame buffer with the default cap (1024 bytes).
    pub fn new() -> Self {
        Self::with_max_len(DEFAULT_MAX_BUFFER)
    }

    /// Create a new frame buffer with a custom cap.
    pub fn with_max_len(max_len: usize) -> Self {
        let max_len = max_len.max(START_MARKER.len() + END_MARKER.len());
        Self {
            buffer: BytesMut::with_capacity(max_len),
            state: State::Seeking,
            max_len,
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// Each returned frame starts with `FF 55` and excludes the end marker.
    /// Partial data is kept for the next push.
    pub fn push(&mut self, data: &[u8]) -> Vec<Bytes> {
        let mut frames = Vec::new();
        for &byte in data {
            if let Some(frame) = self.push_byte(byte) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Feed one byte, returning a frame if this byte completed one.
    pub fn push_byte(&mut self, byte: u8) -> Option<Bytes> {
        if self.buffer.len() >= self.max_len {
            tracing::debug!(
                "Frame buffer reached {} bytes without a frame, clearing",
                self.buffer.len()
            );
            self.clear();
        }

        self.buffer.extend_from_slice(&[byte]);

        if self.buffer.ends_with(&START_MARKER) {
            let skip = self.buffer.len() - START_MARKER.len();
            if skip > 0 {
                tracing::debug!("Resync on start marker, dropped {} bytes", skip);
                let _ = self.buffer.split_to(skip);
            }
            self.state = State::InFrame;
            return None;
        }

        if self.state == State::InFrame && self.buffer.ends_with(&END_MARKER) {
            let body = self.buffer.len() - END_MARKER.len();
            let frame = self.buffer.split_to(body).freeze();
            self.buffer.clear();
            self.state = State::Seeking;
            return Some(frame);
        }

        None
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::Seeking;
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match self.state {
            State::Seeking => "Seeking",
            State::InFrame => "InFrame",
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACK: [u8; 6] = [0xFF, 0x55, 0x00, 0x04, 0x0D, 0x0A];
    const DISTANCE: [u8; 9] = [0xFF, 0x55, 0x04, 0x00, 0x03, 0x2A, 0x00, 0x0D, 0x0A];

    #[test]
    fn test_single_ack() {
        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(&ACK);

        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], &ACK[..4]);
        assert!(buffer.is_empty());
        assert_eq!(buffer.state_name(), "Seeking");
    }

    #[test]
    fn test_same_frame_twice() {
        let mut buffer = FrameBuffer::new();

        let first = buffer.push(&DISTANCE);
        let second = buffer.push(&DISTANCE);

        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_eq!(first[0], second[0]);
    }

    #[test]
    fn test_garbage_prefix_discarded() {
        let mut buffer = FrameBuffer::new();
        let mut data = vec![0x12, 0x34, 0x0D, 0x0A, 0x99, 0xFF];
        data.extend_from_slice(&DISTANCE);

        let frames = buffer.push(&data);

        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], &DISTANCE[..7]);
    }

    #[test]
    fn test_end_marker_ignored_while_seeking() {
        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(&[0x0D, 0x0A, 0x0D, 0x0A]);
        assert!(frames.is_empty());
        assert_eq!(buffer.state_name(), "Seeking");
    }

    #[test]
    fn test_truncated_frame_replaced_by_next_start() {
        let mut buffer = FrameBuffer::new();
        let mut data = vec![0xFF, 0x55, 0x07, 0x00, 0x02];
        data.extend_from_slice(&ACK);

        let frames = buffer.push(&data);

        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], &ACK[..4]);
    }

    #[test]
    fn test_multiple_frames_in_one_push() {
        let mut buffer = FrameBuffer::new();
        let mut data = ACK.to_vec();
        data.extend_from_slice(&DISTANCE);
        data.extend_from_slice(&ACK);

        let frames = buffer.push(&data);

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].len(), 4);
        assert_eq!(frames[1].len(), 7);
        assert_eq!(frames[2].len(), 4);
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut buffer = FrameBuffer::new();
        let mut all_frames = Vec::new();

        for byte in &DISTANCE {
            all_frames.extend(buffer.push(&[*byte]));
        }

        assert_eq!(all_frames.len(), 1);
        assert_eq!(&all_frames[0][..], &DISTANCE[..7]);
    }

    #[test]
    fn test_partial_frame_kept() {
        let mut buffer = FrameBuffer::new();

        assert!(buffer.push(&DISTANCE[..5]).is_empty());
        assert_eq!(buffer.state_name(), "InFrame");
        assert_eq!(buffer.len(), 5);

        let frames = buffer.push(&DISTANCE[5..]);
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_payload_containing_end_marker_truncates() {
        let mut buffer = FrameBuffer::new();
        // i16 value 0x0A0D is sent as 0D 0A.
        let data = [0xFF, 0x55, 0x04, 0x00, 0x03, 0x0D, 0x0A, 0x0D, 0x0A];

        let frames = buffer.push(&data);

        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], &data[..5]);
    }

    #[test]
    fn test_overflow_rolls_over() {
        let mut buffer = FrameBuffer::with_max_len(16);

        let frames = buffer.push(&[0xAA; 40]);
        assert!(frames.is_empty());
        assert!(buffer.len() <= 16);

        let frames = buffer.push(&ACK);
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_oversized_frame_dropped() {
        let mut buffer = FrameBuffer::with_max_len(8);
        let mut data = vec![0xFF, 0x55];
        data.extend_from_slice(&[0x01; 10]);
        data.extend_from_slice(&[0x0D, 0x0A]);

        assert!(buffer.push(&data).is_empty());
        assert_eq!(buffer.push(&ACK).len(), 1);
    }

    #[test]
    fn test_clear_resets_state() {
        let mut buffer = FrameBuffer::new();
        buffer.push(&DISTANCE[..4]);
        assert_eq!(buffer.state_name(), "InFrame");

        buffer.clear();

        assert_eq!(buffer.state_name(), "Seeking");
        assert!(buffer.is_empty());
    }
}
