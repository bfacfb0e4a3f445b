//! Frame reassembly for the chunked backend transport.

use crate::{Result, WireError};

/// Upper bound on bytes held while waiting for a newline. A well-behaved
/// backend emits frames far below this; hitting the cap means the stream
/// is not the line-delimited protocol we expect.
pub const MAX_PENDING_BYTES: usize = 1024 * 1024;

/// Accumulates raw byte chunks and yields complete newline-terminated
/// frames, in arrival order, regardless of how the transport split the
/// bytes.
///
/// The accumulator works on bytes rather than decoded text so a multibyte
/// UTF-8 sequence split across chunks is reassembled intact. `0x0A` never
/// occurs inside a multibyte sequence, so scanning raw bytes for newlines
/// is safe before decoding.
#[derive(Debug, Default)]
pub struct FrameReassembler {
    pending: Vec<u8>,
}

impl FrameReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one transport chunk to the pending buffer.
    pub fn push(&mut self, chunk: &[u8]) -> Result<()> {
        self.pending.extend_from_slice(chunk);
        if self.pending.len() > MAX_PENDING_BYTES && !self.pending.contains(&b'\n') {
            return Err(WireError::FrameTooLong {
                limit: MAX_PENDING_BYTES,
            });
        }
        Ok(())
    }

    /// Pop the earliest complete frame, without its newline.
    ///
    /// Returns `None` once no fully delimited frame remains. Callers drain
    /// in a loop after each [`push`](Self::push), so a chunk carrying
    /// several newlines is handled in a single pass and a chunk carrying
    /// none costs nothing.
    pub fn next_frame(&mut self) -> Option<String> {
        let end = self.pending.iter().position(|&b| b == b'\n')?;
        let frame = String::from_utf8_lossy(&self.pending[..end]).into_owned();
        self.pending.drain(..=end);
        Some(frame)
    }

    /// Flush the trailing unterminated frame when the stream closes.
    ///
    /// A backend that omits the final newline still gets its last frame
    /// delivered. Returns `None` when nothing is pending.
    pub fn finish(self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        Some(String::from_utf8_lossy(&self.pending).into_owned())
    }
}
