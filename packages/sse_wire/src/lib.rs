//! # SSE Wire
//!
//! Reassembles a chunked, line-delimited inference stream into complete
//! frames and classifies each frame as an incremental text delta, a
//! terminal sentinel, or noise to skip.
//!
//! The backend transport chunks its output with no regard for message
//! boundaries: a single read may carry half a line, several whole lines,
//! or a multibyte character split down the middle. [`FrameReassembler`]
//! absorbs raw chunks and hands back only complete newline-terminated
//! frames; [`parse_frame`] turns one complete frame into a [`FrameEvent`].
//! Decoding only ever runs on complete frames, so a decode failure means
//! the frame is genuinely malformed rather than truncated.
//!
//! ## Quick Start
//!
//! ```rust
//! use sse_wire::{FrameEvent, FrameReassembler, parse_frame};
//!
//! let mut frames = FrameReassembler::new();
//! frames.push(b"data: {\"response\":\"Hel").unwrap();
//! assert!(frames.next_frame().is_none()); // not yet delimited
//!
//! frames.push(b"lo\"}\ndata: [DONE]\n").unwrap();
//! assert_eq!(
//!     parse_frame(&frames.next_frame().unwrap()),
//!     FrameEvent::Delta("Hello".to_string()),
//! );
//! assert_eq!(parse_frame(&frames.next_frame().unwrap()), FrameEvent::Done);
//! assert!(frames.next_frame().is_none());
//! ```

mod frame;
mod reassembler;

pub use frame::{FrameEvent, parse_frame};
pub use reassembler::{FrameReassembler, MAX_PENDING_BYTES};

/// Errors surfaced by the wire layer.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The pending buffer grew past [`MAX_PENDING_BYTES`] without a
    /// newline. The stream is not speaking a line-delimited protocol.
    #[error("frame exceeds {limit} bytes without a newline")]
    FrameTooLong { limit: usize },
}

/// Result type for wire operations.
pub type Result<T> = std::result::Result<T, WireError>;
