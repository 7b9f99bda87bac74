//! Domain-specific error types for the blitcast pipeline.
//!
//! All fallible operations return `Result<T, BlitError>`. Reduction and
//! codec failures have their own enums so callers can match on the exact
//! precondition that was violated; both convert into [`BlitError`].

use thiserror::Error;

/// The canonical error type for the encoding pipeline.
#[derive(Debug, Error)]
pub enum BlitError {
    // ── Setup Errors ─────────────────────────────────────────────
    /// A required setting is absent or out of range. Raised before any
    /// process, task or buffer is created.
    #[error("configuration error: {0}")]
    Configuration(String),

    // ── Stage Errors ─────────────────────────────────────────────
    /// The external decoder exited abnormally, or one of its pipes failed
    /// for a reason other than a clean end-of-stream.
    #[error("upstream decode error: {0}")]
    UpstreamDecode(String),

    /// A frame could not be reduced into glyph cells.
    #[error("reduction error: {0}")]
    Reduction(#[from] ReductionError),

    /// The audio codec rejected its input.
    #[error("audio codec error: {0}")]
    AudioCodec(#[from] CodecError),

    /// The quantizer collaborator failed.
    #[error("quantize error: {0}")]
    Quantize(String),

    /// A still picture could not be decoded or its preview written.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    // ── Shutdown ─────────────────────────────────────────────────
    /// The pipeline was cancelled through its token.
    #[error("pipeline was cancelled")]
    Cancelled,

    /// The consumer dropped the output receiver.
    #[error("output sink closed")]
    SinkClosed,

    // ── Plumbing ─────────────────────────────────────────────────
    /// An I/O error outside the decoder pipes.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A stage task panicked or was aborted.
    #[error("stage task failed: {0}")]
    Stage(#[from] tokio::task::JoinError),
}

impl BlitError {
    /// `true` for shutdown conditions, which callers usually treat
    /// differently from real failures.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, BlitError::Cancelled)
    }
}

// ── ReductionError ───────────────────────────────────────────────

/// Rejections raised by the pixel-block reducer. No partial frame is
/// produced when any of these is returned.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReductionError {
    #[error("palette has {0} colors (max 16)")]
    PaletteTooLarge(usize),

    #[error("image width {0} is not a multiple of 2")]
    MisalignedWidth(u32),

    #[error("image height {0} is not a multiple of 3")]
    MisalignedHeight(u32),

    /// A pixel refers to a palette slot that does not exist.
    #[error("pixel index {index} outside palette of {palette_len} colors")]
    IndexOutOfRange { index: u8, palette_len: usize },

    /// The pixel buffer does not hold `width * height` entries.
    #[error("pixel buffer holds {actual} entries, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },

    /// Frame dimensions do not fit the 16-bit wire header.
    #[error("frame of {0} blocks does not fit the wire header")]
    TooLarge(u32),
}

// ── CodecError ───────────────────────────────────────────────────

/// Errors raised by the streaming audio codec.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The audio source does not run at the codec's fixed rate.
    #[error("sample rate must be {expected} Hz, source is {actual} Hz")]
    SampleRateMismatch { expected: u32, actual: u32 },

    #[error("codec i/o error: {0}")]
    Io(#[from] std::io::Error),
}

// ── Convenient From implementations ──────────────────────────────

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for BlitError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        BlitError::SinkClosed
    }
}
