//! # blitcast-core
//!
//! Media encoding pipeline for low-bandwidth character-cell displays.
//!
//! This crate contains:
//! - **Video**: `Rgb` / `RgbImage` types, the `Quantizer` and `Splitter`
//!   collaborators, the 2×3 block `Reducer`, the `Frame` wire format and
//!   single-picture encoding with PNG previews
//! - **Audio**: the DFPWM one-bit codec (`Encoder`, `Decoder`, streaming
//!   encode/decode) and the `AudioCodec` strategy
//! - **Unit**: `OutputUnit`, one display tick of frames plus audio
//! - **Codec**: `UnitCodec` for framed output via `tokio_util`
//! - **Pipeline**: `Pipeline` binding an external decoder, a worker pool
//!   and the ordered output pump, with cancellation throughout
//! - **Task**: `StageSet` for structured fan-in of pipeline stages
//! - **Error**: `BlitError`, `ReductionError`, `CodecError`

pub mod audio;
pub mod codec;
pub mod error;
pub mod pipeline;
pub mod task;
pub mod unit;
pub mod video;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use audio::{AudioCodec, AudioSource, DfpwmCodec};
pub use codec::{UnitCodec, write_units};
pub use error::{BlitError, CodecError, ReductionError};
pub use pipeline::{
    DecodeProcess, DecodeRequest, DecodeSession, EncoderOptions, FfmpegDecoder, MediaDecoder,
    Pipeline,
};
pub use task::StageSet;
pub use tokio_util::sync::CancellationToken;
pub use unit::OutputUnit;
pub use video::{
    Frame, ImageQuantizer, IndexedImage, Palette, Quantizer, ReductionStrategy, Reducer,
    Region, RegionSplitter, Rgb, RgbImage, Splitter, StillEncoder,
};
