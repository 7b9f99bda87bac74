//! Pipeline configuration and its validation.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::audio::{AudioCodec, DfpwmCodec};
use crate::error::BlitError;
use crate::video::reducer::{DEFAULT_FAST_THRESHOLD, ReductionStrategy};
use crate::video::split::Splitter;

/// Everything one pipeline run needs to know.
///
/// `width`, `height` and `cancel` have no sensible default and must be
/// set by the caller; [`validate`](Self::validate) rejects the options
/// otherwise.
#[derive(Clone)]
pub struct EncoderOptions {
    /// Decoded picture width in pixels (2 pixels per cell).
    pub width: Option<u32>,
    /// Decoded picture height in pixels (3 pixels per cell).
    pub height: Option<u32>,
    pub workers: usize,
    /// Quantizer speed, `1..=10`.
    pub speed: u8,
    /// Quantizer dither level, `0.0..=1.0`.
    pub dither: f32,
    pub splitter: Option<Arc<dyn Splitter>>,
    /// Attach audio to every B-th unit. `0` behaves like `1`.
    pub batch_frames: u32,
    pub frame_rate: u32,
    /// Ask the decoder to pace output at playback speed.
    pub realtime: bool,
    pub audio_codec: Arc<dyn AudioCodec>,
    pub strategy: ReductionStrategy,
    pub fast_threshold: u32,
    /// Forward decoder diagnostics to the log.
    pub debug: bool,
    /// Log throughput while running.
    pub verbose: bool,
    pub cancel: Option<CancellationToken>,
}

impl Default for EncoderOptions {
    fn default() -> Self {
        Self {
            width: None,
            height: None,
            workers: default_workers(),
            speed: 10,
            dither: 0.2,
            splitter: None,
            batch_frames: 0,
            frame_rate: 10,
            realtime: false,
            audio_codec: Arc::new(DfpwmCodec),
            strategy: ReductionStrategy::default(),
            fast_threshold: DEFAULT_FAST_THRESHOLD,
            debug: false,
            verbose: false,
            cancel: None,
        }
    }
}

impl fmt::Debug for EncoderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncoderOptions")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("workers", &self.workers)
            .field("speed", &self.speed)
            .field("dither", &self.dither)
            .field("splitter", &self.splitter.is_some())
            .field("batch_frames", &self.batch_frames)
            .field("frame_rate", &self.frame_rate)
            .field("realtime", &self.realtime)
            .field("strategy", &self.strategy)
            .field("fast_threshold", &self.fast_threshold)
            .field("debug", &self.debug)
            .field("verbose", &self.verbose)
            .finish_non_exhaustive()
    }
}

/// Number of workers when the caller does not choose: one per core.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

// ── Settings ─────────────────────────────────────────────────────

/// Validated, fully resolved options for one run.
#[derive(Clone)]
pub(crate) struct Settings {
    pub width: u32,
    pub height: u32,
    pub workers: usize,
    pub speed: u8,
    pub dither: f32,
    pub splitter: Option<Arc<dyn Splitter>>,
    pub batch: u64,
    pub audio_per_batch: usize,
    pub frame_rate: u32,
    pub realtime: bool,
    pub audio_codec: Arc<dyn AudioCodec>,
    pub strategy: ReductionStrategy,
    pub fast_threshold: u32,
    pub debug: bool,
    pub verbose: bool,
    pub cancel: CancellationToken,
}

impl EncoderOptions {
    /// Check every setting before anything is allocated or spawned.
    pub fn validate(&self) -> Result<(), BlitError> {
        self.resolve().map(|_| ())
    }

    pub(crate) fn resolve(&self) -> Result<Settings, BlitError> {
        let width = match self.width {
            Some(w) if w > 0 => w,
            _ => return Err(config("width must be specified")),
        };
        let height = match self.height {
            Some(h) if h > 0 => h,
            _ => return Err(config("height must be specified")),
        };
        let Some(cancel) = self.cancel.clone() else {
            return Err(config("a cancellation token must be supplied"));
        };
        if self.workers == 0 {
            return Err(config("at least one worker is required"));
        }
        if self.frame_rate == 0 {
            return Err(config("frame rate must be positive"));
        }
        if !(1..=10).contains(&self.speed) {
            return Err(config(format!("speed {} outside 1..=10", self.speed)));
        }
        if !(0.0..=1.0).contains(&self.dither) {
            return Err(config(format!("dither {} outside 0.0..=1.0", self.dither)));
        }

        let batch = u64::from(self.batch_frames.max(1));
        let per_batch = batch * u64::from(self.audio_codec.bytes_per_second());
        if per_batch % u64::from(self.frame_rate) != 0 {
            return Err(config(format!(
                "{} frames of audio at {} B/s do not divide evenly by {} fps",
                batch,
                self.audio_codec.bytes_per_second(),
                self.frame_rate
            )));
        }

        Ok(Settings {
            width,
            height,
            workers: self.workers,
            speed: self.speed,
            dither: self.dither,
            splitter: self.splitter.clone(),
            batch,
            audio_per_batch: (per_batch / u64::from(self.frame_rate)) as usize,
            frame_rate: self.frame_rate,
            realtime: self.realtime,
            audio_codec: Arc::clone(&self.audio_codec),
            strategy: self.strategy,
            fast_threshold: self.fast_threshold,
            debug: self.debug,
            verbose: self.verbose,
            cancel,
        })
    }
}

fn config(msg: impl Into<String>) -> BlitError {
    BlitError::Configuration(msg.into())
}
