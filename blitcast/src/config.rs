//! Configuration for the blitcast encoder.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use blitcast_core::pipeline::{EncoderOptions, FfmpegDecoder, default_workers};
use blitcast_core::video::DEFAULT_FAST_THRESHOLD;
use blitcast_core::{CancellationToken, DfpwmCodec, ReductionStrategy, Region, RegionSplitter};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BlitConfig {
    /// Picture settings.
    pub video: VideoConfig,
    /// Audio settings.
    pub audio: AudioConfig,
    /// External decoder settings.
    pub decoder: DecoderConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Picture configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Decoded width in pixels (2 per cell).
    pub width: u32,
    /// Decoded height in pixels (3 per cell).
    pub height: u32,
    /// Frames per second requested from the decoder.
    pub frame_rate: u32,
    /// Frame workers. 0 = one per core.
    pub workers: usize,
    /// Quantizer speed, 1 (best) to 10 (fastest).
    pub speed: u8,
    /// Dither level, 0.0 to 1.0.
    pub dither: f64,
    /// Block reduction: "fast" or "quality".
    pub strategy: ReductionStrategy,
    /// Background tolerance of the fast strategy.
    pub fast_threshold: u32,
    /// Panels of a display array, cropped in order. Empty = whole picture.
    pub regions: Vec<Region>,
}

/// Audio configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Attach audio to every N-th unit. 0 or 1 = every unit.
    pub batch_frames: u32,
    /// Decode the source's audio track.
    pub enabled: bool,
}

/// External decoder configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Path to the ffmpeg executable.
    pub ffmpeg: PathBuf,
    /// Decode at playback speed instead of as fast as possible.
    pub realtime: bool,
    /// Forward ffmpeg diagnostics to the log.
    pub debug: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Log throughput once per second.
    pub verbose: bool,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            width: 164,
            height: 81,
            frame_rate: 10,
            workers: 0,
            speed: 10,
            dither: 0.2,
            strategy: ReductionStrategy::Fast,
            fast_threshold: DEFAULT_FAST_THRESHOLD,
            regions: Vec::new(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            batch_frames: 0,
            enabled: true,
        }
    }
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            realtime: false,
            debug: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            verbose: false,
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

/// Why [`BlitConfig::load`] fell back to defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadIssue {
    Missing(PathBuf),
    Invalid { path: PathBuf, reason: String },
}

impl LoadIssue {
    /// Log the fallback. Call once tracing is initialised.
    pub fn report(&self) {
        match self {
            Self::Missing(path) => {
                tracing::info!("no config at {}; using defaults", path.display());
            }
            Self::Invalid { path, reason } => {
                tracing::warn!("invalid config {}: {reason}; using defaults", path.display());
            }
        }
    }
}

impl BlitConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    ///
    /// Logging is not up yet when this runs, so any problem is handed
    /// back for [`LoadIssue::report`] instead of being logged here.
    pub fn load(path: &Path) -> (Self, Option<LoadIssue>) {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => (config, None),
                Err(e) => (
                    Self::default(),
                    Some(LoadIssue::Invalid {
                        path: path.to_path_buf(),
                        reason: e.to_string(),
                    }),
                ),
            },
            Err(_) => (Self::default(), Some(LoadIssue::Missing(path.to_path_buf()))),
        }
    }

    /// Convert into pipeline options bound to `cancel`.
    pub fn to_encoder_options(&self, cancel: CancellationToken) -> EncoderOptions {
        let video = &self.video;
        EncoderOptions {
            width: Some(video.width),
            height: Some(video.height),
            workers: if video.workers == 0 {
                default_workers()
            } else {
                video.workers
            },
            speed: video.speed,
            dither: video.dither as f32,
            splitter: if video.regions.is_empty() {
                None
            } else {
                Some(Arc::new(RegionSplitter::new(video.regions.clone())))
            },
            batch_frames: self.audio.batch_frames,
            frame_rate: video.frame_rate,
            realtime: self.decoder.realtime,
            audio_codec: Arc::new(DfpwmCodec),
            strategy: video.strategy,
            fast_threshold: video.fast_threshold,
            debug: self.decoder.debug,
            verbose: self.logging.verbose,
            cancel: Some(cancel),
        }
    }

    /// Build the ffmpeg decoder these settings describe.
    pub fn to_decoder(&self) -> FfmpegDecoder {
        let decoder = FfmpegDecoder::new(&self.decoder.ffmpeg);
        if self.audio.enabled {
            decoder
        } else {
            decoder.without_audio()
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
