//! # Pipeline
//!
//! ```text
//!                 ┌──────── frames ───────► decode pump ──► jobs ──► workers ×N
//!  MediaDecoder ──┤                              │                      │
//!                 │                            slots (in order)        resolve
//!                 │                              ▼                      │
//!                 └── pcm ─► accumulator ─► codec ─► byte pipe ─► output pump ──► sink
//! ```
//!
//! | Module    | Purpose                                               |
//! |-----------|-------------------------------------------------------|
//! | `options` | `EncoderOptions` and validation                       |
//! | `decode`  | `MediaDecoder` / `DecodeProcess`, ffmpeg, frame reads |
//! | `workers` | Frame worker pool                                     |
//! | `output`  | Ordered output pump with audio batching               |
//! | `meter`   | Rolling throughput meter for verbose runs             |
//!
//! Every stage runs in one [`StageSet`] under a child of the caller's
//! token. The first failure cancels the rest, the supervisor kills the
//! decoder, and [`Pipeline::run`] returns once every stage has unwound.

pub mod decode;
pub mod meter;
pub mod options;
pub mod output;
pub mod workers;

use std::sync::Arc;

use tokio::io::AsyncRead;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::audio::{AudioCodec, ChannelAudioSource, PcmAccumulator, sample_queue};
use crate::error::BlitError;
use crate::task::{StageResult, StageSet};
use crate::unit::OutputUnit;
use crate::video::quantize::{ImageQuantizer, Quantizer};
use crate::video::reducer::Reducer;

pub use decode::{
    DecodeProcess, DecodeRequest, DecodeSession, FfmpegDecoder, FrameReader, MediaDecoder,
};
pub use meter::{Throughput, ThroughputMeter};
pub use options::{EncoderOptions, default_workers};
pub use output::{OutputPump, PumpStats, Slot};
pub use workers::{FrameWorker, Job};

/// PCM chunks buffered between the accumulator and the codec.
const SAMPLE_QUEUE_CHUNKS: usize = 32;

/// Seconds of encoded audio the codec may run ahead of the output pump.
const AUDIO_PIPE_SECONDS: usize = 4;

// ── Pipeline ─────────────────────────────────────────────────────

/// An encoding pipeline with its collaborators.
///
/// A `Pipeline` holds no per-run state; [`run`](Self::run) may be called
/// any number of times.
pub struct Pipeline {
    options: EncoderOptions,
    decoder: Arc<dyn MediaDecoder>,
    quantizer: Arc<dyn Quantizer>,
}

impl Pipeline {
    /// A pipeline decoding with `ffmpeg` and quantizing with libimagequant.
    pub fn new(options: EncoderOptions) -> Self {
        Self {
            options,
            decoder: Arc::new(FfmpegDecoder::default()),
            quantizer: Arc::new(ImageQuantizer),
        }
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn MediaDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn with_quantizer(mut self, quantizer: Arc<dyn Quantizer>) -> Self {
        self.quantizer = quantizer;
        self
    }

    pub fn options(&self) -> &EncoderOptions {
        &self.options
    }

    /// Encode `source` into `sink` until the media ends, a stage fails or
    /// the caller's token fires.
    ///
    /// The sink is dropped before this returns on every path.
    pub async fn run(&self, source: &str, sink: mpsc::Sender<OutputUnit>) -> Result<(), BlitError> {
        let settings = self.options.resolve()?;
        let caller = settings.cancel.clone();
        let cancel = caller.child_token();

        let request = DecodeRequest {
            source: source.to_owned(),
            width: settings.width,
            height: settings.height,
            frame_rate: settings.frame_rate,
            sample_rate: settings.audio_codec.sample_rate(),
            realtime: settings.realtime,
            debug: settings.debug,
        };
        let DecodeSession {
            frames,
            audio,
            sample_rate,
            process,
        } = self.decoder.spawn(&request)?;

        tracing::info!(
            source,
            width = settings.width,
            height = settings.height,
            fps = settings.frame_rate,
            workers = settings.workers,
            batch = settings.batch,
            strategy = ?settings.strategy,
            "pipeline started"
        );

        let depth = settings.workers.max(settings.batch as usize) * 2;
        let (job_tx, job_rx) = mpsc::channel(depth);
        let (slot_tx, slot_rx) = mpsc::channel(depth);
        let (sample_tx, samples) = sample_queue(sample_rate, SAMPLE_QUEUE_CHUNKS);
        let pipe_capacity = (settings.audio_codec.bytes_per_second() as usize * AUDIO_PIPE_SECONDS)
            .max(settings.audio_per_batch * 2)
            .max(1);
        let (codec_out, codec_in) = tokio::io::duplex(pipe_capacity);

        let mut stages = StageSet::new(cancel.clone());

        stages.spawn("supervisor", supervise(process, cancel.clone()));

        stages.spawn(
            "decode",
            decode_pump(
                FrameReader::new(frames, settings.width, settings.height),
                slot_tx,
                job_tx,
                cancel.clone(),
            ),
        );

        let jobs = Arc::new(Mutex::new(job_rx));
        for id in 0..settings.workers {
            let worker = FrameWorker::new(
                id,
                Reducer::new(settings.strategy).with_threshold(settings.fast_threshold),
                Arc::clone(&self.quantizer),
                settings.splitter.clone(),
                settings.speed,
                settings.dither,
            );
            stages.spawn("worker", worker.run(Arc::clone(&jobs), cancel.clone()));
        }

        let token = cancel.clone();
        stages.spawn("pcm", async move {
            PcmAccumulator::new(audio, sample_tx).run(token).await.map(|_| ())
        });

        stages.spawn(
            "audio-encoder",
            encode_audio(Arc::clone(&settings.audio_codec), samples, codec_out, cancel.clone()),
        );

        let mut pump = OutputPump::new(slot_rx, codec_in, sink, settings.batch, settings.audio_per_batch);
        if settings.verbose {
            pump = pump.with_meter(ThroughputMeter::new());
        }
        let token = cancel.clone();
        stages.spawn("output", async move { pump.run(token).await.map(|_| ()) });

        let result = stages.join().await;
        match result {
            Err(_) if caller.is_cancelled() => {
                tracing::info!("pipeline cancelled");
                Err(BlitError::Cancelled)
            }
            Err(e) => {
                tracing::error!(error = %e, "pipeline failed");
                Err(e)
            }
            Ok(()) => {
                tracing::info!("pipeline finished");
                Ok(())
            }
        }
    }
}

// ── Stages ───────────────────────────────────────────────────────

/// Owns the decode process: waits for its exit, kills it on cancellation.
async fn supervise(mut process: Box<dyn DecodeProcess>, cancel: CancellationToken) -> StageResult {
    tokio::select! {
        status = process.wait() => status,
        _ = cancel.cancelled() => {
            process.kill().await?;
            Err(BlitError::Cancelled)
        }
    }
}

/// Reads pictures, reserving each one's output slot before dispatching it.
async fn decode_pump<R>(
    mut frames: FrameReader<R>,
    slots: mpsc::Sender<(u64, Slot)>,
    jobs: mpsc::Sender<Job>,
    cancel: CancellationToken,
) -> StageResult
where
    R: AsyncRead + Unpin,
{
    let mut sequence = 0u64;
    loop {
        let image = tokio::select! {
            _ = cancel.cancelled() => return Err(BlitError::Cancelled),
            image = frames.next_frame() => image?,
        };
        let Some(image) = image else {
            tracing::debug!(frames = sequence, "frame stream ended");
            return Ok(());
        };

        let (slot, slot_rx) = oneshot::channel();
        let queued = tokio::select! {
            _ = cancel.cancelled() => return Err(BlitError::Cancelled),
            queued = slots.send((sequence, slot_rx)) => queued,
        };
        if queued.is_err() {
            tracing::debug!("output pump gone; decode pump stopping");
            return Ok(());
        }

        let dispatched = tokio::select! {
            _ = cancel.cancelled() => return Err(BlitError::Cancelled),
            dispatched = jobs.send(Job { sequence, image, slot }) => dispatched,
        };
        if dispatched.is_err() {
            tracing::debug!("worker pool gone; decode pump stopping");
            return Ok(());
        }
        sequence += 1;
    }
}

async fn encode_audio(
    codec: Arc<dyn AudioCodec>,
    mut samples: ChannelAudioSource,
    mut sink: tokio::io::DuplexStream,
    cancel: CancellationToken,
) -> StageResult {
    tokio::select! {
        _ = cancel.cancelled() => Err(BlitError::Cancelled),
        encoded = codec.encode(&mut samples, &mut sink) => encoded.map_err(BlitError::from),
    }
}
