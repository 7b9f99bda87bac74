//! # Audio
//!
//! | Module   | Purpose                                              |
//! |----------|------------------------------------------------------|
//! | `dfpwm`  | 1-bit adaptive delta-modulation encoder and decoder  |
//! | `source` | Pull-based sample sources and the bounded PCM queue  |
//!
//! The pipeline talks to the codec through the [`AudioCodec`] strategy so
//! that the output pump only needs the codec's byte rate, never its
//! internals.

pub mod dfpwm;
pub mod source;

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::CodecError;

pub use source::{AudioSource, ChannelAudioSource, PcmAccumulator, PcmReader, sample_queue};

// ── AudioCodec ───────────────────────────────────────────────────

/// Audio compression strategy plugged into the pipeline.
#[async_trait]
pub trait AudioCodec: Send + Sync {
    /// Sample rate the decoder must deliver PCM at.
    fn sample_rate(&self) -> u32;

    /// Compressed bytes produced per second of audio.
    fn bytes_per_second(&self) -> u32;

    /// Drain `source` completely into `sink`, then shut the sink down so
    /// its reader observes end-of-stream. The sink is shut down on the
    /// error path too.
    async fn encode(
        &self,
        source: &mut dyn AudioSource,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<(), CodecError>;
}

// ── DfpwmCodec ───────────────────────────────────────────────────

/// The 48 kHz, one-bit-per-sample codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct DfpwmCodec;

#[async_trait]
impl AudioCodec for DfpwmCodec {
    fn sample_rate(&self) -> u32 {
        dfpwm::SAMPLE_RATE
    }

    fn bytes_per_second(&self) -> u32 {
        dfpwm::BYTES_PER_SECOND
    }

    async fn encode(
        &self,
        source: &mut dyn AudioSource,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<(), CodecError> {
        let result = dfpwm::encode_stream(source, sink).await;
        let closed = sink.shutdown().await;
        match result {
            Ok(bytes) => {
                tracing::debug!(bytes, "dfpwm stream complete");
                closed.map_err(CodecError::from)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn codec_closes_sink_on_completion() {
        let pcm = vec![0u8; 4096];
        let mut source = PcmReader::new(&pcm[..], 48_000);
        let (mut writer, mut reader) = tokio::io::duplex(8192);

        DfpwmCodec.encode(&mut source, &mut writer).await.unwrap();

        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out.len(), 512);
    }

    #[test]
    fn codec_rates() {
        assert_eq!(DfpwmCodec.sample_rate(), 48_000);
        assert_eq!(DfpwmCodec.bytes_per_second(), 6_000);
    }
}
