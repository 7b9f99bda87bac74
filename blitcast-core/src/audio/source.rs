//! Audio sources feeding the codec.
//!
//! The pipeline never lets the decoder's PCM pipe talk to the codec
//! directly: a [`PcmAccumulator`] reads the pipe and pushes sample chunks
//! into a bounded queue, and the codec pulls them out through a
//! [`ChannelAudioSource`]. The queue bound is what applies backpressure to
//! the decoder when the encoder falls behind.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::BlitError;

/// Bytes read from the PCM pipe per accumulator step.
const READ_CHUNK: usize = 4096;

// ── AudioSource ──────────────────────────────────────────────────

/// A pull-based stream of signed 8-bit mono samples.
#[async_trait]
pub trait AudioSource: Send {
    /// Sample rate of the stream in Hz.
    fn sample_rate(&self) -> u32;

    /// Fill up to `buf.len()` samples. `Ok(0)` marks the end of the stream.
    async fn read(&mut self, buf: &mut [i8]) -> std::io::Result<usize>;
}

// ── PcmReader ────────────────────────────────────────────────────

/// Reads raw signed 8-bit PCM straight from an async reader.
pub struct PcmReader<R> {
    reader: R,
    sample_rate: u32,
    scratch: Vec<u8>,
}

impl<R> PcmReader<R>
where
    R: AsyncRead + Unpin + Send,
{
    pub fn new(reader: R, sample_rate: u32) -> Self {
        Self {
            reader,
            sample_rate,
            scratch: Vec::new(),
        }
    }
}

#[async_trait]
impl<R> AudioSource for PcmReader<R>
where
    R: AsyncRead + Unpin + Send,
{
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    async fn read(&mut self, buf: &mut [i8]) -> std::io::Result<usize> {
        self.scratch.resize(buf.len(), 0);
        let n = self.reader.read(&mut self.scratch).await?;
        for (dst, &src) in buf.iter_mut().zip(&self.scratch[..n]) {
            *dst = src as i8;
        }
        Ok(n)
    }
}

// ── ChannelAudioSource ───────────────────────────────────────────

/// Consumer half of the bounded sample queue.
///
/// The stream ends once every sender is dropped and the queue is drained.
pub struct ChannelAudioSource {
    rx: mpsc::Receiver<Vec<i8>>,
    sample_rate: u32,
    pending: Vec<i8>,
    offset: usize,
}

/// Create a bounded sample queue holding at most `capacity` chunks.
pub fn sample_queue(
    sample_rate: u32,
    capacity: usize,
) -> (mpsc::Sender<Vec<i8>>, ChannelAudioSource) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let source = ChannelAudioSource {
        rx,
        sample_rate,
        pending: Vec::new(),
        offset: 0,
    };
    (tx, source)
}

#[async_trait]
impl AudioSource for ChannelAudioSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    async fn read(&mut self, buf: &mut [i8]) -> std::io::Result<usize> {
        while self.offset >= self.pending.len() {
            match self.rx.recv().await {
                Some(chunk) => {
                    self.pending = chunk;
                    self.offset = 0;
                }
                None => return Ok(0),
            }
        }

        let available = &self.pending[self.offset..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.offset += n;
        Ok(n)
    }
}

// ── PcmAccumulator ───────────────────────────────────────────────

/// Producer stage: reads the decoder's PCM pipe into the sample queue.
pub struct PcmAccumulator<R> {
    reader: R,
    tx: mpsc::Sender<Vec<i8>>,
}

impl<R> PcmAccumulator<R>
where
    R: AsyncRead + Unpin + Send,
{
    pub fn new(reader: R, tx: mpsc::Sender<Vec<i8>>) -> Self {
        Self { reader, tx }
    }

    /// Pump until the pipe reaches end-of-stream. Returns the number of
    /// samples forwarded.
    ///
    /// End-of-stream is success. A consumer that stops listening also ends
    /// the pump quietly; the consumer's own result decides the outcome.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<u64, BlitError> {
        let mut buf = vec![0u8; READ_CHUNK];
        let mut total = 0u64;

        loop {
            let n = tokio::select! {
                _ = cancel.cancelled() => return Err(BlitError::Cancelled),
                r = self.reader.read(&mut buf) => r.map_err(|e| {
                    BlitError::UpstreamDecode(format!("audio pipe: {e}"))
                })?,
            };
            if n == 0 {
                tracing::debug!(samples = total, "pcm pipe closed");
                return Ok(total);
            }

            let chunk: Vec<i8> = buf[..n].iter().map(|&b| b as i8).collect();
            total += n as u64;

            let sent = tokio::select! {
                _ = cancel.cancelled() => return Err(BlitError::Cancelled),
                r = self.tx.send(chunk) => r,
            };
            if sent.is_err() {
                tracing::debug!("audio encoder gone; pcm pump stopping");
                return Ok(total);
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pcm_reader_reinterprets_bytes() {
        let bytes = [0u8, 1, 127, 128, 255];
        let mut src = PcmReader::new(&bytes[..], 48_000);
        let mut buf = [0i8; 8];
        let n = src.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], &[0, 1, 127, -128, -1]);
        assert_eq!(src.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn channel_source_splits_and_joins_chunks() {
        let (tx, mut src) = sample_queue(48_000, 4);
        tx.send(vec![1, 2, 3]).await.unwrap();
        tx.send(vec![4, 5]).await.unwrap();
        drop(tx);

        let mut buf = [0i8; 2];
        let mut out = Vec::new();
        loop {
            let n = src.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn accumulator_forwards_until_eof() {
        let pcm: Vec<u8> = (0..10_000u32).map(|i| i as u8).collect();
        let (tx, mut src) = sample_queue(48_000, 2);

        let pump = PcmAccumulator::new(&pcm[..], tx);
        let handle = tokio::spawn(async move {
            let mut all = Vec::new();
            let mut buf = [0i8; 333];
            loop {
                let n = src.read(&mut buf).await.unwrap();
                if n == 0 {
                    break all;
                }
                all.extend_from_slice(&buf[..n]);
            }
        });

        let total = pump.run(CancellationToken::new()).await.unwrap();
        assert_eq!(total, 10_000);

        let all = handle.await.unwrap();
        assert_eq!(all.len(), 10_000);
        assert_eq!(all[300], 300u32 as u8 as i8);
    }

    #[tokio::test]
    async fn accumulator_honours_cancellation() {
        let (_writer, reader) = tokio::io::duplex(64);
        let (tx, _src) = sample_queue(48_000, 1);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = PcmAccumulator::new(reader, tx).run(cancel).await.unwrap_err();
        assert!(err.is_cancellation());
    }
}
