//! Ordered output pump.
//!
//! The decode pump queues one slot per picture before the picture reaches
//! the pool, so awaiting slots front to back yields units in capture order
//! no matter which worker finishes first.
//!
//! ## Audio pairing
//!
//! ```text
//! unit:   0    1    2    3    4    5   (video ends)  6    7    8
//! B = 3:  -    -    A    -    -    A                 -    -    A
//! ```
//!
//! Every B-th unit carries `B × bytes_per_second / frame_rate` codec bytes.
//! Audio left over after the last picture goes out in frameless units,
//! padded with empty units up to each batch boundary.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::error::BlitError;
use crate::pipeline::meter::ThroughputMeter;
use crate::unit::OutputUnit;
use crate::video::frame::Frame;

/// Ordered placeholder for one unit's frames.
pub type Slot = oneshot::Receiver<Vec<Frame>>;

pub struct OutputPump<A> {
    slots: mpsc::Receiver<(u64, Slot)>,
    audio: A,
    audio_done: bool,
    sink: mpsc::Sender<OutputUnit>,
    batch: u64,
    audio_per_batch: usize,
    meter: Option<ThroughputMeter>,
}

/// Totals reported when the pump finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpStats {
    pub units: u64,
    pub video_units: u64,
    pub audio_bytes: u64,
}

impl<A> OutputPump<A>
where
    A: AsyncRead + Unpin + Send,
{
    pub fn new(
        slots: mpsc::Receiver<(u64, Slot)>,
        audio: A,
        sink: mpsc::Sender<OutputUnit>,
        batch: u64,
        audio_per_batch: usize,
    ) -> Self {
        Self {
            slots,
            audio,
            audio_done: false,
            sink,
            batch: batch.max(1),
            audio_per_batch,
            meter: None,
        }
    }

    /// Log throughput once per second while running.
    pub fn with_meter(mut self, meter: ThroughputMeter) -> Self {
        self.meter = Some(meter);
        self
    }

    pub async fn run(mut self, cancel: CancellationToken) -> Result<PumpStats, BlitError> {
        let mut stats = PumpStats::default();

        // ── Video units, in capture order ──
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Err(BlitError::Cancelled),
                next = self.slots.recv() => next,
            };
            let Some((sequence, slot)) = next else { break };

            let frames = tokio::select! {
                _ = cancel.cancelled() => return Err(BlitError::Cancelled),
                // A worker only drops a slot when it failed; its error is
                // the one the run reports.
                frames = slot => frames.map_err(|_| BlitError::Cancelled)?,
            };

            let audio = if (stats.units + 1) % self.batch == 0 {
                self.read_audio(&cancel).await?
            } else {
                Bytes::new()
            };

            stats.video_units += 1;
            self.emit(OutputUnit { sequence, frames, audio }, &mut stats, &cancel)
                .await?;
        }

        // ── Trailing audio ──
        loop {
            let audio = self.read_audio(&cancel).await?;
            if audio.is_empty() {
                break;
            }
            while (stats.units + 1) % self.batch != 0 {
                let filler = OutputUnit {
                    sequence: stats.units,
                    ..Default::default()
                };
                self.emit(filler, &mut stats, &cancel).await?;
            }
            let unit = OutputUnit {
                sequence: stats.units,
                frames: Vec::new(),
                audio,
            };
            self.emit(unit, &mut stats, &cancel).await?;
        }

        if stats.units == 0 {
            return Err(BlitError::UpstreamDecode(
                "decoder produced no frames and no audio".into(),
            ));
        }

        tracing::info!(
            units = stats.units,
            video_units = stats.video_units,
            audio_bytes = stats.audio_bytes,
            "output complete"
        );
        Ok(stats)
    }

    /// Read one batch worth of codec bytes. Short only once the codec
    /// stream has ended.
    async fn read_audio(&mut self, cancel: &CancellationToken) -> Result<Bytes, BlitError> {
        if self.audio_done {
            return Ok(Bytes::new());
        }

        let mut buf = BytesMut::zeroed(self.audio_per_batch);
        let mut filled = 0;
        while filled < buf.len() {
            let n = tokio::select! {
                _ = cancel.cancelled() => return Err(BlitError::Cancelled),
                n = self.audio.read(&mut buf[filled..]) => n?,
            };
            if n == 0 {
                tracing::debug!(short_by = buf.len() - filled, "audio stream ended");
                self.audio_done = true;
                break;
            }
            filled += n;
        }
        buf.truncate(filled);
        Ok(buf.freeze())
    }

    async fn emit(
        &mut self,
        unit: OutputUnit,
        stats: &mut PumpStats,
        cancel: &CancellationToken,
    ) -> Result<(), BlitError> {
        let audio_bytes = unit.audio.len() as u64;
        tracing::trace!(sequence = unit.sequence, frames = unit.frames.len(), audio_bytes, "emit unit");

        tokio::select! {
            _ = cancel.cancelled() => return Err(BlitError::Cancelled),
            sent = self.sink.send(unit) => sent?,
        }

        stats.units += 1;
        stats.audio_bytes += audio_bytes;

        if let Some(meter) = &mut self.meter {
            meter.record(audio_bytes);
            if let Some(t) = meter.poll_report(std::time::Instant::now()) {
                tracing::info!(
                    units_per_sec = t.units_per_sec,
                    audio_bytes_per_sec = t.audio_bytes_per_sec,
                    "throughput"
                );
            }
        }
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::types::{PALETTE_SIZE, Rgb};

    fn frame(tag: u8) -> Frame {
        Frame {
            width: 1,
            height: 1,
            cells: vec![Default::default()],
            palette: [Rgb::new(tag, 0, 0); PALETTE_SIZE],
        }
    }

    async fn collect(mut rx: mpsc::Receiver<OutputUnit>) -> Vec<OutputUnit> {
        let mut out = Vec::new();
        while let Some(unit) = rx.recv().await {
            out.push(unit);
        }
        out
    }

    #[tokio::test]
    async fn emits_in_slot_order_despite_completion_order() {
        let (slot_tx, slot_rx) = mpsc::channel(8);
        let (sink, out) = mpsc::channel(8);
        let pump = OutputPump::new(slot_rx, tokio::io::empty(), sink, 1, 0);
        let handle = tokio::spawn(pump.run(CancellationToken::new()));

        let mut senders = Vec::new();
        for seq in 0..3u64 {
            let (tx, rx) = oneshot::channel();
            slot_tx.send((seq, rx)).await.unwrap();
            senders.push(tx);
        }
        drop(slot_tx);
        for (i, tx) in senders.into_iter().enumerate().rev() {
            tx.send(vec![frame(i as u8)]).unwrap();
        }

        let units = collect(out).await;
        let stats = handle.await.unwrap().unwrap();
        assert_eq!(stats.units, 3);
        for (i, unit) in units.iter().enumerate() {
            assert_eq!(unit.sequence, i as u64);
            assert_eq!(unit.frames[0].palette[0].r, i as u8);
        }
    }

    #[tokio::test]
    async fn trailing_audio_pads_to_batch_boundary() {
        // Two pictures, batch of 3, 10 bytes per batch, 25 audio bytes.
        let (slot_tx, slot_rx) = mpsc::channel(8);
        let (sink, out) = mpsc::channel(16);
        let audio = vec![1u8; 25];
        let pump = OutputPump::new(slot_rx, &audio[..], sink, 3, 10);

        for seq in 0..2u64 {
            let (tx, rx) = oneshot::channel();
            tx.send(vec![frame(0)]).unwrap();
            slot_tx.send((seq, rx)).await.unwrap();
        }
        drop(slot_tx);

        let stats = pump.run(CancellationToken::new()).await.unwrap();
        let units = collect(out).await;

        let shape: Vec<(usize, usize)> = units.iter().map(|u| (u.frames.len(), u.audio.len())).collect();
        assert_eq!(
            shape,
            vec![(1, 0), (1, 0), (0, 10), (0, 0), (0, 0), (0, 10), (0, 0), (0, 0), (0, 5)]
        );
        assert_eq!(stats.audio_bytes, 25);
        assert!(units.iter().enumerate().all(|(i, u)| u.sequence == i as u64));
    }

    #[tokio::test]
    async fn nothing_decoded_is_an_error() {
        let (_, slot_rx) = mpsc::channel(1);
        let (sink, _out) = mpsc::channel(1);
        let pump = OutputPump::new(slot_rx, tokio::io::empty(), sink, 1, 600);
        let err = pump.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, BlitError::UpstreamDecode(_)));
    }

    #[tokio::test]
    async fn closed_sink_is_reported() {
        let (slot_tx, slot_rx) = mpsc::channel(1);
        let (sink, out) = mpsc::channel(1);
        drop(out);
        let (tx, rx) = oneshot::channel();
        tx.send(vec![frame(0)]).unwrap();
        slot_tx.send((0, rx)).await.unwrap();

        let pump = OutputPump::new(slot_rx, tokio::io::empty(), sink, 1, 0);
        let err = pump.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, BlitError::SinkClosed));
    }
}
