//! Frame worker pool.
//!
//! Workers share one bounded job queue. Each job carries the decoded
//! picture and the single-use slot the output pump is already waiting on;
//! the worker splits, quantizes and reduces the picture on the blocking
//! pool and resolves the slot. Jobs complete in any order.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::error::BlitError;
use crate::video::frame::Frame;
use crate::video::quantize::Quantizer;
use crate::video::reducer::Reducer;
use crate::video::split::Splitter;
use crate::video::types::RgbImage;

/// One decoded picture on its way to the pool.
pub struct Job {
    pub sequence: u64,
    pub image: RgbImage,
    pub slot: oneshot::Sender<Vec<Frame>>,
}

pub type JobQueue = Arc<Mutex<mpsc::Receiver<Job>>>;

/// Per-worker state. The reducer's scratch buffers live here and are
/// reused for every job the worker takes.
pub struct FrameWorker {
    id: usize,
    reducer: Reducer,
    quantizer: Arc<dyn Quantizer>,
    splitter: Option<Arc<dyn Splitter>>,
    speed: u8,
    dither: f32,
}

impl FrameWorker {
    pub fn new(
        id: usize,
        reducer: Reducer,
        quantizer: Arc<dyn Quantizer>,
        splitter: Option<Arc<dyn Splitter>>,
        speed: u8,
        dither: f32,
    ) -> Self {
        Self {
            id,
            reducer,
            quantizer,
            splitter,
            speed,
            dither,
        }
    }

    /// Split, quantize and reduce one picture into the frames of a unit.
    pub fn process(&mut self, image: RgbImage) -> Result<Vec<Frame>, BlitError> {
        let parts = match &self.splitter {
            Some(splitter) => splitter.split(&image),
            None => vec![image],
        };

        let mut frames = Vec::with_capacity(parts.len());
        for part in &parts {
            let (indexed, palette) = self.quantizer.quantize(part, self.speed, self.dither)?;
            frames.push(self.reducer.reduce(&indexed, &palette)?);
        }
        Ok(frames)
    }

    /// Take jobs until the queue closes or the token fires.
    pub async fn run(mut self, jobs: JobQueue, cancel: CancellationToken) -> Result<(), BlitError> {
        let mut handled = 0u64;
        loop {
            let job = tokio::select! {
                _ = cancel.cancelled() => return Err(BlitError::Cancelled),
                job = async { jobs.lock().await.recv().await } => job,
            };
            let Some(Job { sequence, image, slot }) = job else {
                tracing::debug!(worker = self.id, handled, "job queue closed");
                return Ok(());
            };

            let (worker, result) = tokio::task::spawn_blocking(move || {
                let result = self.process(image);
                (self, result)
            })
            .await?;
            self = worker;

            let frames = result.inspect_err(|e| {
                tracing::error!(worker = self.id, sequence, error = %e, "frame failed");
            })?;
            tracing::trace!(worker = self.id, sequence, frames = frames.len(), "frame reduced");
            handled += 1;

            // A dropped slot means the output pump is gone; its own
            // result decides the outcome of the run.
            let _ = slot.send(frames);
        }
    }
}
