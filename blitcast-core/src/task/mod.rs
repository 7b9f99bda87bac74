//! Structured fan-in for pipeline stages.
//!
//! Every concurrent stage of a pipeline run is spawned into one
//! [`StageSet`]. The set shares a [`CancellationToken`] with its stages:
//! the first stage to fail fires the token so its peers unwind, and
//! [`join`](StageSet::join) waits for all of them before reporting the
//! first real failure. Dropping the set aborts whatever is still running.

use std::future::Future;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::BlitError;

pub type StageResult = Result<(), BlitError>;

pub struct StageSet {
    stages: JoinSet<(&'static str, StageResult)>,
    cancel: CancellationToken,
}

impl StageSet {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            stages: JoinSet::new(),
            cancel,
        }
    }

    /// Token shared by every stage of this set.
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Number of stages still running or not yet joined.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Spawn a stage. An `Err` from the stage cancels all of its peers.
    pub fn spawn<F>(&mut self, name: &'static str, stage: F)
    where
        F: Future<Output = StageResult> + Send + 'static,
    {
        let cancel = self.cancel.clone();
        self.stages.spawn(async move {
            tracing::debug!(stage = name, "stage started");
            let result = stage.await;
            match &result {
                Ok(()) => tracing::debug!(stage = name, "stage finished"),
                Err(e) if e.is_cancellation() => {
                    tracing::debug!(stage = name, "stage cancelled");
                    cancel.cancel();
                }
                Err(e) => {
                    tracing::warn!(stage = name, error = %e, "stage failed");
                    cancel.cancel();
                }
            }
            (name, result)
        });
    }

    /// Wait for every stage. Returns the first failure that is not a
    /// cancellation, else `Cancelled` if any stage was cancelled, else
    /// `Ok(())`.
    pub async fn join(mut self) -> StageResult {
        let mut first: Option<BlitError> = None;

        while let Some(joined) = self.stages.join_next().await {
            let result = match joined {
                Ok((_, result)) => result,
                Err(e) => {
                    self.cancel.cancel();
                    Err(BlitError::Stage(e))
                }
            };

            if let Err(e) = result {
                let replace = match &first {
                    None => true,
                    Some(prev) => prev.is_cancellation() && !e.is_cancellation(),
                };
                if replace {
                    first = Some(e);
                }
            }
        }

        match first {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn all_ok_joins_ok() {
        let mut set = StageSet::new(CancellationToken::new());
        for _ in 0..4 {
            set.spawn("noop", async { Ok(()) });
        }
        assert_eq!(set.len(), 4);
        assert!(set.join().await.is_ok());
    }

    #[tokio::test]
    async fn first_failure_cancels_peers_and_wins() {
        let cancel = CancellationToken::new();
        let mut set = StageSet::new(cancel.clone());

        let token = set.token();
        set.spawn("waiter", async move {
            token.cancelled().await;
            Err(BlitError::Cancelled)
        });
        set.spawn("failer", async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Err(BlitError::UpstreamDecode("boom".into()))
        });

        let err = tokio::time::timeout(Duration::from_secs(5), set.join())
            .await
            .expect("join hung")
            .unwrap_err();
        assert!(matches!(err, BlitError::UpstreamDecode(_)));
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn external_cancel_reports_cancelled() {
        let cancel = CancellationToken::new();
        let mut set = StageSet::new(cancel.clone());
        let token = set.token();
        set.spawn("waiter", async move {
            token.cancelled().await;
            Err(BlitError::Cancelled)
        });
        cancel.cancel();
        assert!(set.join().await.unwrap_err().is_cancellation());
    }

    #[tokio::test]
    async fn panicking_stage_is_reported() {
        let mut set = StageSet::new(CancellationToken::new());
        set.spawn("panics", async { panic!("stage blew up") });
        assert!(matches!(set.join().await, Err(BlitError::Stage(_))));
    }
}
