//! Throughput meter for verbose runs.
//!
//! Records `(timestamp, audio bytes)` per emitted unit over a rolling
//! window and derives units/s and audio bytes/s from it.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

pub struct ThroughputMeter {
    samples: VecDeque<(Instant, u64)>,
    window: Duration,
    audio_bytes: u64,
    last_report: Option<Instant>,
}

/// One reading of the meter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Throughput {
    pub units_per_sec: f64,
    pub audio_bytes_per_sec: f64,
}

impl ThroughputMeter {
    pub fn new() -> Self {
        Self::with_window(Duration::from_secs(1))
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            samples: VecDeque::with_capacity(64),
            window,
            audio_bytes: 0,
            last_report: None,
        }
    }

    pub fn record(&mut self, audio_bytes: u64) {
        self.record_at(Instant::now(), audio_bytes);
    }

    pub fn record_at(&mut self, when: Instant, audio_bytes: u64) {
        self.samples.push_back((when, audio_bytes));
        self.audio_bytes += audio_bytes;
        self.evict(when);
    }

    pub fn estimate(&self) -> Throughput {
        let (Some((first, _)), Some((last, _))) = (self.samples.front(), self.samples.back())
        else {
            return Throughput {
                units_per_sec: 0.0,
                audio_bytes_per_sec: 0.0,
            };
        };
        let elapsed = last.duration_since(*first).max(Duration::from_millis(1));
        let secs = elapsed.as_secs_f64();
        Throughput {
            units_per_sec: self.samples.len() as f64 / secs,
            audio_bytes_per_sec: self.audio_bytes as f64 / secs,
        }
    }

    /// Returns a reading at most once per window.
    pub fn poll_report(&mut self, now: Instant) -> Option<Throughput> {
        match self.last_report {
            Some(at) if now.duration_since(at) < self.window => None,
            _ => {
                self.last_report = Some(now);
                Some(self.estimate())
            }
        }
    }

    fn evict(&mut self, now: Instant) {
        while let Some(&(ts, bytes)) = self.samples.front() {
            if now.duration_since(ts) > self.window {
                self.samples.pop_front();
                self.audio_bytes = self.audio_bytes.saturating_sub(bytes);
            } else {
                break;
            }
        }
    }
}

impl Default for ThroughputMeter {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_meter_reads_zero() {
        let meter = ThroughputMeter::new();
        assert_eq!(meter.estimate().units_per_sec, 0.0);
    }

    #[test]
    fn steady_rate() {
        let mut meter = ThroughputMeter::with_window(Duration::from_secs(2));
        let start = Instant::now();
        for i in 0..=10 {
            meter.record_at(start + Duration::from_millis(i * 100), 600);
        }
        let t = meter.estimate();
        // 11 units and 6600 bytes over one second.
        assert!((t.units_per_sec - 11.0).abs() < 0.01);
        assert!((t.audio_bytes_per_sec - 6600.0).abs() < 1.0);
    }

    #[test]
    fn old_samples_are_evicted() {
        let mut meter = ThroughputMeter::with_window(Duration::from_millis(500));
        let start = Instant::now();
        meter.record_at(start, 1_000_000);
        meter.record_at(start + Duration::from_secs(2), 10);
        meter.record_at(start + Duration::from_millis(2100), 10);
        let t = meter.estimate();
        assert!(t.audio_bytes_per_sec < 1000.0);
    }

    #[test]
    fn reports_once_per_window() {
        let mut meter = ThroughputMeter::with_window(Duration::from_secs(1));
        let start = Instant::now();
        assert!(meter.poll_report(start).is_some());
        assert!(meter.poll_report(start + Duration::from_millis(500)).is_none());
        assert!(meter.poll_report(start + Duration::from_millis(1001)).is_some());
    }
}
