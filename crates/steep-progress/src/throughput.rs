//! Throughput estimation.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Default rolling window span.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(10);

/// Rolling-window throughput estimator.
///
/// Samples older than the window are discarded; rates are computed over the
/// span actually covered by retained samples, so a fresh estimator ramps up
/// instead of reporting inflated rates.
#[derive(Debug)]
pub struct RollingWindow {
    window: Duration,
    samples: VecDeque<(Instant, u64, u64)>,
}

impl RollingWindow {
    /// Creates an estimator with the given window span.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            samples: VecDeque::new(),
        }
    }

    /// Records progress observed now.
    pub fn record(&mut self, bytes: u64, rows: u64) {
        self.record_at(Instant::now(), bytes, rows);
    }

    /// Records progress observed at `at`. Exposed for deterministic tests.
    pub fn record_at(&mut self, at: Instant, bytes: u64, rows: u64) {
        self.samples.push_back((at, bytes, rows));
        self.evict(at);
    }

    fn evict(&mut self, now: Instant) {
        while let Some(&(t, _, _)) = self.samples.front() {
            if now.duration_since(t) > self.window {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    fn rates_at(&self, now: Instant) -> Option<(u64, u64)> {
        let &(oldest, _, _) = self.samples.front()?;
        let span = now.duration_since(oldest).as_secs_f64().max(1.0);
        let bytes: u64 = self.samples.iter().map(|&(_, b, _)| b).sum();
        let rows: u64 = self.samples.iter().map(|&(_, _, r)| r).sum();
        Some(((bytes as f64 / span) as u64, (rows as f64 / span) as u64))
    }

    /// Current bytes-per-second estimate.
    pub fn bytes_per_sec(&self) -> Option<u64> {
        self.rates_at(Instant::now()).map(|(b, _)| b)
    }

    /// Current rows-per-second estimate.
    pub fn rows_per_sec(&self) -> Option<u64> {
        self.rates_at(Instant::now()).map(|(_, r)| r)
    }

    /// Both rates as observed at `now`. Exposed for deterministic tests.
    pub fn rates(&self, now: Instant) -> Option<(u64, u64)> {
        self.rates_at(now)
    }
}

impl Default for RollingWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

/// Exponentially weighted moving average.
///
/// Used to smooth observed bytes-per-second into a stable ETA input; the
/// first sample seeds the average directly.
#[derive(Debug, Clone, Copy)]
pub struct Ewma {
    alpha: f64,
    value: Option<f64>,
}

impl Ewma {
    /// Creates an EWMA with smoothing factor `alpha` in (0, 1].
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: alpha.clamp(f64::EPSILON, 1.0),
            value: None,
        }
    }

    /// Seeds the average, e.g. from a persisted per-node baseline.
    pub fn seed(alpha: f64, baseline: f64) -> Self {
        Self {
            alpha: alpha.clamp(f64::EPSILON, 1.0),
            value: Some(baseline),
        }
    }

    /// Folds in one observation and returns the new average.
    pub fn update(&mut self, sample: f64) -> f64 {
        let next = match self.value {
            Some(v) => self.alpha * sample + (1.0 - self.alpha) * v,
            None => sample,
        };
        self.value = Some(next);
        next
    }

    /// Current average, if any sample has been folded in.
    pub fn value(&self) -> Option<f64> {
        self.value
    }
}

impl Default for Ewma {
    fn default() -> Self {
        Self::new(0.3)
    }
}

/// ETA in whole seconds given remaining work and a current rate.
pub fn eta_seconds(remaining_bytes: u64, bytes_per_sec: u64) -> Option<u64> {
    if bytes_per_sec == 0 {
        return None;
    }
    Some(remaining_bytes.div_ceil(bytes_per_sec))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rolling_window_evicts_old_samples() {
        let start = Instant::now();
        let mut w = RollingWindow::new(Duration::from_secs(10));
        w.record_at(start, 1000, 10);
        w.record_at(start + Duration::from_secs(5), 1000, 10);
        // 15 s later the first sample is outside the window
        w.record_at(start + Duration::from_secs(15), 1000, 10);
        assert_eq!(w.samples.len(), 2);
    }

    #[test]
    fn rolling_window_rates() {
        let start = Instant::now();
        let mut w = RollingWindow::new(Duration::from_secs(10));
        w.record_at(start, 4000, 40);
        w.record_at(start + Duration::from_secs(4), 4000, 40);
        let (bps, rps) = w.rates(start + Duration::from_secs(4)).unwrap();
        assert_eq!(bps, 2000);
        assert_eq!(rps, 20);
    }

    #[test]
    fn rolling_window_empty_has_no_rate() {
        let w = RollingWindow::default();
        assert!(w.bytes_per_sec().is_none());
    }

    #[test]
    fn ewma_first_sample_seeds() {
        let mut e = Ewma::new(0.5);
        assert!(e.value().is_none());
        assert_eq!(e.update(100.0), 100.0);
        assert_eq!(e.update(200.0), 150.0);
    }

    #[test]
    fn ewma_seeded_baseline() {
        let mut e = Ewma::seed(0.5, 1000.0);
        assert_eq!(e.value(), Some(1000.0));
        assert_eq!(e.update(2000.0), 1500.0);
    }

    #[test]
    fn eta_rounds_up() {
        assert_eq!(eta_seconds(1001, 100), Some(11));
        assert_eq!(eta_seconds(0, 100), Some(0));
        assert_eq!(eta_seconds(1000, 0), None);
    }
}
