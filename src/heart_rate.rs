use crate::config::HeartRateConfig;
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DetectorState {
    AwaitingPeak,
    Tracking { last_peak_ms: f64 },
}
/// Single-threshold R-peak detector with a refractory period and an
/// exponentially smoothed rate. The estimate is never decayed or cleared by
/// missing beats; only `reset` returns it to zero.
#[derive(Clone, Debug)]
pub struct HeartRateEstimator {
    threshold: f32,
    min_rr_interval_ms: f64,
    smoothing: f32,
    state: DetectorState,
    heart_rate: f32,
    peak_count: u64,
}
impl HeartRateEstimator {
    pub fn new(config: &HeartRateConfig) -> Self {
        Self {
            threshold: config.threshold_volts,
            min_rr_interval_ms: config.min_rr_interval_ms,
            smoothing: config.smoothing,
            state: DetectorState::AwaitingPeak,
            heart_rate: 0.0,
            peak_count: 0,
        }
    }
    /// Feeds one value observed at `timestamp_ms` (monotonic). Returns true
    /// when the value was registered as a peak. The first peak after
    /// construction or `reset` is never gated, even at timestamp 0; the
    /// refractory window only runs from a previously registered peak.
    pub fn update(&mut self, value: f32, timestamp_ms: f64) -> bool {
        if value <= self.threshold {
            return false;
        }
        match self.state {
            DetectorState::AwaitingPeak => {}
            DetectorState::Tracking { last_peak_ms } => {
                let elapsed_ms = timestamp_ms - last_peak_ms;
                if elapsed_ms <= self.min_rr_interval_ms {
                    return false;
                }
                let instantaneous = 60.0 / (elapsed_ms / 1000.0) as f32;
                self.heart_rate =
                    self.heart_rate * self.smoothing + instantaneous * (1.0 - self.smoothing);
            }
        }
        self.state = DetectorState::Tracking {
            last_peak_ms: timestamp_ms,
        };
        self.peak_count += 1;
        true
    }
    pub fn heart_rate(&self) -> f32 {
        self.heart_rate
    }
    pub fn state(&self) -> DetectorState {
        self.state
    }
    pub fn last_peak_ms(&self) -> Option<f64> {
        match self.state {
            DetectorState::AwaitingPeak => None,
            DetectorState::Tracking { last_peak_ms } => Some(last_peak_ms),
        }
    }
    pub fn peak_count(&self) -> u64 {
        self.peak_count
    }
    pub fn reset(&mut self) {
        self.state = DetectorState::AwaitingPeak;
        self.heart_rate = 0.0;
        self.peak_count = 0;
    }
}
/// Offline peak picking over a whole block: local maxima above `height`,
/// at least `min_distance` samples apart (the taller peak wins a conflict).
pub fn find_peaks(samples: &[f32], height: f32, min_distance: usize) -> Vec<usize> {
    let mut candidates: Vec<usize> = (1..samples.len().saturating_sub(1))
        .filter(|&i| {
            let v = samples[i];
            v > height && v > samples[i - 1] && v >= samples[i + 1]
        })
        .collect();
    candidates.sort_by(|&a, &b| samples[b].total_cmp(&samples[a]));
    let mut kept: Vec<usize> = Vec::with_capacity(candidates.len());
    for idx in candidates {
        if kept.iter().all(|&k| k.abs_diff(idx) >= min_distance) {
            kept.push(idx);
        }
    }
    kept.sort_unstable();
    kept
}
/// 60 / mean RR interval, or `None` with fewer than two peaks.
pub fn mean_heart_rate(peaks: &[usize], sample_rate_hz: f32) -> Option<f32> {
    if peaks.len() < 2 {
        return None;
    }
    let span = (peaks[peaks.len() - 1] - peaks[0]) as f32 / sample_rate_hz;
    let mean_rr = span / (peaks.len() - 1) as f32;
    Some(60.0 / mean_rr)
}
