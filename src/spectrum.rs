use rustfft::{num_complex::Complex32, FftPlanner};
/// One-sided magnitude spectrum of a single block, in dB.
#[derive(Clone, Debug)]
pub struct Spectrum {
    pub sample_rate_hz: f32,
    pub frequencies_hz: Vec<f32>,
    pub magnitudes_db: Vec<f32>,
}
impl Spectrum {
    /// FFT over the whole block (no windowing, no padding).
    pub fn of(samples: &[f32], sample_rate_hz: f32) -> Self {
        let n = samples.len();
        if n == 0 {
            return Self {
                sample_rate_hz,
                frequencies_hz: Vec::new(),
                magnitudes_db: Vec::new(),
            };
        }
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(n);
        let mut buffer: Vec<Complex32> = samples.iter().map(|&v| Complex32::new(v, 0.0)).collect();
        fft.process(&mut buffer);
        let bins = n / 2;
        let frequencies_hz = (0..bins)
            .map(|k| k as f32 * sample_rate_hz / n as f32)
            .collect();
        let magnitudes_db = buffer
            .iter()
            .take(bins)
            .map(|c| 20.0 * (c.norm() + 1e-10).log10())
            .collect();
        Self {
            sample_rate_hz,
            frequencies_hz,
            magnitudes_db,
        }
    }
    /// Frequency of the strongest bin at or above `min_hz`.
    pub fn dominant_frequency(&self, min_hz: f32) -> Option<f32> {
        self.frequencies_hz
            .iter()
            .zip(&self.magnitudes_db)
            .filter(|(f, _)| **f >= min_hz)
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(f, _)| *f)
    }
    pub fn is_empty(&self) -> bool {
        self.magnitudes_db.is_empty()
    }
}
