use std::f32::consts::PI;
use crate::config::{AdcConfig, FilterConfig};
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    pub a1: f32,
    pub a2: f32,
}
impl BiquadCoeffs {
    pub fn from_config(config: &FilterConfig) -> Self {
        Self {
            b0: config.b0,
            b1: config.b1,
            b2: config.b2,
            a1: config.a1,
            a2: config.a2,
        }
    }
    /// RBJ notch centred on `center_hz`.
    pub fn notch(center_hz: f32, sample_rate_hz: f32, q: f32) -> Self {
        let w0 = 2.0 * PI * center_hz / sample_rate_hz;
        let alpha = w0.sin() / (2.0 * q.max(0.1));
        let cos_w0 = w0.cos();
        normalize(1.0, -2.0 * cos_w0, 1.0, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
    }
    /// Magnitude response at `freq_hz`.
    pub fn gain_at(&self, freq_hz: f32, sample_rate_hz: f32) -> f32 {
        let w = 2.0 * PI * freq_hz / sample_rate_hz;
        let (c1, s1) = (w.cos(), -w.sin());
        let (c2, s2) = ((2.0 * w).cos(), -(2.0 * w).sin());
        let num_re = self.b0 + self.b1 * c1 + self.b2 * c2;
        let num_im = self.b1 * s1 + self.b2 * s2;
        let den_re = 1.0 + self.a1 * c1 + self.a2 * c2;
        let den_im = self.a1 * s1 + self.a2 * s2;
        ((num_re * num_re + num_im * num_im) / (den_re * den_re + den_im * den_im)).sqrt()
    }
}
fn normalize(b0: f32, b1: f32, b2: f32, a0: f32, a1: f32, a2: f32) -> BiquadCoeffs {
    let a0_inv = 1.0 / a0;
    BiquadCoeffs {
        b0: b0 * a0_inv,
        b1: b1 * a0_inv,
        b2: b2 * a0_inv,
        a1: a1 * a0_inv,
        a2: a2 * a0_inv,
    }
}
/// Two samples of input history and two of output history.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FilterState {
    pub x1: f32,
    pub x2: f32,
    pub y1: f32,
    pub y2: f32,
}
/// Direct form I second-order section.
#[derive(Clone, Copy, Debug)]
pub struct Biquad {
    coeffs: BiquadCoeffs,
    state: FilterState,
}
impl Biquad {
    pub fn new(coeffs: BiquadCoeffs) -> Self {
        Self {
            coeffs,
            state: FilterState::default(),
        }
    }
    pub fn process(&mut self, input: f32) -> f32 {
        let c = &self.coeffs;
        let s = &mut self.state;
        let output = c.b0 * input + c.b1 * s.x1 + c.b2 * s.x2 - c.a1 * s.y1 - c.a2 * s.y2;
        s.x2 = s.x1;
        s.x1 = input;
        s.y2 = s.y1;
        s.y1 = output;
        output
    }
    pub fn reset(&mut self) {
        self.state = FilterState::default();
    }
    pub fn state(&self) -> FilterState {
        self.state
    }
}
/// Converts raw ADC codes to volts and runs them through the bandpass (and
/// optional notch). State carries over between blocks; only `reset` clears it.
#[derive(Clone, Debug)]
pub struct SignalConditioner {
    volts_per_code: f32,
    notch: Option<Biquad>,
    bandpass: Biquad,
}
impl SignalConditioner {
    pub fn new(adc: &AdcConfig, filter: &FilterConfig) -> Self {
        let sample_rate_hz = adc.sample_rate_hz();
        let notch = filter
            .notch_hz
            .map(|hz| Biquad::new(BiquadCoeffs::notch(hz, sample_rate_hz, filter.notch_q)));
        Self {
            volts_per_code: adc.volts_per_code(),
            notch,
            bandpass: Biquad::new(BiquadCoeffs::from_config(filter)),
        }
    }
    pub fn to_volts(&self, code: u16) -> f32 {
        code as f32 * self.volts_per_code
    }
    pub fn process(&mut self, code: u16) -> f32 {
        let mut value = self.to_volts(code);
        if let Some(notch) = self.notch.as_mut() {
            value = notch.process(value);
        }
        self.bandpass.process(value)
    }
    /// Filters a whole block into `out`, which is resized to match.
    pub fn process_block(&mut self, codes: &[u16], out: &mut Vec<f32>) {
        out.clear();
        out.extend(codes.iter().map(|&code| self.process(code)));
    }
    pub fn reset(&mut self) {
        if let Some(notch) = self.notch.as_mut() {
            notch.reset();
        }
        self.bandpass.reset();
    }
    pub fn state(&self) -> FilterState {
        self.bandpass.state()
    }
}
