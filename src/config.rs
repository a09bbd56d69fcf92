use std::fs;
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use crate::error::MonitorError;
/// Top-level runtime configuration. Every field has a default matching the
/// reference board (RP2040-class ADC, 240x135 LCD).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub adc: AdcConfig,
    pub sample_count: usize,
    pub display: DisplayConfig,
    pub filter: FilterConfig,
    pub heart_rate: HeartRateConfig,
    pub acquisition: AcquisitionConfig,
    pub source: SourceConfig,
    pub output: OutputConfig,
}
impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            adc: AdcConfig::default(),
            sample_count: 2500,
            display: DisplayConfig::default(),
            filter: FilterConfig::default(),
            heart_rate: HeartRateConfig::default(),
            acquisition: AcquisitionConfig::default(),
            source: SourceConfig::default(),
            output: OutputConfig::default(),
        }
    }
}
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AdcConfig {
    pub reference_voltage: f32,
    pub resolution_bits: u8,
    pub channel: u8,
    pub base_clock_hz: f64,
    pub clock_divisor: f64,
    /// A conversion never takes fewer than this many base clock cycles.
    pub min_conversion_cycles: f64,
    /// Queue fill level at which the transfer request is asserted.
    pub queue_threshold: u8,
}
impl Default for AdcConfig {
    fn default() -> Self {
        Self {
            reference_voltage: 3.3,
            resolution_bits: 12,
            channel: 0,
            base_clock_hz: 48_000_000.0,
            clock_divisor: 47_999.0,
            min_conversion_cycles: 96.0,
            queue_threshold: 1,
        }
    }
}
impl AdcConfig {
    /// Sample rate derived from the clock divisor; the divisor is the only
    /// source of truth for timing.
    pub fn sample_rate_hz(&self) -> f32 {
        let period = (self.clock_divisor + 1.0).max(self.min_conversion_cycles);
        (self.base_clock_hz / period) as f32
    }
    /// Volts per ADC code.
    pub fn volts_per_code(&self) -> f32 {
        self.reference_voltage / (1u32 << self.resolution_bits) as f32
    }
    pub fn max_code(&self) -> u16 {
        ((1u32 << self.resolution_bits) - 1) as u16
    }
}
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub width: u32,
    pub height: u32,
    /// Pixels per volt.
    pub amplitude_scale: f32,
    /// Row that corresponds to 0 V.
    pub vertical_offset: i32,
    pub grid_spacing: u32,
    pub backlight: u8,
    pub text_x: i32,
    pub text_y: i32,
}
impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 240,
            height: 135,
            amplitude_scale: 50.0,
            vertical_offset: 90,
            grid_spacing: 20,
            backlight: 50,
            text_x: 5,
            text_y: 5,
        }
    }
}
/// Second-order section coefficients, normalized so that `a0 == 1`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    pub a1: f32,
    pub a2: f32,
    /// Optional mains notch ahead of the bandpass, e.g. 50.0 or 60.0.
    pub notch_hz: Option<f32>,
    pub notch_q: f32,
}
impl Default for FilterConfig {
    fn default() -> Self {
        // Bandpass, roughly 0.5-35 Hz at 1 kHz.
        Self {
            b0: 0.0675,
            b1: 0.0,
            b2: -0.0675,
            a1: -1.8650,
            a2: 0.8651,
            notch_hz: None,
            notch_q: 30.0,
        }
    }
}
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionFeed {
    /// Every filtered sample, timestamped by its sample index.
    Filtered,
    /// One value per display column.
    Columns,
}
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartRateConfig {
    pub threshold_volts: f32,
    pub min_rr_interval_ms: f64,
    /// Weight kept from the previous estimate on each new beat.
    pub smoothing: f32,
    pub feed: DetectionFeed,
}
impl Default for HeartRateConfig {
    fn default() -> Self {
        Self {
            threshold_volts: 0.8,
            min_rr_interval_ms: 200.0,
            smoothing: 0.7,
            feed: DetectionFeed::Filtered,
        }
    }
}
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    pub timeout_ms: u64,
    /// Extra attempts after a timed-out transfer before the cycle is skipped.
    pub retries: u32,
    pub cycle_delay_ms: u64,
}
impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            retries: 1,
            cycle_delay_ms: 100,
        }
    }
}
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    Simulated(SimulatedSourceConfig),
    Serial {
        port: String,
        baud_rate: u32,
    },
    Replay {
        path: PathBuf,
    },
}
impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Simulated(SimulatedSourceConfig::default())
    }
}
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedSourceConfig {
    pub heart_rate_bpm: f32,
    /// Peak amplitude of the uniform noise added to every sample.
    pub noise_volts: f32,
    /// Pace generation at the configured sample rate instead of as fast as possible.
    pub realtime: bool,
    pub seed: u64,
}
impl Default for SimulatedSourceConfig {
    fn default() -> Self {
        Self {
            heart_rate_bpm: 72.0,
            noise_volts: 0.02,
            realtime: true,
            seed: 7,
        }
    }
}
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub frame_path: Option<PathBuf>,
    pub record_path: Option<PathBuf>,
    pub report_path: Option<PathBuf>,
    pub report_every: u32,
}
impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            frame_path: Some(PathBuf::from("ecg_frame.png")),
            record_path: None,
            report_path: None,
            report_every: 10,
        }
    }
}
impl MonitorConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MonitorError> {
        let text = fs::read_to_string(path)?;
        let config: MonitorConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }
    pub fn sample_rate_hz(&self) -> f32 {
        self.adc.sample_rate_hz()
    }
    pub fn validate(&self) -> Result<(), MonitorError> {
        let fail = |msg: String| Err(MonitorError::InvalidConfig(msg));
        if self.sample_count == 0 {
            return fail("sample_count must be greater than zero".into());
        }
        if self.display.width == 0 || self.display.height == 0 {
            return fail("display dimensions must be non-zero".into());
        }
        if self.display.width as usize > self.sample_count {
            return fail(format!(
                "display width {} exceeds sample_count {}",
                self.display.width, self.sample_count
            ));
        }
        if !(1..=16).contains(&self.adc.resolution_bits) {
            return fail(format!(
                "resolution_bits must be within 1..=16, got {}",
                self.adc.resolution_bits
            ));
        }
        if self.adc.reference_voltage <= 0.0 {
            return fail("reference_voltage must be positive".into());
        }
        if self.adc.base_clock_hz <= 0.0 || self.adc.clock_divisor < 0.0 {
            return fail("clock settings must be positive".into());
        }
        if self.acquisition.timeout_ms == 0 {
            return fail("acquisition timeout must be positive".into());
        }
        if !(0.0..1.0).contains(&self.heart_rate.smoothing) {
            return fail(format!(
                "smoothing must be within [0, 1), got {}",
                self.heart_rate.smoothing
            ));
        }
        if let Some(notch) = self.filter.notch_hz {
            if notch <= 0.0 || notch >= self.sample_rate_hz() / 2.0 {
                return fail(format!("notch frequency {notch} Hz is outside (0, Nyquist)"));
            }
        }
        Ok(())
    }
}
