use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use crate::acquisition::{AcquisitionController, RawSampleBlock, SamplingEngine};
use crate::conditioner::SignalConditioner;
use crate::config::{DetectionFeed, MonitorConfig};
use crate::display::Display;
use crate::downsample::{DisplayColumn, Downsampler};
use crate::error::MonitorError;
use crate::heart_rate::{find_peaks, HeartRateEstimator};
use crate::recorder::CaptureRecorder;
use crate::render::Renderer;
use crate::report::{render_report_png, ReportStyle};
use crate::spectrum::Spectrum;
/// Lowest frequency considered for the dominant-frequency summary.
const SUMMARY_MIN_HZ: f32 = 0.5;
/// Summary of one processed block.
#[derive(Clone, Debug)]
pub struct CycleReport {
    pub sequence: u64,
    pub samples: usize,
    pub min_volts: f32,
    pub max_volts: f32,
    pub heart_rate: f32,
    /// Peaks registered by the estimator during this block.
    pub new_peaks: u64,
    pub dominant_hz: Option<f32>,
    /// False when the display rejected the frame; the cycle still counts.
    pub presented: bool,
    pub columns: Vec<DisplayColumn>,
}
#[derive(Debug)]
pub enum CycleOutcome {
    Completed(CycleReport),
    /// Acquisition failed transiently; nothing was rendered and the stage
    /// state is untouched.
    Skipped(MonitorError),
}
struct ReportSink {
    path: PathBuf,
    every: u32,
    style: ReportStyle,
}
/// Everything after acquisition. Kept apart from the controller so a block
/// borrowed from the controller can be processed in place.
struct Stages<D: Display> {
    conditioner: SignalConditioner,
    downsampler: Downsampler,
    estimator: HeartRateEstimator,
    renderer: Renderer,
    display: D,
    feed: DetectionFeed,
    threshold_volts: f32,
    min_rr_interval_ms: f64,
    backlight: u8,
    volts: Vec<f32>,
    filtered: Vec<f32>,
    recorder: Option<CaptureRecorder<BufWriter<File>>>,
    report: Option<ReportSink>,
    processed: u64,
}
/// Acquisition, conditioning, decimation, detection and rendering wired
/// into one owned cycle.
pub struct EcgPipeline<E: SamplingEngine, D: Display> {
    controller: AcquisitionController<E>,
    stages: Stages<D>,
    cycle_delay: Duration,
}
impl<E: SamplingEngine, D: Display> EcgPipeline<E, D> {
    pub fn new(engine: E, display: D, config: &MonitorConfig) -> Result<Self, MonitorError> {
        config.validate()?;
        let controller = AcquisitionController::new(engine, config)?;
        let renderer = Renderer::new(config.display.clone())?;
        let mut filtered = Vec::new();
        filtered.try_reserve_exact(config.sample_count).map_err(|e| {
            MonitorError::BufferAllocationFailure(format!("filtered block: {e}"))
        })?;
        Ok(Self {
            controller,
            stages: Stages {
                conditioner: SignalConditioner::new(&config.adc, &config.filter),
                downsampler: Downsampler::new(config.display.width as usize),
                estimator: HeartRateEstimator::new(&config.heart_rate),
                renderer,
                display,
                feed: config.heart_rate.feed,
                threshold_volts: config.heart_rate.threshold_volts,
                min_rr_interval_ms: config.heart_rate.min_rr_interval_ms,
                backlight: config.display.backlight,
                volts: Vec::new(),
                filtered,
                recorder: None,
                report: None,
                processed: 0,
            },
            cycle_delay: Duration::from_millis(config.acquisition.cycle_delay_ms),
        })
    }
    pub fn with_recorder(mut self, recorder: CaptureRecorder<BufWriter<File>>) -> Self {
        self.stages.recorder = Some(recorder);
        self
    }
    /// Writes a capture report to `path` every `every` processed blocks.
    pub fn with_report(mut self, path: impl Into<PathBuf>, every: u32) -> Self {
        self.stages.report = Some(ReportSink {
            path: path.into(),
            every: every.max(1),
            style: ReportStyle::default(),
        });
        self
    }
    /// Brings up the sampling engine and the panel. Failures here are fatal.
    pub fn initialize(&mut self) -> Result<(), MonitorError> {
        self.controller.initialize()?;
        let stages = &mut self.stages;
        stages.display.initialize().map_err(|e| match e {
            MonitorError::HardwareInitFailure(_) => e,
            other => MonitorError::HardwareInitFailure(format!("display: {other}")),
        })?;
        stages.display.set_backlight(stages.backlight);
        Ok(())
    }
    /// One full cycle: capture, then process. Transient acquisition errors
    /// skip the cycle; anything else is returned.
    pub fn run_cycle(&mut self) -> Result<CycleOutcome, MonitorError> {
        let block = match self.controller.capture() {
            Ok(block) => block,
            Err(e) if e.is_transient() => {
                log::warn!("skipping cycle: {e}");
                return Ok(CycleOutcome::Skipped(e));
            }
            Err(e) => return Err(e),
        };
        self.stages.process(block).map(CycleOutcome::Completed)
    }
    /// Runs the post-acquisition stages on a block obtained elsewhere.
    pub fn process_block(&mut self, block: &RawSampleBlock) -> Result<CycleReport, MonitorError> {
        self.stages.process(block)
    }
    /// Cycles until `stop` is set. Returns the number of completed cycles.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<u64, MonitorError> {
        let mut completed = 0;
        while !stop.load(Ordering::SeqCst) {
            if let CycleOutcome::Completed(report) = self.run_cycle()? {
                completed += 1;
                log::info!(
                    "capture #{}: {} samples, {:.3}..{:.3} V, HR {:.0} BPM ({} new peaks), dominant {}",
                    report.sequence,
                    report.samples,
                    report.min_volts,
                    report.max_volts,
                    report.heart_rate,
                    report.new_peaks,
                    report
                        .dominant_hz
                        .map(|hz| format!("{hz:.2} Hz"))
                        .unwrap_or_else(|| "n/a".into()),
                );
            }
            if !self.cycle_delay.is_zero() {
                thread::sleep(self.cycle_delay);
            }
        }
        log::info!("monitor stopped after {completed} cycles");
        Ok(completed)
    }
    pub fn heart_rate(&self) -> f32 {
        self.stages.estimator.heart_rate()
    }
    pub fn estimator(&self) -> &HeartRateEstimator {
        &self.stages.estimator
    }
    pub fn conditioner_mut(&mut self) -> &mut SignalConditioner {
        &mut self.stages.conditioner
    }
    pub fn filtered(&self) -> &[f32] {
        &self.stages.filtered
    }
    pub fn renderer(&self) -> &Renderer {
        &self.stages.renderer
    }
    pub fn display(&self) -> &D {
        &self.stages.display
    }
    pub fn controller(&self) -> &AcquisitionController<E> {
        &self.controller
    }
}
impl<D: Display> Stages<D> {
    fn process(&mut self, block: &RawSampleBlock) -> Result<CycleReport, MonitorError> {
        self.conditioner.process_block(&block.codes, &mut self.filtered);
        let columns = self.downsampler.downsample_with_positions(&self.filtered);
        let peaks_before = self.estimator.peak_count();
        match self.feed {
            DetectionFeed::Filtered => {
                for (i, &v) in self.filtered.iter().enumerate() {
                    self.estimator.update(v, block.sample_time_ms(i));
                }
            }
            DetectionFeed::Columns => {
                for column in &columns {
                    self.estimator
                        .update(column.value, block.sample_time_ms(column.sample_index));
                }
            }
        }
        let heart_rate = self.estimator.heart_rate();
        let values: Vec<f32> = columns.iter().map(|c| c.value).collect();
        let frame = self.renderer.render(&values, heart_rate);
        // Output failures cost this cycle's frame or file, not the monitor.
        let presented = match self.display.present(frame) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("frame not presented: {e}");
                false
            }
        };
        self.processed += 1;
        let spectrum = Spectrum::of(&self.filtered, block.sample_rate_hz);
        if let Err(e) = self.record(block) {
            log::warn!("capture {} not recorded: {e}", block.sequence);
        }
        if let Err(e) = self.write_report(block, &spectrum) {
            log::warn!("capture report not written: {e}");
        }
        let (min_volts, max_volts) = self
            .filtered
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        Ok(CycleReport {
            sequence: block.sequence,
            samples: block.len(),
            min_volts,
            max_volts,
            heart_rate,
            new_peaks: self.estimator.peak_count() - peaks_before,
            dominant_hz: spectrum.dominant_frequency(SUMMARY_MIN_HZ),
            presented,
            columns,
        })
    }
    fn record(&mut self, block: &RawSampleBlock) -> Result<(), MonitorError> {
        let Some(recorder) = self.recorder.as_mut() else {
            return Ok(());
        };
        let conditioner = &self.conditioner;
        self.volts.clear();
        self.volts
            .extend(block.codes.iter().map(|&c| conditioner.to_volts(c)));
        recorder.write_capture(block, &self.volts)
    }
    fn write_report(&self, block: &RawSampleBlock, spectrum: &Spectrum) -> Result<(), MonitorError> {
        let Some(sink) = self.report.as_ref() else {
            return Ok(());
        };
        if self.processed % sink.every as u64 != 0 {
            return Ok(());
        }
        let min_distance = (self.min_rr_interval_ms * block.sample_rate_hz as f64 / 1000.0) as usize;
        let peaks = find_peaks(&self.filtered, self.threshold_volts, min_distance.max(1));
        let png = render_report_png(&self.filtered, &peaks, spectrum, &sink.style)?;
        fs::write(&sink.path, png)?;
        log::debug!("capture report written to {}", sink.path.display());
        Ok(())
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::{EngineSettings, SimulatedEngine};
    use crate::config::SimulatedSourceConfig;
    use crate::display::MemoryDisplay;
    fn config() -> MonitorConfig {
        let mut config = MonitorConfig::default();
        config.sample_count = 1000;
        config.display.width = 100;
        config.acquisition.timeout_ms = 500;
        config.acquisition.cycle_delay_ms = 0;
        config
    }
    fn engine(config: &MonitorConfig) -> SimulatedEngine {
        let sim = SimulatedSourceConfig {
            realtime: false,
            ..Default::default()
        };
        SimulatedEngine::new(&sim, &EngineSettings::from_config(config))
    }
    #[test]
    fn cycle_renders_and_presents() {
        let config = config();
        let mut pipeline =
            EcgPipeline::new(engine(&config), MemoryDisplay::default(), &config).unwrap();
        pipeline.initialize().unwrap();
        assert_eq!(pipeline.display().backlight, 50);
        let CycleOutcome::Completed(report) = pipeline.run_cycle().unwrap() else {
            panic!("cycle was skipped");
        };
        assert_eq!(report.sequence, 1);
        assert_eq!(report.samples, 1000);
        assert_eq!(report.columns.len(), 100);
        assert!(report.min_volts <= report.max_volts);
        assert_eq!(pipeline.filtered().len(), 1000);
        let display = pipeline.display();
        assert_eq!(display.presented, 1);
        let frame = display.last_frame.as_ref().unwrap();
        assert_eq!((frame.width(), frame.height()), (100, 135));
    }
    #[test]
    fn stalled_capture_skips_cycle() {
        let mut config = config();
        config.acquisition.timeout_ms = 50;
        let engine = engine(&config);
        let probe = engine.probe();
        let mut pipeline = EcgPipeline::new(engine, MemoryDisplay::default(), &config).unwrap();
        pipeline.initialize().unwrap();
        probe.stall_transfers(2);
        assert!(matches!(
            pipeline.run_cycle().unwrap(),
            CycleOutcome::Skipped(MonitorError::AcquisitionTimeout { .. })
        ));
        assert_eq!(pipeline.display().presented, 0);
        assert!(matches!(
            pipeline.run_cycle().unwrap(),
            CycleOutcome::Completed(_)
        ));
        assert_eq!(pipeline.display().presented, 1);
    }
    #[test]
    fn column_feed_uses_sample_clock() {
        let mut config = config();
        config.heart_rate.feed = DetectionFeed::Columns;
        config.heart_rate.threshold_volts = 0.5;
        let mut pipeline =
            EcgPipeline::new(engine(&config), MemoryDisplay::default(), &config).unwrap();
        pipeline.initialize().unwrap();
        let mut block = RawSampleBlock::with_len(1000, 1000.0).unwrap();
        block.codes[400..430].fill(4000);
        block.start_ms = 2000.0;
        let report = pipeline.process_block(&block).unwrap();
        assert_eq!(report.new_peaks, 1);
        // Column 40 covers samples 400..410; the filtered pulse is still
        // rising there, so its maximum sits on the window's last sample.
        assert_eq!(pipeline.estimator().last_peak_ms(), Some(2409.0));
    }
    #[test]
    fn invalid_config_is_rejected() {
        let mut config = config();
        config.display.width = 2000;
        assert!(matches!(
            EcgPipeline::new(engine(&config), MemoryDisplay::default(), &config),
            Err(MonitorError::InvalidConfig(_))
        ));
    }
    #[test]
    fn run_returns_when_stopped() {
        let config = config();
        let mut pipeline =
            EcgPipeline::new(engine(&config), MemoryDisplay::default(), &config).unwrap();
        pipeline.initialize().unwrap();
        let stop = AtomicBool::new(true);
        assert_eq!(pipeline.run(&stop).unwrap(), 0);
    }
    #[test]
    fn report_written_on_schedule() {
        let config = config();
        let path = std::env::temp_dir().join(format!("ecg_report_{}.png", std::process::id()));
        fs::remove_file(&path).ok();
        let mut pipeline = EcgPipeline::new(engine(&config), MemoryDisplay::default(), &config)
            .unwrap()
            .with_report(&path, 2);
        pipeline.initialize().unwrap();
        pipeline.run_cycle().unwrap();
        assert!(!path.exists());
        pipeline.run_cycle().unwrap();
        assert!(fs::read(&path).unwrap().starts_with(b"\x89PNG"));
        fs::remove_file(path).ok();
    }
    /// Panel that accepts initialization but rejects every frame.
    #[derive(Default)]
    struct RejectingDisplay {
        attempts: u32,
    }
    impl Display for RejectingDisplay {
        fn initialize(&mut self) -> Result<(), MonitorError> {
            Ok(())
        }
        fn set_backlight(&mut self, _level: u8) {}
        fn present(&mut self, _frame: &crate::render::Framebuffer) -> Result<(), MonitorError> {
            self.attempts += 1;
            Err(MonitorError::Display("panel unplugged".into()))
        }
    }
    #[test]
    fn display_failure_does_not_stop_the_monitor() {
        let config = config();
        let mut pipeline =
            EcgPipeline::new(engine(&config), RejectingDisplay::default(), &config).unwrap();
        pipeline.initialize().unwrap();
        for expected in 1..=2 {
            let CycleOutcome::Completed(report) = pipeline.run_cycle().unwrap() else {
                panic!("cycle was skipped");
            };
            assert!(!report.presented);
            assert_eq!(report.sequence, expected);
        }
        assert_eq!(pipeline.display().attempts, 2);
    }
    #[test]
    fn unwritable_report_does_not_stop_the_monitor() {
        let config = config();
        let path = std::env::temp_dir()
            .join(format!("ecg_missing_dir_{}", std::process::id()))
            .join("report.png");
        let mut pipeline = EcgPipeline::new(engine(&config), MemoryDisplay::default(), &config)
            .unwrap()
            .with_report(&path, 1);
        pipeline.initialize().unwrap();
        let CycleOutcome::Completed(report) = pipeline.run_cycle().unwrap() else {
            panic!("cycle was skipped");
        };
        assert!(report.presented);
        assert!(!path.exists());
        assert_eq!(pipeline.display().presented, 1);
    }
}
