pub mod replay;
pub mod serial;
pub mod simulated;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;
use crate::config::MonitorConfig;
use crate::error::MonitorError;
pub use replay::{parse_capture_line, read_capture, ReplayEngine};
pub use serial::SerialEngine;
pub use simulated::{EcgSynth, EngineProbe, SimulatedEngine};
/// Settings pushed to the sampling engine once at start-up.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineSettings {
    pub channel: u8,
    pub clock_divisor: f64,
    pub sample_rate_hz: f32,
    pub queue_threshold: u8,
    pub volts_per_code: f32,
    pub max_code: u16,
}
impl EngineSettings {
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            channel: config.adc.channel,
            clock_divisor: config.adc.clock_divisor,
            sample_rate_hz: config.sample_rate_hz(),
            queue_threshold: config.adc.queue_threshold,
            volts_per_code: config.adc.volts_per_code(),
            max_code: config.adc.max_code(),
        }
    }
    /// Nearest code for a voltage, clamped to the converter range.
    pub fn code_for(&self, volts: f32) -> u16 {
        (volts / self.volts_per_code)
            .round()
            .clamp(0.0, self.max_code as f32) as u16
    }
}
/// Completed bulk transfer.
#[derive(Clone, Debug)]
pub struct Transfer {
    pub codes: Vec<u16>,
    /// Engine time of the first sample, in milliseconds.
    pub first_sample_ms: f64,
}
/// Receiving side of an armed transfer. Dropping it cancels the transfer.
pub struct TransferHandle {
    rx: Receiver<Result<Transfer, MonitorError>>,
    cancelled: Arc<AtomicBool>,
}
/// Engine side of an armed transfer.
pub struct TransferSender {
    tx: Sender<Result<Transfer, MonitorError>>,
    cancelled: Arc<AtomicBool>,
}
pub fn transfer_channel() -> (TransferSender, TransferHandle) {
    let (tx, rx) = mpsc::channel();
    let cancelled = Arc::new(AtomicBool::new(false));
    (
        TransferSender {
            tx,
            cancelled: cancelled.clone(),
        },
        TransferHandle { rx, cancelled },
    )
}
impl TransferHandle {
    pub fn wait(&self, timeout: Duration) -> Result<Transfer, MonitorError> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(MonitorError::AcquisitionTimeout {
                timeout_ms: timeout.as_millis() as u64,
            }),
            Err(RecvTimeoutError::Disconnected) => Err(MonitorError::HardwareFault(
                "transfer abandoned by the sampling engine".into(),
            )),
        }
    }
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}
impl Drop for TransferHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}
impl TransferSender {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
    pub fn complete(self, transfer: Transfer) {
        // The waiter may already have given up.
        self.tx.send(Ok(transfer)).ok();
    }
    pub fn fail(self, error: MonitorError) {
        self.tx.send(Err(error)).ok();
    }
}
/// Hardware sampling engine plus its bulk-transfer channel.
pub trait SamplingEngine {
    fn configure(&mut self, settings: &EngineSettings) -> Result<(), MonitorError>;
    /// Discards queued samples; returns how many were dropped.
    fn drain(&mut self) -> Result<usize, MonitorError>;
    fn start(&mut self) -> Result<(), MonitorError>;
    fn stop(&mut self) -> Result<(), MonitorError>;
    /// Arms a transfer of exactly `count` samples out of the queue.
    fn arm(&mut self, count: usize) -> Result<TransferHandle, MonitorError>;
}
impl<E: SamplingEngine + ?Sized> SamplingEngine for Box<E> {
    fn configure(&mut self, settings: &EngineSettings) -> Result<(), MonitorError> {
        (**self).configure(settings)
    }
    fn drain(&mut self) -> Result<usize, MonitorError> {
        (**self).drain()
    }
    fn start(&mut self) -> Result<(), MonitorError> {
        (**self).start()
    }
    fn stop(&mut self) -> Result<(), MonitorError> {
        (**self).stop()
    }
    fn arm(&mut self, count: usize) -> Result<TransferHandle, MonitorError> {
        (**self).arm(count)
    }
}
/// One acquisition cycle's worth of raw codes. Overwritten by every capture.
#[derive(Clone, Debug)]
pub struct RawSampleBlock {
    pub codes: Vec<u16>,
    pub start_ms: f64,
    pub sample_rate_hz: f32,
    pub sequence: u64,
}
impl RawSampleBlock {
    pub fn with_len(len: usize, sample_rate_hz: f32) -> Result<Self, MonitorError> {
        let mut codes = Vec::new();
        codes.try_reserve_exact(len).map_err(|e| {
            MonitorError::BufferAllocationFailure(format!("{len}-sample block: {e}"))
        })?;
        codes.resize(len, 0);
        Ok(Self {
            codes,
            start_ms: 0.0,
            sample_rate_hz,
            sequence: 0,
        })
    }
    pub fn len(&self) -> usize {
        self.codes.len()
    }
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
    /// Timestamp of sample `index`, in milliseconds.
    pub fn sample_time_ms(&self, index: usize) -> f64 {
        self.start_ms + index as f64 * 1000.0 / self.sample_rate_hz as f64
    }
}
/// Time the converter needs to produce `samples` at `sample_rate_hz`.
pub fn block_duration(samples: usize, sample_rate_hz: f32) -> Duration {
    if sample_rate_hz > 0.0 {
        Duration::from_secs_f64(samples as f64 / sample_rate_hz as f64)
    } else {
        Duration::ZERO
    }
}
/// Drives the engine through drain/arm/start/wait/stop/drain and owns the
/// single raw buffer.
pub struct AcquisitionController<E: SamplingEngine> {
    engine: E,
    settings: EngineSettings,
    timeout: Duration,
    retries: u32,
    block: RawSampleBlock,
    initialized: bool,
}
impl<E: SamplingEngine> AcquisitionController<E> {
    pub fn new(engine: E, config: &MonitorConfig) -> Result<Self, MonitorError> {
        let settings = EngineSettings::from_config(config);
        let block = RawSampleBlock::with_len(config.sample_count, settings.sample_rate_hz)?;
        let timeout = block_duration(config.sample_count, settings.sample_rate_hz)
            + Duration::from_millis(config.acquisition.timeout_ms);
        Ok(Self {
            engine,
            settings,
            timeout,
            retries: config.acquisition.retries,
            block,
            initialized: false,
        })
    }
    pub fn initialize(&mut self) -> Result<(), MonitorError> {
        self.engine.configure(&self.settings).map_err(|e| match e {
            MonitorError::HardwareInitFailure(_) => e,
            other => MonitorError::HardwareInitFailure(other.to_string()),
        })?;
        self.initialized = true;
        log::info!(
            "sampling engine ready: channel {}, divisor {}, {:.1} Hz",
            self.settings.channel,
            self.settings.clock_divisor,
            self.settings.sample_rate_hz
        );
        Ok(())
    }
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }
    pub fn sample_count(&self) -> usize {
        self.block.len()
    }
    /// Full wait for one transfer: the block's own duration plus the
    /// configured fault timeout.
    pub fn transfer_timeout(&self) -> Duration {
        self.timeout
    }
    pub fn engine(&self) -> &E {
        &self.engine
    }
    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }
    /// Fills the raw buffer with exactly `sample_count` fresh samples. A
    /// timed-out transfer is retried before the timeout is surfaced.
    pub fn capture(&mut self) -> Result<&RawSampleBlock, MonitorError> {
        if !self.initialized {
            return Err(MonitorError::HardwareInitFailure(
                "capture called before initialize".into(),
            ));
        }
        let mut attempt = 0;
        let transfer = loop {
            match self.capture_once() {
                Ok(transfer) => break transfer,
                Err(MonitorError::AcquisitionTimeout { timeout_ms }) if attempt < self.retries => {
                    attempt += 1;
                    log::warn!(
                        "transfer timed out after {timeout_ms} ms, retry {attempt}/{}",
                        self.retries
                    );
                }
                Err(e) => return Err(e),
            }
        };
        if transfer.codes.len() != self.block.len() {
            return Err(MonitorError::HardwareFault(format!(
                "transfer delivered {} samples, expected {}",
                transfer.codes.len(),
                self.block.len()
            )));
        }
        self.block.codes.copy_from_slice(&transfer.codes);
        self.block.start_ms = transfer.first_sample_ms;
        self.block.sequence += 1;
        Ok(&self.block)
    }
    fn capture_once(&mut self) -> Result<Transfer, MonitorError> {
        let stale = self.engine.drain()?;
        if stale > 0 {
            log::debug!("drained {stale} stale samples before capture");
        }
        self.engine.stop()?;
        let handle = self.engine.arm(self.block.len())?;
        self.engine.start()?;
        let result = handle.wait(self.timeout);
        drop(handle);
        let stopped = self.engine.stop();
        let drained = self.engine.drain();
        let transfer = result?;
        stopped?;
        drained?;
        Ok(transfer)
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulatedSourceConfig;
    const SENTINEL: u16 = 0xFFFF;
    fn config(samples: usize) -> MonitorConfig {
        let mut config = MonitorConfig::default();
        config.sample_count = samples;
        config.display.width = 50;
        config.acquisition.timeout_ms = 500;
        config
    }
    fn simulated(config: &MonitorConfig) -> SimulatedEngine {
        let sim = SimulatedSourceConfig {
            realtime: false,
            ..Default::default()
        };
        SimulatedEngine::new(&sim, &EngineSettings::from_config(config))
    }
    #[test]
    fn capture_requires_initialize() {
        let config = config(100);
        let mut controller = AcquisitionController::new(simulated(&config), &config).unwrap();
        assert!(matches!(
            controller.capture(),
            Err(MonitorError::HardwareInitFailure(_))
        ));
    }
    #[test]
    fn capture_returns_exact_count() {
        let config = config(500);
        let mut controller = AcquisitionController::new(simulated(&config), &config).unwrap();
        controller.initialize().unwrap();
        for expected_seq in 1..=3 {
            let block = controller.capture().unwrap();
            assert_eq!(block.len(), 500);
            assert_eq!(block.sequence, expected_seq);
        }
    }
    #[test]
    fn stale_queue_never_leaks_into_capture() {
        let config = config(400);
        let engine = simulated(&config);
        let probe = engine.probe();
        let mut controller = AcquisitionController::new(engine, &config).unwrap();
        controller.initialize().unwrap();
        let mut previous_start = f64::NEG_INFINITY;
        for _ in 0..3 {
            probe.inject(&[SENTINEL; 16]);
            let block = controller.capture().unwrap();
            assert!(block.codes.iter().all(|&c| c != SENTINEL));
            assert!(block.start_ms > previous_start);
            previous_start = block.start_ms;
        }
    }
    #[test]
    fn timeout_is_retried_once() {
        let config = config(200);
        let engine = simulated(&config);
        let probe = engine.probe();
        let mut controller = AcquisitionController::new(engine, &config).unwrap();
        controller.initialize().unwrap();
        probe.stall_transfers(1);
        assert_eq!(controller.capture().unwrap().len(), 200);
    }
    #[test]
    fn persistent_stall_surfaces_timeout() {
        let mut config = config(200);
        config.acquisition.timeout_ms = 50;
        let engine = simulated(&config);
        let probe = engine.probe();
        let mut controller = AcquisitionController::new(engine, &config).unwrap();
        controller.initialize().unwrap();
        probe.stall_transfers(2);
        // 200 samples at 1 kHz plus the 50 ms fault margin.
        assert_eq!(controller.transfer_timeout(), Duration::from_millis(250));
        assert!(matches!(
            controller.capture(),
            Err(MonitorError::AcquisitionTimeout { timeout_ms: 250 })
        ));
        // Fault cleared: the next cycle works again.
        assert_eq!(controller.capture().unwrap().len(), 200);
    }
    #[test]
    fn realtime_block_longer_than_timeout_completes() {
        let mut config = config(1000);
        config.acquisition.timeout_ms = 500;
        config.validate().unwrap();
        let engine = SimulatedEngine::new(
            &SimulatedSourceConfig::default(),
            &EngineSettings::from_config(&config),
        );
        let mut controller = AcquisitionController::new(engine, &config).unwrap();
        controller.initialize().unwrap();
        let block = controller.capture().unwrap();
        assert_eq!(block.len(), 1000);
    }
    #[test]
    fn block_duration_follows_rate() {
        assert_eq!(block_duration(2500, 1000.0), Duration::from_millis(2500));
        assert_eq!(block_duration(5000, 500.0), Duration::from_secs(10));
        assert_eq!(block_duration(10, 0.0), Duration::ZERO);
    }
    #[test]
    fn code_conversion_clamps() {
        let settings = EngineSettings::from_config(&MonitorConfig::default());
        assert_eq!(settings.code_for(-1.0), 0);
        assert_eq!(settings.code_for(10.0), 4095);
        assert_eq!(settings.code_for(1.65), 2048);
    }
    #[test]
    fn sample_times_follow_rate() {
        let mut block = RawSampleBlock::with_len(10, 500.0).unwrap();
        block.start_ms = 100.0;
        assert_eq!(block.sample_time_ms(5), 110.0);
    }
}
