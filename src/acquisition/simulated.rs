use std::collections::VecDeque;
use std::f32::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use crate::acquisition::{
    transfer_channel, EngineSettings, SamplingEngine, Transfer, TransferHandle, TransferSender,
};
use crate::config::SimulatedSourceConfig;
use crate::error::MonitorError;
/// Conversion queue depth of the emulated converter.
const FIFO_DEPTH: usize = 4;
/// Samples produced per wake-up when not paced to real time.
const UNTHROTTLED_BURST: u64 = 256;
/// Analog inputs available on the emulated converter.
const INPUT_CHANNELS: u8 = 5;
/// (amplitude V, centre s after beat onset, width s) for P, Q, R, S, T.
const WAVES: [(f32, f32, f32); 5] = [
    (0.12, 0.16, 0.025),
    (-0.15, 0.23, 0.010),
    (1.60, 0.25, 0.012),
    (-0.35, 0.27, 0.010),
    (0.35, 0.45, 0.040),
];
/// Synthetic single-lead ECG as seen at the converter input: a sum of
/// Gaussian waves per beat on a 1 V baseline with slow wander and uniform noise.
pub struct EcgSynth {
    sample_rate_hz: f32,
    beat_period_s: f32,
    noise_volts: f32,
    rng: StdRng,
    index: u64,
}
impl EcgSynth {
    pub fn new(heart_rate_bpm: f32, noise_volts: f32, seed: u64, sample_rate_hz: f32) -> Self {
        Self {
            sample_rate_hz,
            beat_period_s: 60.0 / heart_rate_bpm.max(1.0),
            noise_volts: noise_volts.abs(),
            rng: StdRng::seed_from_u64(seed),
            index: 0,
        }
    }
    /// Noise-free voltage of sample `index`.
    pub fn clean_voltage(&self, index: u64) -> f32 {
        let t = index as f64 / self.sample_rate_hz as f64;
        let phase = (t % self.beat_period_s as f64) as f32;
        let wander = 0.1 * (2.0 * PI * 0.3 * t as f32).sin();
        WAVES.iter().fold(1.0 + wander, |acc, &(amp, centre, width)| {
            let d = phase - centre;
            acc + amp * (-(d * d) / (2.0 * width * width)).exp()
        })
    }
    pub fn next_voltage(&mut self) -> f32 {
        let clean = self.clean_voltage(self.index);
        self.index += 1;
        if self.noise_volts > 0.0 {
            clean + self.rng.gen_range(-self.noise_volts..=self.noise_volts)
        } else {
            clean
        }
    }
    pub fn set_sample_rate(&mut self, sample_rate_hz: f32) {
        self.sample_rate_hz = sample_rate_hz;
    }
}
struct Pending {
    sender: TransferSender,
    count: usize,
    codes: Vec<u16>,
    stalled: bool,
}
struct Shared {
    fifo: VecDeque<u16>,
    pending: Option<Pending>,
    synth: EcgSynth,
    settings: Option<EngineSettings>,
    generated: u64,
    overruns: u64,
    stall_next: usize,
}
impl Shared {
    fn produce(&mut self, samples: u64) {
        let Some(settings) = self.settings.clone() else {
            return;
        };
        for _ in 0..samples {
            let code = settings.code_for(self.synth.next_voltage());
            self.generated += 1;
            if self.fifo.len() >= FIFO_DEPTH {
                self.fifo.pop_front();
                self.overruns += 1;
            }
            self.fifo.push_back(code);
            self.service(settings.sample_rate_hz);
        }
    }
    fn service(&mut self, sample_rate_hz: f32) {
        let Some(pending) = self.pending.as_mut() else {
            return;
        };
        if pending.sender.is_cancelled() {
            self.pending = None;
            return;
        }
        if pending.stalled {
            return;
        }
        while pending.codes.len() < pending.count {
            match self.fifo.pop_front() {
                Some(code) => pending.codes.push(code),
                None => break,
            }
        }
        if pending.codes.len() == pending.count {
            if let Some(done) = self.pending.take() {
                let first_index = self.generated - done.count as u64;
                done.sender.complete(Transfer {
                    codes: done.codes,
                    first_sample_ms: first_index as f64 * 1000.0 / sample_rate_hz as f64,
                });
            }
        }
    }
}
fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}
/// Software stand-in for the converter and its transfer channel. A worker
/// thread produces samples into a small queue while the engine runs; an
/// armed transfer drains that queue.
pub struct SimulatedEngine {
    shared: Arc<Mutex<Shared>>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    realtime: bool,
}
impl SimulatedEngine {
    pub fn new(config: &SimulatedSourceConfig, settings: &EngineSettings) -> Self {
        let synth = EcgSynth::new(
            config.heart_rate_bpm,
            config.noise_volts,
            config.seed,
            settings.sample_rate_hz,
        );
        Self {
            shared: Arc::new(Mutex::new(Shared {
                fifo: VecDeque::with_capacity(FIFO_DEPTH),
                pending: None,
                synth,
                settings: None,
                generated: 0,
                overruns: 0,
                stall_next: 0,
            })),
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
            realtime: config.realtime,
        }
    }
    /// Handle for observing the engine and injecting faults.
    pub fn probe(&self) -> EngineProbe {
        EngineProbe {
            shared: self.shared.clone(),
        }
    }
    fn spawn_worker(&mut self, sample_rate_hz: f32) {
        let shared = self.shared.clone();
        let running = self.running.clone();
        let realtime = self.realtime;
        self.worker = Some(thread::spawn(move || {
            let started = Instant::now();
            let mut produced: u64 = 0;
            while running.load(Ordering::SeqCst) {
                let due = if realtime {
                    (started.elapsed().as_secs_f64() * sample_rate_hz as f64) as u64
                } else {
                    produced + UNTHROTTLED_BURST
                };
                if due > produced {
                    lock(&shared).produce(due - produced);
                    produced = due;
                }
                if realtime {
                    thread::sleep(Duration::from_millis(1));
                } else {
                    thread::yield_now();
                }
            }
        }));
    }
}
impl SamplingEngine for SimulatedEngine {
    fn configure(&mut self, settings: &EngineSettings) -> Result<(), MonitorError> {
        if settings.channel >= INPUT_CHANNELS {
            return Err(MonitorError::HardwareInitFailure(format!(
                "input channel {} does not exist",
                settings.channel
            )));
        }
        if settings.sample_rate_hz <= 0.0 {
            return Err(MonitorError::HardwareInitFailure(
                "sample rate must be greater than zero".into(),
            ));
        }
        let mut shared = lock(&self.shared);
        shared.synth.set_sample_rate(settings.sample_rate_hz);
        shared.settings = Some(settings.clone());
        log::debug!(
            "simulated engine configured for {:.1} Hz ({})",
            settings.sample_rate_hz,
            if self.realtime { "real time" } else { "unthrottled" }
        );
        Ok(())
    }
    fn drain(&mut self) -> Result<usize, MonitorError> {
        let mut shared = lock(&self.shared);
        let stale = shared.fifo.len();
        shared.fifo.clear();
        Ok(stale)
    }
    fn start(&mut self) -> Result<(), MonitorError> {
        if self.worker.is_some() {
            return Ok(());
        }
        let rate = lock(&self.shared)
            .settings
            .as_ref()
            .map(|s| s.sample_rate_hz)
            .ok_or_else(|| MonitorError::HardwareFault("engine started before configure".into()))?;
        self.running.store(true, Ordering::SeqCst);
        self.spawn_worker(rate);
        Ok(())
    }
    fn stop(&mut self) -> Result<(), MonitorError> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            worker
                .join()
                .map_err(|_| MonitorError::HardwareFault("sample producer panicked".into()))?;
        }
        Ok(())
    }
    fn arm(&mut self, count: usize) -> Result<TransferHandle, MonitorError> {
        if count == 0 {
            return Err(MonitorError::HardwareFault("zero-length transfer".into()));
        }
        let (sender, handle) = transfer_channel();
        let mut shared = lock(&self.shared);
        let stalled = shared.stall_next > 0;
        if stalled {
            shared.stall_next -= 1;
        }
        shared.pending = Some(Pending {
            sender,
            count,
            codes: Vec::with_capacity(count),
            stalled,
        });
        Ok(handle)
    }
}
impl Drop for SimulatedEngine {
    fn drop(&mut self) {
        self.stop().ok();
    }
}
pub struct EngineProbe {
    shared: Arc<Mutex<Shared>>,
}
impl EngineProbe {
    /// Pushes codes straight into the queue, bypassing its depth limit.
    pub fn inject(&self, codes: &[u16]) {
        lock(&self.shared).fifo.extend(codes.iter().copied());
    }
    /// The next `count` armed transfers never complete.
    pub fn stall_transfers(&self, count: usize) {
        lock(&self.shared).stall_next = count;
    }
    pub fn samples_generated(&self) -> u64 {
        lock(&self.shared).generated
    }
    pub fn overruns(&self) -> u64 {
        lock(&self.shared).overruns
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitorConfig;
    #[test]
    fn synth_beats_at_configured_rate() {
        let synth = EcgSynth::new(60.0, 0.0, 1, 1000.0);
        let r_peak = synth.clean_voltage(250);
        assert!(r_peak > 2.4, "R peak {r_peak}");
        assert!((synth.clean_voltage(1250) - r_peak).abs() < 0.1);
        assert!(synth.clean_voltage(800) < 1.3);
    }
    #[test]
    fn noise_is_bounded_and_seeded() {
        let mut a = EcgSynth::new(72.0, 0.05, 9, 1000.0);
        let mut b = EcgSynth::new(72.0, 0.05, 9, 1000.0);
        let clean = EcgSynth::new(72.0, 0.0, 9, 1000.0);
        for i in 0..500 {
            let va = a.next_voltage();
            assert_eq!(va, b.next_voltage());
            assert!((va - clean.clean_voltage(i)).abs() <= 0.05 + 1e-6);
        }
    }
    #[test]
    fn rejects_missing_channel() {
        let mut config = MonitorConfig::default();
        config.adc.channel = 7;
        let settings = EngineSettings::from_config(&config);
        let mut engine = SimulatedEngine::new(&SimulatedSourceConfig::default(), &settings);
        assert!(matches!(
            engine.configure(&settings),
            Err(MonitorError::HardwareInitFailure(_))
        ));
    }
    #[test]
    fn transfer_completes_while_running() {
        let settings = EngineSettings::from_config(&MonitorConfig::default());
        let sim = SimulatedSourceConfig {
            realtime: false,
            ..Default::default()
        };
        let mut engine = SimulatedEngine::new(&sim, &settings);
        engine.configure(&settings).unwrap();
        let handle = engine.arm(1000).unwrap();
        engine.start().unwrap();
        let transfer = handle.wait(Duration::from_secs(5)).unwrap();
        engine.stop().unwrap();
        assert_eq!(transfer.codes.len(), 1000);
        assert!(transfer.codes.iter().all(|&c| c <= 4095));
        assert!(engine.probe().samples_generated() >= 1000);
    }
    #[test]
    fn idle_queue_overruns_instead_of_growing() {
        let settings = EngineSettings::from_config(&MonitorConfig::default());
        let sim = SimulatedSourceConfig {
            realtime: false,
            ..Default::default()
        };
        let mut engine = SimulatedEngine::new(&sim, &settings);
        engine.configure(&settings).unwrap();
        let probe = engine.probe();
        engine.start().unwrap();
        while probe.samples_generated() < 1000 {
            thread::yield_now();
        }
        engine.stop().unwrap();
        assert!(probe.overruns() > 0);
        assert!(engine.drain().unwrap() <= FIFO_DEPTH);
    }
}
