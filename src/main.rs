// src/main.rs
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use anyhow::{Context, Result};
use ecg_monitor::acquisition::EngineSettings;
use ecg_monitor::{
    CaptureRecorder, Display, EcgPipeline, MemoryDisplay, MonitorConfig, PngDisplay,
    ReplayEngine, SamplingEngine, SerialEngine, SimulatedEngine, SourceConfig,
};
fn load_config() -> Result<MonitorConfig> {
    match std::env::args().nth(1) {
        Some(path) => MonitorConfig::load(&path)
            .with_context(|| format!("failed to load configuration from {path}")),
        None => {
            log::info!("no configuration file given, using defaults");
            Ok(MonitorConfig::default())
        }
    }
}
fn build_engine(config: &MonitorConfig) -> Result<Box<dyn SamplingEngine>> {
    let engine: Box<dyn SamplingEngine> = match &config.source {
        SourceConfig::Simulated(sim) => {
            log::info!(
                "simulated source: {} BPM, noise {} V",
                sim.heart_rate_bpm,
                sim.noise_volts
            );
            Box::new(SimulatedEngine::new(sim, &EngineSettings::from_config(config)))
        }
        SourceConfig::Serial { port, baud_rate } => Box::new(SerialEngine::new(port, *baud_rate)),
        SourceConfig::Replay { path } => Box::new(
            ReplayEngine::open(path)
                .with_context(|| format!("failed to open recording {}", path.display()))?,
        ),
    };
    Ok(engine)
}
fn build_display(config: &MonitorConfig) -> Box<dyn Display> {
    match &config.output.frame_path {
        Some(path) => Box::new(PngDisplay::new(path)),
        None => Box::new(MemoryDisplay::default()),
    }
}
// 入口函数
fn main() -> Result<()> {
    env_logger::init();
    let config = load_config()?;
    let engine = build_engine(&config)?;
    let display = build_display(&config);
    let mut pipeline =
        EcgPipeline::new(engine, display, &config).context("failed to set up the pipeline")?;
    if let Some(path) = &config.output.record_path {
        let recorder = CaptureRecorder::create(path)
            .with_context(|| format!("failed to create recording {}", path.display()))?;
        pipeline = pipeline.with_recorder(recorder);
    }
    if let Some(path) = &config.output.report_path {
        pipeline = pipeline.with_report(path, config.output.report_every);
    }
    pipeline
        .initialize()
        .context("failed to initialize acquisition hardware")?;
    // 回车键停止监护
    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        thread::spawn(move || {
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line).ok();
            stop.store(true, Ordering::SeqCst);
        });
    }
    log::info!(
        "monitoring at {:.0} Hz, {} samples per capture; press Enter to stop",
        config.sample_rate_hz(),
        config.sample_count
    );
    let cycles = pipeline.run(&stop).context("monitor loop failed")?;
    println!("{cycles} captures processed, last heart rate {:.0} BPM", pipeline.heart_rate());
    Ok(())
}
