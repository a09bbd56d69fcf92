// src/lib.rs
// 单导联心电监护：采集 → 滤波 → 抽取 → 心率 → 绘制
pub mod acquisition;
pub mod conditioner;
pub mod config;
pub mod display;
pub mod downsample;
pub mod error;
pub mod heart_rate;
pub mod pipeline;
pub mod recorder;
pub mod render;
pub mod report;
pub mod spectrum;
// 公开导出常用类型，方便 main 与集成测试调用
pub use acquisition::{
    AcquisitionController, EngineSettings, RawSampleBlock, ReplayEngine, SamplingEngine,
    SerialEngine, SimulatedEngine,
};
pub use conditioner::{Biquad, BiquadCoeffs, FilterState, SignalConditioner};
pub use config::{DetectionFeed, MonitorConfig, SourceConfig};
pub use display::{Display, MemoryDisplay, PngDisplay};
pub use downsample::{DisplayColumn, Downsampler};
pub use error::MonitorError;
pub use heart_rate::{find_peaks, mean_heart_rate, DetectorState, HeartRateEstimator};
pub use pipeline::{CycleOutcome, CycleReport, EcgPipeline};
pub use recorder::CaptureRecorder;
pub use render::{heart_rate_label, Framebuffer, Renderer};
pub use report::{render_report_png, ReportStyle};
pub use spectrum::Spectrum;
