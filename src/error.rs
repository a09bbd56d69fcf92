use thiserror::Error;
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("hardware failed to initialize: {0}")]
    HardwareInitFailure(String),
    #[error("bulk transfer did not complete within {timeout_ms} ms")]
    AcquisitionTimeout { timeout_ms: u64 },
    #[error("sampling engine fault: {0}")]
    HardwareFault(String),
    #[error("failed to allocate buffer: {0}")]
    BufferAllocationFailure(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("display error: {0}")]
    Display(String),
    #[error("failed to render plot: {0}")]
    Plot(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Serial(#[from] serialport::Error),
    #[error("failed to parse configuration: {0}")]
    Config(#[from] serde_json::Error),
    #[error("failed to encode image: {0}")]
    Image(#[from] image::ImageError),
}
impl MonitorError {
    /// Errors that end the current cycle but leave the monitor running.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MonitorError::AcquisitionTimeout { .. } | MonitorError::HardwareFault(_)
        )
    }
}
impl<E: std::error::Error + Send + Sync + 'static> From<plotters::drawing::DrawingAreaErrorKind<E>>
    for MonitorError
{
    fn from(value: plotters::drawing::DrawingAreaErrorKind<E>) -> Self {
        MonitorError::Plot(format!("{value:?}"))
    }
}
