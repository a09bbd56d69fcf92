use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use crate::acquisition::RawSampleBlock;
use crate::error::MonitorError;
/// Appends every captured block to a text dump in the capture firmware's
/// format, so the file can be fed back through the replay source.
pub struct CaptureRecorder<W: Write> {
    writer: W,
    captures: u64,
}
impl CaptureRecorder<BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, MonitorError> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        log::info!("recording captures to {}", path.display());
        Ok(Self::new(BufWriter::new(file)))
    }
}
impl<W: Write> CaptureRecorder<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            captures: 0,
        }
    }
    /// Writes one capture. `volts` holds the converted (unfiltered) samples of
    /// `block`, index for index.
    pub fn write_capture(
        &mut self,
        block: &RawSampleBlock,
        volts: &[f32],
    ) -> Result<(), MonitorError> {
        let w = &mut self.writer;
        writeln!(
            w,
            "Starting new capture at {:.0} Hz for {} samples...",
            block.sample_rate_hz,
            volts.len()
        )?;
        writeln!(w, "Time(ms),Voltage(V)")?;
        for (i, v) in volts.iter().enumerate() {
            writeln!(w, "{:.1},{:.3}", block.sample_time_ms(i), v)?;
        }
        writeln!(w, "Capture complete")?;
        writeln!(w)?;
        w.flush()?;
        self.captures += 1;
        Ok(())
    }
    pub fn captures(&self) -> u64 {
        self.captures
    }
    pub fn into_inner(self) -> W {
        self.writer
    }
}
