use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use crate::acquisition::{
    transfer_channel, EngineSettings, SamplingEngine, Transfer, TransferHandle, TransferSender,
};
use crate::error::MonitorError;
/// Parses one `time_ms,volts` data line of a capture dump. Headers, banners
/// and blank lines yield `None`.
pub fn parse_capture_line(line: &str) -> Option<(f32, f32)> {
    let mut fields = line.trim().split(',');
    let time_ms = fields.next()?.trim().parse::<f32>().ok()?;
    let volts = fields.next()?.trim().parse::<f32>().ok()?;
    if fields.next().is_some() {
        return None;
    }
    Some((time_ms, volts))
}
/// Reads every data line of a capture dump.
pub fn read_capture<R: BufRead>(reader: R) -> Result<Vec<(f32, f32)>, MonitorError> {
    let mut samples = Vec::new();
    for line in reader.lines() {
        if let Some(sample) = parse_capture_line(&line?) {
            samples.push(sample);
        }
    }
    Ok(samples)
}
/// Plays a recorded capture back as if it came off the converter, one block
/// per transfer, wrapping around at the end of the recording.
pub struct ReplayEngine {
    voltages: Vec<f32>,
    codes: Vec<u16>,
    cursor: usize,
    served: u64,
    sample_rate_hz: f32,
    pending: Option<(TransferSender, usize)>,
}
impl ReplayEngine {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MonitorError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            MonitorError::HardwareInitFailure(format!("cannot open {}: {e}", path.display()))
        })?;
        let samples = read_capture(BufReader::new(file))?;
        log::info!("loaded {} samples from {}", samples.len(), path.display());
        Ok(Self::from_voltages(samples.into_iter().map(|(_, v)| v).collect()))
    }
    pub fn from_voltages(voltages: Vec<f32>) -> Self {
        Self {
            voltages,
            codes: Vec::new(),
            cursor: 0,
            served: 0,
            sample_rate_hz: 0.0,
            pending: None,
        }
    }
    pub fn len(&self) -> usize {
        self.voltages.len()
    }
    pub fn is_empty(&self) -> bool {
        self.voltages.is_empty()
    }
}
impl SamplingEngine for ReplayEngine {
    fn configure(&mut self, settings: &EngineSettings) -> Result<(), MonitorError> {
        if self.voltages.is_empty() {
            return Err(MonitorError::HardwareInitFailure(
                "recording contains no samples".into(),
            ));
        }
        self.codes = self.voltages.iter().map(|&v| settings.code_for(v)).collect();
        self.sample_rate_hz = settings.sample_rate_hz;
        Ok(())
    }
    fn drain(&mut self) -> Result<usize, MonitorError> {
        Ok(0)
    }
    fn start(&mut self) -> Result<(), MonitorError> {
        let Some((sender, count)) = self.pending.take() else {
            return Ok(());
        };
        if self.codes.is_empty() {
            sender.fail(MonitorError::HardwareFault("replay started before configure".into()));
            return Ok(());
        }
        let first_sample_ms = self.served as f64 * 1000.0 / self.sample_rate_hz as f64;
        let codes: Vec<u16> = self
            .codes
            .iter()
            .cycle()
            .skip(self.cursor)
            .take(count)
            .copied()
            .collect();
        self.cursor = (self.cursor + count) % self.codes.len();
        self.served += count as u64;
        sender.complete(Transfer {
            codes,
            first_sample_ms,
        });
        Ok(())
    }
    fn stop(&mut self) -> Result<(), MonitorError> {
        Ok(())
    }
    fn arm(&mut self, count: usize) -> Result<TransferHandle, MonitorError> {
        let (sender, handle) = transfer_channel();
        self.pending = Some((sender, count));
        Ok(handle)
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitorConfig;
    use std::io::Cursor;
    use std::time::Duration;
    const DUMP: &str = "Starting new capture at 1000 Hz for 5 samples...\n\
                        Time(ms),Voltage(V)\n\
                        0.0,1.650\n\
                        1.0,1.700\n\
                        2.0,3.300\n\
                        3.0,0.000\n\
                        4.0,1.000\n\
                        Capture complete\n\n";
    #[test]
    fn parses_only_data_lines() {
        assert_eq!(parse_capture_line(" 12.0, 1.234 "), Some((12.0, 1.234)));
        assert_eq!(parse_capture_line("Time(ms),Voltage(V)"), None);
        assert_eq!(parse_capture_line("Capture complete"), None);
        assert_eq!(parse_capture_line("1,2,3"), None);
        let samples = read_capture(Cursor::new(DUMP)).unwrap();
        assert_eq!(samples.len(), 5);
        assert_eq!(samples[2], (2.0, 3.3));
    }
    #[test]
    fn replays_blocks_with_wraparound() {
        let samples = read_capture(Cursor::new(DUMP)).unwrap();
        let mut engine = ReplayEngine::from_voltages(samples.iter().map(|s| s.1).collect());
        let settings = EngineSettings::from_config(&MonitorConfig::default());
        engine.configure(&settings).unwrap();
        let timeout = Duration::from_millis(10);
        let handle = engine.arm(3).unwrap();
        engine.start().unwrap();
        let first = handle.wait(timeout).unwrap();
        assert_eq!(first.codes, vec![2048, 2110, 4095]);
        assert_eq!(first.first_sample_ms, 0.0);
        let handle = engine.arm(3).unwrap();
        engine.start().unwrap();
        let second = handle.wait(timeout).unwrap();
        assert_eq!(second.codes, vec![0, 1241, 2048]);
        assert_eq!(second.first_sample_ms, 3.0);
    }
    #[test]
    fn empty_recording_fails_to_initialize() {
        let mut engine = ReplayEngine::from_voltages(Vec::new());
        let settings = EngineSettings::from_config(&MonitorConfig::default());
        assert!(matches!(
            engine.configure(&settings),
            Err(MonitorError::HardwareInitFailure(_))
        ));
    }
}
