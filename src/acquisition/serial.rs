use std::io::{BufRead, BufReader, ErrorKind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use serialport::{ClearBuffer, SerialPort};
use crate::acquisition::{
    parse_capture_line, transfer_channel, EngineSettings, SamplingEngine, Transfer,
    TransferHandle, TransferSender,
};
use crate::error::MonitorError;
const READ_TIMEOUT: Duration = Duration::from_millis(100);
/// Reads the capture firmware's `time_ms,volts` text stream from a serial
/// port. The board samples on its own clock; this engine only gates which
/// lines are kept.
pub struct SerialEngine {
    port_name: String,
    baud_rate: u32,
    port: Option<Box<dyn SerialPort>>,
    settings: Option<EngineSettings>,
    epoch: Instant,
    running: Arc<AtomicBool>,
    halt: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}
impl SerialEngine {
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            port: None,
            settings: None,
            epoch: Instant::now(),
            running: Arc::new(AtomicBool::new(false)),
            halt: Arc::new(AtomicBool::new(false)),
            reader: None,
        }
    }
    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>, MonitorError> {
        self.port
            .as_mut()
            .ok_or_else(|| MonitorError::HardwareFault("serial port used before configure".into()))
    }
    fn join_reader(&mut self) -> Result<(), MonitorError> {
        if let Some(reader) = self.reader.take() {
            reader
                .join()
                .map_err(|_| MonitorError::HardwareFault("serial reader panicked".into()))?;
        }
        Ok(())
    }
}
impl SamplingEngine for SerialEngine {
    fn configure(&mut self, settings: &EngineSettings) -> Result<(), MonitorError> {
        let port = serialport::new(&self.port_name, self.baud_rate)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| {
                MonitorError::HardwareInitFailure(format!("cannot open {}: {e}", self.port_name))
            })?;
        log::info!("serial capture on {} at {} baud", self.port_name, self.baud_rate);
        self.port = Some(port);
        self.settings = Some(settings.clone());
        Ok(())
    }
    /// Discards unread input; the count is in bytes.
    fn drain(&mut self) -> Result<usize, MonitorError> {
        let port = self.port()?;
        let pending = port.bytes_to_read()? as usize;
        port.clear(ClearBuffer::Input)?;
        Ok(pending)
    }
    fn start(&mut self) -> Result<(), MonitorError> {
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }
    fn stop(&mut self) -> Result<(), MonitorError> {
        self.running.store(false, Ordering::SeqCst);
        self.halt.store(true, Ordering::SeqCst);
        self.join_reader()
    }
    fn arm(&mut self, count: usize) -> Result<TransferHandle, MonitorError> {
        self.join_reader()?;
        let settings = self
            .settings
            .clone()
            .ok_or_else(|| MonitorError::HardwareFault("serial port used before configure".into()))?;
        let port = self.port()?.try_clone()?;
        let (sender, handle) = transfer_channel();
        self.halt.store(false, Ordering::SeqCst);
        let running = self.running.clone();
        let halt = self.halt.clone();
        let epoch = self.epoch;
        self.reader = Some(thread::spawn(move || {
            let gate = ReadGate {
                running: &running,
                halt: &halt,
                epoch,
            };
            read_block(BufReader::new(port), count, &settings, gate, sender)
        }));
        Ok(handle)
    }
}
impl Drop for SerialEngine {
    fn drop(&mut self) {
        self.stop().ok();
    }
}
/// Engine flags the reader thread watches between lines.
struct ReadGate<'a> {
    running: &'a AtomicBool,
    halt: &'a AtomicBool,
    epoch: Instant,
}
/// Collects `count` samples from the text stream into one transfer. Lines
/// arriving while the engine is stopped are discarded; a partial line is
/// kept across read timeouts until its newline arrives.
fn read_block<R: BufRead>(
    mut reader: R,
    count: usize,
    settings: &EngineSettings,
    gate: ReadGate<'_>,
    sender: TransferSender,
) {
    let mut line = String::new();
    let mut codes = Vec::with_capacity(count);
    let mut first_sample_ms = 0.0;
    while codes.len() < count {
        if sender.is_cancelled() || gate.halt.load(Ordering::SeqCst) {
            return;
        }
        match reader.read_line(&mut line) {
            Ok(0) => {
                sender.fail(MonitorError::HardwareFault("serial stream closed".into()));
                return;
            }
            Ok(_) => {
                if gate.running.load(Ordering::SeqCst) {
                    if let Some((_, volts)) = parse_capture_line(&line) {
                        if codes.is_empty() {
                            first_sample_ms = gate.epoch.elapsed().as_secs_f64() * 1000.0;
                        }
                        codes.push(settings.code_for(volts));
                    }
                }
                line.clear();
            }
            Err(e) if e.kind() == ErrorKind::TimedOut => continue,
            Err(e) if e.kind() == ErrorKind::InvalidData => line.clear(),
            Err(e) => {
                sender.fail(MonitorError::HardwareFault(format!("serial read failed: {e}")));
                return;
            }
        }
    }
    sender.complete(Transfer {
        codes,
        first_sample_ms,
    });
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitorConfig;
    use std::collections::VecDeque;
    use std::io::{self, Cursor, Read};
    use std::time::Duration;
    /// Port stand-in that hands out scripted chunks, then reports end of stream.
    struct ScriptedPort {
        chunks: VecDeque<io::Result<Vec<u8>>>,
    }
    impl ScriptedPort {
        fn new(chunks: Vec<io::Result<&[u8]>>) -> Self {
            Self {
                chunks: chunks.into_iter().map(|c| c.map(<[u8]>::to_vec)).collect(),
            }
        }
    }
    impl Read for ScriptedPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.chunks.pop_front() {
                None => Ok(0),
                Some(Err(e)) => Err(e),
                Some(Ok(mut chunk)) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    if n < chunk.len() {
                        self.chunks.push_front(Ok(chunk.split_off(n)));
                    }
                    Ok(n)
                }
            }
        }
    }
    fn settings() -> EngineSettings {
        EngineSettings::from_config(&MonitorConfig::default())
    }
    fn collect<R: BufRead>(
        reader: R,
        count: usize,
        running: bool,
        halt: bool,
    ) -> Result<Transfer, MonitorError> {
        let (running, halt) = (AtomicBool::new(running), AtomicBool::new(halt));
        let (sender, handle) = transfer_channel();
        let gate = ReadGate {
            running: &running,
            halt: &halt,
            epoch: Instant::now(),
        };
        read_block(reader, count, &settings(), gate, sender);
        handle.wait(Duration::from_millis(10))
    }
    #[test]
    fn skips_banner_lines_and_converts_volts() {
        let dump = "Starting new capture at 1000 Hz for 3 samples...\n\
                    Time(ms),Voltage(V)\n\
                    0.0,1.650\n\
                    1.0,0.000\n\
                    2.0,3.300\n";
        let transfer = collect(Cursor::new(dump), 3, true, false).unwrap();
        assert_eq!(transfer.codes, vec![2048, 0, 4095]);
    }
    #[test]
    fn partial_line_survives_read_timeout() {
        let port = ScriptedPort::new(vec![
            Ok(&b"0.0,1.6"[..]),
            Err(io::Error::new(ErrorKind::TimedOut, "no data yet")),
            Ok(&b"50\n1.0,1.000\n"[..]),
        ]);
        let transfer = collect(BufReader::new(port), 2, true, false).unwrap();
        assert_eq!(transfer.codes, vec![2048, 1241]);
    }
    #[test]
    fn lines_are_dropped_while_stopped() {
        let result = collect(Cursor::new("0.0,1.0\n1.0,1.0\n"), 1, false, false);
        assert!(matches!(result, Err(MonitorError::HardwareFault(_))));
    }
    #[test]
    fn halt_abandons_the_transfer() {
        let result = collect(Cursor::new("0.0,1.0\n"), 1, true, true);
        assert!(
            matches!(result, Err(MonitorError::HardwareFault(msg)) if msg.contains("abandoned"))
        );
    }
    #[test]
    fn closed_stream_fails_the_transfer() {
        let result = collect(Cursor::new("0.0,1.0\n"), 2, true, false);
        assert!(matches!(result, Err(MonitorError::HardwareFault(msg)) if msg.contains("closed")));
    }
    #[test]
    fn missing_port_fails_to_configure() {
        let mut engine = SerialEngine::new("/dev/ecg-monitor-no-such-port", 115_200);
        assert!(matches!(
            engine.configure(&settings()),
            Err(MonitorError::HardwareInitFailure(_))
        ));
    }
}
