// HILBENCH SERIAL CHANNEL
// ONE OWNED PORT PER CHANNEL. DROPPING THE CHANNEL CLOSES THE PORT.
// THE PORT'S OWN READ TIMEOUT BOUNDS EVERY read_line() CALL.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::time::Duration;

use crate::error::ChannelError;

// NOISE WITHOUT A NEWLINE MUST NOT GROW THE BUFFER FOREVER
pub const MAX_LINE_BYTES: usize = 4096;

/// Something that can produce a fresh port. Called again after every failure.
pub trait Open: Send {
    type Port: Read + Write + Send;

    fn open(&mut self) -> Result<Self::Port, ChannelError>;

    fn name(&self) -> &str;
}

/// A real tty, opened 8N1 without flow control.
#[derive(Debug, Clone)]
pub struct SerialDevice {
    path: String,
    baud: u32,
    timeout: Duration,
}

impl SerialDevice {
    pub fn new(path: impl Into<String>, baud: u32, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            baud,
            timeout,
        }
    }
}

impl Open for SerialDevice {
    type Port = Box<dyn serialport::SerialPort>;

    fn open(&mut self) -> Result<Self::Port, ChannelError> {
        serialport::new(&self.path, self.baud)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(self.timeout)
            .open()
            .map_err(|source| ChannelError::Connect {
                path: self.path.clone(),
                source,
            })
    }

    fn name(&self) -> &str {
        &self.path
    }
}

pub struct SerialChannel<P> {
    reader: BufReader<P>,
    pending: Vec<u8>,
}

impl<P: Read + Write> SerialChannel<P> {
    pub fn new(port: P) -> Self {
        Self {
            reader: BufReader::new(port),
            pending: Vec::new(),
        }
    }

    /// Read one newline-terminated line, without its terminator.
    ///
    /// A partial line left by a timeout is kept and completed by the next call.
    pub fn read_line(&mut self) -> Result<String, ChannelError> {
        let result = self.reader.read_until(b'\n', &mut self.pending);

        if self.pending.len() > MAX_LINE_BYTES && !self.pending.ends_with(b"\n") {
            self.pending.clear();
            return Err(ChannelError::Decode);
        }

        match result {
            Ok(0) => Err(ChannelError::Closed),
            Ok(_) if self.pending.ends_with(b"\n") => {
                let mut raw = std::mem::take(&mut self.pending);
                raw.pop();
                if raw.ends_with(b"\r") {
                    raw.pop();
                }
                String::from_utf8(raw).map_err(|_| ChannelError::Decode)
            }
            // read_until ONLY STOPS SHORT OF THE DELIMITER AT EOF
            Ok(_) => {
                self.pending.clear();
                Err(ChannelError::Closed)
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                Err(ChannelError::Timeout)
            }
            Err(e) => Err(ChannelError::Read(e)),
        }
    }

    pub fn write(&mut self, bytes: &[u8]) -> Result<(), ChannelError> {
        let port = self.reader.get_mut();
        port.write_all(bytes).map_err(ChannelError::Write)?;
        port.flush().map_err(ChannelError::Write)
    }
}
