// SCRIPTED SERIAL PORTS FOR THE END-TO-END TESTS
// TELEMETRY: BYTES ARRIVE THROUGH AN mpsc CHANNEL. EMPTY CHANNEL READS AS A
// PORT TIMEOUT, A DROPPED SENDER READS AS EOF (DEVICE GONE).
// CONTROL: EVERY WRITE IS RECORDED FOR INSPECTION.

#![allow(dead_code)]

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use hilbench::error::ChannelError;
use hilbench::serial::Open;

const PORT_TIMEOUT: Duration = Duration::from_millis(20);

pub struct ScriptedPort {
    rx: Receiver<Vec<u8>>,
    buf: Vec<u8>,
    pos: usize,
}

impl Read for ScriptedPort {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.buf.len() {
            match self.rx.recv_timeout(PORT_TIMEOUT) {
                Ok(bytes) => {
                    self.buf = bytes;
                    self.pos = 0;
                }
                Err(RecvTimeoutError::Timeout) => {
                    return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
                }
                Err(RecvTimeoutError::Disconnected) => return Ok(0),
            }
        }
        let n = out.len().min(self.buf.len() - self.pos);
        out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

impl Write for ScriptedPort {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn unavailable(path: &str) -> ChannelError {
    ChannelError::Connect {
        path: path.to_string(),
        source: serialport::Error::new(serialport::ErrorKind::NoDevice, "scripted port gone"),
    }
}

/// Hands out one scripted port, then reports the device as missing.
pub struct ScriptedOpener {
    port: Option<ScriptedPort>,
    opens: Arc<AtomicUsize>,
}

impl Open for ScriptedOpener {
    type Port = ScriptedPort;

    fn open(&mut self) -> Result<ScriptedPort, ChannelError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.port.take().ok_or_else(|| unavailable("telemetry"))
    }

    fn name(&self) -> &str {
        "telemetry"
    }
}

/// Test side of a scripted telemetry device.
pub struct Feed {
    tx: Option<Sender<Vec<u8>>>,
    opens: Arc<AtomicUsize>,
}

impl Feed {
    pub fn line(&self, text: &str) {
        if let Some(tx) = &self.tx {
            tx.send(format!("{text}\n").into_bytes()).unwrap();
        }
    }

    /// Bytes exactly as given, no newline added.
    pub fn raw(&self, bytes: &[u8]) {
        if let Some(tx) = &self.tx {
            tx.send(bytes.to_vec()).unwrap();
        }
    }

    pub fn iterations(&self, range: impl IntoIterator<Item = u64>) {
        for n in range {
            self.line(&format!("iteration: {n}"));
        }
    }

    pub fn sender(&self) -> Sender<Vec<u8>> {
        self.tx.clone().unwrap()
    }

    /// Unplug the device and wait until the reader has drained every queued
    /// line and tried to reconnect.
    pub fn unplug_and_drain(&mut self) {
        self.tx = None;
        let deadline = Instant::now() + Duration::from_secs(5);
        while self.opens.load(Ordering::SeqCst) < 2 {
            assert!(Instant::now() < deadline, "reader never drained the scripted port");
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}

pub fn telemetry() -> (ScriptedOpener, Feed) {
    let (tx, rx) = mpsc::channel();
    let opens = Arc::new(AtomicUsize::new(0));
    let opener = ScriptedOpener {
        port: Some(ScriptedPort { rx, buf: Vec::new(), pos: 0 }),
        opens: opens.clone(),
    };
    (opener, Feed { tx: Some(tx), opens })
}

pub struct RecordingPort {
    written: Arc<Mutex<Vec<u8>>>,
}

impl Read for RecordingPort {
    fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::TimedOut, "control never talks back"))
    }
}

impl Write for RecordingPort {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.written.lock().unwrap().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub struct RecordingOpener {
    written: Arc<Mutex<Vec<u8>>>,
}

impl Open for RecordingOpener {
    type Port = RecordingPort;

    fn open(&mut self) -> Result<RecordingPort, ChannelError> {
        Ok(RecordingPort { written: self.written.clone() })
    }

    fn name(&self) -> &str {
        "control"
    }
}

pub fn control() -> (RecordingOpener, Arc<Mutex<Vec<u8>>>) {
    let written = Arc::new(Mutex::new(Vec::new()));
    (RecordingOpener { written: written.clone() }, written)
}

/// A device that is never there.
pub struct MissingOpener;

impl Open for MissingOpener {
    type Port = RecordingPort;

    fn open(&mut self) -> Result<RecordingPort, ChannelError> {
        Err(unavailable("control"))
    }

    fn name(&self) -> &str {
        "control"
    }
}

/// Poll `cond` until it holds, failing the test after five seconds.
pub fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(10));
    }
}

pub fn read_lines(path: &std::path::Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}
