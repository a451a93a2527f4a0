//! Line-oriented transport over the half-duplex serial radio.

use serialport::SerialPort;
use std::io::{ErrorKind, Read, Write};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::info;

use super::LinkError;

/// Blocking text-line transport.
///
/// `read_line` returns `Ok(None)` when no complete line arrived within the
/// transport's read timeout, so an RX loop can poll for cancellation between
/// reads without busy-waiting.
pub trait LineTransport: Send {
    fn read_line(&mut self) -> Result<Option<String>, LinkError>;
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), LinkError>;
}

/// Serial half of the link, 8N1 with a short read timeout.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    pending: Vec<u8>,
}

impl SerialTransport {
    /// Open the configured port and clone a second handle, yielding
    /// independent reader and writer halves for the RX task and the
    /// transmitter.
    pub fn open_pair(path: &str, baud: u32) -> Result<(Self, Self), LinkError> {
        let port = serialport::new(path, baud)
            .timeout(Duration::from_millis(200))
            .open()?;
        let writer = port.try_clone()?;

        info!("Opened serial port {} at {} baud", path, baud);

        Ok((
            Self {
                port,
                pending: Vec::new(),
            },
            Self {
                port: writer,
                pending: Vec::new(),
            },
        ))
    }
}

impl LineTransport for SerialTransport {
    fn read_line(&mut self) -> Result<Option<String>, LinkError> {
        let mut byte = [0u8; 1];
        loop {
            match self.port.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => {
                    if byte[0] == b'\n' {
                        let line = String::from_utf8_lossy(&self.pending)
                            .trim()
                            .to_string();
                        self.pending.clear();
                        return Ok(Some(line));
                    }
                    self.pending.push(byte[0]);
                }
                Err(e) if e.kind() == ErrorKind::TimedOut => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }
}

/// In-memory transport for tests: inbound lines come from a channel, written
/// bytes accumulate in a shared buffer.
pub struct MockTransport {
    rx: Option<mpsc::Receiver<String>>,
    written: Arc<Mutex<Vec<u8>>>,
    fail_writes: bool,
}

impl MockTransport {
    pub fn new() -> (Self, mpsc::Sender<String>, Arc<Mutex<Vec<u8>>>) {
        let (tx, rx) = mpsc::channel();
        let written = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                rx: Some(rx),
                written: written.clone(),
                fail_writes: false,
            },
            tx,
            written,
        )
    }

    /// Writer-only mock; `read_line` always times out.
    pub fn writer_only() -> (Self, Arc<Mutex<Vec<u8>>>) {
        let written = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                rx: None,
                written: written.clone(),
                fail_writes: false,
            },
            written,
        )
    }

    pub fn failing_writer() -> Self {
        Self {
            rx: None,
            written: Arc::new(Mutex::new(Vec::new())),
            fail_writes: true,
        }
    }
}

impl LineTransport for MockTransport {
    fn read_line(&mut self) -> Result<Option<String>, LinkError> {
        let Some(rx) = &self.rx else {
            return Ok(None);
        };
        match rx.recv_timeout(Duration::from_millis(10)) {
            Ok(line) => Ok(Some(line)),
            Err(mpsc::RecvTimeoutError::Timeout) => Ok(None),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(LinkError::TransportClosed),
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        if self.fail_writes {
            return Err(LinkError::Io(std::io::Error::new(
                ErrorKind::BrokenPipe,
                "mock write failure",
            )));
        }
        self.written
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend_from_slice(bytes);
        Ok(())
    }
}
