//! # Serial links
//!
//! Byte channels to the rover's equipment. Hardware links are backed by
//! `serialport`, the simulation client provides in-memory links implementing
//! the same trait.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::debug;
use std::io::{self, Read, Write};
use std::time::Duration;
use thiserror::Error;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A bidirectional byte channel to a piece of equipment.
///
/// Reads must never block for longer than the link's configured timeout. A
/// read which times out returns either `Ok(0)` or an error of kind
/// `TimedOut`/`WouldBlock`.
pub trait SerialLink: Read + Write + Send {
    /// Number of bytes which can be read without blocking.
    fn bytes_to_read(&mut self) -> io::Result<usize>;

    /// Discard any unread input.
    fn clear_input(&mut self) -> io::Result<()>;
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A hardware serial port.
pub struct HwSerial {
    port: Box<dyn serialport::SerialPort>,
}

/// Splits the bytes arriving on a link into text lines.
#[derive(Default)]
pub struct LineReader {
    buffer: Vec<u8>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SerialError {
    #[error("Could not open serial port {0}: {1}")]
    OpenFailed(String, serialport::Error),
}

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Limit on the size of a partial line, protects against a link which never
/// sends a line ending.
const MAX_LINE_LEN: usize = 512;

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl HwSerial {
    /// Open the given port.
    pub fn open(path: &str, baud: u32, timeout: Duration) -> Result<Self, SerialError> {
        let port = serialport::new(path, baud)
            .timeout(timeout)
            .open()
            .map_err(|e| SerialError::OpenFailed(path.to_string(), e))?;

        debug!("Opened serial port {} at {} baud", path, baud);

        Ok(Self { port })
    }
}

impl Read for HwSerial {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for HwSerial {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl SerialLink for HwSerial {
    fn bytes_to_read(&mut self) -> io::Result<usize> {
        self.port
            .bytes_to_read()
            .map(|n| n as usize)
            .map_err(io::Error::from)
    }

    fn clear_input(&mut self) -> io::Result<()> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(io::Error::from)
    }
}

impl LineReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read whatever is available on the link without blocking and return the
    /// newest `max_lines` complete lines.
    ///
    /// Older complete lines are dropped so the returned data never lags the
    /// link. Only a trailing partial line stays buffered for the next call.
    pub fn read_lines(
        &mut self,
        link: &mut dyn SerialLink,
        max_lines: usize,
    ) -> io::Result<Vec<String>> {
        let available = link.bytes_to_read()?;

        if available > 0 {
            let mut chunk = vec![0u8; available];
            let n = match link.read(&mut chunk) {
                Ok(n) => n,
                Err(e)
                    if e.kind() == io::ErrorKind::TimedOut
                        || e.kind() == io::ErrorKind::WouldBlock =>
                {
                    0
                }
                Err(e) => return Err(e),
            };
            self.buffer.extend_from_slice(&chunk[..n]);
        }

        let mut lines = Vec::new();

        while let Some(end) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=end).collect();
            let line = String::from_utf8_lossy(&raw).trim().to_string();

            if !line.is_empty() {
                lines.push(line);
            }
        }

        if lines.len() > max_lines {
            let dropped = lines.len() - max_lines;
            debug!("Dropping {} stale lines", dropped);
            lines.drain(..dropped);
        }

        if self.buffer.len() > MAX_LINE_LEN {
            debug!("Discarding {} bytes with no line ending", self.buffer.len());
            self.buffer.clear();
        }

        Ok(lines)
    }

    /// Number of bytes waiting for a line ending.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// In-memory link for tests. Bytes pushed into `rx` are read by the link
    /// user, bytes written by the link user are collected in `tx`.
    ///
    /// Queued replies model a device answering a request: each write moves
    /// the next reply into `rx`.
    #[derive(Clone, Default)]
    pub struct MockLink {
        pub rx: Arc<Mutex<VecDeque<u8>>>,
        pub tx: Arc<Mutex<Vec<u8>>>,
        pub replies: Arc<Mutex<VecDeque<Vec<u8>>>>,
    }

    impl MockLink {
        pub fn push_rx(&self, bytes: &[u8]) {
            self.rx.lock().unwrap().extend(bytes.iter().copied());
        }

        pub fn queue_reply(&self, bytes: &[u8]) {
            self.replies.lock().unwrap().push_back(bytes.to_vec());
        }

        pub fn take_tx(&self) -> Vec<u8> {
            std::mem::take(&mut *self.tx.lock().unwrap())
        }
    }

    impl Read for MockLink {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let mut rx = self.rx.lock().unwrap();
            let n = buf.len().min(rx.len());
            for b in buf.iter_mut().take(n) {
                *b = rx.pop_front().unwrap();
            }
            Ok(n)
        }
    }

    impl Write for MockLink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.tx.lock().unwrap().extend_from_slice(buf);
            if let Some(reply) = self.replies.lock().unwrap().pop_front() {
                self.push_rx(&reply);
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SerialLink for MockLink {
        fn bytes_to_read(&mut self) -> io::Result<usize> {
            Ok(self.rx.lock().unwrap().len())
        }

        fn clear_input(&mut self) -> io::Result<()> {
            self.rx.lock().unwrap().clear();
            Ok(())
        }
    }

    #[test]
    fn test_line_reader_keeps_newest_lines() {
        let mut link = MockLink::default();
        for i in 0..12 {
            link.push_rx(format!("$LINE{}\r\n", i).as_bytes());
        }
        link.push_rx(b"$PARTIAL");

        let mut reader = LineReader::new();

        let lines = reader.read_lines(&mut link, 10).unwrap();
        assert_eq!(lines.len(), 10);
        assert_eq!(lines[0], "$LINE2");
        assert_eq!(lines[9], "$LINE11");

        // Only the partial line is kept, and waits for its ending
        assert!(reader.read_lines(&mut link, 10).unwrap().is_empty());

        link.push_rx(b",1\n");
        let lines = reader.read_lines(&mut link, 10).unwrap();
        assert_eq!(lines, vec!["$PARTIAL,1".to_string()]);
    }

    #[test]
    fn test_line_reader_sustained_overrun() {
        let mut link = MockLink::default();
        let mut reader = LineReader::new();

        // More lines arrive every call than are returned
        for cycle in 0..100 {
            for i in 0..15 {
                link.push_rx(format!("$GPXXX,{}\r\n", cycle * 15 + i).as_bytes());
            }

            let lines = reader.read_lines(&mut link, 10).unwrap();
            assert_eq!(lines.len(), 10);
            assert_eq!(
                lines.last().map(String::as_str),
                Some(format!("$GPXXX,{}", cycle * 15 + 14).as_str())
            );
            assert_eq!(reader.buffered_len(), 0);
        }
    }

    #[test]
    fn test_line_reader_discards_endless_line() {
        let mut link = MockLink::default();
        let mut reader = LineReader::new();

        link.push_rx(&[b'x'; MAX_LINE_LEN + 1]);
        assert!(reader.read_lines(&mut link, 10).unwrap().is_empty());
        assert_eq!(reader.buffered_len(), 0);

        link.push_rx(b"$OK\n");
        assert_eq!(reader.read_lines(&mut link, 10).unwrap(), vec!["$OK".to_string()]);
    }

    #[test]
    fn test_line_reader_no_data() {
        let mut link = MockLink::default();
        let mut reader = LineReader::new();
        assert!(reader.read_lines(&mut link, 10).unwrap().is_empty());
    }
}
