//! Serial glue between the port and the XMODEM sender.
//!
//! While an upload runs, the bootloader interleaves human-readable
//! diagnostics with the protocol's single-byte answers. The adapter hands the
//! sender only lone control bytes; anything else is read up to the end of its
//! line and forwarded to a diagnostic sink, then the read starts over.

use crate::error::{Error, Result};
use crate::port::Port;
use crate::protocol::line::read_line;
use crate::protocol::xmodem::{TransferIo, control};
use log::{info, trace};
use std::io::ErrorKind;
use std::time::Duration;

/// Default sink: log device output at info level.
pub fn log_device_line(line: &[u8]) {
    info!("device: {}", String::from_utf8_lossy(line));
}

/// Read/write callbacks handed to the XMODEM sender.
pub struct TransferAdapter<'a, P: Port + ?Sized, S = fn(&[u8])> {
    port: &'a mut P,
    sink: S,
    max_noise_lines: Option<u32>,
    interrupted: fn() -> bool,
}

impl<'a, P: Port + ?Sized> TransferAdapter<'a, P> {
    /// Create an adapter that logs device output.
    pub fn new(port: &'a mut P) -> Self {
        Self {
            port,
            sink: log_device_line,
            max_noise_lines: None,
            interrupted: crate::is_interrupted_requested,
        }
    }
}

impl<'a, P, S> TransferAdapter<'a, P, S>
where
    P: Port + ?Sized,
    S: FnMut(&[u8]),
{
    /// Create an adapter forwarding device output to `sink`.
    pub fn with_sink(port: &'a mut P, sink: S) -> Self {
        Self {
            port,
            sink,
            max_noise_lines: None,
            interrupted: crate::is_interrupted_requested,
        }
    }

    /// Fail a read after this many consecutive diagnostic lines.
    ///
    /// `None` keeps reading for as long as the device talks.
    #[must_use]
    pub fn with_max_noise_lines(mut self, max: Option<u32>) -> Self {
        self.max_noise_lines = max;
        self
    }

    /// Stop reads with [`Error::Interrupted`] when `checker` returns `true`.
    #[must_use]
    pub fn with_interrupt_checker(mut self, checker: fn() -> bool) -> Self {
        self.interrupted = checker;
        self
    }

    /// Read up to `size` bytes, stopping early on timeout.
    fn read_up_to(&mut self, size: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; size];
        let mut filled = 0;

        while filled < size {
            match self.port.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                    break;
                },
                Err(e) if e.kind() == ErrorKind::Interrupted => {},
                Err(e) => return Err(Error::Io(e)),
            }
        }

        buf.truncate(filled);
        Ok(buf)
    }

    /// Read `size` bytes for the sender, skipping diagnostic lines.
    ///
    /// Returns `None` if nothing arrived within `timeout`, leaving the retry
    /// decision to the sender. A lone control byte is returned as soon as it
    /// is read; any other data is completed to the end of its line, handed to
    /// the sink, and the read is repeated.
    pub fn read_byte_or_control(
        &mut self,
        size: usize,
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>> {
        self.port.set_timeout(timeout)?;
        let mut noise_lines: u32 = 0;

        loop {
            if (self.interrupted)() {
                return Err(Error::Interrupted);
            }

            let mut data = self.read_up_to(size)?;
            if data.is_empty() {
                return Ok(None);
            }
            if data.len() == 1 && control::is_control(data[0]) {
                trace!("Control byte 0x{:02X}", data[0]);
                return Ok(Some(data));
            }

            if data.last() != Some(&b'\n') {
                data.extend(read_line(&mut *self.port)?);
            }
            while matches!(data.last(), Some(b'\r' | b'\n')) {
                data.pop();
            }
            if !data.is_empty() {
                (self.sink)(&data);
            }

            noise_lines += 1;
            if let Some(max) = self.max_noise_lines {
                if noise_lines > max {
                    return Err(Error::Transfer(format!(
                        "no protocol response after {max} lines of device output"
                    )));
                }
            }
        }
    }

    /// Write all of `data` and return its length.
    ///
    /// The write is blocking; `timeout` is accepted for the sender's
    /// interface but not enforced here.
    pub fn write_bytes(&mut self, data: &[u8], _timeout: Duration) -> Result<usize> {
        self.port.write_all_bytes(data)?;
        Ok(data.len())
    }
}

impl<P, S> TransferIo for TransferAdapter<'_, P, S>
where
    P: Port + ?Sized,
    S: FnMut(&[u8]),
{
    fn read_bytes(&mut self, size: usize, timeout: Duration) -> Result<Option<Vec<u8>>> {
        self.read_byte_or_control(size, timeout)
    }

    fn write_bytes(&mut self, data: &[u8], timeout: Duration) -> Result<usize> {
        TransferAdapter::write_bytes(self, data, timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockSerial;

    const T: Duration = Duration::from_millis(10);

    #[test]
    fn test_control_byte_returned_without_reading_further() {
        let mut port = MockSerial::new(&[control::ACK, b'x', b'\n']);
        let mut lines: Vec<Vec<u8>> = Vec::new();

        let got = TransferAdapter::with_sink(&mut port, |l: &[u8]| lines.push(l.to_vec()))
            .read_byte_or_control(1, T)
            .unwrap();

        assert_eq!(got, Some(vec![control::ACK]));
        assert!(lines.is_empty());
        assert_eq!(port.remaining(), b"x\n");
    }

    #[test]
    fn test_diagnostic_line_is_forwarded_then_control_returned() {
        let mut port = MockSerial::new(b"Erasing flash...\r\n\x15");
        let mut lines: Vec<Vec<u8>> = Vec::new();

        let got = TransferAdapter::with_sink(&mut port, |l: &[u8]| lines.push(l.to_vec()))
            .read_byte_or_control(1, T)
            .unwrap();

        assert_eq!(got, Some(vec![control::NAK]));
        assert_eq!(lines, vec![b"Erasing flash...".to_vec()]);
    }

    #[test]
    fn test_timeout_returns_none() {
        let mut port = MockSerial::new(&[]);
        let got = TransferAdapter::new(&mut port)
            .read_byte_or_control(1, T)
            .unwrap();
        assert_eq!(got, None);
        assert_eq!(port.timeout(), T);
    }

    #[test]
    fn test_multi_byte_read_is_treated_as_text() {
        let mut port = MockSerial::new(b"\x06\x06 tail\n\x06");
        let mut lines: Vec<Vec<u8>> = Vec::new();

        let got = TransferAdapter::with_sink(&mut port, |l: &[u8]| lines.push(l.to_vec()))
            .read_byte_or_control(2, T)
            .unwrap();

        assert_eq!(lines, vec![b"\x06\x06 tail".to_vec()]);
        assert_eq!(got, Some(vec![control::ACK]));
    }

    #[test]
    fn test_noise_limit() {
        let mut port = MockSerial::new(b"a\nb\nc\n\x06");

        let err = TransferAdapter::with_sink(&mut port, |_: &[u8]| {})
            .with_max_noise_lines(Some(2))
            .read_byte_or_control(1, T)
            .unwrap_err();

        assert!(matches!(err, Error::Transfer(_)));
    }

    #[test]
    fn test_noise_within_limit_is_skipped() {
        let mut port = MockSerial::new(b"a\nb\n\x43");

        let got = TransferAdapter::with_sink(&mut port, |_: &[u8]| {})
            .with_max_noise_lines(Some(2))
            .read_byte_or_control(1, T)
            .unwrap();

        assert_eq!(got, Some(vec![control::C]));
    }

    #[test]
    fn test_interrupted_read_leaves_input_alone() {
        let mut port = MockSerial::new(&[control::ACK]);

        let err = TransferAdapter::new(&mut port)
            .with_interrupt_checker(|| true)
            .read_byte_or_control(1, T)
            .unwrap_err();

        assert!(matches!(err, Error::Interrupted));
        assert_eq!(port.remaining(), vec![control::ACK]);
    }

    #[test]
    fn test_write_bytes() {
        let mut port = MockSerial::new(&[]);
        let n = TransferAdapter::new(&mut port)
            .write_bytes(b"\x01\x01\xfe", T)
            .unwrap();

        assert_eq!(n, 3);
        assert_eq!(port.written(), b"\x01\x01\xfe");
    }
}
