//! Line-oriented reads from the bootloader.

use crate::error::{Error, Result};
use log::{debug, trace};
use std::io::{ErrorKind, Read};
use std::time::{Duration, Instant};

/// Longest line kept before it is cut off.
pub const MAX_LINE_LEN: usize = 4096;

/// Default pause between two line reads while waiting for a response.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Read one line, byte by byte.
///
/// The line ends at `\n`, at a read timeout, at end of stream, or after
/// [`MAX_LINE_LEN`] bytes. Trailing `\r`/`\n` are removed, so a timeout with
/// nothing received yields an empty line.
pub fn read_line<R: Read + ?Sized>(port: &mut R) -> Result<Vec<u8>> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];

    while line.len() < MAX_LINE_LEN {
        match port.read(&mut byte) {
            Ok(0) => break,
            Ok(_) => {
                line.push(byte[0]);
                if byte[0] == b'\n' {
                    break;
                }
            },
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => break,
            Err(e) if e.kind() == ErrorKind::Interrupted => {},
            Err(e) => return Err(Error::Io(e)),
        }
    }

    while matches!(line.last(), Some(b'\r' | b'\n')) {
        line.pop();
    }
    trace!("Read line: {:?}", String::from_utf8_lossy(&line));
    Ok(line)
}

/// Polls for a response line matching a predicate.
#[derive(Debug, Clone, Copy)]
pub struct LineWaiter {
    poll_interval: Duration,
    timeout: Option<Duration>,
    interrupted: fn() -> bool,
}

impl Default for LineWaiter {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl LineWaiter {
    /// Create a waiter without a deadline.
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            timeout: None,
            interrupted: crate::is_interrupted_requested,
        }
    }

    /// Give up after `timeout`; `None` waits until a match or interruption.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Stop with [`Error::Interrupted`] when `checker` returns `true`.
    ///
    /// Defaults to the checker registered with
    /// [`set_interrupt_checker`](crate::set_interrupt_checker).
    #[must_use]
    pub fn with_interrupt_checker(mut self, checker: fn() -> bool) -> Self {
        self.interrupted = checker;
        self
    }

    /// The pause between line reads.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// The deadline, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Read lines until one satisfies `predicate` and return it.
    ///
    /// Without a timeout this blocks until the device answers or the
    /// embedding application requests interruption.
    pub fn wait_for<R, F>(&self, port: &mut R, predicate: F) -> Result<Vec<u8>>
    where
        R: Read + ?Sized,
        F: Fn(&[u8]) -> bool,
    {
        let start = Instant::now();

        loop {
            if (self.interrupted)() {
                return Err(Error::Interrupted);
            }

            let line = read_line(port)?;
            if predicate(&line) {
                return Ok(line);
            }
            if !line.is_empty() {
                debug!("Ignoring device line: {}", String::from_utf8_lossy(&line));
            }

            if let Some(timeout) = self.timeout {
                if start.elapsed() >= timeout {
                    return Err(Error::Timeout(format!(
                        "no matching response within {timeout:?}"
                    )));
                }
            }

            std::thread::sleep(self.poll_interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::response::{is_info_line, is_ready_line};
    use std::collections::VecDeque;

    /// Reader that times out once its data is drained.
    struct MockSerial {
        read_buf: VecDeque<u8>,
        reads: usize,
    }

    impl MockSerial {
        fn new(data: &[u8]) -> Self {
            Self {
                read_buf: data.iter().copied().collect(),
                reads: 0,
            }
        }
    }

    impl Read for MockSerial {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.reads += 1;
            if self.read_buf.is_empty() {
                return Err(std::io::Error::new(ErrorKind::TimedOut, "no data"));
            }
            let n = buf.len().min(self.read_buf.len());
            for b in buf.iter_mut().take(n) {
                *b = self.read_buf.pop_front().unwrap();
            }
            Ok(n)
        }
    }

    #[test]
    fn test_read_line_strips_line_ending() {
        let mut port = MockSerial::new(b"Ready\r\nnext");
        assert_eq!(read_line(&mut port).unwrap(), b"Ready");
        assert_eq!(read_line(&mut port).unwrap(), b"next");
        assert!(read_line(&mut port).unwrap().is_empty());
    }

    #[test]
    fn test_read_line_stops_at_newline() {
        let mut port = MockSerial::new(b"a\nb\n");
        assert_eq!(read_line(&mut port).unwrap(), b"a");
        assert_eq!(port.read_buf.len(), 2);
    }

    #[test]
    fn test_read_line_is_bounded() {
        let data = vec![b'x'; MAX_LINE_LEN + 10];
        let mut port = MockSerial::new(&data);
        assert_eq!(read_line(&mut port).unwrap().len(), MAX_LINE_LEN);
        assert_eq!(read_line(&mut port).unwrap().len(), 10);
    }

    #[test]
    fn test_wait_for_skips_other_lines() {
        let mut port = MockSerial::new(b"hello\r\n\r\nBOOTLOADER version V1.2.0\r\nReady\r\n");
        let waiter = LineWaiter::new(Duration::ZERO);

        let line = waiter.wait_for(&mut port, is_info_line).unwrap();
        assert_eq!(line, b"BOOTLOADER version V1.2.0");

        let line = waiter.wait_for(&mut port, is_ready_line).unwrap();
        assert_eq!(line, b"Ready");
    }

    #[test]
    fn test_wait_for_times_out() {
        let mut port = MockSerial::new(b"noise\r\n");
        let waiter = LineWaiter::new(Duration::from_millis(1))
            .with_timeout(Some(Duration::from_millis(20)));

        let err = waiter.wait_for(&mut port, is_ready_line).unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
        assert!(port.reads > 1);
    }

    #[test]
    fn test_wait_for_stops_when_interrupted() {
        let mut port = MockSerial::new(b"Ready\r\n");
        let waiter = LineWaiter::new(Duration::ZERO).with_interrupt_checker(|| true);

        let err = waiter.wait_for(&mut port, is_ready_line).unwrap_err();
        assert!(matches!(err, Error::Interrupted));
        assert_eq!(port.reads, 0);
    }

    #[test]
    fn test_default_waiter_is_unbounded() {
        let waiter = LineWaiter::default();
        assert_eq!(waiter.poll_interval(), DEFAULT_POLL_INTERVAL);
        assert!(waiter.timeout().is_none());
    }
}
