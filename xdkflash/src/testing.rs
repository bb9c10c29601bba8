//! In-memory serial port for unit tests.

use crate::error::Result;
use crate::port::Port;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::time::Duration;

/// Scripted port: hands out queued bytes, records writes, and times out once
/// the queue is drained.
pub(crate) struct MockSerial {
    read_buf: VecDeque<u8>,
    write_buf: Vec<u8>,
    timeout: Duration,
    closed: bool,
    lost_when_drained: bool,
}

impl MockSerial {
    pub(crate) fn new(data: &[u8]) -> Self {
        Self {
            read_buf: data.iter().copied().collect(),
            write_buf: Vec::new(),
            timeout: Duration::from_secs(1),
            closed: false,
            lost_when_drained: false,
        }
    }

    /// Make `set_timeout` fail once the script is drained, as a port whose
    /// device has gone away would.
    pub(crate) fn lost_when_drained(mut self) -> Self {
        self.lost_when_drained = true;
        self
    }

    pub(crate) fn remaining(&self) -> Vec<u8> {
        self.read_buf.iter().copied().collect()
    }

    pub(crate) fn written(&self) -> &[u8] {
        &self.write_buf
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Read for MockSerial {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.read_buf.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
        }
        let n = buf.len().min(self.read_buf.len());
        for (slot, byte) in buf.iter_mut().zip(self.read_buf.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for MockSerial {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Port for MockSerial {
    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        if self.lost_when_drained && self.read_buf.is_empty() {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device gone").into());
        }
        self.timeout = timeout;
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn clear_buffers(&mut self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}
