//! XMODEM file transfer protocol (sender side).
//!
//! The XDK110 bootloader receives the application image over classic XMODEM
//! after answering the upload command with `Ready`:
//!
//! ```text
//! Block format:
//! +---------+-----+------+--------------------+------------------+
//! | SOH/STX | SEQ | ~SEQ |  DATA (128/1024)   | CRC16 / CHECKSUM |
//! +---------+-----+------+--------------------+------------------+
//! | 1       | 1   | 1    | padded with 0x1A   | 2 / 1            |
//! +---------+-----+------+--------------------+------------------+
//! ```
//!
//! The receiver picks the error-detection mode: `C` requests CRC-16, NAK
//! requests the 8-bit checksum. The sender only talks to the link through
//! [`TransferIo`], so the glue that filters the serial stream lives outside
//! this module.

use crate::error::{Error, Result};
use crate::protocol::crc::{checksum8, crc16_xmodem};
use byteorder::{BigEndian, WriteBytesExt};
use log::{debug, trace};
use std::time::{Duration, Instant};

/// XMODEM control characters.
pub mod control {
    /// Start of Header (128-byte block).
    pub const SOH: u8 = 0x01;
    /// Start of Text (1024-byte block).
    pub const STX: u8 = 0x02;
    /// End of Transmission.
    pub const EOT: u8 = 0x04;
    /// Acknowledge.
    pub const ACK: u8 = 0x06;
    /// Not Acknowledge.
    pub const NAK: u8 = 0x15;
    /// Cancel.
    pub const CAN: u8 = 0x18;
    /// Substitute, the CP/M end-of-file padding byte.
    pub const SUB: u8 = 0x1A;
    /// CRC mode request character.
    pub const C: u8 = b'C';

    /// Every byte the protocol treats as a signal.
    pub const ALL: [u8; 8] = [SOH, STX, EOT, ACK, NAK, CAN, SUB, C];

    /// Whether `byte` is a protocol control byte.
    pub fn is_control(byte: u8) -> bool {
        ALL.contains(&byte)
    }
}

/// I/O callbacks the sender drives the link with.
pub trait TransferIo {
    /// Read up to `size` bytes, waiting at most `timeout`.
    ///
    /// Returns `None` when nothing arrived in time.
    fn read_bytes(&mut self, size: usize, timeout: Duration) -> Result<Option<Vec<u8>>>;

    /// Write `data` and return how many bytes were accepted.
    fn write_bytes(&mut self, data: &[u8], timeout: Duration) -> Result<usize>;
}

/// Data block size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockSize {
    /// 128-byte SOH blocks (classic XMODEM).
    #[default]
    Standard,
    /// 1024-byte STX blocks (XMODEM-1K).
    OneK,
}

impl BlockSize {
    /// Payload length of one block.
    pub fn payload_len(self) -> usize {
        match self {
            Self::Standard => 128,
            Self::OneK => 1024,
        }
    }

    fn header(self) -> u8 {
        match self {
            Self::Standard => control::SOH,
            Self::OneK => control::STX,
        }
    }
}

/// Error-detection mode negotiated with the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumMode {
    /// 8-bit arithmetic checksum (receiver sent NAK).
    Checksum,
    /// CRC-16/XMODEM (receiver sent `C`).
    Crc16,
}

/// XMODEM configuration options.
#[derive(Debug, Clone)]
pub struct XmodemConfig {
    /// Block size.
    pub block_size: BlockSize,
    /// Timeout for waiting for a single response byte.
    pub char_timeout: Duration,
    /// Timeout for the receiver's initial `C`/NAK.
    pub start_timeout: Duration,
    /// Maximum retries for sending a block or EOT.
    pub max_retries: u32,
    /// Byte used to pad the final block.
    pub pad_byte: u8,
}

impl Default for XmodemConfig {
    fn default() -> Self {
        Self {
            block_size: BlockSize::Standard,
            char_timeout: Duration::from_secs(10),
            start_timeout: Duration::from_secs(60),
            max_retries: 16,
            pad_byte: control::SUB,
        }
    }
}

/// XMODEM sender.
pub struct XmodemSender<'a, T: TransferIo + ?Sized> {
    io: &'a mut T,
    config: XmodemConfig,
}

impl<'a, T: TransferIo + ?Sized> XmodemSender<'a, T> {
    /// Create a sender with default configuration.
    pub fn new(io: &'a mut T) -> Self {
        Self {
            io,
            config: XmodemConfig::default(),
        }
    }

    /// Create a sender with custom configuration.
    pub fn with_config(io: &'a mut T, config: XmodemConfig) -> Self {
        Self { io, config }
    }

    fn read_byte(&mut self, timeout: Duration) -> Result<Option<u8>> {
        Ok(self
            .io
            .read_bytes(1, timeout)?
            .and_then(|bytes| bytes.first().copied()))
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let written = self.io.write_bytes(data, self.config.char_timeout)?;
        if written != data.len() {
            return Err(Error::Transfer(format!(
                "short write: {written} of {} bytes",
                data.len()
            )));
        }
        Ok(())
    }

    /// Wait for the receiver to pick a checksum mode.
    pub fn wait_for_start(&mut self) -> Result<ChecksumMode> {
        debug!("Waiting for receiver to request transfer...");
        let start = Instant::now();
        let mut cancel_seen = false;

        while start.elapsed() < self.config.start_timeout {
            if crate::is_interrupted_requested() {
                return Err(Error::Interrupted);
            }

            match self.read_byte(self.config.char_timeout)? {
                Some(control::C) => {
                    debug!("Receiver requested CRC-16 mode");
                    return Ok(ChecksumMode::Crc16);
                },
                Some(control::NAK) => {
                    debug!("Receiver requested checksum mode");
                    return Ok(ChecksumMode::Checksum);
                },
                Some(control::CAN) if cancel_seen => {
                    return Err(Error::Transfer("Transfer cancelled by receiver".into()));
                },
                Some(control::CAN) => cancel_seen = true,
                Some(c) => {
                    trace!("Received unexpected char: 0x{c:02X}");
                    cancel_seen = false;
                },
                None => {},
            }
        }

        Err(Error::Timeout(
            "Timeout waiting for receiver to start transfer".into(),
        ))
    }

    /// Build an XMODEM block.
    fn build_block(
        seq: u8,
        data: &[u8],
        block_size: BlockSize,
        mode: ChecksumMode,
        pad_byte: u8,
    ) -> Result<Vec<u8>> {
        let len = block_size.payload_len();
        let mut block = Vec::with_capacity(3 + len + 2);

        block.push(block_size.header());
        block.push(seq);
        block.push(!seq);

        let data = &data[..data.len().min(len)];
        block.extend_from_slice(data);
        block.resize(3 + len, pad_byte);

        let payload = &block[3..3 + len];
        match mode {
            ChecksumMode::Crc16 => {
                let crc = crc16_xmodem(payload);
                block.write_u16::<BigEndian>(crc)?;
            },
            ChecksumMode::Checksum => {
                let sum = checksum8(payload);
                block.push(sum);
            },
        }

        Ok(block)
    }

    /// Send a block and wait for ACK.
    fn send_block(&mut self, block: &[u8]) -> Result<()> {
        for retry in 0..self.config.max_retries {
            if crate::is_interrupted_requested() {
                return Err(Error::Interrupted);
            }
            trace!("Sending block {} (attempt {})", block[1], retry + 1);

            self.write_all(block)?;

            match self.read_byte(self.config.char_timeout)? {
                Some(control::ACK) => {
                    trace!("Block ACKed");
                    return Ok(());
                },
                Some(control::NAK) => {
                    debug!("Block {} NAKed, retrying...", block[1]);
                },
                Some(control::CAN) => {
                    return Err(Error::Transfer("Transfer cancelled by receiver".into()));
                },
                Some(c) => {
                    debug!("Unexpected response: 0x{c:02X}, retrying...");
                },
                None => {
                    debug!("Timeout waiting for ACK, retrying...");
                },
            }
        }

        Err(Error::Transfer(format!(
            "Block {} failed after {} retries",
            block[1], self.config.max_retries
        )))
    }

    /// Send EOT and wait for it to be acknowledged.
    pub fn send_eot(&mut self) -> Result<()> {
        debug!("Sending EOT");

        for _retry in 0..self.config.max_retries {
            self.write_all(&[control::EOT])?;

            match self.read_byte(self.config.char_timeout)? {
                Some(control::ACK) => {
                    debug!("EOT ACKed");
                    return Ok(());
                },
                Some(control::CAN) => {
                    return Err(Error::Transfer("Transfer cancelled by receiver".into()));
                },
                // NAK, timeout, or unexpected response - retry
                _ => {},
            }
        }

        Err(Error::Transfer("EOT was not acknowledged".into()))
    }

    /// Transfer `data`, returning the number of payload bytes sent.
    ///
    /// `progress` is called after every acknowledged block with
    /// `(bytes_sent, total)`.
    pub fn send<F>(&mut self, data: &[u8], mut progress: F) -> Result<usize>
    where
        F: FnMut(usize, usize),
    {
        let total = data.len();
        debug!("Starting XMODEM transfer ({total} bytes)");

        let mode = self.wait_for_start()?;
        let block_len = self.config.block_size.payload_len();

        let mut seq: u8 = 1;
        let mut offset = 0;

        while offset < total {
            let chunk_end = (offset + block_len).min(total);
            let block = Self::build_block(
                seq,
                &data[offset..chunk_end],
                self.config.block_size,
                mode,
                self.config.pad_byte,
            )?;
            self.send_block(&block)?;

            offset = chunk_end;
            seq = seq.wrapping_add(1);

            progress(offset, total);
        }

        self.send_eot()?;

        debug!("XMODEM transfer complete");
        Ok(total)
    }
}
