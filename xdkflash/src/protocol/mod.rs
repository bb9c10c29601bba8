//! Bootloader protocol: commands, response parsing, line reads and the
//! XMODEM sender.

pub mod command;
pub mod crc;
pub mod line;
pub mod response;
pub mod xmodem;

// Re-export common types
pub use command::{Command, Dispatch, send_command};
pub use line::LineWaiter;
pub use response::{LineKind, Version};
pub use xmodem::{BlockSize, TransferIo, XmodemConfig, XmodemSender};
