//! Known XDK110 bootloader revisions.

pub mod bootloader;

pub use bootloader::{BOOTLOADER_TYPES, BootloaderType, lookup};
