//! FAT12/16/32 filesystem layer for removable SD/SDHC storage.
//!
//! The crate sits on top of a caller-supplied [`BlockDevice`] that moves
//! raw 512-byte sectors; everything below that boundary (SPI timing,
//! card initialization, retries) is out of scope. On top of it the crate
//! provides [`Volume`] (geometry, FAT chains, the single write-back
//! sector cache), [`File`] handles for files and directories, the
//! [`SdFat`] facade with a current working directory and path-based
//! operations, and [`FileStream`] for character-oriented access.
//!
//! Single-threaded by design: no internal locking, all I/O synchronous.
//! Callers serialize access to one mounted volume themselves.

#![cfg_attr(not(test), no_std)]

pub mod device;
pub mod dir;
pub mod error;
pub mod file;
pub mod fs;
pub mod stream;
pub mod volume;

#[cfg(test)]
pub(crate) mod testfs;

pub use device::{BlockDevice, DeviceError, SECTOR_SIZE};
pub use dir::DirEntry;
pub use error::{FatError, FileError, NameError, VolumeError};
pub use file::{oflag, File, FileKind};
pub use fs::SdFat;
pub use stream::{FileStream, SeekFrom};
pub use volume::{FatType, Volume};
