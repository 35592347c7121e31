//! Error taxonomy. Each layer has its own enum; [`FatError`] wraps them
//! so `?` propagates across layer boundaries via `From`.

use crate::device::DeviceError;

/// Volume-level failures: mount problems and allocation state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VolumeError {
    /// No FAT boot signature on sector 0 or any MBR partition.
    NotFormatted,
    /// Valid signature but unusable geometry (sector size != 512,
    /// zero FAT count, sectors-per-cluster not a power of two).
    UnsupportedLayout,
    /// Free-cluster scan covered the whole FAT without a hit.
    DiskFull,
    /// Chain walk exceeded the cluster count, or a FAT entry pointed
    /// outside the valid cluster range.
    Corruption,
}

/// File- and directory-level failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileError {
    NotFound,
    AlreadyExists,
    NotADirectory,
    IsDirectory,
    /// rmdir on a directory that still has entries besides `.`/`..`.
    NotEmpty,
    /// `open()` called on a handle that is already open.
    AlreadyOpen,
    /// Operation on a closed or invalidated handle.
    NotOpen,
    /// Handle or flags do not permit the operation.
    ReadOnly,
    /// Seek or truncate target outside `0..=size`.
    OutOfRange,
    /// Cluster allocation failed before any byte could be written, or
    /// a directory could not grow (fixed root full).
    DiskFull,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NameError {
    /// Not a valid 8.3 short name: empty, too long, or a disallowed
    /// character.
    Invalid,
}

/// Crate-wide error type returned by all fallible operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FatError {
    /// Block-device I/O failure, propagated immediately without retry.
    Device(DeviceError),
    Volume(VolumeError),
    File(FileError),
    Name(NameError),
}

impl From<DeviceError> for FatError {
    fn from(value: DeviceError) -> Self {
        Self::Device(value)
    }
}

impl From<VolumeError> for FatError {
    fn from(value: VolumeError) -> Self {
        Self::Volume(value)
    }
}

impl From<FileError> for FatError {
    fn from(value: FileError) -> Self {
        Self::File(value)
    }
}

impl From<NameError> for FatError {
    fn from(value: NameError) -> Self {
        Self::Name(value)
    }
}
