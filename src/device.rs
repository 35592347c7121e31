//! Block-device boundary consumed by [`crate::volume::Volume`].

/// Sector size shared by the block device and the FAT layer. FAT media
/// with any other logical sector size is rejected at mount.
pub const SECTOR_SIZE: usize = 512;

/// Error reported by a block device, carrying the device's own error
/// code register so callers can retrieve it after a failed operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceError {
    pub code: u8,
}

impl DeviceError {
    pub const fn new(code: u8) -> Self {
        Self { code }
    }
}

/// Addressable 512-byte sector storage.
///
/// Implementations own all transport concerns: bus setup, command
/// framing, retries and timeouts. A failed transaction surfaces once as
/// a [`DeviceError`]; this layer never retries.
pub trait BlockDevice {
    fn read_sector(&mut self, sector: u32, buf: &mut [u8; SECTOR_SIZE]) -> Result<(), DeviceError>;

    fn write_sector(&mut self, sector: u32, data: &[u8; SECTOR_SIZE]) -> Result<(), DeviceError>;
}
