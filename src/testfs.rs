//! In-memory block device and minimal formatters for the test suite.

use std::boxed::Box;
use std::collections::BTreeMap;

use crate::device::{BlockDevice, DeviceError, SECTOR_SIZE};

/// Sparse RAM-backed disk. Sectors never written read back as zeros,
/// which doubles as freshly-formatted directory space.
pub struct RamDisk {
    sectors: BTreeMap<u32, Box<[u8; SECTOR_SIZE]>>,
    /// When set, the next N writes fail with this code.
    pub fail_writes: u32,
}

impl RamDisk {
    pub fn new() -> RamDisk {
        RamDisk { sectors: BTreeMap::new(), fail_writes: 0 }
    }

    pub fn sector(&self, sector: u32) -> [u8; SECTOR_SIZE] {
        match self.sectors.get(&sector) {
            Some(data) => **data,
            None => [0; SECTOR_SIZE],
        }
    }

    pub fn patch(&mut self, sector: u32, offset: usize, bytes: &[u8]) {
        let mut data = self.sector(sector);
        data[offset..offset + bytes.len()].copy_from_slice(bytes);
        self.sectors.insert(sector, Box::new(data));
    }
}

impl BlockDevice for RamDisk {
    fn read_sector(&mut self, sector: u32, buf: &mut [u8; SECTOR_SIZE]) -> Result<(), DeviceError> {
        *buf = self.sector(sector);
        Ok(())
    }

    fn write_sector(&mut self, sector: u32, data: &[u8; SECTOR_SIZE]) -> Result<(), DeviceError> {
        if self.fail_writes > 0 {
            self.fail_writes -= 1;
            return Err(DeviceError::new(0x7F));
        }
        self.sectors.insert(sector, Box::new(*data));
        Ok(())
    }
}

struct Layout {
    sectors_per_cluster: u8,
    reserved: u16,
    fat_count: u8,
    root_entries: u16,
    sectors_per_fat: u32,
    clusters: u32,
    fat32: bool,
}

impl Layout {
    fn total_sectors(&self) -> u32 {
        let root_sectors = (self.root_entries as u32 * 32).div_ceil(SECTOR_SIZE as u32);
        self.reserved as u32
            + self.fat_count as u32 * self.sectors_per_fat
            + root_sectors
            + self.clusters * self.sectors_per_cluster as u32
    }

    fn write(&self, disk: &mut RamDisk) {
        let mut boot = [0u8; SECTOR_SIZE];
        boot[11..13].copy_from_slice(&(SECTOR_SIZE as u16).to_le_bytes());
        boot[13] = self.sectors_per_cluster;
        boot[14..16].copy_from_slice(&self.reserved.to_le_bytes());
        boot[16] = self.fat_count;
        boot[17..19].copy_from_slice(&self.root_entries.to_le_bytes());
        let total = self.total_sectors();
        if total < 0x10000 && !self.fat32 {
            boot[19..21].copy_from_slice(&(total as u16).to_le_bytes());
        } else {
            boot[32..36].copy_from_slice(&total.to_le_bytes());
        }
        if self.fat32 {
            boot[36..40].copy_from_slice(&self.sectors_per_fat.to_le_bytes());
            boot[44..48].copy_from_slice(&2u32.to_le_bytes());
        } else {
            boot[22..24].copy_from_slice(&(self.sectors_per_fat as u16).to_le_bytes());
        }
        boot[510] = 0x55;
        boot[511] = 0xAA;
        disk.patch(0, 0, &boot);

        // Media and end markers in each FAT copy; for FAT32 also pin
        // the root directory cluster.
        for copy in 0..self.fat_count as u32 {
            let fat = self.reserved as u32 + copy * self.sectors_per_fat;
            if self.fat32 {
                disk.patch(fat, 0, &[0xF8, 0xFF, 0xFF, 0x0F]);
                disk.patch(fat, 4, &[0xFF, 0xFF, 0xFF, 0x0F]);
                disk.patch(fat, 8, &[0xFF, 0xFF, 0xFF, 0x0F]);
            } else if self.clusters >= 4085 {
                disk.patch(fat, 0, &[0xF8, 0xFF, 0xFF, 0xFF]);
            } else {
                disk.patch(fat, 0, &[0xF8, 0xFF, 0xFF]);
            }
        }
    }
}

/// 1000 data clusters, one sector each. Two FAT copies of three
/// sectors, so 12-bit entries straddle the copy's sector boundaries.
pub fn format_fat12() -> RamDisk {
    let mut disk = RamDisk::new();
    Layout {
        sectors_per_cluster: 1,
        reserved: 1,
        fat_count: 2,
        root_entries: 512,
        sectors_per_fat: 3,
        clusters: 1000,
        fat32: false,
    }
    .write(&mut disk);
    disk
}

/// 4200 data clusters, one sector each.
pub fn format_fat16() -> RamDisk {
    let mut disk = RamDisk::new();
    Layout {
        sectors_per_cluster: 1,
        reserved: 1,
        fat_count: 2,
        root_entries: 512,
        sectors_per_fat: 17,
        clusters: 4200,
        fat32: false,
    }
    .write(&mut disk);
    disk
}

/// 65600 data clusters, one sector each, chained root directory.
pub fn format_fat32() -> RamDisk {
    let mut disk = RamDisk::new();
    Layout {
        sectors_per_cluster: 1,
        reserved: 32,
        fat_count: 2,
        root_entries: 0,
        sectors_per_fat: 513,
        clusters: 65600,
        fat32: true,
    }
    .write(&mut disk);
    disk
}

/// FAT16 with 4-sector clusters, for boundary-crossing reads/writes.
pub fn format_fat16_spc4() -> RamDisk {
    let mut disk = RamDisk::new();
    Layout {
        sectors_per_cluster: 4,
        reserved: 1,
        fat_count: 2,
        root_entries: 512,
        sectors_per_fat: 17,
        clusters: 4200,
        fat32: false,
    }
    .write(&mut disk);
    disk
}
