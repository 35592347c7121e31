//! Boot-sector and MBR parsing.

use crate::device::SECTOR_SIZE;
use crate::error::VolumeError;

use super::FatType;

/// FAT type thresholds from the FAT specification: strictly by count
/// of data clusters, never by the BPB's label string.
const FAT12_MAX_CLUSTERS: u32 = 4085;
const FAT16_MAX_CLUSTERS: u32 = 65525;

pub(super) struct Geometry {
    pub fat_type: FatType,
    pub sectors_per_cluster: u8,
    pub cluster_shift: u8,
    pub fat_count: u8,
    pub fat_start: u32,
    pub sectors_per_fat: u32,
    pub root_dir_start: u32,
    pub root_entry_count: u16,
    pub data_start: u32,
    pub cluster_count: u32,
}

/// Scans the MBR partition table for the first FAT-typed entry with a
/// nonzero start. Returns `None` for superfloppy media.
pub(super) fn first_fat_partition(sector0: &[u8; SECTOR_SIZE]) -> Option<u32> {
    if sector0[510] != 0x55 || sector0[511] != 0xAA {
        return None;
    }
    for i in 0..4 {
        let base = 446 + i * 16;
        let part_type = sector0[base + 4];
        if !matches!(part_type, 0x01 | 0x04 | 0x06 | 0x0B | 0x0C | 0x0E) {
            continue;
        }
        let start = u32::from_le_bytes([
            sector0[base + 8],
            sector0[base + 9],
            sector0[base + 10],
            sector0[base + 11],
        ]);
        if start != 0 {
            return Some(start);
        }
    }
    None
}

pub(super) fn parse_boot_sector(
    partition_start: u32,
    boot: &[u8; SECTOR_SIZE],
) -> Result<Geometry, VolumeError> {
    if boot[510] != 0x55 || boot[511] != 0xAA {
        return Err(VolumeError::NotFormatted);
    }

    let bytes_per_sector = u16::from_le_bytes([boot[11], boot[12]]);
    if bytes_per_sector as usize != SECTOR_SIZE {
        return Err(VolumeError::UnsupportedLayout);
    }

    let sectors_per_cluster = boot[13];
    if sectors_per_cluster == 0 || !sectors_per_cluster.is_power_of_two() {
        return Err(VolumeError::UnsupportedLayout);
    }
    let cluster_shift = sectors_per_cluster.trailing_zeros() as u8;

    let reserved_sectors = u16::from_le_bytes([boot[14], boot[15]]) as u32;
    if reserved_sectors == 0 {
        return Err(VolumeError::NotFormatted);
    }

    let fat_count = boot[16];
    if fat_count == 0 {
        return Err(VolumeError::UnsupportedLayout);
    }

    let root_entry_count = u16::from_le_bytes([boot[17], boot[18]]);

    let fat_size_16 = u16::from_le_bytes([boot[22], boot[23]]) as u32;
    let fat_size_32 = u32::from_le_bytes([boot[36], boot[37], boot[38], boot[39]]);
    let sectors_per_fat = if fat_size_16 != 0 { fat_size_16 } else { fat_size_32 };
    if sectors_per_fat == 0 {
        return Err(VolumeError::UnsupportedLayout);
    }

    let total_16 = u16::from_le_bytes([boot[19], boot[20]]) as u32;
    let total_32 = u32::from_le_bytes([boot[32], boot[33], boot[34], boot[35]]);
    let total_sectors = if total_16 != 0 { total_16 } else { total_32 };
    if total_sectors == 0 {
        return Err(VolumeError::NotFormatted);
    }

    let fat_start = partition_start.saturating_add(reserved_sectors);
    let root_dir_sectors =
        (root_entry_count as u32 * 32).div_ceil(SECTOR_SIZE as u32);
    let root_region_start =
        fat_start.saturating_add(sectors_per_fat.saturating_mul(fat_count as u32));
    let data_start = root_region_start.saturating_add(root_dir_sectors);

    let used_sectors = reserved_sectors
        .saturating_add(sectors_per_fat.saturating_mul(fat_count as u32))
        .saturating_add(root_dir_sectors);
    if total_sectors <= used_sectors {
        return Err(VolumeError::UnsupportedLayout);
    }
    let cluster_count = (total_sectors - used_sectors) >> cluster_shift;

    let fat_type = if cluster_count < FAT12_MAX_CLUSTERS {
        FatType::Fat12
    } else if cluster_count < FAT16_MAX_CLUSTERS {
        FatType::Fat16
    } else {
        FatType::Fat32
    };

    let root_dir_start = match fat_type {
        FatType::Fat32 => {
            let root_cluster = u32::from_le_bytes([boot[44], boot[45], boot[46], boot[47]]);
            if root_cluster < 2 {
                return Err(VolumeError::NotFormatted);
            }
            root_cluster
        }
        _ => {
            if root_entry_count == 0 {
                return Err(VolumeError::UnsupportedLayout);
            }
            root_region_start
        }
    };

    Ok(Geometry {
        fat_type,
        sectors_per_cluster,
        cluster_shift,
        fat_count,
        fat_start,
        sectors_per_fat,
        root_dir_start,
        root_entry_count,
        data_start,
        cluster_count,
    })
}
