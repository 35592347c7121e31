//! FAT region access: 12/16/32-bit entry packing, cluster-chain
//! traversal, allocation, and freeing.
//!
//! The chain is an out-of-band singly-linked list: cluster numbers are
//! indices into the FAT, and every walk is bounded by the cluster count
//! so corrupt media with a cycle fails instead of looping.

use log::warn;

use crate::device::{BlockDevice, SECTOR_SIZE};
use crate::error::{FatError, VolumeError};

use super::{FatType, Volume};

const FAT12_EOC_MIN: u32 = 0xFF8;
const FAT12_EOC: u32 = 0xFFF;
const FAT16_EOC_MIN: u32 = 0xFFF8;
const FAT16_EOC: u32 = 0xFFFF;
const FAT32_EOC_MIN: u32 = 0x0FFF_FFF8;
const FAT32_EOC: u32 = 0x0FFF_FFFF;

impl<D: BlockDevice> Volume<D> {
    /// Upper bound on chain-walk steps before declaring corruption.
    pub(crate) fn walk_limit(&self) -> u32 {
        self.cluster_count.saturating_add(2)
    }

    fn eoc_min(&self) -> u32 {
        match self.fat_type {
            FatType::Fat12 => FAT12_EOC_MIN,
            FatType::Fat16 => FAT16_EOC_MIN,
            FatType::Fat32 => FAT32_EOC_MIN,
        }
    }

    fn eoc(&self) -> u32 {
        match self.fat_type {
            FatType::Fat12 => FAT12_EOC,
            FatType::Fat16 => FAT16_EOC,
            FatType::Fat32 => FAT32_EOC,
        }
    }

    fn fat_byte_offset(&self, cluster: u32) -> Result<(u32, usize), FatError> {
        if cluster > self.max_cluster() {
            return Err(VolumeError::Corruption.into());
        }
        let byte_offset = match self.fat_type {
            FatType::Fat12 => cluster as u64 + (cluster as u64 >> 1),
            FatType::Fat16 => cluster as u64 * 2,
            FatType::Fat32 => cluster as u64 * 4,
        };
        let sector_offset = (byte_offset / SECTOR_SIZE as u64) as u32;
        if sector_offset >= self.sectors_per_fat {
            return Err(VolumeError::Corruption.into());
        }
        Ok((
            self.fat_start + sector_offset,
            (byte_offset % SECTOR_SIZE as u64) as usize,
        ))
    }

    /// Raw FAT entry for `cluster` (FAT32 values come back masked to
    /// 28 bits).
    pub(crate) fn fat_entry(&mut self, cluster: u32) -> Result<u32, FatError> {
        let (sector, index) = self.fat_byte_offset(cluster)?;
        match self.fat_type {
            FatType::Fat12 => {
                // A 12-bit entry may straddle a sector boundary; fetch
                // its two bytes through the cache one at a time.
                let lo = self.cache_read(sector)?[index] as u16;
                let hi = if index + 1 < SECTOR_SIZE {
                    self.cache_read(sector)?[index + 1] as u16
                } else {
                    self.cache_read(sector + 1)?[0] as u16
                };
                let pair = lo | (hi << 8);
                let value = if cluster & 1 != 0 { pair >> 4 } else { pair & 0x0FFF };
                Ok(value as u32)
            }
            FatType::Fat16 => {
                let buf = self.cache_read(sector)?;
                Ok(u16::from_le_bytes([buf[index], buf[index + 1]]) as u32)
            }
            FatType::Fat32 => {
                let buf = self.cache_read(sector)?;
                let raw = u32::from_le_bytes([
                    buf[index],
                    buf[index + 1],
                    buf[index + 2],
                    buf[index + 3],
                ]);
                Ok(raw & 0x0FFF_FFFF)
            }
        }
    }

    pub(crate) fn set_fat_entry(&mut self, cluster: u32, value: u32) -> Result<(), FatError> {
        let (sector, index) = self.fat_byte_offset(cluster)?;
        match self.fat_type {
            FatType::Fat12 => {
                let odd = cluster & 1 != 0;
                {
                    let buf = self.cache_write(sector)?;
                    buf[index] = if odd {
                        (buf[index] & 0x0F) | (((value & 0x0F) as u8) << 4)
                    } else {
                        value as u8
                    };
                }
                let (hi_sector, hi_index) = if index + 1 < SECTOR_SIZE {
                    (sector, index + 1)
                } else {
                    (sector + 1, 0)
                };
                let buf = self.cache_write(hi_sector)?;
                buf[hi_index] = if odd {
                    ((value >> 4) & 0xFF) as u8
                } else {
                    (buf[hi_index] & 0xF0) | (((value >> 8) & 0x0F) as u8)
                };
            }
            FatType::Fat16 => {
                let buf = self.cache_write(sector)?;
                buf[index..index + 2].copy_from_slice(&(value as u16).to_le_bytes());
            }
            FatType::Fat32 => {
                let buf = self.cache_write(sector)?;
                let old = u32::from_le_bytes([
                    buf[index],
                    buf[index + 1],
                    buf[index + 2],
                    buf[index + 3],
                ]);
                // Top nibble of a FAT32 entry is reserved; preserve it.
                let new = (old & 0xF000_0000) | (value & 0x0FFF_FFFF);
                buf[index..index + 4].copy_from_slice(&new.to_le_bytes());
            }
        }
        Ok(())
    }

    /// Marks `cluster` as end of chain.
    pub(crate) fn set_chain_end(&mut self, cluster: u32) -> Result<(), FatError> {
        let eoc = self.eoc();
        self.set_fat_entry(cluster, eoc)
    }

    /// Follows the chain one step: `None` at end of chain, an error
    /// for entries pointing outside the valid cluster range.
    pub fn next_cluster(&mut self, cluster: u32) -> Result<Option<u32>, FatError> {
        let value = self.fat_entry(cluster)?;
        if value >= self.eoc_min() {
            return Ok(None);
        }
        if value < 2 || value > self.max_cluster() {
            return Err(VolumeError::Corruption.into());
        }
        Ok(Some(value))
    }

    /// Allocates one free cluster, marks it end-of-chain, and links it
    /// after `preceding` (pass 0 to start a new chain).
    ///
    /// The scan is linear from a rotating hint so repeated allocations
    /// do not rescan the low FAT every time.
    pub fn allocate_cluster(&mut self, preceding: u32) -> Result<u32, FatError> {
        let max = self.max_cluster();
        let start = self.alloc_hint.clamp(2, max);

        let mut found = None;
        for cluster in (start..=max).chain(2..start) {
            if self.fat_entry(cluster)? == 0 {
                found = Some(cluster);
                break;
            }
        }
        let Some(cluster) = found else {
            warn!("cluster allocation failed: volume full");
            return Err(VolumeError::DiskFull.into());
        };

        self.set_chain_end(cluster)?;
        if preceding >= 2 {
            self.set_fat_entry(preceding, cluster)?;
        }
        self.alloc_hint = if cluster >= max { 2 } else { cluster + 1 };
        Ok(cluster)
    }

    /// Frees every cluster reachable from `start`. Tolerates chains
    /// that are already partially freed; bounded against cycles.
    pub fn free_chain(&mut self, start: u32) -> Result<(), FatError> {
        if start < 2 {
            return Ok(());
        }
        let max = self.max_cluster();
        let mut cluster = start;
        let mut visited = 0u32;
        loop {
            if visited > self.walk_limit() {
                warn!("cluster chain exceeds volume size, aborting free");
                return Err(VolumeError::Corruption.into());
            }
            visited += 1;

            let entry = self.fat_entry(cluster)?;
            self.set_fat_entry(cluster, 0)?;
            if cluster < self.alloc_hint {
                self.alloc_hint = cluster;
            }

            if entry >= self.eoc_min() || entry < 2 || entry > max {
                return Ok(());
            }
            cluster = entry;
        }
    }
}
