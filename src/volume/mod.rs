//! FAT volume: boot-sector geometry, cluster/sector arithmetic, and the
//! single shared write-back sector cache.

mod chain;
mod mount;

use log::debug;

use crate::device::{BlockDevice, SECTOR_SIZE};
use crate::error::{FatError, VolumeError};

/// Filesystem classification by total cluster count, per the FAT
/// specification thresholds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FatType {
    Fat12,
    Fat16,
    Fat32,
}

impl FatType {
    /// FAT entry width in bits.
    pub fn bits(self) -> u8 {
        match self {
            Self::Fat12 => 12,
            Self::Fat16 => 16,
            Self::Fat32 => 32,
        }
    }
}

/// The single in-memory mirror of the most recently touched sector.
/// A dirty sector is written back before any other sector is loaded;
/// it is never silently dropped.
struct SectorCache {
    buf: [u8; SECTOR_SIZE],
    sector: u32,
    valid: bool,
    dirty: bool,
}

impl SectorCache {
    const fn new() -> Self {
        Self {
            buf: [0; SECTOR_SIZE],
            sector: 0,
            valid: false,
            dirty: false,
        }
    }
}

/// One mounted FAT12/16/32 volume bound to one block device.
///
/// All geometry fields are fixed at mount; the only mutable state is
/// the sector cache and the free-cluster scan hint.
pub struct Volume<D: BlockDevice> {
    device: D,
    cache: SectorCache,
    fat_type: FatType,
    sectors_per_cluster: u8,
    cluster_shift: u8,
    fat_count: u8,
    fat_start: u32,
    sectors_per_fat: u32,
    // FAT12/16: first sector of the fixed root region.
    // FAT32: the root directory's cluster number.
    root_dir_start: u32,
    root_entry_count: u16,
    data_start: u32,
    cluster_count: u32,
    alloc_hint: u32,
}

impl<D: BlockDevice> Volume<D> {
    /// Reads the boot sector (directly or via the first FAT partition
    /// in the MBR), validates the layout, and classifies the volume.
    pub fn mount(mut device: D) -> Result<Self, FatError> {
        let mut sector0 = [0u8; SECTOR_SIZE];
        device.read_sector(0, &mut sector0)?;

        let geometry = match mount::first_fat_partition(&sector0) {
            Some(start) => {
                let mut boot = [0u8; SECTOR_SIZE];
                device.read_sector(start, &mut boot)?;
                mount::parse_boot_sector(start, &boot)
                    .or_else(|_| mount::parse_boot_sector(0, &sector0))?
            }
            None => mount::parse_boot_sector(0, &sector0)?,
        };

        debug!(
            "mounted FAT{} volume: {} clusters, {} sectors/cluster, {} FATs",
            geometry.fat_type.bits(),
            geometry.cluster_count,
            geometry.sectors_per_cluster,
            geometry.fat_count
        );

        Ok(Self {
            device,
            cache: SectorCache::new(),
            fat_type: geometry.fat_type,
            sectors_per_cluster: geometry.sectors_per_cluster,
            cluster_shift: geometry.cluster_shift,
            fat_count: geometry.fat_count,
            fat_start: geometry.fat_start,
            sectors_per_fat: geometry.sectors_per_fat,
            root_dir_start: geometry.root_dir_start,
            root_entry_count: geometry.root_entry_count,
            data_start: geometry.data_start,
            cluster_count: geometry.cluster_count,
            alloc_hint: 2,
        })
    }

    pub fn fat_type(&self) -> FatType {
        self.fat_type
    }

    pub fn cluster_count(&self) -> u32 {
        self.cluster_count
    }

    pub fn sectors_per_cluster(&self) -> u8 {
        self.sectors_per_cluster
    }

    pub fn bytes_per_cluster(&self) -> u32 {
        (SECTOR_SIZE as u32) << self.cluster_shift
    }

    pub(crate) fn cluster_shift(&self) -> u8 {
        self.cluster_shift
    }

    pub(crate) fn root_dir_start(&self) -> u32 {
        self.root_dir_start
    }

    pub(crate) fn root_entry_count(&self) -> u16 {
        self.root_entry_count
    }

    /// Consumes the volume and returns the device. Unflushed cache
    /// contents are dropped; call [`Volume::flush`] first.
    pub fn into_device(self) -> D {
        self.device
    }

    /// Direct access to the device, bypassing the cache. Sectors the
    /// cache holds dirty are not visible through it until a flush.
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Highest valid cluster number. Data clusters are numbered from 2.
    pub(crate) fn max_cluster(&self) -> u32 {
        self.cluster_count.saturating_add(1)
    }

    /// First data sector of `cluster`.
    pub fn cluster_to_sector(&self, cluster: u32) -> Result<u32, FatError> {
        if cluster < 2 || cluster > self.max_cluster() {
            return Err(VolumeError::Corruption.into());
        }
        Ok(self.data_start + ((cluster - 2) << self.cluster_shift))
    }

    /// Writes back the cached sector if dirty. Dirty FAT sectors are
    /// mirrored to every FAT copy.
    pub fn flush(&mut self) -> Result<(), FatError> {
        if !(self.cache.valid && self.cache.dirty) {
            return Ok(());
        }
        self.device.write_sector(self.cache.sector, &self.cache.buf)?;
        let in_fat = self.cache.sector >= self.fat_start
            && self.cache.sector < self.fat_start + self.sectors_per_fat;
        if in_fat {
            for copy in 1..self.fat_count as u32 {
                let mirror = self.cache.sector + copy * self.sectors_per_fat;
                self.device.write_sector(mirror, &self.cache.buf)?;
            }
        }
        self.cache.dirty = false;
        Ok(())
    }

    fn cache_load(&mut self, sector: u32) -> Result<(), FatError> {
        if self.cache.valid && self.cache.sector == sector {
            return Ok(());
        }
        self.flush()?;
        self.cache.valid = false;
        self.device.read_sector(sector, &mut self.cache.buf)?;
        self.cache.sector = sector;
        self.cache.valid = true;
        Ok(())
    }

    pub(crate) fn cache_read(&mut self, sector: u32) -> Result<&[u8; SECTOR_SIZE], FatError> {
        self.cache_load(sector)?;
        Ok(&self.cache.buf)
    }

    pub(crate) fn cache_write(&mut self, sector: u32) -> Result<&mut [u8; SECTOR_SIZE], FatError> {
        self.cache_load(sector)?;
        self.cache.dirty = true;
        Ok(&mut self.cache.buf)
    }

    /// Claims the cache for `sector` zero-filled, without reading the
    /// device. For sectors whose on-disk content is dead (fresh
    /// clusters, whole-sector overwrites past end of file).
    pub(crate) fn cache_zero(&mut self, sector: u32) -> Result<&mut [u8; SECTOR_SIZE], FatError> {
        if !(self.cache.valid && self.cache.sector == sector) {
            self.flush()?;
            self.cache.sector = sector;
            self.cache.valid = true;
        }
        self.cache.buf.fill(0);
        self.cache.dirty = true;
        Ok(&mut self.cache.buf)
    }
}
