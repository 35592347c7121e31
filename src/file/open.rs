//! Directory entry lookup and lifecycle: open, create, mkdir, remove,
//! rename.

use crate::device::{BlockDevice, SECTOR_SIZE};
use crate::dir::{self, DirEntry};
use crate::error::{FatError, FileError, VolumeError};
use crate::volume::Volume;

use super::{oflag, File, FileKind};

const ENTRIES_PER_SECTOR: usize = SECTOR_SIZE / dir::DIR_ENTRY_SIZE;

/// Yields the absolute sectors of a directory in order. The fixed
/// FAT12/16 root is a flat run; everything else follows the cluster
/// chain, bounded so a looped chain surfaces as corruption.
enum DirSectors {
    Fixed { next: u32, end: u32 },
    Chain { cluster: u32, sector_in_cluster: u32, visited: u32 },
}

impl DirSectors {
    fn new<D: BlockDevice>(vol: &Volume<D>, dir: &File) -> DirSectors {
        if dir.kind == FileKind::RootFixed {
            let start = vol.root_dir_start();
            let sectors =
                (dir.size + SECTOR_SIZE as u32 - 1) / SECTOR_SIZE as u32;
            DirSectors::Fixed { next: start, end: start + sectors }
        } else {
            DirSectors::Chain {
                cluster: dir.first_cluster,
                sector_in_cluster: 0,
                visited: 0,
            }
        }
    }

    fn next<D: BlockDevice>(&mut self, vol: &mut Volume<D>) -> Result<Option<u32>, FatError> {
        match self {
            DirSectors::Fixed { next, end } => {
                if *next >= *end {
                    return Ok(None);
                }
                let sector = *next;
                *next += 1;
                Ok(Some(sector))
            }
            DirSectors::Chain { cluster, sector_in_cluster, visited } => {
                if *cluster == 0 {
                    return Ok(None);
                }
                if *sector_in_cluster >= vol.sectors_per_cluster() as u32 {
                    match vol.next_cluster(*cluster)? {
                        Some(next) => *cluster = next,
                        None => return Ok(None),
                    }
                    *sector_in_cluster = 0;
                    *visited += 1;
                    if *visited > vol.walk_limit() {
                        return Err(VolumeError::Corruption.into());
                    }
                }
                let sector = vol.cluster_to_sector(*cluster)? + *sector_in_cluster;
                *sector_in_cluster += 1;
                Ok(Some(sector))
            }
        }
    }
}

/// Result of scanning a directory for one short name.
struct Scan {
    /// Slot whose name matched, as (sector, slot index).
    hit: Option<(u32, u8)>,
    /// First reusable slot seen (deleted, or the free terminator).
    free: Option<(u32, u8)>,
}

fn scan_dir<D: BlockDevice>(
    vol: &mut Volume<D>,
    dir: &File,
    short: &[u8; 11],
) -> Result<Scan, FatError> {
    let mut sectors = DirSectors::new(vol, dir);
    let mut scan = Scan { hit: None, free: None };
    while let Some(sector) = sectors.next(vol)? {
        let data = vol.cache_read(sector)?;
        for index in 0..ENTRIES_PER_SECTOR {
            let base = index * dir::DIR_ENTRY_SIZE;
            let first = data[base];
            if first == dir::ENTRY_FREE {
                if scan.free.is_none() {
                    scan.free = Some((sector, index as u8));
                }
                return Ok(scan);
            }
            if first == dir::ENTRY_DELETED {
                if scan.free.is_none() {
                    scan.free = Some((sector, index as u8));
                }
                continue;
            }
            let attributes = data[base + 11];
            if attributes & dir::ATTR_LONG_NAME == dir::ATTR_LONG_NAME
                || attributes & dir::ATTR_VOLUME_ID != 0
            {
                continue;
            }
            if data[base..base + 11] == short[..] {
                scan.hit = Some((sector, index as u8));
                return Ok(scan);
            }
        }
    }
    Ok(scan)
}

impl File {
    /// Opens `name` inside `dir`. Lookup is by 8.3 short name; with
    /// `oflag::CREAT` a missing entry is created, and `oflag::EXCL`
    /// additionally demands that it did not exist.
    pub fn open<D: BlockDevice>(
        &mut self,
        vol: &mut Volume<D>,
        dir: &File,
        name: &str,
        flags: u8,
    ) -> Result<(), FatError> {
        if self.is_open() {
            return Err(FileError::AlreadyOpen.into());
        }
        if !dir.is_open() || !dir.is_dir() {
            return Err(FileError::NotADirectory.into());
        }
        let short = dir::make_short_name(name)?;

        let scan = scan_dir(vol, dir, &short)?;
        if let Some((sector, index)) = scan.hit {
            if flags & oflag::CREAT != 0 && flags & oflag::EXCL != 0 {
                return Err(FileError::AlreadyExists.into());
            }
            return self.open_entry(vol, sector, index, flags);
        }
        if flags & oflag::CREAT == 0 {
            return Err(FileError::NotFound.into());
        }

        let (sector, index) = match scan.free {
            Some(slot) => slot,
            None => (extend_dir(vol, dir)?, 0),
        };
        let entry = DirEntry::new(short, dir::ATTR_ARCHIVE);
        let base = index as usize * dir::DIR_ENTRY_SIZE;
        let buf = vol.cache_write(sector)?;
        entry.encode(&mut buf[base..base + dir::DIR_ENTRY_SIZE]);
        self.open_entry(vol, sector, index, flags)
    }

    /// Binds this handle to the slot at (`sector`, `index`), which must
    /// hold a live short entry.
    fn open_entry<D: BlockDevice>(
        &mut self,
        vol: &mut Volume<D>,
        sector: u32,
        index: u8,
        flags: u8,
    ) -> Result<(), FatError> {
        let base = index as usize * dir::DIR_ENTRY_SIZE;
        let data = vol.cache_read(sector)?;
        let entry = DirEntry::decode(&data[base..base + dir::DIR_ENTRY_SIZE]);

        if entry.is_dir() {
            if flags != oflag::READ {
                return Err(FileError::IsDirectory.into());
            }
            if entry.first_cluster == 0 {
                // A ".." entry naming the root stores cluster zero.
                *self = File::open_root(vol);
                return Ok(());
            }
            self.kind = FileKind::SubDir;
        } else {
            if flags & oflag::WRITE != 0 && entry.attributes & dir::ATTR_READ_ONLY != 0 {
                return Err(FileError::ReadOnly.into());
            }
            if flags & oflag::TRUNC != 0 && flags & oflag::WRITE == 0 {
                return Err(FileError::ReadOnly.into());
            }
            self.kind = FileKind::Normal;
        }
        self.flags = flags;
        self.dirty = false;
        self.position = 0;
        self.cur_cluster = 0;
        self.first_cluster = entry.first_cluster;
        self.size = entry.size;
        self.dir_sector = sector;
        self.dir_index = index;

        if self.kind == FileKind::Normal {
            if flags & oflag::TRUNC != 0 && self.size != 0 {
                self.truncate(vol, 0)?;
            }
            if flags & (oflag::AT_END | oflag::APPEND) != 0 {
                self.seek(vol, self.size)?;
            }
        }
        Ok(())
    }

    /// Creates `name` as a subdirectory of `parent` with its `.` and
    /// `..` entries, leaving this handle open on it read-only.
    pub fn make_dir<D: BlockDevice>(
        &mut self,
        vol: &mut Volume<D>,
        parent: &File,
        name: &str,
    ) -> Result<(), FatError> {
        self.open(vol, parent, name, oflag::CREAT | oflag::EXCL | oflag::RDWR)?;

        let cluster = match vol.allocate_cluster(0) {
            Ok(cluster) => cluster,
            Err(err) => {
                // Roll the fresh entry back before reporting.
                let buf = vol.cache_write(self.dir_sector)?;
                buf[self.dir_index as usize * dir::DIR_ENTRY_SIZE] = dir::ENTRY_DELETED;
                vol.flush()?;
                self.kind = FileKind::Closed;
                if matches!(err, FatError::Volume(VolumeError::DiskFull)) {
                    return Err(FileError::DiskFull.into());
                }
                return Err(err);
            }
        };

        let first = vol.cluster_to_sector(cluster)?;
        for s in 0..vol.sectors_per_cluster() as u32 {
            vol.cache_zero(first + s)?;
        }

        let mut dot = DirEntry::new(dir::DOT_NAME, dir::ATTR_DIRECTORY);
        dot.first_cluster = cluster;
        let mut dotdot = DirEntry::new(dir::DOTDOT_NAME, dir::ATTR_DIRECTORY);
        dotdot.first_cluster = if parent.is_root() { 0 } else { parent.first_cluster };
        let buf = vol.cache_write(first)?;
        dot.encode(&mut buf[..dir::DIR_ENTRY_SIZE]);
        dotdot.encode(&mut buf[dir::DIR_ENTRY_SIZE..2 * dir::DIR_ENTRY_SIZE]);

        // Flip our own slot to a directory entry.
        let base = self.dir_index as usize * dir::DIR_ENTRY_SIZE;
        let buf = vol.cache_write(self.dir_sector)?;
        buf[base + 11] = dir::ATTR_DIRECTORY;

        self.kind = FileKind::SubDir;
        self.first_cluster = cluster;
        self.size = 0;
        self.dirty = true;
        self.sync(vol)?;
        self.flags = oflag::READ;
        Ok(())
    }

    /// Removes the file this handle is open on. The chain is freed and
    /// the slot marked deleted; the handle ends up closed.
    pub fn remove<D: BlockDevice>(&mut self, vol: &mut Volume<D>) -> Result<(), FatError> {
        if !self.is_open() {
            return Err(FileError::NotOpen.into());
        }
        if !self.is_file() {
            return Err(FileError::IsDirectory.into());
        }
        if !self.write_allowed() {
            return Err(FileError::ReadOnly.into());
        }
        if self.first_cluster != 0 {
            vol.free_chain(self.first_cluster)?;
        }
        let buf = vol.cache_write(self.dir_sector)?;
        buf[self.dir_index as usize * dir::DIR_ENTRY_SIZE] = dir::ENTRY_DELETED;
        vol.flush()?;
        self.kind = FileKind::Closed;
        Ok(())
    }

    /// Removes the directory this handle is open on, which must be
    /// empty apart from its `.` and `..` entries.
    pub fn remove_dir<D: BlockDevice>(&mut self, vol: &mut Volume<D>) -> Result<(), FatError> {
        if !self.is_open() {
            return Err(FileError::NotOpen.into());
        }
        if self.is_root() {
            return Err(FileError::ReadOnly.into());
        }
        if self.kind != FileKind::SubDir {
            return Err(FileError::NotADirectory.into());
        }
        self.rewind();
        while let Some(entry) = self.next_entry(vol)? {
            if !entry.is_dot_entry() {
                return Err(FileError::NotEmpty.into());
            }
        }
        // Demote to a plain file so the removal path applies.
        self.kind = FileKind::Normal;
        self.flags |= oflag::WRITE;
        self.remove(vol)
    }

    /// Renames this entry to `new_name` inside `new_parent`, which may
    /// be the directory it already lives in. On a name conflict both
    /// entries are left untouched.
    pub fn rename<D: BlockDevice>(
        &mut self,
        vol: &mut Volume<D>,
        new_parent: &File,
        new_name: &str,
    ) -> Result<(), FatError> {
        if !self.is_open() {
            return Err(FileError::NotOpen.into());
        }
        if self.is_root() {
            return Err(FileError::ReadOnly.into());
        }
        if !new_parent.is_open() || !new_parent.is_dir() {
            return Err(FileError::NotADirectory.into());
        }
        let short = dir::make_short_name(new_name)?;
        // Settle any pending size/cluster update before copying the
        // raw slot.
        self.sync(vol)?;

        let scan = scan_dir(vol, new_parent, &short)?;
        if let Some((sector, index)) = scan.hit {
            if sector == self.dir_sector && index == self.dir_index {
                // Renaming to its own current name.
                return Ok(());
            }
            return Err(FileError::AlreadyExists.into());
        }

        let own_base = self.dir_index as usize * dir::DIR_ENTRY_SIZE;
        if same_parent(vol, new_parent, self.dir_sector)? {
            let buf = vol.cache_write(self.dir_sector)?;
            buf[own_base..own_base + 11].copy_from_slice(&short);
            return vol.flush();
        }

        // Moving across directories: copy the raw entry under its new
        // name, then delete the old slot.
        let mut raw = [0u8; dir::DIR_ENTRY_SIZE];
        let data = vol.cache_read(self.dir_sector)?;
        raw.copy_from_slice(&data[own_base..own_base + dir::DIR_ENTRY_SIZE]);
        raw[..11].copy_from_slice(&short);

        let (sector, index) = match scan.free {
            Some(slot) => slot,
            None => (extend_dir(vol, new_parent)?, 0),
        };
        let base = index as usize * dir::DIR_ENTRY_SIZE;
        let buf = vol.cache_write(sector)?;
        buf[base..base + dir::DIR_ENTRY_SIZE].copy_from_slice(&raw);

        let buf = vol.cache_write(self.dir_sector)?;
        buf[own_base] = dir::ENTRY_DELETED;
        self.dir_sector = sector;
        self.dir_index = index;

        if self.kind == FileKind::SubDir {
            // Keep ".." pointing at the new parent.
            let first = vol.cluster_to_sector(self.first_cluster)?;
            let base = dir::DIR_ENTRY_SIZE;
            let buf = vol.cache_write(first)?;
            let mut dotdot = DirEntry::decode(&buf[base..base + dir::DIR_ENTRY_SIZE]);
            dotdot.first_cluster =
                if new_parent.is_root() { 0 } else { new_parent.first_cluster };
            dotdot.encode(&mut buf[base..base + dir::DIR_ENTRY_SIZE]);
        }
        vol.flush()
    }
}

/// Whether `sector` belongs to `dir`, meaning a slot there stays in the
/// same directory.
fn same_parent<D: BlockDevice>(
    vol: &mut Volume<D>,
    dir: &File,
    sector: u32,
) -> Result<bool, FatError> {
    let mut sectors = DirSectors::new(vol, dir);
    while let Some(candidate) = sectors.next(vol)? {
        if candidate == sector {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Appends a zeroed cluster to a chain directory and returns its first
/// sector. The fixed FAT12/16 root cannot grow.
fn extend_dir<D: BlockDevice>(vol: &mut Volume<D>, dir: &File) -> Result<u32, FatError> {
    if dir.kind == FileKind::RootFixed {
        return Err(FileError::DiskFull.into());
    }
    let mut tail = dir.first_cluster;
    let mut visited = 0;
    while let Some(next) = vol.next_cluster(tail)? {
        tail = next;
        visited += 1;
        if visited > vol.walk_limit() {
            return Err(VolumeError::Corruption.into());
        }
    }
    let cluster = vol.allocate_cluster(tail)?;
    let first = vol.cluster_to_sector(cluster)?;
    for s in 0..vol.sectors_per_cluster() as u32 {
        vol.cache_zero(first + s)?;
    }
    Ok(first)
}
