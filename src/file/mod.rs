//! Open-file handles for files and directories.
//!
//! A [`File`] is plain data: it never borrows the volume. Every
//! operation takes `&mut Volume<D>` explicitly, so one volume can back
//! any number of handles while the borrow checker still sees a single
//! mutable path to the device and cache.

mod open;
mod read_write;
#[cfg(test)]
mod tests;

use crate::device::BlockDevice;
use crate::dir::{self, DirEntry};
use crate::error::{FatError, FileError, VolumeError};
use crate::volume::{FatType, Volume};

/// `open()` flags, bitwise-OR'd together.
pub mod oflag {
    /// Open for reading.
    pub const READ: u8 = 0x01;
    /// Open for writing.
    pub const WRITE: u8 = 0x02;
    /// Open for reading and writing.
    pub const RDWR: u8 = READ | WRITE;
    /// Set position to end of file before each write.
    pub const APPEND: u8 = 0x04;
    /// Call `sync()` after each write.
    pub const SYNC: u8 = 0x08;
    /// Truncate to zero length on open.
    pub const TRUNC: u8 = 0x10;
    /// Set position to end of file after open.
    pub const AT_END: u8 = 0x20;
    /// Create the file if it does not exist.
    pub const CREAT: u8 = 0x40;
    /// With CREAT: fail if the file already exists.
    pub const EXCL: u8 = 0x80;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind {
    Closed,
    /// Regular file.
    Normal,
    /// FAT12/16 root directory: fixed-size reserved region, no
    /// cluster chain, cannot grow.
    RootFixed,
    /// FAT32 root directory (an ordinary cluster chain).
    Root32,
    SubDir,
}

/// An open file or directory.
#[derive(Clone, Debug)]
pub struct File {
    kind: FileKind,
    flags: u8,
    /// Directory entry needs write-back on sync.
    dirty: bool,
    position: u32,
    /// Chain member containing byte `position - 1`, or 0 before the
    /// first read/write after a rewind.
    cur_cluster: u32,
    first_cluster: u32,
    size: u32,
    /// Location of this file's own directory entry, for write-back.
    dir_sector: u32,
    dir_index: u8,
}

impl File {
    /// A closed handle; only `open()` and `make_dir()` are valid on it.
    pub const fn new() -> Self {
        Self {
            kind: FileKind::Closed,
            flags: 0,
            dirty: false,
            position: 0,
            cur_cluster: 0,
            first_cluster: 0,
            size: 0,
            dir_sector: 0,
            dir_index: 0,
        }
    }

    /// Handle on the volume's root directory.
    pub fn open_root<D: BlockDevice>(vol: &Volume<D>) -> File {
        let mut file = File::new();
        file.flags = oflag::READ;
        match vol.fat_type() {
            FatType::Fat32 => {
                file.kind = FileKind::Root32;
                file.first_cluster = vol.root_dir_start();
            }
            _ => {
                file.kind = FileKind::RootFixed;
                file.size = vol.root_entry_count() as u32 * dir::DIR_ENTRY_SIZE as u32;
            }
        }
        file
    }

    pub fn kind(&self) -> FileKind {
        self.kind
    }

    pub fn is_open(&self) -> bool {
        self.kind != FileKind::Closed
    }

    pub fn is_file(&self) -> bool {
        self.kind == FileKind::Normal
    }

    pub fn is_dir(&self) -> bool {
        matches!(
            self.kind,
            FileKind::RootFixed | FileKind::Root32 | FileKind::SubDir
        )
    }

    pub fn is_root(&self) -> bool {
        matches!(self.kind, FileKind::RootFixed | FileKind::Root32)
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn position(&self) -> u32 {
        self.position
    }

    pub fn first_cluster(&self) -> u32 {
        self.first_cluster
    }

    /// Resets position to the start, for files and directory
    /// iteration alike.
    pub fn rewind(&mut self) {
        self.position = 0;
        self.cur_cluster = 0;
    }

    /// Sets the byte position. Valid targets are `0..=size` for files
    /// (`size` being the append position); directories only rewind.
    pub fn seek<D: BlockDevice>(&mut self, vol: &mut Volume<D>, pos: u32) -> Result<(), FatError> {
        if !self.is_open() {
            return Err(FileError::NotOpen.into());
        }
        if self.kind == FileKind::RootFixed {
            if pos > self.size {
                return Err(FileError::OutOfRange.into());
            }
            self.position = pos;
            return Ok(());
        }
        if self.is_dir() {
            // Cluster directories have no recorded size; only rewind.
            if pos != 0 {
                return Err(FileError::OutOfRange.into());
            }
            self.rewind();
            return Ok(());
        }
        if pos > self.size {
            return Err(FileError::OutOfRange.into());
        }
        if pos == 0 {
            self.rewind();
            return Ok(());
        }

        let shift = vol.cluster_shift() as u32 + 9;
        let target = (pos - 1) >> shift;
        let mut steps;
        if self.position == 0 || target < (self.position - 1) >> shift {
            self.cur_cluster = self.first_cluster;
            steps = target;
        } else {
            steps = target - ((self.position - 1) >> shift);
        }
        while steps > 0 {
            self.cur_cluster = vol
                .next_cluster(self.cur_cluster)?
                .ok_or(FatError::Volume(VolumeError::Corruption))?;
            steps -= 1;
        }
        self.position = pos;
        Ok(())
    }

    /// Seek relative to the current position.
    pub fn seek_cur<D: BlockDevice>(
        &mut self,
        vol: &mut Volume<D>,
        offset: i32,
    ) -> Result<(), FatError> {
        let pos = (self.position as i64 + offset as i64)
            .try_into()
            .map_err(|_| FatError::File(FileError::OutOfRange))?;
        self.seek(vol, pos)
    }

    /// Seek relative to end of file.
    pub fn seek_end<D: BlockDevice>(
        &mut self,
        vol: &mut Volume<D>,
        offset: i32,
    ) -> Result<(), FatError> {
        let pos = (self.size as i64 + offset as i64)
            .try_into()
            .map_err(|_| FatError::File(FileError::OutOfRange))?;
        self.seek(vol, pos)
    }

    /// Writes back the directory entry if dirty and flushes the shared
    /// sector cache.
    pub fn sync<D: BlockDevice>(&mut self, vol: &mut Volume<D>) -> Result<(), FatError> {
        if !self.is_open() {
            return Err(FileError::NotOpen.into());
        }
        if self.dirty {
            if !self.is_root() {
                let base = self.dir_index as usize * dir::DIR_ENTRY_SIZE;
                let buf = vol.cache_write(self.dir_sector)?;
                let mut entry = DirEntry::decode(&buf[base..]);
                entry.first_cluster = self.first_cluster;
                entry.size = if self.kind == FileKind::Normal {
                    self.size
                } else {
                    0
                };
                entry.encode(&mut buf[base..base + dir::DIR_ENTRY_SIZE]);
            }
            self.dirty = false;
        }
        vol.flush()
    }

    /// Syncs and invalidates the handle.
    pub fn close<D: BlockDevice>(&mut self, vol: &mut Volume<D>) -> Result<(), FatError> {
        self.sync(vol)?;
        self.kind = FileKind::Closed;
        Ok(())
    }

    /// Restamps the entry's write and access fields with a packed FAT
    /// date/time (see [`dir::pack_date`]/[`dir::pack_time`]).
    pub fn timestamp<D: BlockDevice>(
        &mut self,
        vol: &mut Volume<D>,
        date: u16,
        time: u16,
    ) -> Result<(), FatError> {
        if !self.is_open() {
            return Err(FileError::NotOpen.into());
        }
        if self.is_root() {
            return Err(FileError::ReadOnly.into());
        }
        let base = self.dir_index as usize * dir::DIR_ENTRY_SIZE;
        let buf = vol.cache_write(self.dir_sector)?;
        let mut entry = DirEntry::decode(&buf[base..]);
        entry.write_date = date;
        entry.write_time = time;
        entry.access_date = date;
        entry.encode(&mut buf[base..base + dir::DIR_ENTRY_SIZE]);
        Ok(())
    }

    pub(crate) fn read_allowed(&self) -> bool {
        self.is_dir() || (self.flags & oflag::READ) != 0
    }

    pub(crate) fn write_allowed(&self) -> bool {
        self.kind == FileKind::Normal && (self.flags & oflag::WRITE) != 0
    }
}

impl Default for File {
    fn default() -> Self {
        Self::new()
    }
}
