//! Byte-level read/write/truncate and directory iteration.

use log::warn;

use crate::device::{BlockDevice, SECTOR_SIZE};
use crate::dir::{self, DirEntry};
use crate::error::{FatError, FileError, VolumeError};
use crate::volume::Volume;

use super::{oflag, File, FileKind};

impl File {
    /// Absolute sector holding the current position, following the
    /// chain when the position sits on a cluster boundary. `None`
    /// means end of chain (directory end, or an empty file).
    fn position_sector<D: BlockDevice>(
        &mut self,
        vol: &mut Volume<D>,
    ) -> Result<Option<u32>, FatError> {
        if self.kind == FileKind::RootFixed {
            return Ok(Some(vol.root_dir_start() + (self.position / SECTOR_SIZE as u32)));
        }
        let cluster_mask = vol.bytes_per_cluster() - 1;
        if self.position & cluster_mask == 0 {
            if self.position == 0 {
                if self.first_cluster == 0 {
                    return Ok(None);
                }
                self.cur_cluster = self.first_cluster;
            } else {
                match vol.next_cluster(self.cur_cluster)? {
                    Some(next) => self.cur_cluster = next,
                    None => return Ok(None),
                }
            }
        }
        let sector_in_cluster = (self.position & cluster_mask) / SECTOR_SIZE as u32;
        Ok(Some(vol.cluster_to_sector(self.cur_cluster)? + sector_in_cluster))
    }

    /// Reads up to `buf.len()` bytes at the current position, crossing
    /// cluster boundaries transparently. Returns the byte count
    /// actually read; fewer than requested only at end of file.
    pub fn read<D: BlockDevice>(
        &mut self,
        vol: &mut Volume<D>,
        buf: &mut [u8],
    ) -> Result<usize, FatError> {
        if !self.is_open() {
            return Err(FileError::NotOpen.into());
        }
        if !self.read_allowed() {
            // Write-only handle: not open for reading.
            return Err(FileError::NotOpen.into());
        }

        // Regular files and the fixed root have a known size; cluster
        // directories read until the chain ends.
        let mut want = buf.len() as u32;
        if matches!(self.kind, FileKind::Normal | FileKind::RootFixed) {
            want = want.min(self.size - self.position);
        }

        let mut done = 0u32;
        while done < want {
            let Some(sector) = self.position_sector(vol)? else {
                break;
            };
            let offset = (self.position % SECTOR_SIZE as u32) as usize;
            let chunk = (want - done).min((SECTOR_SIZE - offset) as u32) as usize;
            let data = vol.cache_read(sector)?;
            buf[done as usize..done as usize + chunk]
                .copy_from_slice(&data[offset..offset + chunk]);
            done += chunk as u32;
            self.position += chunk as u32;
        }
        Ok(done as usize)
    }

    /// Writes at the current position, allocating clusters as the
    /// chain runs out. When allocation fails mid-write the bytes
    /// already written stay in place and the short count is returned;
    /// failing before any byte lands is `FileError::DiskFull`.
    pub fn write<D: BlockDevice>(
        &mut self,
        vol: &mut Volume<D>,
        data: &[u8],
    ) -> Result<usize, FatError> {
        if !self.is_open() {
            return Err(FileError::NotOpen.into());
        }
        if self.is_dir() {
            return Err(FileError::IsDirectory.into());
        }
        if !self.write_allowed() {
            return Err(FileError::ReadOnly.into());
        }
        if self.flags & oflag::APPEND != 0 && self.position != self.size {
            self.seek(vol, self.size)?;
        }

        let cluster_mask = vol.bytes_per_cluster() - 1;
        let mut done = 0usize;
        while done < data.len() {
            if self.position & cluster_mask == 0 {
                // On a cluster boundary: bind the next chain member,
                // extending the chain at end of file.
                let next = if self.position == 0 && self.first_cluster == 0 {
                    match vol.allocate_cluster(0) {
                        Ok(cluster) => {
                            self.first_cluster = cluster;
                            self.dirty = true;
                            cluster
                        }
                        Err(err) => return self.short_write(done, err),
                    }
                } else if self.position == 0 {
                    self.first_cluster
                } else {
                    match vol.next_cluster(self.cur_cluster)? {
                        Some(next) => next,
                        None => match vol.allocate_cluster(self.cur_cluster) {
                            Ok(cluster) => cluster,
                            Err(err) => return self.short_write(done, err),
                        },
                    }
                };
                self.cur_cluster = next;
            }

            let offset = (self.position % SECTOR_SIZE as u32) as usize;
            let sector = vol.cluster_to_sector(self.cur_cluster)?
                + (self.position & cluster_mask) / SECTOR_SIZE as u32;
            let chunk = (data.len() - done).min(SECTOR_SIZE - offset);

            // A sector that starts at or past end of file holds no live
            // data, so claim it zeroed instead of reading it back.
            let buf = if offset == 0 && self.position >= self.size {
                vol.cache_zero(sector)?
            } else {
                vol.cache_write(sector)?
            };
            buf[offset..offset + chunk].copy_from_slice(&data[done..done + chunk]);

            done += chunk;
            self.position += chunk as u32;
            if self.position > self.size {
                self.size = self.position;
                self.dirty = true;
            }
        }

        if self.flags & oflag::SYNC != 0 {
            self.sync(vol)?;
        }
        Ok(done)
    }

    fn short_write(&mut self, done: usize, err: FatError) -> Result<usize, FatError> {
        if !matches!(err, FatError::Volume(VolumeError::DiskFull)) {
            return Err(err);
        }
        if done > 0 {
            warn!("volume full mid-write, returning short count {}", done);
            Ok(done)
        } else {
            Err(FileError::DiskFull.into())
        }
    }

    /// Shrinks the file to `new_size`, freeing clusters past the new
    /// tail. Growing is not supported; the position is clamped to the
    /// new size.
    pub fn truncate<D: BlockDevice>(
        &mut self,
        vol: &mut Volume<D>,
        new_size: u32,
    ) -> Result<(), FatError> {
        if !self.is_open() {
            return Err(FileError::NotOpen.into());
        }
        if self.is_dir() {
            return Err(FileError::IsDirectory.into());
        }
        if !self.write_allowed() {
            return Err(FileError::ReadOnly.into());
        }
        if new_size > self.size {
            return Err(FileError::OutOfRange.into());
        }
        if new_size == self.size {
            return Ok(());
        }

        let old_position = self.position;
        if new_size == 0 {
            if self.first_cluster != 0 {
                vol.free_chain(self.first_cluster)?;
                self.first_cluster = 0;
            }
        } else {
            self.seek(vol, new_size)?;
            if let Some(next) = vol.next_cluster(self.cur_cluster)? {
                vol.set_chain_end(self.cur_cluster)?;
                vol.free_chain(next)?;
            }
        }

        self.size = new_size;
        self.dirty = true;
        self.rewind();
        if old_position.min(new_size) > 0 {
            self.seek(vol, old_position.min(new_size))?;
        }
        self.sync(vol)
    }

    /// Next live directory entry, skipping deleted slots, long-name
    /// slots, and volume labels. `None` at the end of the directory;
    /// restart with [`File::rewind`].
    pub fn next_entry<D: BlockDevice>(
        &mut self,
        vol: &mut Volume<D>,
    ) -> Result<Option<DirEntry>, FatError> {
        if !self.is_open() {
            return Err(FileError::NotOpen.into());
        }
        if !self.is_dir() {
            return Err(FileError::NotADirectory.into());
        }
        loop {
            let mut raw = [0u8; dir::DIR_ENTRY_SIZE];
            if self.read(vol, &mut raw)? < dir::DIR_ENTRY_SIZE {
                return Ok(None);
            }
            if raw[0] == dir::ENTRY_FREE {
                return Ok(None);
            }
            if raw[0] == dir::ENTRY_DELETED {
                continue;
            }
            let entry = DirEntry::decode(&raw);
            if entry.is_long_name() || entry.is_volume_label() {
                continue;
            }
            return Ok(Some(entry));
        }
    }
}
