//! Path-level facade over a mounted volume: open by path, a current
//! working directory, and the usual create/remove/rename operations.

use heapless::Vec;
use log::debug;

use crate::device::BlockDevice;
use crate::dir::DirEntry;
use crate::error::{FatError, FileError, NameError};
use crate::file::{oflag, File};
use crate::volume::Volume;

/// Most deeply nested path accepted, in components.
const MAX_DEPTH: usize = 8;

/// Splits a path on `/`, dropping empty components. Returns the
/// components and whether the path was absolute.
fn split_path(path: &str) -> Result<(Vec<&str, MAX_DEPTH>, bool), NameError> {
    let absolute = path.starts_with('/');
    let mut parts = Vec::new();
    for part in path.split('/') {
        if part.is_empty() {
            continue;
        }
        parts.push(part).map_err(|_| NameError::Invalid)?;
    }
    Ok((parts, absolute))
}

/// A mounted filesystem with a current working directory. All path
/// arguments are resolved against the working directory unless they
/// begin with `/`.
pub struct SdFat<D: BlockDevice> {
    vol: Volume<D>,
    cwd: File,
    last_error: Option<FatError>,
}

impl<D: BlockDevice> SdFat<D> {
    /// Mounts `device` and starts out in the root directory.
    pub fn mount(device: D) -> Result<SdFat<D>, FatError> {
        let vol = Volume::mount(device)?;
        let cwd = File::open_root(&vol);
        Ok(SdFat { vol, cwd, last_error: None })
    }

    pub fn volume(&self) -> &Volume<D> {
        &self.vol
    }

    pub fn volume_mut(&mut self) -> &mut Volume<D> {
        &mut self.vol
    }

    /// The error of the most recent failed operation, for callers that
    /// branch on a boolean style API like [`SdFat::exists`].
    pub fn last_error(&self) -> Option<FatError> {
        self.last_error
    }

    fn track<T>(&mut self, result: Result<T, FatError>) -> Result<T, FatError> {
        if let Err(err) = &result {
            self.last_error = Some(*err);
        }
        result
    }

    /// Opens every component of `parts` as a directory, starting from
    /// the root or the working directory.
    fn walk_dirs(&mut self, parts: &[&str], absolute: bool) -> Result<File, FatError> {
        let mut dir = if absolute { File::open_root(&self.vol) } else { self.cwd.clone() };
        for part in parts {
            let mut next = File::new();
            next.open(&mut self.vol, &dir, part, oflag::READ)?;
            if !next.is_dir() {
                return Err(FileError::NotADirectory.into());
            }
            dir = next;
        }
        Ok(dir)
    }

    /// Opens `path` with the given `oflag` bits. A path naming a
    /// directory only opens with plain `oflag::READ`.
    pub fn open(&mut self, path: &str, flags: u8) -> Result<File, FatError> {
        let result = self.open_inner(path, flags);
        self.track(result)
    }

    fn open_inner(&mut self, path: &str, flags: u8) -> Result<File, FatError> {
        let (parts, absolute) = split_path(path)?;
        let Some((name, parents)) = parts.split_last() else {
            if absolute {
                return Ok(File::open_root(&self.vol));
            }
            return Err(NameError::Invalid.into());
        };
        let parent = self.walk_dirs(parents, absolute)?;
        let mut file = File::new();
        file.open(&mut self.vol, &parent, name, flags)?;
        Ok(file)
    }

    /// Whether `path` names an existing file or directory.
    pub fn exists(&mut self, path: &str) -> bool {
        match self.open(path, oflag::READ) {
            Ok(mut file) => {
                let _ = file.close(&mut self.vol);
                true
            }
            Err(_) => false,
        }
    }

    /// Changes the working directory. `/` returns to the root.
    pub fn chdir(&mut self, path: &str) -> Result<(), FatError> {
        let result = self.chdir_inner(path);
        self.track(result)
    }

    fn chdir_inner(&mut self, path: &str) -> Result<(), FatError> {
        let (parts, absolute) = split_path(path)?;
        self.cwd = self.walk_dirs(&parts, absolute)?;
        Ok(())
    }

    /// Creates the directory at `path`. With `parents` set, missing
    /// intermediate directories are created too.
    pub fn mkdir(&mut self, path: &str, parents: bool) -> Result<(), FatError> {
        let result = self.mkdir_inner(path, parents);
        self.track(result)
    }

    fn mkdir_inner(&mut self, path: &str, parents: bool) -> Result<(), FatError> {
        let (parts, absolute) = split_path(path)?;
        let Some((last, leading)) = parts.split_last() else {
            return Err(FileError::AlreadyExists.into());
        };
        let mut dir = if absolute { File::open_root(&self.vol) } else { self.cwd.clone() };
        for part in leading {
            let mut next = File::new();
            match next.open(&mut self.vol, &dir, part, oflag::READ) {
                Ok(()) if next.is_dir() => {}
                Ok(()) => return Err(FileError::NotADirectory.into()),
                Err(FatError::File(FileError::NotFound)) if parents => {
                    next = File::new();
                    next.make_dir(&mut self.vol, &dir, part)?;
                }
                Err(err) => return Err(err),
            }
            dir = next;
        }
        let mut made = File::new();
        made.make_dir(&mut self.vol, &dir, last)?;
        debug!("mkdir {}", path);
        made.close(&mut self.vol)
    }

    /// Removes the empty directory at `path`.
    pub fn rmdir(&mut self, path: &str) -> Result<(), FatError> {
        let result = self.rmdir_inner(path);
        self.track(result)
    }

    fn rmdir_inner(&mut self, path: &str) -> Result<(), FatError> {
        let (parts, absolute) = split_path(path)?;
        let mut dir = self.walk_dirs(&parts, absolute)?;
        dir.remove_dir(&mut self.vol)
    }

    /// Deletes the file at `path`.
    pub fn remove(&mut self, path: &str) -> Result<(), FatError> {
        let result = self.remove_inner(path);
        self.track(result)
    }

    fn remove_inner(&mut self, path: &str) -> Result<(), FatError> {
        let mut file = self.open_inner(path, oflag::WRITE)?;
        file.remove(&mut self.vol)
    }

    /// Moves `from` to `to`. `to` names the destination entry, not a
    /// containing directory.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<(), FatError> {
        let result = self.rename_inner(from, to);
        self.track(result)
    }

    fn rename_inner(&mut self, from: &str, to: &str) -> Result<(), FatError> {
        let mut file = self.open_inner(from, oflag::READ)?;
        let (parts, absolute) = split_path(to)?;
        let Some((name, parents)) = parts.split_last() else {
            return Err(NameError::Invalid.into());
        };
        let parent = self.walk_dirs(parents, absolute)?;
        file.rename(&mut self.vol, &parent, name)?;
        file.close(&mut self.vol)
    }

    /// Shrinks the file at `path` to `size` bytes.
    pub fn truncate(&mut self, path: &str, size: u32) -> Result<(), FatError> {
        let result = self.truncate_inner(path, size);
        self.track(result)
    }

    fn truncate_inner(&mut self, path: &str, size: u32) -> Result<(), FatError> {
        let mut file = self.open_inner(path, oflag::WRITE)?;
        file.truncate(&mut self.vol, size)?;
        file.close(&mut self.vol)
    }

    /// Lists the working directory into `out`, skipping `.` and `..`.
    /// Returns the number of entries written; a full `out` truncates
    /// the listing.
    pub fn ls(&mut self, out: &mut [DirEntry]) -> Result<usize, FatError> {
        let result = self.ls_inner(out);
        self.track(result)
    }

    fn ls_inner(&mut self, out: &mut [DirEntry]) -> Result<usize, FatError> {
        self.cwd.rewind();
        let mut count = 0;
        while count < out.len() {
            match self.cwd.next_entry(&mut self.vol)? {
                Some(entry) if entry.is_dot_entry() => {}
                Some(entry) => {
                    out[count] = entry;
                    count += 1;
                }
                None => break,
            }
        }
        Ok(count)
    }

    /// Flushes the sector cache to the device.
    pub fn flush(&mut self) -> Result<(), FatError> {
        let result = self.vol.flush();
        self.track(result)
    }
}
