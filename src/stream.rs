//! Character-stream adapter over [`File`] with single-byte lookahead.

use crate::device::BlockDevice;
use crate::error::FatError;
use crate::file::File;
use crate::volume::Volume;

/// Seek origin for [`FileStream::seek`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeekFrom {
    Start(u32),
    Current(i32),
    End(i32),
}

/// Wraps a [`File`] with getc/putc semantics and one byte of pushback,
/// so parsers can peek at the next character without consuming it.
pub struct FileStream {
    file: File,
    peeked: Option<u8>,
}

impl FileStream {
    pub fn new(file: File) -> FileStream {
        FileStream { file, peeked: None }
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    /// Logical position, which lags the file position by one while a
    /// peeked byte is pending.
    pub fn position(&self) -> u32 {
        self.file.position() - self.peeked.is_some() as u32
    }

    /// Next byte, or `None` at end of file.
    pub fn getc<D: BlockDevice>(&mut self, vol: &mut Volume<D>) -> Result<Option<u8>, FatError> {
        if let Some(byte) = self.peeked.take() {
            return Ok(Some(byte));
        }
        let mut byte = [0u8; 1];
        match self.file.read(vol, &mut byte)? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }

    /// Next byte without consuming it.
    pub fn peek<D: BlockDevice>(&mut self, vol: &mut Volume<D>) -> Result<Option<u8>, FatError> {
        if self.peeked.is_none() {
            self.peeked = self.getc(vol)?;
        }
        Ok(self.peeked)
    }

    fn unpeek<D: BlockDevice>(&mut self, vol: &mut Volume<D>) -> Result<(), FatError> {
        if self.peeked.take().is_some() {
            self.file.seek_cur(vol, -1)?;
        }
        Ok(())
    }

    pub fn putc<D: BlockDevice>(&mut self, vol: &mut Volume<D>, byte: u8) -> Result<(), FatError> {
        self.write(vol, &[byte]).map(|_| ())
    }

    pub fn read<D: BlockDevice>(
        &mut self,
        vol: &mut Volume<D>,
        buf: &mut [u8],
    ) -> Result<usize, FatError> {
        if buf.is_empty() {
            return Ok(0);
        }
        if let Some(byte) = self.peeked.take() {
            buf[0] = byte;
            return Ok(1 + self.file.read(vol, &mut buf[1..])?);
        }
        self.file.read(vol, buf)
    }

    pub fn write<D: BlockDevice>(
        &mut self,
        vol: &mut Volume<D>,
        data: &[u8],
    ) -> Result<usize, FatError> {
        self.unpeek(vol)?;
        self.file.write(vol, data)
    }

    /// Repositions the stream, discarding any pending peeked byte.
    pub fn seek<D: BlockDevice>(
        &mut self,
        vol: &mut Volume<D>,
        from: SeekFrom,
    ) -> Result<(), FatError> {
        // The file position runs one past the logical position while a
        // peek is pending; relative seeks start from the logical spot.
        let lookahead = self.peeked.is_some() as i32;
        self.peeked = None;
        match from {
            SeekFrom::Start(pos) => self.file.seek(vol, pos),
            SeekFrom::Current(offset) => self.file.seek_cur(vol, offset - lookahead),
            SeekFrom::End(offset) => self.file.seek_end(vol, offset),
        }
    }

    pub fn sync<D: BlockDevice>(&mut self, vol: &mut Volume<D>) -> Result<(), FatError> {
        self.file.sync(vol)
    }

    /// Closes the underlying file.
    pub fn close<D: BlockDevice>(&mut self, vol: &mut Volume<D>) -> Result<(), FatError> {
        self.peeked = None;
        self.file.close(vol)
    }
}
