//! Positional storage underneath FITS containers.
//!
//! Every transfer names an absolute byte offset, so nothing here tracks a
//! cursor. [`std::fs::File`] and the in-memory [`MemoryFile`] implement
//! [`RandomAccess`]; any other device can be plugged in the same way.

use std::fs::File;
use std::io::{self, ErrorKind};

/// A byte device addressed by absolute offset.
pub trait RandomAccess {
    /// Read up to `buf.len()` bytes starting at `offset`, returning how many
    /// were read. Zero means `offset` is at or past the end.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;

    /// Write up to `buf.len()` bytes at `offset`, returning how many were
    /// written. Writing past the end grows the device.
    fn write_at(&mut self, buf: &[u8], offset: u64) -> io::Result<usize>;

    /// Current length in bytes.
    fn size(&self) -> io::Result<u64>;

    /// Grow or shrink the device to `size` bytes. Grown regions read as zero.
    fn set_size(&mut self, size: u64) -> io::Result<()>;

    /// Push buffered writes to the device.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// Fill `buf` completely from `offset`.
    fn read_exact_at(&self, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
        while !buf.is_empty() {
            match self.read_at(buf, offset) {
                Ok(0) => {
                    return Err(io::Error::new(
                        ErrorKind::UnexpectedEof,
                        "failed to fill whole buffer",
                    ))
                }
                Ok(n) => {
                    buf = &mut buf[n..];
                    offset += n as u64;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Write all of `buf` at `offset`.
    fn write_all_at(&mut self, mut buf: &[u8], mut offset: u64) -> io::Result<()> {
        while !buf.is_empty() {
            match self.write_at(buf, offset) {
                Ok(0) => {
                    return Err(io::Error::new(
                        ErrorKind::WriteZero,
                        "failed to write whole buffer",
                    ))
                }
                Ok(n) => {
                    buf = &buf[n..];
                    offset += n as u64;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

impl RandomAccess for File {
    #[cfg(unix)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        std::os::unix::fs::FileExt::read_at(self, buf, offset)
    }

    #[cfg(windows)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        std::os::windows::fs::FileExt::seek_read(self, buf, offset)
    }

    #[cfg(unix)]
    fn write_at(&mut self, buf: &[u8], offset: u64) -> io::Result<usize> {
        std::os::unix::fs::FileExt::write_at(self, buf, offset)
    }

    #[cfg(windows)]
    fn write_at(&mut self, buf: &[u8], offset: u64) -> io::Result<usize> {
        std::os::windows::fs::FileExt::seek_write(self, buf, offset)
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn set_size(&mut self, size: u64) -> io::Result<()> {
        self.set_len(size)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sync_data()
    }
}

impl<T: RandomAccess + ?Sized> RandomAccess for Box<T> {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        (**self).read_at(buf, offset)
    }

    fn write_at(&mut self, buf: &[u8], offset: u64) -> io::Result<usize> {
        (**self).write_at(buf, offset)
    }

    fn size(&self) -> io::Result<u64> {
        (**self).size()
    }

    fn set_size(&mut self, size: u64) -> io::Result<()> {
        (**self).set_size(size)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }
}

/// A growable in-memory byte device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryFile {
    data: Vec<u8>,
}

impl MemoryFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow the stored bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Consume the device, returning its bytes.
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl From<Vec<u8>> for MemoryFile {
    fn from(data: Vec<u8>) -> Self {
        MemoryFile { data }
    }
}

fn offset_to_usize(offset: u64) -> io::Result<usize> {
    usize::try_from(offset)
        .map_err(|_| io::Error::new(ErrorKind::InvalidInput, "offset exceeds address space"))
}

impl RandomAccess for MemoryFile {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let start = offset_to_usize(offset)?;
        if start >= self.data.len() {
            return Ok(0);
        }
        let available = &self.data[start..];
        let n = buf.len().min(available.len());
        buf[..n].copy_from_slice(&available[..n]);
        Ok(n)
    }

    fn write_at(&mut self, buf: &[u8], offset: u64) -> io::Result<usize> {
        let start = offset_to_usize(offset)?;
        let end = start
            .checked_add(buf.len())
            .ok_or_else(|| io::Error::new(ErrorKind::InvalidInput, "write overflows"))?;
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(buf);
        Ok(buf.len())
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.data.len() as u64)
    }

    fn set_size(&mut self, size: u64) -> io::Result<()> {
        self.data.resize(offset_to_usize(size)?, 0);
        Ok(())
    }
}
