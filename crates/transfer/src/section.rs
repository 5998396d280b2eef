//! Positioned file I/O.
//!
//! Workers share one open file and each touches a disjoint range, so reads
//! and writes go through offset-addressed calls instead of the file cursor.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};

use crate::Range;

#[cfg(unix)]
fn pread(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    std::os::unix::fs::FileExt::read_at(file, buf, offset)
}

#[cfg(windows)]
fn pread(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    std::os::windows::fs::FileExt::seek_read(file, buf, offset)
}

#[cfg(unix)]
fn pwrite(file: &File, buf: &[u8], offset: u64) -> io::Result<usize> {
    std::os::unix::fs::FileExt::write_at(file, buf, offset)
}

#[cfg(windows)]
fn pwrite(file: &File, buf: &[u8], offset: u64) -> io::Result<usize> {
    std::os::windows::fs::FileExt::seek_write(file, buf, offset)
}

/// Reads exactly `range.length` bytes starting at `range.offset`.
///
/// Fails with `UnexpectedEof` if the file ends first.
pub fn read_exact_at(file: &File, range: Range) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; range.length as usize];
    let mut filled = 0;
    while filled < buf.len() {
        match pread(file, &mut buf[filled..], range.offset + filled as u64) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("file ended after {filled} bytes of range {range}"),
                ));
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(buf)
}

/// Writes `data` at `offset`, returning the number of bytes written.
///
/// Stops early only if the OS reports a zero-length write.
pub fn write_all_at(file: &File, data: &[u8], offset: u64) -> io::Result<usize> {
    let mut written = 0;
    while written < data.len() {
        match pwrite(file, &data[written..], offset + written as u64) {
            Ok(0) => break,
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(written)
}

/// A `Read + Seek` window over `[offset, offset + length)` of a shared file.
///
/// Positions are relative to the start of the window. The underlying file
/// cursor is never used.
pub struct SectionReader<'a> {
    file: &'a File,
    base: u64,
    length: u64,
    pos: u64,
}

impl<'a> SectionReader<'a> {
    /// Creates a reader over `range` of `file`.
    pub fn new(file: &'a File, range: Range) -> Self {
        Self {
            file,
            base: range.offset,
            length: range.length,
            pos: 0,
        }
    }
}

impl Read for SectionReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.length {
            return Ok(0);
        }
        let max = (self.length - self.pos).min(buf.len() as u64) as usize;
        let n = pread(self.file, &mut buf[..max], self.base + self.pos)?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for SectionReader<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::End(delta) => self.length.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };
        let Some(target) = target else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek to a negative or overflowing position",
            ));
        };
        self.pos = target;
        Ok(target)
    }
}
