/*
 * Copyright 2026 the sfs contributors
 *
 * This file is part of sfs.
 *
 * sfs is free software: you can redistribute it and/or modify it under the
 * terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or (at your option) any later
 * version.
 *
 * sfs is distributed in the hope that it will be useful, but WITHOUT ANY
 * WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR
 * A PARTICULAR PURPOSE. See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * sfs. If not, see <https://www.gnu.org/licenses/>.
 */

//! A seekable random-access byte stream over the backing file.
//!
//! Every other component talks to the backing store exclusively through
//! [`ByteIo`] rather than `std::fs::File` directly, so tests can swap in
//! an in-memory backing store without touching the filesystem.

use std::io::{self, Read, Seek, SeekFrom, Write};

/// Random-access read/write/length over a byte stream.
///
/// A blanket impl covers any `Read + Write + Seek`, so both `std::fs::File`
/// and `std::io::Cursor<Vec<u8>>` (used by this crate's tests) work without
/// extra glue.
pub trait ByteIo {
    /// Reads `buf.len()` bytes starting at byte offset `offset`.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()>;

    /// Writes `buf` starting at byte offset `offset`.
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<()>;

    /// Returns the total length of the stream in bytes.
    fn len(&mut self) -> io::Result<u64>;
}

impl<T: Read + Write + Seek> ByteIo for T {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        self.seek(SeekFrom::Start(offset))?;
        self.read_exact(buf)
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<()> {
        self.seek(SeekFrom::Start(offset))?;
        self.write_all(buf)
    }

    fn len(&mut self) -> io::Result<u64> {
        self.seek(SeekFrom::End(0))
    }
}
