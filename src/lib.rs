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

//! Read/write library for SFS disk images.
//!
//! [`Volume::mount`] parses a volume's superblock, volume-id entry and
//! index from any [`ByteIo`] backing store, and the returned [`Volume`]
//! exposes the usual directory/file operations — [`Volume::list`],
//! [`Volume::read`]/[`Volume::write`], [`Volume::create`]/[`Volume::mkdir`],
//! [`Volume::delete`]/[`Volume::rmdir`], [`Volume::rename`],
//! [`Volume::resize`] — over it. [`mount`] is a convenience wrapper for the
//! common case of mounting a host file.
//!
//! The interactive viewer, pretty-printers, and any OS-integration layer
//! translating these operations to a real mount point are outside this
//! crate's scope; it is a library, not a binary.

mod byteio;
mod codec;
mod entry;
mod entry_index;
mod error;
mod free_map;
mod path;
mod time;
mod util;
mod volume;

pub use byteio::ByteIo;
pub use error::{Error, Result};
pub use volume::{EntryKind, Stat, Volume};

use std::fs::OpenOptions;
use std::path::Path;

/// Opens `path` read/write and mounts it as an SFS volume.
pub fn mount(path: impl AsRef<Path>) -> Result<Volume<std::fs::File>> {
    let file = OpenOptions::new().read(true).write(true).open(path)?;
    Volume::mount(file)
}
