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

//! The mounted volume: owns the backing [`ByteIo`], the parsed
//! superblock, the [`EntryIndex`], and the [`FreeMap`], and exposes the
//! public filesystem operation surface. Every mutation here is
//! responsible for keeping all three in sync with each other and with
//! what is actually on disk — `EntryIndex` and `FreeMap` never write to
//! the backing store on their own.

use log::{debug, trace, warn};

use crate::byteio::ByteIo;
use crate::codec::{self, DirData, FileData, Superblock, SLOT_SIZE};
use crate::entry::{Entry, EntryData, EntryId};
use crate::entry_index::EntryIndex;
use crate::error::{Error, Result};
use crate::free_map::FreeMap;
use crate::path;
use crate::time;
use crate::util::ceil_division;

/// The kind of a live entry, as reported by [`Volume::stat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// Metadata returned by [`Volume::stat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub kind: EntryKind,
    /// File size in bytes; `0` for directories.
    pub size: u64,
    pub timestamp: i64,
}

/// A mounted SFS volume.
pub struct Volume<IO> {
    io: IO,
    superblock: Superblock,
    volume_id_offset: u64,
    volume_id: codec::VolumeIdData,
    index: EntryIndex,
    free_map: FreeMap,
}

impl<IO: ByteIo> Volume<IO> {
    /// Parses the superblock, volume-id entry, and full index from `io`,
    /// validates checksums, and builds the free-block map. Fails
    /// `CorruptImage`/`CorruptChecksum` on any structural violation.
    pub fn mount(mut io: IO) -> Result<Self> {
        let mut sb_buf = [0u8; codec::SUPERBLOCK_SIZE];
        io.read_at(codec::SUPERBLOCK_OFFSET, &mut sb_buf)?;
        let superblock = codec::decode_superblock(&sb_buf)?;
        debug!("mounted superblock: {superblock:?}");

        let block_size = superblock.block_size();
        let device_size = superblock.total_blocks * block_size;
        let volume_id_offset = device_size - SLOT_SIZE as u64;

        let mut vol_buf = [0u8; SLOT_SIZE];
        io.read_at(volume_id_offset, &mut vol_buf)?;
        let volume_id = codec::decode_volume_id(&vol_buf)?;

        let entries_size = superblock
            .index_size
            .checked_sub(SLOT_SIZE as u64)
            .ok_or(Error::CorruptImage("index_size smaller than the volume-id entry"))?;
        let start_marker_offset = volume_id_offset
            .checked_sub(entries_size)
            .ok_or(Error::CorruptImage("index_size larger than the device"))?;

        let index = EntryIndex::read(&mut io, start_marker_offset, volume_id_offset)?;
        trace!("read {} index entries", index.len());

        let data_end_block = superblock.total_blocks - ceil_division(superblock.index_size, block_size);
        let free_map = FreeMap::build(index.entries(), superblock.reserved_blocks as u64, data_end_block);

        Ok(Self {
            io,
            superblock,
            volume_id_offset,
            volume_id,
            index,
            free_map,
        })
    }

    /// Explicit, fallible unmount. `Drop` also releases the volume, but
    /// ignores errors (there both is nowhere to report them and nothing
    /// left to flush, since every mutation already writes through
    /// synchronously); call this instead when a caller wants to observe
    /// the last write's result.
    pub fn unmount(self) -> Result<()> {
        Ok(())
    }

    fn block_size(&self) -> u64 {
        self.superblock.block_size()
    }

    fn data_end_block(&self) -> u64 {
        self.superblock.total_blocks - ceil_division(self.superblock.index_size, self.block_size())
    }

    // -- read-only operations -------------------------------------------------

    pub fn stat(&self, path: &str) -> Result<Stat> {
        let name = path::normalize(path);
        let entry = self.index.find_entry(name).ok_or(Error::NotFound)?;
        Ok(match &entry.data {
            EntryData::File(f) => Stat { kind: EntryKind::File, size: f.file_length, timestamp: f.timestamp },
            EntryData::Directory(d) => Stat { kind: EntryKind::Directory, size: 0, timestamp: d.timestamp },
            _ => unreachable!("find_entry only returns live files and directories"),
        })
    }

    /// Basenames of `path`'s direct, live children.
    pub fn list(&self, path: &str) -> Result<Vec<String>> {
        let name = path::normalize(path);
        if !name.is_empty() {
            self.require_dir(name)?;
        }
        Ok(self
            .index
            .list_children(name)
            .filter_map(|e| e.name())
            .map(path::basename)
            .map(str::to_owned)
            .collect())
    }

    pub fn read(&mut self, path: &str, buf: &mut [u8], size: usize, offset: u64) -> Result<usize> {
        let name = path::normalize(path).to_owned();
        let fd = self.file_data(&name)?;
        if offset > fd.file_length {
            return Ok(0);
        }
        let n = size.min((fd.file_length - offset) as usize);
        self.io
            .read_at(fd.start_block * self.block_size() + offset, &mut buf[..n])?;
        Ok(n)
    }

    pub fn write(&mut self, path: &str, buf: &[u8], size: usize, offset: u64) -> Result<usize> {
        let name = path::normalize(path).to_owned();
        let fd = self.file_data(&name)?;
        if offset > fd.file_length {
            return Ok(0);
        }
        let n = size.min((fd.file_length - offset) as usize);
        self.io
            .write_at(fd.start_block * self.block_size() + offset, &buf[..n])?;
        Ok(n)
    }

    pub fn get_time(&self, path: &str) -> Result<i64> {
        Ok(self.stat(path)?.timestamp)
    }

    pub fn get_volume_time(&self) -> i64 {
        self.volume_id.timestamp
    }

    pub fn set_volume_time(&mut self, ts: i64) -> Result<()> {
        self.volume_id.timestamp = ts;
        let encoded = codec::encode_volume_id(&self.volume_id);
        self.io.write_at(self.volume_id_offset, &encoded)?;
        Ok(())
    }

    pub fn set_time(&mut self, path: &str, ts: i64) -> Result<()> {
        let name = path::normalize(path).to_owned();
        let entry = self.index.find_entry(&name).ok_or(Error::NotFound)?;
        let id = entry.id();
        let offset = entry.offset;
        match entry.data.clone() {
            EntryData::File(mut f) => {
                f.timestamp = ts;
                let encoded = codec::encode_file(
                    codec::TAG_FILE,
                    f.timestamp,
                    f.start_block,
                    f.end_block,
                    f.file_length,
                    &f.name,
                );
                self.io.write_at(offset, &encoded)?;
                self.index.get_mut(id).unwrap().data = EntryData::File(f);
            }
            EntryData::Directory(mut d) => {
                d.timestamp = ts;
                let encoded = codec::encode_directory(codec::TAG_DIRECTORY, d.timestamp, &d.name);
                self.io.write_at(offset, &encoded)?;
                self.index.get_mut(id).unwrap().data = EntryData::Directory(d);
            }
            _ => unreachable!("find_entry only returns live files and directories"),
        }
        Ok(())
    }

    fn file_data(&self, name: &str) -> Result<FileData> {
        match &self.require_file(name)?.data {
            EntryData::File(f) => Ok(f.clone()),
            _ => unreachable!(),
        }
    }

    // -- name validation --------------------------------------------------

    /// Resolves `name` to a live directory, distinguishing "no such entry"
    /// from "an entry exists there but it's a file".
    fn require_dir(&self, name: &str) -> Result<&Entry> {
        match self.index.find_entry(name) {
            Some(e) if e.is_live_directory() => Ok(e),
            Some(_) => Err(Error::NotADirectory),
            None => Err(Error::NotFound),
        }
    }

    /// Resolves `name` to a live file, distinguishing "no such entry" from
    /// "an entry exists there but it's a directory".
    fn require_file(&self, name: &str) -> Result<&Entry> {
        match self.index.find_entry(name) {
            Some(e) if e.is_live_file() => Ok(e),
            Some(_) => Err(Error::NotAFile),
            None => Err(Error::NotFound),
        }
    }

    /// Validates that `name` can be created fresh: non-empty basename, no
    /// existing live entry under that name, and (if nested) a live parent
    /// directory.
    fn validate_new_name(&self, name: &str) -> Result<()> {
        if path::basename(name).is_empty() {
            return Err(Error::InvalidName);
        }
        if self.index.find_entry(name).is_some() {
            return Err(Error::AlreadyExists);
        }
        if let Some(parent) = path::parent(name) {
            self.require_dir(parent)?;
        }
        Ok(())
    }

    // -- mutations ----------------------------------------------------------

    pub fn create(&mut self, path: &str) -> Result<()> {
        let name = path::normalize(path).to_owned();
        self.validate_new_name(&name)?;
        let reserved = self.superblock.reserved_blocks as u64;
        let data = EntryData::File(FileData {
            num_cont: codec::continuations_needed(name.len(), codec::FILE_NAME_BASE),
            timestamp: time::now(),
            start_block: reserved,
            end_block: reserved.saturating_sub(1),
            file_length: 0,
            name: name.clone(),
        });
        let encoded = codec::encode_file(codec::TAG_FILE, time::now(), reserved, reserved.saturating_sub(1), 0, &name);
        self.insert_entry(encoded, data)?;
        Ok(())
    }

    pub fn mkdir(&mut self, path: &str) -> Result<()> {
        let name = path::normalize(path).to_owned();
        self.validate_new_name(&name)?;
        let ts = time::now();
        let data = EntryData::Directory(DirData {
            num_cont: codec::continuations_needed(name.len(), codec::DIR_NAME_BASE),
            timestamp: ts,
            name: name.clone(),
        });
        let encoded = codec::encode_directory(codec::TAG_DIRECTORY, ts, &name);
        self.insert_entry(encoded, data)?;
        Ok(())
    }

    pub fn delete(&mut self, path: &str) -> Result<()> {
        let name = path::normalize(path).to_owned();
        let entry = self.require_file(&name)?.clone();
        let fd = match entry.data {
            EntryData::File(f) => f,
            _ => unreachable!(),
        };
        if fd.file_length == 0 {
            let pos = self.index.position_of(entry.id()).expect("entry just looked up");
            self.overwrite_with_unused(pos, entry.offset, entry.slot_count())?;
            return Ok(());
        }
        let encoded = codec::encode_file(
            codec::TAG_DELETED_FILE,
            fd.timestamp,
            fd.start_block,
            fd.end_block,
            fd.file_length,
            &fd.name,
        );
        self.io.write_at(entry.offset, &encoded)?;
        self.index.get_mut(entry.id()).unwrap().data = EntryData::DeletedFile(fd.clone());
        if let Some((s, e)) = entry.extent() {
            self.free_map.insert_tombstone(s, e, entry.id());
        }
        warn!("deleted nonempty file {name}, data retained as a tombstone");
        Ok(())
    }

    pub fn rmdir(&mut self, path: &str) -> Result<()> {
        let name = path::normalize(path).to_owned();
        let entry = self.index.find_dir(&name).ok_or(Error::NotFound)?.clone();
        if self.index.find_under(&name).next().is_some() {
            return Err(Error::NotEmpty);
        }
        let d = match entry.data {
            EntryData::Directory(d) => d,
            _ => unreachable!(),
        };
        let encoded = codec::encode_directory(codec::TAG_DELETED_DIRECTORY, d.timestamp, &d.name);
        self.io.write_at(entry.offset, &encoded)?;
        self.index.get_mut(entry.id()).unwrap().data = EntryData::DeletedDirectory(d);
        Ok(())
    }

    pub fn rename(&mut self, source: &str, dest: &str, replace: bool) -> Result<()> {
        let src_name = path::normalize(source).to_owned();
        let dst_name = path::normalize(dest).to_owned();
        if src_name == dst_name {
            return Ok(());
        }

        let src = self.index.find_entry(&src_name).ok_or(Error::NotFound)?.clone();
        if path::basename(&dst_name).is_empty() {
            return Err(Error::InvalidName);
        }
        if let Some(parent) = path::parent(&dst_name) {
            self.require_dir(parent)?;
        }

        if let Some(existing) = self.index.find_entry(&dst_name).cloned() {
            if !replace {
                return Err(Error::AlreadyExists);
            }
            match (&src.data, &existing.data) {
                (EntryData::File(_), EntryData::Directory(_)) => return Err(Error::NotAFile),
                (EntryData::Directory(_), EntryData::File(_)) => return Err(Error::NotADirectory),
                _ => {}
            }
            if existing.is_live_directory() && self.index.find_under(&dst_name).next().is_some() {
                return Err(Error::NotEmpty);
            }
            self.remove_live_entry(&existing)?;
        }

        match src.data.clone() {
            EntryData::File(f) => self.rename_file(&src, f, &dst_name)?,
            EntryData::Directory(d) => self.rename_directory(&src, d, &src_name, &dst_name)?,
            _ => unreachable!("find_entry only returns live files and directories"),
        }
        Ok(())
    }

    /// Deletes whatever live entry currently sits at `dst`, with the same
    /// semantics as [`Self::delete`]/[`Self::rmdir`], as the first half of
    /// a `replace`-d rename.
    fn remove_live_entry(&mut self, entry: &Entry) -> Result<()> {
        match &entry.data {
            EntryData::File(_) => self.delete(entry.name().unwrap()),
            EntryData::Directory(_) => self.rmdir(entry.name().unwrap()),
            _ => unreachable!(),
        }
    }

    fn rename_file(&mut self, src: &Entry, mut fd: FileData, dst_name: &str) -> Result<()> {
        let pos = self.index.position_of(src.id()).expect("entry just looked up");
        self.overwrite_with_unused(pos, src.offset, src.slot_count())?;
        fd.name = dst_name.to_owned();
        fd.num_cont = codec::continuations_needed(fd.name.len(), codec::FILE_NAME_BASE);
        let encoded = codec::encode_file(
            codec::TAG_FILE,
            fd.timestamp,
            fd.start_block,
            fd.end_block,
            fd.file_length,
            &fd.name,
        );
        self.insert_entry(encoded, EntryData::File(fd))?;
        Ok(())
    }

    fn rename_directory(&mut self, src: &Entry, mut d: DirData, src_name: &str, dst_name: &str) -> Result<()> {
        let descendants: Vec<Entry> = self.index.find_under(src_name).cloned().collect();

        let pos = self.index.position_of(src.id()).expect("entry just looked up");
        self.overwrite_with_unused(pos, src.offset, src.slot_count())?;
        d.name = dst_name.to_owned();
        d.num_cont = codec::continuations_needed(d.name.len(), codec::DIR_NAME_BASE);
        let encoded = codec::encode_directory(codec::TAG_DIRECTORY, d.timestamp, &d.name);
        self.insert_entry(encoded, EntryData::Directory(d))?;

        for descendant in descendants {
            let rest = &descendant.name().unwrap()[src_name.len()..];
            let new_name = format!("{dst_name}{rest}");
            let pos = self.index.position_of(descendant.id()).expect("descendant still indexed");
            self.overwrite_with_unused(pos, descendant.offset, descendant.slot_count())?;
            match descendant.data {
                EntryData::File(mut f) => {
                    f.name = new_name;
                    f.num_cont = codec::continuations_needed(f.name.len(), codec::FILE_NAME_BASE);
                    let encoded = codec::encode_file(
                        codec::TAG_FILE,
                        f.timestamp,
                        f.start_block,
                        f.end_block,
                        f.file_length,
                        &f.name,
                    );
                    self.insert_entry(encoded, EntryData::File(f))?;
                }
                EntryData::Directory(mut sub) => {
                    sub.name = new_name;
                    sub.num_cont = codec::continuations_needed(sub.name.len(), codec::DIR_NAME_BASE);
                    let encoded = codec::encode_directory(codec::TAG_DIRECTORY, sub.timestamp, &sub.name);
                    self.insert_entry(encoded, EntryData::Directory(sub))?;
                }
                _ => unreachable!("find_under only returns live files and directories"),
            }
        }
        Ok(())
    }

    pub fn resize(&mut self, path: &str, new_length: u64) -> Result<()> {
        let name = path::normalize(path).to_owned();
        let entry = self.require_file(&name)?.clone();
        let fd = match &entry.data {
            EntryData::File(f) => f.clone(),
            _ => unreachable!(),
        };

        let block_size = self.block_size();
        let b0 = ceil_division(fd.file_length, block_size);
        let b1 = ceil_division(new_length, block_size);
        let mut new_start = fd.start_block;
        let mut new_end = fd.end_block;

        if b1 > b0 {
            let grow = b1 - b0;
            if let Some(extra_start) = self.free_map.find_run_at(fd.end_block, grow) {
                self.free_map.allocate(extra_start, grow);
                new_end = fd.end_block + grow;
            } else {
                let start = self.free_map.find_free_run(b1).ok_or(Error::NoSpace)?;
                self.free_map.allocate(start, b1);
                if b0 > 0 {
                    let mut buf = vec![0u8; (b0 * block_size) as usize];
                    self.io.read_at(fd.start_block * block_size, &mut buf)?;
                    self.io.write_at(start * block_size, &buf)?;
                }
                if let Some((s, _)) = entry.extent() {
                    self.free_map.release(s, b0);
                }
                new_start = start;
                new_end = start + b1 - 1;
            }
        } else if b0 > b1 {
            let shrink = b0 - b1;
            self.free_map.release(fd.start_block + b1, shrink);
            new_end = if b1 == 0 { new_start.saturating_sub(1) } else { new_start + b1 - 1 };
        }

        if new_length > fd.file_length {
            let gap_start = new_start * block_size + fd.file_length;
            let zeros = vec![0u8; (new_length - fd.file_length) as usize];
            self.io.write_at(gap_start, &zeros)?;
        }

        let new_fd = FileData {
            num_cont: fd.num_cont,
            timestamp: fd.timestamp,
            start_block: new_start,
            end_block: new_end,
            file_length: new_length,
            name: fd.name.clone(),
        };
        let encoded = codec::encode_file(
            codec::TAG_FILE,
            new_fd.timestamp,
            new_fd.start_block,
            new_fd.end_block,
            new_fd.file_length,
            &new_fd.name,
        );
        self.io.write_at(entry.offset, &encoded)?;
        self.index.get_mut(entry.id()).unwrap().data = EntryData::File(new_fd);
        Ok(())
    }

    // -- insertion protocol ---------------------------------------------------

    fn overwrite_with_unused(&mut self, pos: usize, offset: u64, slot_count: u64) -> Result<()> {
        let mut off = offset;
        let mut replacement = Vec::with_capacity(slot_count as usize);
        for _ in 0..slot_count {
            self.io.write_at(off, &codec::encode_unused())?;
            replacement.push(Entry { offset: off, data: EntryData::Unused });
            off += SLOT_SIZE as u64;
        }
        self.index.splice(pos, 1, replacement);
        Ok(())
    }

    /// Inserts a new entry, trying the reusable-slot scan first and
    /// falling back to prepending the index when no run is big enough.
    fn insert_entry(&mut self, encoded: Vec<u8>, data: EntryData) -> Result<EntryId> {
        let k = encoded.len() as u64 / SLOT_SIZE as u64;
        if let Some((start_idx, run_len)) = self.index.find_reusable_run(k) {
            self.reclaim_run(start_idx, run_len, k, encoded, data)
        } else {
            self.prepend_entry(encoded, data)
        }
    }

    fn reclaim_run(
        &mut self,
        start_idx: usize,
        run_len: u64,
        k: u64,
        encoded: Vec<u8>,
        data: EntryData,
    ) -> Result<EntryId> {
        let start_offset = self.index.entries()[start_idx].offset;

        let mut consumed_slots = 0u64;
        let mut i = start_idx;
        while consumed_slots < run_len {
            let e = &self.index.entries()[i];
            if let EntryData::DeletedFile(_) = &e.data {
                self.free_map.release_tombstone(e.id());
            }
            consumed_slots += e.slot_count();
            i += 1;
        }
        let consumed_entries = i - start_idx;

        self.io.write_at(start_offset, &encoded)?;
        let mut replacement = vec![Entry { offset: start_offset, data }];
        let mut off = start_offset + encoded.len() as u64;
        for _ in 0..(run_len - k) {
            self.io.write_at(off, &codec::encode_unused())?;
            replacement.push(Entry { offset: off, data: EntryData::Unused });
            off += SLOT_SIZE as u64;
        }

        trace!("reclaimed {consumed_entries} entries ({run_len} slots) for a {k}-slot entry");
        self.index.splice(start_idx, consumed_entries, replacement);
        Ok(EntryId(start_offset))
    }

    fn prepend_entry(&mut self, encoded: Vec<u8>, data: EntryData) -> Result<EntryId> {
        let k = encoded.len() as u64 / SLOT_SIZE as u64;
        let block_size = self.block_size();

        let old_total_index = self.superblock.index_size;
        let new_total_index = old_total_index + k * SLOT_SIZE as u64;
        let index_blocks_before = ceil_division(old_total_index, block_size);
        let index_blocks_after = ceil_division(new_total_index, block_size);
        let grown_blocks = index_blocks_after - index_blocks_before;

        if grown_blocks > 0 {
            let data_end = self.data_end_block();
            if !self.free_map.consume_trailing_free(data_end, grown_blocks) {
                warn!("prepend needs {grown_blocks} more index block(s) but the data region has no trailing free space");
                return Err(Error::NoSpace);
            }
        }

        let new_start_marker_offset = self.index.start_marker_offset() - k * SLOT_SIZE as u64;
        let new_entry_offset = new_start_marker_offset + SLOT_SIZE as u64;

        self.io.write_at(new_entry_offset, &encoded)?;
        let marker_bytes = codec::encode_start_marker();
        self.io.write_at(new_start_marker_offset, &marker_bytes)?;
        self.superblock.index_size = new_total_index;
        let sb_bytes = codec::encode_superblock(&self.superblock);
        self.io.write_at(codec::SUPERBLOCK_OFFSET, &sb_bytes)?;

        self.index
            .set_start_marker(Entry { offset: new_start_marker_offset, data: EntryData::StartMarker });
        self.index.insert_at(1, Entry { offset: new_entry_offset, data });

        debug!("prepended index by {k} slot(s), index_size now {new_total_index}");
        Ok(EntryId(new_entry_offset))
    }
}

impl<IO> Drop for Volume<IO> {
    fn drop(&mut self) {}
}
