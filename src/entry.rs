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

//! The decoded, typed form of every index-entry kind, and the small amount
//! of per-kind logic (slot count, reusability, live/tombstone pairing)
//! that [`crate::entry_index`] and [`crate::volume`] build on.

use crate::codec::{self, DirData, FileData, UnusableData, VolumeIdData, SLOT_SIZE};

/// A stable identity for an entry: the byte offset of its first slot.
/// Offsets never change once an entry is written (mutations either
/// rewrite an entry in place or remove it outright), which is what lets
/// `FreeMap` tombstones reference an `EntryId` instead of a raw pointer
/// or a `Vec` position that a splice could invalidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId(pub u64);

/// A decoded index entry together with its byte offset in the index
/// region (the offset of its first slot, counting down from the end of
/// the device).
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub offset: u64,
    pub data: EntryData,
}

/// The payload of a decoded entry, tagged by kind.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryData {
    VolumeId(VolumeIdData),
    StartMarker,
    Unused,
    Directory(DirData),
    File(FileData),
    Unusable(UnusableData),
    DeletedDirectory(DirData),
    DeletedFile(FileData),
}

impl Entry {
    /// Number of 64-byte slots this entry (including continuations)
    /// occupies.
    pub fn id(&self) -> EntryId {
        EntryId(self.offset)
    }

    pub fn slot_count(&self) -> u64 {
        let num_cont = match &self.data {
            EntryData::Directory(d) | EntryData::DeletedDirectory(d) => d.num_cont,
            EntryData::File(f) | EntryData::DeletedFile(f) => f.num_cont,
            _ => 0,
        };
        1 + num_cont as u64
    }

    /// Byte length of this entry's full slot span.
    pub fn byte_len(&self) -> u64 {
        self.slot_count() * SLOT_SIZE as u64
    }

    /// The entry's on-disk type tag.
    pub fn tag(&self) -> u8 {
        match &self.data {
            EntryData::VolumeId(_) => codec::TAG_VOLUME_ID,
            EntryData::StartMarker => codec::TAG_START_MARKER,
            EntryData::Unused => codec::TAG_UNUSED,
            EntryData::Directory(_) => codec::TAG_DIRECTORY,
            EntryData::File(_) => codec::TAG_FILE,
            EntryData::Unusable(_) => codec::TAG_UNUSABLE,
            EntryData::DeletedDirectory(_) => codec::TAG_DELETED_DIRECTORY,
            EntryData::DeletedFile(_) => codec::TAG_DELETED_FILE,
        }
    }

    /// Whether this slot may be reclaimed by the insertion protocol's
    /// reusable-slot scan (an unused slot or either kind of tombstone).
    pub fn is_reusable(&self) -> bool {
        matches!(
            self.data,
            EntryData::Unused | EntryData::DeletedDirectory(_) | EntryData::DeletedFile(_)
        )
    }

    /// Whether this entry is a live directory.
    pub fn is_live_directory(&self) -> bool {
        matches!(self.data, EntryData::Directory(_))
    }

    /// Whether this entry is a live file.
    pub fn is_live_file(&self) -> bool {
        matches!(self.data, EntryData::File(_))
    }

    /// Whether this entry is a tombstone (deleted directory or file).
    pub fn is_tombstone(&self) -> bool {
        matches!(
            self.data,
            EntryData::DeletedDirectory(_) | EntryData::DeletedFile(_)
        )
    }

    /// The entry's name, for every kind that carries one.
    pub fn name(&self) -> Option<&str> {
        match &self.data {
            EntryData::VolumeId(v) => Some(&v.name),
            EntryData::Directory(d) | EntryData::DeletedDirectory(d) => Some(&d.name),
            EntryData::File(f) | EntryData::DeletedFile(f) => Some(&f.name),
            _ => None,
        }
    }

    /// The `[start_block, end_block]` extent this entry occupies in the
    /// data region, for every kind that owns one. A file's extent is
    /// inclusive; an empty file (`end_block == start_block - 1`) owns no
    /// blocks at all.
    pub fn extent(&self) -> Option<(u64, u64)> {
        match &self.data {
            EntryData::File(f) | EntryData::DeletedFile(f) => {
                if f.end_block + 1 == f.start_block {
                    None
                } else {
                    Some((f.start_block, f.end_block))
                }
            }
            EntryData::Unusable(u) => Some((u.start_block, u.end_block)),
            _ => None,
        }
    }
}
