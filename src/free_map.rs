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

//! The ordered list of free and tombstone extents in the data region.
//!
//! Built once at mount by differencing live-file, unusable, and
//! deleted-file extents against `[reserved_blocks, data_end_block)`, and
//! kept in sync incrementally afterwards by `Volume`'s mutations. A
//! tombstone extent references the deleted-file entry that still owns it
//! by [`EntryId`] — the entry's on-disk offset, which never moves for the
//! lifetime of the entry — rather than a raw pointer.

use crate::entry::{Entry, EntryData, EntryId};

/// Whether an extent is available for fresh allocation, or still owned by
/// a recoverable deleted file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtentKind {
    Free,
    Tombstone(EntryId),
}

/// A contiguous, inclusive `[start, end]` run of blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub start: u64,
    pub end: u64,
    pub kind: ExtentKind,
}

impl Extent {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Free-block map over a volume's data region.
#[derive(Debug, Clone, Default)]
pub struct FreeMap {
    extents: Vec<Extent>,
}

impl FreeMap {
    /// Builds the map from scratch: collects occupied extents from every
    /// live file, unusable entry and deleted-file tombstone, sorts them,
    /// and sweeps `[reserved_blocks, data_end_block)` inserting a free
    /// extent for every gap (including the leading and trailing ones).
    /// Unusable extents close a gap without being tracked any further —
    /// they are occupied forever and never become `Free` or a tombstone.
    pub fn build(entries: &[Entry], reserved_blocks: u64, data_end_block: u64) -> Self {
        struct Occ {
            start: u64,
            end: u64,
            tombstone: Option<EntryId>,
        }

        let mut occupied: Vec<Occ> = entries
            .iter()
            .filter_map(|e| {
                e.extent().map(|(start, end)| Occ {
                    start,
                    end,
                    tombstone: matches!(e.data, EntryData::DeletedFile(_)).then(|| e.id()),
                })
            })
            .collect();
        occupied.sort_by_key(|o| o.start);

        let mut extents = Vec::new();
        let mut cursor = reserved_blocks;
        for o in &occupied {
            if o.start > cursor {
                extents.push(Extent {
                    start: cursor,
                    end: o.start - 1,
                    kind: ExtentKind::Free,
                });
            }
            if let Some(id) = o.tombstone {
                extents.push(Extent {
                    start: o.start,
                    end: o.end,
                    kind: ExtentKind::Tombstone(id),
                });
            }
            cursor = o.end + 1;
        }
        if cursor < data_end_block {
            extents.push(Extent {
                start: cursor,
                end: data_end_block - 1,
                kind: ExtentKind::Free,
            });
        }
        Self { extents }
    }

    pub fn extents(&self) -> &[Extent] {
        &self.extents
    }

    /// True if `[start, start + length)` is covered end-to-end by *free*
    /// extents, with no gap and nothing else — live, unusable, or
    /// tombstone — inside. A tombstone is still claimed by its deleted-file
    /// entry and is reclaimed only through the insertion protocol's
    /// reusable-slot scan, never by growing a different file into it.
    fn covers(&self, start: u64, length: u64) -> bool {
        if length == 0 {
            return true;
        }
        let end = start + length - 1;
        let mut cursor = start;
        for e in &self.extents {
            if e.end < cursor {
                continue;
            }
            if e.start > cursor || !matches!(e.kind, ExtentKind::Free) {
                return false;
            }
            cursor = e.end + 1;
            if cursor > end {
                return true;
            }
        }
        false
    }

    /// For the grow-in-place resize path: checks whether `length` blocks
    /// immediately following `after_end` are available, returning their
    /// start block if so.
    pub fn find_run_at(&self, after_end: u64, length: u64) -> Option<u64> {
        let start = after_end + 1;
        self.covers(start, length).then_some(start)
    }

    /// First-fit scan for a contiguous run of at least `length` *free*
    /// blocks (tombstones never satisfy this — they are reclaimed only by
    /// the insertion protocol's reusable-slot scan, never by file
    /// relocation), returning the run's start block.
    pub fn find_free_run(&self, length: u64) -> Option<u64> {
        let mut chain_start = None;
        let mut chain_len = 0u64;
        let mut expect = None;
        for e in &self.extents {
            if !matches!(e.kind, ExtentKind::Free) {
                chain_start = None;
                chain_len = 0;
                expect = None;
                continue;
            }
            if expect == Some(e.start) {
                chain_len += e.len();
            } else {
                chain_start = Some(e.start);
                chain_len = e.len();
            }
            expect = Some(e.end + 1);
            if chain_len >= length {
                return chain_start;
            }
        }
        None
    }

    /// Consumes `[start, start + length)`, which must already be fully
    /// covered (callers find `start` via [`Self::find_run_at`] or
    /// [`Self::find_free_run`] first). Returns the `EntryId`s of any
    /// tombstones fully or partially covered, for the caller to
    /// permanently remove from `EntryIndex`.
    pub fn allocate(&mut self, start: u64, length: u64) -> Vec<EntryId> {
        if length == 0 {
            return Vec::new();
        }
        let end = start + length - 1;
        let mut consumed = Vec::new();
        let mut kept = Vec::with_capacity(self.extents.len() + 1);
        for e in std::mem::take(&mut self.extents) {
            if e.end < start || e.start > end {
                kept.push(e);
                continue;
            }
            if let ExtentKind::Tombstone(id) = e.kind {
                consumed.push(id);
            }
            if e.start < start {
                kept.push(Extent {
                    start: e.start,
                    end: start - 1,
                    kind: e.kind,
                });
            }
            if e.end > end {
                kept.push(Extent {
                    start: end + 1,
                    end: e.end,
                    kind: e.kind,
                });
            }
        }
        kept.sort_by_key(|e| e.start);
        self.extents = kept;
        consumed
    }

    /// Inserts a brand-new tombstone extent (e.g. from `delete` on a
    /// nonempty file), in sorted position. Tombstones never merge with
    /// their neighbors.
    pub fn insert_tombstone(&mut self, start: u64, end: u64, id: EntryId) {
        let pos = self.extents.partition_point(|e| e.start < start);
        self.extents.insert(pos, Extent { start, end, kind: ExtentKind::Tombstone(id) });
    }

    /// Converts the tombstone extent owned by `id` into a free extent,
    /// merging with its neighbors as usual. Used when the insertion
    /// protocol's reusable-slot scan reclaims the index slot of a
    /// deleted-file entry: once that entry is gone for good, its data
    /// blocks can never be recovered, so they become ordinary free space.
    pub fn release_tombstone(&mut self, id: EntryId) {
        if let Some(pos) = self.extents.iter().position(|e| e.kind == ExtentKind::Tombstone(id)) {
            let extent = self.extents.remove(pos);
            self.release(extent.start, extent.len());
        }
    }

    /// Shrinks the data region's trailing free extent by `count` blocks
    /// (used when the index grows and encroaches on the data region from
    /// the top). Returns `false` without modifying anything if the
    /// trailing `count` blocks before `data_end_block` aren't free.
    pub fn consume_trailing_free(&mut self, data_end_block: u64, count: u64) -> bool {
        if count == 0 {
            return true;
        }
        let Some(last) = self.extents.last_mut() else {
            return false;
        };
        if !matches!(last.kind, ExtentKind::Free) || last.end + 1 != data_end_block {
            return false;
        }
        if last.len() < count {
            return false;
        }
        let new_start = data_end_block - count;
        if last.start == new_start {
            self.extents.pop();
        } else {
            last.end = new_start - 1;
        }
        true
    }

    /// Inserts a newly-freed `[start, start + length)` extent in sorted
    /// position, merging with adjacent *free* extents only — never with a
    /// tombstone: a reclaimable deleted-file extent only becomes mergeable
    /// once it is explicitly released via [`Self::release_tombstone`].
    pub fn release(&mut self, start: u64, length: u64) {
        if length == 0 {
            return;
        }
        let end = start + length - 1;
        let pos = self.extents.partition_point(|e| e.start < start);
        let merge_left = pos > 0
            && matches!(self.extents[pos - 1].kind, ExtentKind::Free)
            && self.extents[pos - 1].end + 1 == start;
        let merge_right = pos < self.extents.len()
            && matches!(self.extents[pos].kind, ExtentKind::Free)
            && end + 1 == self.extents[pos].start;

        match (merge_left, merge_right) {
            (true, true) => {
                let right = self.extents.remove(pos);
                self.extents[pos - 1].end = right.end;
            }
            (true, false) => self.extents[pos - 1].end = end,
            (false, true) => self.extents[pos].start = start,
            (false, false) => self.extents.insert(
                pos,
                Extent {
                    start,
                    end,
                    kind: ExtentKind::Free,
                },
            ),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::codec::{DirData, FileData};

    fn file(offset: u64, start: u64, end: u64, deleted: bool) -> Entry {
        let data = FileData {
            num_cont: 0,
            timestamp: 0,
            start_block: start,
            end_block: end,
            file_length: 1,
            name: "f".into(),
        };
        Entry {
            offset,
            data: if deleted {
                EntryData::DeletedFile(data)
            } else {
                EntryData::File(data)
            },
        }
    }

    #[test]
    fn build_with_no_entries_is_one_big_gap() {
        let map = FreeMap::build(&[], 4, 20);
        assert_eq!(map.extents().len(), 1);
        assert_eq!(map.extents()[0], Extent { start: 4, end: 19, kind: ExtentKind::Free });
    }

    #[test]
    fn build_skips_live_files_but_tracks_tombstones() {
        let entries = vec![file(1000, 4, 4, false), file(1064, 6, 7, true)];
        let map = FreeMap::build(&entries, 4, 20);
        assert_eq!(
            map.extents(),
            &[
                Extent { start: 5, end: 5, kind: ExtentKind::Free },
                Extent { start: 6, end: 7, kind: ExtentKind::Tombstone(EntryId(1064)) },
                Extent { start: 8, end: 19, kind: ExtentKind::Free },
            ]
        );
    }

    #[test]
    fn find_run_at_requires_exact_contiguity() {
        let map = FreeMap::build(&[], 4, 20);
        assert_eq!(map.find_run_at(3, 5), Some(4));
        let entries = vec![file(1000, 4, 4, false)];
        let map = FreeMap::build(&entries, 4, 20);
        // Blocks 4 are occupied by a live file; growing "after" block 3
        // must not see through it.
        assert_eq!(map.find_run_at(3, 1), None);
        assert_eq!(map.find_run_at(4, 1), Some(5));
    }

    #[test]
    fn find_run_at_never_sees_through_a_tombstone() {
        // File at [4,4], tombstone at [5,6]. Growing past the file's end
        // must not report the tombstone's blocks as available: a tombstone
        // is reclaimable only via the insertion protocol, never by another
        // file growing into it.
        let entries = vec![file(1000, 4, 4, false), file(2000, 5, 6, true)];
        let map = FreeMap::build(&entries, 4, 20);
        assert_eq!(map.find_run_at(4, 1), None);
        assert_eq!(map.find_run_at(4, 2), None);
        // A free run starting past the tombstone is still found correctly.
        assert_eq!(map.find_run_at(6, 1), Some(7));
    }

    #[test]
    fn allocate_trims_and_reports_tombstones() {
        let entries = vec![file(1000, 6, 7, true)];
        let mut map = FreeMap::build(&entries, 4, 20);
        let consumed = map.allocate(6, 2);
        assert_eq!(consumed, vec![EntryId(1000)]);
        assert!(map.extents().iter().all(|e| e.kind == ExtentKind::Free));
    }

    #[test]
    fn release_merges_adjacent_free_only() {
        // Block 10 is a live file sandwiched between two free gaps; once
        // it is released, the two gaps must merge into one [4,19] extent.
        let entries = vec![file(1000, 10, 10, false)];
        let mut map = FreeMap::build(&entries, 4, 20);
        assert_eq!(map.extents().len(), 2);
        map.release(10, 1);
        assert_eq!(map.extents(), &[Extent { start: 4, end: 19, kind: ExtentKind::Free }]);
    }

    #[test]
    fn release_next_to_a_tombstone_does_not_merge_into_it() {
        // Live file at [9,9] sits directly against the tombstone at
        // [10,10]; releasing it must produce its own free extent, never
        // absorbed into the neighboring tombstone.
        let entries = vec![file(1000, 10, 10, true), file(2000, 9, 9, false)];
        let mut map = FreeMap::build(&entries, 4, 20);
        map.release(9, 1);
        // Merges into the free run on its left (normal free/free merge)
        // but the tombstone at [10,10] is untouched and not absorbed.
        assert!(map
            .extents()
            .iter()
            .any(|e| e.start == 4 && e.end == 9 && e.kind == ExtentKind::Free));
        assert!(map
            .extents()
            .iter()
            .any(|e| e.kind == ExtentKind::Tombstone(EntryId(1000))));
    }

    #[test]
    fn release_tombstone_merges_with_neighbors() {
        let entries = vec![file(1000, 6, 7, true)];
        let mut map = FreeMap::build(&entries, 4, 20);
        map.release_tombstone(EntryId(1000));
        assert_eq!(map.extents(), &[Extent { start: 4, end: 19, kind: ExtentKind::Free }]);
    }

    #[test]
    fn consume_trailing_free_shrinks_or_removes_extent() {
        let mut map = FreeMap::build(&[], 4, 20);
        assert!(map.consume_trailing_free(20, 4));
        assert_eq!(map.extents(), &[Extent { start: 4, end: 15, kind: ExtentKind::Free }]);
        assert!(map.consume_trailing_free(16, 12));
        assert!(map.extents().is_empty());
        assert!(!map.consume_trailing_free(4, 1));
    }

    #[test]
    fn insert_tombstone_never_merges() {
        let mut map = FreeMap::build(&[], 4, 20);
        map.insert_tombstone(10, 10, EntryId(999));
        assert_eq!(
            map.extents(),
            &[
                Extent { start: 4, end: 9, kind: ExtentKind::Free },
                Extent { start: 10, end: 10, kind: ExtentKind::Tombstone(EntryId(999)) },
                Extent { start: 11, end: 19, kind: ExtentKind::Free },
            ]
        );
    }

    #[allow(dead_code)]
    fn dir(offset: u64, name: &str) -> Entry {
        Entry {
            offset,
            data: EntryData::Directory(DirData { num_cont: 0, timestamp: 0, name: name.into() }),
        }
    }
}
