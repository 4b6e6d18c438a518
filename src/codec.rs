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

//! Pure encode/decode functions for every on-disk record, and the
//! modular-256 checksum invariant shared by all of them.
//!
//! Field offsets below are taken directly from the reference
//! implementation's record read/write routines (which operate on raw
//! byte buffers with explicit offsets), reproduced one-for-one down to
//! the exact byte position of each field.

use crate::error::{Error, Result};

/// Size of one index-entry slot, and of one continuation.
pub const SLOT_SIZE: usize = 64;

/// Byte offset of the superblock from the start of the image.
pub const SUPERBLOCK_OFFSET: u64 = 0x18E;
/// On-disk size of the superblock record.
pub const SUPERBLOCK_SIZE: usize = 42;

/// The three-byte magic identifying an SFS superblock.
pub const MAGIC: &[u8; 3] = b"SFS";
/// The one supported on-disk format version.
pub const VERSION: u8 = 0x11;

pub const TAG_VOLUME_ID: u8 = 0x01;
pub const TAG_START_MARKER: u8 = 0x02;
pub const TAG_UNUSED: u8 = 0x10;
pub const TAG_DIRECTORY: u8 = 0x11;
pub const TAG_FILE: u8 = 0x12;
pub const TAG_UNUSABLE: u8 = 0x18;
pub const TAG_DELETED_DIRECTORY: u8 = 0x19;
pub const TAG_DELETED_FILE: u8 = 0x1A;

/// Bytes of directory name that fit in the entry's first slot (before any
/// continuation is needed).
pub const DIR_NAME_BASE: usize = 53;
/// Bytes of file name that fit in the entry's first slot.
pub const FILE_NAME_BASE: usize = 29;
/// Size of the volume-id entry's inline name field.
pub const VOL_NAME_LEN: usize = 52;

/// Sums `bytes` modulo 256.
fn checksum_sum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Verifies that `bytes` sums to zero modulo 256, as every fixed-size
/// record (including its continuations) must.
fn verify_checksum(bytes: &[u8]) -> Result<()> {
    if checksum_sum(bytes) == 0 {
        Ok(())
    } else {
        Err(Error::CorruptChecksum)
    }
}

/// Sets `buf[checksum_at]` so that `buf` sums to zero modulo 256.
fn fix_checksum(buf: &mut [u8], checksum_at: usize) {
    buf[checksum_at] = 0;
    let sum = checksum_sum(buf);
    buf[checksum_at] = sum.wrapping_neg();
}

/// Finds the first NUL in `region`, or treats the whole region as the name
/// if none is present: decoding stops at the first NUL or the end of the
/// allocated name region, whichever comes first.
fn decode_name(region: &[u8]) -> String {
    let end = region.iter().position(|&b| b == 0).unwrap_or(region.len());
    String::from_utf8_lossy(&region[..end]).into_owned()
}

/// Copies `name` into the start of `region`, zero-padding the rest.
/// `region` is assumed to already be zeroed; `name.len()` must not exceed
/// `region.len()` (callers size continuations so that it never does).
fn encode_name(region: &mut [u8], name: &str) {
    let bytes = name.as_bytes();
    region[..bytes.len()].copy_from_slice(bytes);
}

/// The 42-byte superblock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Superblock {
    /// Last-modified timestamp, in the 48.16 fixed-point on-disk unit.
    pub last_modified: i64,
    /// Total data size in bytes.
    pub data_size: u64,
    /// Index size in bytes.
    pub index_size: u64,
    /// Total number of blocks on the device.
    pub total_blocks: u64,
    /// Number of reserved (pre-data) blocks.
    pub reserved_blocks: u32,
    /// Block-size shift exponent `s`; block size is `128 << s`.
    pub block_size_shift: u8,
}

impl Superblock {
    /// The logical block size in bytes: `128 * 2^shift`.
    pub fn block_size(&self) -> u64 {
        128u64 << self.block_size_shift
    }
}

/// Encodes a [`Superblock`], computing its checksum.
pub fn encode_superblock(sb: &Superblock) -> [u8; SUPERBLOCK_SIZE] {
    let mut buf = [0u8; SUPERBLOCK_SIZE];
    buf[0..8].copy_from_slice(&sb.last_modified.to_le_bytes());
    buf[8..16].copy_from_slice(&sb.data_size.to_le_bytes());
    buf[16..24].copy_from_slice(&sb.index_size.to_le_bytes());
    buf[24..27].copy_from_slice(MAGIC);
    buf[27] = VERSION;
    buf[28..36].copy_from_slice(&sb.total_blocks.to_le_bytes());
    buf[36..40].copy_from_slice(&sb.reserved_blocks.to_le_bytes());
    buf[40] = sb.block_size_shift;
    // Checksum covers bytes [24..42) of the superblock, not the whole thing.
    fix_checksum(&mut buf[24..42], 17);
    buf
}

/// Decodes and validates a [`Superblock`].
pub fn decode_superblock(buf: &[u8; SUPERBLOCK_SIZE]) -> Result<Superblock> {
    if &buf[24..27] != MAGIC || buf[27] != VERSION {
        return Err(Error::CorruptImage("bad superblock magic or version"));
    }
    verify_checksum(&buf[24..42])?;
    Ok(Superblock {
        last_modified: i64::from_le_bytes(buf[0..8].try_into().unwrap()),
        data_size: u64::from_le_bytes(buf[8..16].try_into().unwrap()),
        index_size: u64::from_le_bytes(buf[16..24].try_into().unwrap()),
        total_blocks: u64::from_le_bytes(buf[28..36].try_into().unwrap()),
        reserved_blocks: u32::from_le_bytes(buf[36..40].try_into().unwrap()),
        block_size_shift: buf[40],
    })
}

/// Decoded volume-id entry payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeIdData {
    pub timestamp: i64,
    pub name: String,
}

/// Encodes the volume-id entry (always exactly one slot).
pub fn encode_volume_id(data: &VolumeIdData) -> [u8; SLOT_SIZE] {
    let mut buf = [0u8; SLOT_SIZE];
    buf[0] = TAG_VOLUME_ID;
    buf[4..12].copy_from_slice(&data.timestamp.to_le_bytes());
    encode_name(&mut buf[12..12 + VOL_NAME_LEN], &data.name);
    fix_checksum(&mut buf, 1);
    buf
}

/// Decodes and validates a volume-id entry.
pub fn decode_volume_id(buf: &[u8; SLOT_SIZE]) -> Result<VolumeIdData> {
    verify_checksum(buf)?;
    Ok(VolumeIdData {
        timestamp: i64::from_le_bytes(buf[4..12].try_into().unwrap()),
        name: decode_name(&buf[12..12 + VOL_NAME_LEN]),
    })
}

/// Encodes the start-marker entry (always exactly one slot, no payload).
pub fn encode_start_marker() -> [u8; SLOT_SIZE] {
    let mut buf = [0u8; SLOT_SIZE];
    buf[0] = TAG_START_MARKER;
    fix_checksum(&mut buf, 1);
    buf
}

/// Decodes and validates a start-marker entry.
pub fn decode_start_marker(buf: &[u8; SLOT_SIZE]) -> Result<()> {
    verify_checksum(buf)
}

/// Encodes an unused slot (always exactly one slot, no payload).
pub fn encode_unused() -> [u8; SLOT_SIZE] {
    let mut buf = [0u8; SLOT_SIZE];
    buf[0] = TAG_UNUSED;
    fix_checksum(&mut buf, 1);
    buf
}

/// Decodes and validates an unused slot.
pub fn decode_unused(buf: &[u8; SLOT_SIZE]) -> Result<()> {
    verify_checksum(buf)
}

/// Decoded directory (or deleted-directory) entry payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirData {
    pub num_cont: u8,
    pub timestamp: i64,
    pub name: String,
}

/// Number of continuation slots a name of `name_len` bytes needs, given
/// the base inline capacity `base`: `ceil(max(0, name_len - base) / 64)`.
pub fn continuations_needed(name_len: usize, base: usize) -> u8 {
    if name_len <= base {
        0
    } else {
        crate::util::ceil_division((name_len - base) as u64, SLOT_SIZE as u64) as u8
    }
}

/// Encodes a directory entry (`tag` is [`TAG_DIRECTORY`] or
/// [`TAG_DELETED_DIRECTORY`]). The buffer is sized to
/// `SLOT_SIZE * (1 + num_cont)`, with `num_cont` computed from `name`'s
/// length via [`continuations_needed`].
pub fn encode_directory(tag: u8, timestamp: i64, name: &str) -> Vec<u8> {
    let num_cont = continuations_needed(name.len(), DIR_NAME_BASE);
    let capacity = DIR_NAME_BASE + SLOT_SIZE * num_cont as usize;
    let total = SLOT_SIZE * (1 + num_cont as usize);
    let mut buf = vec![0u8; total];
    buf[0] = tag;
    buf[2] = num_cont;
    buf[3..11].copy_from_slice(&timestamp.to_le_bytes());
    encode_name(&mut buf[11..11 + capacity], name);
    fix_checksum(&mut buf, 1);
    buf
}

/// Decodes and validates a directory entry from its full slot span
/// (first slot plus every continuation, already concatenated).
pub fn decode_directory(buf: &[u8]) -> Result<DirData> {
    verify_checksum(buf)?;
    let num_cont = buf[2];
    let capacity = DIR_NAME_BASE + SLOT_SIZE * num_cont as usize;
    if buf.len() != SLOT_SIZE * (1 + num_cont as usize) {
        return Err(Error::CorruptImage("directory entry length mismatch"));
    }
    Ok(DirData {
        num_cont,
        timestamp: i64::from_le_bytes(buf[3..11].try_into().unwrap()),
        name: decode_name(&buf[11..11 + capacity]),
    })
}

/// Decoded file (or deleted-file) entry payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileData {
    pub num_cont: u8,
    pub timestamp: i64,
    pub start_block: u64,
    pub end_block: u64,
    pub file_length: u64,
    pub name: String,
}

/// Encodes a file entry (`tag` is [`TAG_FILE`] or [`TAG_DELETED_FILE`]).
pub fn encode_file(
    tag: u8,
    timestamp: i64,
    start_block: u64,
    end_block: u64,
    file_length: u64,
    name: &str,
) -> Vec<u8> {
    let num_cont = continuations_needed(name.len(), FILE_NAME_BASE);
    let capacity = FILE_NAME_BASE + SLOT_SIZE * num_cont as usize;
    let total = SLOT_SIZE * (1 + num_cont as usize);
    let mut buf = vec![0u8; total];
    buf[0] = tag;
    buf[2] = num_cont;
    buf[3..11].copy_from_slice(&timestamp.to_le_bytes());
    buf[11..19].copy_from_slice(&start_block.to_le_bytes());
    buf[19..27].copy_from_slice(&end_block.to_le_bytes());
    buf[27..35].copy_from_slice(&file_length.to_le_bytes());
    encode_name(&mut buf[35..35 + capacity], name);
    fix_checksum(&mut buf, 1);
    buf
}

/// Decodes and validates a file entry from its full slot span.
pub fn decode_file(buf: &[u8]) -> Result<FileData> {
    verify_checksum(buf)?;
    let num_cont = buf[2];
    let capacity = FILE_NAME_BASE + SLOT_SIZE * num_cont as usize;
    if buf.len() != SLOT_SIZE * (1 + num_cont as usize) {
        return Err(Error::CorruptImage("file entry length mismatch"));
    }
    Ok(FileData {
        num_cont,
        timestamp: i64::from_le_bytes(buf[3..11].try_into().unwrap()),
        start_block: u64::from_le_bytes(buf[11..19].try_into().unwrap()),
        end_block: u64::from_le_bytes(buf[19..27].try_into().unwrap()),
        file_length: u64::from_le_bytes(buf[27..35].try_into().unwrap()),
        name: decode_name(&buf[35..35 + capacity]),
    })
}

/// Decoded unusable-extent entry payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnusableData {
    pub start_block: u64,
    pub end_block: u64,
}

/// Encodes an unusable-extent entry (always exactly one slot).
pub fn encode_unusable(data: &UnusableData) -> [u8; SLOT_SIZE] {
    let mut buf = [0u8; SLOT_SIZE];
    buf[0] = TAG_UNUSABLE;
    buf[10..18].copy_from_slice(&data.start_block.to_le_bytes());
    buf[18..26].copy_from_slice(&data.end_block.to_le_bytes());
    fix_checksum(&mut buf, 1);
    buf
}

/// Decodes and validates an unusable-extent entry.
pub fn decode_unusable(buf: &[u8; SLOT_SIZE]) -> Result<UnusableData> {
    verify_checksum(buf)?;
    Ok(UnusableData {
        start_block: u64::from_le_bytes(buf[10..18].try_into().unwrap()),
        end_block: u64::from_le_bytes(buf[18..26].try_into().unwrap()),
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::util::TestRng;

    #[test]
    fn superblock_roundtrip() {
        let sb = Superblock {
            last_modified: 0x1234_5678_9abc,
            data_size: 0x1000,
            index_size: 0x40,
            total_blocks: 128,
            reserved_blocks: 4,
            block_size_shift: 0,
        };
        let buf = encode_superblock(&sb);
        assert_eq!(checksum_sum(&buf[24..42]), 0);
        let decoded = decode_superblock(&buf).unwrap();
        assert_eq!(decoded, sb);
    }

    #[test]
    fn superblock_bad_checksum_rejected() {
        let sb = Superblock {
            last_modified: 1,
            data_size: 2,
            index_size: 3,
            total_blocks: 4,
            reserved_blocks: 5,
            block_size_shift: 0,
        };
        let mut buf = encode_superblock(&sb);
        buf[28] ^= 0xff;
        assert!(matches!(decode_superblock(&buf), Err(Error::CorruptChecksum)));
    }

    #[test]
    fn volume_id_roundtrip() {
        let data = VolumeIdData {
            timestamp: 42,
            name: "my-volume".to_owned(),
        };
        let buf = encode_volume_id(&data);
        assert_eq!(checksum_sum(&buf), 0);
        assert_eq!(decode_volume_id(&buf).unwrap(), data);
    }

    #[test]
    fn start_marker_and_unused_roundtrip() {
        let buf = encode_start_marker();
        assert_eq!(buf[0], TAG_START_MARKER);
        decode_start_marker(&buf).unwrap();

        let buf = encode_unused();
        assert_eq!(buf[0], TAG_UNUSED);
        decode_unused(&buf).unwrap();
    }

    #[test]
    fn unusable_roundtrip() {
        let data = UnusableData {
            start_block: 10,
            end_block: 20,
        };
        let buf = encode_unusable(&data);
        assert_eq!(decode_unusable(&buf).unwrap(), data);
    }

    #[test]
    fn directory_roundtrip_various_continuations() {
        for name in ["a", &"b".repeat(52), &"c".repeat(53), &"d".repeat(53 + 64 + 5)] {
            let expect_cont = continuations_needed(name.len(), DIR_NAME_BASE);
            let buf = encode_directory(TAG_DIRECTORY, 7, name);
            assert_eq!(buf.len(), SLOT_SIZE * (1 + expect_cont as usize));
            let decoded = decode_directory(&buf).unwrap();
            assert_eq!(decoded.name, name);
            assert_eq!(decoded.num_cont, expect_cont);
            assert_eq!(decoded.timestamp, 7);
        }
    }

    #[test]
    fn file_roundtrip_various_continuations() {
        for name in ["a", &"b".repeat(28), &"c".repeat(29), &"d".repeat(29 + 64 * 2 + 3)] {
            let buf = encode_file(TAG_FILE, 9, 4, 4, 50, name);
            let decoded = decode_file(&buf).unwrap();
            assert_eq!(decoded.name, name);
            assert_eq!(decoded.start_block, 4);
            assert_eq!(decoded.end_block, 4);
            assert_eq!(decoded.file_length, 50);
        }
    }

    #[test]
    fn random_names_roundtrip() {
        let mut rng = TestRng::new(12345);
        for _ in 0..200 {
            let len = rng.next_range(200) as usize;
            let name: String = (0..len)
                .map(|_| (b'a' + (rng.next_range(26) as u8)) as char)
                .collect();
            let buf = encode_file(TAG_FILE, 1, 0, 0, 0, &name);
            assert_eq!(checksum_sum(&buf), 0);
            let decoded = decode_file(&buf).unwrap();
            assert_eq!(decoded.name, name);

            let buf = encode_directory(TAG_DIRECTORY, 1, &name);
            assert_eq!(checksum_sum(&buf), 0);
            let decoded = decode_directory(&buf).unwrap();
            assert_eq!(decoded.name, name);
        }
    }
}
