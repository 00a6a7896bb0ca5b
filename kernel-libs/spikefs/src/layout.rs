//! Where everything lives on disk.
//!
//! ```text
//! sector 0                      superblock
//! [bitmap_start, data_start)    block bitmap, one bit per data-pool block
//! [data_start, total)           data pool, addressed by block number
//! ```
//!
//! The data pool holds inode chunks, imap blocks, indirect blocks and
//! payload blocks. One block is one sector.

use spike_blockdev::SECTOR_SIZE;
use spike_error::{FsError, Result};
use spike_vfs::config::{MAX_DIR_ENTRIES, MAX_FILE_SIZE, NAME_MAX};

use crate::superblock::Superblock;

pub const SPIKEFS_MAGIC: u32 = u32::from_le_bytes(*b"SPKF");
pub const SPIKEFS_VERSION: u32 = 1;

pub const SUPERBLOCK_SECTOR: u32 = 0;
pub const BITS_PER_SECTOR: u32 = (SECTOR_SIZE * 8) as u32;
/// Smallest data pool worth formatting: one inode chunk and one imap block.
pub const MIN_DATA_BLOCKS: u32 = 2;

/// Block numbers held in a record's `direct` array.
pub const DIRECT_BLOCKS: usize = 12;
/// Block numbers held by an indirect block.
pub const INDIRECT_ENTRIES: usize = SECTOR_SIZE / 4;
pub const MAX_FILE_BLOCKS: usize = DIRECT_BLOCKS + INDIRECT_ENTRIES;

pub const RECORD_SIZE: usize = 64;
pub const RECORDS_PER_CHUNK: usize = SECTOR_SIZE / RECORD_SIZE;

/// Slots in an imap block; the last one links to the next block.
pub const IMAP_ENTRIES_PER_BLOCK: usize = SECTOR_SIZE / 4;
pub const IMAP_CHUNKS_PER_BLOCK: usize = IMAP_ENTRIES_PER_BLOCK - 1;

/// On-disk directory entry: NUL padded name followed by the inode number.
pub const DIRENT_SIZE: usize = 32;
pub const DIRENT_NAME_LEN: usize = DIRENT_SIZE - 4;

const _: () = assert!(SECTOR_SIZE % RECORD_SIZE == 0);
const _: () = assert!(MAX_FILE_BLOCKS * SECTOR_SIZE == MAX_FILE_SIZE);
const _: () = assert!(MAX_DIR_ENTRIES * DIRENT_SIZE <= MAX_FILE_SIZE);
const _: () = assert!(NAME_MAX < DIRENT_NAME_LEN);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    /// Number of blocks in the data pool.
    pub block_count: u32,
    pub bitmap_start: u32,
    pub data_start: u32,
}

impl Layout {
    /// Partition a disk of `total_sectors`: the bitmap right after the
    /// superblock, big enough for one bit per remaining sector, then the
    /// data pool up to the end.
    pub fn format(total_sectors: u32) -> Result<Self> {
        let remaining = total_sectors.saturating_sub(SUPERBLOCK_SECTOR + 1);
        let bitmap_sectors = remaining.div_ceil(BITS_PER_SECTOR);
        let data_start = SUPERBLOCK_SECTOR + 1 + bitmap_sectors;
        let block_count = total_sectors.saturating_sub(data_start);
        if block_count < MIN_DATA_BLOCKS {
            return Err(FsError::OutOfDiskSpace);
        }
        Ok(Self {
            block_count,
            bitmap_start: SUPERBLOCK_SECTOR + 1,
            data_start,
        })
    }

    /// Take the layout verbatim from `superblock`, rejecting one that does
    /// not fit a disk of `total_sectors`.
    pub fn from_superblock(superblock: &Superblock, total_sectors: u32) -> Result<Self> {
        let layout = Self {
            block_count: superblock.block_count,
            bitmap_start: superblock.bitmap_start,
            data_start: superblock.data_start,
        };
        let fits = layout.bitmap_start > SUPERBLOCK_SECTOR
            && layout.data_start > layout.bitmap_start
            && u64::from(layout.bitmap_sectors()) * u64::from(BITS_PER_SECTOR)
                >= u64::from(layout.block_count)
            && u64::from(layout.data_start) + u64::from(layout.block_count)
                <= u64::from(total_sectors);
        if fits {
            Ok(layout)
        } else {
            Err(FsError::CorruptSuperblock)
        }
    }

    pub const fn bitmap_sectors(&self) -> u32 {
        self.data_start - self.bitmap_start
    }

    /// Sector holding data-pool block `block`.
    pub fn block_lba(&self, block: u32) -> Result<u32> {
        self.run_lba(block, 1)
    }

    /// First sector of the run `[block, block + count)`, which must lie in
    /// the data pool.
    pub fn run_lba(&self, block: u32, count: u32) -> Result<u32> {
        match block.checked_add(count) {
            Some(end) if end <= self.block_count => Ok(self.data_start + block),
            _ => Err(FsError::Corrupted),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Layout, MIN_DATA_BLOCKS};
    use spike_error::FsError;

    #[test]
    fn small_disk() {
        let layout = Layout::format(64).unwrap();
        assert_eq!(1, layout.bitmap_start);
        assert_eq!(2, layout.data_start);
        assert_eq!(62, layout.block_count);
        assert_eq!(1, layout.bitmap_sectors());
    }

    #[test]
    fn bitmap_spans_sectors() {
        // 4096 bits fit one sector, the 4097th remaining sector needs another.
        assert_eq!(1, Layout::format(4097).unwrap().bitmap_sectors());
        let layout = Layout::format(4098).unwrap();
        assert_eq!(2, layout.bitmap_sectors());
        assert_eq!(4095, layout.block_count);
    }

    #[test]
    fn too_small() {
        assert_eq!(Err(FsError::OutOfDiskSpace), Layout::format(0));
        assert_eq!(Err(FsError::OutOfDiskSpace), Layout::format(3));
        assert_eq!(MIN_DATA_BLOCKS, Layout::format(4).unwrap().block_count);
    }

    #[test]
    fn block_addressing() {
        let layout = Layout::format(64).unwrap();
        assert_eq!(Ok(2), layout.block_lba(0));
        assert_eq!(Ok(63), layout.block_lba(61));
        assert_eq!(Err(FsError::Corrupted), layout.block_lba(62));
        assert_eq!(Err(FsError::Corrupted), layout.run_lba(60, 3));
    }
}
