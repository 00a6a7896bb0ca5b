//! Compile-time limits of the in-memory namespace.

use kernel_utils::grow_vec::Growth;

/// Inode slots allocated by a fresh table.
pub const INITIAL_INODES: usize = 64;
/// Hard cap on the inode table.
pub const MAX_INODES: usize = 8192;

/// Longest directory entry name, in bytes.
pub const NAME_MAX: usize = 27;

/// First allocation of a directory's entry array.
pub const DIR_INITIAL_ENTRIES: usize = 8;
/// First allocation of a file's byte buffer.
pub const FILE_INITIAL_CAPACITY: usize = 64;

/// Largest file the on-disk format can address: 12 direct blocks plus
/// 128 indirect ones, 512 bytes each.
pub const MAX_FILE_SIZE: usize = (12 + 128) * 512;
/// Largest directory, with every entry taking 32 bytes on disk.
pub const MAX_DIR_ENTRIES: usize = MAX_FILE_SIZE / 32;

pub const TABLE_GROWTH: Growth = Growth::new(INITIAL_INODES, MAX_INODES);
pub const DIR_GROWTH: Growth = Growth::new(DIR_INITIAL_ENTRIES, MAX_DIR_ENTRIES);
pub const FILE_GROWTH: Growth = Growth::new(FILE_INITIAL_CAPACITY, MAX_FILE_SIZE);
