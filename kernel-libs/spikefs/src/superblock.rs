use spike_blockdev::SECTOR_SIZE;
use spike_error::{FsError, Result};

use crate::{
    le,
    layout::{Layout, SPIKEFS_MAGIC, SPIKEFS_VERSION},
};

/// Sector 0. Seven little-endian `u32` fields, the rest of the sector is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Superblock {
    pub magic: u32,
    pub version: u32,
    pub block_count: u32,
    pub bitmap_start: u32,
    pub data_start: u32,
    pub imap_first: u32,
    pub num_ichunks: u32,
}

impl Superblock {
    pub const fn new(layout: &Layout, imap_first: u32, num_ichunks: u32) -> Self {
        Self {
            magic: SPIKEFS_MAGIC,
            version: SPIKEFS_VERSION,
            block_count: layout.block_count,
            bitmap_start: layout.bitmap_start,
            data_start: layout.data_start,
            imap_first,
            num_ichunks,
        }
    }

    pub fn to_bytes(&self) -> [u8; SECTOR_SIZE] {
        let mut sector = [0; SECTOR_SIZE];
        let fields = [
            self.magic,
            self.version,
            self.block_count,
            self.bitmap_start,
            self.data_start,
            self.imap_first,
            self.num_ichunks,
        ];
        for (i, field) in fields.into_iter().enumerate() {
            le::put_u32(&mut sector, i * 4, field);
        }
        sector
    }

    /// Parse sector 0. A wrong magic or version means there is no SpikeFS
    /// on the disk.
    pub fn from_bytes(sector: &[u8; SECTOR_SIZE]) -> Result<Self> {
        let superblock = Self {
            magic: le::get_u32(sector, 0),
            version: le::get_u32(sector, 4),
            block_count: le::get_u32(sector, 8),
            bitmap_start: le::get_u32(sector, 12),
            data_start: le::get_u32(sector, 16),
            imap_first: le::get_u32(sector, 20),
            num_ichunks: le::get_u32(sector, 24),
        };
        if superblock.magic != SPIKEFS_MAGIC || superblock.version != SPIKEFS_VERSION {
            return Err(FsError::CorruptSuperblock);
        }
        Ok(superblock)
    }

    pub const fn layout(&self) -> Layout {
        Layout {
            block_count: self.block_count,
            bitmap_start: self.bitmap_start,
            data_start: self.data_start,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Superblock;
    use crate::layout::{Layout, SPIKEFS_VERSION};
    use spike_blockdev::SECTOR_SIZE;
    use spike_error::FsError;

    #[test]
    fn field_offsets() {
        let layout = Layout::format(100).unwrap();
        let bytes = Superblock::new(&layout, 3, 1).to_bytes();
        assert_eq!(b"SPKF", &bytes[0..4]);
        assert_eq!(&SPIKEFS_VERSION.to_le_bytes(), &bytes[4..8]);
        assert_eq!(&98u32.to_le_bytes(), &bytes[8..12]);
        assert_eq!(&1u32.to_le_bytes(), &bytes[12..16]);
        assert_eq!(&2u32.to_le_bytes(), &bytes[16..20]);
        assert_eq!(&3u32.to_le_bytes(), &bytes[20..24]);
        assert_eq!(&1u32.to_le_bytes(), &bytes[24..28]);
        assert!(bytes[28..].iter().all(|&b| b == 0));
    }

    #[test]
    fn parses_back() {
        let layout = Layout::format(100).unwrap();
        let superblock = Superblock::new(&layout, 7, 2);
        let parsed = Superblock::from_bytes(&superblock.to_bytes()).unwrap();
        assert_eq!(superblock, parsed);
        assert_eq!(layout, parsed.layout());
    }

    #[test]
    fn blank_sector_is_not_a_filesystem() {
        assert_eq!(
            Err(FsError::CorruptSuperblock),
            Superblock::from_bytes(&[0; SECTOR_SIZE])
        );
    }

    #[test]
    fn version_mismatch() {
        let layout = Layout::format(100).unwrap();
        let mut bytes = Superblock::new(&layout, 1, 1).to_bytes();
        bytes[4] = bytes[4].wrapping_add(1);
        assert_eq!(Err(FsError::CorruptSuperblock), Superblock::from_bytes(&bytes));
    }
}
