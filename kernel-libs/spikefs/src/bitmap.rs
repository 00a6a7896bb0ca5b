use alloc::vec::Vec;

use spike_blockdev::SECTOR_SIZE;
use spike_error::{FsError, Result};

/// One bit per data-pool block, bit `i` living in byte `i / 8` at position
/// `i % 8`. A set bit means the block is in use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    bits: Vec<u8>,
    blocks: u32,
}

impl Bitmap {
    /// All-clear bitmap covering `blocks` blocks.
    pub fn new(blocks: u32) -> Result<Self> {
        let len = (blocks as usize).div_ceil(8);
        let mut bits = Vec::new();
        bits.try_reserve_exact(len)
            .map_err(|_| FsError::OutOfMemory)?;
        bits.resize(len, 0);
        Ok(Self { bits, blocks })
    }

    /// Rebuild from persisted bytes. Bits past `blocks` are ignored.
    pub fn from_bytes(bytes: &[u8], blocks: u32) -> Result<Self> {
        let mut this = Self::new(blocks)?;
        let len = this.bits.len();
        if bytes.len() < len {
            return Err(FsError::Corrupted);
        }
        this.bits.copy_from_slice(&bytes[..len]);
        let tail = blocks % 8;
        if tail != 0 {
            if let Some(last) = this.bits.last_mut() {
                *last &= (1 << tail) - 1;
            }
        }
        Ok(this)
    }

    pub const fn blocks(&self) -> u32 {
        self.blocks
    }

    pub fn is_allocated(&self, block: u32) -> bool {
        block < self.blocks && self.bits[block as usize / 8] & (1 << (block % 8)) != 0
    }

    /// Mark the first run of `count` clear blocks and return its start.
    pub fn alloc(&mut self, count: u32) -> Result<u32> {
        if count == 0 {
            return Err(FsError::InvalidArgument);
        }
        let mut run_start = 0;
        let mut run_len = 0;
        let mut block = 0;
        while block < self.blocks {
            if run_len == 0 && block % 8 == 0 && self.bits[block as usize / 8] == 0xff {
                block += 8;
                continue;
            }
            if self.is_allocated(block) {
                run_len = 0;
            } else {
                if run_len == 0 {
                    run_start = block;
                }
                run_len += 1;
                if run_len == count {
                    for b in run_start..run_start + count {
                        self.bits[b as usize / 8] |= 1 << (b % 8);
                    }
                    return Ok(run_start);
                }
            }
            block += 1;
        }
        Err(FsError::OutOfDiskSpace)
    }

    pub fn clear_all(&mut self) {
        self.bits.fill(0);
    }

    pub fn allocated_count(&self) -> u32 {
        self.bits.iter().map(|byte| byte.count_ones()).sum()
    }

    pub fn free_count(&self) -> u32 {
        self.blocks - self.allocated_count()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }

    /// The bitmap zero padded to `sectors` whole sectors, ready to write.
    pub fn to_sectors(&self, sectors: u32) -> Result<Vec<u8>> {
        let len = sectors as usize * SECTOR_SIZE;
        if len < self.bits.len() {
            return Err(FsError::Corrupted);
        }
        let mut image = Vec::new();
        image
            .try_reserve_exact(len)
            .map_err(|_| FsError::OutOfMemory)?;
        image.extend_from_slice(&self.bits);
        image.resize(len, 0);
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::Bitmap;
    use spike_error::FsError;

    #[test]
    fn first_fit_runs() {
        let mut bitmap = Bitmap::new(20).unwrap();
        assert_eq!(Ok(0), bitmap.alloc(3));
        assert_eq!(Ok(3), bitmap.alloc(1));
        assert_eq!(Ok(4), bitmap.alloc(12));
        assert_eq!(16, bitmap.allocated_count());
        assert_eq!(4, bitmap.free_count());
        assert!(bitmap.is_allocated(15));
        assert!(!bitmap.is_allocated(16));
    }

    #[test]
    fn skips_short_holes() {
        let mut bitmap = Bitmap::from_bytes(&[0b1011_0101, 0], 16).unwrap();
        // Holes at 1, 3 and 6 are too short for two blocks.
        assert_eq!(Ok(8), bitmap.alloc(2));
        assert_eq!(Ok(1), bitmap.alloc(1));
    }

    #[test]
    fn exhaustion_leaves_bitmap_alone() {
        let mut bitmap = Bitmap::new(10).unwrap();
        assert_eq!(Ok(0), bitmap.alloc(8));
        let before = bitmap.clone();
        assert_eq!(Err(FsError::OutOfDiskSpace), bitmap.alloc(3));
        assert_eq!(before, bitmap);
        assert_eq!(Ok(8), bitmap.alloc(2));
        assert_eq!(Err(FsError::OutOfDiskSpace), bitmap.alloc(1));
    }

    #[test]
    fn zero_count() {
        let mut bitmap = Bitmap::new(8).unwrap();
        assert_eq!(Err(FsError::InvalidArgument), bitmap.alloc(0));
    }

    #[test]
    fn bit_order() {
        let mut bitmap = Bitmap::new(12).unwrap();
        bitmap.alloc(1).unwrap();
        bitmap.alloc(9).unwrap();
        assert_eq!(&[0xff, 0x03], bitmap.as_bytes());
        let sectors = bitmap.to_sectors(1).unwrap();
        assert_eq!(512, sectors.len());
        assert_eq!(bitmap, Bitmap::from_bytes(&sectors, 12).unwrap());
    }

    #[test]
    fn ignores_bits_past_the_end() {
        let bitmap = Bitmap::from_bytes(&[0xff], 5).unwrap();
        assert_eq!(5, bitmap.allocated_count());
        assert!(!bitmap.is_allocated(5));
    }

    #[test]
    fn clear_all() {
        let mut bitmap = Bitmap::new(30).unwrap();
        bitmap.alloc(30).unwrap();
        bitmap.clear_all();
        assert_eq!(0, bitmap.allocated_count());
        assert_eq!(Ok(0), bitmap.alloc(30));
    }
}
