//! Offline consistency check of a persisted image.

use alloc::vec::Vec;

use log::debug;
use spike_blockdev::{BlockDevice, SECTOR_SIZE};
use spike_error::{FsError, Result};

use crate::{
    device::read_block,
    layout::{Layout, RECORD_SIZE},
    load::{read_bitmap, read_superblock, walk_imap},
    record::InodeRecord,
};

/// Disagreements between the bitmap and the blocks the image references.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    /// Blocks reachable from the superblock.
    pub referenced: u32,
    /// Blocks set in the bitmap.
    pub marked: u32,
    /// Referenced but clear in the bitmap.
    pub unmarked: Vec<u32>,
    /// Set in the bitmap but referenced by nothing.
    pub leaked: Vec<u32>,
    /// Referenced more than once.
    pub shared: Vec<u32>,
}

impl CheckReport {
    pub fn is_clean(&self) -> bool {
        self.unmarked.is_empty() && self.leaked.is_empty() && self.shared.is_empty()
    }
}

pub(crate) fn check<D: BlockDevice + ?Sized>(device: &mut D) -> Result<CheckReport> {
    let superblock = read_superblock(device)?;
    let layout = Layout::from_superblock(&superblock, device.total_sectors())?;
    let bitmap = read_bitmap(device, &layout)?;

    let mut refs: Vec<u8> = Vec::new();
    refs.try_reserve_exact(layout.block_count as usize)
        .map_err(|_| FsError::OutOfMemory)?;
    refs.resize(layout.block_count as usize, 0);
    let mut mark = |block: u32| -> Result<()> {
        let count = refs.get_mut(block as usize).ok_or(FsError::Corrupted)?;
        *count = count.saturating_add(1);
        Ok(())
    };

    let (chunks, imap) = walk_imap(device, &layout, &superblock)?;
    for &block in chunks.iter().chain(imap.iter()) {
        mark(block)?;
    }

    let mut sector = [0; SECTOR_SIZE];
    for &chunk in &chunks {
        read_block(device, &layout, chunk, &mut sector)?;
        for raw in sector.chunks_exact(RECORD_SIZE) {
            let record = InodeRecord::from_bytes(raw);
            if record.is_free() {
                continue;
            }
            let data = record.data_blocks(|block, buf| read_block(device, &layout, block, buf))?;
            for &block in &data {
                mark(block)?;
            }
            if record.indirect != 0 {
                mark(record.indirect)?;
            }
        }
    }

    let mut report = CheckReport {
        marked: bitmap.allocated_count(),
        ..CheckReport::default()
    };
    for (block, &count) in refs.iter().enumerate() {
        let block = block as u32;
        let allocated = bitmap.is_allocated(block);
        if count > 0 {
            report.referenced += 1;
        }
        if count > 1 {
            report.shared.push(block);
        }
        if count > 0 && !allocated {
            report.unmarked.push(block);
        } else if count == 0 && allocated {
            report.leaked.push(block);
        }
    }
    debug!(
        "check: {} referenced, {} marked, clean: {}",
        report.referenced,
        report.marked,
        report.is_clean()
    );
    Ok(report)
}
