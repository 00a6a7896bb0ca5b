//! Reading a persisted image back into a fresh [`Vfs`].

use alloc::vec::Vec;

use log::{info, warn};
use spike_blockdev::{BlockDevice, SECTOR_SIZE};
use spike_error::{FsError, Result};
use spike_vfs::{InodeId, Vfs};

use crate::{
    bitmap::Bitmap,
    device::{DeviceResultExt, ensure_present, read_block},
    layout::{
        IMAP_CHUNKS_PER_BLOCK, IMAP_ENTRIES_PER_BLOCK, Layout, RECORD_SIZE, RECORDS_PER_CHUNK,
        SUPERBLOCK_SECTOR,
    },
    le,
    record::InodeRecord,
    superblock::Superblock,
};

pub(crate) struct Loaded {
    pub superblock: Superblock,
    pub layout: Layout,
    pub bitmap: Bitmap,
    pub vfs: Vfs,
}

pub(crate) fn read_superblock<D: BlockDevice + ?Sized>(device: &mut D) -> Result<Superblock> {
    ensure_present(device)?;
    let mut sector = [0; SECTOR_SIZE];
    device
        .read_sectors(SUPERBLOCK_SECTOR, 1, &mut sector)
        .or_io()?;
    let superblock = Superblock::from_bytes(&sector)?;
    if superblock.num_ichunks == 0 {
        return Err(FsError::CorruptSuperblock);
    }
    Ok(superblock)
}

pub(crate) fn read_bitmap<D: BlockDevice + ?Sized>(
    device: &mut D,
    layout: &Layout,
) -> Result<Bitmap> {
    let len = layout.bitmap_sectors() as usize * SECTOR_SIZE;
    let mut bytes = Vec::new();
    bytes
        .try_reserve_exact(len)
        .map_err(|_| FsError::OutOfMemory)?;
    bytes.resize(len, 0);
    device
        .read_sectors(layout.bitmap_start, layout.bitmap_sectors(), &mut bytes)
        .or_io()?;
    Bitmap::from_bytes(&bytes, layout.block_count)
}

/// Follow the imap chain from `imap_first`, collecting exactly
/// `num_ichunks` chunk block numbers together with the imap blocks visited.
pub(crate) fn walk_imap<D: BlockDevice + ?Sized>(
    device: &mut D,
    layout: &Layout,
    superblock: &Superblock,
) -> Result<(Vec<u32>, Vec<u32>)> {
    let expected = superblock.num_ichunks as usize;
    let max_blocks = expected.div_ceil(IMAP_CHUNKS_PER_BLOCK);
    let mut chunks = Vec::new();
    chunks
        .try_reserve_exact(expected)
        .map_err(|_| FsError::OutOfMemory)?;
    let mut visited = Vec::new();
    visited
        .try_reserve_exact(max_blocks)
        .map_err(|_| FsError::OutOfMemory)?;

    let mut sector = [0; SECTOR_SIZE];
    let mut block = superblock.imap_first;
    while chunks.len() < expected && visited.len() < max_blocks {
        read_block(device, layout, block, &mut sector)?;
        visited.push(block);
        let take = (expected - chunks.len()).min(IMAP_CHUNKS_PER_BLOCK);
        let mut ended = false;
        for slot in 0..take {
            let chunk = le::get_u32(&sector, slot * 4);
            // Block 0 can only ever hold the first chunk.
            if chunk == 0 && !chunks.is_empty() {
                ended = true;
                break;
            }
            chunks.push(chunk);
        }
        block = le::get_u32(&sector, (IMAP_ENTRIES_PER_BLOCK - 1) * 4);
        if ended || block == 0 {
            break;
        }
    }
    if chunks.len() < expected {
        warn!(
            "imap chain ends after {} of {expected} chunks",
            chunks.len()
        );
        return Err(FsError::CorruptSuperblock);
    }
    Ok((chunks, visited))
}

pub(crate) fn load<D: BlockDevice + ?Sized>(device: &mut D) -> Result<Loaded> {
    let superblock = read_superblock(device)?;
    let layout = Layout::from_superblock(&superblock, device.total_sectors())?;
    let bitmap = read_bitmap(device, &layout)?;

    let mut vfs = Vfs::new()?;
    vfs.ensure_capacity(superblock.num_ichunks as usize * RECORDS_PER_CHUNK)?;
    let (chunks, _) = walk_imap(device, &layout, &superblock)?;
    vfs.reset()?;

    let mut sector = [0; SECTOR_SIZE];
    for (chunk_index, &chunk) in chunks.iter().enumerate() {
        read_block(device, &layout, chunk, &mut sector)?;
        for (slot, raw) in sector.chunks_exact(RECORD_SIZE).enumerate() {
            let record = InodeRecord::from_bytes(raw);
            if record.is_free() {
                continue;
            }
            let id = InodeId((chunk_index * RECORDS_PER_CHUNK + slot) as u32);
            let inode = record.decode(|block, buf| read_block(device, &layout, block, buf))?;
            vfs.install(id, inode)?;
        }
    }
    if !vfs.inode(InodeId::ROOT).is_ok_and(|root| root.is_dir()) {
        return Err(FsError::Corrupted);
    }
    vfs.mark_clean();

    info!(
        "loaded SpikeFS: {} chunks, {} of {} blocks in use",
        chunks.len(),
        bitmap.allocated_count(),
        layout.block_count
    );
    Ok(Loaded {
        superblock,
        layout,
        bitmap,
        vfs,
    })
}
