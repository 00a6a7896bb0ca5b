//! Writing the in-memory tree to disk.
//!
//! Every pass rebuilds the whole region: the working bitmap starts empty,
//! the inode chunks and imap chain get fresh runs, then every live inode
//! gets one run for its payload plus indirect block. The bitmap and the
//! superblock are written last.

use alloc::vec::Vec;

use log::{debug, trace};
use spike_blockdev::{BlockDevice, SECTOR_SIZE};
use spike_error::{FsError, Result};
use spike_vfs::{Inode, Vfs};

use crate::{
    bitmap::Bitmap,
    device::{DeviceResultExt, write_blocks},
    layout::{
        DIRECT_BLOCKS, IMAP_CHUNKS_PER_BLOCK, IMAP_ENTRIES_PER_BLOCK, Layout, MAX_FILE_BLOCKS,
        RECORD_SIZE, RECORDS_PER_CHUNK, SUPERBLOCK_SECTOR,
    },
    le,
    record::{InodeBlocks, InodeRecord, encode_payload, payload_len},
    superblock::Superblock,
};

/// What a successful pass committed to disk.
pub(crate) struct Synced {
    pub superblock: Superblock,
    pub bitmap: Bitmap,
}

pub(crate) fn sync<D: BlockDevice + ?Sized>(
    device: &mut D,
    layout: &Layout,
    current: &Bitmap,
    vfs: &Vfs,
) -> Result<Synced> {
    let inode_count = vfs.highest_in_use().index() + 1;
    let num_chunks = inode_count.div_ceil(RECORDS_PER_CHUNK);
    let num_imap = num_chunks.div_ceil(IMAP_CHUNKS_PER_BLOCK);

    // Every block is allocated before the first write, so running out of
    // space leaves the device untouched.
    let mut bitmap = current.clone();
    bitmap.clear_all();
    let chunk_start = bitmap.alloc(num_chunks as u32)?;
    let imap_start = bitmap.alloc(num_imap as u32)?;

    let mut chunks = zeroed(num_chunks * SECTOR_SIZE)?;
    let mut planned = Vec::new();
    for (id, inode) in vfs.iter().take(num_chunks * RECORDS_PER_CHUNK) {
        if inode.is_free() {
            continue;
        }
        let blocks = plan_inode(&mut bitmap, inode)?;
        let record = InodeRecord::encode(inode, &blocks);
        trace!("{id}: {:?} size {} in {} blocks", inode.kind(), record.size, blocks.data.len());
        let offset = id.index() * RECORD_SIZE;
        chunks[offset..offset + RECORD_SIZE].copy_from_slice(&record.to_bytes());
        if !blocks.data.is_empty() {
            planned
                .try_reserve(1)
                .map_err(|_| FsError::OutOfMemory)?;
            planned.push((inode, blocks));
        }
    }

    let mut payload = Vec::new();
    for (inode, blocks) in &planned {
        write_payload(device, layout, inode, blocks, &mut payload)?;
    }
    write_blocks(device, layout, chunk_start, &chunks)?;

    let imap = imap_chain(chunk_start, num_chunks, imap_start, num_imap)?;
    write_blocks(device, layout, imap_start, &imap)?;

    let image = bitmap.to_sectors(layout.bitmap_sectors())?;
    device
        .write_sectors(layout.bitmap_start, layout.bitmap_sectors(), &image)
        .or_io()?;

    let superblock = Superblock::new(layout, imap_start, num_chunks as u32);
    device
        .write_sectors(SUPERBLOCK_SECTOR, 1, &superblock.to_bytes())
        .or_io()?;
    device.flush().or_io()?;

    debug!(
        "sync: {num_chunks} chunks at {chunk_start}, {num_imap} imap blocks at {imap_start}, {} of {} blocks in use",
        bitmap.allocated_count(),
        bitmap.blocks()
    );
    Ok(Synced { superblock, bitmap })
}

/// Reserve one run for the payload of `inode`, its indirect block last.
fn plan_inode(bitmap: &mut Bitmap, inode: &Inode) -> Result<InodeBlocks> {
    let data_blocks = payload_len(inode).div_ceil(SECTOR_SIZE);
    if data_blocks > MAX_FILE_BLOCKS {
        return Err(FsError::FileTooLarge);
    }
    let needs_indirect = data_blocks > DIRECT_BLOCKS;
    let run = data_blocks + usize::from(needs_indirect);

    let mut blocks = InodeBlocks::default();
    if run > 0 {
        let start = bitmap.alloc(run as u32)?;
        blocks.data.extend(start..start + data_blocks as u32);
        if needs_indirect {
            blocks.indirect = Some(start + data_blocks as u32);
        }
    }
    Ok(blocks)
}

fn write_payload<D: BlockDevice + ?Sized>(
    device: &mut D,
    layout: &Layout,
    inode: &Inode,
    blocks: &InodeBlocks,
    payload: &mut Vec<u8>,
) -> Result<()> {
    encode_payload(inode, payload)?;
    let padded = blocks.data.len() * SECTOR_SIZE;
    payload
        .try_reserve_exact(padded.saturating_sub(payload.len()))
        .map_err(|_| FsError::OutOfMemory)?;
    payload.resize(padded, 0);
    if let Some(&start) = blocks.data.first() {
        write_blocks(device, layout, start, payload)?;
    }
    if let (Some(block), Some(list)) = (blocks.indirect, blocks.indirect_sector()) {
        write_blocks(device, layout, block, &list)?;
    }
    Ok(())
}

/// Imap blocks listing `num_chunks` consecutive chunks from `chunk_start`,
/// each linking to the next through its last slot.
fn imap_chain(
    chunk_start: u32,
    num_chunks: usize,
    imap_start: u32,
    num_imap: usize,
) -> Result<Vec<u8>> {
    let mut imap = zeroed(num_imap * SECTOR_SIZE)?;
    for (j, block) in imap.chunks_exact_mut(SECTOR_SIZE).enumerate() {
        let first = j * IMAP_CHUNKS_PER_BLOCK;
        let last = (first + IMAP_CHUNKS_PER_BLOCK).min(num_chunks);
        for (slot, chunk) in (first..last).enumerate() {
            le::put_u32(block, slot * 4, chunk_start + chunk as u32);
        }
        let next = if j + 1 < num_imap {
            imap_start + j as u32 + 1
        } else {
            0
        };
        le::put_u32(block, (IMAP_ENTRIES_PER_BLOCK - 1) * 4, next);
    }
    Ok(imap)
}

fn zeroed(len: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| FsError::OutOfMemory)?;
    buf.resize(len, 0);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::imap_chain;
    use crate::le::get_u32;
    use spike_blockdev::SECTOR_SIZE;

    #[test]
    fn single_imap_block() {
        let imap = imap_chain(0, 3, 3, 1).unwrap();
        assert_eq!(SECTOR_SIZE, imap.len());
        assert_eq!([0, 1, 2, 0], [0, 4, 8, 12].map(|o| get_u32(&imap, o)));
        assert_eq!(0, get_u32(&imap, 508));
    }

    #[test]
    fn chained_imap_blocks() {
        let imap = imap_chain(0, 130, 130, 2).unwrap();
        assert_eq!(126, get_u32(&imap, 126 * 4));
        assert_eq!(131, get_u32(&imap, 508));
        assert_eq!(127, get_u32(&imap, 512));
        assert_eq!(129, get_u32(&imap, 512 + 8));
        assert_eq!(0, get_u32(&imap, 512 + 12));
        assert_eq!(0, get_u32(&imap, 1020));
    }
}
