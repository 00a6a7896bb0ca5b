//! On-disk inode records and directory entries.

use alloc::{string::String, vec::Vec};
use core::str;

use kernel_utils::grow_vec::GrowVec;
use log::warn;
use smallvec::SmallVec;
use spike_blockdev::SECTOR_SIZE;
use spike_error::{FsError, Result};
use spike_vfs::{
    DirEntry, Inode, InodeData, InodeId, InodeKind,
    config::{DIR_GROWTH, FILE_GROWTH},
    inode::grow_error,
};

use crate::{
    le,
    layout::{
        DIRECT_BLOCKS, DIRENT_NAME_LEN, DIRENT_SIZE, INDIRECT_ENTRIES, MAX_FILE_BLOCKS,
        RECORD_SIZE,
    },
};

/// Blocks an inode was given during a sync, payload blocks in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InodeBlocks {
    pub data: SmallVec<[u32; DIRECT_BLOCKS]>,
    pub indirect: Option<u32>,
}

impl InodeBlocks {
    /// Payload blocks that do not fit in `direct`.
    pub fn overflow(&self) -> &[u32] {
        self.data.get(DIRECT_BLOCKS..).unwrap_or(&[])
    }

    /// The indirect block's contents, when there is one.
    pub fn indirect_sector(&self) -> Option<[u8; SECTOR_SIZE]> {
        self.indirect?;
        let mut sector = [0; SECTOR_SIZE];
        for (i, &block) in self.overflow().iter().enumerate() {
            le::put_u32(&mut sector, i * 4, block);
        }
        Some(sector)
    }
}

/// A 64-byte inode record as stored in a chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InodeRecord {
    pub kind: u8,
    pub link_count: u32,
    pub size: u32,
    pub direct: [u32; DIRECT_BLOCKS],
    pub indirect: u32,
}

impl InodeRecord {
    pub const FREE: Self = Self {
        kind: 0,
        link_count: 0,
        size: 0,
        direct: [0; DIRECT_BLOCKS],
        indirect: 0,
    };

    /// Describe `inode` whose payload was written to `blocks`.
    pub fn encode(inode: &Inode, blocks: &InodeBlocks) -> Self {
        let mut direct = [0; DIRECT_BLOCKS];
        for (slot, &block) in direct.iter_mut().zip(blocks.data.iter()) {
            *slot = block;
        }
        Self {
            kind: inode.kind().into(),
            link_count: inode.link_count(),
            size: inode.size(),
            direct,
            indirect: blocks.indirect.unwrap_or(0),
        }
    }

    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut bytes = [0; RECORD_SIZE];
        bytes[0] = self.kind;
        le::put_u32(&mut bytes, 4, self.link_count);
        le::put_u32(&mut bytes, 8, self.size);
        for (i, &block) in self.direct.iter().enumerate() {
            le::put_u32(&mut bytes, 12 + i * 4, block);
        }
        le::put_u32(&mut bytes, 12 + DIRECT_BLOCKS * 4, self.indirect);
        bytes
    }

    /// `bytes` must be at least [`RECORD_SIZE`] long.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut direct = [0; DIRECT_BLOCKS];
        for (i, slot) in direct.iter_mut().enumerate() {
            *slot = le::get_u32(bytes, 12 + i * 4);
        }
        Self {
            kind: bytes[0],
            link_count: le::get_u32(bytes, 4),
            size: le::get_u32(bytes, 8),
            direct,
            indirect: le::get_u32(bytes, 12 + DIRECT_BLOCKS * 4),
        }
    }

    pub fn kind(&self) -> Result<InodeKind> {
        InodeKind::try_from(self.kind).map_err(|_| FsError::Corrupted)
    }

    pub const fn is_free(&self) -> bool {
        self.kind == 0
    }

    /// Payload length in bytes.
    pub fn payload_len(&self) -> Result<usize> {
        let len = match self.kind()? {
            InodeKind::Free => 0,
            InodeKind::File => self.size as usize,
            InodeKind::Directory => self.size as usize * DIRENT_SIZE,
        };
        if len > MAX_FILE_BLOCKS * SECTOR_SIZE {
            return Err(FsError::Corrupted);
        }
        Ok(len)
    }

    /// Payload block numbers in file order, reading the indirect block
    /// through `read_block` when the payload needs it.
    pub fn data_blocks<F>(&self, mut read_block: F) -> Result<SmallVec<[u32; DIRECT_BLOCKS]>>
    where
        F: FnMut(u32, &mut [u8; SECTOR_SIZE]) -> Result<()>,
    {
        let needed = self.payload_len()?.div_ceil(SECTOR_SIZE);
        let mut blocks: SmallVec<[u32; DIRECT_BLOCKS]> =
            self.direct.iter().copied().take(needed).collect();
        if needed > DIRECT_BLOCKS && self.indirect != 0 {
            let mut list = [0; SECTOR_SIZE];
            read_block(self.indirect, &mut list)?;
            blocks.extend(
                (0..INDIRECT_ENTRIES)
                    .map(|i| le::get_u32(&list, i * 4))
                    .take_while(|&block| block != 0)
                    .take(needed - DIRECT_BLOCKS),
            );
        }
        Ok(blocks)
    }

    /// Rebuild the in-memory inode, fetching payload blocks through
    /// `read_block`.
    pub fn decode<F>(&self, mut read_block: F) -> Result<Inode>
    where
        F: FnMut(u32, &mut [u8; SECTOR_SIZE]) -> Result<()>,
    {
        let len = self.payload_len()?;
        let blocks = self.data_blocks(&mut read_block)?;
        match self.kind()? {
            InodeKind::Free => Ok(Inode::default()),
            InodeKind::File => {
                let mut bytes = GrowVec::with_capacity(FILE_GROWTH, len)
                    .map_err(|err| grow_error(err, FsError::Corrupted))?;
                bytes
                    .try_resize(len, 0)
                    .map_err(|err| grow_error(err, FsError::Corrupted))?;
                fill(&mut bytes, &blocks, &mut read_block)?;
                Ok(Inode::new(self.link_count, InodeData::File(bytes)))
            }
            InodeKind::Directory => {
                let mut raw = Vec::new();
                raw.try_reserve_exact(len)
                    .map_err(|_| FsError::OutOfMemory)?;
                raw.resize(len, 0);
                let filled = fill(&mut raw, &blocks, &mut read_block)?;
                let mut entries = GrowVec::with_capacity(DIR_GROWTH, self.size as usize)
                    .map_err(|err| grow_error(err, FsError::Corrupted))?;
                for slot in raw[..filled - filled % DIRENT_SIZE].chunks_exact(DIRENT_SIZE) {
                    entries
                        .try_push(decode_dirent(slot)?)
                        .map_err(|err| grow_error(err, FsError::Corrupted))?;
                }
                Ok(Inode::new(self.link_count, InodeData::Directory(entries)))
            }
        }
    }
}

/// Copy block contents into `out` in order, returning how many bytes were
/// filled. A short block list leaves the tail zeroed.
fn fill<F>(out: &mut [u8], blocks: &[u32], read_block: &mut F) -> Result<usize>
where
    F: FnMut(u32, &mut [u8; SECTOR_SIZE]) -> Result<()>,
{
    let mut sector = [0; SECTOR_SIZE];
    let mut filled = 0;
    for (&block, dst) in blocks.iter().zip(out.chunks_mut(SECTOR_SIZE)) {
        read_block(block, &mut sector)?;
        dst.copy_from_slice(&sector[..dst.len()]);
        filled += dst.len();
    }
    if filled < out.len() {
        warn!("inode payload truncated: {filled} of {} bytes", out.len());
    }
    Ok(filled)
}

/// Bytes the payload of `inode` takes on disk.
pub fn payload_len(inode: &Inode) -> usize {
    match inode.data() {
        InodeData::Free => 0,
        InodeData::File(bytes) => bytes.len(),
        InodeData::Directory(entries) => entries.len() * DIRENT_SIZE,
    }
}

/// Serialise an inode's payload into `out`, which is cleared first.
pub fn encode_payload(inode: &Inode, out: &mut Vec<u8>) -> Result<()> {
    out.clear();
    match inode.data() {
        InodeData::Free => {}
        InodeData::File(bytes) => {
            out.try_reserve_exact(bytes.len())
                .map_err(|_| FsError::OutOfMemory)?;
            out.extend_from_slice(bytes);
        }
        InodeData::Directory(entries) => {
            out.try_reserve_exact(entries.len() * DIRENT_SIZE)
                .map_err(|_| FsError::OutOfMemory)?;
            for entry in entries.iter() {
                out.extend_from_slice(&encode_dirent(entry)?);
            }
        }
    }
    Ok(())
}

pub fn encode_dirent(entry: &DirEntry) -> Result<[u8; DIRENT_SIZE]> {
    let name = entry.name.as_bytes();
    if name.is_empty() || name.contains(&0) {
        return Err(FsError::InvalidArgument);
    }
    if name.len() >= DIRENT_NAME_LEN {
        return Err(FsError::NameTooLong);
    }
    let mut slot = [0; DIRENT_SIZE];
    slot[..name.len()].copy_from_slice(name);
    le::put_u32(&mut slot, DIRENT_NAME_LEN, entry.inode.0);
    Ok(slot)
}

pub fn decode_dirent(slot: &[u8]) -> Result<DirEntry> {
    let field = &slot[..DIRENT_NAME_LEN];
    let len = field.iter().position(|&b| b == 0).unwrap_or(DIRENT_NAME_LEN);
    if len == 0 {
        return Err(FsError::Corrupted);
    }
    let name = str::from_utf8(&field[..len]).map_err(|_| FsError::Corrupted)?;
    let mut owned = String::new();
    owned
        .try_reserve_exact(name.len())
        .map_err(|_| FsError::OutOfMemory)?;
    owned.push_str(name);
    Ok(DirEntry {
        name: owned,
        inode: InodeId(le::get_u32(slot, DIRENT_NAME_LEN)),
    })
}
