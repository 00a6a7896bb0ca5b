#![no_std]

extern crate alloc;

use kernel_utils::grow_vec::GrowVec;
use log::trace;
use spike_error::{FsError, Result};

use crate::config::{DIR_GROWTH, DIR_INITIAL_ENTRIES, INITIAL_INODES, TABLE_GROWTH};

pub mod config;
pub mod dentry;
pub mod inode;
pub mod ops;
pub mod path;

pub use inode::{DirEntry, Inode, InodeData, InodeId, InodeKind, Stat};
pub use path::ParentLeaf;

/// The in-memory namespace: an arena of inode slots addressed by
/// [`InodeId`], slot 0 being the root directory.
#[derive(Debug, Clone)]
pub struct Vfs {
    inodes: GrowVec<Inode>,
    dirty: bool,
    cwd: InodeId,
}

impl Vfs {
    /// An empty tree containing only the root directory.
    pub fn new() -> Result<Self> {
        let mut vfs = Self {
            inodes: GrowVec::new(TABLE_GROWTH),
            dirty: false,
            cwd: InodeId::ROOT,
        };
        vfs.inodes
            .try_resize_with(INITIAL_INODES, Inode::default)
            .map_err(|e| inode::grow_error(e, FsError::OutOfInodes))?;
        vfs.reset()?;
        Ok(vfs)
    }

    /// Drop every payload and start over with an empty root whose "." and
    /// ".." both point at itself. The table keeps its current size.
    pub fn reset(&mut self) -> Result<()> {
        let mut root = GrowVec::with_capacity(DIR_GROWTH, DIR_INITIAL_ENTRIES)
            .map_err(|e| inode::grow_error(e, FsError::FileTooLarge))?;
        for name in [".", ".."] {
            root.try_push(DirEntry {
                name: inode::owned_name(name)?,
                inode: InodeId::ROOT,
            })
            .map_err(|e| inode::grow_error(e, FsError::FileTooLarge))?;
        }

        for slot in self.inodes.iter_mut() {
            *slot = Inode::default();
        }
        self.inodes[0] = Inode::new(2, InodeData::Directory(root));
        self.cwd = InodeId::ROOT;
        self.dirty = false;
        Ok(())
    }

    /// Number of slots in the table, free or not.
    pub fn capacity(&self) -> usize {
        self.inodes.len()
    }


    /// Grow the table to hold at least `min` slots.
    pub fn ensure_capacity(&mut self, min: usize) -> Result<()> {
        let len = self.inodes.len();
        if min <= len {
            return Ok(());
        }
        let target = TABLE_GROWTH
            .next_capacity(len, min)
            .map_err(|e| inode::grow_error(e, FsError::OutOfInodes))?;
        self.inodes
            .try_resize_with(target, Inode::default)
            .map_err(|e| inode::grow_error(e, FsError::OutOfInodes))?;
        trace!("inode table grown from {len} to {target} slots");
        Ok(())
    }

    /// Take the first free slot above the root, growing the table once if
    /// every slot is in use.
    pub fn alloc(&mut self, kind: InodeKind) -> Result<InodeId> {
        if kind == InodeKind::Free {
            return Err(FsError::InvalidArgument);
        }
        let index = match self.first_free() {
            Some(index) => index,
            None => {
                let len = self.inodes.len();
                self.ensure_capacity(len + 1)?;
                self.first_free().ok_or(FsError::OutOfInodes)?
            }
        };
        self.inodes[index] = Inode::new(0, InodeData::empty(kind));
        self.dirty = true;
        trace!("allocated inode #{index} as {kind:?}");
        Ok(InodeId(index as u32))
    }

    fn first_free(&self) -> Option<usize> {
        self.inodes
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, inode)| inode.is_free())
            .map(|(index, _)| index)
    }

    /// Release the slot and its payload.
    pub fn free(&mut self, id: InodeId) -> Result<()> {
        if id == InodeId::ROOT {
            return Err(FsError::InvalidArgument);
        }
        let slot = self
            .inodes
            .get_mut(id.index())
            .ok_or(FsError::NotFound)?;
        *slot = Inode::default();
        self.dirty = true;
        Ok(())
    }

    /// The slot at `id`, including free ones.
    pub fn slot(&self, id: InodeId) -> Option<&Inode> {
        self.inodes.get(id.index())
    }

    /// The in-use inode at `id`.
    pub fn inode(&self, id: InodeId) -> Result<&Inode> {
        match self.inodes.get(id.index()) {
            Some(inode) if !inode.is_free() => Ok(inode),
            _ => Err(FsError::NotFound),
        }
    }

    pub(crate) fn inode_mut(&mut self, id: InodeId) -> Result<&mut Inode> {
        match self.inodes.get_mut(id.index()) {
            Some(inode) if !inode.is_free() => Ok(inode),
            _ => Err(FsError::NotFound),
        }
    }

    /// Put a fully built inode into slot `id`, replacing whatever was there.
    pub fn install(&mut self, id: InodeId, inode: Inode) -> Result<()> {
        let slot = self
            .inodes
            .get_mut(id.index())
            .ok_or(FsError::OutOfInodes)?;
        *slot = inode;
        self.dirty = true;
        Ok(())
    }

    /// Every slot in table order.
    pub fn iter(&self) -> impl Iterator<Item = (InodeId, &Inode)> {
        self.inodes
            .iter()
            .enumerate()
            .map(|(i, inode)| (InodeId(i as u32), inode))
    }

    /// Highest slot that is not free. The root is always in use.
    pub fn highest_in_use(&self) -> InodeId {
        self.inodes
            .iter()
            .rposition(|inode| !inode.is_free())
            .map_or(InodeId::ROOT, |i| InodeId(i as u32))
    }

    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) const fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Called once memory and disk agree again, after a sync or a load.
    pub const fn mark_clean(&mut self) {
        self.dirty = false;
    }

    pub const fn cwd(&self) -> InodeId {
        self.cwd
    }

    pub fn set_cwd_inode(&mut self, id: InodeId) -> Result<()> {
        if !self.inode(id)?.is_dir() {
            return Err(FsError::NotADirectory);
        }
        self.cwd = id;
        Ok(())
    }
}
