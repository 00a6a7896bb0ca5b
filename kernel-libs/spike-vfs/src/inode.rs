use alloc::string::String;
use kernel_utils::grow_vec::{GrowError, GrowVec};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use spike_error::{FsError, Result};

use crate::config::{DIR_GROWTH, FILE_GROWTH};

/// Index of a slot in the inode table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InodeId(pub u32);

impl InodeId {
    pub const ROOT: Self = Self(0);

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl core::fmt::Display for InodeId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum InodeKind {
    Free = 0,
    File = 1,
    Directory = 2,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub inode: InodeId,
}

/// The payload owned by an inode slot.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum InodeData {
    #[default]
    Free,
    File(GrowVec<u8>),
    Directory(GrowVec<DirEntry>),
}

impl InodeData {
    pub const fn empty(kind: InodeKind) -> Self {
        match kind {
            InodeKind::Free => Self::Free,
            InodeKind::File => Self::File(GrowVec::new(FILE_GROWTH)),
            InodeKind::Directory => Self::Directory(GrowVec::new(DIR_GROWTH)),
        }
    }

    pub const fn kind(&self) -> InodeKind {
        match self {
            Self::Free => InodeKind::Free,
            Self::File(_) => InodeKind::File,
            Self::Directory(_) => InodeKind::Directory,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Inode {
    pub(crate) link_count: u32,
    pub(crate) data: InodeData,
}

impl Inode {
    pub const fn new(link_count: u32, data: InodeData) -> Self {
        Self { link_count, data }
    }

    pub const fn kind(&self) -> InodeKind {
        self.data.kind()
    }

    pub const fn link_count(&self) -> u32 {
        self.link_count
    }

    pub const fn is_free(&self) -> bool {
        matches!(self.data, InodeData::Free)
    }

    pub const fn is_dir(&self) -> bool {
        matches!(self.data, InodeData::Directory(_))
    }

    pub const fn data(&self) -> &InodeData {
        &self.data
    }

    /// Logical size: bytes for a file, entries for a directory.
    pub fn size(&self) -> u32 {
        match &self.data {
            InodeData::Free => 0,
            InodeData::File(bytes) => bytes.len() as u32,
            InodeData::Directory(entries) => entries.len() as u32,
        }
    }

    /// Allocated capacity of the payload, in elements.
    pub fn capacity(&self) -> usize {
        match &self.data {
            InodeData::Free => 0,
            InodeData::File(bytes) => bytes.capacity(),
            InodeData::Directory(entries) => entries.capacity(),
        }
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.data {
            InodeData::File(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn entries(&self) -> Option<&[DirEntry]> {
        match &self.data {
            InodeData::Directory(entries) => Some(entries),
            _ => None,
        }
    }

    pub(crate) fn bytes_mut(&mut self) -> Result<&mut GrowVec<u8>> {
        match &mut self.data {
            InodeData::File(bytes) => Ok(bytes),
            InodeData::Directory(_) => Err(FsError::IsADirectory),
            InodeData::Free => Err(FsError::NotFound),
        }
    }

    pub(crate) fn entries_mut(&mut self) -> Result<&mut GrowVec<DirEntry>> {
        match &mut self.data {
            InodeData::Directory(entries) => Ok(entries),
            InodeData::File(_) => Err(FsError::NotADirectory),
            InodeData::Free => Err(FsError::NotFound),
        }
    }

    pub fn stat(&self) -> Stat {
        Stat {
            kind: self.kind(),
            size: self.size(),
            link_count: self.link_count,
            capacity: self.capacity(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub kind: InodeKind,
    pub size: u32,
    pub link_count: u32,
    pub capacity: usize,
}

/// Map a [`GrowError`] to the filesystem error, `at_limit` standing for a
/// full container.
pub fn grow_error(err: GrowError, at_limit: FsError) -> FsError {
    match err {
        GrowError::LimitReached => at_limit,
        GrowError::AllocFailed(_) => FsError::OutOfMemory,
    }
}

/// Copy `name` into a new string without aborting on allocation failure.
pub fn owned_name(name: &str) -> Result<String> {
    let mut owned = String::new();
    owned
        .try_reserve_exact(name.len())
        .map_err(|_| FsError::OutOfMemory)?;
    owned.push_str(name);
    Ok(owned)
}
