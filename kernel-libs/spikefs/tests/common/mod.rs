#![allow(dead_code)]

use std::collections::BTreeMap;

use spike_blockdev::{BlockDevice, DeviceError, RamDisk};
use spike_vfs::{InodeId, InodeKind, Vfs};

/// A [`RamDisk`] that starts failing writes once `writes_left` runs out,
/// or every read when `fail_reads` is set.
pub struct FaultyDisk {
    pub inner: RamDisk,
    pub writes_left: Option<usize>,
    pub fail_reads: bool,
    pub present: bool,
}

impl FaultyDisk {
    pub fn new(sectors: u32) -> Self {
        Self {
            inner: RamDisk::new(sectors),
            writes_left: None,
            fail_reads: false,
            present: true,
        }
    }
}

impl BlockDevice for FaultyDisk {
    fn read_sectors(&mut self, lba: u32, count: u32, buf: &mut [u8]) -> Result<(), DeviceError> {
        if self.fail_reads {
            return Err(DeviceError::Transfer { lba });
        }
        self.inner.read_sectors(lba, count, buf)
    }

    fn write_sectors(&mut self, lba: u32, count: u32, buf: &[u8]) -> Result<(), DeviceError> {
        match &mut self.writes_left {
            Some(0) => return Err(DeviceError::Transfer { lba }),
            Some(left) => *left -= 1,
            None => {}
        }
        self.inner.write_sectors(lba, count, buf)
    }

    fn flush(&mut self) -> Result<(), DeviceError> {
        self.inner.flush()
    }

    fn total_sectors(&self) -> u32 {
        self.inner.total_sectors()
    }

    fn present(&self) -> bool {
        self.present
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub kind: InodeKind,
    pub link_count: u32,
    pub content: Vec<u8>,
}

/// Every path reachable from the root, without "." and "..".
pub fn snapshot(vfs: &Vfs) -> BTreeMap<String, Node> {
    let mut nodes = BTreeMap::new();
    walk(vfs, InodeId::ROOT, String::new(), &mut nodes);
    nodes
}

fn walk(vfs: &Vfs, dir: InodeId, prefix: String, nodes: &mut BTreeMap<String, Node>) {
    for entry in vfs.list_dir(dir).unwrap() {
        if entry.name == "." || entry.name == ".." {
            continue;
        }
        let path = format!("{prefix}/{}", entry.name);
        let inode = vfs.inode(entry.inode).unwrap();
        nodes.insert(
            path.clone(),
            Node {
                kind: inode.kind(),
                link_count: inode.link_count(),
                content: inode.bytes().map(<[u8]>::to_vec).unwrap_or_default(),
            },
        );
        if inode.is_dir() {
            walk(vfs, entry.inode, path, nodes);
        }
    }
}

/// Deterministic filler so misplaced blocks show up as content mismatches.
pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}
