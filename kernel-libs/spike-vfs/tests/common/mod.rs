use std::collections::BTreeMap;

use spike_vfs::{InodeId, Vfs};

/// Count, for every inode, the directory entries anywhere in the tree that
/// point at it.
pub fn count_references(vfs: &Vfs) -> BTreeMap<InodeId, u32> {
    let mut counts = BTreeMap::new();
    for (_, inode) in vfs.iter() {
        if let Some(entries) = inode.entries() {
            for entry in entries {
                *counts.entry(entry.inode).or_insert(0) += 1;
            }
        }
    }
    counts
}

pub fn assert_link_counts(vfs: &Vfs) {
    let counts = count_references(vfs);
    for (id, inode) in vfs.iter() {
        if inode.is_free() {
            assert!(!counts.contains_key(&id), "free inode {id} is still referenced");
        } else {
            assert_eq!(
                counts.get(&id).copied().unwrap_or(0),
                inode.link_count(),
                "link count of {id}"
            );
        }
    }
}
