//! Directory entry store: the `(name, inode)` arrays owned by directories.

use log::trace;
use spike_error::{FsError, Result};

use crate::{
    DirEntry, InodeId, Vfs,
    inode::{grow_error, owned_name},
};

impl Vfs {
    pub fn lookup(&self, dir: InodeId, name: &str) -> Result<InodeId> {
        self.inode(dir)?
            .entries()
            .ok_or(FsError::NotADirectory)?
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.inode)
            .ok_or(FsError::NotFound)
    }

    /// Append `name -> child` to `dir` and count the new link on `child`.
    ///
    /// Duplicate names are not checked here.
    pub fn add_entry(&mut self, dir: InodeId, name: &str, child: InodeId) -> Result<()> {
        let entry = DirEntry {
            name: owned_name(name)?,
            inode: child,
        };
        self.insert_entry(dir, entry)
    }

    pub(crate) fn insert_entry(&mut self, dir: InodeId, entry: DirEntry) -> Result<()> {
        self.inode(entry.inode)?;
        let child = entry.inode;
        self.inode_mut(dir)?
            .entries_mut()?
            .try_push(entry)
            .map_err(|e| grow_error(e, FsError::FileTooLarge))?;
        self.inode_mut(child)?.link_count += 1;
        self.mark_dirty();
        Ok(())
    }

    /// Make sure one more entry fits in `dir` without allocating.
    pub(crate) fn reserve_entry(&mut self, dir: InodeId) -> Result<()> {
        let entries = self.inode_mut(dir)?.entries_mut()?;
        let wanted = entries.len() + 1;
        entries
            .grow_to(wanted)
            .map_err(|e| grow_error(e, FsError::FileTooLarge))
    }

    /// Remove `name` from `dir`. The last entry takes its place, so order
    /// is not preserved. Returns the inode the entry pointed at.
    pub fn remove_entry(&mut self, dir: InodeId, name: &str) -> Result<InodeId> {
        let entries = self.inode_mut(dir)?.entries_mut()?;
        let position = entries
            .iter()
            .position(|entry| entry.name == name)
            .ok_or(FsError::NotFound)?;
        let removed = entries.swap_remove(position);
        self.unlink(removed.inode);
        self.mark_dirty();
        Ok(removed.inode)
    }

    /// Point the ".." of `dir` at `new_parent`, moving one link from the
    /// old parent to the new one.
    pub fn update_dotdot(&mut self, dir: InodeId, new_parent: InodeId) -> Result<()> {
        if !self.inode(new_parent)?.is_dir() {
            return Err(FsError::NotADirectory);
        }
        let entries = self.inode_mut(dir)?.entries_mut()?;
        let dotdot = entries
            .iter_mut()
            .find(|entry| entry.name == "..")
            .ok_or(FsError::NotFound)?;
        let old_parent = core::mem::replace(&mut dotdot.inode, new_parent);

        self.inode_mut(new_parent)?.link_count += 1;
        self.unlink(old_parent);
        self.mark_dirty();
        Ok(())
    }

    /// Drop one link, releasing the inode once nothing refers to it.
    fn unlink(&mut self, id: InodeId) {
        let Ok(inode) = self.inode_mut(id) else {
            return;
        };
        inode.link_count = inode.link_count.saturating_sub(1);
        if inode.link_count == 0 && id != InodeId::ROOT {
            trace!("inode {id} has no links left, releasing");
            // The slot is known to exist, freeing cannot fail.
            let _ = self.free(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{InodeId, InodeKind, Vfs};
    use spike_error::FsError;

    fn with_file() -> (Vfs, InodeId) {
        let mut vfs = Vfs::new().unwrap();
        let file = vfs.alloc(InodeKind::File).unwrap();
        vfs.add_entry(InodeId::ROOT, "f", file).unwrap();
        (vfs, file)
    }

    #[test]
    fn add_counts_link() {
        let (vfs, file) = with_file();
        assert_eq!(1, vfs.inode(file).unwrap().link_count());
        assert_eq!(Ok(file), vfs.lookup(InodeId::ROOT, "f"));
        assert_eq!(3, vfs.inode(InodeId::ROOT).unwrap().size());
    }

    #[test]
    fn lookup_missing() {
        let (vfs, file) = with_file();
        assert_eq!(Err(FsError::NotFound), vfs.lookup(InodeId::ROOT, "g"));
        assert_eq!(Err(FsError::NotADirectory), vfs.lookup(file, "x"));
    }

    #[test]
    fn last_link_frees() {
        let (mut vfs, file) = with_file();
        vfs.add_entry(InodeId::ROOT, "g", file).unwrap();
        assert_eq!(2, vfs.inode(file).unwrap().link_count());

        vfs.remove_entry(InodeId::ROOT, "f").unwrap();
        assert_eq!(1, vfs.inode(file).unwrap().link_count());

        vfs.remove_entry(InodeId::ROOT, "g").unwrap();
        assert!(vfs.slot(file).unwrap().is_free());
    }

    #[test]
    fn remove_swaps_last_in() {
        let mut vfs = Vfs::new().unwrap();
        for name in ["a", "b", "c"] {
            let f = vfs.alloc(InodeKind::File).unwrap();
            vfs.add_entry(InodeId::ROOT, name, f).unwrap();
        }
        vfs.remove_entry(InodeId::ROOT, "a").unwrap();
        let names: alloc::vec::Vec<_> = vfs
            .inode(InodeId::ROOT)
            .unwrap()
            .entries()
            .unwrap()
            .iter()
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(alloc::vec![".", "..", "c", "b"], names);
    }

    #[test]
    fn remove_missing() {
        let mut vfs = Vfs::new().unwrap();
        assert_eq!(Err(FsError::NotFound), vfs.remove_entry(InodeId::ROOT, "x"));
    }

    #[test]
    fn grows_past_initial_capacity() {
        let mut vfs = Vfs::new().unwrap();
        let f = vfs.alloc(InodeKind::File).unwrap();
        for i in 0..20 {
            vfs.add_entry(InodeId::ROOT, &alloc::format!("n{i}"), f).unwrap();
        }
        let root = vfs.inode(InodeId::ROOT).unwrap();
        assert_eq!(22, root.size());
        assert_eq!(32, root.capacity());
        assert_eq!(20, vfs.inode(f).unwrap().link_count());
    }

    #[test]
    fn dotdot_moves_link() {
        let mut vfs = Vfs::new().unwrap();
        let a = vfs.alloc(InodeKind::Directory).unwrap();
        vfs.add_entry(a, ".", a).unwrap();
        vfs.add_entry(a, "..", InodeId::ROOT).unwrap();
        vfs.add_entry(InodeId::ROOT, "a", a).unwrap();
        let b = vfs.alloc(InodeKind::Directory).unwrap();
        vfs.add_entry(b, ".", b).unwrap();
        vfs.add_entry(b, "..", a).unwrap();
        vfs.add_entry(a, "b", b).unwrap();

        let root_links = vfs.inode(InodeId::ROOT).unwrap().link_count();
        let a_links = vfs.inode(a).unwrap().link_count();
        vfs.update_dotdot(b, InodeId::ROOT).unwrap();

        assert_eq!(Ok(InodeId::ROOT), vfs.lookup(b, ".."));
        assert_eq!(root_links + 1, vfs.inode(InodeId::ROOT).unwrap().link_count());
        assert_eq!(a_links - 1, vfs.inode(a).unwrap().link_count());
    }
}
