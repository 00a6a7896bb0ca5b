//! Namespace operations used by the file-descriptor layer.

use alloc::{string::String, vec::Vec};
use kernel_utils::grow_vec::GrowVec;
use log::debug;
use spike_error::{FsError, Result};

use crate::{
    DirEntry, Inode, InodeData, InodeId, InodeKind, ParentLeaf, Stat, Vfs,
    config::{DIR_GROWTH, DIR_INITIAL_ENTRIES, FILE_GROWTH, MAX_FILE_SIZE, NAME_MAX},
    inode::{grow_error, owned_name},
};

/// Check that `name` can be stored as a directory entry.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\0']) {
        return Err(FsError::InvalidArgument);
    }
    if name.len() > NAME_MAX {
        return Err(FsError::NameTooLong);
    }
    Ok(())
}

fn is_special(leaf: &str) -> bool {
    leaf.is_empty() || leaf == "." || leaf == ".."
}

impl Vfs {
    /// Create an empty regular file. The parent must already exist.
    pub fn create(&mut self, path: &str) -> Result<InodeId> {
        self.link_new(path, InodeData::empty(InodeKind::File))
    }

    /// Create a directory holding "." and "..".
    pub fn mkdir(&mut self, path: &str) -> Result<InodeId> {
        let entries = GrowVec::with_capacity(DIR_GROWTH, DIR_INITIAL_ENTRIES)
            .map_err(|e| grow_error(e, FsError::FileTooLarge))?;
        self.link_new(path, InodeData::Directory(entries))
    }

    /// Allocate an inode with `data` and link it at `path`.
    ///
    /// Everything that can fail for lack of memory happens before the tree
    /// is touched, so an error leaves the namespace as it was.
    fn link_new(&mut self, path: &str, mut data: InodeData) -> Result<InodeId> {
        let ParentLeaf {
            parent,
            leaf,
            existing,
        } = self.resolve_parent(path)?;
        if existing.is_some() {
            return Err(FsError::AlreadyExists);
        }
        validate_name(leaf)?;

        let name = owned_name(leaf)?;
        let dot_names = match &data {
            InodeData::Directory(_) => Some((owned_name(".")?, owned_name("..")?)),
            _ => None,
        };
        self.reserve_entry(parent)?;

        let id = self.alloc(data.kind())?;
        let mut link_count = 0;
        if let Some((dot, dotdot)) = dot_names {
            if let InodeData::Directory(entries) = &mut data {
                // Capacity for both was reserved by `mkdir`.
                let pushed = entries
                    .try_push(DirEntry {
                        name: dot,
                        inode: id,
                    })
                    .and_then(|()| {
                        entries.try_push(DirEntry {
                            name: dotdot,
                            inode: parent,
                        })
                    });
                if let Err(err) = pushed {
                    let _ = self.free(id);
                    return Err(grow_error(err, FsError::FileTooLarge));
                }
            }
            link_count = 1;
        }
        self.install(id, Inode::new(link_count, data))?;
        if link_count == 1 {
            self.inode_mut(parent)?.link_count += 1;
        }

        self.insert_entry(
            parent,
            DirEntry {
                name,
                inode: id,
            },
        )?;
        debug!("created {path} as inode {id}");
        Ok(id)
    }

    /// Remove a file or an empty directory.
    pub fn remove(&mut self, path: &str) -> Result<()> {
        let ParentLeaf {
            parent,
            leaf,
            existing,
        } = self.resolve_parent(path)?;
        if is_special(leaf) {
            return Err(FsError::InvalidArgument);
        }
        let id = existing.ok_or(FsError::NotFound)?;
        if id == InodeId::ROOT || id == self.cwd() {
            return Err(FsError::InvalidArgument);
        }

        let inode = self.inode(id)?;
        if inode.is_dir() {
            if inode.size() > 2 {
                return Err(FsError::DirectoryNotEmpty);
            }
            self.remove_entry(id, "..")?;
            self.remove_entry(id, ".")?;
        }
        self.remove_entry(parent, leaf)?;
        debug!("removed {path}");
        Ok(())
    }

    /// Move the entry at `from` to `to`. The target must not exist, unless
    /// it already is the same inode.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        let src = self.resolve_parent(from)?;
        if is_special(src.leaf) {
            return Err(FsError::InvalidArgument);
        }
        let id = src.existing.ok_or(FsError::NotFound)?;
        if id == InodeId::ROOT {
            return Err(FsError::InvalidArgument);
        }

        let dst = self.resolve_parent(to)?;
        match dst.existing {
            Some(existing) if existing == id => return Ok(()),
            Some(_) => return Err(FsError::AlreadyExists),
            None => (),
        }
        validate_name(dst.leaf)?;

        let moves_dir = self.inode(id)?.is_dir() && dst.parent != src.parent;
        if moves_dir && self.is_ancestor(id, dst.parent)? {
            return Err(FsError::InvalidArgument);
        }

        let name = owned_name(dst.leaf)?;
        self.reserve_entry(dst.parent)?;
        self.insert_entry(dst.parent, DirEntry { name, inode: id })?;
        self.remove_entry(src.parent, src.leaf)?;
        if moves_dir {
            self.update_dotdot(id, dst.parent)?;
        }
        debug!("renamed {from} to {to}");
        Ok(())
    }

    /// Whether `ancestor` is `node` or one of the directories above it.
    fn is_ancestor(&self, ancestor: InodeId, mut node: InodeId) -> Result<bool> {
        // Bounded by the table size in case ".." links form a loop.
        for _ in 0..=self.capacity() {
            if node == ancestor {
                return Ok(true);
            }
            if node == InodeId::ROOT {
                return Ok(false);
            }
            node = self.lookup(node, "..")?;
        }
        Err(FsError::Corrupted)
    }

    /// Copy a regular file's contents to a new file at `to`.
    pub fn copy(&mut self, from: &str, to: &str) -> Result<InodeId> {
        let src = self.resolve(from)?;
        let bytes = self.inode(src)?.bytes().ok_or(FsError::IsADirectory)?;
        let mut copy = GrowVec::with_capacity(FILE_GROWTH, bytes.len())
            .map_err(|e| grow_error(e, FsError::FileTooLarge))?;
        copy.try_extend_from_slice(bytes)
            .map_err(|e| grow_error(e, FsError::FileTooLarge))?;
        self.link_new(to, InodeData::File(copy))
    }

    /// Read from `offset` into `buf`, returning the number of bytes read.
    pub fn read_at(&self, id: InodeId, offset: usize, buf: &mut [u8]) -> Result<usize> {
        let bytes = self.inode(id)?.bytes().ok_or(FsError::IsADirectory)?;
        let Some(available) = bytes.get(offset..) else {
            return Ok(0);
        };
        let count = available.len().min(buf.len());
        buf[..count].copy_from_slice(&available[..count]);
        Ok(count)
    }

    /// Write `data` at `offset`, growing the file and zero-filling any gap.
    pub fn write_at(&mut self, id: InodeId, offset: usize, data: &[u8]) -> Result<usize> {
        let end = offset
            .checked_add(data.len())
            .filter(|&end| end <= MAX_FILE_SIZE)
            .ok_or(FsError::FileTooLarge)?;
        let bytes = self.inode_mut(id)?.bytes_mut()?;
        if data.is_empty() {
            return Ok(0);
        }
        if end > bytes.len() {
            bytes
                .try_resize(end, 0)
                .map_err(|e| grow_error(e, FsError::FileTooLarge))?;
        }
        bytes[offset..end].copy_from_slice(data);
        self.mark_dirty();
        Ok(data.len())
    }

    /// Set the file length, zero-filling when it grows.
    pub fn truncate(&mut self, id: InodeId, len: usize) -> Result<()> {
        if len > MAX_FILE_SIZE {
            return Err(FsError::FileTooLarge);
        }
        let bytes = self.inode_mut(id)?.bytes_mut()?;
        if len <= bytes.len() {
            bytes.truncate(len);
        } else {
            bytes
                .try_resize(len, 0)
                .map_err(|e| grow_error(e, FsError::FileTooLarge))?;
        }
        self.mark_dirty();
        Ok(())
    }

    /// Whole contents of the file at `path`.
    pub fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let bytes = self
            .inode(self.resolve(path)?)?
            .bytes()
            .ok_or(FsError::IsADirectory)?;
        let mut out = Vec::new();
        out.try_reserve_exact(bytes.len())
            .map_err(|_| FsError::OutOfMemory)?;
        out.extend_from_slice(bytes);
        Ok(out)
    }

    /// Write into the existing file at `path`.
    pub fn write_file(&mut self, path: &str, offset: usize, data: &[u8]) -> Result<usize> {
        let id = self.resolve(path)?;
        self.write_at(id, offset, data)
    }

    pub fn list_dir(&self, id: InodeId) -> Result<&[DirEntry]> {
        self.inode(id)?.entries().ok_or(FsError::NotADirectory)
    }

    pub fn read_dir(&self, path: &str) -> Result<&[DirEntry]> {
        self.list_dir(self.resolve(path)?)
    }

    pub fn stat(&self, id: InodeId) -> Result<Stat> {
        Ok(self.inode(id)?.stat())
    }

    pub fn set_cwd(&mut self, path: &str) -> Result<()> {
        let id = self.resolve(path)?;
        self.set_cwd_inode(id)
    }

    /// Absolute path of the current directory, rebuilt by walking "..".
    pub fn cwd_path(&self) -> Result<String> {
        let mut names = Vec::new();
        let mut node = self.cwd();
        while node != InodeId::ROOT {
            if names.len() > self.capacity() {
                return Err(FsError::Corrupted);
            }
            let parent = self.lookup(node, "..")?;
            let entry = self
                .list_dir(parent)?
                .iter()
                .find(|entry| entry.inode == node && !is_special(&entry.name))
                .ok_or(FsError::Corrupted)?;
            names.push(entry.name.as_str());
            node = parent;
        }

        if names.is_empty() {
            return owned_name("/");
        }
        let mut path = String::new();
        for name in names.iter().rev() {
            path.push('/');
            path.push_str(name);
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::validate_name;
    use crate::{InodeId, Vfs, config::MAX_FILE_SIZE};
    use spike_error::FsError;

    #[test]
    fn names() {
        assert!(validate_name("ok.txt").is_ok());
        assert_eq!(Err(FsError::InvalidArgument), validate_name(""));
        assert_eq!(Err(FsError::InvalidArgument), validate_name(".."));
        assert_eq!(Err(FsError::InvalidArgument), validate_name("a/b"));
        assert_eq!(Err(FsError::InvalidArgument), validate_name("a\0b"));
        assert_eq!(
            Err(FsError::NameTooLong),
            validate_name("abcdefghijklmnopqrstuvwxyz01")
        );
    }

    #[test]
    fn write_with_gap() {
        let mut vfs = Vfs::new().unwrap();
        let f = vfs.create("/f").unwrap();
        vfs.write_at(f, 3, b"xy").unwrap();
        assert_eq!(b"\0\0\0xy", vfs.read_file("/f").unwrap().as_slice());
    }

    #[test]
    fn read_past_end() {
        let mut vfs = Vfs::new().unwrap();
        let f = vfs.create("/f").unwrap();
        vfs.write_at(f, 0, b"abc").unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(Ok(1), vfs.read_at(f, 2, &mut buf));
        assert_eq!(b'c', buf[0]);
        assert_eq!(Ok(0), vfs.read_at(f, 10, &mut buf));
    }

    #[test]
    fn file_size_limit() {
        let mut vfs = Vfs::new().unwrap();
        let f = vfs.create("/f").unwrap();
        assert_eq!(Err(FsError::FileTooLarge), vfs.write_at(f, MAX_FILE_SIZE, b"x"));
        assert_eq!(Ok(1), vfs.write_at(f, MAX_FILE_SIZE - 1, b"x"));
    }

    #[test]
    fn directories_are_not_files() {
        let mut vfs = Vfs::new().unwrap();
        vfs.mkdir("/d").unwrap();
        let d = vfs.resolve("/d").unwrap();
        assert_eq!(Err(FsError::IsADirectory), vfs.write_at(d, 0, b"x"));
        assert_eq!(Err(FsError::IsADirectory), vfs.copy("/d", "/e"));
    }

    #[test]
    fn truncate_both_ways() {
        let mut vfs = Vfs::new().unwrap();
        let f = vfs.create("/f").unwrap();
        vfs.write_at(f, 0, b"hello").unwrap();
        vfs.truncate(f, 2).unwrap();
        assert_eq!(b"he", vfs.read_file("/f").unwrap().as_slice());
        vfs.truncate(f, 4).unwrap();
        assert_eq!(b"he\0\0", vfs.read_file("/f").unwrap().as_slice());
    }

    #[test]
    fn cwd_path_walks_up() {
        let mut vfs = Vfs::new().unwrap();
        assert_eq!("/", vfs.cwd_path().unwrap());
        vfs.mkdir("/usr").unwrap();
        vfs.mkdir("/usr/lib").unwrap();
        vfs.set_cwd("/usr/lib").unwrap();
        assert_eq!("/usr/lib", vfs.cwd_path().unwrap());
        assert_eq!(Err(FsError::InvalidArgument), vfs.remove("/usr/lib"));
        vfs.set_cwd("..").unwrap();
        assert_eq!(Ok(InodeId(1)), vfs.resolve("."));
    }

    #[test]
    fn cwd_must_be_directory() {
        let mut vfs = Vfs::new().unwrap();
        vfs.create("/f").unwrap();
        assert_eq!(Err(FsError::NotADirectory), vfs.set_cwd("/f"));
    }
}
