use itertools::{Itertools, Position};
use spike_error::{FsError, Result};

use crate::{InodeId, Vfs};

/// Result of resolving a path up to its last component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentLeaf<'p> {
    /// Directory holding (or that would hold) the leaf.
    pub parent: InodeId,
    /// Last component, verbatim. Empty when the path has no components.
    pub leaf: &'p str,
    /// The leaf's inode, if it exists.
    pub existing: Option<InodeId>,
}

impl Vfs {
    /// Resolve `path` to an existing inode.
    pub fn resolve(&self, path: &str) -> Result<InodeId> {
        self.resolve_parent(path)?
            .existing
            .ok_or(FsError::NotFound)
    }

    /// Resolve every component but the last, which does not need to exist.
    ///
    /// Paths starting with `/` are looked up from the root, others from the
    /// current directory. Empty components are skipped, "." and ".." go
    /// through the directories' own entries.
    pub fn resolve_parent<'p>(&self, path: &'p str) -> Result<ParentLeaf<'p>> {
        let start = if path.starts_with('/') {
            InodeId::ROOT
        } else {
            self.cwd()
        };

        let mut current = start;
        for (position, component) in path
            .split('/')
            .filter(|component| !component.is_empty())
            .with_position()
        {
            match position {
                Position::First | Position::Middle => {
                    current = self.lookup(current, component)?;
                }
                Position::Last | Position::Only => {
                    let existing = match self.lookup(current, component) {
                        Ok(id) => Some(id),
                        Err(FsError::NotFound) => None,
                        Err(err) => return Err(err),
                    };
                    return Ok(ParentLeaf {
                        parent: current,
                        leaf: component,
                        existing,
                    });
                }
            }
        }

        Ok(ParentLeaf {
            parent: start,
            leaf: "",
            existing: Some(start),
        })
    }
}
