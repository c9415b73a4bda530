//! Per-process/per-namespace state tables used by the FS analyzer.
//!
//! Grounded on `original_source/lib/Table.h` (the generic key/value wrapper)
//! and `original_source/lib/InodeTable.{h,cpp}` (hard-link-aware inode
//! tracking with open-file refcounting). The C++ version uses inheritance
//! (`InodeTable : public Table<...>`); we use composition, which is the
//! idiomatic Rust shape for "has a map plus extra behavior".

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use crate::trace::{Fd, Pid};

/// A generic key/value table, mirroring `original_source/lib/Table.h`.
#[derive(Debug, Clone, Default)]
pub struct Table<K, V> {
    entries: HashMap<K, V>,
}

impl<K: std::hash::Hash + Eq + Clone, V: Clone> Table<K, V> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn add_entry(&mut self, key: K, value: V) {
        self.entries.insert(key, value);
    }

    pub fn pop_entry(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key)
    }

    pub fn remove_entry(&mut self, key: &K) {
        self.entries.remove(key);
    }

    #[must_use]
    pub fn get_value(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter()
    }
}

/// An inode number. `ROOT_INODE` is the parent of the filesystem root, not
/// the root's own inode: the root path `"/"` resolves to `ROOT_INODE + 1`,
/// matching `original_source/lib/InodeTable.cpp::ToInode`'s special case.
pub type Inode = u64;
pub const ROOT_INODE: Inode = 0;

type InodeKey = (Inode, String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenState {
    Linked,
    Unlinked,
}

/// Hard-link-aware inode table: a forward map from (parent inode, basename)
/// to inode, and a reverse map from inode to every path that names it.
/// Open files keep an unlinked inode's reverse entry alive until the last
/// handle closes, matching POSIX unlink-while-open semantics.
#[derive(Debug, Clone)]
pub struct InodeTable {
    forward: Table<InodeKey, Inode>,
    reverse: HashMap<Inode, BTreeSet<PathBuf>>,
    open: Table<InodeKey, (OpenState, u64)>,
    next_inode: Inode,
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl InodeTable {
    #[must_use]
    pub fn new() -> Self {
        let mut table = Self {
            forward: Table::new(),
            reverse: HashMap::new(),
            open: Table::new(),
            next_inode: 1,
        };
        table.add_entry_with_inode(ROOT_INODE, "/", PathBuf::from("/"), 1);
        table.next_inode = 2;
        table
    }

    fn add_entry_with_inode(&mut self, inode_p: Inode, basename: &str, path: PathBuf, inode: Inode) {
        self.reverse.entry(inode).or_default().insert(path);
        self.forward
            .add_entry((inode_p, basename.to_string()), inode);
    }

    /// Adds a new name for an inode, generating a fresh inode number.
    pub fn add_entry(&mut self, inode_p: Inode, basename: &str, path: PathBuf) -> Inode {
        let inode = self.next_inode;
        self.next_inode += 1;
        self.add_entry_with_inode(inode_p, basename, path, inode);
        inode
    }

    /// Adds another name for an *existing* inode (hard links, `rename`'s
    /// "add the new name first" step).
    pub fn add_entry_for(&mut self, inode_p: Inode, basename: &str, path: PathBuf, inode: Inode) {
        self.add_entry_with_inode(inode_p, basename, path, inode);
    }

    #[must_use]
    pub fn get_inode(&self, inode_p: Inode, basename: &str) -> Option<Inode> {
        self.forward
            .get_value(&(inode_p, basename.to_string()))
            .copied()
    }

    /// Removes the name `(inode_p, basename)`. If the inode it names is
    /// currently open, the name is kept alive (marked unlinked) until the
    /// last [`InodeTable::close_inode`] call removes it for good.
    pub fn remove_entry(&mut self, inode_p: Inode, basename: &str) {
        let Some(parent_path) = self.to_path(inode_p) else {
            return;
        };
        let absolute_path = parent_path.join(basename);
        let key: InodeKey = (inode_p, basename.to_string());

        if let Some(&(state, count)) = self.open.get_value(&key) {
            if state == OpenState::Linked {
                self.open.add_entry(key, (OpenState::Unlinked, count));
            }
            return;
        }

        let Some(inode) = self.forward.pop_entry(&key) else {
            return;
        };
        if let Some(paths) = self.reverse.get_mut(&inode) {
            paths.remove(&absolute_path);
            if paths.is_empty() {
                self.reverse.remove(&inode);
            }
        }
    }

    pub fn open_inode(&mut self, inode_p: Inode, basename: &str) {
        let key: InodeKey = (inode_p, basename.to_string());
        let count = self
            .open
            .get_value(&key)
            .map_or(0, |&(_, count)| count);
        self.open.add_entry(key, (OpenState::Linked, count + 1));
    }

    pub fn close_inode(&mut self, inode_p: Inode, basename: &str) {
        let key: InodeKey = (inode_p, basename.to_string());
        let Some(&(state, count)) = self.open.get_value(&key) else {
            return;
        };
        match (state, count) {
            (_, 0) => {}
            (OpenState::Linked, 1) => {
                self.open.remove_entry(&key);
            }
            (OpenState::Linked, n) => {
                self.open.add_entry(key, (OpenState::Linked, n - 1));
            }
            (OpenState::Unlinked, 1) => {
                self.open.remove_entry(&key);
                self.remove_entry(inode_p, basename);
            }
            (OpenState::Unlinked, n) => {
                self.open.add_entry(key, (OpenState::Unlinked, n - 1));
            }
        }
    }

    /// Resolves an absolute, lexically-canonical path to its inode,
    /// auto-vivifying forward-table entries for any component not yet seen
    /// (this table never touches the real filesystem).
    pub fn to_inode(&mut self, path: &Path) -> Inode {
        if path == Path::new("/") {
            return ROOT_INODE + 1;
        }
        let parent = path.parent().unwrap_or_else(|| Path::new("/"));
        let basename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let inode_p = self.to_inode(parent);
        if let Some(inode) = self.get_inode(inode_p, &basename) {
            inode
        } else {
            self.add_entry(inode_p, &basename, path.to_path_buf())
        }
    }

    /// The unique path naming `inode`, if exactly one exists. Directories
    /// are assumed to always have exactly one name; this is `None` both
    /// when the inode is unknown and when it has multiple (hard-linked)
    /// names, matching `original_source`'s directory-uniqueness assumption.
    #[must_use]
    pub fn to_path(&self, inode: Inode) -> Option<PathBuf> {
        let paths = self.reverse.get(&inode)?;
        if paths.len() == 1 {
            paths.iter().next().cloned()
        } else {
            None
        }
    }

    #[must_use]
    pub fn to_paths(&self, inode: Inode) -> BTreeSet<PathBuf> {
        self.reverse.get(&inode).cloned().unwrap_or_default()
    }
}

/// Per-(pid, fd) open-file state: which inode the descriptor refers to,
/// tracked via the same `(parent inode, basename)` key used for refcounting
/// in [`InodeTable::open_inode`]/[`InodeTable::close_inode`].
pub type FdTable = Table<(Pid, Fd), InodeKey>;

/// Per-pid current working directory, stored as the cwd's inode.
pub type CwdTable = Table<Pid, Inode>;

/// Per-inode symlink target, stored unresolved (the raw string passed to
/// `symlink`, not dereferenced against any other table).
pub type SymlinkTable = Table<Inode, PathBuf>;
