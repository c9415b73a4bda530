//! The file-system effects analyzer.
//!
//! Replays per-process syscall-shaped operations against per-process
//! cwd/fd/symlink state and an inode table, producing a per-(path, task)
//! access classification. Grounded on
//! `original_source/lib/FSAnalyzer.{h,cpp}`.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use tracing::trace;

use super::Analyzer;
use crate::error::Result;
use crate::tables::{CwdTable, FdTable, Inode, InodeTable, SymlinkTable};
use crate::trace::{
    AccessType, DirFd, Fd, FsOp, FsOpKind, Pid, SysOpMode, TraceRecord,
};

/// Whether a path has been observed as a directory, via the `mkdir`-op-name
/// heuristic in `ProcessPathEffect` (`original_source/lib/FSAnalyzer.cpp`):
/// there is no separate `stat`-like record in the trace, so directory-ness
/// is inferred from which op produced the path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    RegularFile,
    Directory,
}

/// One recorded effect of a task on a path: its merged [`AccessType`] and
/// the debug tag of the operation that last touched it (for race-report
/// diagnostics; `!main` is substituted at render time when absent).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskAccess {
    pub access: AccessType,
    pub debug: Option<String>,
}

/// Standard fds never participate in `dup`'s table-copy bookkeeping.
fn is_std_fd(fd: Fd) -> bool {
    (0..=2).contains(&fd)
}

fn looks_like_mkdir(op_name: &str) -> bool {
    op_name.starts_with("mkdir")
}

/// Merges a new access into a path's existing classification for a task,
/// per the table in spec §4.3. Returns `None` to mean "delete the entry"
/// (the `EXPUNGED`-after-`PRODUCED` case): a file produced and then
/// removed within the same task leaves no trace of ever having existed.
fn merge_access(prev: Option<AccessType>, access: AccessType) -> Option<AccessType> {
    use AccessType::{Consumed, Expunged, Produced, Touched};
    match access {
        Produced => Some(Produced),
        Consumed => match prev {
            None | Some(Consumed) | Some(Touched) => Some(Consumed),
            Some(other) => Some(other),
        },
        Touched => match prev {
            None | Some(Touched) => Some(Touched),
            Some(other) => Some(other),
        },
        Expunged => match prev {
            None => Some(Expunged),
            Some(Produced) => None,
            Some(_) => Some(Expunged),
        },
    }
}

/// Replays FS-effecting trace records into per-(path, task) accesses.
#[derive(Debug, Default)]
pub struct FsAnalyzer {
    cwd_table: CwdTable,
    fd_table: FdTable,
    symlink_table: SymlinkTable,
    inode_table: InodeTable,
    dirs: HashSet<PathBuf>,
    task_accesses: HashMap<(PathBuf, String), TaskAccess>,
    current_task: Option<String>,
    sysop_owner: Option<String>,
    in_sysop: bool,
    current_op_name: Option<String>,
}

impl FsAnalyzer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn task_accesses(&self) -> &HashMap<(PathBuf, String), TaskAccess> {
        &self.task_accesses
    }

    #[must_use]
    pub fn file_type(&self, path: &Path) -> FileType {
        if self.dirs.contains(path) {
            FileType::Directory
        } else {
            FileType::RegularFile
        }
    }

    fn effective_task(&self) -> String {
        self.sysop_owner
            .clone()
            .or_else(|| self.current_task.clone())
            .unwrap_or_else(|| "main".to_string())
    }

    fn parent_dir(&self, dirfd: DirFd, pid: Pid) -> Option<PathBuf> {
        match dirfd {
            DirFd::AtCwd => {
                let inode = *self.cwd_table.get_value(&pid)?;
                self.inode_table.to_path(inode)
            }
            DirFd::Fd(fd) => {
                let (inode_p, basename) = self.fd_table.get_value(&(pid, fd))?;
                let inode = self.inode_table.get_inode(*inode_p, basename)?;
                self.inode_table.to_path(inode)
            }
        }
    }

    fn absolute_path(&self, dirfd: DirFd, path: &Path, pid: Pid) -> Option<PathBuf> {
        if path.is_absolute() {
            return Some(path.to_path_buf());
        }
        Some(self.parent_dir(dirfd, pid)?.join(path))
    }

    fn add_path_effect(&mut self, path: &Path, access: AccessType, debug: Option<&str>) {
        let task = self.effective_task();
        let key = (path.to_path_buf(), task);
        let prev = self.task_accesses.get(&key).map(|a| a.access);
        match merge_access(prev, access) {
            Some(merged) => {
                self.task_accesses.insert(
                    key,
                    TaskAccess {
                        access: merged,
                        debug: debug.map(ToString::to_string),
                    },
                );
            }
            None => {
                self.task_accesses.remove(&key);
            }
        }
    }

    fn process_path_effect(&mut self, path: &Path, access: AccessType, op_name: &str, debug: Option<&str>) {
        match access {
            AccessType::Produced => {
                if looks_like_mkdir(op_name) {
                    self.dirs.insert(path.to_path_buf());
                }
                if let Some(parent) = path.parent() {
                    self.dirs.insert(parent.to_path_buf());
                }
                self.add_path_effect(path, access, debug);
            }
            AccessType::Consumed | AccessType::Touched => {
                if let Some(parent) = path.parent() {
                    self.dirs.insert(parent.to_path_buf());
                }
                self.add_path_effect(path, access, debug);
            }
            AccessType::Expunged => {
                self.dirs.remove(path);
                self.add_path_effect(path, access, debug);
                if let (Some(parent), Some(basename)) = (path.parent(), path.file_name()) {
                    let inode_p = self.inode_table.to_inode(parent);
                    self.inode_table
                        .remove_entry(inode_p, &basename.to_string_lossy());
                }
            }
        }
    }

    /// Dereferences `path` through the symlink table once, matching
    /// `hpath`'s (but not `hpathsym`'s) `AnalyzeHpath` behavior.
    fn dereference(&mut self, path: &Path) -> PathBuf {
        let inode = self.inode_table.to_inode(path);
        if let Some(target) = self.symlink_table.get_value(&inode).cloned() {
            if target.is_absolute() {
                target
            } else {
                path.parent()
                    .map_or_else(|| target.clone(), |p| p.join(&target))
            }
        } else {
            path.to_path_buf()
        }
    }

    fn handle_op(&mut self, op: &FsOp) {
        let pid = op.pid;
        let debug = op.debug.as_deref();
        let op_name = self.current_op_name.clone().unwrap_or_default();
        match &op.kind {
            FsOpKind::NewFd { dirfd, path, fd } => {
                if *fd < 0 {
                    trace!(pid, fd, "newfd failed, skipping");
                    return;
                }
                let Some(abs) = self.absolute_path(*dirfd, path, pid) else {
                    return;
                };
                let Some(parent) = abs.parent().map(Path::to_path_buf) else {
                    return;
                };
                let Some(basename) = abs.file_name().map(|n| n.to_string_lossy().to_string())
                else {
                    return;
                };
                let inode_p = self.inode_table.to_inode(&parent);
                self.inode_table.to_inode(&abs);
                self.fd_table
                    .add_entry((pid, *fd), (inode_p, basename.clone()));
                self.inode_table.open_inode(inode_p, &basename);
            }
            FsOpKind::DelFd { fd } => {
                if let Some((inode_p, basename)) = self.fd_table.pop_entry(&(pid, *fd)) {
                    self.inode_table.close_inode(inode_p, &basename);
                }
            }
            FsOpKind::DupFd { old_fd, new_fd } => {
                if is_std_fd(*old_fd) || old_fd == new_fd {
                    return;
                }
                if let Some(entry) = self.fd_table.get_value(&(pid, *old_fd)).cloned() {
                    self.fd_table.add_entry((pid, *new_fd), entry);
                }
            }
            FsOpKind::Hpath { dirfd, path, access } => {
                let Some(abs) = self.absolute_path(*dirfd, path, pid) else {
                    return;
                };
                let resolved = self.dereference(&abs);
                self.process_path_effect(&resolved, *access, &op_name, debug);
            }
            FsOpKind::HpathSym { dirfd, path, access } => {
                let Some(abs) = self.absolute_path(*dirfd, path, pid) else {
                    return;
                };
                self.process_path_effect(&abs, *access, &op_name, debug);
            }
            FsOpKind::Link {
                old_dirfd,
                old_path,
                new_dirfd,
                new_path,
            } => {
                let (Some(old_abs), Some(new_abs)) = (
                    self.absolute_path(*old_dirfd, old_path, pid),
                    self.absolute_path(*new_dirfd, new_path, pid),
                ) else {
                    return;
                };
                let inode = self.inode_table.to_inode(&old_abs);
                let Some(new_parent) = new_abs.parent().map(Path::to_path_buf) else {
                    return;
                };
                let Some(new_basename) = new_abs.file_name().map(|n| n.to_string_lossy().to_string())
                else {
                    return;
                };
                let inode_p = self.inode_table.to_inode(&new_parent);
                self.inode_table
                    .add_entry_for(inode_p, &new_basename, new_abs, inode);
            }
            FsOpKind::Rename {
                old_dirfd,
                old_path,
                new_dirfd,
                new_path,
            } => {
                let (Some(old_abs), Some(new_abs)) = (
                    self.absolute_path(*old_dirfd, old_path, pid),
                    self.absolute_path(*new_dirfd, new_path, pid),
                ) else {
                    return;
                };
                let inode = self.inode_table.to_inode(&old_abs);
                let Some(new_parent) = new_abs.parent().map(Path::to_path_buf) else {
                    return;
                };
                let Some(new_basename) = new_abs.file_name().map(|n| n.to_string_lossy().to_string())
                else {
                    return;
                };
                let inode_p = self.inode_table.to_inode(&new_parent);
                if self.inode_table.get_inode(inode_p, &new_basename) == Some(inode) {
                    // Renaming a path onto itself: no-op.
                    return;
                }
                self.inode_table
                    .add_entry_for(inode_p, &new_basename, new_abs, inode);
                if let (Some(old_parent), Some(old_basename)) =
                    (old_abs.parent(), old_abs.file_name())
                {
                    let old_inode_p = self.inode_table.to_inode(old_parent);
                    self.inode_table
                        .remove_entry(old_inode_p, &old_basename.to_string_lossy());
                }
            }
            FsOpKind::Symlink { dirfd, name, target } => {
                let Some(abs) = self.absolute_path(*dirfd, name, pid) else {
                    return;
                };
                let inode = self.inode_table.to_inode(&abs);
                self.symlink_table.add_entry(inode, target.clone());
            }
            FsOpKind::NewProc { clone_mode, new_pid } => {
                if clone_mode.shares_fd() {
                    let inherited: Vec<(Fd, (Inode, String))> = self
                        .fd_table
                        .iter()
                        .filter(|((p, _), _)| *p == pid)
                        .map(|((_, fd), entry)| (*fd, entry.clone()))
                        .collect();
                    for (fd, entry) in inherited {
                        self.fd_table.add_entry((*new_pid, fd), entry);
                    }
                }
                if clone_mode.shares_fs() {
                    if let Some(&inode) = self.cwd_table.get_value(&pid) {
                        self.cwd_table.add_entry(*new_pid, inode);
                    }
                }
            }
            FsOpKind::SetCwd { path } => {
                let Some(abs) = self.absolute_path(DirFd::AtCwd, path, pid) else {
                    return;
                };
                let inode = self.inode_table.to_inode(&abs);
                self.cwd_table.add_entry(pid, inode);
            }
            FsOpKind::SetCwdFd { fd } => {
                if let Some((inode_p, basename)) = self.fd_table.get_value(&(pid, *fd)).cloned() {
                    if let Some(inode) = self.inode_table.get_inode(inode_p, &basename) {
                        self.cwd_table.add_entry(pid, inode);
                    }
                }
            }
        }
    }
}

impl Analyzer for FsAnalyzer {
    fn name(&self) -> &'static str {
        "fs"
    }

    fn observe(&mut self, record: &TraceRecord) -> Result<()> {
        match record {
            TraceRecord::ExecTaskBeg { name } => {
                self.current_task = Some(name.clone());
            }
            TraceRecord::SysOpBeg { op_id, mode } => {
                self.in_sysop = true;
                self.current_op_name = Some(op_id.clone());
                if let SysOpMode::Async(owner) = mode {
                    self.sysop_owner = Some(owner.clone());
                }
            }
            TraceRecord::End => {
                if self.in_sysop {
                    self.in_sysop = false;
                    self.current_op_name = None;
                    self.sysop_owner = None;
                } else {
                    self.current_task = None;
                }
            }
            TraceRecord::Op(op) => self.handle_op(op),
            TraceRecord::NewTask { .. }
            | TraceRecord::DependsOn { .. }
            | TraceRecord::Consumes { .. }
            | TraceRecord::Produces { .. } => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{CloneMode, DebugInfo};

    fn op(pid: Pid, kind: FsOpKind) -> TraceRecord {
        TraceRecord::Op(FsOp {
            pid,
            debug: None as DebugInfo,
            kind,
        })
    }

    #[test]
    fn produced_then_consumed_keeps_consumed() {
        let mut a = FsAnalyzer::new();
        a.observe(&TraceRecord::ExecTaskBeg {
            name: "t1".to_string(),
        })
        .unwrap();
        a.observe(&op(
            1,
            FsOpKind::Hpath {
                dirfd: DirFd::AtCwd,
                path: PathBuf::from("/tmp/x"),
                access: AccessType::Produced,
            },
        ))
        .unwrap();
        a.observe(&op(
            1,
            FsOpKind::Hpath {
                dirfd: DirFd::AtCwd,
                path: PathBuf::from("/tmp/x"),
                access: AccessType::Consumed,
            },
        ))
        .unwrap();
        let entry = a
            .task_accesses()
            .get(&(PathBuf::from("/tmp/x"), "t1".to_string()))
            .unwrap();
        assert_eq!(entry.access, AccessType::Produced);
    }

    #[test]
    fn produced_then_expunged_deletes_entry() {
        let mut a = FsAnalyzer::new();
        a.observe(&TraceRecord::ExecTaskBeg {
            name: "t1".to_string(),
        })
        .unwrap();
        a.observe(&op(
            1,
            FsOpKind::Hpath {
                dirfd: DirFd::AtCwd,
                path: PathBuf::from("/tmp/x"),
                access: AccessType::Produced,
            },
        ))
        .unwrap();
        a.observe(&op(
            1,
            FsOpKind::Hpath {
                dirfd: DirFd::AtCwd,
                path: PathBuf::from("/tmp/x"),
                access: AccessType::Expunged,
            },
        ))
        .unwrap();
        assert!(a
            .task_accesses()
            .get(&(PathBuf::from("/tmp/x"), "t1".to_string()))
            .is_none());
    }

    #[test]
    fn async_sysop_attributes_ops_to_owner() {
        let mut a = FsAnalyzer::new();
        a.observe(&TraceRecord::ExecTaskBeg {
            name: "main".to_string(),
        })
        .unwrap();
        a.observe(&TraceRecord::SysOpBeg {
            op_id: "1".to_string(),
            mode: SysOpMode::Async("worker".to_string()),
        })
        .unwrap();
        a.observe(&op(
            1,
            FsOpKind::Hpath {
                dirfd: DirFd::AtCwd,
                path: PathBuf::from("/tmp/y"),
                access: AccessType::Produced,
            },
        ))
        .unwrap();
        a.observe(&TraceRecord::End).unwrap();
        assert!(a
            .task_accesses()
            .contains_key(&(PathBuf::from("/tmp/y"), "worker".to_string())));
    }

    #[test]
    fn newfd_failure_is_skipped() {
        let mut a = FsAnalyzer::new();
        a.observe(&op(
            1,
            FsOpKind::NewFd {
                dirfd: DirFd::AtCwd,
                path: PathBuf::from("/tmp/x"),
                fd: -1,
            },
        ))
        .unwrap();
        assert!(a.fd_table.get_value(&(1, -1)).is_none());
    }

    #[test]
    fn newproc_with_fd_mode_copies_fd_table_rows() {
        let mut a = FsAnalyzer::new();
        a.observe(&op(
            1,
            FsOpKind::NewFd {
                dirfd: DirFd::AtCwd,
                path: PathBuf::from("/tmp/x"),
                fd: 3,
            },
        ))
        .unwrap();
        a.observe(&op(
            1,
            FsOpKind::NewProc {
                clone_mode: CloneMode::Fd,
                new_pid: 2,
            },
        ))
        .unwrap();
        assert!(a.fd_table.get_value(&(2, 3)).is_some());
    }

    #[test]
    fn newproc_without_fs_mode_does_not_copy_cwd() {
        let mut a = FsAnalyzer::new();
        a.observe(&op(
            1,
            FsOpKind::SetCwd {
                path: PathBuf::from("/a"),
            },
        ))
        .unwrap();
        a.observe(&op(
            1,
            FsOpKind::NewProc {
                clone_mode: CloneMode::Fd,
                new_pid: 2,
            },
        ))
        .unwrap();
        assert!(a.cwd_table.get_value(&2).is_none());
    }
}
