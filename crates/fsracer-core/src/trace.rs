//! The trace record model.
//!
//! `original_source/lib/FStrace.h` represents each record as a distinct
//! `Operation` subclass reached through virtual dispatch (`GetOpName`,
//! `ToString`, `Consumes`). We replace that hierarchy with a single tagged
//! sum type and `match` dispatch, per the redesign notes in spec §9: no
//! virtual calls, no `dynamic_cast`, exhaustive `match` arms checked by the
//! compiler whenever a variant is added.

use std::path::PathBuf;

/// Process id, as embedded by the `PID,` prefix on a per-process operation.
pub type Pid = u64;

/// A raw file descriptor. Negative values are the failed-syscall sentinel
/// used by `original_source/tools/fsracer/StreamTraceGenerator.cpp`'s
/// `EmitNewFd` (the record still parses; the FS analyzer skips it).
pub type Fd = i64;

/// The `AT_FDCWD` sentinel used by `dirfd` arguments in the grammar.
pub const AT_FDCWD: i64 = 0;

/// A `dirfd` argument: either the `AT_FDCWD` sentinel or a concrete fd.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirFd {
    AtCwd,
    Fd(Fd),
}

impl DirFd {
    #[must_use]
    pub fn from_raw(raw: Fd) -> Self {
        if raw == AT_FDCWD {
            Self::AtCwd
        } else {
            Self::Fd(raw)
        }
    }
}

/// The kind of a declared task, per spec §2's `newTask` grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Strong/synchronous task.
    S,
    /// Main task.
    M,
    /// Weak/worker task.
    W,
    /// External task not owned by the runtime's scheduler.
    Ext,
}

/// A declared task: its kind and, for `S`/`M`/`W`, the numeric priority or
/// identifying value carried by the fourth grammar token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Task {
    pub kind: TaskKind,
    pub value: Option<i64>,
}

impl Task {
    #[must_use]
    pub fn external() -> Self {
        Self {
            kind: TaskKind::Ext,
            value: None,
        }
    }
}

/// How a path was affected by an operation, per spec §4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessType {
    Consumed,
    Produced,
    Touched,
    Expunged,
}

/// Whether a `sysop` scope runs synchronously on the enclosing task or is
/// handed off to another named task.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SysOpMode {
    Sync,
    /// Carries the task that subsequent operations inside the scope are
    /// attributed to.
    Async(String),
}

/// `newProc`'s clone mode: which pieces of process state the child inherits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloneMode {
    Fd,
    Fs,
    FdFs,
    None,
}

impl CloneMode {
    #[must_use]
    pub fn shares_fd(self) -> bool {
        matches!(self, Self::Fd | Self::FdFs)
    }

    #[must_use]
    pub fn shares_fs(self) -> bool {
        matches!(self, Self::Fs | Self::FdFs)
    }
}

/// An optional `!name` debug annotation trailing a per-process operation.
pub type DebugInfo = Option<String>;

/// The per-process syscall-effect operations, nested inside [`TraceRecord::Op`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsOpKind {
    NewFd {
        dirfd: DirFd,
        path: PathBuf,
        fd: Fd,
    },
    DelFd {
        fd: Fd,
    },
    DupFd {
        old_fd: Fd,
        new_fd: Fd,
    },
    Hpath {
        dirfd: DirFd,
        path: PathBuf,
        access: AccessType,
    },
    HpathSym {
        dirfd: DirFd,
        path: PathBuf,
        access: AccessType,
    },
    Link {
        old_dirfd: DirFd,
        old_path: PathBuf,
        new_dirfd: DirFd,
        new_path: PathBuf,
    },
    Rename {
        old_dirfd: DirFd,
        old_path: PathBuf,
        new_dirfd: DirFd,
        new_path: PathBuf,
    },
    Symlink {
        dirfd: DirFd,
        name: PathBuf,
        target: PathBuf,
    },
    NewProc {
        clone_mode: CloneMode,
        new_pid: Pid,
    },
    SetCwd {
        path: PathBuf,
    },
    SetCwdFd {
        fd: Fd,
    },
}

/// A single per-process operation: a [`FsOpKind`] tagged with the process
/// that issued it and its optional debug annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsOp {
    pub pid: Pid,
    pub debug: DebugInfo,
    pub kind: FsOpKind,
}

/// One parsed line of a trace, corresponding to a single statement in the
/// spec §6 grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceRecord {
    NewTask { name: String, task: Task },
    /// `dependsOn TARGET SOURCE` — the dependency edge added is
    /// `source -> target` (see SPEC_FULL.md §7 on argument order).
    DependsOn { source: String, target: String },
    Consumes { task: String, object: String },
    Produces { task: String, object: String },
    SysOpBeg { op_id: String, mode: SysOpMode },
    ExecTaskBeg { name: String },
    End,
    Op(FsOp),
}
