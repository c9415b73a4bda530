//! The textual trace grammar parser.
//!
//! One statement per line, no comments. Grounded on
//! `original_source/tools/fsracer/StreamTraceGenerator.cpp`'s
//! `ParseLine`/`ParseExpression`/`ParseOperation`/`Emit*` functions. Kept
//! out of `fsracer-core` per SPEC_FULL.md §2: the core never parses text,
//! it only consumes already-structured [`fsracer_core::TraceRecord`]s.

use std::path::{Component, Path, PathBuf};

use fsracer_core::trace::{
    AccessType, CloneMode, DirFd, Fd, FsOp, FsOpKind, Pid, SysOpMode, Task, TaskKind, TraceRecord,
};
use fsracer_core::AnalysisError;

/// Tracks whether we are currently inside a `sysop` scope: lines inside one
/// are per-process operations (`PID, KEYWORD ...`); lines outside one are
/// top-level statements (`newTask`, `dependsOn`, `consumes`, `produces`,
/// `sysop`, `execTask`, or a bare `}`). There is exactly one level of
/// nesting, matching `StreamTraceGenerator`'s single `sysop_name` field.
#[derive(Debug, Default)]
pub struct TraceParser {
    in_sysop: bool,
}

impl TraceParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses one line. Returns `Ok(None)` for a blank line (skipped, not a
    /// record); `Ok(Some(record))` otherwise. `line_no` is 1-indexed, used
    /// to bind any [`AnalysisError::Trace`] to its source line.
    pub fn parse_line(&mut self, raw: &str, line_no: usize) -> Result<Option<TraceRecord>, AnalysisError> {
        let line = raw.trim();
        if line.is_empty() {
            return Ok(None);
        }
        if line == "}" {
            self.in_sysop = false;
            return Ok(Some(TraceRecord::End));
        }

        let tokens = tokenize(line);
        if tokens.is_empty() {
            return Ok(None);
        }

        let record = if self.in_sysop {
            self.parse_operation(&tokens, line_no)?
        } else {
            self.parse_expression(&tokens, line_no)?
        };
        Ok(Some(record))
    }

    fn parse_expression(&mut self, tokens: &[String], line_no: usize) -> Result<TraceRecord, AnalysisError> {
        match tokens[0].as_str() {
            "newTask" => parse_new_task(tokens, line_no),
            "dependsOn" => parse_depends_on(tokens, line_no),
            "consumes" => parse_consumes_produces(tokens, line_no, true),
            "produces" => parse_consumes_produces(tokens, line_no, false),
            "execTask" => parse_exec_task(tokens, line_no),
            "sysop" => {
                let record = parse_sysop(tokens, line_no)?;
                self.in_sysop = true;
                Ok(record)
            }
            other => Err(AnalysisError::trace(
                format!("unknown top-level keyword '{other}'"),
                line_no,
            )),
        }
    }

    fn parse_operation(&self, tokens: &[String], line_no: usize) -> Result<TraceRecord, AnalysisError> {
        let Some((pid_tok, rest)) = tokens.split_first() else {
            return Err(AnalysisError::trace("empty operation line", line_no));
        };
        let Some(pid_str) = pid_tok.strip_suffix(',') else {
            return Err(AnalysisError::trace(
                format!("expected 'PID,' prefix, found '{pid_tok}'"),
                line_no,
            ));
        };
        let pid: Pid = parse_number(pid_str, line_no, "pid")?;
        if rest.is_empty() {
            return Err(AnalysisError::trace("missing operation keyword", line_no));
        }
        let (debug, body) = split_debug_tag(rest);
        let kind = parse_fs_op_kind(&body, line_no)?;
        Ok(TraceRecord::Op(FsOp { pid, debug, kind }))
    }
}

/// Splits off a trailing `!name` debug annotation, if present.
fn split_debug_tag(tokens: &[String]) -> (Option<String>, Vec<String>) {
    if let Some(last) = tokens.last() {
        if let Some(name) = last.strip_prefix('!') {
            let name = name.to_string();
            return (Some(name), tokens[..tokens.len() - 1].to_vec());
        }
    }
    (None, tokens.to_vec())
}

fn require_tokens(tokens: &[String], n: usize, line_no: usize, what: &str) -> Result<(), AnalysisError> {
    if tokens.len() != n {
        return Err(AnalysisError::trace(
            format!(
                "'{what}' expects {n} tokens, found {} ({:?})",
                tokens.len(),
                tokens
            ),
            line_no,
        ));
    }
    Ok(())
}

fn parse_number<T: std::str::FromStr>(s: &str, line_no: usize, what: &str) -> Result<T, AnalysisError> {
    s.parse()
        .map_err(|_| AnalysisError::trace(format!("'{what}' expects a number, found '{s}'"), line_no))
}

fn parse_dirfd(s: &str, line_no: usize) -> Result<DirFd, AnalysisError> {
    if s == "AT_FDCWD" {
        return Ok(DirFd::AtCwd);
    }
    let raw: Fd = parse_number(s, line_no, "dirfd")?;
    Ok(DirFd::from_raw(raw))
}

fn parse_access(s: &str, line_no: usize) -> Result<AccessType, AnalysisError> {
    match s {
        "consumed" => Ok(AccessType::Consumed),
        "produced" => Ok(AccessType::Produced),
        "touched" => Ok(AccessType::Touched),
        "expunged" => Ok(AccessType::Expunged),
        other => Err(AnalysisError::trace(
            format!("unknown access type '{other}'"),
            line_no,
        )),
    }
}

fn parse_clone_mode(s: &str, line_no: usize) -> Result<CloneMode, AnalysisError> {
    match s {
        "fd" => Ok(CloneMode::Fd),
        "fs" => Ok(CloneMode::Fs),
        "fdfs" => Ok(CloneMode::FdFs),
        "none" => Ok(CloneMode::None),
        other => Err(AnalysisError::trace(
            format!("unknown clone mode '{other}'"),
            line_no,
        )),
    }
}

/// Strips a surrounding pair of `"`s (if present) and lexically
/// canonicalizes `.`/`..` components, without touching the real
/// filesystem, matching spec §6's "quoted paths are canonicalized
/// lexically, not live-FS-resolved".
fn canonical_path(raw: &str) -> PathBuf {
    let stripped = raw.strip_prefix('"').and_then(|s| s.strip_suffix('"')).unwrap_or(raw);
    let path = Path::new(stripped);
    let mut out: Vec<Component> = Vec::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(out.last(), Some(Component::Normal(_))) {
                    out.pop();
                } else {
                    out.push(comp);
                }
            }
            other => out.push(other),
        }
    }
    out.into_iter().collect()
}

fn parse_new_task(tokens: &[String], line_no: usize) -> Result<TraceRecord, AnalysisError> {
    if tokens.len() == 3 && tokens[2] == "EXTERNAL" {
        return Ok(TraceRecord::NewTask {
            name: tokens[1].clone(),
            task: Task::external(),
        });
    }
    if tokens.len() == 4 {
        let kind = match tokens[2].as_str() {
            "S" => TaskKind::S,
            "M" => TaskKind::M,
            "W" => TaskKind::W,
            other => {
                return Err(AnalysisError::trace(
                    format!("unknown task kind '{other}'"),
                    line_no,
                ))
            }
        };
        let value: i64 = parse_number(&tokens[3], line_no, "newTask value")?;
        return Ok(TraceRecord::NewTask {
            name: tokens[1].clone(),
            task: Task {
                kind,
                value: Some(value),
            },
        });
    }
    Err(AnalysisError::trace(
        "'newTask' expects 'NAME KIND VALUE' or 'NAME EXTERNAL'".to_string(),
        line_no,
    ))
}

/// `dependsOn TARGET SOURCE`: the grammar's first argument is the
/// *dependent* task, the second is what it depends on. The edge added is
/// `source -> target` (see SPEC_FULL.md §7).
fn parse_depends_on(tokens: &[String], line_no: usize) -> Result<TraceRecord, AnalysisError> {
    require_tokens(tokens, 3, line_no, "dependsOn")?;
    Ok(TraceRecord::DependsOn {
        source: tokens[2].clone(),
        target: tokens[1].clone(),
    })
}

fn parse_consumes_produces(
    tokens: &[String],
    line_no: usize,
    is_consumes: bool,
) -> Result<TraceRecord, AnalysisError> {
    let what = if is_consumes { "consumes" } else { "produces" };
    require_tokens(tokens, 3, line_no, what)?;
    let object = canonical_path(&tokens[2]).to_string_lossy().to_string();
    if is_consumes {
        Ok(TraceRecord::Consumes {
            task: tokens[1].clone(),
            object,
        })
    } else {
        Ok(TraceRecord::Produces {
            task: tokens[1].clone(),
            object,
        })
    }
}

fn parse_exec_task(tokens: &[String], line_no: usize) -> Result<TraceRecord, AnalysisError> {
    require_tokens(tokens, 3, line_no, "execTask")?;
    if tokens[2] != "{" {
        return Err(AnalysisError::trace(
            "'execTask' expects a trailing '{'".to_string(),
            line_no,
        ));
    }
    Ok(TraceRecord::ExecTaskBeg {
        name: tokens[1].clone(),
    })
}

fn parse_sysop(tokens: &[String], line_no: usize) -> Result<TraceRecord, AnalysisError> {
    match tokens.len() {
        3 if tokens[2] == "SYNC" => Ok(TraceRecord::SysOpBeg {
            op_id: tokens[1].clone(),
            mode: SysOpMode::Sync,
        }),
        4 if tokens[3] == "ASYNC" => Ok(TraceRecord::SysOpBeg {
            op_id: tokens[1].clone(),
            mode: SysOpMode::Async(tokens[2].clone()),
        }),
        _ => Err(AnalysisError::trace(
            "'sysop' expects 'OPID SYNC' or 'OPID NAME ASYNC'".to_string(),
            line_no,
        )),
    }
}

fn parse_fs_op_kind(tokens: &[String], line_no: usize) -> Result<FsOpKind, AnalysisError> {
    let keyword = tokens[0].as_str();
    match keyword {
        "newfd" => {
            require_tokens(tokens, 4, line_no, "newfd")?;
            Ok(FsOpKind::NewFd {
                dirfd: parse_dirfd(&tokens[1], line_no)?,
                path: canonical_path(&tokens[2]),
                fd: parse_number(&tokens[3], line_no, "fd")?,
            })
        }
        "delfd" => {
            require_tokens(tokens, 2, line_no, "delfd")?;
            Ok(FsOpKind::DelFd {
                fd: parse_number(&tokens[1], line_no, "fd")?,
            })
        }
        "dupfd" => {
            require_tokens(tokens, 3, line_no, "dupfd")?;
            Ok(FsOpKind::DupFd {
                old_fd: parse_number(&tokens[1], line_no, "old_fd")?,
                new_fd: parse_number(&tokens[2], line_no, "new_fd")?,
            })
        }
        "hpath" | "hpathsym" => {
            require_tokens(tokens, 4, line_no, keyword)?;
            let dirfd = parse_dirfd(&tokens[1], line_no)?;
            let path = canonical_path(&tokens[2]);
            let access = parse_access(&tokens[3], line_no)?;
            if keyword == "hpath" {
                Ok(FsOpKind::Hpath { dirfd, path, access })
            } else {
                Ok(FsOpKind::HpathSym { dirfd, path, access })
            }
        }
        "link" | "rename" => {
            require_tokens(tokens, 5, line_no, keyword)?;
            let old_dirfd = parse_dirfd(&tokens[1], line_no)?;
            let old_path = canonical_path(&tokens[2]);
            let new_dirfd = parse_dirfd(&tokens[3], line_no)?;
            let new_path = canonical_path(&tokens[4]);
            if keyword == "link" {
                Ok(FsOpKind::Link {
                    old_dirfd,
                    old_path,
                    new_dirfd,
                    new_path,
                })
            } else {
                Ok(FsOpKind::Rename {
                    old_dirfd,
                    old_path,
                    new_dirfd,
                    new_path,
                })
            }
        }
        "newproc" => {
            require_tokens(tokens, 3, line_no, "newproc")?;
            Ok(FsOpKind::NewProc {
                clone_mode: parse_clone_mode(&tokens[1], line_no)?,
                new_pid: parse_number(&tokens[2], line_no, "new_pid")?,
            })
        }
        "setcwd" => {
            require_tokens(tokens, 2, line_no, "setcwd")?;
            Ok(FsOpKind::SetCwd {
                path: canonical_path(&tokens[1]),
            })
        }
        "setcwdfd" => {
            require_tokens(tokens, 2, line_no, "setcwdfd")?;
            Ok(FsOpKind::SetCwdFd {
                fd: parse_number(&tokens[1], line_no, "fd")?,
            })
        }
        "symlink" => {
            require_tokens(tokens, 4, line_no, "symlink")?;
            Ok(FsOpKind::Symlink {
                dirfd: parse_dirfd(&tokens[1], line_no)?,
                name: canonical_path(&tokens[2]),
                target: canonical_path(&tokens[3]),
            })
        }
        other => Err(AnalysisError::trace(
            format!("unknown operation '{other}'"),
            line_no,
        )),
    }
}

/// Splits a line into tokens, treating a `"..."` span as one token (so a
/// quoted path containing spaces is not split) and stripping its quotes.
fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for ch in line.chars() {
        match ch {
            '"' => in_quotes = !in_quotes,
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_new_task_with_kind_and_value() {
        let mut p = TraceParser::new();
        let record = p.parse_line("newTask build W 3", 1).unwrap().unwrap();
        assert_eq!(
            record,
            TraceRecord::NewTask {
                name: "build".to_string(),
                task: Task {
                    kind: TaskKind::W,
                    value: Some(3)
                }
            }
        );
    }

    #[test]
    fn parses_external_task() {
        let mut p = TraceParser::new();
        let record = p.parse_line("newTask ext EXTERNAL", 1).unwrap().unwrap();
        assert_eq!(
            record,
            TraceRecord::NewTask {
                name: "ext".to_string(),
                task: Task::external(),
            }
        );
    }

    #[test]
    fn depends_on_binds_target_then_source() {
        let mut p = TraceParser::new();
        let record = p.parse_line("dependsOn b a", 1).unwrap().unwrap();
        assert_eq!(
            record,
            TraceRecord::DependsOn {
                source: "a".to_string(),
                target: "b".to_string(),
            }
        );
    }

    #[test]
    fn sysop_then_operation_then_close() {
        let mut p = TraceParser::new();
        p.parse_line("sysop 1 SYNC", 1).unwrap();
        let op = p
            .parse_line(r#"1, hpath AT_FDCWD "/tmp/x" produced"#, 2)
            .unwrap()
            .unwrap();
        assert_eq!(
            op,
            TraceRecord::Op(FsOp {
                pid: 1,
                debug: None,
                kind: FsOpKind::Hpath {
                    dirfd: DirFd::AtCwd,
                    path: PathBuf::from("/tmp/x"),
                    access: AccessType::Produced,
                }
            })
        );
        let end = p.parse_line("}", 3).unwrap().unwrap();
        assert_eq!(end, TraceRecord::End);
    }

    #[test]
    fn async_sysop_parses_owner_name() {
        let mut p = TraceParser::new();
        let record = p.parse_line("sysop 7 worker ASYNC", 1).unwrap().unwrap();
        assert_eq!(
            record,
            TraceRecord::SysOpBeg {
                op_id: "7".to_string(),
                mode: SysOpMode::Async("worker".to_string()),
            }
        );
    }

    #[test]
    fn debug_annotation_is_captured() {
        let mut p = TraceParser::new();
        p.parse_line("sysop 1 SYNC", 1).unwrap();
        let op = p
            .parse_line(r#"1, hpath AT_FDCWD "/tmp/x" produced !tag1"#, 2)
            .unwrap()
            .unwrap();
        let TraceRecord::Op(FsOp { debug, .. }) = op else {
            panic!("expected Op")
        };
        assert_eq!(debug.as_deref(), Some("tag1"));
    }

    #[test]
    fn dotdot_is_folded_lexically() {
        let mut p = TraceParser::new();
        let record = p
            .parse_line(r#"produces t "/tmp/a/../b""#, 1)
            .unwrap()
            .unwrap();
        assert_eq!(
            record,
            TraceRecord::Produces {
                task: "t".to_string(),
                object: "/tmp/b".to_string(),
            }
        );
    }

    #[test]
    fn unknown_keyword_is_a_trace_error_bound_to_line() {
        let mut p = TraceParser::new();
        let err = p.parse_line("bogus statement here", 5).unwrap_err();
        match err {
            AnalysisError::Trace { line, .. } => assert_eq!(line, 5),
            AnalysisError::Analyzer { .. } => panic!("expected a Trace error"),
        }
    }
}
