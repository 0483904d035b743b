//! Git adapter for change detection.
//!
//! Every call runs `git` as a subprocess under a timeout with bounded output,
//! so a wedged repository cannot hang a test session. Overflowing output is an
//! error rather than a silently shortened change list.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

use crate::core::types::ChangeKind;
use crate::error::ChangeError;

pub const DEFAULT_GIT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_OUTPUT_LIMIT_BYTES: usize = 4_000_000;

/// Stderr is only used in error messages.
const STDERR_LIMIT_BYTES: usize = 64 * 1024;

/// Parsed `git diff --name-status -z` entry. Renames carry the new path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffEntry {
    pub kind: ChangeKind,
    pub path: String,
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
    timeout: Duration,
    output_limit_bytes: usize,
}

/// Output of one finished git invocation.
#[derive(Debug)]
struct GitOutput {
    success: bool,
    stdout: Vec<u8>,
    stderr: String,
}

impl GitOutput {
    fn stdout_trimmed(&self) -> String {
        String::from_utf8_lossy(&self.stdout).trim().to_string()
    }
}

/// Bytes kept from one pipe, and whether more were discarded.
struct Captured {
    bytes: Vec<u8>,
    overflowed: bool,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            timeout: DEFAULT_GIT_TIMEOUT,
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
        }
    }

    pub fn with_limits(mut self, timeout: Duration, output_limit_bytes: usize) -> Self {
        self.timeout = timeout;
        self.output_limit_bytes = output_limit_bytes;
        self
    }

    /// Resolve `reference` to a full commit sha.
    ///
    /// Fails with `ReferenceNotFound` when git cannot resolve it, and with
    /// `Vcs` when git itself fails (e.g. not a repository).
    #[instrument(skip(self))]
    pub fn resolve(&self, reference: &str) -> Result<String, ChangeError> {
        let spec = format!("{reference}^{{commit}}");
        let out = self.run(&["rev-parse", "--verify", "--quiet", &spec])?;
        if out.success {
            let sha = out.stdout_trimmed();
            debug!(%sha, "resolved reference");
            return Ok(sha);
        }
        if out.stderr.is_empty() {
            warn!("reference not found");
            return Err(ChangeError::ReferenceNotFound {
                reference: reference.to_string(),
            });
        }
        Err(ChangeError::Vcs(format!(
            "git rev-parse {reference} failed: {}",
            out.stderr
        )))
    }

    /// Return the current HEAD short SHA (stable given repo state).
    pub fn head_short_sha(&self, len: usize) -> Result<String, ChangeError> {
        let arg = format!("--short={len}");
        let out = self.run_checked(&["rev-parse", &arg, "HEAD"])?;
        Ok(out.stdout_trimmed())
    }

    /// Files that differ between `base` and the working tree (staged and unstaged).
    #[instrument(skip(self))]
    pub fn diff_against_worktree(&self, base: &str) -> Result<Vec<DiffEntry>, ChangeError> {
        let out = self.run_checked(&["diff", "--name-status", "-M", "-z", base, "--"])?;
        parse_name_status_z(&out.stdout)
    }

    /// Untracked files not covered by ignore rules.
    pub fn untracked(&self) -> Result<Vec<String>, ChangeError> {
        let out = self.run_checked(&["ls-files", "--others", "--exclude-standard", "-z"])?;
        Ok(split_nul(&out.stdout).collect())
    }

    fn run_checked(&self, args: &[&str]) -> Result<GitOutput, ChangeError> {
        let out = self.run(args)?;
        if !out.success {
            return Err(ChangeError::Vcs(format!(
                "git {} failed: {}",
                args.join(" "),
                out.stderr
            )));
        }
        Ok(out)
    }

    /// Run git, draining both pipes on reader threads so a full pipe cannot
    /// stall the child before the timeout fires.
    fn run(&self, args: &[&str]) -> Result<GitOutput, ChangeError> {
        let command = args.join(" ");
        let mut child = Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| ChangeError::Vcs(format!("spawn git {command}: {err}")))?;

        let stdout = child.stdout.take().map(|pipe| {
            let limit = self.output_limit_bytes;
            thread::spawn(move || capture(pipe, limit))
        });
        let stderr = child
            .stderr
            .take()
            .map(|pipe| thread::spawn(move || capture(pipe, STDERR_LIMIT_BYTES)));

        let status = match child.wait_timeout(self.timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                warn!(
                    %command,
                    timeout_secs = self.timeout.as_secs(),
                    "git timed out, killing"
                );
                // The child may exit between the timeout and the kill.
                let _ = child.kill();
                let _ = child.wait();
                return Err(ChangeError::Timeout {
                    command,
                    timeout_secs: self.timeout.as_secs(),
                });
            }
            Err(err) => return Err(ChangeError::Vcs(format!("wait for git {command}: {err}"))),
        };

        let stdout = join_capture(stdout, &command)?;
        let stderr = join_capture(stderr, &command)?;
        if stdout.overflowed {
            return Err(ChangeError::Vcs(format!(
                "git {command} output exceeded {} bytes",
                self.output_limit_bytes
            )));
        }

        debug!(%command, exit_code = ?status.code(), "git finished");
        Ok(GitOutput {
            success: status.success(),
            stdout: stdout.bytes,
            stderr: String::from_utf8_lossy(&stderr.bytes).trim().to_string(),
        })
    }
}

fn join_capture(
    handle: Option<JoinHandle<std::io::Result<Captured>>>,
    command: &str,
) -> Result<Captured, ChangeError> {
    let Some(handle) = handle else {
        return Ok(Captured {
            bytes: Vec::new(),
            overflowed: false,
        });
    };
    match handle.join() {
        Ok(Ok(captured)) => Ok(captured),
        Ok(Err(err)) => Err(ChangeError::Vcs(format!("read git {command} output: {err}"))),
        Err(_) => Err(ChangeError::Vcs(format!("git {command} reader panicked"))),
    }
}

/// Keep up to `limit` bytes, draining the rest so the child never blocks.
fn capture<R: Read>(mut reader: R, limit: usize) -> std::io::Result<Captured> {
    let mut bytes = Vec::new();
    let mut overflowed = false;
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk)?;
        if n == 0 {
            return Ok(Captured { bytes, overflowed });
        }
        let keep = n.min(limit.saturating_sub(bytes.len()));
        bytes.extend_from_slice(&chunk[..keep]);
        overflowed |= keep < n;
    }
}

/// NUL-separated fields; undecodable bytes are replaced, never dropped, so
/// status and path fields stay paired.
fn split_nul(raw: &[u8]) -> impl Iterator<Item = String> + '_ {
    raw.split(|&b| b == 0)
        .filter(|field| !field.is_empty())
        .map(|field| String::from_utf8_lossy(field).into_owned())
}

/// Parse `git diff --name-status -z` output.
///
/// Records are `STATUS\0PATH\0`, or `STATUS\0OLD\0NEW\0` for renames and copies.
fn parse_name_status_z(raw: &[u8]) -> Result<Vec<DiffEntry>, ChangeError> {
    let mut fields = split_nul(raw);
    let mut entries = Vec::new();
    while let Some(status) = fields.next() {
        let letter = status
            .chars()
            .next()
            .ok_or_else(|| ChangeError::Vcs("empty diff status".to_string()))?;
        let kind = ChangeKind::from_status_letter(letter)
            .ok_or_else(|| ChangeError::Vcs(format!("unexpected diff status '{status}'")))?;
        let first = fields
            .next()
            .ok_or_else(|| ChangeError::Vcs(format!("missing path after status '{status}'")))?;
        let path = if matches!(letter, 'R' | 'C') {
            fields
                .next()
                .ok_or_else(|| ChangeError::Vcs(format!("missing new path for '{first}'")))?
        } else {
            first
        };
        entries.push(DiffEntry { kind, path });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestRepo;

    #[test]
    fn parses_modified_and_deleted() {
        let entries = parse_name_status_z(b"M\0pkg/a.py\0D\0pkg/old.py\0").expect("parse");
        assert_eq!(
            entries,
            vec![
                DiffEntry {
                    kind: ChangeKind::Modified,
                    path: "pkg/a.py".to_string()
                },
                DiffEntry {
                    kind: ChangeKind::Deleted,
                    path: "pkg/old.py".to_string()
                },
            ]
        );
    }

    #[test]
    fn parses_rename_uses_new_path() {
        let entries =
            parse_name_status_z(b"R087\0pkg/old.py\0pkg/new.py\0M\0x.py\0").expect("parse");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, ChangeKind::Renamed);
        assert_eq!(entries[0].path, "pkg/new.py");
        assert_eq!(entries[1].path, "x.py");
    }

    #[test]
    fn unmerged_paths_count_as_modified() {
        let entries = parse_name_status_z(b"U\0pkg/conflict.py\0").expect("parse");
        assert_eq!(entries[0].kind, ChangeKind::Modified);
        assert_eq!(entries[0].path, "pkg/conflict.py");
    }

    #[test]
    fn non_utf8_path_keeps_record_alignment() {
        let entries = parse_name_status_z(b"M\0pkg/caf\xe9.py\0M\0pkg/b.py\0").expect("parse");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].path, "pkg/caf\u{fffd}.py");
        assert_eq!(entries[1].path, "pkg/b.py");
    }

    #[test]
    fn rejects_unknown_status() {
        assert!(parse_name_status_z(b"X\0a.py\0").is_err());
    }

    #[test]
    fn empty_output_is_no_changes() {
        assert!(parse_name_status_z(b"").expect("parse").is_empty());
    }

    #[test]
    fn capture_flags_overflow_and_keeps_prefix() {
        let captured = capture(&b"0123456789"[..], 4).expect("capture");
        assert_eq!(captured.bytes, b"0123");
        assert!(captured.overflowed);

        let captured = capture(&b"0123"[..], 4).expect("capture");
        assert!(!captured.overflowed);
    }

    #[test]
    fn oversized_output_is_an_error() {
        let repo = TestRepo::new().expect("repo");
        repo.seed_python_project().expect("seed");
        let git = Git::new(repo.path()).with_limits(DEFAULT_GIT_TIMEOUT, 8);

        let err = git.resolve("HEAD").unwrap_err();
        assert!(
            matches!(&err, ChangeError::Vcs(msg) if msg.contains("exceeded 8 bytes")),
            "{err}"
        );
    }

    #[test]
    fn failing_command_reports_stderr() {
        let repo = TestRepo::new().expect("repo");
        let err = Git::new(repo.path())
            .diff_against_worktree("no-such-ref")
            .unwrap_err();
        assert!(matches!(err, ChangeError::Vcs(msg) if msg.contains("no-such-ref")));
    }

    #[cfg(unix)]
    #[test]
    fn slow_command_times_out() {
        let repo = TestRepo::new().expect("repo");
        let git = Git::new(repo.path()).with_limits(Duration::from_millis(200), 1024);

        let err = git.run(&["-c", "alias.nap=!sleep 3", "nap"]).unwrap_err();
        assert!(
            matches!(&err, ChangeError::Timeout { command, .. } if command.ends_with("nap")),
            "{err}"
        );
    }
}
