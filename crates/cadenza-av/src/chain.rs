//! Process chain runner: step1 | step2 | step3 with owned cleanup.
//!
//! A [`ProcessChain`] spawns one external process per step, wiring each
//! step's stdout to the next step's stdin. The final process is either
//! exposed as a byte stream ([`ChainStream`], progressive delivery) or left
//! writing files on its own ([`ChainHandle`], segmented delivery).
//!
//! Ownership is strict: every spawned process and every scratch file belongs
//! to the returned handle/stream and is released when it is dropped, on
//! normal completion, read error, and caller abandonment alike. If any step
//! fails to spawn, the already-spawned prefix is killed before the error is
//! returned; no process is ever left behind.

use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use tokio_util::io::ReaderStream;

use cadenza_core::{Error, Result};

/// An ordered list of argv steps to run as a pipeline.
///
/// Each step's `argv[0]` must already be a resolved executable path (see
/// [`crate::template::build_command`]).
#[derive(Debug, Clone)]
pub struct ProcessChain {
    steps: Vec<Vec<String>>,
    input: Option<PathBuf>,
    scratch: Vec<PathBuf>,
}

impl ProcessChain {
    pub fn new(steps: Vec<Vec<String>>) -> Self {
        Self {
            steps,
            input: None,
            scratch: Vec::new(),
        }
    }

    /// File streamed into the first step's stdin. Without this the first
    /// step reads from a closed stdin (templates normally name the input
    /// file via `%s` instead).
    pub fn with_input(mut self, path: impl Into<PathBuf>) -> Self {
        self.input = Some(path.into());
        self
    }

    /// Register a scratch file to be deleted when the chain is released.
    pub fn with_scratch(mut self, path: impl Into<PathBuf>) -> Self {
        self.scratch.push(path.into());
        self
    }

    /// Spawn the chain and return the last process's stdout as a stream.
    pub fn spawn(self) -> Result<ChainStream> {
        let (prefix, last, scratch) = self.spawn_inner(true)?;
        let mut guard = ChainGuard {
            prefix,
            last,
            scratch,
        };
        let stdout = guard.last.stdout.take().ok_or_else(|| {
            Error::Internal("chain stdout was not captured".into())
        })?;
        Ok(ChainStream {
            inner: ReaderStream::new(stdout),
            _guard: guard,
        })
    }

    /// Spawn the chain without capturing stdout; the final process writes
    /// its own output files (segmented delivery).
    pub fn spawn_detached(self) -> Result<ChainHandle> {
        let (prefix, last, scratch) = self.spawn_inner(false)?;
        Ok(ChainHandle {
            guard: ChainGuard {
                prefix,
                last,
                scratch,
            },
        })
    }

    fn spawn_inner(
        self,
        capture_stdout: bool,
    ) -> Result<(Vec<std::process::Child>, tokio::process::Child, Vec<PathBuf>)> {
        let ProcessChain {
            steps,
            input,
            scratch,
        } = self;

        if steps.is_empty() || steps.iter().any(|s| s.is_empty()) {
            remove_scratch(&scratch);
            return Err(Error::Internal("empty process chain".into()));
        }

        let mut prefix: Vec<std::process::Child> = Vec::new();
        let last_index = steps.len() - 1;

        // Fail fast, killing everything spawned so far.
        let abort = |prefix: &mut Vec<std::process::Child>, scratch: &[PathBuf], err: Error| {
            for child in prefix.iter_mut() {
                let _ = child.kill();
                let _ = child.wait();
            }
            remove_scratch(scratch);
            err
        };

        let mut upstream: Option<Stdio> = match &input {
            Some(path) => Some(Stdio::from(std::fs::File::open(path).map_err(|e| {
                let err = Error::chain("input", format!("{}: {e}", path.display()));
                abort(&mut Vec::new(), &scratch, err)
            })?)),
            None => None,
        };

        for (i, argv) in steps.iter().enumerate().take(last_index) {
            let mut cmd = std::process::Command::new(&argv[0]);
            cmd.args(&argv[1..])
                .stdin(upstream.take().unwrap_or_else(Stdio::null))
                .stdout(Stdio::piped())
                .stderr(Stdio::null());

            let mut child = match cmd.spawn() {
                Ok(c) => c,
                Err(e) => {
                    let err = Error::tool(&argv[0], format!("step {i}: {e}"));
                    return Err(abort(&mut prefix, &scratch, err));
                }
            };

            upstream = child.stdout.take().map(Stdio::from);
            prefix.push(child);
        }

        let argv = &steps[last_index];
        let mut cmd = tokio::process::Command::new(&argv[0]);
        cmd.args(&argv[1..])
            .stdin(upstream.take().unwrap_or_else(Stdio::null))
            .stdout(if capture_stdout {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let last = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => {
                let err = Error::tool(&argv[0], format!("step {last_index}: {e}"));
                return Err(abort(&mut prefix, &scratch, err));
            }
        };

        tracing::debug!(
            steps = steps.len(),
            exe = %argv[0],
            "Spawned process chain"
        );

        Ok((prefix, last, scratch))
    }
}

/// Owns every process and scratch file of one spawned chain.
struct ChainGuard {
    prefix: Vec<std::process::Child>,
    last: tokio::process::Child,
    scratch: Vec<PathBuf>,
}

impl ChainGuard {
    fn kill_all(&mut self) {
        // kill_on_drop covers the last process too; killing eagerly here
        // keeps the guarantee independent of drop timing.
        let _ = self.last.start_kill();
        for child in &mut self.prefix {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl Drop for ChainGuard {
    fn drop(&mut self) {
        self.kill_all();
        remove_scratch(&self.scratch);
    }
}

/// Byte stream over the final process's stdout.
///
/// Dropping the stream terminates all chain processes and deletes scratch
/// files.
pub struct ChainStream {
    inner: ReaderStream<tokio::process::ChildStdout>,
    _guard: ChainGuard,
}

impl std::fmt::Debug for ChainStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainStream").finish_non_exhaustive()
    }
}

impl Stream for ChainStream {
    type Item = std::io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Handle to a detached chain whose final process writes files itself.
pub struct ChainHandle {
    guard: ChainGuard,
}

impl ChainHandle {
    /// Whether the final process has exited (normally or otherwise).
    pub fn finished(&mut self) -> bool {
        matches!(self.guard.last.try_wait(), Ok(Some(_)))
    }

    /// Terminate every process in the chain. Idempotent.
    pub fn kill(&mut self) {
        self.guard.kill_all();
    }
}

/// Return a path safe to hand to external processes.
///
/// Paths that are not valid UTF-8 cannot be passed through a command
/// template; the file is copied to a temp location with a portable name and
/// the copy is registered as a scratch file for the chain to delete.
pub fn portable_input(path: &Path) -> Result<(PathBuf, Option<PathBuf>)> {
    if path.to_str().is_some() {
        return Ok((path.to_path_buf(), None));
    }

    let suffix = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default();
    let (_, copy) = tempfile::Builder::new()
        .prefix("cadenza-input-")
        .suffix(&suffix)
        .tempfile()
        .map_err(|e| Error::Internal(format!("scratch file: {e}")))?
        .keep()
        .map_err(|e| Error::Internal(format!("scratch file: {e}")))?;

    std::fs::copy(path, &copy)?;
    tracing::debug!(from = %path.display(), to = %copy.display(), "Copied non-portable input");
    Ok((copy.clone(), Some(copy)))
}

fn remove_scratch(paths: &[PathBuf]) {
    for path in paths {
        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::debug!(path = %path.display(), "Failed to remove scratch file: {e}");
            }
        }
    }
}
