//! An engine backed by a native ffmpeg binary.
//!
//! The virtual filesystem is a private temp directory that becomes the
//! child's working directory, so relative paths in a command line refer to
//! files written through [`Engine::fs`]. Output is forwarded line by line
//! to the session's [`LogSink`] and the run ends with the same sentinel the
//! WebAssembly build prints.

use std::io;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use sf_core::config::TranscodeConfig;
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::bootstrap::Bootstrap;
use crate::engine::{Engine, EngineFactory, EngineMemory, EntryPoint, LogSink};
use crate::fs::{FsOp, FsOutput};
use crate::marshal::unmarshal_args;
use crate::memory::LinearMemory;
use crate::progress::END_OF_RUN;

/// Symbols the native engine answers to.
const ENTRY_POINTS: &[&str] = &["proxy_main", "main"];

/// Exit code reported when the run could not start or was killed.
const EXIT_ABNORMAL: i32 = -1;

const READ_CHUNK: usize = 8 * 1024;

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Creates [`ProcessEngine`]s.
#[derive(Debug, Clone, Default)]
pub struct ProcessEngineFactory {
    ffmpeg_path: Option<PathBuf>,
}

impl ProcessEngineFactory {
    pub fn new(config: &TranscodeConfig) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
        }
    }

    /// Use exactly this binary.
    pub fn with_binary(path: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: Some(path.into()),
        }
    }

    /// Resolve the ffmpeg binary: the configured path when it exists,
    /// otherwise whatever `PATH` provides.
    pub fn locate(&self) -> sf_core::Result<PathBuf> {
        if let Some(ref p) = self.ffmpeg_path {
            if p.exists() {
                return Ok(p.clone());
            }
            tracing::warn!(
                "Configured ffmpeg path {} does not exist, searching PATH",
                p.display()
            );
        }
        which::which("ffmpeg").map_err(|e| {
            sf_core::Error::bootstrap("ffmpeg", format!("binary not found in PATH: {e}"))
        })
    }
}

#[async_trait]
impl EngineFactory for ProcessEngineFactory {
    async fn instantiate(
        &self,
        bootstrap: &Bootstrap,
        sink: LogSink,
    ) -> sf_core::Result<Arc<dyn Engine>> {
        let binary = self.locate()?;
        let root = tempfile::Builder::new().prefix("storyforge-fs-").tempdir()?;
        bootstrap.info(format!("using ffmpeg binary {}", binary.display()));
        // The native engine never fetches the WebAssembly build.
        bootstrap.info(format!(
            "skip fetch {}: not used by the native engine",
            bootstrap.locations.core
        ));
        tracing::debug!(
            "Virtual filesystem for {} at {}",
            binary.display(),
            root.path().display()
        );
        Ok(Arc::new(ProcessEngine::new(binary, root, sink)))
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

struct ProcessInner {
    binary: PathBuf,
    location: String,
    root: TempDir,
    memory: LinearMemory,
    sink: LogSink,
    cancel: CancellationToken,
    exited: AtomicBool,
}

impl Drop for ProcessInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// A loaded native engine. Cheap to share; the temp directory lives as long
/// as the engine or a running invocation does.
#[derive(Clone)]
pub struct ProcessEngine {
    inner: Arc<ProcessInner>,
}

impl ProcessEngine {
    fn new(binary: PathBuf, root: TempDir, sink: LogSink) -> Self {
        let location = binary.display().to_string();
        Self {
            inner: Arc::new(ProcessInner {
                binary,
                location,
                root,
                memory: LinearMemory::new(),
                sink,
                cancel: CancellationToken::new(),
                exited: AtomicBool::new(false),
            }),
        }
    }

    /// Host directory backing the virtual filesystem.
    pub fn root(&self) -> &Path {
        self.inner.root.path()
    }

    fn resolve(&self, path: &str) -> io::Result<PathBuf> {
        resolve_under(self.root(), path)
    }
}

impl Engine for ProcessEngine {
    fn location(&self) -> &str {
        &self.inner.location
    }

    fn memory(&self) -> &dyn EngineMemory {
        &self.inner.memory
    }

    fn entry_point(&self, symbol: &str) -> Option<Arc<dyn EntryPoint>> {
        ENTRY_POINTS.contains(&symbol).then(|| {
            Arc::new(ProcessEntryPoint {
                inner: self.inner.clone(),
            }) as Arc<dyn EntryPoint>
        })
    }

    fn fs(&self, op: &FsOp) -> io::Result<FsOutput> {
        match op {
            FsOp::ReadFile { path } => {
                let data = std::fs::read(self.resolve(path)?)?;
                Ok(FsOutput::Data(data.into()))
            }
            FsOp::WriteFile { path, data } => {
                std::fs::write(self.resolve(path)?, data)?;
                Ok(FsOutput::Unit)
            }
            FsOp::ReadDir { path } => {
                let mut entries = std::fs::read_dir(self.resolve(path)?)?
                    .map(|e| e.map(|e| e.file_name().to_string_lossy().into_owned()))
                    .collect::<io::Result<Vec<_>>>()?;
                entries.sort();
                Ok(FsOutput::Entries(entries))
            }
            FsOp::Unlink { path } => {
                std::fs::remove_file(self.resolve(path)?)?;
                Ok(FsOutput::Unit)
            }
            FsOp::MkDir { path } => {
                std::fs::create_dir(self.resolve(path)?)?;
                Ok(FsOutput::Unit)
            }
            FsOp::RmDir { path } => {
                std::fs::remove_dir(self.resolve(path)?)?;
                Ok(FsOutput::Unit)
            }
            FsOp::Rename { from, to } => {
                std::fs::rename(self.resolve(from)?, self.resolve(to)?)?;
                Ok(FsOutput::Unit)
            }
            FsOp::Exists { path } => Ok(FsOutput::Exists(self.resolve(path)?.exists())),
        }
    }

    fn exit(&self, code: i32) -> sf_core::Result<()> {
        if self.inner.exited.swap(true, Ordering::SeqCst) {
            return Err(sf_core::Error::Engine("engine has already exited".into()));
        }
        tracing::debug!("Native engine exit({code})");
        self.inner.cancel.cancel();
        Ok(())
    }
}

/// Map a virtual path onto `root`. Absolute virtual paths are rooted at the
/// temp directory; `..` is never allowed to climb out of it.
fn resolve_under(root: &Path, path: &str) -> io::Result<PathBuf> {
    let mut resolved = root.to_path_buf();
    for component in Path::new(path).components() {
        match component {
            Component::RootDir | Component::CurDir => {}
            Component::Normal(part) => resolved.push(part),
            Component::ParentDir | Component::Prefix(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("path escapes the virtual filesystem: {path}"),
                ));
            }
        }
    }
    Ok(resolved)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

struct ProcessEntryPoint {
    inner: Arc<ProcessInner>,
}

#[async_trait]
impl EntryPoint for ProcessEntryPoint {
    async fn call(&self, argc: i32, argv: u32) -> i32 {
        let inner = &self.inner;
        let args = unmarshal_args(&inner.memory, argc, argv);
        inner.memory.reset();

        let args = match args {
            Ok(args) => args,
            Err(e) => {
                inner.sink.stderr(format!("cannot read command line: {e}"));
                inner.sink.stdout(END_OF_RUN);
                return EXIT_ABNORMAL;
            }
        };

        let code = run_child(inner, &args).await;
        if let Some(code) = code {
            inner.sink.stdout(END_OF_RUN);
            code
        } else {
            EXIT_ABNORMAL
        }
    }
}

/// Run the binary to completion. `None` means the engine exited meanwhile.
async fn run_child(inner: &ProcessInner, args: &[String]) -> Option<i32> {
    if inner.cancel.is_cancelled() {
        return None;
    }

    // argv[0] is the program-name placeholder.
    let mut cmd = Command::new(&inner.binary);
    cmd.args(args.iter().skip(1))
        .current_dir(inner.root.path())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            inner
                .sink
                .stderr(format!("failed to spawn {}: {e}", inner.binary.display()));
            return Some(EXIT_ABNORMAL);
        }
    };

    let (Some(mut stdout), Some(mut stderr)) = (child.stdout.take(), child.stderr.take()) else {
        inner.sink.stderr("child output pipes unavailable");
        return Some(EXIT_ABNORMAL);
    };

    let mut out = StreamLines::default();
    let mut err = StreamLines::default();
    let mut out_buf = [0u8; READ_CHUNK];
    let mut err_buf = [0u8; READ_CHUNK];

    while !(out.done && err.done) {
        tokio::select! {
            _ = inner.cancel.cancelled() => {
                let _ = child.start_kill();
                return None;
            }
            n = read_chunk(&mut stdout, &mut out_buf), if !out.done => {
                for line in out.feed(&out_buf[..n]) {
                    inner.sink.stdout(line);
                }
            }
            n = read_chunk(&mut stderr, &mut err_buf), if !err.done => {
                for line in err.feed(&err_buf[..n]) {
                    inner.sink.stderr(line);
                }
            }
        }
    }

    let status = tokio::select! {
        _ = inner.cancel.cancelled() => {
            let _ = child.start_kill();
            return None;
        }
        status = child.wait() => status,
    };

    match status {
        Ok(status) => {
            tracing::debug!("ffmpeg finished with {status}");
            Some(status.code().unwrap_or(EXIT_ABNORMAL))
        }
        Err(e) => {
            inner.sink.stderr(format!("failed to wait for ffmpeg: {e}"));
            Some(EXIT_ABNORMAL)
        }
    }
}

/// Read errors end the stream just like EOF does.
async fn read_chunk<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> usize {
    reader.read(buf).await.unwrap_or(0)
}

/// Splits a byte stream into lines on `\n` or `\r`. ffmpeg redraws its
/// status line with a bare carriage return, so both count.
#[derive(Default)]
struct StreamLines {
    pending: Vec<u8>,
    done: bool,
}

impl StreamLines {
    /// Feed one chunk; an empty chunk marks end of stream and flushes.
    fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        if chunk.is_empty() {
            self.done = true;
            if !self.pending.is_empty() {
                lines.push(String::from_utf8_lossy(&self.pending).into_owned());
                self.pending.clear();
            }
            return lines;
        }
        for &b in chunk {
            if b == b'\n' || b == b'\r' {
                if !self.pending.is_empty() {
                    lines.push(String::from_utf8_lossy(&self.pending).into_owned());
                    self.pending.clear();
                }
            } else {
                self.pending.push(b);
            }
        }
        lines
    }
}
