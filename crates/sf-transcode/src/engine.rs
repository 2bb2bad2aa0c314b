//! The seams an engine implementation plugs into.
//!
//! An [`EngineFactory`] turns bootstrap locations into a live [`Engine`].
//! The session binds one [`EntryPoint`] from it, marshals arguments into the
//! engine's [`EngineMemory`], and learns about progress and completion only
//! through the lines the engine writes into its [`LogSink`].

use std::io;
use std::sync::Arc;

use async_trait::async_trait;

use crate::bootstrap::Bootstrap;
use crate::fs::{FsOp, FsOutput};
use crate::log::{LogEvent, LogKind};

/// Size of a pointer in engine memory.
pub const POINTER_SIZE: usize = 4;

/// Upper bound on a NUL-terminated string in engine memory, terminator
/// excluded. Arguments longer than this are refused when marshalled.
pub const MAX_C_STRING: usize = 64 * 1024;

/// Memory owned by the engine, addressed by 32-bit offsets.
pub trait EngineMemory: Send + Sync {
    /// Allocate `size` bytes and return their address. Never returns 0.
    fn malloc(&self, size: usize) -> sf_core::Result<u32>;

    /// Copy `bytes` to `ptr`.
    fn write(&self, ptr: u32, bytes: &[u8]) -> sf_core::Result<()>;

    /// Copy `len` bytes starting at `ptr`.
    fn read(&self, ptr: u32, len: usize) -> sf_core::Result<Vec<u8>>;

    /// Store a little-endian `i32` at `ptr`.
    fn set_i32(&self, ptr: u32, value: i32) -> sf_core::Result<()> {
        self.write(ptr, &value.to_le_bytes())
    }

    /// Load a little-endian `i32` from `ptr`.
    fn get_i32(&self, ptr: u32) -> sf_core::Result<i32> {
        let raw = self.read(ptr, POINTER_SIZE)?;
        let mut buf = [0u8; POINTER_SIZE];
        buf.copy_from_slice(&raw);
        Ok(i32::from_le_bytes(buf))
    }

    /// Read a NUL-terminated UTF-8 string starting at `ptr`.
    fn read_c_string(&self, ptr: u32) -> sf_core::Result<String> {
        let mut bytes = Vec::new();
        let mut addr = ptr;
        loop {
            let b = self.read(addr, 1)?[0];
            if b == 0 {
                break;
            }
            bytes.push(b);
            if bytes.len() > MAX_C_STRING {
                return Err(sf_core::Error::Engine(format!(
                    "unterminated string at 0x{ptr:08x}"
                )));
            }
            addr += 1;
        }
        String::from_utf8(bytes)
            .map_err(|e| sf_core::Error::Engine(format!("invalid UTF-8 at 0x{ptr:08x}: {e}")))
    }
}

/// A bound native entry point taking `(argc, argv)`.
#[async_trait]
pub trait EntryPoint: Send + Sync {
    /// Run the engine's main routine. Completion is also reported through
    /// the log sink; the return value is informational only.
    async fn call(&self, argc: i32, argv: u32) -> i32;
}

/// A loaded engine instance.
pub trait Engine: Send + Sync {
    /// Where the engine was loaded from, for diagnostics.
    fn location(&self) -> &str;

    /// The engine's memory, used to marshal arguments.
    fn memory(&self) -> &dyn EngineMemory;

    /// Look up an exported entry point by symbol name.
    fn entry_point(&self, symbol: &str) -> Option<Arc<dyn EntryPoint>>;

    /// Run an operation against the engine's virtual filesystem. Errors are
    /// raw native failures; the session turns them into readable ones.
    fn fs(&self, op: &FsOp) -> io::Result<FsOutput>;

    /// Tear the engine down, aborting whatever it is running.
    fn exit(&self, code: i32) -> sf_core::Result<()>;
}

/// Creates engines from bootstrap locations.
#[async_trait]
pub trait EngineFactory: Send + Sync {
    /// Instantiate an engine whose print/printErr streams go to `sink`.
    async fn instantiate(
        &self,
        bootstrap: &Bootstrap,
        sink: LogSink,
    ) -> sf_core::Result<Arc<dyn Engine>>;
}

/// Destination for engine output lines, in the order they are produced.
#[derive(Clone)]
pub struct LogSink {
    inner: Arc<dyn Fn(LogEvent) + Send + Sync>,
}

impl LogSink {
    pub fn new(f: impl Fn(LogEvent) + Send + Sync + 'static) -> Self {
        Self { inner: Arc::new(f) }
    }

    /// A sink that drops everything.
    pub fn discard() -> Self {
        Self::new(|_| {})
    }

    pub fn emit(&self, event: LogEvent) {
        (self.inner)(event);
    }

    pub fn stdout(&self, line: impl Into<String>) {
        self.emit(LogEvent::new(LogKind::StdOut, line));
    }

    pub fn stderr(&self, line: impl Into<String>) {
        self.emit(LogEvent::new(LogKind::StdErr, line));
    }

    pub fn info(&self, line: impl Into<String>) {
        self.emit(LogEvent::new(LogKind::Info, line));
    }
}

impl std::fmt::Debug for LogSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogSink").finish_non_exhaustive()
    }
}
