//! Shared test doubles for session integration tests.
//!
//! [`ScriptedEngineFactory`] produces in-memory engines that replay a fixed
//! log script on every invocation. A [`Notify`] gate can hold the sentinel
//! back so tests can observe a command while it is still outstanding.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use sf_transcode::{
    unmarshal_args, Bootstrap, Engine, EngineFactory, EngineMemory, EntryPoint, FsOp, FsOutput,
    LinearMemory, LogSink, END_OF_RUN,
};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// A typical ffmpeg stderr transcript: 100s of 25 fps input, half done,
/// then the summary line.
pub const TRANSCODE_LOG: &[&str] = &[
    "ffmpeg version 5.1 Copyright (c) 2000-2022 the FFmpeg developers",
    "Input #0, mov,mp4,m4a,3gp,3g2,mj2, from 'in.mp4':",
    "  Duration: 00:01:40.00, start: 0.000000, bitrate: 1205 kb/s",
    "    Stream #0:0(und): Video: h264 (High), yuv420p, 1280x720, 1000 kb/s, 25 fps, 25 tbr, 12800 tbn (default)",
    "frame= 1250 fps=310 q=28.0 size=    1024kB time=00:00:50.00 bitrate= 167.8kbits/s speed=12.4x",
    "video:2048kB audio:160kB subtitle:0kB other streams:0kB global headers:0kB muxing overhead: 0.4%",
];

#[derive(Default)]
struct Script {
    lines: Vec<String>,
    entry_points: Vec<String>,
    gate: Option<Arc<Notify>>,
    load_gate: Option<Arc<Notify>>,
    fetch_artifacts: bool,
    failing_exit: bool,
}

#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<Vec<String>>>,
    exits: AtomicUsize,
    instances: AtomicUsize,
}

/// Factory for [`ScriptedEngine`]s. Clones share their recordings, so a
/// test can keep one clone and hand the other to the session.
#[derive(Clone)]
pub struct ScriptedEngineFactory {
    script: Arc<Script>,
    recorder: Arc<Recorder>,
}

impl ScriptedEngineFactory {
    pub fn new() -> Self {
        Self::with_lines(TRANSCODE_LOG)
    }

    pub fn with_lines(lines: &[&str]) -> Self {
        Self::from_script(Script {
            lines: lines.iter().map(|l| l.to_string()).collect(),
            entry_points: vec!["proxy_main".into()],
            ..Script::default()
        })
    }

    fn from_script(script: Script) -> Self {
        Self {
            script: Arc::new(script),
            recorder: Arc::new(Recorder::default()),
        }
    }

    fn edit(self, f: impl FnOnce(&mut Script)) -> Self {
        let mut script = Arc::try_unwrap(self.script).unwrap_or_else(|_| {
            panic!("configure the factory before cloning it");
        });
        f(&mut script);
        Self::from_script(script)
    }

    /// Hold the end-of-run sentinel until `gate` is notified.
    pub fn hold_until(self, gate: Arc<Notify>) -> Self {
        self.edit(|s| s.gate = Some(gate))
    }

    /// Hold instantiation until `gate` is notified.
    pub fn hold_load_until(self, gate: Arc<Notify>) -> Self {
        self.edit(|s| s.load_gate = Some(gate))
    }

    pub fn exporting(self, symbols: &[&str]) -> Self {
        self.edit(|s| s.entry_points = symbols.iter().map(|s| s.to_string()).collect())
    }

    /// Fetch the bootstrap artifacts before instantiating, like a
    /// WebAssembly build would.
    pub fn fetching_artifacts(self) -> Self {
        self.edit(|s| s.fetch_artifacts = true)
    }

    pub fn failing_exit(self) -> Self {
        self.edit(|s| s.failing_exit = true)
    }

    /// Every argv the entry point was called with.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.recorder.calls.lock().clone()
    }

    pub fn exit_count(&self) -> usize {
        self.recorder.exits.load(Ordering::SeqCst)
    }

    pub fn instance_count(&self) -> usize {
        self.recorder.instances.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EngineFactory for ScriptedEngineFactory {
    async fn instantiate(
        &self,
        bootstrap: &Bootstrap,
        sink: LogSink,
    ) -> sf_core::Result<Arc<dyn Engine>> {
        if self.script.fetch_artifacts {
            bootstrap.fetch_artifacts().await?;
        }
        if let Some(ref gate) = self.script.load_gate {
            gate.notified().await;
        }
        self.recorder.instances.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(ScriptedEngine {
            script: self.script.clone(),
            recorder: self.recorder.clone(),
            memory: Arc::new(LinearMemory::new()),
            files: Mutex::new(BTreeMap::new()),
            sink,
            cancel: CancellationToken::new(),
        }))
    }
}

/// In-memory engine with a flat file map.
pub struct ScriptedEngine {
    script: Arc<Script>,
    recorder: Arc<Recorder>,
    memory: Arc<LinearMemory>,
    files: Mutex<BTreeMap<String, Bytes>>,
    sink: LogSink,
    cancel: CancellationToken,
}

fn normalize(path: &str) -> String {
    path.trim_start_matches('/').to_string()
}

fn not_found(path: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("ENOENT: {path}"))
}

impl Engine for ScriptedEngine {
    fn location(&self) -> &str {
        "scripted://ffmpeg-core.js"
    }

    fn memory(&self) -> &dyn EngineMemory {
        self.memory.as_ref()
    }

    fn entry_point(&self, symbol: &str) -> Option<Arc<dyn EntryPoint>> {
        if !self.script.entry_points.iter().any(|s| s == symbol) {
            return None;
        }
        Some(Arc::new(ScriptedEntryPoint {
            script: self.script.clone(),
            recorder: self.recorder.clone(),
            memory: self.memory.clone(),
            sink: self.sink.clone(),
            cancel: self.cancel.clone(),
        }))
    }

    fn fs(&self, op: &FsOp) -> io::Result<FsOutput> {
        let mut files = self.files.lock();
        match op {
            FsOp::ReadFile { path } => files
                .get(&normalize(path))
                .cloned()
                .map(FsOutput::Data)
                .ok_or_else(|| not_found(path)),
            FsOp::WriteFile { path, data } => {
                files.insert(normalize(path), data.clone());
                Ok(FsOutput::Unit)
            }
            FsOp::ReadDir { path } if normalize(path).is_empty() => {
                Ok(FsOutput::Entries(files.keys().cloned().collect()))
            }
            FsOp::ReadDir { path } => Err(not_found(path)),
            FsOp::Unlink { path } => files
                .remove(&normalize(path))
                .map(|_| FsOutput::Unit)
                .ok_or_else(|| not_found(path)),
            FsOp::Rename { from, to } => {
                let data = files.remove(&normalize(from)).ok_or_else(|| not_found(from))?;
                files.insert(normalize(to), data);
                Ok(FsOutput::Unit)
            }
            FsOp::Exists { path } => Ok(FsOutput::Exists(files.contains_key(&normalize(path)))),
            FsOp::MkDir { .. } | FsOp::RmDir { .. } => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "flat filesystem",
            )),
        }
    }

    fn exit(&self, _code: i32) -> sf_core::Result<()> {
        self.recorder.exits.fetch_add(1, Ordering::SeqCst);
        self.cancel.cancel();
        if self.script.failing_exit {
            return Err(sf_core::Error::Engine("exit(1) threw".into()));
        }
        Ok(())
    }
}

struct ScriptedEntryPoint {
    script: Arc<Script>,
    recorder: Arc<Recorder>,
    memory: Arc<LinearMemory>,
    sink: LogSink,
    cancel: CancellationToken,
}

#[async_trait]
impl EntryPoint for ScriptedEntryPoint {
    async fn call(&self, argc: i32, argv: u32) -> i32 {
        let args = unmarshal_args(self.memory.as_ref(), argc, argv).unwrap_or_default();
        self.memory.reset();
        self.recorder.calls.lock().push(args);

        for line in &self.script.lines {
            self.sink.stderr(line.clone());
        }
        if let Some(ref gate) = self.script.gate {
            tokio::select! {
                _ = gate.notified() => {}
                _ = self.cancel.cancelled() => return -1,
            }
        }
        self.sink.stdout(END_OF_RUN);
        0
    }
}
