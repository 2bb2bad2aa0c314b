//! # sf-transcode
//!
//! Lifecycle and progress layer over an ffmpeg transcoding engine.
//!
//! This crate provides:
//!
//! - **Session management** ([`TranscodeSession`]) -- one engine per
//!   session, a one-time async `load`, at most one running command, forced
//!   `exit`, and a passthrough to the engine's virtual filesystem.
//! - **Progress parsing** ([`ProgressParser`]) -- turns the engine's textual
//!   log into ratio/time updates and detects the end-of-run sentinel.
//! - **Engine seams** ([`Engine`], [`EntryPoint`], [`EngineFactory`]) -- the
//!   traits an engine implementation plugs into, plus [`LinearMemory`] and
//!   the argument marshalling that crosses the native call boundary.
//! - **Bootstrap** ([`CoreLocations`], [`ArtifactFetcher`]) -- resolving and
//!   fetching the engine's script, binary and worker artifacts.
//! - **Native process engine** ([`ProcessEngineFactory`]) -- runs a native
//!   ffmpeg binary against a temp-dir backed virtual filesystem.
//! - **Payload fetching** ([`fetch_file`]) -- bytes from data URLs, remote
//!   URLs or local paths.

pub mod bootstrap;
pub mod engine;
pub mod fetch;
pub mod fs;
pub mod log;
pub mod marshal;
pub mod memory;
pub mod process;
pub mod progress;
pub mod session;

// ---- Re-exports for convenience ----

pub use bootstrap::{Artifact, ArtifactFetcher, Bootstrap, CoreArtifacts, CoreLocations};
pub use engine::{Engine, EngineFactory, EngineMemory, EntryPoint, LogSink};
pub use fetch::{fetch_file, FileSource};
pub use fs::{FsOp, FsOutput};
pub use log::{LogEvent, LogKind};
pub use marshal::{build_argv, marshal_args, unmarshal_args, DEFAULT_ARGS};
pub use memory::LinearMemory;
pub use process::{ProcessEngine, ProcessEngineFactory};
pub use progress::{ParsedLine, Progress, ProgressParser, ProgressState, END_OF_RUN};
pub use session::{RunHandle, SessionBuilder, TranscodeSession};
