//! The transcode session: engine lifecycle, command serialization and
//! log-driven progress.
//!
//! A [`TranscodeSession`] owns at most one engine. `load` brings it up once,
//! `run` submits one command at a time, and `exit` tears everything down,
//! rejecting whatever was still running. The engine never reports
//! completion directly: every line it prints is passed to the logger, fed
//! through a [`ProgressParser`], and the end-of-run sentinel is what
//! resolves the pending [`RunHandle`].

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use bytes::Bytes;
use parking_lot::Mutex;
use sf_core::config::TranscodeConfig;
use sf_core::events::{Event, EventBus, TranscodeEvent};
use sf_core::{Error, OperationId, Result, SessionId};
use tokio::sync::{broadcast, oneshot};

use crate::bootstrap::{ArtifactFetcher, Bootstrap, CoreLocations};
use crate::engine::{Engine, EngineFactory, EntryPoint, LogSink};
use crate::fs::{FsOp, FsOutput};
use crate::log::{LogEvent, LogKind, Observers};
use crate::marshal::{build_argv, marshal_args};
use crate::process::ProcessEngineFactory;
use crate::progress::{ParsedLine, Progress, ProgressParser};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct LoadedEngine {
    engine: Arc<dyn Engine>,
    entry: Arc<dyn EntryPoint>,
}

enum Phase {
    Unloaded,
    Loading,
    Loaded(LoadedEngine),
}

struct PendingOperation {
    id: OperationId,
    tx: oneshot::Sender<Result<()>>,
}

struct State {
    phase: Phase,
    /// Bumped whenever an engine is torn down, so a load that raced with
    /// `exit` and lines from a dead engine can be recognized.
    generation: u64,
    pending: Option<PendingOperation>,
    parser: ProgressParser,
    observers: Observers,
}

struct Shared {
    id: SessionId,
    config: TranscodeConfig,
    factory: Arc<dyn EngineFactory>,
    fetcher: ArtifactFetcher,
    events: EventBus,
    state: Mutex<State>,
}

impl Shared {
    /// Observers are cloned out so callbacks run without the lock held.
    fn observers(&self) -> Observers {
        self.state.lock().observers.clone()
    }

    fn info(&self, message: impl Into<String>) {
        self.observers().log(&LogEvent::new(LogKind::Info, message));
    }

    /// A sink that feeds engine output back into this session for as long as
    /// the session (and this engine generation) is alive.
    fn sink(self: &Arc<Self>, generation: u64) -> LogSink {
        let weak: Weak<Shared> = Arc::downgrade(self);
        LogSink::new(move |event| {
            if let Some(shared) = weak.upgrade() {
                shared.handle_engine_line(generation, event);
            }
        })
    }

    fn handle_engine_line(&self, generation: u64, event: LogEvent) {
        self.observers().log(&event);
        if event.kind == LogKind::Info {
            return;
        }

        let mut st = self.state.lock();
        if st.generation != generation {
            // Output from an engine that has since exited.
            return;
        }
        let parsed = st.parser.parse_line(&event.message);
        match parsed {
            None => {}
            Some(ParsedLine::EndOfRun) => {
                let finished = st.pending.take();
                drop(st);
                if let Some(op) = finished {
                    tracing::debug!(operation_id = %op.id, "Command finished");
                    self.events.broadcast(
                        self.id,
                        TranscodeEvent::Completed {
                            operation_id: op.id,
                        },
                    );
                    // The caller may have dropped the handle.
                    let _ = op.tx.send(Ok(()));
                }
            }
            Some(ParsedLine::Progress(progress)) => {
                let operation = st.pending.as_ref().map(|p| p.id);
                let observers = st.observers.clone();
                drop(st);
                observers.progress(&progress);
                if let Some(operation_id) = operation {
                    self.events
                        .broadcast(self.id, progress_event(operation_id, &progress));
                }
            }
        }
    }

    /// Tear down the engine and reject the pending operation, if any.
    fn teardown(&self) -> (Option<Arc<dyn Engine>>, Option<PendingOperation>) {
        let mut st = self.state.lock();
        let engine = match std::mem::replace(&mut st.phase, Phase::Unloaded) {
            Phase::Loaded(loaded) => Some(loaded.engine),
            Phase::Loading | Phase::Unloaded => None,
        };
        st.generation += 1;
        st.parser.reset();
        (engine, st.pending.take())
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let st = self.state.get_mut();
        if let Phase::Loaded(ref loaded) = st.phase {
            if let Err(e) = loaded.engine.exit(1) {
                tracing::debug!("Engine exit on drop failed: {e}");
            }
        }
    }
}

fn progress_event(operation_id: OperationId, progress: &Progress) -> TranscodeEvent {
    TranscodeEvent::Progress {
        operation_id,
        ratio: progress.ratio,
        time: progress.time,
        duration: progress.duration,
    }
}

// ---------------------------------------------------------------------------
// RunHandle
// ---------------------------------------------------------------------------

/// Completion of one submitted command.
///
/// Resolves to `Ok(())` once the engine prints its end-of-run sentinel, or
/// to [`Error::EngineExited`] when the session exits first. Dropping the
/// handle does not cancel the command.
#[derive(Debug)]
pub struct RunHandle {
    operation_id: OperationId,
    rx: oneshot::Receiver<Result<()>>,
}

impl RunHandle {
    pub fn operation_id(&self) -> OperationId {
        self.operation_id
    }
}

impl Future for RunHandle {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.unwrap_or(Err(Error::EngineExited)))
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Configures a [`TranscodeSession`].
pub struct SessionBuilder {
    config: TranscodeConfig,
    factory: Option<Arc<dyn EngineFactory>>,
    fetcher: Option<ArtifactFetcher>,
    observers: Observers,
    event_capacity: usize,
}

impl SessionBuilder {
    pub fn config(mut self, config: TranscodeConfig) -> Self {
        self.config = config;
        self
    }

    /// Engine implementation to load. Defaults to the native process engine.
    pub fn factory(mut self, factory: impl EngineFactory + 'static) -> Self {
        self.factory = Some(Arc::new(factory));
        self
    }

    pub fn fetcher(mut self, fetcher: ArtifactFetcher) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn logger(mut self, f: impl Fn(&LogEvent) + Send + Sync + 'static) -> Self {
        self.observers.logger = Some(Arc::new(f));
        self
    }

    pub fn progress(mut self, f: impl Fn(&Progress) + Send + Sync + 'static) -> Self {
        self.observers.progress = Some(Arc::new(f));
        self
    }

    /// Broadcast channel capacity for [`TranscodeSession::subscribe`].
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    pub fn build(self) -> TranscodeSession {
        let factory = self.factory.unwrap_or_else(|| {
            Arc::new(ProcessEngineFactory::new(&self.config)) as Arc<dyn EngineFactory>
        });
        let mut observers = self.observers;
        observers.echo = self.config.log;

        let shared = Arc::new(Shared {
            id: SessionId::new(),
            config: self.config,
            factory,
            fetcher: self.fetcher.unwrap_or_default(),
            events: EventBus::new(self.event_capacity),
            state: Mutex::new(State {
                phase: Phase::Unloaded,
                generation: 0,
                pending: None,
                parser: ProgressParser::new(),
                observers,
            }),
        });
        shared.info(format!("use storyforge v{}", env!("CARGO_PKG_VERSION")));
        TranscodeSession { shared }
    }
}

// ---------------------------------------------------------------------------
// TranscodeSession
// ---------------------------------------------------------------------------

/// One engine, one command at a time.
///
/// Cloning yields another handle to the same session.
#[derive(Clone)]
pub struct TranscodeSession {
    shared: Arc<Shared>,
}

impl TranscodeSession {
    /// A session over the native process engine.
    pub fn new(config: TranscodeConfig) -> Self {
        Self::builder().config(config).build()
    }

    pub fn builder() -> SessionBuilder {
        SessionBuilder {
            config: TranscodeConfig::default(),
            factory: None,
            fetcher: None,
            observers: Observers::default(),
            event_capacity: 256,
        }
    }

    pub fn id(&self) -> SessionId {
        self.shared.id
    }

    pub fn config(&self) -> &TranscodeConfig {
        &self.shared.config
    }

    /// Bring the engine up.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyLoaded`] if an engine is loaded or being loaded.
    /// - [`Error::BootstrapFetch`] / [`Error::MissingEntryPoint`] (or whatever
    ///   the factory reports) when instantiation fails; the session stays
    ///   unloaded.
    /// - [`Error::EngineExited`] if [`exit`](Self::exit) ran meanwhile.
    pub async fn load(&self) -> Result<()> {
        let shared = &self.shared;
        shared.info("load ffmpeg-core");

        let generation = {
            let mut st = shared.state.lock();
            if !matches!(st.phase, Phase::Unloaded) {
                return Err(Error::AlreadyLoaded);
            }
            st.phase = Phase::Loading;
            st.generation
        };
        let mut guard = LoadGuard {
            shared,
            generation,
            armed: true,
        };

        shared.info("loading ffmpeg-core");
        let result = self.instantiate(generation).await;
        guard.armed = false;

        let mut st = shared.state.lock();
        if st.generation != generation || !matches!(st.phase, Phase::Loading) {
            drop(st);
            if let Ok(loaded) = result {
                let _ = loaded.engine.exit(1);
            }
            return Err(Error::EngineExited);
        }

        match result {
            Ok(loaded) => {
                let location = loaded.engine.location().to_string();
                st.phase = Phase::Loaded(loaded);
                drop(st);
                tracing::info!(session = %shared.id, "Engine loaded from {location}");
                shared.info("ffmpeg-core loaded");
                Ok(())
            }
            Err(e) => {
                st.phase = Phase::Unloaded;
                drop(st);
                tracing::warn!(session = %shared.id, "Engine load failed: {e}");
                Err(e)
            }
        }
    }

    async fn instantiate(&self, generation: u64) -> Result<LoadedEngine> {
        let shared = &self.shared;
        let sink = shared.sink(generation);
        let bootstrap = Bootstrap::new(
            CoreLocations::resolve(&shared.config),
            shared.config.main_name.clone(),
            shared.fetcher.clone(),
            sink.clone(),
        );

        let engine = shared.factory.instantiate(&bootstrap, sink).await?;
        let entry = engine
            .entry_point(&shared.config.main_name)
            .ok_or_else(|| Error::MissingEntryPoint {
                symbol: shared.config.main_name.clone(),
                location: engine.location().to_string(),
            });
        match entry {
            Ok(entry) => Ok(LoadedEngine { engine, entry }),
            Err(e) => {
                let _ = engine.exit(1);
                Err(e)
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.shared.state.lock().phase, Phase::Loaded(_))
    }

    /// Whether a command is currently outstanding.
    pub fn is_running(&self) -> bool {
        self.shared.state.lock().pending.is_some()
    }

    /// Submit a command. `args` follow the fixed `./ffmpeg -nostdin -y`
    /// prefix; empty arguments are dropped.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`Error::NotReady`] if no engine is loaded.
    /// - [`Error::Busy`] if another command is still outstanding; that
    ///   command is unaffected.
    pub fn run<I, S>(&self, args: I) -> Result<RunHandle>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let shared = &self.shared;
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        shared.info(format!("run ffmpeg command: {}", args.join(" ")));

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| Error::Internal("run() must be called within a tokio runtime".into()))?;

        let operation_id = OperationId::new();
        let (tx, rx) = oneshot::channel();

        let (entry, argc, argv) = {
            let mut st = shared.state.lock();
            let loaded = match &st.phase {
                Phase::Loaded(loaded) => loaded.clone(),
                Phase::Loading | Phase::Unloaded => return Err(Error::NotReady),
            };
            if st.pending.is_some() {
                return Err(Error::Busy);
            }

            let argv = build_argv(args.iter().cloned());
            let (argc, ptr) = marshal_args(loaded.engine.memory(), &argv)?;
            st.parser.reset();
            st.pending = Some(PendingOperation {
                id: operation_id,
                tx,
            });
            (loaded.entry, argc, ptr)
        };

        tracing::debug!(session = %shared.id, %operation_id, "Starting command");
        shared
            .events
            .broadcast(shared.id, TranscodeEvent::Started { operation_id, args });

        runtime.spawn(async move {
            let code = entry.call(argc, argv).await;
            tracing::debug!(%operation_id, "Entry point returned {code}");
        });

        Ok(RunHandle { operation_id, rx })
    }

    /// Tear the engine down. Safe in any state; the pending command, if any,
    /// resolves with [`Error::EngineExited`].
    pub fn exit(&self) {
        let shared = &self.shared;
        let (engine, pending) = shared.teardown();

        if let Some(op) = pending {
            shared.events.broadcast(
                shared.id,
                TranscodeEvent::Failed {
                    operation_id: op.id,
                    reason: "ffmpeg has exited".into(),
                },
            );
            let _ = op.tx.send(Err(Error::EngineExited));
        }

        if let Some(engine) = engine {
            if let Err(e) = engine.exit(1) {
                tracing::warn!(session = %shared.id, "Engine exit failed: {e}");
                shared.info(format!("engine exit failed: {e}"));
            }
            tracing::info!(session = %shared.id, "Engine exited");
        }
    }

    /// Run an operation against the engine's virtual filesystem.
    ///
    /// # Errors
    ///
    /// - [`Error::NotReady`] if no engine is loaded.
    /// - [`Error::FilesystemOperation`] when the engine rejects the operation.
    pub fn fs(&self, op: FsOp) -> Result<FsOutput> {
        let shared = &self.shared;
        shared.info(format!("run FS.{} {}", op.name(), op.describe_args()));

        let engine = match &shared.state.lock().phase {
            Phase::Loaded(loaded) => loaded.engine.clone(),
            Phase::Loading | Phase::Unloaded => return Err(Error::NotReady),
        };

        engine.fs(&op).map_err(|e| {
            tracing::debug!("FS.{}('{}') failed: {e}", op.name(), op.path());
            op.failure()
        })
    }

    pub fn read_file(&self, path: &str) -> Result<Bytes> {
        self.fs(FsOp::ReadFile { path: path.into() })?
            .into_data()
            .ok_or_else(|| Error::Internal("readFile returned no data".into()))
    }

    pub fn write_file(&self, path: &str, data: impl Into<Bytes>) -> Result<()> {
        self.fs(FsOp::WriteFile {
            path: path.into(),
            data: data.into(),
        })
        .map(|_| ())
    }

    pub fn read_dir(&self, path: &str) -> Result<Vec<String>> {
        self.fs(FsOp::ReadDir { path: path.into() })?
            .into_entries()
            .ok_or_else(|| Error::Internal("readdir returned no entries".into()))
    }

    pub fn unlink(&self, path: &str) -> Result<()> {
        self.fs(FsOp::Unlink { path: path.into() }).map(|_| ())
    }

    /// Replace the log callback.
    pub fn set_logger(&self, f: impl Fn(&LogEvent) + Send + Sync + 'static) {
        self.shared.state.lock().observers.logger = Some(Arc::new(f));
    }

    /// Replace the progress callback.
    pub fn set_progress(&self, f: impl Fn(&Progress) + Send + Sync + 'static) {
        self.shared.state.lock().observers.progress = Some(Arc::new(f));
    }

    /// Echo every log line through `tracing` at info level.
    pub fn set_logging(&self, enabled: bool) {
        self.shared.state.lock().observers.echo = enabled;
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.shared.events.subscribe()
    }

    /// The `n` most recent events, newest first.
    pub fn recent_events(&self, n: usize) -> Vec<Event> {
        self.shared.events.recent_events(n)
    }
}

/// Puts the session back to unloaded if a `load` future is dropped midway.
struct LoadGuard<'a> {
    shared: &'a Shared,
    generation: u64,
    armed: bool,
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut st = self.shared.state.lock();
        if st.generation == self.generation && matches!(st.phase, Phase::Loading) {
            st.phase = Phase::Unloaded;
        }
    }
}
