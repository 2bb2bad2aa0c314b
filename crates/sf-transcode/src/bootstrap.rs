//! Locating and fetching the engine's bootstrap artifacts.
//!
//! An engine build ships as three files next to each other: the bootstrap
//! script, the WebAssembly binary and a worker script. Only the script's
//! location has to be configured; the other two are derived from it by
//! swapping the file name.

use std::path::PathBuf;

use bytes::Bytes;
use sf_core::config::{TranscodeConfig, CORE_SCRIPT_NAME};

use crate::engine::LogSink;

pub const WASM_NAME: &str = "ffmpeg-core.wasm";
pub const WORKER_NAME: &str = "ffmpeg-core.worker.js";

pub const SCRIPT_MIME: &str = "application/javascript";
pub const WASM_MIME: &str = "application/wasm";

/// Resolved artifact locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreLocations {
    pub core: String,
    pub wasm: String,
    pub worker: String,
    /// The worker location was configured rather than derived. Only an
    /// explicit worker is required to be fetchable.
    pub worker_explicit: bool,
}

impl CoreLocations {
    pub fn resolve(config: &TranscodeConfig) -> Self {
        let core = config.core_path.clone();
        let wasm = config
            .wasm_path
            .clone()
            .unwrap_or_else(|| core.replace(CORE_SCRIPT_NAME, WASM_NAME));
        let worker = config
            .worker_path
            .clone()
            .unwrap_or_else(|| core.replace(CORE_SCRIPT_NAME, WORKER_NAME));
        Self {
            core,
            wasm,
            worker,
            worker_explicit: config.worker_path.is_some(),
        }
    }
}

/// One fetched artifact.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub location: String,
    pub mime: &'static str,
    pub bytes: Bytes,
}

/// Everything needed to instantiate a WebAssembly engine build.
#[derive(Debug, Clone)]
pub struct CoreArtifacts {
    pub core: Artifact,
    pub wasm: Artifact,
    pub worker: Option<Artifact>,
}

/// Fetches artifacts over HTTP(S) or from the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct ArtifactFetcher {
    client: reqwest::Client,
}

impl ArtifactFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Fetch one artifact.
    ///
    /// `http://` and `https://` locations are downloaded; `file://` URLs
    /// and plain paths are read from disk.
    ///
    /// # Errors
    ///
    /// Returns [`sf_core::Error::BootstrapFetch`] on any transport, status
    /// or I/O failure.
    pub async fn fetch(&self, location: &str, mime: &'static str) -> sf_core::Result<Artifact> {
        tracing::debug!("fetch {location}");

        let bytes = if location.starts_with("http://") || location.starts_with("https://") {
            let resp = self
                .client
                .get(location)
                .send()
                .await
                .map_err(|e| sf_core::Error::bootstrap(location, e.to_string()))?;
            let status = resp.status();
            if !status.is_success() {
                return Err(sf_core::Error::bootstrap(
                    location,
                    format!("unexpected status {status}"),
                ));
            }
            resp.bytes()
                .await
                .map_err(|e| sf_core::Error::bootstrap(location, e.to_string()))?
        } else {
            let path = PathBuf::from(location.strip_prefix("file://").unwrap_or(location));
            tokio::fs::read(&path)
                .await
                .map(Bytes::from)
                .map_err(|e| sf_core::Error::bootstrap(location, e.to_string()))?
        };

        tracing::debug!("{location} file size = {} bytes", bytes.len());
        Ok(Artifact {
            location: location.to_string(),
            mime,
            bytes,
        })
    }
}

/// What an [`EngineFactory`](crate::EngineFactory) gets to work with.
#[derive(Debug, Clone)]
pub struct Bootstrap {
    pub locations: CoreLocations,
    pub main_name: String,
    fetcher: ArtifactFetcher,
    sink: LogSink,
}

impl Bootstrap {
    pub fn new(
        locations: CoreLocations,
        main_name: impl Into<String>,
        fetcher: ArtifactFetcher,
        sink: LogSink,
    ) -> Self {
        Self {
            locations,
            main_name: main_name.into(),
            fetcher,
            sink,
        }
    }

    /// Report a bootstrap step to the session's logger.
    pub fn info(&self, message: impl Into<String>) {
        self.sink.info(message);
    }

    /// Fetch one location, logging it the way the session logs everything.
    pub async fn fetch(&self, location: &str, mime: &'static str) -> sf_core::Result<Artifact> {
        self.info(format!("fetch {location}"));
        let artifact = self.fetcher.fetch(location, mime).await?;
        self.info(format!(
            "{location} file size = {} bytes",
            artifact.bytes.len()
        ));
        Ok(artifact)
    }

    /// Fetch the script, the binary and (when available) the worker.
    pub async fn fetch_artifacts(&self) -> sf_core::Result<CoreArtifacts> {
        let core = self.fetch(&self.locations.core, SCRIPT_MIME).await?;
        let wasm = self.fetch(&self.locations.wasm, WASM_MIME).await?;
        let worker = match self.fetch(&self.locations.worker, SCRIPT_MIME).await {
            Ok(worker) => Some(worker),
            Err(e) if !self.locations.worker_explicit => {
                tracing::warn!("Worker script unavailable, continuing without it: {e}");
                None
            }
            Err(e) => return Err(e),
        };
        Ok(CoreArtifacts { core, wasm, worker })
    }
}
