//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries the
//! transcode session settings and the content-API endpoints. Every section
//! defaults sensibly so a completely empty `{}` file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::Error;

/// Engine core release the default bootstrap location points at.
pub const DEFAULT_CORE_VERSION: &str = "0.11.0";

/// Native entry-point symbol bound after the engine loads.
pub const DEFAULT_MAIN_NAME: &str = "proxy_main";

/// File name of the engine bootstrap script; wasm and worker locations are
/// derived from it.
pub const CORE_SCRIPT_NAME: &str = "ffmpeg-core.js";

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub transcode: TranscodeConfig,
    pub media: MediaConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a file, failing if it is missing or invalid.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let t = &self.transcode;

        if t.core_path.trim().is_empty() {
            warnings.push("transcode.core_path is empty".into());
        } else if !t.core_path.contains(CORE_SCRIPT_NAME) {
            if t.wasm_path.is_none() {
                warnings.push(format!(
                    "transcode.wasm_path cannot be derived: core_path does not name {CORE_SCRIPT_NAME}"
                ));
            }
            if t.worker_path.is_none() {
                warnings.push(format!(
                    "transcode.worker_path cannot be derived: core_path does not name {CORE_SCRIPT_NAME}"
                ));
            }
        }

        if t.main_name.trim().is_empty() {
            warnings.push("transcode.main_name is empty".into());
        }

        if let Some(ref p) = t.ffmpeg_path {
            if !p.exists() {
                warnings.push(format!(
                    "transcode.ffmpeg_path {} does not exist; PATH lookup will be used",
                    p.display()
                ));
            }
        }

        if self.media.api_base_url.trim().is_empty() {
            warnings.push("media.api_base_url is empty".into());
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Settings for a transcode session: where the engine bootstraps from and
/// how its log is surfaced.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeConfig {
    /// Location of the engine bootstrap script.
    ///
    /// `core_path`, `wasm_path` and `worker_path` describe a WebAssembly
    /// build and are only fetched by engine factories that load one. The
    /// native process engine ignores them and runs `ffmpeg_path` instead.
    pub core_path: String,
    /// Location of the engine binary; derived from `core_path` when unset.
    pub wasm_path: Option<String>,
    /// Location of the worker script; derived from `core_path` when unset.
    pub worker_path: Option<String>,
    /// Echo every engine log line through `tracing` at info level.
    pub log: bool,
    /// Entry-point symbol to bind after loading.
    pub main_name: String,
    /// Native ffmpeg binary used by the process engine.
    pub ffmpeg_path: Option<PathBuf>,
}

/// Versioned CDN location of the engine bootstrap script.
pub fn default_core_path() -> String {
    format!("https://unpkg.com/@ffmpeg/core@{DEFAULT_CORE_VERSION}/dist/{CORE_SCRIPT_NAME}")
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            core_path: default_core_path(),
            wasm_path: None,
            worker_path: None,
            log: false,
            main_name: DEFAULT_MAIN_NAME.into(),
            ffmpeg_path: None,
        }
    }
}

/// CMS content-API endpoints used to list editor media.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub api_base_url: String,
    pub images_endpoint: String,
    pub media_endpoint: String,
    pub documents_endpoint: String,
    pub timeout_secs: u64,
}

impl MediaConfig {
    /// Join an endpoint onto the API base URL.
    pub fn endpoint_url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.api_base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000/api/v2".into(),
            images_endpoint: "images/".into(),
            media_endpoint: "media/".into(),
            documents_endpoint: "documents/".into(),
            timeout_secs: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = Config::default();
        assert_eq!(
            cfg.transcode.core_path,
            "https://unpkg.com/@ffmpeg/core@0.11.0/dist/ffmpeg-core.js"
        );
        assert_eq!(cfg.transcode.main_name, "proxy_main");
        assert!(!cfg.transcode.log);
        assert_eq!(cfg.media.timeout_secs, 30);
    }

    #[test]
    fn default_config_no_warnings() {
        let cfg = Config::default();
        let warnings = cfg.validate();
        assert!(warnings.is_empty(), "unexpected warnings: {:?}", warnings);
    }

    #[test]
    fn underivable_core_path_warns() {
        let mut cfg = Config::default();
        cfg.transcode.core_path = "/opt/engine/core.js".into();
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.contains("wasm_path")));
        assert!(warnings.iter().any(|w| w.contains("worker_path")));

        cfg.transcode.wasm_path = Some("/opt/engine/core.wasm".into());
        cfg.transcode.worker_path = Some("/opt/engine/core.worker.js".into());
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn empty_main_name_warns() {
        let mut cfg = Config::default();
        cfg.transcode.main_name = String::new();
        assert!(cfg.validate().iter().any(|w| w.contains("main_name")));
    }

    #[test]
    fn parse_json_config() {
        let json = r#"{"transcode": {"log": true, "main_name": "main"}}"#;
        let cfg = Config::from_json(json).unwrap();
        assert!(cfg.transcode.log);
        assert_eq!(cfg.transcode.main_name, "main");
        assert_eq!(cfg.transcode.core_path, default_core_path());
    }

    #[test]
    fn parse_empty_json_uses_defaults() {
        let cfg = Config::from_json("{}").unwrap();
        assert_eq!(cfg.transcode.main_name, DEFAULT_MAIN_NAME);
        assert_eq!(cfg.media.images_endpoint, "images/");
    }

    #[test]
    fn parse_invalid_json_is_validation_error() {
        let err = Config::from_json("{not json").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn load_or_default_with_missing_file() {
        let cfg = Config::load_or_default(Some(Path::new("/nonexistent/config.json")));
        assert_eq!(cfg.transcode.main_name, DEFAULT_MAIN_NAME);
    }

    #[test]
    fn strict_load_reports_missing_file() {
        let err = Config::load(Path::new("/nonexistent/config.json")).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn endpoint_url_joins_slashes() {
        let media = MediaConfig {
            api_base_url: "http://cms.test/api/v2/".into(),
            ..MediaConfig::default()
        };
        assert_eq!(
            media.endpoint_url("/images/"),
            "http://cms.test/api/v2/images/"
        );
    }
}
