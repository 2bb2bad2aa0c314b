//! Virtual filesystem operations forwarded to the engine.

use bytes::Bytes;

/// An operation on the engine's in-memory filesystem. Names follow the
/// engine's own (`readFile`, `readdir`, ...).
#[derive(Debug, Clone, PartialEq)]
pub enum FsOp {
    ReadFile { path: String },
    WriteFile { path: String, data: Bytes },
    ReadDir { path: String },
    Unlink { path: String },
    MkDir { path: String },
    RmDir { path: String },
    Rename { from: String, to: String },
    Exists { path: String },
}

/// Result of a successful [`FsOp`].
#[derive(Debug, Clone, PartialEq)]
pub enum FsOutput {
    Unit,
    Data(Bytes),
    Entries(Vec<String>),
    Exists(bool),
}

impl FsOp {
    pub fn name(&self) -> &'static str {
        match self {
            FsOp::ReadFile { .. } => "readFile",
            FsOp::WriteFile { .. } => "writeFile",
            FsOp::ReadDir { .. } => "readdir",
            FsOp::Unlink { .. } => "unlink",
            FsOp::MkDir { .. } => "mkdir",
            FsOp::RmDir { .. } => "rmdir",
            FsOp::Rename { .. } => "rename",
            FsOp::Exists { .. } => "exists",
        }
    }

    /// The primary path the operation acts on.
    pub fn path(&self) -> &str {
        match self {
            FsOp::ReadFile { path }
            | FsOp::WriteFile { path, .. }
            | FsOp::ReadDir { path }
            | FsOp::Unlink { path }
            | FsOp::MkDir { path }
            | FsOp::RmDir { path }
            | FsOp::Exists { path } => path,
            FsOp::Rename { from, .. } => from,
        }
    }

    /// Arguments rendered for the log; binary payloads are summarized.
    pub fn describe_args(&self) -> String {
        match self {
            FsOp::WriteFile { path, data } => {
                format!("{path} <{} bytes binary file>", data.len())
            }
            FsOp::Rename { from, to } => format!("{from} {to}"),
            other => other.path().to_string(),
        }
    }

    /// The error reported to callers when the native operation fails.
    /// Native errors are not actionable, so this says what to check.
    pub fn failure(&self) -> sf_core::Error {
        let hint = match self {
            FsOp::ReadDir { .. } => {
                "directory listing failed; check that the directory exists, e.g. readdir('/')"
                    .to_string()
            }
            FsOp::ReadFile { .. } => "file read failed; check that the file exists".to_string(),
            FsOp::WriteFile { .. } => {
                "file write failed; check that the parent directory exists".to_string()
            }
            other => format!("something went wrong in the {} operation", other.name()),
        };
        sf_core::Error::filesystem(self.name(), self.path(), hint)
    }
}

impl FsOutput {
    pub fn into_data(self) -> Option<Bytes> {
        match self {
            FsOutput::Data(b) => Some(b),
            _ => None,
        }
    }

    pub fn into_entries(self) -> Option<Vec<String>> {
        match self {
            FsOutput::Entries(e) => Some(e),
            _ => None,
        }
    }
}
