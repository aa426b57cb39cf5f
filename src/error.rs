// ─────────────────────────────────────────────────────────────────────────────
//  autogen-init :: error
// ─────────────────────────────────────────────────────────────────────────────

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::generator::GenKind;

#[derive(Debug, Error)]
pub enum AutogenError {
    #[error("{generator} executable not found: {tool}\n  Hint: set `{generator}.executable` or AUTOGEN_QT_BIN")]
    ToolNotFound { generator: GenKind, tool: String, required: bool },

    #[error("malformed resource manifest {}: {reason}", .path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("classification conflict for {}: {reason}", .path.display())]
    ClassificationConflict { path: PathBuf, reason: String },

    #[error("cannot write settings file {}: {source}", .path.display())]
    SettingsWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("source file not found: {}", .0.display())]
    MissingSource(PathBuf),

    #[error("cannot read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid target description: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AutogenError {
    /// True when the error must abort the whole target's initialization.
    ///
    /// A missing optional tool only disables its generator and a malformed
    /// manifest only drops that manifest's step; everything else is fatal.
    pub fn is_fatal(&self) -> bool {
        match self {
            AutogenError::ToolNotFound { required, .. } => *required,
            AutogenError::Parse { .. } => false,
            _ => true,
        }
    }

    /// The file the error is about, if any.
    pub fn path(&self) -> Option<&Path> {
        match self {
            AutogenError::Parse { path, .. }
            | AutogenError::ClassificationConflict { path, .. }
            | AutogenError::SettingsWrite { path, .. }
            | AutogenError::Read { path, .. }
            | AutogenError::MissingSource(path) => Some(path),
            _ => None,
        }
    }

    /// Map a failed read of `path`; a missing file is a `MissingSource`.
    pub fn read(path: &Path, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::NotFound => AutogenError::MissingSource(path.to_path_buf()),
            _ => AutogenError::Read { path: path.to_path_buf(), source },
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        AutogenError::Config(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, AutogenError>;
