//! Error type shared by the repository backends, nodes and the FUSE adapter.

use thiserror::Error;

/// Boxed error from a repository backend (libgit2, I/O, ...).
pub type BackendError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Everything that can go wrong while resolving or reading the mounted tree.
#[derive(Debug, Error)]
pub enum GitfsError {
    /// No reference, commit or tree entry with this name.
    #[error("not found: {0}")]
    NotFound(String),

    /// The backing store failed (corrupt object, missing pack data, I/O).
    #[error("{context}: {source}")]
    Backend {
        context: String,
        #[source]
        source: BackendError,
    },

    /// Directory operation on a file node.
    #[error("not a directory")]
    NotADirectory,

    /// File operation on a directory node.
    #[error("is a directory")]
    IsADirectory,

    /// The protocol layer broke the handle contract (e.g. read after release).
    #[error("protocol misuse: {0}")]
    ProtocolMisuse(String),
}

impl GitfsError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn backend(context: impl Into<String>, source: impl Into<BackendError>) -> Self {
        Self::Backend {
            context: context.into(),
            source: source.into(),
        }
    }

    /// True for failures of the repository itself, as opposed to missing names.
    ///
    /// Both surface as "no such entry" to the kernel; this lets callers log them
    /// at a different level.
    pub fn is_backend_failure(&self) -> bool {
        matches!(self, Self::Backend { .. })
    }

    /// The errno reported to the kernel for this error.
    #[cfg(feature = "native")]
    pub fn errno(&self) -> i32 {
        match self {
            Self::NotFound(_) | Self::Backend { .. } => libc::ENOENT,
            Self::NotADirectory => libc::ENOTDIR,
            Self::IsADirectory => libc::EISDIR,
            Self::ProtocolMisuse(_) => libc::EBADF,
        }
    }
}

pub type Result<T> = std::result::Result<T, GitfsError>;
