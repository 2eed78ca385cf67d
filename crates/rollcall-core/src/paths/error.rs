use std::path::PathBuf;

/// Failure to resolve or prepare the voice cache directory.
#[derive(Debug, thiserror::Error)]
pub enum PathError {
    /// The platform reports no local data directory (e.g. no `$HOME`).
    #[error("No local data directory available for the voice cache")]
    NoDataDir,

    #[error("Voice cache path {0} is occupied by a non-directory")]
    NotADirectory(PathBuf),

    #[error("Could not create voice cache directory {path}: {reason}")]
    CreateFailed { path: PathBuf, reason: String },

    #[error("Voice cache path is empty")]
    EmptyPath,
}
