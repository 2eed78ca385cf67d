//! Path utilities for rollcall data directories.
//!
//! - Returns `PathBuf` and `PathError` for clear error handling
//! - The voice cache lives under the platform data directory; hosts may
//!   override it through configuration

mod ensure;
mod error;

pub use ensure::ensure_directory;
pub use error::PathError;

use std::path::PathBuf;

/// Directory name under the platform data directory.
const APP_DIR: &str = "rollcall";

/// Cache directory name under the application directory.
const VOICE_CACHE_DIR: &str = "voice_cache";

/// Default location of the on-disk voice cache.
///
/// Resolves to `<data_local_dir>/rollcall/voice_cache`, e.g.
/// `~/.local/share/rollcall/voice_cache` on Linux.
pub fn default_voice_cache_dir() -> Result<PathBuf, PathError> {
    let data_dir = dirs::data_local_dir().ok_or(PathError::NoDataDir)?;
    Ok(data_dir.join(APP_DIR).join(VOICE_CACHE_DIR))
}
