//! Directory creation.

use std::fs;
use std::path::Path;

use super::error::PathError;

/// Ensure `path` exists as a directory, creating it (and parents) if missing.
pub fn ensure_directory(path: &Path) -> Result<(), PathError> {
    if path.as_os_str().is_empty() {
        return Err(PathError::EmptyPath);
    }

    if path.exists() {
        if !path.is_dir() {
            return Err(PathError::NotADirectory(path.to_path_buf()));
        }
        return Ok(());
    }

    fs::create_dir_all(path).map_err(|e| PathError::CreateFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    tracing::debug!(path = %path.display(), "Created directory");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_directory_creates_nested() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a").join("b");
        ensure_directory(&nested).unwrap();
        assert!(nested.is_dir());
        // Idempotent
        ensure_directory(&nested).unwrap();
    }

    #[test]
    fn test_ensure_directory_rejects_file() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("not-a-dir");
        fs::write(&file, b"x").unwrap();
        assert!(matches!(
            ensure_directory(&file),
            Err(PathError::NotADirectory(_))
        ));
    }

    #[test]
    fn test_ensure_directory_rejects_empty() {
        assert!(matches!(
            ensure_directory(Path::new("")),
            Err(PathError::EmptyPath)
        ));
    }
}
