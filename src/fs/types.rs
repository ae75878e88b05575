//! File Provider Types
//!
//! The trait through which the core touches the filesystem. The evaluator,
//! the bind/search pass and the header scanner only ever need a handful of
//! read-only operations, so the contract stays small and synchronous.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File provider errors
#[derive(Error, Debug, Clone)]
pub enum FsError {
    #[error("ENOENT: no such file or directory, {operation} '{path}'")]
    NotFound { path: String, operation: String },

    #[error("ENOTDIR: not a directory, {operation} '{path}'")]
    NotDirectory { path: String, operation: String },

    #[error("{operation} '{path}': {message}")]
    Io {
        path: String,
        operation: String,
        message: String,
    },
}

impl FsError {
    fn from_io(err: &io::Error, path: &str, operation: &str) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => FsError::NotFound {
                path: path.to_string(),
                operation: operation.to_string(),
            },
            _ => FsError::Io {
                path: path.to_string(),
                operation: operation.to_string(),
                message: err.to_string(),
            },
        }
    }
}

/// Read-only filesystem operations consumed by the core.
pub trait FileProvider: Send + Sync {
    /// Read a file as text. Malformed bytes are replaced, never fatal:
    /// Jam sources and scanned headers must survive stray binary content.
    fn read(&self, path: &str) -> Result<String, FsError>;

    fn exists(&self, path: &str) -> bool;

    fn is_dir(&self, path: &str) -> bool;

    fn is_file(&self, path: &str) -> bool;

    /// Entry names of a directory, sorted for deterministic iteration.
    fn list_dir(&self, path: &str) -> Result<Vec<String>, FsError>;
}

/// File provider backed by the real filesystem.
///
/// Relative paths resolve against `root` when one is set, otherwise against
/// the process working directory. Rooting keeps tests independent of cwd.
#[derive(Debug, Default)]
pub struct RealFs {
    root: Option<PathBuf>,
}

impl RealFs {
    pub fn new() -> Self {
        RealFs { root: None }
    }

    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        RealFs {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        match (&self.root, p.is_absolute()) {
            (Some(root), false) => root.join(p),
            _ => p.to_path_buf(),
        }
    }
}

impl FileProvider for RealFs {
    fn read(&self, path: &str) -> Result<String, FsError> {
        let bytes = fs::read(self.resolve(path))
            .map_err(|e| FsError::from_io(&e, path, "read"))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).exists()
    }

    fn is_dir(&self, path: &str) -> bool {
        self.resolve(path).is_dir()
    }

    fn is_file(&self, path: &str) -> bool {
        self.resolve(path).is_file()
    }

    fn list_dir(&self, path: &str) -> Result<Vec<String>, FsError> {
        let entries = fs::read_dir(self.resolve(path))
            .map_err(|e| FsError::from_io(&e, path, "list_dir"))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| FsError::from_io(&e, path, "list_dir"))?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }
}
