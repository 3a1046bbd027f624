use std::path::{Path, PathBuf};
use std::sync::Mutex;

use indexmap::IndexMap;
use thiserror::Error;

/// Read access to the files an assembly pulls in: includes, binary blobs,
/// patches and text tables.
pub trait AssetFS: Send + Sync {
    fn read(&self, path: &Path) -> Result<Vec<u8>, AssetError>;

    fn read_to_string(&self, path: &Path) -> Result<String, AssetError> {
        let bytes = self.read(path)?;
        String::from_utf8(bytes).map_err(|_| AssetError::NotUtf8 {
            path: path.display().to_string(),
        })
    }

    /// Stable identity of a path, used to detect include cycles.
    fn canonicalize(&self, path: &Path) -> PathBuf {
        path.to_path_buf()
    }
}

#[derive(Debug, Default)]
pub struct StdAssetFS;

impl AssetFS for StdAssetFS {
    fn read(&self, path: &Path) -> Result<Vec<u8>, AssetError> {
        std::fs::read(path).map_err(|source| AssetError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    fn canonicalize(&self, path: &Path) -> PathBuf {
        std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
    }
}

/// In-memory file set, mostly for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryFS {
    files: Mutex<IndexMap<PathBuf, Vec<u8>>>,
}

impl MemoryFS {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        self.insert(path, contents);
        self
    }

    pub fn insert(&self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) {
        let mut files = self.files.lock().unwrap_or_else(|poison| poison.into_inner());
        files.insert(normalize(&path.into()), contents.into());
    }
}

impl AssetFS for MemoryFS {
    fn read(&self, path: &Path) -> Result<Vec<u8>, AssetError> {
        let files = self.files.lock().unwrap_or_else(|poison| poison.into_inner());
        files
            .get(&normalize(path))
            .cloned()
            .ok_or_else(|| AssetError::NotFound {
                path: path.display().to_string(),
            })
    }

    fn canonicalize(&self, path: &Path) -> PathBuf {
        normalize(path)
    }
}

// Drops `.` components so `./a.s` and `a.s` name the same entry.
fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|component| !matches!(component, std::path::Component::CurDir))
        .collect()
}

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("failed to read '{path}'")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("file '{path}' not found")]
    NotFound { path: String },
    #[error("file '{path}' is not valid UTF-8")]
    NotUtf8 { path: String },
    #[error("invalid table entry on line {line}: {message}")]
    InvalidTable { line: usize, message: String },
}
