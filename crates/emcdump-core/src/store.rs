//! Write-once storage for extracted firmware payloads.
//!
//! Artifacts are keyed by their derived file name. The first payload stored
//! under a name wins and later ones are skipped, regardless of content.
//! Payloads are staged in a temporary file inside the output directory and
//! linked into place without clobbering, so the existence check and the
//! write are a single atomic step and a partially written artifact is never
//! visible under its final name.

use crate::error::{Error, Result};
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Default output directory, relative to the working directory
pub const DEFAULT_OUTPUT_DIR: &str = "EMC";

/// Outcome of [`ArtifactStore::persist`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Persisted {
    /// The payload was written to this path
    Written(PathBuf),
    /// An artifact with the same name already existed at this path
    Skipped(PathBuf),
}

impl Persisted {
    /// Final path of the artifact
    pub fn path(&self) -> &Path {
        match self {
            Self::Written(path) | Self::Skipped(path) => path,
        }
    }

    /// Returns true if this call wrote the artifact
    pub fn is_written(&self) -> bool {
        matches!(self, Self::Written(_))
    }
}

/// Output directory for extracted payloads
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    /// Creates a store rooted at `dir`. The directory is created lazily.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Output directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path an artifact named `name` would be stored at
    pub fn artifact_path(&self, name: &str) -> Result<PathBuf> {
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.dir.join(name)),
            _ => Err(Error::path_traversal(self.dir.join(name))),
        }
    }

    /// Stores `bytes` under `name` unless an artifact with that name exists
    pub fn persist(&self, bytes: &[u8], name: &str) -> Result<Persisted> {
        let target = self.artifact_path(name)?;

        std::fs::create_dir_all(&self.dir).map_err(|e| Error::directory_create(&self.dir, e))?;

        if target.exists() {
            debug!("Artifact already present: {}", target.display());
            return Ok(Persisted::Skipped(target));
        }

        let mut staged =
            NamedTempFile::new_in(&self.dir).map_err(|e| Error::file_write(&self.dir, e))?;
        staged
            .write_all(bytes)
            .and_then(|()| staged.flush())
            .map_err(|e| Error::file_write(staged.path(), e))?;

        match staged.persist_noclobber(&target) {
            Ok(_) => {
                debug!("Wrote {} bytes to {}", bytes.len(), target.display());
                Ok(Persisted::Written(target))
            }
            // Lost a race against another writer of the same name
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
                debug!("Artifact appeared concurrently: {}", target.display());
                Ok(Persisted::Skipped(target))
            }
            Err(e) => Err(Error::file_write(&target, e.error)),
        }
    }
}

impl Default for ArtifactStore {
    fn default() -> Self {
        Self::new(DEFAULT_OUTPUT_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_persist_creates_directory() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path().join("EMC"));

        let outcome = store.persist(b"payload", "a.bin").unwrap();
        assert!(outcome.is_written());
        assert_eq!(outcome.path(), temp.path().join("EMC").join("a.bin"));
        assert_eq!(std::fs::read(outcome.path()).unwrap(), b"payload");
    }

    #[test]
    fn test_persist_same_name_twice_keeps_first() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path());

        let first = store.persist(b"first", "dup.bin").unwrap();
        let second = store.persist(b"second", "dup.bin").unwrap();

        assert!(first.is_written());
        assert_eq!(second, Persisted::Skipped(temp.path().join("dup.bin")));
        assert_eq!(std::fs::read(temp.path().join("dup.bin")).unwrap(), b"first");
    }

    #[test]
    fn test_persist_leaves_no_staging_files() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path());

        store.persist(b"one", "x.bin").unwrap();
        store.persist(b"two", "x.bin").unwrap();

        let entries: Vec<_> = std::fs::read_dir(temp.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_persist_concurrent_same_name() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path());

        let written = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8u8)
                .map(|i| {
                    let store = &store;
                    scope.spawn(move || store.persist(&[i; 64], "race.bin").unwrap())
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(Persisted::is_written)
                .count()
        });

        assert_eq!(written, 1);
        assert_eq!(std::fs::read(temp.path().join("race.bin")).unwrap().len(), 64);
    }

    #[test]
    fn test_rejects_traversal() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path());

        for name in ["../escape.bin", "nested/a.bin", "/abs.bin", "", ".."] {
            let err = store.persist(b"x", name).unwrap_err();
            assert!(matches!(err, Error::PathTraversal { .. }), "{name}");
        }
    }
}
