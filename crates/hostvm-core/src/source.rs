//! Script and library source access

use crate::error::SourceError;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Reads script source text
pub trait SourceProvider: Send + Sync {
    /// Read the whole file at `path`
    fn read_source(&self, path: &Path) -> Result<String, SourceError>;
}

/// Reads sources from the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSourceProvider;

impl SourceProvider for FsSourceProvider {
    fn read_source(&self, path: &Path) -> Result<String, SourceError> {
        debug!(path = %path.display(), "reading source");
        std::fs::read_to_string(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => SourceError::NotFound(path.to_path_buf()),
            _ => SourceError::Unreadable {
                path: path.to_path_buf(),
                source: e,
            },
        })
    }
}

/// Where a user library's source comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LibrarySource {
    /// Source text held by the host
    Inline(String),
    /// Source file read at load time
    File(PathBuf),
}

impl LibrarySource {
    /// Produce the source text
    pub fn read(&self, provider: &dyn SourceProvider) -> Result<String, SourceError> {
        match self {
            LibrarySource::Inline(text) => Ok(text.clone()),
            LibrarySource::File(path) => provider.read_source(path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_fs_provider_reads_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "def main\nend\n").unwrap();
        let text = FsSourceProvider.read_source(file.path()).unwrap();
        assert_eq!(text, "def main\nend\n");
    }

    #[test]
    fn test_fs_provider_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.dart");
        let err = FsSourceProvider.read_source(&missing).unwrap_err();
        assert!(matches!(err, SourceError::NotFound(ref p) if *p == missing));
        assert!(err.to_string().starts_with("Unable to read file"));
    }

    #[test]
    fn test_library_source() {
        let inline = LibrarySource::Inline("#library('x');".into());
        assert_eq!(inline.read(&FsSourceProvider).unwrap(), "#library('x');");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lib.dart");
        std::fs::write(&path, "body").unwrap();
        assert_eq!(LibrarySource::File(path).read(&FsSourceProvider).unwrap(), "body");
    }
}
