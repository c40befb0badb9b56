//! Filesystem primitives used by the directory-backed collection.
//!
//! The collection only needs three things from the host: list the immediate
//! children of a directory, stat a path, and open a file for reading.
//! Keeping them behind [`FileSystem`] lets callers substitute their own
//! implementation (and lets tests observe exactly when the tree is walked).

use std::fs;
use std::io::{self, Read};
use std::path::Path;
use std::time::UNIX_EPOCH;

/// Attributes the collection synthesizes entry metadata from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMetadata {
    pub is_dir: bool,
    pub size: u64,
    /// Modification time in seconds since the Unix epoch.
    pub modified: i64,
}

pub trait FileSystem {
    /// Names of the immediate children of `path`, excluding `.` and `..`.
    fn list_dir(&self, path: &Path) -> io::Result<Vec<String>>;

    fn metadata(&self, path: &Path) -> io::Result<FileMetadata>;

    fn open(&self, path: &Path) -> io::Result<Box<dyn Read>>;

    fn is_dir(&self, path: &Path) -> bool {
        self.metadata(path).is_ok_and(|meta| meta.is_dir)
    }
}

/// [`FileSystem`] backed by `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn list_dir(&self, path: &Path) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        // read_dir order is platform dependent
        names.sort();
        Ok(names)
    }

    fn metadata(&self, path: &Path) -> io::Result<FileMetadata> {
        let meta = fs::metadata(path)?;
        let modified = meta
            .modified()
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map(|age| age.as_secs() as i64)
            .unwrap_or(0);
        Ok(FileMetadata {
            is_dir: meta.is_dir(),
            size: if meta.is_dir() { 0 } else { meta.len() },
            modified,
        })
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn Read>> {
        Ok(Box::new(io::BufReader::new(fs::File::open(path)?)))
    }
}
