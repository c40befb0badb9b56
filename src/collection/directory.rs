use std::io::{self, Read};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{FileCollection, FileEntry, MatchPath, ValidFlag, ensure_valid, find_entry};
use crate::error::Result;
use crate::io::{FileMetadata, FileSystem, OsFileSystem};

/// A file (or, in a non-recursive walk, a subdirectory) found under a
/// [`DirectoryCollection`]'s root. Becomes invalid when the collection is
/// closed.
#[derive(Debug, Clone)]
pub struct DirEntry {
    name: String,
    size: u64,
    modified: i64,
    is_dir: bool,
    valid: ValidFlag,
}

impl DirEntry {
    /// `rel` is the `/`-separated path below the root.
    fn new(rel: &str, meta: FileMetadata, valid: ValidFlag) -> Self {
        let name = if meta.is_dir {
            format!("{rel}/")
        } else {
            rel.to_string()
        };
        Self {
            name,
            size: meta.size,
            modified: meta.modified,
            is_dir: meta.is_dir,
            valid,
        }
    }

    /// Path below the root, without the directory marker.
    fn rel_path(&self) -> &str {
        self.name.trim_end_matches('/')
    }
}

impl FileEntry for DirEntry {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn is_directory(&self) -> bool {
        self.is_dir
    }

    fn is_valid(&self) -> bool {
        self.valid.get()
    }

    fn unix_time(&self) -> i64 {
        self.modified
    }
}

#[derive(Debug, Clone)]
enum LoadState {
    NotLoaded,
    Loaded(Vec<DirEntry>),
}

/// The files under a directory as a [`FileCollection`].
///
/// The tree is walked on first use of `entries()`, `size()` or a
/// [`MatchPath::FileName`] lookup, unless `load_now` asks for it up front.
/// Exact-name lookups made before that stat the single path instead.
///
/// A recursive walk lists files only, with paths relative to the root; a
/// non-recursive walk lists the root's immediate children, subdirectories
/// included (with a trailing `/`).
#[derive(Debug)]
pub struct DirectoryCollection<F: FileSystem = OsFileSystem> {
    root: PathBuf,
    name: String,
    recursive: bool,
    fs: F,
    state: LoadState,
    valid: ValidFlag,
}

/// The copy gets its own validity, and so do the entries it caches.
impl<F: FileSystem + Clone> Clone for DirectoryCollection<F> {
    fn clone(&self) -> Self {
        let valid = self.valid.fork();
        let state = match &self.state {
            LoadState::NotLoaded => LoadState::NotLoaded,
            LoadState::Loaded(entries) => LoadState::Loaded(
                entries
                    .iter()
                    .map(|entry| DirEntry {
                        valid: valid.clone(),
                        ..entry.clone()
                    })
                    .collect(),
            ),
        };
        Self {
            root: self.root.clone(),
            name: self.name.clone(),
            recursive: self.recursive,
            fs: self.fs.clone(),
            state,
            valid,
        }
    }
}

impl DirectoryCollection {
    /// Open the tree under `path` on the local filesystem.
    ///
    /// # Arguments
    ///
    /// * `path` - Root directory. Entry names are relative to it.
    /// * `recursive` - Walk subdirectories and list only files, instead of
    ///   listing the root's immediate children.
    /// * `load_now` - Walk the tree now rather than on first use.
    ///
    /// # Returns
    ///
    /// The collection, which is invalid if `path` is not a directory. Fails
    /// only if `load_now` is set and the walk fails.
    pub fn new(path: impl AsRef<Path>, recursive: bool, load_now: bool) -> Result<Self> {
        Self::with_file_system(OsFileSystem, path, recursive, load_now)
    }
}

impl<F: FileSystem> DirectoryCollection<F> {
    /// A collection over `path` as seen through `fs`. If `path` is not a
    /// directory the collection is created invalid.
    pub fn with_file_system(fs: F, path: impl AsRef<Path>, recursive: bool, load_now: bool) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        let valid = ValidFlag::new(fs.is_dir(&root));
        let mut collection = Self {
            name: root.to_string_lossy().into_owned(),
            root,
            recursive,
            fs,
            state: LoadState::NotLoaded,
            valid,
        };
        if collection.valid.get() && load_now {
            collection.load()?;
        }
        Ok(collection)
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state, LoadState::Loaded(_))
    }

    pub fn recursive(&self) -> bool {
        self.recursive
    }

    fn load(&mut self) -> Result<&[DirEntry]> {
        if !self.is_loaded() {
            let mut entries = Vec::new();
            self.walk("", &mut entries)?;
            debug!(root = %self.root.display(), entries = entries.len(), "loaded directory");
            self.state = LoadState::Loaded(entries);
        }
        match &self.state {
            LoadState::Loaded(entries) => Ok(entries),
            LoadState::NotLoaded => Ok(&[]),
        }
    }

    fn walk(&self, prefix: &str, out: &mut Vec<DirEntry>) -> Result<()> {
        for name in self.fs.list_dir(&self.root.join(prefix))? {
            if name == "." || name == ".." {
                continue;
            }
            let rel = if prefix.is_empty() {
                name
            } else {
                format!("{prefix}/{name}")
            };
            let meta = self.fs.metadata(&self.root.join(&rel))?;
            if meta.is_dir && self.recursive {
                self.walk(&rel, out)?;
            } else {
                out.push(DirEntry::new(&rel, meta, self.valid.clone()));
            }
        }
        Ok(())
    }

    /// Look up `name` without walking the tree. Only finds what a walk
    /// would have found under the same name.
    fn stat_entry(&self, name: &str) -> Result<Option<DirEntry>> {
        let rel = name.trim_end_matches('/');
        let unsafe_component = |part: &str| part.is_empty() || part == "." || part == "..";
        if rel.is_empty() || rel.split('/').any(unsafe_component) || Path::new(rel).is_absolute() {
            return Ok(None);
        }
        if !self.recursive && rel.contains('/') {
            return Ok(None);
        }
        let meta = match self.fs.metadata(&self.root.join(rel)) {
            Ok(meta) => meta,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        if meta.is_dir && self.recursive {
            return Ok(None);
        }
        let entry = DirEntry::new(rel, meta, self.valid.clone());
        Ok((entry.name == name).then_some(entry))
    }

    fn lookup(&mut self, name: &str, mode: MatchPath) -> Result<Option<DirEntry>> {
        ensure_valid(&self.valid, &self.name)?;
        if mode == MatchPath::Exact && !self.is_loaded() {
            return self.stat_entry(name);
        }
        let entries = self.load()?;
        Ok(find_entry(entries, name, mode).cloned())
    }
}

impl<F: FileSystem + Clone + 'static> FileCollection for DirectoryCollection<F> {
    type Entry = DirEntry;

    fn name(&self) -> &str {
        &self.name
    }

    fn is_valid(&self) -> bool {
        self.valid.get()
    }

    fn entries(&mut self) -> Result<&[DirEntry]> {
        ensure_valid(&self.valid, &self.name)?;
        self.load()
    }

    fn get_entry(&mut self, name: &str, mode: MatchPath) -> Result<Option<DirEntry>> {
        self.lookup(name, mode)
    }

    fn input_stream(&mut self, name: &str, mode: MatchPath) -> Result<Option<Box<dyn Read + '_>>> {
        let Some(entry) = self.lookup(name, mode)? else {
            return Ok(None);
        };
        if entry.is_dir {
            return Ok(Some(Box::new(io::empty())));
        }
        let file = self.fs.open(&self.root.join(entry.rel_path()))?;
        Ok(Some(file))
    }

    fn close(&mut self) {
        self.valid.clear();
    }

    fn clone_box(&self) -> Box<dyn FileCollection<Entry = DirEntry>> {
        Box::new(self.clone())
    }
}
