//! Entry collections: a uniform view over "a set of named byte streams".
//!
//! A [`FileCollection`] enumerates entries, looks them up by name and opens
//! a reader for one. Two sources are provided:
//!
//! - [`ZipFile`]: the members of an archive, read through its central
//!   directory
//! - [`DirectoryCollection`]: the files under a directory, walked lazily
//!
//! Once a collection is closed every operation fails with
//! [`ZipError::InvalidState`](crate::ZipError::InvalidState); none of them
//! quietly return an empty result. Entries handed out earlier report
//! `is_valid() == false` from then on.

mod directory;
mod zip_file;

pub use directory::{DirEntry, DirectoryCollection};
pub use zip_file::{ZipEntry, ZipFile};

use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Result, ZipError};
use crate::zip::{CentralDirectoryEntry, CompressionMethod, LocalEntry};

/// How [`FileCollection::get_entry`] compares names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MatchPath {
    /// The full path must match.
    #[default]
    Exact,
    /// Only the last path component is compared.
    FileName,
}

/// Read-only metadata shared by every kind of entry.
pub trait FileEntry {
    /// Full path inside the collection, `/`-separated.
    fn name(&self) -> &str;

    /// Uncompressed size in bytes.
    fn size(&self) -> u64;

    fn is_directory(&self) -> bool;

    fn is_valid(&self) -> bool;

    /// Modification time in seconds since the Unix epoch.
    fn unix_time(&self) -> i64;

    fn file_name(&self) -> &str {
        self.name()
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
    }

    fn compressed_size(&self) -> u64 {
        self.size()
    }

    fn method(&self) -> CompressionMethod {
        CompressionMethod::Stored
    }

    /// CRC-32 of the data, when the source records one.
    fn crc32(&self) -> Option<u32> {
        None
    }

    fn comment(&self) -> &str {
        ""
    }
}

impl FileEntry for LocalEntry {
    fn name(&self) -> &str {
        LocalEntry::name(self)
    }

    fn size(&self) -> u64 {
        LocalEntry::size(self)
    }

    fn is_directory(&self) -> bool {
        LocalEntry::is_directory(self)
    }

    fn is_valid(&self) -> bool {
        LocalEntry::is_valid(self)
    }

    fn unix_time(&self) -> i64 {
        LocalEntry::unix_time(self)
    }

    fn compressed_size(&self) -> u64 {
        LocalEntry::compressed_size(self)
    }

    fn method(&self) -> CompressionMethod {
        LocalEntry::method(self)
    }

    fn crc32(&self) -> Option<u32> {
        Some(LocalEntry::crc32(self))
    }
}

impl FileEntry for CentralDirectoryEntry {
    fn name(&self) -> &str {
        self.local().name()
    }

    fn size(&self) -> u64 {
        self.local().size()
    }

    fn is_directory(&self) -> bool {
        self.local().is_directory()
    }

    fn is_valid(&self) -> bool {
        self.local().is_valid()
    }

    fn unix_time(&self) -> i64 {
        self.local().unix_time()
    }

    fn compressed_size(&self) -> u64 {
        self.local().compressed_size()
    }

    fn method(&self) -> CompressionMethod {
        self.local().method()
    }

    fn crc32(&self) -> Option<u32> {
        Some(self.local().crc32())
    }

    fn comment(&self) -> &str {
        CentralDirectoryEntry::comment(self)
    }
}

/// A set of named entries that can each be opened for reading.
///
/// Accessors take `&mut self` because collections may populate their entry
/// list on first use.
pub trait FileCollection {
    type Entry: FileEntry + Clone;

    /// Path the collection was opened from.
    fn name(&self) -> &str;

    /// False once the collection is closed or if it could not be opened.
    fn is_valid(&self) -> bool;

    /// All entries, in the collection's natural order.
    fn entries(&mut self) -> Result<&[Self::Entry]>;

    /// Look up one entry. A missing name is `Ok(None)`, not an error.
    fn get_entry(&mut self, name: &str, mode: MatchPath) -> Result<Option<Self::Entry>>;

    /// Open the named entry's data. A missing name is `Ok(None)`.
    fn input_stream(&mut self, name: &str, mode: MatchPath) -> Result<Option<Box<dyn Read + '_>>>;

    /// Number of entries.
    fn size(&mut self) -> Result<usize> {
        Ok(self.entries()?.len())
    }

    /// Invalidate the collection. Idempotent.
    fn close(&mut self);

    /// An independent copy behind a trait object.
    fn clone_box(&self) -> Box<dyn FileCollection<Entry = Self::Entry>>;
}

/// First entry in `entries` matching `name` under `mode`.
pub(crate) fn find_entry<'a, E: FileEntry>(entries: &'a [E], name: &str, mode: MatchPath) -> Option<&'a E> {
    match mode {
        MatchPath::Exact => entries.iter().find(|entry| entry.name() == name),
        MatchPath::FileName => entries.iter().find(|entry| entry.file_name() == name),
    }
}

/// Validity shared by a collection and every entry it has handed out.
/// Clones share the flag; [`fork`](Self::fork) starts an independent one.
#[derive(Debug, Clone)]
pub(crate) struct ValidFlag(Arc<AtomicBool>);

impl ValidFlag {
    pub(crate) fn new(valid: bool) -> Self {
        Self(Arc::new(AtomicBool::new(valid)))
    }

    pub(crate) fn get(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub(crate) fn clear(&self) {
        self.0.store(false, Ordering::Release);
    }

    pub(crate) fn fork(&self) -> Self {
        Self::new(self.get())
    }
}

pub(crate) fn ensure_valid(valid: &ValidFlag, name: &str) -> Result<()> {
    if valid.get() {
        Ok(())
    } else {
        Err(ZipError::state(format!("collection {name} is closed or invalid")))
    }
}
