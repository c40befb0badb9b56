use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use super::{FileCollection, FileEntry, MatchPath, ValidFlag, ensure_valid, find_entry};
use crate::error::{Result, ZipError};
use crate::io::{LocalFileReader, ReadAt, ReadAtCursor};
use crate::zip::{CentralDirectoryEntry, CompressionMethod, ZipInputStream, ZipParser};

/// A member of a [`ZipFile`]: its central directory record, tied to the
/// archive it came from. Becomes invalid when that archive is closed.
#[derive(Debug, Clone)]
pub struct ZipEntry {
    record: CentralDirectoryEntry,
    valid: ValidFlag,
}

impl ZipEntry {
    pub fn record(&self) -> &CentralDirectoryEntry {
        &self.record
    }

    pub fn into_record(self) -> CentralDirectoryEntry {
        self.record
    }
}

impl FileEntry for ZipEntry {
    fn name(&self) -> &str {
        FileEntry::name(&self.record)
    }

    fn size(&self) -> u64 {
        FileEntry::size(&self.record)
    }

    fn is_directory(&self) -> bool {
        FileEntry::is_directory(&self.record)
    }

    fn is_valid(&self) -> bool {
        self.valid.get() && FileEntry::is_valid(&self.record)
    }

    fn unix_time(&self) -> i64 {
        FileEntry::unix_time(&self.record)
    }

    fn compressed_size(&self) -> u64 {
        FileEntry::compressed_size(&self.record)
    }

    fn method(&self) -> CompressionMethod {
        FileEntry::method(&self.record)
    }

    fn crc32(&self) -> Option<u32> {
        FileEntry::crc32(&self.record)
    }

    fn comment(&self) -> &str {
        FileEntry::comment(&self.record)
    }
}

/// The members of a ZIP archive as a [`FileCollection`].
///
/// Entries come from the central directory. If the source has no
/// end-of-central-directory record, the local headers are scanned from the
/// start instead. Each opened stream reads through its own cursor over the
/// shared source.
pub struct ZipFile<R: ReadAt> {
    reader: Arc<R>,
    name: String,
    entries: Vec<ZipEntry>,
    comment: String,
    valid: ValidFlag,
}

/// The copy gets its own validity: closing one side leaves the other, and
/// the entries it hands out, usable.
impl<R: ReadAt> Clone for ZipFile<R> {
    fn clone(&self) -> Self {
        let valid = self.valid.fork();
        let entries = self
            .entries
            .iter()
            .map(|entry| ZipEntry {
                record: entry.record.clone(),
                valid: valid.clone(),
            })
            .collect();
        Self {
            reader: Arc::clone(&self.reader),
            name: self.name.clone(),
            entries,
            comment: self.comment.clone(),
            valid,
        }
    }
}

impl ZipFile<LocalFileReader> {
    /// Open an archive on the local filesystem.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let reader = LocalFileReader::new(path)?;
        Self::new(Arc::new(reader), &path.to_string_lossy())
    }
}

impl<R: ReadAt> ZipFile<R> {
    /// Read the index of the archive held by a positional source.
    ///
    /// # Arguments
    ///
    /// * `reader` - The archive bytes. Streams opened later share it.
    /// * `name` - Label used in log events and error messages.
    ///
    /// # Returns
    ///
    /// A valid collection over the central directory, or over the local
    /// headers when the source has no end-of-central-directory record.
    pub fn new(reader: Arc<R>, name: &str) -> Result<Self> {
        let parser = ZipParser::new(Arc::clone(&reader));
        let (entries, comment) = match parser.list_files()? {
            Some((entries, eocd)) => (entries, eocd.comment),
            None => {
                warn!(archive = name, "no end of central directory record, scanning local headers");
                let entries = parser.scan_local_headers()?;
                if entries.is_empty() {
                    return Err(ZipError::format(format!("{name} is not a ZIP archive")));
                }
                (entries, String::new())
            }
        };
        debug!(archive = name, entries = entries.len(), "opened archive");
        let valid = ValidFlag::new(true);
        let entries = entries
            .into_iter()
            .map(|record| ZipEntry {
                record,
                valid: valid.clone(),
            })
            .collect();
        Ok(Self {
            reader,
            name: name.to_string(),
            entries,
            comment,
            valid,
        })
    }

    /// Archive comment from the end-of-central-directory record.
    pub fn comment(&self) -> &str {
        &self.comment
    }

    /// Reader for one member's data. The local header is checked against
    /// the directory record before any data is returned.
    fn open_entry(&self, entry: &ZipEntry) -> Result<ZipInputStream<ReadAtCursor<R>>> {
        let record = entry.record();
        let cursor = ReadAtCursor::new(Arc::clone(&self.reader), record.local_header_offset());
        ZipInputStream::open_with(cursor, record)
    }
}

impl<R: ReadAt + 'static> FileCollection for ZipFile<R> {
    type Entry = ZipEntry;

    fn name(&self) -> &str {
        &self.name
    }

    fn is_valid(&self) -> bool {
        self.valid.get()
    }

    fn entries(&mut self) -> Result<&[ZipEntry]> {
        ensure_valid(&self.valid, &self.name)?;
        Ok(&self.entries)
    }

    fn get_entry(&mut self, name: &str, mode: MatchPath) -> Result<Option<ZipEntry>> {
        ensure_valid(&self.valid, &self.name)?;
        Ok(find_entry(&self.entries, name, mode).cloned())
    }

    fn input_stream(&mut self, name: &str, mode: MatchPath) -> Result<Option<Box<dyn Read + '_>>> {
        ensure_valid(&self.valid, &self.name)?;
        let Some(entry) = find_entry(&self.entries, name, mode) else {
            return Ok(None);
        };
        let stream = self.open_entry(entry)?;
        Ok(Some(Box::new(stream)))
    }

    fn close(&mut self) {
        self.valid.clear();
    }

    fn clone_box(&self) -> Box<dyn FileCollection<Entry = ZipEntry>> {
        Box::new(self.clone())
    }
}
