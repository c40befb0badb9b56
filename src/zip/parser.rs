//! Central directory reader.
//!
//! This module reads the archive-wide index from any source that implements
//! the [`ReadAt`] trait.
//!
//! ## Parsing Strategy
//!
//! ZIP files are designed to be read from the end:
//! 1. Find the End of Central Directory (EOCD) at the file's end
//! 2. Read the Central Directory to get metadata for all files
//! 3. For extraction, read each file's Local File Header and data
//!
//! Archives carrying ZIP64 sentinels or spanning several disks are
//! rejected with a format error.

use std::io::Cursor;
use std::sync::Arc;

use tracing::debug;

use crate::error::{Result, ZipError};
use crate::io::{ReadAt, ReadAtCursor};

use super::structures::*;

/// Maximum ZIP comment size allowed by the format (65535 bytes).
///
/// This limits the search area when looking for EOCD with a comment.
const MAX_COMMENT_SIZE: u64 = 65535;

/// Central directory parser over a positional byte source.
///
/// ## Example
///
/// ```ignore
/// let parser = ZipParser::new(reader);
/// let (entries, eocd) = parser.list_files()?;
/// for entry in &entries {
///     println!("{entry}");
/// }
/// ```
pub struct ZipParser<R: ReadAt> {
    /// The underlying data source
    reader: Arc<R>,
    /// Total size of the archive in bytes
    size: u64,
}

impl<R: ReadAt> ZipParser<R> {
    pub fn new(reader: Arc<R>) -> Self {
        let size = reader.size();
        Self { reader, size }
    }

    /// Find and parse the End of Central Directory record.
    ///
    /// Handles both the simple case (no comment) and archives with
    /// comments by searching backwards for the signature.
    ///
    /// # Returns
    ///
    /// A tuple of (EOCD record, offset of EOCD in file), or `None` when the
    /// source holds no EOCD at all.
    pub fn find_eocd(&self) -> Result<Option<(EndOfCentralDirectory, u64)>> {
        let fixed = EndOfCentralDirectory::SIZE as u64;
        if self.size < fixed {
            return Ok(None);
        }

        // First try the simple case where there's no comment.
        let offset = self.size - fixed;
        let mut buf = vec![0u8; EndOfCentralDirectory::SIZE];
        self.reader.read_exact_at(offset, &mut buf)?;
        if &buf[0..4] == EndOfCentralDirectory::SIGNATURE && &buf[20..22] == b"\x00\x00" {
            let eocd = EndOfCentralDirectory::from_bytes(&buf)?;
            return Ok(Some((eocd, offset)));
        }

        // The EOCD could be earlier if there's a ZIP comment.
        let search_size = (MAX_COMMENT_SIZE + fixed).min(self.size);
        let search_start = self.size - search_size;
        let mut buf = vec![0u8; search_size as usize];
        self.reader.read_exact_at(search_start, &mut buf)?;

        for i in (0..=buf.len() - EndOfCentralDirectory::SIZE).rev() {
            if &buf[i..i + 4] == EndOfCentralDirectory::SIGNATURE {
                // The comment length field should match the remaining bytes.
                let comment_len = u16::from_le_bytes([buf[i + 20], buf[i + 21]]) as usize;
                if comment_len == buf.len() - i - EndOfCentralDirectory::SIZE {
                    let eocd = EndOfCentralDirectory::from_bytes(&buf[i..])?;
                    return Ok(Some((eocd, search_start + i as u64)));
                }
            }
        }

        Ok(None)
    }

    /// Read every central directory record.
    ///
    /// # Returns
    ///
    /// The records in directory order and the EOCD they were found through,
    /// or `None` when the source has no EOCD.
    ///
    /// # Errors
    ///
    /// [`ZipError::Format`] for ZIP64 or multi-disk archives, a directory
    /// that does not fit before the EOCD, or a malformed record.
    pub fn list_files(&self) -> Result<Option<(Vec<CentralDirectoryEntry>, EndOfCentralDirectory)>> {
        let Some((eocd, eocd_offset)) = self.find_eocd()? else {
            return Ok(None);
        };
        if eocd.is_zip64() {
            return Err(ZipError::format("ZIP64 archives are not supported"));
        }
        if eocd.is_multi_disk() {
            return Err(ZipError::format("multi-disk archives are not supported"));
        }

        let cd_offset = u64::from(eocd.cd_offset);
        let cd_size = u64::from(eocd.cd_size);
        if cd_offset + cd_size > eocd_offset {
            return Err(ZipError::format(format!(
                "central directory ({cd_size} bytes at {cd_offset}) overlaps the trailer at {eocd_offset}"
            )));
        }

        // Read the entire Central Directory in one request
        let mut cd_data = vec![0u8; cd_size as usize];
        self.reader.read_exact_at(cd_offset, &mut cd_data)?;

        let mut entries = Vec::with_capacity(usize::from(eocd.total_entries));
        let mut cursor = Cursor::new(&cd_data);
        for index in 0..eocd.total_entries {
            let entry = CentralDirectoryEntry::from_reader(&mut cursor).map_err(|err| match err {
                ZipError::Io(_) => ZipError::format(format!(
                    "central directory ends inside record {index}"
                )),
                other => other,
            })?;
            entries.push(entry);
        }

        debug!(entries = entries.len(), cd_offset, cd_size, "read central directory");
        Ok(Some((entries, eocd)))
    }

    /// Read local headers front to back, for sources without a central
    /// directory. Stops at the first position that does not hold a local
    /// header.
    pub fn scan_local_headers(&self) -> Result<Vec<CentralDirectoryEntry>> {
        let mut entries = Vec::new();
        let mut offset = 0u64;
        while offset + LFH_SIZE as u64 <= self.size {
            let mut signature = [0u8; 4];
            self.reader.read_exact_at(offset, &mut signature)?;
            if u32::from_le_bytes(signature) != LFH_SIGNATURE {
                break;
            }
            let mut cursor = ReadAtCursor::new(Arc::clone(&self.reader), offset);
            let local = LocalEntry::from_reader(&mut cursor)?;
            if local.has_data_descriptor() {
                return Err(ZipError::format(format!(
                    "entry {} has no sizes in its local header",
                    local.name()
                )));
            }
            let next = offset + local.header_size() as u64 + local.compressed_size();
            entries.push(CentralDirectoryEntry::from_local(local, offset));
            offset = next;
        }
        debug!(entries = entries.len(), "scanned local headers");
        Ok(entries)
    }

    /// Get a reference to the underlying reader.
    pub fn reader(&self) -> &Arc<R> {
        &self.reader
    }
}
