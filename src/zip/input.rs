//! Sequential, entry-at-a-time reading of a ZIP archive.
//!
//! [`ZipInputStream`] walks local file headers from the front of the
//! archive. After [`next_entry`](ZipInputStream::next_entry) positions it on
//! a member, the stream's `Read` impl yields that member's uncompressed bytes
//! and then end-of-stream; it never reads into the next header.
//!
//! The end of the member list is recognised only by the central directory
//! signature (or, for an empty archive, the end-of-central-directory
//! signature) in place of the next local header. Anything else there is a
//! format error.
//!
//! Members whose sizes live in a trailing data descriptor cannot be bounded
//! from the local header alone. They are read with
//! [`open_with`](ZipInputStream::open_with), which takes the sizes and CRC
//! from the member's central directory record.

use byteorder::{LittleEndian, ReadBytesExt};
use flate2::Crc;
use std::io::{self, Read, Seek, SeekFrom};

use tracing::{debug, warn};

use crate::error::{Result, ZipError};
use crate::filter::InflateReader;

use super::structures::{
    CDFH_SIGNATURE, CentralDirectoryEntry, CompressionMethod, EndOfCentralDirectory, LFH_SIGNATURE,
    LocalEntry,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Between members.
    Idle,
    /// A member is open for reading.
    EntryOpen,
    /// The central directory was reached.
    Exhausted,
    /// A header could not be parsed; the stream position is unknown.
    Invalid,
}

/// Reads members of a ZIP archive one at a time.
pub struct ZipInputStream<R: Read + Seek> {
    source: InflateReader<R>,
    state: State,
    entry: Option<LocalEntry>,
    header_offset: u64,
    data_start: u64,
    /// Stored members: bytes not yet handed out.
    remaining: u64,
    crc: Crc,
    verified: bool,
    /// Opened from a directory record; there is no next member to walk to.
    single_entry: bool,
}

impl<R: Read + Seek> ZipInputStream<R> {
    /// Read members starting at the inner stream's current position.
    ///
    /// # Arguments
    ///
    /// * `inner` - The archive bytes, positioned at the first local header
    ///   to read. Seeking is used to skip the unread rest of a member.
    ///
    /// # Returns
    ///
    /// A stream with no member open. Call
    /// [`next_entry`](Self::next_entry) to reach the first one.
    pub fn new(inner: R) -> Self {
        Self {
            source: InflateReader::inflate(inner),
            state: State::Idle,
            entry: None,
            header_offset: 0,
            data_start: 0,
            remaining: 0,
            crc: Crc::new(),
            verified: false,
            single_entry: false,
        }
    }

    /// Open the one member described by a central directory record.
    ///
    /// The local header at the record's offset must agree with the record.
    /// When the member keeps its sizes and CRC in a trailing data
    /// descriptor they are taken from the record. Once the member is closed
    /// the stream is exhausted.
    pub fn open_with(mut inner: R, record: &CentralDirectoryEntry) -> Result<Self> {
        let offset = record.local_header_offset();
        inner.seek(SeekFrom::Start(offset))?;
        let mut stream = Self::new(inner);
        stream.single_entry = true;

        let mut local = LocalEntry::from_reader(stream.source.get_mut())?;
        if !record.matches_local(&local) {
            return Err(ZipError::format(format!(
                "local header of {} at offset {offset} disagrees with the central directory",
                record.name()
            )));
        }
        if local.has_data_descriptor() {
            let central = record.local();
            local.set_crc32(central.crc32());
            local.set_compressed_size(central.compressed_size());
            local.set_size(central.size());
        }
        stream.begin_entry(offset, local)?;
        Ok(stream)
    }

    /// Read members starting at `offset` of the inner stream.
    pub fn at_offset(mut inner: R, offset: u64) -> Result<Self> {
        inner.seek(SeekFrom::Start(offset))?;
        Ok(Self::new(inner))
    }

    /// Close the current member (if any) and parse the next local header.
    ///
    /// Returns `Ok(None)` once the central directory is reached, and keeps
    /// returning it afterwards. A member using an unsupported compression
    /// method is skipped over and reported as [`ZipError::Format`]; the
    /// following call continues with the next member.
    pub fn next_entry(&mut self) -> Result<Option<LocalEntry>> {
        match self.state {
            State::Exhausted => return Ok(None),
            State::Invalid => {
                return Err(ZipError::state("stream is invalid after an unreadable header"));
            }
            State::EntryOpen => {
                if let Err(err) = self.close_entry() {
                    warn!(%err, "failed to skip the rest of the previous entry");
                }
                if self.single_entry {
                    self.state = State::Exhausted;
                    self.entry = None;
                    return Ok(None);
                }
            }
            State::Idle => {}
        }

        let inner = self.source.get_mut();
        let offset = inner.stream_position()?;
        let signature = match inner.read_u32::<LittleEndian>() {
            Ok(signature) => signature,
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                self.state = State::Invalid;
                return Err(ZipError::format(format!(
                    "archive ends at offset {offset} without a central directory"
                )));
            }
            Err(err) => return Err(err.into()),
        };
        inner.seek(SeekFrom::Start(offset))?;

        match signature {
            LFH_SIGNATURE => {}
            CDFH_SIGNATURE | EndOfCentralDirectory::SIGNATURE_U32 => {
                debug!(offset, "reached end of local entries");
                self.state = State::Exhausted;
                self.entry = None;
                return Ok(None);
            }
            other => {
                self.state = State::Invalid;
                return Err(ZipError::format(format!(
                    "expected a local file header at offset {offset}, found signature {other:#010x}"
                )));
            }
        }

        let entry = match LocalEntry::from_reader(inner) {
            Ok(entry) => entry,
            Err(err) => {
                self.state = State::Invalid;
                return Err(err);
            }
        };
        if entry.has_data_descriptor() {
            self.state = State::Invalid;
            return Err(ZipError::format(format!(
                "entry {} stores its sizes in a trailing data descriptor, which cannot be streamed",
                entry.name()
            )));
        }

        self.begin_entry(offset, entry).map(Some)
    }

    /// Set up reading of `entry`'s data, which starts at the inner stream's
    /// position. `offset` is where its local header began.
    fn begin_entry(&mut self, offset: u64, entry: LocalEntry) -> Result<LocalEntry> {
        self.header_offset = offset;
        self.data_start = self.source.get_mut().stream_position()?;

        match entry.method() {
            CompressionMethod::Stored => {
                if entry.compressed_size() != entry.size() {
                    self.state = State::Invalid;
                    return Err(ZipError::format(format!(
                        "stored entry {} has compressed size {} but size {}",
                        entry.name(),
                        entry.compressed_size(),
                        entry.size()
                    )));
                }
                self.remaining = entry.size();
            }
            CompressionMethod::Deflate => {
                self.source.reset();
                self.source.set_input_limit(Some(entry.compressed_size()));
            }
            CompressionMethod::Unknown(method) => {
                let next = self.data_start + entry.compressed_size();
                self.source.get_mut().seek(SeekFrom::Start(next))?;
                self.state = self.between_entries();
                self.entry = None;
                return Err(ZipError::format(format!(
                    "entry {} uses unsupported compression method {method}",
                    entry.name()
                )));
            }
        }

        debug!(
            name = entry.name(),
            offset,
            method = entry.method().as_u16(),
            compressed = entry.compressed_size(),
            size = entry.size(),
            "opened entry"
        );
        self.crc.reset();
        self.verified = false;
        self.state = State::EntryOpen;
        self.entry = Some(entry.clone());
        Ok(entry)
    }

    fn between_entries(&self) -> State {
        if self.single_entry {
            State::Exhausted
        } else {
            State::Idle
        }
    }

    /// Position the inner stream right after the current member's data,
    /// however much of it was read. Calling it again is a no-op.
    pub fn close_entry(&mut self) -> Result<()> {
        if self.state != State::EntryOpen {
            return Ok(());
        }
        let Some(entry) = self.entry.as_ref() else {
            return Ok(());
        };
        let end = self.data_start + entry.compressed_size();
        self.source.get_mut().seek(SeekFrom::Start(end))?;
        self.state = self.between_entries();
        Ok(())
    }

    /// The member currently open, if any.
    pub fn current_entry(&self) -> Option<&LocalEntry> {
        match self.state {
            State::EntryOpen => self.entry.as_ref(),
            _ => None,
        }
    }

    /// Offset of the most recently parsed local header.
    pub fn current_header_offset(&self) -> u64 {
        self.header_offset
    }

    pub fn is_valid(&self) -> bool {
        self.state != State::Invalid
    }

    pub fn get_ref(&self) -> &R {
        self.source.get_ref()
    }

    pub fn into_inner(self) -> R {
        self.source.into_inner()
    }

    /// Check size and CRC once the member's data is exhausted.
    fn verify(&mut self) -> Result<()> {
        if self.verified {
            return Ok(());
        }
        self.verified = true;
        let Some(entry) = self.entry.as_ref() else {
            return Ok(());
        };
        if self.crc.amount() as u64 != entry.size() & 0xFFFF_FFFF {
            return Err(ZipError::format(format!(
                "entry {} decoded to {} bytes, header says {}",
                entry.name(),
                self.crc.amount(),
                entry.size()
            )));
        }
        if self.crc.sum() != entry.crc32() {
            return Err(ZipError::format(format!(
                "entry {} CRC-32 mismatch: computed {:#010x}, header says {:#010x}",
                entry.name(),
                self.crc.sum(),
                entry.crc32()
            )));
        }
        Ok(())
    }
}

impl<R: Read + Seek> Read for ZipInputStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.state != State::EntryOpen || buf.is_empty() {
            return Ok(0);
        }
        let method = match self.entry.as_ref() {
            Some(entry) => entry.method(),
            None => return Ok(0),
        };

        let n = match method {
            CompressionMethod::Stored => {
                if self.remaining == 0 {
                    0
                } else {
                    let want = buf.len().min(usize::try_from(self.remaining).unwrap_or(usize::MAX));
                    let n = self.source.get_mut().read(&mut buf[..want])?;
                    if n == 0 {
                        return Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "archive ended inside a stored entry",
                        ));
                    }
                    self.remaining -= n as u64;
                    n
                }
            }
            _ => self.source.read(buf)?,
        };

        if n == 0 {
            self.verify()?;
        } else {
            self.crc.update(&buf[..n]);
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zip::{ZipOutputStream, ZipParser};
    use std::io::{Cursor, Write};
    use std::sync::Arc;

    fn archive(entries: &[(&str, &[u8], CompressionMethod)]) -> Vec<u8> {
        let mut sink = Cursor::new(Vec::new());
        {
            let mut zip = ZipOutputStream::new(&mut sink);
            for (name, data, method) in entries {
                zip.set_method(*method).unwrap();
                zip.put_next_entry(crate::zip::CentralDirectoryEntry::new(name))
                    .unwrap();
                zip.write_all(data).unwrap();
            }
            zip.finish().unwrap();
        }
        sink.into_inner()
    }

    #[test]
    fn close_entry_is_idempotent_and_skips_unread_data() {
        let bytes = archive(&[
            ("one", &[1u8; 3000], CompressionMethod::Deflate),
            ("two", b"second", CompressionMethod::Stored),
        ]);
        let mut zip = ZipInputStream::new(Cursor::new(bytes));
        zip.next_entry().unwrap().unwrap();
        let mut head = [0u8; 10];
        zip.read_exact(&mut head).unwrap();

        zip.close_entry().unwrap();
        let after_first = zip.get_ref().position();
        zip.close_entry().unwrap();
        assert_eq!(zip.get_ref().position(), after_first);
        assert!(zip.current_entry().is_none());

        let second = zip.next_entry().unwrap().unwrap();
        assert_eq!(second.name(), "two");
        assert_eq!(zip.current_header_offset(), after_first);
        let mut data = String::new();
        zip.read_to_string(&mut data).unwrap();
        assert_eq!(data, "second");

        assert!(zip.next_entry().unwrap().is_none());
        assert!(zip.next_entry().unwrap().is_none());
    }

    #[test]
    fn unsupported_method_is_reported_and_skipped() {
        let mut bytes = archive(&[
            ("odd", b"payload", CompressionMethod::Stored),
            ("even", b"next", CompressionMethod::Stored),
        ]);
        // method field of the first local header: bzip2
        bytes[8] = 12;

        let mut zip = ZipInputStream::new(Cursor::new(bytes));
        let err = zip.next_entry().unwrap_err();
        assert!(err.is_format());
        assert!(err.to_string().contains("unsupported compression method 12"));

        let next = zip.next_entry().unwrap().unwrap();
        assert_eq!(next.name(), "even");
    }

    #[test]
    fn garbage_where_a_header_belongs_is_a_format_error() {
        let mut zip = ZipInputStream::new(Cursor::new(b"not a zip archive".to_vec()));
        assert!(zip.next_entry().unwrap_err().is_format());
        assert!(!zip.is_valid());
        assert!(zip.next_entry().unwrap_err().is_invalid_state());

        let mut empty = ZipInputStream::new(Cursor::new(Vec::new()));
        assert!(empty.next_entry().unwrap_err().is_format());
    }

    #[test]
    fn corrupted_data_fails_crc_check() {
        let mut bytes = archive(&[("crc", b"checksummed", CompressionMethod::Stored)]);
        let data_start = 30 + 3;
        bytes[data_start] ^= 0xFF;

        let mut zip = ZipInputStream::new(Cursor::new(bytes));
        zip.next_entry().unwrap().unwrap();
        let err = zip.read_to_end(&mut Vec::new()).unwrap_err();
        assert!(ZipError::from(err).is_format());
    }

    #[test]
    fn empty_archive_has_no_entries() {
        let mut zip = ZipInputStream::new(Cursor::new(archive(&[])));
        assert!(zip.next_entry().unwrap().is_none());
        assert!(zip.is_valid());
        assert!(zip.next_entry().unwrap().is_none());
    }

    #[test]
    fn deflated_size_disagreeing_with_header_is_a_format_error() {
        let mut bytes = archive(&[("d", b"deflated payload", CompressionMethod::Deflate)]);
        // uncompressed size field of the local header
        bytes[22] += 1;

        let mut zip = ZipInputStream::new(Cursor::new(bytes));
        assert_eq!(zip.next_entry().unwrap().unwrap().size(), 17);
        let err = ZipError::from(zip.read_to_end(&mut Vec::new()).unwrap_err());
        assert!(err.is_format());
        assert!(err.to_string().contains("decoded to 16 bytes"));
    }

    #[test]
    fn directory_record_supplies_data_descriptor_sizes() {
        let mut bytes = archive(&[
            ("dd", b"sizes come later", CompressionMethod::Deflate),
            ("after", b"x", CompressionMethod::Stored),
        ]);
        let (_, eocd) = ZipParser::new(Arc::new(bytes.clone())).list_files().unwrap().unwrap();
        bytes[6] |= 0x08;
        bytes[14..26].fill(0);
        bytes[eocd.cd_offset as usize + 8] |= 0x08;
        let (records, _) = ZipParser::new(Arc::new(bytes.clone())).list_files().unwrap().unwrap();

        let err = ZipInputStream::new(Cursor::new(bytes.clone())).next_entry().unwrap_err();
        assert!(err.is_format());
        assert!(err.to_string().contains("data descriptor"));

        let mut zip = ZipInputStream::open_with(Cursor::new(bytes), &records[0]).unwrap();
        assert_eq!(zip.current_entry().unwrap().size(), 16);
        let mut data = String::new();
        zip.read_to_string(&mut data).unwrap();
        assert_eq!(data, "sizes come later");
        assert!(zip.next_entry().unwrap().is_none());
    }

    #[test]
    fn reads_never_cross_into_the_next_header() {
        let bytes = archive(&[
            ("a", b"alpha", CompressionMethod::Stored),
            ("b", b"beta", CompressionMethod::Deflate),
        ]);
        let mut zip = ZipInputStream::new(Cursor::new(bytes));
        zip.next_entry().unwrap();
        let mut buf = [0u8; 64];
        let n = zip.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"alpha");
        assert_eq!(zip.read(&mut buf).unwrap(), 0);
        assert_eq!(zip.next_entry().unwrap().unwrap().name(), "b");
    }
}
