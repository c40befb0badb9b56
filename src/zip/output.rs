//! Sequential writing of a ZIP archive.
//!
//! [`ZipOutputStream`] writes each member's local header as soon as the
//! member is started, with zero sizes and CRC. When the member is closed the
//! real values are known; the stream seeks back, rewrites the header in
//! place, and seeks forward again. The sink must therefore be `Seek`;
//! non-seekable sinks are not supported.
//!
//! `finish()` appends the central directory and the end-of-central-directory
//! record. Dropping an unfinished stream finishes it; errors at that point
//! are logged and otherwise lost, so call `finish()` or
//! [`into_inner`](ZipOutputStream::into_inner) to observe them.

use flate2::Crc;
use std::io::{self, Seek, SeekFrom, Write};

use tracing::{debug, warn};

use crate::error::{Result, ZipError};
use crate::filter::{DEFAULT_BUFFER_SIZE, Deflate, DeflateWriter};

use super::structures::{CentralDirectoryEntry, CompressionMethod, EndOfCentralDirectory, HostSystem};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    EntryOpen,
    Finished,
    /// A back-patch failed; the sink position and the last header are
    /// no longer trustworthy.
    Invalid,
}

/// Writes a ZIP archive one member at a time.
pub struct ZipOutputStream<W: Write + Seek> {
    sink: Option<DeflateWriter<W>>,
    entries: Vec<CentralDirectoryEntry>,
    state: State,
    method: CompressionMethod,
    level: u32,
    comment: String,
    host: HostSystem,
    /// Method of the member being written.
    current_method: CompressionMethod,
    crc: Crc,
}

impl<W: Write + Seek> ZipOutputStream<W> {
    /// Create a writer that starts the archive at the sink's current
    /// position.
    ///
    /// # Arguments
    ///
    /// * `inner` - The sink. It must be seekable, since each local header is
    ///   rewritten once its member is complete. Pass `&mut W` to keep
    ///   ownership of the sink.
    ///
    /// # Returns
    ///
    /// A writer with no open entry, using DEFLATE at level 6 and the host
    /// system from [`HostSystem::current`].
    pub fn new(inner: W) -> Self {
        let deflate = Deflate::default();
        let level = deflate.level();
        Self {
            sink: Some(DeflateWriter::with_capacity(DEFAULT_BUFFER_SIZE, inner, deflate)),
            entries: Vec::new(),
            state: State::Idle,
            method: CompressionMethod::Deflate,
            level,
            comment: String::new(),
            host: HostSystem::current(),
            current_method: CompressionMethod::Deflate,
            crc: Crc::new(),
        }
    }

    /// Method for members started after this call. Only STORED and
    /// DEFLATED can be written.
    pub fn set_method(&mut self, method: CompressionMethod) -> Result<()> {
        if !method.is_supported() {
            return Err(ZipError::state(format!(
                "cannot write entries with compression method {}",
                method.as_u16()
            )));
        }
        self.method = method;
        Ok(())
    }

    pub fn method(&self) -> CompressionMethod {
        self.method
    }

    /// Deflate level (0-9) for members started after this call.
    pub fn set_level(&mut self, level: u32) -> Result<()> {
        self.sink()?.transform_mut().set_level(level)?;
        self.level = level;
        Ok(())
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    /// Archive comment stored in the end-of-central-directory record.
    pub fn set_comment(&mut self, comment: &str) -> Result<()> {
        if comment.len() > usize::from(u16::MAX) {
            return Err(ZipError::state(format!(
                "archive comment of {} bytes exceeds 65535",
                comment.len()
            )));
        }
        self.comment = comment.to_string();
        Ok(())
    }

    /// Host recorded in the "version made by" field of each member.
    pub fn set_host_system(&mut self, host: HostSystem) {
        self.host = host;
    }

    /// Records written so far, in archive order.
    pub fn entries(&self) -> &[CentralDirectoryEntry] {
        &self.entries
    }

    /// Start a new member, closing the open one first.
    ///
    /// The stream's method overrides `entry`'s; directories are always
    /// stored. Sizes, CRC and the header offset are filled in by the stream.
    pub fn put_next_entry(&mut self, mut entry: CentralDirectoryEntry) -> Result<()> {
        match self.state {
            State::Finished => return Err(ZipError::state("archive already finished")),
            State::Invalid => return Err(invalid_stream()),
            State::EntryOpen => self.close_entry()?,
            State::Idle => {}
        }

        let method = if entry.local().is_directory() {
            CompressionMethod::Stored
        } else {
            self.method
        };
        let host = self.host;
        let sink = self.sink()?;
        let offset = sink.get_mut().stream_position()?;

        entry.set_writer_version(host.writer_version());
        entry.set_local_header_offset(offset);
        let local = entry.local_mut();
        local.set_method(method);
        local.set_crc32(0);
        local.set_compressed_size(0);
        local.set_size(0);
        local.write(sink.get_mut())?;

        if method == CompressionMethod::Deflate {
            sink.reset();
        }

        debug!(name = entry.name(), offset, method = method.as_u16(), "started entry");
        self.current_method = method;
        self.crc.reset();
        self.entries.push(entry);
        self.state = State::EntryOpen;
        Ok(())
    }

    /// Finish the open member and back-patch its local header. A no-op
    /// when no member is open.
    ///
    /// If any step fails the stream becomes invalid: later writes, entries
    /// and `finish()` are rejected instead of overwriting earlier members.
    pub fn close_entry(&mut self) -> Result<()> {
        match self.state {
            State::EntryOpen => {}
            State::Invalid => return Err(invalid_stream()),
            State::Idle | State::Finished => return Ok(()),
        }
        self.state = State::Invalid;
        self.patch_entry()?;
        self.state = State::Idle;
        Ok(())
    }

    fn patch_entry(&mut self) -> Result<()> {
        let method = self.current_method;
        let crc = self.crc.sum();
        let size = u64::from(self.crc.amount());
        let sink = self.sink.as_mut().ok_or_else(|| ZipError::state("output stream has no sink"))?;
        let Some(entry) = self.entries.last_mut() else {
            return Err(ZipError::state("open entry missing from the directory"));
        };

        if method == CompressionMethod::Deflate {
            sink.finish()?;
        }

        let inner = sink.get_mut();
        let end = inner.stream_position()?;
        let offset = entry.local_header_offset();
        let compressed = end - offset - entry.local().header_size() as u64;

        let local = entry.local_mut();
        local.set_crc32(crc);
        local.set_size(size);
        local.set_compressed_size(compressed);

        // Encoded before seeking so an unrepresentable header leaves the
        // sink where it was.
        let mut header = Vec::with_capacity(local.header_size());
        local.write(&mut header)?;

        inner.seek(SeekFrom::Start(offset))?;
        let rewritten = inner.write_all(&header);
        let restored = inner.seek(SeekFrom::Start(end));
        rewritten?;
        restored?;

        debug!(name = local.name(), size, compressed, crc, "closed entry");
        Ok(())
    }

    /// Close the open member and write the central directory. Further
    /// writes, and a second `finish()`, fail with [`ZipError::InvalidState`].
    pub fn finish(&mut self) -> Result<()> {
        match self.state {
            State::Finished => return Err(ZipError::state("archive already finished")),
            State::Invalid => return Err(invalid_stream()),
            State::Idle | State::EntryOpen => {}
        }
        self.close_entry()?;
        self.state = State::Finished;

        let sink = self.sink.as_mut().ok_or_else(|| ZipError::state("output stream has no sink"))?;
        let inner = sink.get_mut();
        let cd_offset = inner.stream_position()?;
        write_central_directory(&self.entries, &self.comment, cd_offset, inner)?;
        inner.flush()?;
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        self.state == State::Finished
    }

    /// Finish the archive if needed and hand back the sink.
    pub fn into_inner(mut self) -> Result<W> {
        if matches!(self.state, State::Idle | State::EntryOpen) {
            self.finish()?;
        }
        self.sink
            .take()
            .map(DeflateWriter::into_inner)
            .ok_or_else(|| ZipError::state("output stream has no sink"))
    }

    fn sink(&mut self) -> Result<&mut DeflateWriter<W>> {
        self.sink.as_mut().ok_or_else(|| ZipError::state("output stream has no sink"))
    }
}

impl<W: Write + Seek> Write for ZipOutputStream<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        match self.state {
            State::EntryOpen => {}
            State::Idle => return Err(ZipError::state("no entry is open for writing").into()),
            State::Finished => return Err(ZipError::state("write after the archive was finished").into()),
            State::Invalid => return Err(invalid_stream().into()),
        }
        let method = self.current_method;
        let sink = self.sink()?;
        let n = match method {
            CompressionMethod::Deflate => sink.write(data)?,
            _ => sink.get_mut().write(data)?,
        };
        self.crc.update(&data[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.sink.as_mut() {
            Some(sink) => sink.flush(),
            None => Ok(()),
        }
    }
}

impl<W: Write + Seek> Drop for ZipOutputStream<W> {
    fn drop(&mut self) {
        if self.sink.is_none() {
            return;
        }
        match self.state {
            State::Finished => return,
            State::Invalid => {
                warn!("dropping zip archive left incomplete by a failed entry");
                return;
            }
            State::Idle | State::EntryOpen => {}
        }
        if let Err(err) = self.finish() {
            warn!(%err, "failed to finish zip archive on drop");
        }
    }
}

fn invalid_stream() -> ZipError {
    ZipError::state("archive is invalid after a failed entry close")
}

/// Write one central directory record per entry followed by the
/// end-of-central-directory record. `cd_offset` is the position of the
/// first record in the archive.
pub fn write_central_directory(
    entries: &[CentralDirectoryEntry],
    comment: &str,
    cd_offset: u64,
    writer: &mut impl Write,
) -> Result<EndOfCentralDirectory> {
    let mut cd_size = 0u64;
    for entry in entries {
        entry.write(writer)?;
        cd_size += entry.header_size() as u64;
    }
    let eocd = EndOfCentralDirectory::new(entries.len(), cd_size, cd_offset, comment)?;
    eocd.write(writer)?;
    debug!(entries = entries.len(), cd_offset, cd_size, "wrote central directory");
    Ok(eocd)
}
