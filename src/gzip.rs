//! Single-member gzip writer (RFC 1952) built on the same deflate filter as
//! the ZIP writer.

use byteorder::{LittleEndian, WriteBytesExt};
use flate2::Crc;
use std::io::{self, Write};

use tracing::warn;

use crate::error::{Result, ZipError};
use crate::filter::{Deflate, DeflateWriter};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const METHOD_DEFLATE: u8 = 8;
const FLAG_NAME: u8 = 0x08;
const FLAG_COMMENT: u8 = 0x10;
/// "Unknown" operating system.
const OS_UNKNOWN: u8 = 255;

/// Compresses everything written to it into one gzip member.
///
/// The header goes out with the first write (or at `finish()`), so the
/// file name, comment, mtime and level must be set before that.
pub struct GzipOutputStream<W: Write> {
    sink: Option<DeflateWriter<W>>,
    filename: Option<String>,
    comment: Option<String>,
    mtime: u32,
    header_written: bool,
    finished: bool,
    crc: Crc,
}

impl<W: Write> GzipOutputStream<W> {
    pub fn new(inner: W) -> Self {
        Self {
            sink: Some(DeflateWriter::new(inner, Deflate::default())),
            filename: None,
            comment: None,
            mtime: 0,
            header_written: false,
            finished: false,
            crc: Crc::new(),
        }
    }

    /// Original file name recorded in the header (FNAME).
    pub fn set_filename(&mut self, filename: &str) -> Result<()> {
        self.check_header_pending()?;
        self.filename = Some(header_string("file name", filename)?);
        Ok(())
    }

    /// Free-form comment recorded in the header (FCOMMENT).
    pub fn set_comment(&mut self, comment: &str) -> Result<()> {
        self.check_header_pending()?;
        self.comment = Some(header_string("comment", comment)?);
        Ok(())
    }

    /// Modification time in seconds since the Unix epoch; 0 means unknown.
    pub fn set_mtime(&mut self, mtime: u32) -> Result<()> {
        self.check_header_pending()?;
        self.mtime = mtime;
        Ok(())
    }

    pub fn set_level(&mut self, level: u32) -> Result<()> {
        self.check_header_pending()?;
        let sink = self.sink()?;
        sink.transform_mut().set_level(level)?;
        sink.reset();
        Ok(())
    }

    /// Flush the compressor and write the CRC-32/size trailer. Only the
    /// first call succeeds.
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Err(ZipError::state("gzip stream already finished"));
        }
        self.finished = true;
        self.write_header()?;

        let crc = self.crc.sum();
        let isize = self.crc.amount();
        let sink = self.sink()?;
        sink.finish()?;
        let inner = sink.get_mut();
        inner.write_u32::<LittleEndian>(crc)?;
        inner.write_u32::<LittleEndian>(isize)?;
        inner.flush()?;
        Ok(())
    }

    /// Finish the member if needed and hand back the sink.
    pub fn into_inner(mut self) -> Result<W> {
        if !self.finished {
            self.finish()?;
        }
        self.sink
            .take()
            .map(DeflateWriter::into_inner)
            .ok_or_else(|| ZipError::state("gzip stream has no sink"))
    }

    fn check_header_pending(&self) -> Result<()> {
        if self.header_written {
            return Err(ZipError::state("gzip header already written"));
        }
        Ok(())
    }

    fn sink(&mut self) -> Result<&mut DeflateWriter<W>> {
        self.sink.as_mut().ok_or_else(|| ZipError::state("gzip stream has no sink"))
    }

    fn write_header(&mut self) -> Result<()> {
        if self.header_written {
            return Ok(());
        }
        self.header_written = true;

        let mut flags = 0;
        if self.filename.is_some() {
            flags |= FLAG_NAME;
        }
        if self.comment.is_some() {
            flags |= FLAG_COMMENT;
        }
        let sink = self.sink.as_mut().ok_or_else(|| ZipError::state("gzip stream has no sink"))?;
        let xfl = match sink.transform_mut().level() {
            9 => 2,
            1 => 4,
            _ => 0,
        };

        let mut header = Vec::with_capacity(10);
        header.extend_from_slice(&GZIP_MAGIC);
        header.push(METHOD_DEFLATE);
        header.push(flags);
        header.write_u32::<LittleEndian>(self.mtime)?;
        header.push(xfl);
        header.push(OS_UNKNOWN);
        for text in [&self.filename, &self.comment].into_iter().flatten() {
            header.extend_from_slice(text.as_bytes());
            header.push(0);
        }
        sink.get_mut().write_all(&header)?;
        Ok(())
    }
}

/// Header strings are zero-terminated, so they cannot contain NUL.
fn header_string(what: &str, value: &str) -> Result<String> {
    if value.contains('\0') {
        return Err(ZipError::state(format!("gzip {what} cannot contain NUL bytes")));
    }
    Ok(value.to_string())
}

impl<W: Write> Write for GzipOutputStream<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.finished {
            return Err(ZipError::state("write after the gzip stream was finished").into());
        }
        self.write_header()?;
        let n = self.sink()?.write(data)?;
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

impl<W: Write> Drop for GzipOutputStream<W> {
    fn drop(&mut self) {
        if self.finished || self.sink.is_none() {
            return;
        }
        if let Err(err) = self.finish() {
            warn!(%err, "failed to finish gzip stream on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_settings_are_frozen_by_the_first_write() {
        let mut gz = GzipOutputStream::new(Vec::new());
        assert!(gz.set_filename("bad\0name").unwrap_err().is_invalid_state());
        gz.set_filename("data.bin").unwrap();
        gz.write_all(b"x").unwrap();
        assert!(gz.set_comment("late").unwrap_err().is_invalid_state());
        assert!(gz.set_level(1).unwrap_err().is_invalid_state());

        let bytes = gz.into_inner().unwrap();
        assert_eq!(&bytes[..4], &[0x1f, 0x8b, 8, FLAG_NAME]);
        assert_eq!(&bytes[10..19], b"data.bin\0");
        // ISIZE
        assert_eq!(&bytes[bytes.len() - 4..], &[1, 0, 0, 0]);
    }

    #[test]
    fn finish_is_once_only() {
        let mut gz = GzipOutputStream::new(Vec::new());
        gz.finish().unwrap();
        assert!(gz.finish().unwrap_err().is_invalid_state());
        assert!(ZipError::from(gz.write(b"more").unwrap_err()).is_invalid_state());
    }
}
