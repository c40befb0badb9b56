//! Filter streams: byte-stream decorators that push everything passing
//! through them into a [`Transform`].
//!
//! There is exactly one level of wrapping. [`FilterReader`] pulls raw bytes
//! from an inner `Read` and hands the transformed bytes to its caller;
//! [`FilterWriter`] transforms what it is given and forwards the result to an
//! inner `Write`. The transform itself ([`Inflate`], [`Deflate`]) knows nothing
//! about streams.
//!
//! ## Ownership
//!
//! A filter always owns its inner value. To keep ownership with the caller,
//! wrap a mutable reference instead: `&mut W` is itself `Read`/`Write`/`Seek`.
//! [`FilterReader::into_inner`] and [`FilterWriter::into_inner`] hand an owned
//! inner stream back; otherwise it is dropped with the filter.
//!
//! ## Buffers
//!
//! Each filter owns a single staging buffer sized at construction. `reset()`
//! rewinds the filter for a new logical stream without reallocating it.

mod deflate;
mod inflate;

pub use deflate::{Deflate, DeflateWriter};
pub use inflate::{Inflate, InflateReader};

use std::io::{self, Read, Write};

use tracing::trace;

use crate::error::{Result, ZipError};

/// Default size of the staging buffer owned by each filter.
pub const DEFAULT_BUFFER_SIZE: usize = 16 * 1024;

/// Whether the transform should flush and terminate its logical stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flush {
    None,
    Finish,
}

/// Outcome of one [`Transform::transform`] step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub consumed: usize,
    pub produced: usize,
    /// The transform reached the logical end of its stream.
    pub finished: bool,
}

/// A byte transform applied by a filter stream.
pub trait Transform {
    /// Consume a prefix of `input`, write transformed bytes to the front of
    /// `output`, and report how much of each was used.
    fn transform(&mut self, input: &[u8], output: &mut [u8], flush: Flush) -> io::Result<Progress>;

    /// Return to the initial state so a new logical stream can start.
    fn reset(&mut self);
}

/// Read-side filter: `inner` supplies raw bytes, `read()` yields transformed bytes.
pub struct FilterReader<R: Read, T: Transform> {
    inner: R,
    transform: T,
    buf: Vec<u8>,
    pos: usize,
    len: usize,
    limit: Option<u64>,
    eof: bool,
    finished: bool,
    total_in: u64,
}

impl<R: Read, T: Transform> FilterReader<R, T> {
    pub fn new(inner: R, transform: T) -> Self {
        Self::with_capacity(DEFAULT_BUFFER_SIZE, inner, transform)
    }

    pub fn with_capacity(capacity: usize, inner: R, transform: T) -> Self {
        Self {
            inner,
            transform,
            buf: vec![0; capacity.max(1)],
            pos: 0,
            len: 0,
            limit: None,
            eof: false,
            finished: false,
            total_in: 0,
        }
    }

    /// Start a new logical stream at the inner reader's current position.
    pub fn reset(&mut self) {
        self.transform.reset();
        self.pos = 0;
        self.len = 0;
        self.limit = None;
        self.eof = false;
        self.finished = false;
        self.total_in = 0;
    }

    /// Cap how many raw bytes the filter may pull from `inner` for the
    /// current stream. Reaching the cap counts as end of input.
    pub fn set_input_limit(&mut self, limit: Option<u64>) {
        self.limit = limit;
    }

    /// The transform reported the end of its logical stream.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Raw bytes pulled from `inner` since the last reset.
    pub fn total_in(&self) -> u64 {
        self.total_in
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Access the inner reader directly. Bytes already staged in the
    /// filter's buffer are not visible through it.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Pull more raw input, keeping any unconsumed bytes at the front.
    fn fill(&mut self) -> io::Result<()> {
        if self.pos > 0 {
            self.buf.copy_within(self.pos..self.len, 0);
            self.len -= self.pos;
            self.pos = 0;
        }
        let mut want = self.buf.len() - self.len;
        if let Some(limit) = self.limit {
            want = want.min(usize::try_from(limit).unwrap_or(usize::MAX));
        }
        if want == 0 {
            self.eof = self.limit == Some(0);
            return Ok(());
        }
        let n = loop {
            match self.inner.read(&mut self.buf[self.len..self.len + want]) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        };
        if n == 0 {
            self.eof = true;
        }
        self.len += n;
        self.total_in += n as u64;
        if let Some(limit) = self.limit.as_mut() {
            *limit -= n as u64;
        }
        Ok(())
    }
}

impl<R: Read, T: Transform> Read for FilterReader<R, T> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if self.finished || out.is_empty() {
            return Ok(0);
        }
        loop {
            if self.pos == self.len && !self.eof {
                self.fill()?;
            }
            let flush = if self.eof { Flush::Finish } else { Flush::None };
            let progress = self
                .transform
                .transform(&self.buf[self.pos..self.len], out, flush)?;
            self.pos += progress.consumed;

            if progress.finished {
                trace!(total_in = self.total_in, "filter reached end of stream");
                self.finished = true;
                return Ok(progress.produced);
            }
            if progress.produced > 0 {
                return Ok(progress.produced);
            }
            if progress.consumed == 0 {
                if self.eof {
                    return Err(ZipError::format(
                        "compressed data ended before the end-of-stream marker",
                    )
                    .into());
                }
                if self.pos == 0 && self.len == self.buf.len() {
                    return Err(ZipError::format("transform stalled on a full input buffer").into());
                }
                self.fill()?;
            }
        }
    }
}

/// Write-side filter: bytes written are transformed and forwarded to `inner`.
pub struct FilterWriter<W: Write, T: Transform> {
    inner: W,
    transform: T,
    buf: Vec<u8>,
    finished: bool,
    total_in: u64,
    total_out: u64,
}

impl<W: Write, T: Transform> FilterWriter<W, T> {
    pub fn new(inner: W, transform: T) -> Self {
        Self::with_capacity(DEFAULT_BUFFER_SIZE, inner, transform)
    }

    pub fn with_capacity(capacity: usize, inner: W, transform: T) -> Self {
        Self {
            inner,
            transform,
            buf: vec![0; capacity.max(1)],
            finished: false,
            total_in: 0,
            total_out: 0,
        }
    }

    /// Flush the transform's internal state and terminate the logical
    /// stream. Must be called exactly once per stream; a second call, or a
    /// write afterwards, is an [`ZipError::InvalidState`] until `reset()`.
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Err(ZipError::state("filter stream already finished"));
        }
        loop {
            let progress = self.transform.transform(&[], &mut self.buf, Flush::Finish)?;
            self.inner.write_all(&self.buf[..progress.produced])?;
            self.total_out += progress.produced as u64;
            if progress.finished {
                break;
            }
            if progress.produced == 0 {
                return Err(ZipError::state("transform made no progress while finishing"));
            }
        }
        self.finished = true;
        trace!(
            total_in = self.total_in,
            total_out = self.total_out,
            "filter stream finished"
        );
        Ok(())
    }

    /// Start a new logical stream.
    pub fn reset(&mut self) {
        self.transform.reset();
        self.finished = false;
        self.total_in = 0;
        self.total_out = 0;
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn total_in(&self) -> u64 {
        self.total_in
    }

    /// Transformed bytes forwarded to `inner` since the last reset.
    pub fn total_out(&self) -> u64 {
        self.total_out
    }

    pub fn transform_mut(&mut self) -> &mut T {
        &mut self.transform
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Access the inner writer directly, bypassing the transform.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write, T: Transform> Write for FilterWriter<W, T> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.finished {
            return Err(ZipError::state("write after the filter stream was finished").into());
        }
        let mut rest = data;
        while !rest.is_empty() {
            let progress = self.transform.transform(rest, &mut self.buf, Flush::None)?;
            self.inner.write_all(&self.buf[..progress.produced])?;
            self.total_out += progress.produced as u64;
            rest = &rest[progress.consumed..];
            if progress.consumed == 0 && progress.produced == 0 {
                return Err(io::Error::other("transform made no progress"));
            }
        }
        self.total_in += data.len() as u64;
        Ok(data.len())
    }

    /// Flushes `inner` only; the transform keeps buffering until `finish()`.
    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
