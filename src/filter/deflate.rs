use std::io;

use flate2::{Compress, Compression, FlushCompress, Status};

use super::{FilterWriter, Flush, Progress, Transform};
use crate::error::{Result, ZipError};

/// Default zlib compression level.
pub const DEFAULT_LEVEL: u32 = 6;

/// Raw (headerless) deflate encoder.
#[derive(Debug)]
pub struct Deflate {
    inner: Compress,
    level: u32,
    level_changed: bool,
}

/// A writer compressing everything written to it into a raw deflate stream.
pub type DeflateWriter<W> = FilterWriter<W, Deflate>;

impl Deflate {
    /// Create an encoder at `level` (0 = store only, 9 = best).
    pub fn new(level: u32) -> Result<Self> {
        check_level(level)?;
        Ok(Self {
            inner: Compress::new(Compression::new(level), false),
            level,
            level_changed: false,
        })
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    /// Change the level; takes effect from the next `reset()`.
    pub fn set_level(&mut self, level: u32) -> Result<()> {
        check_level(level)?;
        if level != self.level {
            self.level = level;
            self.level_changed = true;
        }
        Ok(())
    }
}

impl Default for Deflate {
    fn default() -> Self {
        Self {
            inner: Compress::new(Compression::new(DEFAULT_LEVEL), false),
            level: DEFAULT_LEVEL,
            level_changed: false,
        }
    }
}

fn check_level(level: u32) -> Result<()> {
    if level > 9 {
        return Err(ZipError::state(format!(
            "compression level {level} is outside the supported range 0-9"
        )));
    }
    Ok(())
}

impl Transform for Deflate {
    fn transform(&mut self, input: &[u8], output: &mut [u8], flush: Flush) -> io::Result<Progress> {
        let before_in = self.inner.total_in();
        let before_out = self.inner.total_out();
        let mode = match flush {
            Flush::None => FlushCompress::None,
            Flush::Finish => FlushCompress::Finish,
        };
        let status = self
            .inner
            .compress(input, output, mode)
            .map_err(io::Error::other)?;
        Ok(Progress {
            consumed: (self.inner.total_in() - before_in) as usize,
            produced: (self.inner.total_out() - before_out) as usize,
            finished: status == Status::StreamEnd,
        })
    }

    fn reset(&mut self) {
        if self.level_changed {
            self.inner = Compress::new(Compression::new(self.level), false);
            self.level_changed = false;
        } else {
            self.inner.reset();
        }
    }
}

impl<W: io::Write> FilterWriter<W, Deflate> {
    pub fn deflate(inner: W, level: u32) -> Result<Self> {
        Ok(Self::new(inner, Deflate::new(level)?))
    }
}
