use std::io;

use flate2::{Decompress, FlushDecompress, Status};

use super::{FilterReader, Flush, Progress, Transform};
use crate::error::ZipError;

/// Raw (headerless) deflate decoder, as stored in ZIP members.
pub struct Inflate {
    inner: Decompress,
}

/// A reader yielding the decompressed form of a raw deflate stream.
pub type InflateReader<R> = FilterReader<R, Inflate>;

impl Inflate {
    pub fn new() -> Self {
        Self {
            inner: Decompress::new(false),
        }
    }
}

impl Default for Inflate {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform for Inflate {
    fn transform(&mut self, input: &[u8], output: &mut [u8], flush: Flush) -> io::Result<Progress> {
        let before_in = self.inner.total_in();
        let before_out = self.inner.total_out();
        let mode = match flush {
            Flush::None => FlushDecompress::None,
            Flush::Finish => FlushDecompress::Finish,
        };
        let status = self
            .inner
            .decompress(input, output, mode)
            .map_err(|e| io::Error::from(ZipError::format(format!("corrupt deflate data: {e}"))))?;
        Ok(Progress {
            consumed: (self.inner.total_in() - before_in) as usize,
            produced: (self.inner.total_out() - before_out) as usize,
            finished: status == Status::StreamEnd,
        })
    }

    fn reset(&mut self) {
        self.inner.reset(false);
    }
}

impl<R: io::Read> FilterReader<R, Inflate> {
    pub fn inflate(inner: R) -> Self {
        Self::new(inner, Inflate::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::DeflateEncoder;
    use std::io::{Cursor, Read, Write};

    fn deflate(data: &[u8]) -> Vec<u8> {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn reset_reuses_the_filter_for_consecutive_streams() {
        let first = deflate(b"first stream");
        let second = deflate(&[b'z'; 5000]);
        let mut joined = first.clone();
        joined.extend_from_slice(&second);

        let mut reader = InflateReader::inflate(Cursor::new(joined));
        reader.set_input_limit(Some(first.len() as u64));
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"first stream");

        reader.reset();
        reader.set_input_limit(Some(second.len() as u64));
        out.clear();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, vec![b'z'; 5000]);
    }

    #[test]
    fn truncated_stream_is_an_integrity_error() {
        let mut compressed = deflate(&(0..4096u32).map(|i| (i * 7 % 251) as u8).collect::<Vec<_>>());
        compressed.truncate(compressed.len() / 2);

        let mut reader = InflateReader::inflate(Cursor::new(compressed));
        let err = reader.read_to_end(&mut Vec::new()).unwrap_err();
        assert!(ZipError::from(err).is_format());
    }
}
