//! Error type shared by every layer of the crate.
//!
//! Errors come in three kinds:
//!
//! - [`ZipError::Io`]: the underlying read, write or seek failed.
//! - [`ZipError::Format`]: the bytes are not a valid archive (bad signature,
//!   inconsistent length field, unsupported compression method, corrupt data).
//! - [`ZipError::InvalidState`]: the API was used out of order (writing after
//!   `finish()`, touching a closed collection, oversized fields on write).

use std::io;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ZipError>;

#[derive(Debug, Error)]
pub enum ZipError {
    #[error("I/O error: {0}")]
    Io(io::Error),

    #[error("invalid archive: {0}")]
    Format(String),

    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl ZipError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        ZipError::Format(msg.into())
    }

    pub(crate) fn state(msg: impl Into<String>) -> Self {
        ZipError::InvalidState(msg.into())
    }

    pub fn is_format(&self) -> bool {
        matches!(self, ZipError::Format(_))
    }

    pub fn is_invalid_state(&self) -> bool {
        matches!(self, ZipError::InvalidState(_))
    }
}

impl From<io::Error> for ZipError {
    fn from(err: io::Error) -> Self {
        // Errors raised by our own `Read`/`Write` impls travel through
        // `io::Error`; give them their original kind back.
        if err.get_ref().is_some_and(|inner| inner.is::<ZipError>()) {
            if let Some(inner) = err.into_inner() {
                return match inner.downcast::<ZipError>() {
                    Ok(zip) => *zip,
                    Err(other) => ZipError::Io(io::Error::other(other)),
                };
            }
            return ZipError::Io(io::Error::other("unknown error"));
        }
        ZipError::Io(err)
    }
}

impl From<ZipError> for io::Error {
    fn from(err: ZipError) -> Self {
        match err {
            ZipError::Io(err) => err,
            ZipError::Format(_) => io::Error::new(io::ErrorKind::InvalidData, err),
            ZipError::InvalidState(_) => io::Error::other(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_survive_io_round_trip() {
        let io_err: io::Error = ZipError::format("bad signature").into();
        assert_eq!(io_err.kind(), io::ErrorKind::InvalidData);
        assert!(ZipError::from(io_err).is_format());

        let io_err: io::Error = ZipError::state("finished").into();
        assert!(ZipError::from(io_err).is_invalid_state());
    }

    #[test]
    fn plain_io_errors_stay_io() {
        let err = ZipError::from(io::Error::new(io::ErrorKind::UnexpectedEof, "eof"));
        match err {
            ZipError::Io(inner) => assert_eq!(inner.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("unexpected error kind: {other:?}"),
        }
    }
}
