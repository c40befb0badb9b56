//! ZIP archive reading and writing.
//!
//! ## Architecture
//!
//! - [`structures`]: header records (local, central directory, EOCD) and
//!   their wire encoding
//! - [`dostime`]: the packed DOS timestamps headers carry
//! - [`ZipInputStream`]: front-to-back reading, one member at a time
//! - [`ZipOutputStream`]: sequential writing with header back-patching
//! - [`ZipParser`]: random-access reading of the central directory
//!
//! ## ZIP Format Overview
//!
//! A ZIP file consists of:
//! 1. Local file headers and compressed data for each file
//! 2. Central Directory with metadata for all files
//! 3. End of Central Directory (EOCD) record at the end
//!
//! ## Supported Features
//!
//! - Standard ZIP format (PKZIP APPNOTE 2.0 level)
//! - STORED (no compression) method
//! - DEFLATE compression method
//! - Archive and per-entry comments
//!
//! ## Limitations
//!
//! - No ZIP64 (members and archives must stay below 4 GiB)
//! - No encryption support
//! - No multi-disk archive support
//! - No BZIP2, LZMA, or other compression methods
//! - Writing needs a seekable sink

pub mod dostime;
mod input;
mod output;
mod parser;
pub mod structures;

pub use input::ZipInputStream;
pub use output::{ZipOutputStream, write_central_directory};
pub use parser::ZipParser;
pub use structures::*;
