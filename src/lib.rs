//! # zipstream
//!
//! Streaming ZIP archive reading and writing over plain byte streams.
//!
//! ## Features
//!
//! - Read members front to back with [`ZipInputStream`], one at a time
//! - Write archives with [`ZipOutputStream`], back-patching each local header
//!   once the member's sizes and CRC are known
//! - STORED (uncompressed) and DEFLATE members, with CRC-32 verification on read
//! - Uniform [`FileCollection`] access to archive members ([`ZipFile`]) and
//!   to directory trees ([`DirectoryCollection`], walked lazily)
//! - Single-member gzip output via [`GzipOutputStream`]
//!
//! ## Example
//!
//! ```no_run
//! use std::fs::File;
//! use std::io::{Read, Write};
//! use zipstream::{CentralDirectoryEntry, ZipInputStream, ZipOutputStream};
//!
//! fn main() -> zipstream::Result<()> {
//!     let mut zip = ZipOutputStream::new(File::create("archive.zip")?);
//!     zip.put_next_entry(CentralDirectoryEntry::new("hello.txt"))?;
//!     zip.write_all(b"hello")?;
//!     zip.finish()?;
//!     drop(zip);
//!
//!     let mut zip = ZipInputStream::new(File::open("archive.zip")?);
//!     while let Some(entry) = zip.next_entry()? {
//!         let mut data = Vec::new();
//!         zip.read_to_end(&mut data)?;
//!         println!("{entry}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod collection;
pub mod error;
pub mod filter;
pub mod gzip;
pub mod io;
pub mod zip;

pub use collection::{
    DirEntry, DirectoryCollection, FileCollection, FileEntry, MatchPath, ZipEntry, ZipFile,
};
pub use error::{Result, ZipError};
pub use gzip::GzipOutputStream;
pub use io::{LocalFileReader, ReadAt};
pub use zip::{
    CentralDirectoryEntry, CompressionMethod, HostSystem, LocalEntry, ZipInputStream, ZipOutputStream,
};
