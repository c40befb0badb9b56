use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io::{Cursor, Read, Write};

use crate::error::{Result, ZipError};

use super::dostime;

/// ZIP compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflate,
    Unknown(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            _ => CompressionMethod::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Unknown(v) => *v,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, CompressionMethod::Unknown(_))
    }
}

/// Host system recorded in the upper byte of "version made by".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostSystem {
    MsDos,
    Unix,
    Windows,
    MacOsX,
}

impl HostSystem {
    /// The system this binary was built for.
    pub fn current() -> Self {
        if cfg!(windows) {
            HostSystem::Windows
        } else if cfg!(target_os = "macos") {
            HostSystem::MacOsX
        } else {
            HostSystem::Unix
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            HostSystem::MsDos => 0x00,
            HostSystem::Unix => 0x03,
            HostSystem::Windows => 0x0A,
            HostSystem::MacOsX => 0x13,
        }
    }

    /// "Version made by" for this host and [`ZIP_FORMAT_VERSION`].
    pub fn writer_version(&self) -> u16 {
        (self.code() as u16) << 8 | ZIP_FORMAT_VERSION
    }
}

/// Format version written as both "made by" and "needed to extract": 2.0,
/// the first version with deflate and directories.
pub const ZIP_FORMAT_VERSION: u16 = 20;

/// General purpose flag: sizes and CRC follow the data in a data descriptor.
pub const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;

/// General purpose flag: name and comment are UTF-8.
pub const FLAG_UTF8: u16 = 0x0800;

/// External attributes of a regular `-rw-rw-r--` file.
pub const DEFAULT_FILE_ATTRIBUTES: u32 = 0x81B4_0000;

/// External attributes of a `drwxr-xr-x` directory, with the DOS directory bit.
pub const DEFAULT_DIR_ATTRIBUTES: u32 = 0x41ED_0010;

/// Local File Header (LFH) - 30 bytes
pub const LFH_SIGNATURE: u32 = 0x0403_4b50;
pub const LFH_SIZE: usize = 30;

/// Central Directory File Header (CDFH) - 46 bytes minimum
pub const CDFH_SIGNATURE: u32 = 0x0201_4b50;
pub const CDFH_MIN_SIZE: usize = 46;

const MAX_U16_FIELD: usize = u16::MAX as usize;
const MAX_U32_FIELD: u64 = u32::MAX as u64;

/// Header fields already checked to fit their on-disk width.
struct CheckedFields {
    name_len: u16,
    extra_len: u16,
    compressed_size: u32,
    uncompressed_size: u32,
}

/// Normalize an archive path: forward slashes, no leading `/` or `./`,
/// no empty components. A trailing `/` (directory marker) is kept.
pub fn normalize_name(name: &str) -> String {
    let name = name.replace('\\', "/");
    let is_dir = name.ends_with('/');
    let mut out = name
        .split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .collect::<Vec<_>>()
        .join("/");
    if is_dir && !out.is_empty() {
        out.push('/');
    }
    out
}

/// Lossy view of a stored name or comment. The raw bytes are kept next
/// to it so sizes and re-written headers match what was read.
fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn read_bytes(reader: &mut impl Read, len: u16) -> Result<Vec<u8>> {
    let mut bytes = vec![0u8; len as usize];
    reader.read_exact(&mut bytes)?;
    Ok(bytes)
}

fn check_u16_len(what: &str, len: usize) -> Result<u16> {
    if len > MAX_U16_FIELD {
        return Err(ZipError::state(format!(
            "{what} is {len} bytes, more than the {MAX_U16_FIELD} a ZIP header can record"
        )));
    }
    Ok(len as u16)
}

fn check_u32_value(what: &str, value: u64) -> Result<u32> {
    if value > MAX_U32_FIELD {
        return Err(ZipError::state(format!(
            "{what} {value} does not fit in 32 bits (ZIP64 is not supported)"
        )));
    }
    Ok(value as u32)
}

/// Metadata of one archive member as carried by its local file header.
///
/// Entries are built with [`LocalEntry::new`] when writing, or filled in by
/// [`LocalEntry::read`] when parsing. A parse that fails leaves the entry
/// marked invalid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalEntry {
    extract_version: u16,
    gp_flags: u16,
    method: CompressionMethod,
    dos_time: u32,
    crc32: u32,
    compressed_size: u64,
    uncompressed_size: u64,
    name: String,
    raw_name: Vec<u8>,
    extra: Vec<u8>,
    valid: bool,
}

impl Default for LocalEntry {
    fn default() -> Self {
        Self {
            extract_version: ZIP_FORMAT_VERSION,
            gp_flags: 0,
            method: CompressionMethod::Deflate,
            dos_time: dostime::DOS_EPOCH,
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            name: String::new(),
            raw_name: Vec::new(),
            extra: Vec::new(),
            valid: false,
        }
    }
}

impl LocalEntry {
    pub fn new(name: &str) -> Self {
        let mut entry = Self {
            valid: true,
            ..Self::default()
        };
        entry.set_name(name);
        entry
    }

    pub fn from_reader(reader: &mut impl Read) -> Result<Self> {
        let mut entry = Self::default();
        entry.read(reader)?;
        Ok(entry)
    }

    /// Parse a local file header, replacing this entry's fields.
    ///
    /// The entry is invalid until the whole header has been read; a bad
    /// signature is reported as [`ZipError::Format`].
    pub fn read(&mut self, reader: &mut impl Read) -> Result<()> {
        self.valid = false;

        let signature = reader.read_u32::<LittleEndian>()?;
        if signature != LFH_SIGNATURE {
            return Err(ZipError::format(format!(
                "expected local file header signature, found {signature:#010x}"
            )));
        }

        let extract_version = reader.read_u16::<LittleEndian>()?;
        let gp_flags = reader.read_u16::<LittleEndian>()?;
        let method = reader.read_u16::<LittleEndian>()?;
        let dos_time = reader.read_u32::<LittleEndian>()?;
        let crc32 = reader.read_u32::<LittleEndian>()?;
        let compressed_size = reader.read_u32::<LittleEndian>()?;
        let uncompressed_size = reader.read_u32::<LittleEndian>()?;
        let name_len = reader.read_u16::<LittleEndian>()?;
        let extra_len = reader.read_u16::<LittleEndian>()?;
        let raw_name = read_bytes(reader, name_len)?;
        let extra = read_bytes(reader, extra_len)?;

        if raw_name.is_empty() {
            return Err(ZipError::format("local file header has an empty file name"));
        }

        *self = Self {
            extract_version,
            gp_flags,
            method: CompressionMethod::from_u16(method),
            dos_time,
            crc32,
            compressed_size: compressed_size as u64,
            uncompressed_size: uncompressed_size as u64,
            name: lossy(&raw_name),
            raw_name,
            extra,
            valid: true,
        };
        Ok(())
    }

    /// Serialize the header. Lengths, sizes and the name are validated
    /// first; nothing is written if any of them cannot be represented.
    pub fn write(&self, writer: &mut impl Write) -> Result<()> {
        let fields = self.checked_fields()?;
        let mut buf = Vec::with_capacity(self.header_size());
        buf.write_u32::<LittleEndian>(LFH_SIGNATURE)?;
        self.write_common(&mut buf, &fields)?;
        buf.extend_from_slice(&self.raw_name);
        buf.extend_from_slice(&self.extra);
        debug_assert_eq!(buf.len(), self.header_size());
        writer.write_all(&buf)?;
        Ok(())
    }

    fn checked_fields(&self) -> Result<CheckedFields> {
        if self.raw_name.is_empty() {
            return Err(ZipError::state("cannot write an entry with an empty file name"));
        }
        Ok(CheckedFields {
            name_len: check_u16_len("file name", self.raw_name.len())?,
            extra_len: check_u16_len("extra field", self.extra.len())?,
            compressed_size: check_u32_value("compressed size", self.compressed_size)?,
            uncompressed_size: check_u32_value("uncompressed size", self.uncompressed_size)?,
        })
    }

    /// Fields shared by local and central headers, from "version needed"
    /// through "extra field length".
    fn write_common(&self, buf: &mut Vec<u8>, fields: &CheckedFields) -> Result<()> {
        buf.write_u16::<LittleEndian>(self.extract_version)?;
        buf.write_u16::<LittleEndian>(self.gp_flags)?;
        buf.write_u16::<LittleEndian>(self.method.as_u16())?;
        buf.write_u32::<LittleEndian>(self.dos_time)?;
        buf.write_u32::<LittleEndian>(self.crc32)?;
        buf.write_u32::<LittleEndian>(fields.compressed_size)?;
        buf.write_u32::<LittleEndian>(fields.uncompressed_size)?;
        buf.write_u16::<LittleEndian>(fields.name_len)?;
        buf.write_u16::<LittleEndian>(fields.extra_len)?;
        Ok(())
    }

    /// Exact number of bytes [`write`](Self::write) emits.
    pub fn header_size(&self) -> usize {
        LFH_SIZE + self.raw_name.len() + self.extra.len()
    }

    /// The name as text. Bytes that are not valid UTF-8 show up as U+FFFD;
    /// see [`raw_name`](Self::raw_name) for the stored form.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The name exactly as stored in the header.
    pub fn raw_name(&self) -> &[u8] {
        &self.raw_name
    }

    /// Last path component of the name.
    pub fn file_name(&self) -> &str {
        self.name
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = normalize_name(name);
        self.raw_name = self.name.as_bytes().to_vec();
        self.gp_flags &= !FLAG_UTF8;
        self.mark_utf8_if_needed(name);
    }

    pub fn is_directory(&self) -> bool {
        self.name.ends_with('/')
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn method(&self) -> CompressionMethod {
        self.method
    }

    pub fn set_method(&mut self, method: CompressionMethod) {
        self.method = method;
    }

    pub fn crc32(&self) -> u32 {
        self.crc32
    }

    pub fn set_crc32(&mut self, crc32: u32) {
        self.crc32 = crc32;
    }

    pub fn compressed_size(&self) -> u64 {
        self.compressed_size
    }

    pub fn set_compressed_size(&mut self, size: u64) {
        self.compressed_size = size;
    }

    /// Uncompressed size of the member's data.
    pub fn size(&self) -> u64 {
        self.uncompressed_size
    }

    pub fn set_size(&mut self, size: u64) {
        self.uncompressed_size = size;
    }

    pub fn extra(&self) -> &[u8] {
        &self.extra
    }

    pub fn set_extra(&mut self, extra: Vec<u8>) {
        self.extra = extra;
    }

    pub fn dos_time(&self) -> u32 {
        self.dos_time
    }

    pub fn set_dos_time(&mut self, dos_time: u32) {
        self.dos_time = dos_time;
    }

    /// Modification time in seconds since the Unix epoch (2 s resolution).
    pub fn unix_time(&self) -> i64 {
        dostime::dos_to_unix(self.dos_time)
    }

    pub fn set_unix_time(&mut self, secs: i64) {
        self.dos_time = dostime::unix_to_dos(secs);
    }

    pub fn gp_flags(&self) -> u16 {
        self.gp_flags
    }

    pub fn extract_version(&self) -> u16 {
        self.extract_version
    }

    /// Sizes and CRC are stored after the data instead of in this header.
    pub fn has_data_descriptor(&self) -> bool {
        self.gp_flags & FLAG_DATA_DESCRIPTOR != 0
    }

    fn mark_utf8_if_needed(&mut self, text: &str) {
        if !text.is_ascii() {
            self.gp_flags |= FLAG_UTF8;
        }
    }
}

impl fmt::Display for LocalEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} bytes, {} bytes compressed)",
            self.name, self.uncompressed_size, self.compressed_size
        )
    }
}

/// A central directory record: the local header fields plus the comment,
/// attributes and the offset of the member's local header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CentralDirectoryEntry {
    local: LocalEntry,
    writer_version: u16,
    comment: String,
    raw_comment: Vec<u8>,
    disk_start: u16,
    internal_attributes: u16,
    external_attributes: u32,
    local_header_offset: u64,
}

impl Default for CentralDirectoryEntry {
    fn default() -> Self {
        Self::from_local(LocalEntry::default(), 0)
    }
}

impl CentralDirectoryEntry {
    pub fn new(name: &str) -> Self {
        Self::from_local(LocalEntry::new(name), 0)
    }

    /// Wrap a local header found at `local_header_offset`.
    pub fn from_local(local: LocalEntry, local_header_offset: u64) -> Self {
        let external_attributes = if local.is_directory() {
            DEFAULT_DIR_ATTRIBUTES
        } else {
            DEFAULT_FILE_ATTRIBUTES
        };
        Self {
            local,
            writer_version: HostSystem::Unix.writer_version(),
            comment: String::new(),
            raw_comment: Vec::new(),
            disk_start: 0,
            internal_attributes: 0,
            external_attributes,
            local_header_offset,
        }
    }

    pub fn from_reader(reader: &mut impl Read) -> Result<Self> {
        let mut entry = Self::default();
        entry.read(reader)?;
        Ok(entry)
    }

    /// Parse a central directory file header, replacing this entry's fields.
    pub fn read(&mut self, reader: &mut impl Read) -> Result<()> {
        self.local.valid = false;

        // Read and verify the signature (PK\x01\x02)
        let signature = reader.read_u32::<LittleEndian>()?;
        if signature != CDFH_SIGNATURE {
            return Err(ZipError::format(format!(
                "expected central directory signature, found {signature:#010x}"
            )));
        }

        // Read fixed-size header fields
        let writer_version = reader.read_u16::<LittleEndian>()?;
        let extract_version = reader.read_u16::<LittleEndian>()?;
        let gp_flags = reader.read_u16::<LittleEndian>()?;
        let method = reader.read_u16::<LittleEndian>()?;
        let dos_time = reader.read_u32::<LittleEndian>()?;
        let crc32 = reader.read_u32::<LittleEndian>()?;
        let compressed_size = reader.read_u32::<LittleEndian>()?;
        let uncompressed_size = reader.read_u32::<LittleEndian>()?;
        let name_len = reader.read_u16::<LittleEndian>()?;
        let extra_len = reader.read_u16::<LittleEndian>()?;
        let comment_len = reader.read_u16::<LittleEndian>()?;
        let disk_start = reader.read_u16::<LittleEndian>()?;
        let internal_attributes = reader.read_u16::<LittleEndian>()?;
        let external_attributes = reader.read_u32::<LittleEndian>()?;
        let local_header_offset = reader.read_u32::<LittleEndian>()?;

        // Read the variable-length fields
        let raw_name = read_bytes(reader, name_len)?;
        let extra = read_bytes(reader, extra_len)?;
        let raw_comment = read_bytes(reader, comment_len)?;

        if raw_name.is_empty() {
            return Err(ZipError::format("central directory entry has an empty file name"));
        }

        *self = Self {
            local: LocalEntry {
                extract_version,
                gp_flags,
                method: CompressionMethod::from_u16(method),
                dos_time,
                crc32,
                compressed_size: compressed_size as u64,
                uncompressed_size: uncompressed_size as u64,
                name: lossy(&raw_name),
                raw_name,
                extra,
                valid: true,
            },
            writer_version,
            comment: lossy(&raw_comment),
            raw_comment,
            disk_start,
            internal_attributes,
            external_attributes,
            local_header_offset: local_header_offset as u64,
        };
        Ok(())
    }

    pub fn write(&self, writer: &mut impl Write) -> Result<()> {
        let local = &self.local;
        let fields = local.checked_fields()?;
        let comment_len = check_u16_len("file comment", self.raw_comment.len())?;
        let offset = check_u32_value("local header offset", self.local_header_offset)?;

        let mut buf = Vec::with_capacity(self.header_size());
        buf.write_u32::<LittleEndian>(CDFH_SIGNATURE)?;
        buf.write_u16::<LittleEndian>(self.writer_version)?;
        local.write_common(&mut buf, &fields)?;
        buf.write_u16::<LittleEndian>(comment_len)?;
        buf.write_u16::<LittleEndian>(self.disk_start)?;
        buf.write_u16::<LittleEndian>(self.internal_attributes)?;
        buf.write_u32::<LittleEndian>(self.external_attributes)?;
        buf.write_u32::<LittleEndian>(offset)?;
        buf.extend_from_slice(&local.raw_name);
        buf.extend_from_slice(&local.extra);
        buf.extend_from_slice(&self.raw_comment);

        debug_assert_eq!(buf.len(), self.header_size());
        writer.write_all(&buf)?;
        Ok(())
    }

    /// Exact number of bytes [`write`](Self::write) emits.
    pub fn header_size(&self) -> usize {
        CDFH_MIN_SIZE + self.local.raw_name.len() + self.local.extra.len() + self.raw_comment.len()
    }

    pub fn local(&self) -> &LocalEntry {
        &self.local
    }

    pub fn local_mut(&mut self) -> &mut LocalEntry {
        &mut self.local
    }

    pub fn into_local(self) -> LocalEntry {
        self.local
    }

    pub fn name(&self) -> &str {
        self.local.name()
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn set_comment(&mut self, comment: &str) {
        self.comment = comment.to_string();
        self.raw_comment = comment.as_bytes().to_vec();
        self.local.mark_utf8_if_needed(comment);
    }

    pub fn writer_version(&self) -> u16 {
        self.writer_version
    }

    pub fn set_writer_version(&mut self, version: u16) {
        self.writer_version = version;
    }

    pub fn disk_start(&self) -> u16 {
        self.disk_start
    }

    pub fn internal_attributes(&self) -> u16 {
        self.internal_attributes
    }

    pub fn external_attributes(&self) -> u32 {
        self.external_attributes
    }

    pub fn set_external_attributes(&mut self, attributes: u32) {
        self.external_attributes = attributes;
    }

    pub fn local_header_offset(&self) -> u64 {
        self.local_header_offset
    }

    pub fn set_local_header_offset(&mut self, offset: u64) {
        self.local_header_offset = offset;
    }

    /// Whether a local header describes the same member as this record.
    ///
    /// Sizes and CRC are only compared when the local header carries them.
    pub fn matches_local(&self, local: &LocalEntry) -> bool {
        let same_data = local.has_data_descriptor()
            || (self.local.crc32 == local.crc32
                && self.local.compressed_size == local.compressed_size
                && self.local.uncompressed_size == local.uncompressed_size);
        self.local.raw_name == local.raw_name && self.local.method == local.method && same_data
    }
}

impl fmt::Display for CentralDirectoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.local.fmt(f)
    }
}

/// End of Central Directory (EOCD) - 22 bytes minimum
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub disk_with_cd: u16,
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment: String,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: &'static [u8] = b"PK\x05\x06";
    pub const SIGNATURE_U32: u32 = 0x0605_4b50;
    pub const SIZE: usize = 22;

    /// A single-disk trailer for `entries` records occupying `cd_size`
    /// bytes starting at `cd_offset`.
    pub fn new(entries: usize, cd_size: u64, cd_offset: u64, comment: &str) -> Result<Self> {
        let count = u16::try_from(entries).map_err(|_| {
            ZipError::state(format!(
                "{entries} entries exceed the 65535 a ZIP archive can record"
            ))
        })?;
        Ok(Self {
            disk_number: 0,
            disk_with_cd: 0,
            disk_entries: count,
            total_entries: count,
            cd_size: check_u32_value("central directory size", cd_size)?,
            cd_offset: check_u32_value("central directory offset", cd_offset)?,
            comment: comment.to_string(),
        })
    }

    /// Parse a trailer from `data`, which starts at the signature and
    /// extends at least to the end of the fixed part. The comment is taken
    /// from whatever follows, up to its recorded length.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(ZipError::format("truncated End of Central Directory"));
        }

        // Verify signature
        if &data[0..4] != Self::SIGNATURE {
            return Err(ZipError::format("invalid End of Central Directory signature"));
        }

        let mut cursor = Cursor::new(&data[4..]);
        let disk_number = cursor.read_u16::<LittleEndian>()?;
        let disk_with_cd = cursor.read_u16::<LittleEndian>()?;
        let disk_entries = cursor.read_u16::<LittleEndian>()?;
        let total_entries = cursor.read_u16::<LittleEndian>()?;
        let cd_size = cursor.read_u32::<LittleEndian>()?;
        let cd_offset = cursor.read_u32::<LittleEndian>()?;
        let comment_len = cursor.read_u16::<LittleEndian>()? as usize;

        let comment_end = (Self::SIZE + comment_len).min(data.len());
        let comment = String::from_utf8_lossy(&data[Self::SIZE..comment_end]).into_owned();

        Ok(Self {
            disk_number,
            disk_with_cd,
            disk_entries,
            total_entries,
            cd_size,
            cd_offset,
            comment,
        })
    }

    pub fn write(&self, writer: &mut impl Write) -> Result<()> {
        let comment_len = check_u16_len("archive comment", self.comment.len())?;
        let mut buf = Vec::with_capacity(self.header_size());
        buf.write_u32::<LittleEndian>(Self::SIGNATURE_U32)?;
        buf.write_u16::<LittleEndian>(self.disk_number)?;
        buf.write_u16::<LittleEndian>(self.disk_with_cd)?;
        buf.write_u16::<LittleEndian>(self.disk_entries)?;
        buf.write_u16::<LittleEndian>(self.total_entries)?;
        buf.write_u32::<LittleEndian>(self.cd_size)?;
        buf.write_u32::<LittleEndian>(self.cd_offset)?;
        buf.write_u16::<LittleEndian>(comment_len)?;
        buf.extend_from_slice(self.comment.as_bytes());
        writer.write_all(&buf)?;
        Ok(())
    }

    pub fn header_size(&self) -> usize {
        Self::SIZE + self.comment.len()
    }

    pub fn is_zip64(&self) -> bool {
        self.disk_entries == 0xFFFF
            || self.total_entries == 0xFFFF
            || self.cd_size == 0xFFFFFFFF
            || self.cd_offset == 0xFFFFFFFF
    }

    pub fn is_multi_disk(&self) -> bool {
        self.disk_number != 0 || self.disk_with_cd != 0 || self.disk_entries != self.total_entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_local() -> LocalEntry {
        let mut entry = LocalEntry::new("docs/readme.txt");
        entry.set_crc32(0xDEADBEEF);
        entry.set_size(1234);
        entry.set_compressed_size(567);
        entry.set_extra(vec![0xCA, 0xFE, 0x00, 0x00]);
        entry.set_unix_time(1_600_000_000);
        entry
    }

    #[test]
    fn local_header_size_matches_bytes_consumed() {
        let entry = sample_local();
        let mut bytes = Vec::new();
        entry.write(&mut bytes).unwrap();
        bytes.extend_from_slice(b"trailing data");
        assert_eq!(bytes.len(), entry.header_size() + 13);

        let mut cursor = Cursor::new(&bytes);
        let parsed = LocalEntry::from_reader(&mut cursor).unwrap();
        assert_eq!(cursor.position() as usize, entry.header_size());
        assert_eq!(parsed, entry);
        assert_eq!(parsed.file_name(), "readme.txt");
    }

    #[test]
    fn fields_are_little_endian_at_fixed_offsets() {
        let entry = sample_local();
        let mut bytes = Vec::new();
        entry.write(&mut bytes).unwrap();
        assert_eq!(&bytes[0..4], b"PK\x03\x04");
        assert_eq!(&bytes[8..10], &[8, 0]);
        assert_eq!(&bytes[14..18], &[0xEF, 0xBE, 0xAD, 0xDE]);
        assert_eq!(&bytes[22..26], &1234u32.to_le_bytes());
        assert_eq!(&bytes[26..28], &15u16.to_le_bytes());
        assert_eq!(&bytes[30..45], b"docs/readme.txt");
    }

    #[test]
    fn central_header_round_trip_keeps_comment_and_offset() {
        let mut entry = CentralDirectoryEntry::from_local(sample_local(), 98_765);
        entry.set_comment("a comment");
        let mut bytes = Vec::new();
        entry.write(&mut bytes).unwrap();
        assert_eq!(bytes.len(), entry.header_size());

        let parsed = CentralDirectoryEntry::from_reader(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(parsed.comment(), "a comment");
        assert_eq!(parsed.local_header_offset(), 98_765);
        assert_eq!(parsed.external_attributes(), DEFAULT_FILE_ATTRIBUTES);
        assert!(parsed.matches_local(&sample_local()));
        assert_eq!(parsed, entry);
    }

    #[test]
    fn wrong_signature_is_rejected_and_leaves_entry_invalid() {
        let mut entry = CentralDirectoryEntry::new("x");
        assert!(entry.local().is_valid());

        let mut bytes = Vec::new();
        sample_local().write(&mut bytes).unwrap();
        let err = entry.read(&mut Cursor::new(&bytes)).unwrap_err();
        assert!(err.is_format());
        assert!(!entry.local().is_valid());

        let mut local = LocalEntry::new("y");
        let err = local.read(&mut Cursor::new(b"PK\x01\x02rest")).unwrap_err();
        assert!(err.is_format());
        assert!(!local.is_valid());
    }

    #[test]
    fn oversized_fields_are_a_state_error_on_write() {
        let long = "n".repeat(70_000);
        let entry = LocalEntry::new(&long);
        let mut out = Vec::new();
        assert!(entry.write(&mut out).unwrap_err().is_invalid_state());
        assert!(out.is_empty());

        let mut big = sample_local();
        big.set_size(u32::MAX as u64 + 1);
        assert!(big.write(&mut out).unwrap_err().is_invalid_state());

        let mut far = CentralDirectoryEntry::new("far");
        far.set_local_header_offset(1 << 33);
        assert!(far.write(&mut out).unwrap_err().is_invalid_state());

        let mut chatty = CentralDirectoryEntry::new("chatty");
        chatty.set_comment(&"c".repeat(65_536));
        assert!(chatty.write(&mut out).unwrap_err().is_invalid_state());
        assert!(out.is_empty());
    }

    #[test]
    fn non_utf8_names_keep_their_stored_bytes() {
        let mut bytes = Vec::new();
        LocalEntry::new("x.txt").write(&mut bytes).unwrap();
        // CP437 u-umlaut in place of the 'x'
        bytes[30] = 0x81;

        let mut cursor = Cursor::new(&bytes);
        let parsed = LocalEntry::from_reader(&mut cursor).unwrap();
        assert_eq!(cursor.position() as usize, 35);
        assert_eq!(parsed.header_size(), 35);
        assert_eq!(parsed.raw_name(), b"\x81.txt");
        assert_eq!(parsed.name(), "\u{FFFD}.txt");

        let mut rewritten = Vec::new();
        parsed.write(&mut rewritten).unwrap();
        assert_eq!(rewritten, bytes);

        let mut record = Vec::new();
        let mut central = CentralDirectoryEntry::new("y.txt");
        central.set_comment("c");
        central.write(&mut record).unwrap();
        record[46] = 0x81;
        let last = record.len() - 1;
        record[last] = 0xFF;
        let parsed = CentralDirectoryEntry::from_reader(&mut Cursor::new(&record)).unwrap();
        assert_eq!(parsed.header_size(), record.len());
        assert!(!parsed.matches_local(central.local()));
    }

    #[test]
    fn names_are_normalized() {
        assert_eq!(normalize_name("./a\\b//c.txt"), "a/b/c.txt");
        assert_eq!(normalize_name("/abs/dir/"), "abs/dir/");
        assert!(LocalEntry::new("sub/dir/").is_directory());
        assert_eq!(LocalEntry::new("sub/dir/").file_name(), "dir");
    }

    #[test]
    fn utf8_flag_follows_name_and_comment() {
        let mut entry = CentralDirectoryEntry::new("plain.txt");
        assert_eq!(entry.local().gp_flags() & FLAG_UTF8, 0);
        entry.set_comment("café");
        assert_ne!(entry.local().gp_flags() & FLAG_UTF8, 0);

        let local = LocalEntry::new("naïve.txt");
        assert_ne!(local.gp_flags() & FLAG_UTF8, 0);
    }

    #[test]
    fn eocd_round_trip_with_comment() {
        let eocd = EndOfCentralDirectory::new(2, 120, 4000, "archive note").unwrap();
        let mut bytes = Vec::new();
        eocd.write(&mut bytes).unwrap();
        assert_eq!(bytes.len(), eocd.header_size());

        let parsed = EndOfCentralDirectory::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, eocd);
        assert!(!parsed.is_zip64());
        assert!(!parsed.is_multi_disk());

        assert!(EndOfCentralDirectory::from_bytes(&bytes[1..]).unwrap_err().is_format());
        assert!(EndOfCentralDirectory::new(70_000, 0, 0, "").unwrap_err().is_invalid_state());
    }
}
