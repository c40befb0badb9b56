//! Archives written by `ZipOutputStream` read back through every reader.

use std::io::{Cursor, Read, Write};
use std::sync::Arc;

use flate2::Crc;
use flate2::read::DeflateDecoder;
use zipstream::zip::{EndOfCentralDirectory, ZipParser};
use zipstream::{
    CentralDirectoryEntry, CompressionMethod, FileCollection, FileEntry, MatchPath, ZipFile, ZipInputStream,
    ZipOutputStream,
};

fn crc(data: &[u8]) -> u32 {
    let mut crc = Crc::new();
    crc.update(data);
    crc.sum()
}

fn write_archive(members: &[(&str, Vec<u8>, CompressionMethod)], comment: &str) -> anyhow::Result<Vec<u8>> {
    let mut zip = ZipOutputStream::new(Cursor::new(Vec::new()));
    zip.set_comment(comment)?;
    for (name, data, method) in members {
        zip.set_method(*method)?;
        zip.put_next_entry(CentralDirectoryEntry::new(name))?;
        zip.write_all(data)?;
    }
    Ok(zip.into_inner()?.into_inner())
}

// ============================================================================
// End-to-end
// ============================================================================

#[test]
fn stored_and_deflated_members_read_back_in_order() -> anyhow::Result<()> {
    let repeated = vec![b'r'; 10_000];
    let bytes = write_archive(
        &[
            ("a.txt", b"hello".to_vec(), CompressionMethod::Stored),
            ("b/c.txt", repeated.clone(), CompressionMethod::Deflate),
        ],
        "",
    )?;

    let mut zip = ZipInputStream::new(Cursor::new(bytes.clone()));
    let mut seen = Vec::new();
    while let Some(entry) = zip.next_entry()? {
        let mut data = Vec::new();
        zip.read_to_end(&mut data)?;
        assert_eq!(data.len() as u64, entry.size());
        seen.push((entry.name().to_string(), entry.method(), data));
    }

    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0], ("a.txt".to_string(), CompressionMethod::Stored, b"hello".to_vec()));
    assert_eq!(seen[1], ("b/c.txt".to_string(), CompressionMethod::Deflate, repeated));

    let eocd = EndOfCentralDirectory::from_bytes(&bytes[bytes.len() - EndOfCentralDirectory::SIZE..])?;
    assert_eq!(eocd.total_entries, 2);
    Ok(())
}

#[test]
fn mixed_methods_keep_names_content_and_crc() -> anyhow::Result<()> {
    let members: Vec<(&str, Vec<u8>, CompressionMethod)> = vec![
        ("empty", Vec::new(), CompressionMethod::Stored),
        ("empty.z", Vec::new(), CompressionMethod::Deflate),
        ("bin/noise", (0..50_000u32).map(|i| (i.wrapping_mul(2_654_435_761) >> 24) as u8).collect(), CompressionMethod::Deflate),
        ("text/lines.txt", "line\n".repeat(3000).into_bytes(), CompressionMethod::Stored),
        ("naïve/ünïcode.txt", "grüße".as_bytes().to_vec(), CompressionMethod::Deflate),
    ];
    let bytes = write_archive(&members, "")?;

    let mut zip = ZipInputStream::new(Cursor::new(bytes));
    for (name, data, method) in &members {
        let entry = zip.next_entry()?.expect("entry");
        assert_eq!(entry.name(), *name);
        assert_eq!(entry.method(), *method);
        assert_eq!(entry.crc32(), crc(data));
        let mut read = Vec::new();
        zip.read_to_end(&mut read)?;
        assert_eq!(&read, data);
    }
    assert!(zip.next_entry()?.is_none());
    Ok(())
}

#[test]
fn deflated_member_decodes_with_an_independent_decoder() -> anyhow::Result<()> {
    let payload = b"the quick brown fox ".repeat(500);
    let bytes = write_archive(&[("fox.txt", payload.clone(), CompressionMethod::Deflate)], "")?;

    let parser = ZipParser::new(Arc::new(bytes.clone()));
    let (entries, _) = parser.list_files()?.expect("central directory");
    let entry = &entries[0];
    let start = entry.local_header_offset() as usize + entry.local().header_size();
    let end = start + entry.local().compressed_size() as usize;

    let mut decoded = Vec::new();
    DeflateDecoder::new(&bytes[start..end]).read_to_end(&mut decoded)?;
    assert_eq!(decoded, payload);
    Ok(())
}

// ============================================================================
// Partial reads and closing
// ============================================================================

#[test]
fn unread_members_are_skipped() -> anyhow::Result<()> {
    let bytes = write_archive(
        &[
            ("skip.bin", vec![1u8; 20_000], CompressionMethod::Deflate),
            ("half.bin", vec![2u8; 20_000], CompressionMethod::Stored),
            ("last.txt", b"done".to_vec(), CompressionMethod::Deflate),
        ],
        "",
    )?;

    let mut zip = ZipInputStream::new(Cursor::new(bytes));
    zip.next_entry()?;
    zip.next_entry()?;
    let mut half = vec![0u8; 10_000];
    zip.read_exact(&mut half)?;
    zip.close_entry()?;
    let position = zip.get_ref().position();
    zip.close_entry()?;
    assert_eq!(zip.get_ref().position(), position);

    let last = zip.next_entry()?.expect("last entry");
    assert_eq!(last.name(), "last.txt");
    let mut data = String::new();
    zip.read_to_string(&mut data)?;
    assert_eq!(data, "done");
    Ok(())
}

// ============================================================================
// Archive-backed collection
// ============================================================================

#[test]
fn zip_file_reads_what_the_stream_wrote() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("out.zip");
    {
        let mut zip = ZipOutputStream::new(std::fs::File::create(&path)?);
        zip.set_comment("on disk")?;
        let mut entry = CentralDirectoryEntry::new("docs/readme.md");
        entry.set_comment("the readme");
        entry.local_mut().set_unix_time(1_600_000_000);
        zip.put_next_entry(entry)?;
        zip.write_all(b"# readme")?;
        zip.put_next_entry(CentralDirectoryEntry::new("docs/"))?;
        zip.finish()?;
    }

    let mut zip = ZipFile::open(&path)?;
    assert_eq!(zip.comment(), "on disk");
    assert_eq!(zip.size()?, 2);

    let readme = zip.get_entry("readme.md", MatchPath::FileName)?.expect("readme");
    assert_eq!(FileEntry::comment(&readme), "the readme");
    assert_eq!(readme.unix_time(), 1_600_000_000);
    assert!(zip.get_entry("docs/", MatchPath::Exact)?.expect("dir").is_directory());

    let mut data = String::new();
    zip.input_stream("docs/readme.md", MatchPath::Exact)?
        .expect("stream")
        .read_to_string(&mut data)?;
    assert_eq!(data, "# readme");
    Ok(())
}

#[test]
fn header_sizes_match_bytes_consumed() -> anyhow::Result<()> {
    let bytes = write_archive(&[("sized/entry.dat", vec![9u8; 64], CompressionMethod::Stored)], "")?;
    let parser = ZipParser::new(Arc::new(bytes.clone()));
    let (entries, eocd) = parser.list_files()?.expect("central directory");

    let mut cursor = Cursor::new(&bytes[eocd.cd_offset as usize..]);
    let reread = CentralDirectoryEntry::from_reader(&mut cursor)?;
    assert_eq!(cursor.position() as usize, reread.header_size());
    assert_eq!(reread, entries[0]);
    Ok(())
}
