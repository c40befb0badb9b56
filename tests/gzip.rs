use std::io::{Read, Write};

use flate2::read::GzDecoder;
use zipstream::GzipOutputStream;

#[test]
fn output_decodes_with_flate2() -> anyhow::Result<()> {
    let payload = b"gzip member body, ".repeat(2000);
    let mut gz = GzipOutputStream::new(Vec::new());
    gz.set_filename("body.txt")?;
    gz.set_comment("written by zipstream")?;
    gz.set_mtime(1_700_000_000)?;
    gz.set_level(9)?;
    gz.write_all(&payload)?;
    let bytes = gz.into_inner()?;
    assert!(bytes.len() < payload.len() / 10);

    let mut decoder = GzDecoder::new(&bytes[..]);
    let mut decoded = Vec::new();
    decoder.read_to_end(&mut decoded)?;
    assert_eq!(decoded, payload);

    let header = decoder.header().expect("gzip header");
    assert_eq!(header.filename(), Some(&b"body.txt"[..]));
    assert_eq!(header.comment(), Some(&b"written by zipstream"[..]));
    assert_eq!(header.mtime(), 1_700_000_000);
    Ok(())
}

#[test]
fn dropped_stream_is_still_complete() -> anyhow::Result<()> {
    let mut sink = Vec::new();
    {
        let mut gz = GzipOutputStream::new(&mut sink);
        gz.write_all(b"finished on drop")?;
    }

    let mut decoded = String::new();
    GzDecoder::new(&sink[..]).read_to_string(&mut decoded)?;
    assert_eq!(decoded, "finished on drop");
    Ok(())
}

#[test]
fn empty_member_is_valid() -> anyhow::Result<()> {
    let bytes = GzipOutputStream::new(Vec::new()).into_inner()?;
    let mut decoded = Vec::new();
    GzDecoder::new(&bytes[..]).read_to_end(&mut decoded)?;
    assert!(decoded.is_empty());
    Ok(())
}
