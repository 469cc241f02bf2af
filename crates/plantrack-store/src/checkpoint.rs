//! Durable checkpoint codec.
//!
//! Layout on disk (all multi-byte integers native-endian; the file never
//! leaves the host that wrote it):
//!
//! ```text
//! [ magic: u32 ][ format_version: u32 ]
//! [ host_signature_len: u32 ][ host_signature bytes ]
//! ( [ entry: ENTRY_DISK_LEN bytes ][ text_len: u32 ][ text bytes ] )*
//! [ sentinel entry, key (0,0), zeroed ]
//! [ record count: u32 ][ crc: u32 ]
//! ```
//!
//! The CRC32C covers every byte from the magic through the count. Writers
//! feed the running checksum as they emit; readers feed as they consume and
//! compare at the end, so truncation, bit rot, and a wrong count all surface
//! as corruption.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;

use tracing::warn;

use plantrack_core::error::{Error, Result};

use crate::entry::{StoreEntry, ENTRY_DISK_LEN};

pub const MAGIC: u32 = 0x00BC_6FB6;
pub const FORMAT_VERSION: u32 = 1;

/// Longest query text a record may carry; a bigger length field means the
/// stream is garbage, not a query.
const MAX_TEXT_LEN: u32 = 16 * 1024 * 1024;

/// The signature pinning a checkpoint to the writer that produced it. The
/// raw entry layout is native-endian and `size_of`-shaped, so crate version
/// and platform both participate.
pub fn host_signature() -> String {
    format!(
        "plantrack {} {}/{}",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

/// Outcome of reading a checkpoint file.
pub enum RestoreFile {
    /// No file on disk; a fresh system.
    Missing,
    /// A file from a different host/version; left alone, not loaded.
    ForeignHost,
    Loaded(Vec<(StoreEntry, String)>),
}

struct CrcWriter<W: Write> {
    inner: W,
    crc: u32,
}

impl<W: Write> CrcWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, crc: 0 }
    }

    fn put(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.crc = crc32c::crc32c_append(self.crc, bytes);
        self.inner.write_all(bytes)
    }

    /// Write without feeding the checksum; only the trailing CRC itself.
    fn put_unsummed(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.inner.write_all(bytes)
    }
}

struct CrcReader<R: Read> {
    inner: R,
    crc: u32,
}

impl<R: Read> CrcReader<R> {
    fn new(inner: R) -> Self {
        Self { inner, crc: 0 }
    }

    fn take(&mut self, buf: &mut [u8]) -> Result<()> {
        self.inner.read_exact(buf).map_err(truncated)?;
        self.crc = crc32c::crc32c_append(self.crc, buf);
        Ok(())
    }

    fn take_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.take(&mut buf)?;
        Ok(u32::from_ne_bytes(buf))
    }

    fn take_unsummed_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.inner.read_exact(&mut buf).map_err(truncated)?;
        Ok(u32::from_ne_bytes(buf))
    }
}

fn truncated(err: io::Error) -> Error {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        Error::Corruption("checkpoint file ends mid-record".into())
    } else {
        Error::Io(err)
    }
}

/// Write `records` to `path`, fsync, and return how many were written.
/// The caller owns temp-file naming and the atomic rename.
pub fn write_records(path: &Path, records: &[(StoreEntry, Arc<str>)]) -> Result<u32> {
    let file = File::create(path)?;
    let mut out = CrcWriter::new(BufWriter::new(file));

    out.put(&MAGIC.to_ne_bytes())?;
    out.put(&FORMAT_VERSION.to_ne_bytes())?;
    let host = host_signature();
    out.put(&(host.len() as u32).to_ne_bytes())?;
    out.put(host.as_bytes())?;

    let mut body = Vec::with_capacity(ENTRY_DISK_LEN);
    let mut count: u32 = 0;
    for (entry, text) in records {
        body.clear();
        entry.write_ne(&mut body);
        out.put(&body)?;
        out.put(&(text.len() as u32).to_ne_bytes())?;
        out.put(text.as_bytes())?;
        count += 1;
    }

    body.clear();
    StoreEntry::sentinel().write_ne(&mut body);
    out.put(&body)?;
    out.put(&count.to_ne_bytes())?;

    let crc = out.crc;
    out.put_unsummed(&crc.to_ne_bytes())?;

    let mut writer = out.inner;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(count)
}

/// Read and fully validate the checkpoint at `path`.
pub fn read_records(path: &Path) -> Result<RestoreFile> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(RestoreFile::Missing),
        Err(err) => return Err(err.into()),
    };
    let mut input = CrcReader::new(BufReader::new(file));

    let magic = input.take_u32()?;
    if magic != MAGIC {
        return Err(Error::Corruption(format!(
            "checkpoint file has incompatible magic {magic:#010x}, expected {MAGIC:#010x}"
        )));
    }
    let version = input.take_u32()?;
    if version != FORMAT_VERSION {
        return Err(Error::Corruption(format!(
            "checkpoint file has incompatible format version {version}, expected {FORMAT_VERSION}"
        )));
    }

    let host_len = input.take_u32()?;
    if host_len > 256 {
        return Err(Error::Corruption(format!(
            "implausible host signature length {host_len} in checkpoint file"
        )));
    }
    let mut host = vec![0u8; host_len as usize];
    input.take(&mut host)?;
    let host = String::from_utf8(host)
        .map_err(|_| Error::Corruption("host signature is not valid UTF-8".into()))?;
    if host != host_signature() {
        warn!(
            file_host = %host,
            current_host = %host_signature(),
            "checkpoint was written by a different host; leaving statistics empty"
        );
        return Ok(RestoreFile::ForeignHost);
    }

    let mut records = Vec::new();
    let mut body = vec![0u8; ENTRY_DISK_LEN];
    loop {
        input.take(&mut body)?;
        let entry = StoreEntry::from_ne_bytes(&body)?;
        if entry.is_sentinel() {
            break;
        }

        let text_len = input.take_u32()?;
        if text_len > MAX_TEXT_LEN {
            return Err(Error::Corruption(format!(
                "implausible query-text length {text_len} in checkpoint file"
            )));
        }
        let mut text = vec![0u8; text_len as usize];
        input.take(&mut text)?;
        let text = String::from_utf8(text)
            .map_err(|_| Error::Corruption("query text is not valid UTF-8".into()))?;

        records.push((entry, text));
    }

    let count = input.take_u32()?;
    if count as usize != records.len() {
        return Err(Error::Corruption(format!(
            "checkpoint record count {count} disagrees with {} records read",
            records.len()
        )));
    }

    let computed = input.crc;
    let stored = input.take_unsummed_u32()?;
    if stored != computed {
        return Err(Error::Corruption(format!(
            "checkpoint checksum mismatch: stored {stored:#010x}, computed {computed:#010x}"
        )));
    }

    Ok(RestoreFile::Loaded(records))
}
