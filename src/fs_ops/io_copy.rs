//! Streaming copy that hashes while it writes.
//!
//! - Destination is created with `create_new(true)`; never clobbers.
//! - 1 MiB buffered reads and writes.
//! - Content is fed to SHA-256 as it is written, so verification needs no second read.
//! - The destination is fsynced before returning.
//!
//! Snapshot semantics: the source is read once from start to EOF; bytes appended
//! concurrently are not included, and the caller's hash comparison catches it.

use sha2::{Digest, Sha256};
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

use crate::context::ContentHash;

const BUF_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct CopyResult {
    pub bytes: u64,
    pub hash: ContentHash,
}

/// Writer adapter feeding every written byte into a digest.
struct HashingWriter<W> {
    inner: W,
    hasher: Sha256,
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

pub fn copy_hashing(src: &Path, dst: &Path) -> io::Result<CopyResult> {
    let src_f = File::open(src)?;
    let dst_f = OpenOptions::new().write(true).create_new(true).open(dst)?;

    let mut reader = BufReader::with_capacity(BUF_SIZE, src_f);
    let mut writer = HashingWriter {
        inner: BufWriter::with_capacity(BUF_SIZE, dst_f),
        hasher: Sha256::new(),
    };
    let bytes = io::copy(&mut reader, &mut writer)?;
    writer.flush()?;

    let HashingWriter { inner, hasher } = writer;
    let file = inner.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;

    Ok(CopyResult {
        bytes,
        hash: ContentHash::from_bytes(hasher.finalize().into()),
    })
}
