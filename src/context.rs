//! Per-file handle carried through filter -> strategy -> mover.
//!
//! A `FileContext` owns the path, the metadata captured when the entry was
//! visited, and a lazily computed SHA-256 of the content. Operations that
//! consume the file on disk (relocation) take the context by value and return
//! a fresh one for the new location, so a stale handle cannot be reused.

use anyhow::Result;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::SystemTime;

use crate::fs_ops::io_error_with_help;
use crate::stats::{Section, Stats};

/// Name reported in statistics for the content digest.
pub const HASH_ALGORITHM: &str = "sha256";

const HASH_BUF_SIZE: usize = 1024 * 1024;

/// 256-bit content digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Hash everything a reader yields.
    pub fn of_reader<R: Read>(mut reader: R) -> io::Result<Self> {
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(Self(hasher.finalize().into()))
    }

    pub fn of_file(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        Self::of_reader(BufReader::with_capacity(HASH_BUF_SIZE, file))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Regular,
    Symlink,
    Dir,
    Other,
}

/// Stat snapshot captured when the context is opened.
#[derive(Debug, Clone)]
pub struct FileMeta {
    pub size: u64,
    pub mode: u32,
    pub modified: Option<SystemTime>,
    pub kind: FileKind,
}

impl FileMeta {
    pub fn from_metadata(meta: &fs::Metadata) -> Self {
        let ft = meta.file_type();
        let kind = if ft.is_symlink() {
            FileKind::Symlink
        } else if ft.is_dir() {
            FileKind::Dir
        } else if ft.is_file() {
            FileKind::Regular
        } else {
            FileKind::Other
        };

        #[cfg(unix)]
        let mode = {
            use std::os::unix::fs::PermissionsExt;
            meta.permissions().mode()
        };
        #[cfg(not(unix))]
        let mode = if meta.permissions().readonly() { 0o444 } else { 0o644 };

        Self {
            size: meta.len(),
            mode,
            modified: meta.modified().ok(),
            kind,
        }
    }
}

#[derive(Debug)]
pub struct FileContext {
    path: PathBuf,
    meta: FileMeta,
    hash: OnceLock<ContentHash>,
}

impl FileContext {
    /// Capture metadata without following a final symlink.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let meta = fs::symlink_metadata(&path).map_err(io_error_with_help("stat file", &path))?;
        Ok(Self {
            meta: FileMeta::from_metadata(&meta),
            path,
            hash: OnceLock::new(),
        })
    }

    /// Build a context for a path whose content hash is already known
    /// (e.g. the destination of a verified copy).
    pub fn with_hash(path: impl Into<PathBuf>, hash: ContentHash) -> Result<Self> {
        let ctx = Self::open(path)?;
        let _ = ctx.hash.set(hash);
        Ok(ctx)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn meta(&self) -> &FileMeta {
        &self.meta
    }

    pub fn size(&self) -> u64 {
        self.meta.size
    }

    pub fn modified(&self) -> Option<SystemTime> {
        self.meta.modified
    }

    pub fn file_name(&self) -> Option<&std::ffi::OsStr> {
        self.path.file_name()
    }

    /// True when the hash was already computed (or supplied).
    pub fn has_hash(&self) -> bool {
        self.hash.get().is_some()
    }

    /// Content hash, computed once on first use.
    ///
    /// Concurrent first calls may both read the file; only one result is kept.
    /// A context is owned by a single worker, so that race does not occur in practice.
    pub fn hash(&self) -> Result<ContentHash> {
        if let Some(h) = self.hash.get() {
            return Ok(*h);
        }
        let computed =
            ContentHash::of_file(&self.path).map_err(io_error_with_help("hash file", &self.path))?;
        Ok(*self.hash.get_or_init(|| computed))
    }

    /// `hash()` with timing and accounting; a cached value is not recounted.
    pub fn hash_tracked(&self, stats: &Stats) -> Result<ContentHash> {
        if let Some(h) = self.hash.get() {
            return Ok(*h);
        }
        let _timer = stats.time(Section::Hash);
        let h = self.hash()?;
        stats.hash_computed();
        Ok(h)
    }

    /// Consume this context and describe the same content at a new path.
    pub(crate) fn relocated(self, new_path: PathBuf) -> Result<Self> {
        let known = self.hash.into_inner();
        let ctx = Self::open(new_path)?;
        if let Some(h) = known {
            let _ = ctx.hash.set(h);
        }
        Ok(ctx)
    }
}
