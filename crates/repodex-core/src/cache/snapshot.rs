//! Snapshot files of the serialized cache.
//!
//! A snapshot is a small header followed by a zstd compressed JSON payload:
//!
//! ```text
//! magic "RPDXSNAP" | format version (u32 LE) | checksum length (u16 LE) | checksum | payload
//! ```
//!
//! Files are named `<stem>.<checksum>.snap`, where the stem is the basename
//! of the metadata location without createrepo's checksum prefix, so every
//! generation of the same document shares a file name prefix.

use std::{
    fs::File,
    io::{BufReader, Read},
    path::{Path, PathBuf},
};

use repodex_metadata::RepoData;
use repodex_utils::fs::{find_with_prefix, safe_remove, write_atomic};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::{
    constants::{SNAPSHOT_EXTENSION, SNAPSHOT_MAGIC, SNAPSHOT_VERSION, SNAPSHOT_ZSTD_LEVEL},
    error::CacheError,
};

/// Basename of the metadata location without a leading `<hex>-` prefix.
pub fn stem(data: &RepoData) -> &str {
    let basename = data.basename();
    match basename.split_once('-') {
        Some((head, rest))
            if head.len() >= 8 && head.chars().all(|c| c.is_ascii_hexdigit()) && !rest.is_empty() =>
        {
            rest
        }
        _ => basename,
    }
}

fn file_safe(checksum: &str) -> String {
    checksum
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Path of the snapshot for the document and checksum `data` describes.
pub fn snapshot_path(dir: &Path, data: &RepoData) -> PathBuf {
    dir.join(format!(
        "{}.{}.{SNAPSHOT_EXTENSION}",
        stem(data),
        file_safe(&data.checksum.value)
    ))
}

/// Every snapshot generation of the document, including leftovers of
/// interrupted writes.
pub fn generations(dir: &Path, data: &RepoData) -> Vec<PathBuf> {
    match find_with_prefix(dir, &format!("{}.", stem(data))) {
        Ok(paths) => paths,
        Err(err) => {
            warn!("cannot list cache directory: {err}");
            Vec::new()
        }
    }
}

/// Deletes every generation of the document except `keep`.
pub fn purge(dir: &Path, data: &RepoData, keep: Option<&Path>) -> usize {
    let mut removed = 0;
    for path in generations(dir, data) {
        if keep.is_some_and(|k| k == path) {
            continue;
        }
        match safe_remove(&path) {
            Ok(()) => {
                debug!("removed stale snapshot {}", path.display());
                removed += 1;
            }
            Err(err) => warn!("failed to remove stale snapshot: {err}"),
        }
    }
    removed
}

fn corrupt(path: &Path, reason: impl Into<String>) -> CacheError {
    CacheError::Corrupt {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

fn read_header<R: Read>(reader: &mut R, path: &Path) -> Result<String, CacheError> {
    let mut magic = [0u8; 8];
    reader
        .read_exact(&mut magic)
        .map_err(|err| corrupt(path, format!("reading header: {err}")))?;
    if magic != SNAPSHOT_MAGIC {
        return Err(corrupt(path, "not a snapshot file"));
    }

    let mut version = [0u8; 4];
    reader
        .read_exact(&mut version)
        .map_err(|err| corrupt(path, format!("reading header: {err}")))?;
    let version = u32::from_le_bytes(version);
    if version != SNAPSHOT_VERSION {
        return Err(corrupt(
            path,
            format!("format version {version}, expected {SNAPSHOT_VERSION}"),
        ));
    }

    let mut len = [0u8; 2];
    reader
        .read_exact(&mut len)
        .map_err(|err| corrupt(path, format!("reading header: {err}")))?;
    let mut checksum = vec![0u8; u16::from_le_bytes(len) as usize];
    reader
        .read_exact(&mut checksum)
        .map_err(|err| corrupt(path, format!("reading header: {err}")))?;
    String::from_utf8(checksum).map_err(|_| corrupt(path, "checksum is not UTF-8"))
}

fn open(path: &Path) -> Result<BufReader<File>, CacheError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|err| corrupt(path, format!("opening: {err}")))
}

/// Reads only the checksum recorded in the header.
pub fn read_checksum(path: &Path) -> Result<String, CacheError> {
    read_header(&mut open(path)?, path)
}

/// Reads a snapshot, requiring its recorded checksum to equal `checksum`.
pub fn read<T: DeserializeOwned>(path: &Path, checksum: &str) -> Result<T, CacheError> {
    let mut reader = open(path)?;
    let stored = read_header(&mut reader, path)?;
    if stored != checksum {
        return Err(corrupt(path, format!("recorded checksum {stored}")));
    }

    let decoder = zstd::Decoder::with_buffer(reader)
        .map_err(|err| corrupt(path, format!("decompressing: {err}")))?;
    serde_json::from_reader(decoder).map_err(|err| corrupt(path, format!("decoding: {err}")))
}

/// Writes a snapshot atomically.
pub fn write<T: Serialize>(path: &Path, checksum: &str, payload: &T) -> Result<(), CacheError> {
    let encode_err = |reason: String| {
        CacheError::Encode {
            path: path.to_path_buf(),
            reason,
        }
    };
    let checksum_len =
        u16::try_from(checksum.len()).map_err(|_| encode_err("checksum too long".into()))?;

    let mut bytes = Vec::with_capacity(64);
    bytes.extend_from_slice(&SNAPSHOT_MAGIC);
    bytes.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&checksum_len.to_le_bytes());
    bytes.extend_from_slice(checksum.as_bytes());

    let mut encoder =
        zstd::Encoder::new(bytes, SNAPSHOT_ZSTD_LEVEL).map_err(|e| encode_err(e.to_string()))?;
    serde_json::to_writer(&mut encoder, payload).map_err(|e| encode_err(e.to_string()))?;
    let bytes = encoder.finish().map_err(|e| encode_err(e.to_string()))?;

    write_atomic(path, &bytes).map_err(|err| {
        CacheError::Write {
            path: path.to_path_buf(),
            source: err,
        }
    })
}
