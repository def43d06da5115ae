//! Constants used throughout repodex-core.

/// Location of the manifest relative to a repository base URL.
pub const REPOMD_PATH: &str = "repodata/repomd.xml";

/// File name of the cached manifest inside a repository cache directory.
pub const REPOMD_FILE: &str = "repomd.xml";

/// Subdirectory of a repository cache directory holding downloaded
/// metadata documents until they are parsed.
pub const DOWNLOAD_DIR: &str = "download";

/// Magic bytes opening every snapshot file.
pub const SNAPSHOT_MAGIC: [u8; 8] = *b"RPDXSNAP";

/// Snapshot format version. Files written with another version are rebuilt.
pub const SNAPSHOT_VERSION: u32 = 3;

/// File extension of snapshot files.
pub const SNAPSHOT_EXTENSION: &str = "snap";

/// zstd level used for snapshot payloads.
pub const SNAPSHOT_ZSTD_LEVEL: i32 = 3;

/// Emit a progress event every this many packages.
pub const PROGRESS_INTERVAL: u64 = 500;

/// User agent sent by the HTTP fetcher.
pub const USER_AGENT: &str = concat!("repodex/", env!("CARGO_PKG_VERSION"));
