//! Fetching repository documents.
//!
//! A [`Fetcher`] turns a URL into a byte stream and nothing more: mirror
//! selection lives in [`crate::failover`] and retries are the caller's
//! business. Downloads of metadata documents are verified against the
//! checksum the manifest publishes before they are handed to the parser.

use std::{
    fs::{self, File},
    io::{self, BufWriter, Read, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use repodex_metadata::Checksum;
use repodex_utils::{fs::safe_remove, hash::HashingReader};
use tracing::{debug, trace};
use ureq::Agent;
use url::Url;

use crate::{constants::USER_AGENT, error::FetchError};

/// Source of repository documents.
pub trait Fetcher: Send + Sync {
    /// Opens `url` for reading.
    fn fetch(&self, url: &Url) -> Result<Box<dyn Read>, FetchError>;
}

/// Reads `file://` URLs from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileFetcher;

impl Fetcher for FileFetcher {
    fn fetch(&self, url: &Url) -> Result<Box<dyn Read>, FetchError> {
        if url.scheme() != "file" {
            return Err(FetchError::UnsupportedScheme {
                url: url.to_string(),
            });
        }
        let path = url.to_file_path().map_err(|()| {
            FetchError::UnsupportedScheme {
                url: url.to_string(),
            }
        })?;

        match File::open(&path) {
            Ok(file) => Ok(Box::new(file)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(FetchError::NotFound {
                    url: url.to_string(),
                })
            }
            Err(err) => {
                Err(FetchError::Io {
                    action: format!("opening {}", path.display()),
                    source: err,
                })
            }
        }
    }
}

/// Fetches `http` and `https` URLs.
#[derive(Clone)]
pub struct HttpFetcher {
    agent: Agent,
}

impl HttpFetcher {
    /// Builds an agent with the repodex user agent and an optional overall
    /// timeout per request.
    pub fn new(timeout: Option<Duration>) -> Self {
        let agent = Agent::config_builder()
            .timeout_global(timeout)
            .user_agent(USER_AGENT)
            .build()
            .into();
        Self { agent }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(Some(Duration::from_secs(120)))
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &Url) -> Result<Box<dyn Read>, FetchError> {
        trace!(%url, "GET");
        let response = self
            .agent
            .get(url.as_str())
            .call()
            .map_err(|err| FetchError::from(err).at(url.as_str()))?;
        Ok(Box::new(response.into_body().into_reader()))
    }
}

/// Dispatches on the URL scheme.
#[derive(Clone, Default)]
pub struct DefaultFetcher {
    file: FileFetcher,
    http: HttpFetcher,
}

impl Fetcher for DefaultFetcher {
    fn fetch(&self, url: &Url) -> Result<Box<dyn Read>, FetchError> {
        match url.scheme() {
            "file" => self.file.fetch(url),
            "http" | "https" => self.http.fetch(url),
            _ => {
                Err(FetchError::UnsupportedScheme {
                    url: url.to_string(),
                })
            }
        }
    }
}

/// Resolves a document location against a mirror base URL.
pub fn resolve(base: &Url, href: &str) -> Result<Url, FetchError> {
    base.join(href).map_err(|source| {
        FetchError::InvalidUrl {
            url: format!("{base}{href}"),
            source,
        }
    })
}

/// Reads a whole document into memory.
pub fn fetch_bytes(fetcher: &dyn Fetcher, url: &Url) -> Result<Vec<u8>, FetchError> {
    let mut reader = fetcher.fetch(url)?;
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes).map_err(|err| {
        FetchError::Io {
            action: format!("reading {url}"),
            source: err,
        }
    })?;
    Ok(bytes)
}

fn part_path(dest: &Path) -> PathBuf {
    let mut part = dest.as_os_str().to_owned();
    part.push(".part");
    PathBuf::from(part)
}

/// Downloads `url` to `dest`, verifying it against `expected`.
///
/// The document is streamed into a `.part` file and only renamed into
/// place once its digest matches. Returns the number of bytes written.
pub fn download_verified(
    fetcher: &dyn Fetcher,
    url: &Url,
    dest: &Path,
    expected: &Checksum,
) -> Result<u64, FetchError> {
    let algorithm = expected.algorithm().ok_or_else(|| {
        FetchError::UnsupportedChecksum {
            url: url.to_string(),
            algorithm: expected.algorithm.clone(),
        }
    })?;
    let io_err = |action: &str, err: io::Error| {
        FetchError::Io {
            action: format!("{action} {}", dest.display()),
            source: err,
        }
    };

    let part = part_path(dest);
    let mut reader = HashingReader::new(fetcher.fetch(url)?, &[algorithm]);
    let copied = (|| {
        let mut writer = BufWriter::new(File::create(&part)?);
        io::copy(&mut reader, &mut writer)?;
        writer.flush()
    })();
    if let Err(err) = copied {
        let _ = safe_remove(&part);
        return Err(io_err("writing", err));
    }

    let bytes = reader.bytes_read();
    let actual = reader
        .finalize()
        .pop()
        .map(|(_, digest)| digest)
        .unwrap_or_default();
    if !actual.eq_ignore_ascii_case(&expected.value) {
        let _ = safe_remove(&part);
        return Err(FetchError::ChecksumMismatch {
            url: url.to_string(),
            expected: expected.value.clone(),
            actual,
        });
    }

    fs::rename(&part, dest).map_err(|err| io_err("renaming into", err))?;
    debug!(%url, bytes, "downloaded {}", dest.display());
    Ok(bytes)
}
