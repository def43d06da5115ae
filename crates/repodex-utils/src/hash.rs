//! Content digests used for metadata verification.
//!
//! Repository manifests name the algorithm of every checksum they publish
//! (`sha`, `sha1`, `sha256`, ...). [`ChecksumAlgorithm`] maps those names to
//! hashers, and [`HashingReader`] computes one or more digests while a byte
//! stream is being consumed by another reader.

use std::{
    fmt,
    fs::File,
    io::{self, Read},
    path::Path,
    str::FromStr,
};

use sha1::Sha1;
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};

use crate::error::{HashError, HashResult};

/// Checksum algorithms understood in repository manifests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChecksumAlgorithm {
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
    Blake3,
}

impl ChecksumAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChecksumAlgorithm::Sha1 => "sha1",
            ChecksumAlgorithm::Sha224 => "sha224",
            ChecksumAlgorithm::Sha256 => "sha256",
            ChecksumAlgorithm::Sha384 => "sha384",
            ChecksumAlgorithm::Sha512 => "sha512",
            ChecksumAlgorithm::Blake3 => "blake3",
        }
    }

    pub fn hasher(&self) -> Hasher {
        match self {
            ChecksumAlgorithm::Sha1 => Hasher::Sha1(Sha1::new()),
            ChecksumAlgorithm::Sha224 => Hasher::Sha224(Sha224::new()),
            ChecksumAlgorithm::Sha256 => Hasher::Sha256(Sha256::new()),
            ChecksumAlgorithm::Sha384 => Hasher::Sha384(Sha384::new()),
            ChecksumAlgorithm::Sha512 => Hasher::Sha512(Sha512::new()),
            ChecksumAlgorithm::Blake3 => Hasher::Blake3(Box::new(blake3::Hasher::new())),
        }
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            // `sha` is the legacy createrepo spelling of sha1
            "sha" | "sha1" => Ok(ChecksumAlgorithm::Sha1),
            "sha224" => Ok(ChecksumAlgorithm::Sha224),
            "sha256" => Ok(ChecksumAlgorithm::Sha256),
            "sha384" => Ok(ChecksumAlgorithm::Sha384),
            "sha512" => Ok(ChecksumAlgorithm::Sha512),
            "blake3" => Ok(ChecksumAlgorithm::Blake3),
            _ => {
                Err(HashError::UnsupportedAlgorithm {
                    name: s.to_string(),
                })
            }
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A running digest for one [`ChecksumAlgorithm`].
pub enum Hasher {
    Sha1(Sha1),
    Sha224(Sha224),
    Sha256(Sha256),
    Sha384(Sha384),
    Sha512(Sha512),
    Blake3(Box<blake3::Hasher>),
}

impl Hasher {
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Sha1(h) => h.update(data),
            Hasher::Sha224(h) => h.update(data),
            Hasher::Sha256(h) => h.update(data),
            Hasher::Sha384(h) => h.update(data),
            Hasher::Sha512(h) => h.update(data),
            Hasher::Blake3(h) => {
                h.update(data);
            }
        }
    }

    /// Consumes the hasher and returns the lowercase hex digest.
    pub fn finalize_hex(self) -> String {
        match self {
            Hasher::Sha1(h) => hex::encode(h.finalize()),
            Hasher::Sha224(h) => hex::encode(h.finalize()),
            Hasher::Sha256(h) => hex::encode(h.finalize()),
            Hasher::Sha384(h) => hex::encode(h.finalize()),
            Hasher::Sha512(h) => hex::encode(h.finalize()),
            Hasher::Blake3(h) => h.finalize().to_hex().to_string(),
        }
    }
}

/// A reader adapter that feeds every byte it yields into a set of hashers.
///
/// # Example
///
/// ```
/// use std::io::Read;
/// use repodex_utils::hash::{ChecksumAlgorithm, HashingReader};
///
/// let mut reader = HashingReader::new(&b"hello world\n"[..], &[ChecksumAlgorithm::Sha256]);
/// let mut sink = Vec::new();
/// reader.read_to_end(&mut sink).unwrap();
/// let digests = reader.finalize();
/// assert_eq!(
///     digests[0].1,
///     "a948904f2f0f479b8f8197694b30184b0d2ed1c1cd2a1ec0fb85d299a192a447"
/// );
/// ```
pub struct HashingReader<R> {
    inner: R,
    hashers: Vec<(ChecksumAlgorithm, Hasher)>,
    bytes_read: u64,
}

impl<R: Read> HashingReader<R> {
    pub fn new(inner: R, algorithms: &[ChecksumAlgorithm]) -> Self {
        Self {
            inner,
            hashers: algorithms.iter().map(|algo| (*algo, algo.hasher())).collect(),
            bytes_read: 0,
        }
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Returns the `(algorithm, hex digest)` pairs in construction order.
    pub fn finalize(self) -> Vec<(ChecksumAlgorithm, String)> {
        self.hashers
            .into_iter()
            .map(|(algo, hasher)| (algo, hasher.finalize_hex()))
            .collect()
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        for (_, hasher) in &mut self.hashers {
            hasher.update(&buf[..n]);
        }
        self.bytes_read += n as u64;
        Ok(n)
    }
}

/// Calculates the checksum of a file with the given algorithm.
///
/// # Errors
///
/// * [`HashError::ReadFailed`] if the file cannot be read.
///
/// # Example
///
/// ```no_run
/// use repodex_utils::error::HashResult;
/// use repodex_utils::hash::{calculate_checksum, ChecksumAlgorithm};
///
/// fn main() -> HashResult<()> {
///     let checksum = calculate_checksum("/path/to/primary.xml.gz", ChecksumAlgorithm::Sha256)?;
///     println!("Checksum is {}", checksum);
///     Ok(())
/// }
/// ```
pub fn calculate_checksum<P: AsRef<Path>>(
    file_path: P,
    algorithm: ChecksumAlgorithm,
) -> HashResult<String> {
    let file_path = file_path.as_ref();
    let read_failed = |err| {
        HashError::ReadFailed {
            path: file_path.to_path_buf(),
            source: err,
        }
    };

    if algorithm == ChecksumAlgorithm::Blake3 {
        let mut hasher = blake3::Hasher::new();
        hasher.update_mmap(file_path).map_err(read_failed)?;
        return Ok(hasher.finalize().to_hex().to_string());
    }

    let file = File::open(file_path).map_err(read_failed)?;
    let mut reader = HashingReader::new(file, &[algorithm]);
    io::copy(&mut reader, &mut io::sink()).map_err(read_failed)?;
    Ok(reader
        .finalize()
        .pop()
        .map(|(_, digest)| digest)
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use rstest::rstest;
    use tempfile::NamedTempFile;

    use super::*;

    const HELLO_SHA256: &str = "a948904f2f0f479b8f8197694b30184b0d2ed1c1cd2a1ec0fb85d299a192a447";
    const HELLO_SHA1: &str = "22596363b3de40b06f981fb85d82312e8c0ed511";
    const HELLO_BLAKE3: &str = "dc5a4edb8240b018124052c330270696f96771a63b45250a5c17d3000e823355";

    fn hello_file() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"hello world\n").unwrap();
        file
    }

    #[rstest]
    #[case("sha", ChecksumAlgorithm::Sha1)]
    #[case("sha1", ChecksumAlgorithm::Sha1)]
    #[case("SHA256", ChecksumAlgorithm::Sha256)]
    #[case("sha512", ChecksumAlgorithm::Sha512)]
    #[case("blake3", ChecksumAlgorithm::Blake3)]
    fn test_algorithm_from_str(#[case] input: &str, #[case] expected: ChecksumAlgorithm) {
        assert_eq!(input.parse::<ChecksumAlgorithm>().unwrap(), expected);
    }

    #[test]
    fn test_algorithm_unsupported() {
        assert!("md5".parse::<ChecksumAlgorithm>().is_err());
    }

    #[rstest]
    #[case(ChecksumAlgorithm::Sha256, HELLO_SHA256)]
    #[case(ChecksumAlgorithm::Sha1, HELLO_SHA1)]
    #[case(ChecksumAlgorithm::Blake3, HELLO_BLAKE3)]
    fn test_calculate_checksum(#[case] algorithm: ChecksumAlgorithm, #[case] expected: &str) {
        let file = hello_file();
        assert_eq!(calculate_checksum(file.path(), algorithm).unwrap(), expected);
    }

    #[test]
    fn test_calculate_checksum_file_not_found() {
        let result = calculate_checksum("/path/to/nonexistent/file", ChecksumAlgorithm::Sha256);
        assert!(result.is_err());
    }

    #[test]
    fn test_hashing_reader_multiple_digests() {
        let mut reader = HashingReader::new(
            &b"hello world\n"[..],
            &[ChecksumAlgorithm::Sha256, ChecksumAlgorithm::Blake3],
        );
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello world\n");
        assert_eq!(reader.bytes_read(), 12);

        let digests = reader.finalize();
        assert_eq!(digests[0], (ChecksumAlgorithm::Sha256, HELLO_SHA256.to_string()));
        assert_eq!(digests[1], (ChecksumAlgorithm::Blake3, HELLO_BLAKE3.to_string()));
    }
}
