//! Repository manifest (`repomd.xml`) parsing.
//!
//! The manifest lists one `<data>` entry per metadata document with its
//! location and checksum. While reading, the raw bytes are hashed so the
//! manifest itself can be identified without a second pass.

use std::{
    collections::BTreeMap,
    fs::File,
    io::{self, BufReader, Read},
    path::Path,
};

use repodex_config::MetadataType;
use repodex_utils::hash::{ChecksumAlgorithm, HashingReader};
use tracing::{debug, warn};

use crate::{
    error::ManifestError,
    xml::{new_reader, read_child, read_root, Child, Node, Root, XmlFailure},
};

/// Algorithms computed over the manifest bytes while parsing.
pub const MANIFEST_DIGESTS: [ChecksumAlgorithm; 2] =
    [ChecksumAlgorithm::Sha256, ChecksumAlgorithm::Blake3];

/// A checksum as written in the manifest.
#[derive(Debug, Clone)]
pub struct Checksum {
    pub algorithm: String,
    pub value: String,
}

impl Checksum {
    pub fn new(algorithm: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            algorithm: algorithm.into(),
            value: value.into(),
        }
    }

    /// The algorithm, if it is one we can compute.
    pub fn algorithm(&self) -> Option<ChecksumAlgorithm> {
        self.algorithm.parse().ok()
    }
}

impl PartialEq for Checksum {
    fn eq(&self, other: &Self) -> bool {
        let same_algo = match (self.algorithm(), other.algorithm()) {
            (Some(a), Some(b)) => a == b,
            _ => self.algorithm.eq_ignore_ascii_case(&other.algorithm),
        };
        same_algo && self.value.eq_ignore_ascii_case(&other.value)
    }
}

impl Eq for Checksum {}

/// One `<data>` entry of the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoData {
    pub data_type: String,
    pub location_href: String,
    pub location_base: Option<String>,
    pub checksum: Checksum,
    pub open_checksum: Option<Checksum>,
    pub timestamp: Option<u64>,
    pub size: Option<u64>,
    pub open_size: Option<u64>,
    pub database_version: Option<u32>,
}

impl RepoData {
    /// Final path segment of the location, e.g. `abc123-primary.xml.gz`.
    pub fn basename(&self) -> &str {
        self.location_href
            .rsplit('/')
            .next()
            .unwrap_or(&self.location_href)
    }

    fn from_node(node: &Node) -> Result<Self, String> {
        let data_type = node
            .attr_nonempty("type")
            .ok_or("missing 'type'")?
            .to_string();
        let location = node.child("location").ok_or("missing <location>")?;
        let href = location
            .attr_nonempty("href")
            .ok_or("missing location 'href'")?;
        let checksum = node
            .child("checksum")
            .filter(|c| !c.text.is_empty())
            .ok_or("missing <checksum>")?;

        let number = |name: &str| -> Result<Option<u64>, String> {
            node.child_text(name)
                .map(|v| v.parse().map_err(|_| format!("invalid <{name}> '{v}'")))
                .transpose()
        };

        Ok(Self {
            location_href: href.to_string(),
            location_base: location.attr_nonempty("base").map(str::to_string),
            checksum: Checksum::new(checksum.attr("type").unwrap_or("sha256"), &checksum.text),
            open_checksum: node
                .child("open-checksum")
                .filter(|c| !c.text.is_empty())
                .map(|c| Checksum::new(c.attr("type").unwrap_or("sha256"), &c.text)),
            timestamp: number("timestamp")?,
            size: number("size")?,
            open_size: number("open-size")?,
            database_version: number("database_version")?.and_then(|v| u32::try_from(v).ok()),
            data_type,
        })
    }
}

/// A distro tag, optionally qualified by a CPE id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistroTag {
    pub cpeid: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoTags {
    pub content: Vec<String>,
    pub repo: Vec<String>,
    pub distro: Vec<DistroTag>,
}

/// A parsed repository manifest.
#[derive(Debug, Clone)]
pub struct RepoMd {
    pub revision: Option<String>,
    pub tags: RepoTags,
    data: BTreeMap<String, RepoData>,
    digests: Vec<(ChecksumAlgorithm, String)>,
    length: u64,
}

impl RepoMd {
    /// Parses a manifest from `reader`, hashing every byte read.
    ///
    /// `document` names the source in error messages. Entries missing their
    /// location or checksum are skipped with a warning.
    pub fn parse<R: Read>(reader: R, document: &str) -> Result<Self, ManifestError> {
        let mut hashing = HashingReader::new(reader, &MANIFEST_DIGESTS);
        let mut repomd = Self::parse_entries(BufReader::new(&mut hashing), document)?;

        io::copy(&mut hashing, &mut io::sink()).map_err(|err| {
            ManifestError::IoError {
                action: format!("reading {document}"),
                source: err,
            }
        })?;
        repomd.length = hashing.bytes_read();
        repomd.digests = hashing.finalize();

        debug!(
            document,
            revision = repomd.revision.as_deref(),
            entries = repomd.data.len(),
            "parsed repository manifest"
        );
        Ok(repomd)
    }

    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let file = File::open(path).map_err(|err| {
            ManifestError::IoError {
                action: format!("opening {}", path.display()),
                source: err,
            }
        })?;
        Self::parse(file, &path.display().to_string())
    }

    fn parse_entries<R: io::BufRead>(inner: R, document: &str) -> Result<Self, ManifestError> {
        let to_error = |failure: XmlFailure| {
            match failure {
                XmlFailure::Syntax { position, reason } => {
                    ManifestError::Xml {
                        document: document.to_string(),
                        position,
                        reason,
                    }
                }
                XmlFailure::Eof { element } => {
                    ManifestError::Xml {
                        document: document.to_string(),
                        position: 0,
                        reason: format!("document ended inside <{element}>"),
                    }
                }
            }
        };

        let mut reader = new_reader(inner);
        let mut buf = Vec::new();
        let mut repomd = RepoMd {
            revision: None,
            tags: RepoTags::default(),
            data: BTreeMap::new(),
            digests: Vec::new(),
            length: 0,
        };

        let root = match read_root(&mut reader, &mut buf).map_err(to_error)? {
            Root::Open(root) => root,
            Root::Empty(root) if root.name == "repomd" => return Ok(repomd),
            Root::Empty(root) => root,
            Root::Missing => {
                return Err(ManifestError::Empty {
                    document: document.to_string(),
                })
            }
        };
        if root.name != "repomd" {
            return Err(ManifestError::UnexpectedRoot {
                document: document.to_string(),
                element: root.name,
            });
        }

        loop {
            let node = match read_child(&mut reader, &mut buf, "repomd").map_err(to_error)? {
                Child::End => break,
                Child::Element(node) => node,
            };
            match node.name.as_str() {
                "revision" => repomd.revision = Some(node.text).filter(|r| !r.is_empty()),
                "tags" => repomd.tags = parse_tags(&node),
                "data" => {
                    match RepoData::from_node(&node) {
                        Ok(data) => {
                            repomd.data.insert(data.data_type.clone(), data);
                        }
                        Err(reason) => {
                            warn!(document, %reason, "skipping manifest entry");
                        }
                    }
                }
                _ => {}
            }
        }

        Ok(repomd)
    }

    /// Entry for a raw manifest type such as `primary` or `primary_db`.
    pub fn get(&self, data_type: &str) -> Option<&RepoData> {
        self.data.get(data_type)
    }

    /// Entry for one of the XML metadata documents.
    pub fn metadata(&self, kind: MetadataType) -> Option<&RepoData> {
        self.get(kind.as_str())
    }

    pub fn entries(&self) -> impl Iterator<Item = &RepoData> {
        self.data.values()
    }

    /// Hex digest of the manifest bytes.
    pub fn digest(&self, algorithm: ChecksumAlgorithm) -> Option<&str> {
        self.digests
            .iter()
            .find(|(a, _)| *a == algorithm)
            .map(|(_, d)| d.as_str())
    }

    /// Number of manifest bytes read.
    pub fn length(&self) -> u64 {
        self.length
    }
}

fn parse_tags(node: &Node) -> RepoTags {
    let texts = |name: &str| {
        node.children_named(name)
            .filter(|c| !c.text.is_empty())
            .map(|c| c.text.clone())
            .collect()
    };
    RepoTags {
        content: texts("content"),
        repo: texts("repo"),
        distro: node
            .children_named("distro")
            .filter(|c| !c.text.is_empty())
            .map(|c| {
                DistroTag {
                    cpeid: c.attr_nonempty("cpeid").map(str::to_string),
                    name: c.text.clone(),
                }
            })
            .collect(),
    }
}
