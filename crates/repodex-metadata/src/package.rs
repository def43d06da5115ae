//! Package records and the entries produced by the metadata parser.
//!
//! A [`PackageRecord`] is built once from a `<package>` element and never
//! mutated afterwards; callers share it behind an `Arc`.

use std::{cmp::Ordering, collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::evr::{compare_parts, normalize_epoch, Evr};

/// Name, epoch, version, release and architecture of a package.
///
/// Equality and hashing are on the literal strings (with the epoch
/// normalized); use [`Nevra::evr`] for rpm version ordering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Nevra {
    pub name: String,
    pub epoch: String,
    pub version: String,
    pub release: String,
    pub arch: String,
}

impl Nevra {
    pub fn new(
        name: impl Into<String>,
        epoch: Option<&str>,
        version: impl Into<String>,
        release: impl Into<String>,
        arch: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            epoch: normalize_epoch(epoch).to_string(),
            version: version.into(),
            release: release.into(),
            arch: arch.into(),
        }
    }

    pub fn evr(&self) -> Evr {
        Evr::new(Some(&self.epoch), &self.version, &self.release)
    }

    /// Orders by name, then by rpm EVR, then by arch.
    pub fn cmp_version(&self, other: &Self) -> Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.evr().cmp(&other.evr()))
            .then_with(|| self.arch.cmp(&other.arch))
    }
}

impl fmt::Display for Nevra {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-", self.name)?;
        if self.epoch != "0" {
            write!(f, "{}:", self.epoch)?;
        }
        write!(f, "{}-{}.{}", self.version, self.release, self.arch)
    }
}

impl FromStr for Nevra {
    type Err = String;

    /// Parses `name-[epoch:]version-release.arch`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || format!("'{s}' is not a valid name-[epoch:]version-release.arch");
        let (rest, arch) = s.rsplit_once('.').ok_or_else(invalid)?;
        let (rest, release) = rest.rsplit_once('-').ok_or_else(invalid)?;
        let (name, ev) = rest.rsplit_once('-').ok_or_else(invalid)?;
        let (epoch, version) = match ev.split_once(':') {
            Some((e, v)) => (Some(e), v),
            None => (None, ev),
        };
        if [name, version, release, arch].iter().any(|p| p.is_empty()) {
            return Err(invalid());
        }
        Ok(Nevra::new(name, epoch, version, release, arch))
    }
}

/// The four dependency relations a package declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepKind {
    Provides,
    Requires,
    Conflicts,
    Obsoletes,
}

impl DepKind {
    pub const ALL: [DepKind; 4] = [
        DepKind::Provides,
        DepKind::Requires,
        DepKind::Conflicts,
        DepKind::Obsoletes,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DepKind::Provides => "provides",
            DepKind::Requires => "requires",
            DepKind::Conflicts => "conflicts",
            DepKind::Obsoletes => "obsoletes",
        }
    }

    pub(crate) fn from_element(name: &[u8]) -> Option<Self> {
        match name {
            b"provides" => Some(DepKind::Provides),
            b"requires" => Some(DepKind::Requires),
            b"conflicts" => Some(DepKind::Conflicts),
            b"obsoletes" => Some(DepKind::Obsoletes),
            _ => None,
        }
    }
}

impl fmt::Display for DepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison operator of a versioned dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DepFlag {
    EQ,
    LT,
    LE,
    GT,
    GE,
}

impl DepFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            DepFlag::EQ => "EQ",
            DepFlag::LT => "LT",
            DepFlag::LE => "LE",
            DepFlag::GT => "GT",
            DepFlag::GE => "GE",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            DepFlag::EQ => "=",
            DepFlag::LT => "<",
            DepFlag::LE => "<=",
            DepFlag::GT => ">",
            DepFlag::GE => ">=",
        }
    }

    fn less(&self) -> bool {
        matches!(self, DepFlag::LT | DepFlag::LE)
    }

    fn greater(&self) -> bool {
        matches!(self, DepFlag::GT | DepFlag::GE)
    }

    fn equal(&self) -> bool {
        matches!(self, DepFlag::EQ | DepFlag::LE | DepFlag::GE)
    }
}

impl FromStr for DepFlag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EQ" | "=" | "==" => Ok(DepFlag::EQ),
            "LT" | "<" => Ok(DepFlag::LT),
            "LE" | "<=" => Ok(DepFlag::LE),
            "GT" | ">" => Ok(DepFlag::GT),
            "GE" | ">=" => Ok(DepFlag::GE),
            other => Err(format!("unknown dependency flag '{other}'")),
        }
    }
}

/// A single provides/requires/conflicts/obsoletes entry.
///
/// Unversioned entries have no flag and no version parts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    pub flags: Option<DepFlag>,
    pub epoch: Option<String>,
    pub version: Option<String>,
    pub release: Option<String>,
    /// Only meaningful for requires: needed by install scriptlets.
    #[serde(default)]
    pub pre: bool,
}

impl Dependency {
    pub fn unversioned(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flags: None,
            epoch: None,
            version: None,
            release: None,
            pre: false,
        }
    }

    pub fn versioned(
        name: impl Into<String>,
        flags: DepFlag,
        epoch: Option<&str>,
        version: impl Into<String>,
        release: Option<&str>,
    ) -> Self {
        Self {
            name: name.into(),
            flags: Some(flags),
            epoch: epoch.map(str::to_string),
            version: Some(version.into()),
            release: release.map(str::to_string),
            pre: false,
        }
    }

    fn parts(&self) -> (Option<&str>, &str, Option<&str>) {
        (
            self.epoch.as_deref(),
            self.version.as_deref().unwrap_or(""),
            self.release.as_deref(),
        )
    }

    /// Whether the version range of `self` overlaps the range of `other`.
    ///
    /// Names are not compared. An unversioned side matches anything.
    pub fn overlaps(&self, other: &Dependency) -> bool {
        let (Some(mine), Some(theirs)) = (self.flags, other.flags) else {
            return true;
        };
        if self.version.is_none() || other.version.is_none() {
            return true;
        }

        match compare_parts(self.parts(), other.parts()) {
            Ordering::Less => mine.greater() || theirs.less(),
            Ordering::Greater => mine.less() || theirs.greater(),
            Ordering::Equal => {
                (mine.equal() && theirs.equal())
                    || (mine.less() && theirs.less())
                    || (mine.greater() && theirs.greater())
            }
        }
    }

    /// Whether `provide` satisfies this requirement: same name and
    /// overlapping version ranges.
    pub fn satisfied_by(&self, provide: &Dependency) -> bool {
        self.name == provide.name && provide.overlaps(self)
    }

    /// Whether a package at exactly `evr` satisfies this (versioned) entry.
    pub fn matches_evr(&self, evr: &Evr) -> bool {
        let provided = Dependency::versioned(
            &self.name,
            DepFlag::EQ,
            Some(&evr.epoch),
            &evr.version,
            Some(&evr.release),
        );
        self.overlaps(&provided)
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if let (Some(flags), Some(version)) = (self.flags, &self.version) {
            write!(f, " {} ", flags.symbol())?;
            if let Some(epoch) = self.epoch.as_deref().filter(|e| *e != "0") {
                write!(f, "{epoch}:")?;
            }
            f.write_str(version)?;
            if let Some(release) = &self.release {
                write!(f, "-{release}")?;
            }
        }
        Ok(())
    }
}

/// Type of a file listed by a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    #[default]
    File,
    Dir,
    Ghost,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::File => "file",
            FileKind::Dir => "dir",
            FileKind::Ghost => "ghost",
        }
    }
}

impl FromStr for FileKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "file" => Ok(FileKind::File),
            "dir" => Ok(FileKind::Dir),
            "ghost" => Ok(FileKind::Ghost),
            other => Err(format!("unknown file type '{other}'")),
        }
    }
}

/// One changelog entry from the `other` document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangelogEntry {
    pub author: String,
    pub date: i64,
    pub text: String,
}

/// Byte range of the rpm header inside the package file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HeaderRange {
    pub start: u64,
    pub end: u64,
}

/// A package as described by the primary metadata document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    /// Tag of the repository this record was loaded from.
    pub repo_id: String,
    /// Checksum of the package file; unique per package.
    pub pkg_id: String,
    pub checksum_type: String,
    pub nevra: Nevra,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub license: Option<String>,
    pub vendor: Option<String>,
    pub group: Option<String>,
    pub buildhost: Option<String>,
    pub sourcerpm: Option<String>,
    pub packager: Option<String>,
    pub time_file: u64,
    pub time_build: u64,
    pub size_package: u64,
    pub size_installed: u64,
    pub size_archive: u64,
    pub location_href: String,
    pub location_base: Option<String>,
    pub header_range: HeaderRange,
    pub relations: BTreeMap<DepKind, Vec<Dependency>>,
    /// Files listed in primary; a subset of the full filelist.
    pub files: BTreeMap<String, FileKind>,
}

impl PackageRecord {
    pub fn new(repo_id: impl Into<String>, pkg_id: impl Into<String>, nevra: Nevra) -> Self {
        Self {
            repo_id: repo_id.into(),
            pkg_id: pkg_id.into(),
            checksum_type: "sha256".to_string(),
            nevra,
            summary: None,
            description: None,
            url: None,
            license: None,
            vendor: None,
            group: None,
            buildhost: None,
            sourcerpm: None,
            packager: None,
            time_file: 0,
            time_build: 0,
            size_package: 0,
            size_installed: 0,
            size_archive: 0,
            location_href: String::new(),
            location_base: None,
            header_range: HeaderRange::default(),
            relations: BTreeMap::new(),
            files: BTreeMap::new(),
        }
    }

    pub fn with_dependency(mut self, kind: DepKind, dep: Dependency) -> Self {
        self.relations.entry(kind).or_default().push(dep);
        self
    }

    pub fn with_file(mut self, path: impl Into<String>, kind: FileKind) -> Self {
        self.files.insert(path.into(), kind);
        self
    }

    pub fn name(&self) -> &str {
        &self.nevra.name
    }

    pub fn arch(&self) -> &str {
        &self.nevra.arch
    }

    pub fn evr(&self) -> Evr {
        self.nevra.evr()
    }

    pub fn dependencies(&self, kind: DepKind) -> &[Dependency] {
        self.relations.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether this package provides `name`, optionally within a version
    /// range. Every package implicitly provides its own name at its own EVR.
    pub fn provides(&self, wanted: &Dependency) -> bool {
        if self.nevra.name == wanted.name && wanted.matches_evr(&self.evr()) {
            return true;
        }
        self.dependencies(DepKind::Provides)
            .iter()
            .any(|p| wanted.satisfied_by(p))
    }
}

impl fmt::Display for PackageRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.nevra.fmt(f)
    }
}

/// Full file list of one package from the `filelists` document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilelistEntry {
    pub pkg_id: String,
    pub nevra: Nevra,
    pub files: BTreeMap<String, FileKind>,
}

/// Changelog of one package from the `other` document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangelogRecord {
    pub pkg_id: String,
    pub nevra: Nevra,
    pub changelog: Vec<ChangelogEntry>,
}

/// One item yielded by the streaming parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetadataEntry {
    Primary(PackageRecord),
    Filelist(FilelistEntry),
    Other(ChangelogRecord),
}

impl MetadataEntry {
    pub fn pkg_id(&self) -> &str {
        match self {
            MetadataEntry::Primary(p) => &p.pkg_id,
            MetadataEntry::Filelist(f) => &f.pkg_id,
            MetadataEntry::Other(o) => &o.pkg_id,
        }
    }

    pub fn nevra(&self) -> &Nevra {
        match self {
            MetadataEntry::Primary(p) => &p.nevra,
            MetadataEntry::Filelist(f) => &f.nevra,
            MetadataEntry::Other(o) => &o.nevra,
        }
    }
}
