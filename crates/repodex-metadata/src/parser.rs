//! Streaming parser for the primary, filelists and other documents.
//!
//! The document type is taken from the root element. Entries are produced
//! one `<package>` at a time; unknown elements are skipped so newer
//! metadata revisions keep parsing.

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
    str::FromStr,
};

use quick_xml::Reader;
use repodex_config::MetadataType;
use tracing::{debug, trace};

use crate::{
    compression::decompress,
    error::{ErrorContext, ParseError},
    package::{
        ChangelogEntry, ChangelogRecord, DepFlag, DepKind, Dependency, FileKind, FilelistEntry,
        HeaderRange, MetadataEntry, Nevra, PackageRecord,
    },
    xml::{new_reader, read_child, read_root, Child, Node, Root, XmlFailure},
};

/// Iterator over the entries of one metadata document.
///
/// Yields `Err` for a package that is missing required data and keeps
/// going; a malformed or truncated document yields one final `Err` and
/// then `None`.
pub struct MetadataParser<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    document: String,
    repo_id: String,
    kind: MetadataType,
    root: String,
    expected: Option<u64>,
    seen: u64,
    done: bool,
}

impl MetadataParser<Box<dyn BufRead>> {
    /// Opens a possibly compressed metadata file.
    pub fn open(path: &Path, repo_id: &str) -> Result<Self, ParseError> {
        let file =
            File::open(path).with_context(|| format!("opening {}", path.display()))?;
        let reader = decompress(BufReader::new(file))
            .with_context(|| format!("detecting compression of {}", path.display()))?;
        let document = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        MetadataParser::new(reader, document, repo_id)
    }
}

impl<R: BufRead> MetadataParser<R> {
    /// Reads up to the root element and determines the document type.
    ///
    /// `document` names the source in error messages; `repo_id` is stamped
    /// on every produced [`PackageRecord`].
    pub fn new(
        inner: R,
        document: impl Into<String>,
        repo_id: impl Into<String>,
    ) -> Result<Self, ParseError> {
        let document = document.into();
        let mut reader = new_reader(inner);
        let mut buf = Vec::new();

        let (root, done) = match read_root(&mut reader, &mut buf) {
            Ok(Root::Open(root)) => (root, false),
            Ok(Root::Empty(root)) => (root, true),
            Ok(Root::Missing) => {
                return Err(ParseError::Truncated {
                    document,
                    element: "metadata".to_string(),
                })
            }
            Err(failure) => return Err(into_parse_error(&document, failure)),
        };

        let kind = match root.name.as_str() {
            "metadata" => MetadataType::Primary,
            "filelists" => MetadataType::Filelists,
            "otherdata" => MetadataType::Other,
            other => {
                return Err(ParseError::UnknownRoot {
                    document,
                    element: other.to_string(),
                })
            }
        };
        let expected = root.attr("packages").and_then(|p| p.parse().ok());
        debug!(%document, %kind, ?expected, "parsing metadata document");

        Ok(Self {
            reader,
            buf,
            document,
            repo_id: repo_id.into(),
            kind,
            root: root.name,
            expected,
            seen: 0,
            done,
        })
    }

    pub fn kind(&self) -> MetadataType {
        self.kind
    }

    /// Package count announced by the root element. Only a hint.
    pub fn expected_packages(&self) -> Option<u64> {
        self.expected
    }

    /// Number of `<package>` elements consumed so far.
    pub fn packages_seen(&self) -> u64 {
        self.seen
    }

    fn build(&self, node: &Node) -> Result<Option<MetadataEntry>, String> {
        match self.kind {
            MetadataType::Primary => {
                if node.attr("type").is_some_and(|t| t != "rpm") {
                    return Ok(None);
                }
                build_primary(node, &self.repo_id).map(|p| Some(MetadataEntry::Primary(p)))
            }
            MetadataType::Filelists => {
                build_filelist(node).map(|f| Some(MetadataEntry::Filelist(f)))
            }
            MetadataType::Other => build_other(node).map(|o| Some(MetadataEntry::Other(o))),
        }
    }
}

impl<R: BufRead> Iterator for MetadataParser<R> {
    type Item = Result<MetadataEntry, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            match read_child(&mut self.reader, &mut self.buf, &self.root) {
                Ok(Child::End) => {
                    self.done = true;
                    if self.expected.is_some_and(|n| n != self.seen) {
                        debug!(
                            document = %self.document,
                            expected = self.expected,
                            seen = self.seen,
                            "package count differs from header"
                        );
                    }
                }
                Ok(Child::Element(node)) if node.name == "package" => {
                    self.seen += 1;
                    match self.build(&node) {
                        Ok(Some(entry)) => return Some(Ok(entry)),
                        Ok(None) => trace!("skipping non-rpm package"),
                        Err(reason) => {
                            return Some(Err(ParseError::Package {
                                document: self.document.clone(),
                                package: package_label(&node),
                                reason,
                            }))
                        }
                    }
                }
                Ok(Child::Element(node)) => trace!(element = %node.name, "ignoring element"),
                Err(failure) => {
                    self.done = true;
                    return Some(Err(into_parse_error(&self.document, failure)));
                }
            }
        }
        None
    }
}

fn into_parse_error(document: &str, failure: XmlFailure) -> ParseError {
    match failure {
        XmlFailure::Syntax { position, reason } => {
            ParseError::Xml {
                document: document.to_string(),
                position,
                reason,
            }
        }
        XmlFailure::Eof { element } => {
            ParseError::Truncated {
                document: document.to_string(),
                element,
            }
        }
    }
}

fn package_label(node: &Node) -> String {
    node.child_text("name")
        .or_else(|| node.attr_nonempty("name"))
        .or_else(|| node.attr_nonempty("pkgid"))
        .unwrap_or("<unnamed>")
        .to_string()
}

fn required<T>(value: Option<T>, what: &str) -> Result<T, String> {
    value.ok_or_else(|| format!("missing {what}"))
}

fn number<T: FromStr + Default>(node: Option<&Node>, attr: &str) -> Result<T, String> {
    match node.and_then(|n| n.attr_nonempty(attr)) {
        Some(v) => v.parse().map_err(|_| format!("invalid {attr} '{v}'")),
        None => Ok(T::default()),
    }
}

fn nevra(name: &str, arch: &str, node: &Node) -> Result<Nevra, String> {
    let version = required(node.child("version"), "<version>")?;
    let ver = required(version.attr_nonempty("ver"), "version 'ver'")?;
    let rel = required(version.attr_nonempty("rel"), "version 'rel'")?;
    Ok(Nevra::new(name, version.attr("epoch"), ver, rel, arch))
}

fn dependency(entry: &Node) -> Result<Dependency, String> {
    let name = required(entry.attr_nonempty("name"), "dependency name")?;
    let flags = entry
        .attr_nonempty("flags")
        .map(DepFlag::from_str)
        .transpose()?;
    Ok(Dependency {
        name: name.to_string(),
        flags,
        epoch: entry.attr_nonempty("epoch").map(str::to_string),
        version: entry.attr_nonempty("ver").map(str::to_string),
        release: entry.attr_nonempty("rel").map(str::to_string),
        pre: matches!(entry.attr("pre"), Some("1" | "true")),
    })
}

fn file_entries<'a>(
    node: &'a Node,
) -> impl Iterator<Item = Result<(String, FileKind), String>> + 'a {
    node.children_named("file")
        .filter(|f| !f.text.is_empty())
        .map(|f| {
            let kind = FileKind::from_str(f.attr("type").unwrap_or(""))?;
            Ok((f.text.clone(), kind))
        })
}

fn build_primary(node: &Node, repo_id: &str) -> Result<PackageRecord, String> {
    let name = required(node.child_text("name"), "<name>")?;
    let arch = required(node.child_text("arch"), "<arch>")?;
    let nevra = nevra(name, arch, node)?;

    let checksum = required(node.child("checksum"), "<checksum>")?;
    if checksum.text.is_empty() {
        return Err("empty <checksum>".to_string());
    }
    let location = required(node.child("location"), "<location>")?;
    let href = required(location.attr_nonempty("href"), "location 'href'")?;

    let mut record = PackageRecord::new(repo_id, checksum.text.clone(), nevra);
    record.checksum_type = checksum.attr("type").unwrap_or("sha256").to_string();
    record.summary = node.child_text("summary").map(str::to_string);
    record.description = node.child_text("description").map(str::to_string);
    record.url = node.child_text("url").map(str::to_string);
    record.packager = node.child_text("packager").map(str::to_string);
    record.location_href = href.to_string();
    record.location_base = location.attr_nonempty("base").map(str::to_string);

    let time = node.child("time");
    record.time_file = number(time, "file")?;
    record.time_build = number(time, "build")?;
    let size = node.child("size");
    record.size_package = number(size, "package")?;
    record.size_installed = number(size, "installed")?;
    record.size_archive = number(size, "archive")?;

    if let Some(format) = node.child("format") {
        record.license = format.child_text("license").map(str::to_string);
        record.vendor = format.child_text("vendor").map(str::to_string);
        record.group = format.child_text("group").map(str::to_string);
        record.buildhost = format.child_text("buildhost").map(str::to_string);
        record.sourcerpm = format.child_text("sourcerpm").map(str::to_string);

        let range = format.child("header-range");
        record.header_range = HeaderRange {
            start: number(range, "start")?,
            end: number(range, "end")?,
        };

        for child in &format.children {
            let Some(kind) = DepKind::from_element(child.name.as_bytes()) else {
                continue;
            };
            let deps = child
                .children_named("entry")
                .map(dependency)
                .collect::<Result<Vec<_>, _>>()?;
            record.relations.entry(kind).or_default().extend(deps);
        }

        for file in file_entries(format) {
            let (path, kind) = file?;
            record.files.insert(path, kind);
        }
    }

    Ok(record)
}

fn build_filelist(node: &Node) -> Result<FilelistEntry, String> {
    let pkg_id = required(node.attr_nonempty("pkgid"), "'pkgid'")?;
    let name = required(node.attr_nonempty("name"), "'name'")?;
    let arch = required(node.attr_nonempty("arch"), "'arch'")?;
    let files = file_entries(node).collect::<Result<_, _>>()?;

    Ok(FilelistEntry {
        pkg_id: pkg_id.to_string(),
        nevra: nevra(name, arch, node)?,
        files,
    })
}

fn build_other(node: &Node) -> Result<ChangelogRecord, String> {
    let pkg_id = required(node.attr_nonempty("pkgid"), "'pkgid'")?;
    let name = required(node.attr_nonempty("name"), "'name'")?;
    let arch = required(node.attr_nonempty("arch"), "'arch'")?;

    let changelog = node
        .children_named("changelog")
        .map(|c| {
            Ok(ChangelogEntry {
                author: c.attr("author").unwrap_or_default().to_string(),
                date: number(Some(c), "date")?,
                text: c.text.clone(),
            })
        })
        .collect::<Result<Vec<_>, String>>()?;

    Ok(ChangelogRecord {
        pkg_id: pkg_id.to_string(),
        nevra: nevra(name, arch, node)?,
        changelog,
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const PRIMARY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<metadata xmlns="http://linux.duke.edu/metadata/common" xmlns:rpm="http://linux.duke.edu/metadata/rpm" packages="2">
<package type="rpm">
  <name>foo</name>
  <arch>x86_64</arch>
  <version epoch="0" ver="1.0" rel="1"/>
  <checksum type="sha256" pkgid="YES">aaa111</checksum>
  <summary>The foo tool</summary>
  <description>Does foo &amp; more.</description>
  <packager>Builder</packager>
  <url>https://example.org/foo</url>
  <time file="1700000000" build="1690000000"/>
  <size package="1234" installed="4321" archive="5000"/>
  <location href="Packages/f/foo-1.0-1.x86_64.rpm"/>
  <format>
    <rpm:license>MIT</rpm:license>
    <rpm:vendor>Example</rpm:vendor>
    <rpm:group>Applications</rpm:group>
    <rpm:buildhost>builder.example.org</rpm:buildhost>
    <rpm:sourcerpm>foo-1.0-1.src.rpm</rpm:sourcerpm>
    <rpm:header-range start="4504" end="9000"/>
    <rpm:provides>
      <rpm:entry name="foo" flags="EQ" epoch="0" ver="1.0" rel="1"/>
      <rpm:entry name="libfoo.so.1()(64bit)"/>
    </rpm:provides>
    <rpm:requires>
      <rpm:entry name="bar" flags="GE" epoch="0" ver="2.0"/>
      <rpm:entry name="/bin/sh" pre="1"/>
    </rpm:requires>
    <rpm:suggests>
      <rpm:entry name="baz"/>
    </rpm:suggests>
    <file>/usr/bin/foo</file>
    <file type="dir">/etc/foo</file>
  </format>
  <future-element>ignored</future-element>
</package>
<package type="rpm">
  <name>bar</name>
  <arch>noarch</arch>
  <version epoch="1" ver="2.1" rel="3"/>
  <checksum type="sha256" pkgid="YES">bbb222</checksum>
  <location href="Packages/b/bar-2.1-3.noarch.rpm"/>
</package>
</metadata>
"#;

    fn parse_all(xml: &str) -> Vec<Result<MetadataEntry, ParseError>> {
        MetadataParser::new(xml.as_bytes(), "test.xml", "base")
            .unwrap()
            .collect()
    }

    fn primary(entry: &Result<MetadataEntry, ParseError>) -> &PackageRecord {
        match entry {
            Ok(MetadataEntry::Primary(p)) => p,
            other => panic!("expected primary entry, got {other:?}"),
        }
    }

    #[test]
    fn test_primary_document() {
        let parser = MetadataParser::new(PRIMARY.as_bytes(), "primary.xml", "base").unwrap();
        assert_eq!(parser.kind(), MetadataType::Primary);
        assert_eq!(parser.expected_packages(), Some(2));

        let entries: Vec<_> = parser.collect();
        assert_eq!(entries.len(), 2);

        let foo = primary(&entries[0]);
        assert_eq!(foo.repo_id, "base");
        assert_eq!(foo.pkg_id, "aaa111");
        assert_eq!(foo.nevra.to_string(), "foo-1.0-1.x86_64");
        assert_eq!(foo.description.as_deref(), Some("Does foo & more."));
        assert_eq!(foo.license.as_deref(), Some("MIT"));
        assert_eq!(foo.size_package, 1234);
        assert_eq!(foo.time_build, 1690000000);
        assert_eq!(foo.header_range, HeaderRange { start: 4504, end: 9000 });
        assert_eq!(foo.dependencies(DepKind::Provides).len(), 2);
        assert_eq!(foo.dependencies(DepKind::Conflicts).len(), 0);

        let requires = foo.dependencies(DepKind::Requires);
        assert_eq!(requires[0].flags, Some(DepFlag::GE));
        assert_eq!(requires[0].release, None);
        assert!(requires[1].pre);

        assert_eq!(foo.files.get("/usr/bin/foo"), Some(&FileKind::File));
        assert_eq!(foo.files.get("/etc/foo"), Some(&FileKind::Dir));

        let bar = primary(&entries[1]);
        assert_eq!(bar.nevra.epoch, "1");
        assert_eq!(bar.summary, None);
    }

    #[test]
    fn test_missing_checksum_is_per_package() {
        let xml = r#"<metadata packages="2">
<package type="rpm">
  <name>broken</name><arch>noarch</arch><version ver="1" rel="1"/>
  <location href="broken.rpm"/>
</package>
<package type="rpm">
  <name>ok</name><arch>noarch</arch><version ver="1" rel="1"/>
  <checksum type="sha256">ccc</checksum><location href="ok.rpm"/>
</package>
</metadata>"#;
        let entries = parse_all(xml);
        assert_eq!(entries.len(), 2);
        match &entries[0] {
            Err(e @ ParseError::Package { package, .. }) => {
                assert_eq!(package, "broken");
                assert!(!e.is_fatal());
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(primary(&entries[1]).name(), "ok");
    }

    #[rstest::rstest]
    #[case::no_version("", "<checksum>c</checksum><location href=\"x.rpm\"/>", "<version>")]
    #[case::no_release(
        "<version ver=\"1\"/>",
        "<checksum>c</checksum><location href=\"x.rpm\"/>",
        "version 'rel'"
    )]
    #[case::empty_checksum(
        "<version ver=\"1\" rel=\"1\"/>",
        "<checksum></checksum><location href=\"x.rpm\"/>",
        "empty <checksum>"
    )]
    #[case::no_href("<version ver=\"1\" rel=\"1\"/>", "<checksum>c</checksum><location/>", "location 'href'")]
    fn test_required_primary_fields(
        #[case] version: &str,
        #[case] rest: &str,
        #[case] missing: &str,
    ) {
        let xml = format!(
            "<metadata><package type=\"rpm\"><name>pkg</name><arch>noarch</arch>{version}{rest}</package></metadata>"
        );
        let entries = parse_all(&xml);
        assert_eq!(entries.len(), 1);
        let err = entries[0].as_ref().err().map(ToString::to_string).unwrap_or_default();
        assert!(err.contains(missing), "{err}");
    }

    #[test]
    fn test_packages_attribute_is_only_a_hint() {
        let xml = r#"<metadata packages="7">
<package type="rpm">
  <name>ok</name><arch>noarch</arch><version ver="1" rel="1"/>
  <checksum>ccc</checksum><location href="ok.rpm"/>
</package>
</metadata>"#;
        let mut parser = MetadataParser::new(xml.as_bytes(), "test.xml", "base").unwrap();
        assert!(parser.next().unwrap().is_ok());
        assert!(parser.next().is_none());
        assert_eq!(parser.packages_seen(), 1);
    }

    #[test]
    fn test_truncated_document_ends_stream() {
        let xml = r#"<metadata packages="2">
<package type="rpm">
  <name>ok</name><arch>noarch</arch><version ver="1" rel="1"/>
  <checksum>ccc</checksum><location href="ok.rpm"/>
</package>
<package type="rpm"><name>cut"#;
        let entries = parse_all(xml);
        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_ok());
        assert!(entries[1].as_ref().is_err_and(ParseError::is_fatal));
    }

    #[test]
    fn test_unknown_root() {
        let err = MetadataParser::new(&b"<rss></rss>"[..], "feed.xml", "base")
            .err()
            .unwrap();
        assert!(matches!(err, ParseError::UnknownRoot { element, .. } if element == "rss"));
    }

    #[test]
    fn test_empty_root() {
        let entries = parse_all(r#"<metadata packages="0"/>"#);
        assert!(entries.is_empty());
    }

    #[test]
    fn test_filelists_document() {
        let xml = r#"<filelists xmlns="http://linux.duke.edu/metadata/filelists" packages="1">
<package pkgid="aaa111" name="foo" arch="x86_64">
  <version epoch="0" ver="1.0" rel="1"/>
  <file>/usr/bin/foo</file>
  <file type="dir">/usr/share/foo</file>
  <file type="ghost">/var/log/foo.log</file>
</package>
</filelists>"#;
        let entries = parse_all(xml);
        let Ok(MetadataEntry::Filelist(entry)) = &entries[0] else {
            panic!("expected filelist entry");
        };
        assert_eq!(entry.pkg_id, "aaa111");
        assert_eq!(entry.files.len(), 3);
        assert_eq!(entry.files.get("/var/log/foo.log"), Some(&FileKind::Ghost));
    }

    #[test]
    fn test_other_document() {
        let xml = r#"<otherdata packages="1">
<package pkgid="aaa111" name="foo" arch="x86_64">
  <version epoch="0" ver="1.0" rel="1"/>
  <changelog author="Dev &lt;dev@example.org&gt; - 1.0-1" date="1700000000">- Initial package</changelog>
  <changelog author="Dev" date="1700086400">- Fix build</changelog>
</package>
</otherdata>"#;
        let entries = parse_all(xml);
        let Ok(MetadataEntry::Other(record)) = &entries[0] else {
            panic!("expected other entry");
        };
        assert_eq!(record.changelog.len(), 2);
        assert_eq!(record.changelog[0].author, "Dev <dev@example.org> - 1.0-1");
        assert_eq!(record.changelog[1].date, 1700086400);
    }

    #[test]
    fn test_open_compressed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abc-primary.xml.gz");
        let file = std::fs::File::create(&path).unwrap();
        let mut enc = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        enc.write_all(PRIMARY.as_bytes()).unwrap();
        enc.finish().unwrap();

        let parser = MetadataParser::open(&path, "base").unwrap();
        assert_eq!(parser.count(), 2);
    }
}
