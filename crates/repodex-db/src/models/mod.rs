//! Row types read from and written to the metadata stores.

pub mod primary;

use diesel::prelude::*;
use repodex_metadata::{ChangelogEntry, DepFlag, Dependency, FileKind, Nevra};

/// The single row of a store's `db_info` table.
#[derive(Debug, Clone, PartialEq, Eq, Queryable)]
pub struct DbInfo {
    pub dbversion: i32,
    pub checksum: String,
}

/// Identity columns shared by the `packages` table of every store.
#[derive(Debug, Clone, Queryable)]
pub struct PackageKey {
    pub pkg_key: i32,
    pub pkg_id: String,
    pub name: String,
    pub arch: String,
    pub epoch: String,
    pub version: String,
    pub release: String,
}

impl PackageKey {
    pub fn nevra(&self) -> Nevra {
        Nevra::new(
            &self.name,
            Some(&self.epoch),
            &self.version,
            &self.release,
            &self.arch,
        )
    }
}

/// A row of one of the four dependency tables.
#[derive(Debug, Clone, PartialEq, Eq, Queryable)]
pub struct DependencyRow {
    pub id: i32,
    pub pkg_key: i32,
    pub name: String,
    pub flags: Option<String>,
    pub epoch: Option<String>,
    pub version: Option<String>,
    pub release: Option<String>,
    pub pre: bool,
}

impl DependencyRow {
    pub fn to_dependency(&self) -> Dependency {
        Dependency {
            name: self.name.clone(),
            flags: self.flags.as_deref().and_then(|f| f.parse::<DepFlag>().ok()),
            epoch: self.epoch.clone(),
            version: self.version.clone(),
            release: self.release.clone(),
            pre: self.pre,
        }
    }
}

/// A row of the primary `files` table or the filelists `filelist` table.
#[derive(Debug, Clone, PartialEq, Eq, Queryable)]
pub struct FileRow {
    pub id: i32,
    pub pkg_key: i32,
    pub name: String,
    pub kind: String,
}

impl FileRow {
    pub fn file_kind(&self) -> FileKind {
        self.kind.parse().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Queryable)]
pub struct ChangelogRow {
    pub id: i32,
    pub pkg_key: i32,
    pub author: String,
    pub date: i64,
    pub text: String,
}

impl From<ChangelogRow> for ChangelogEntry {
    fn from(row: ChangelogRow) -> Self {
        ChangelogEntry {
            author: row.author,
            date: row.date,
            text: row.text,
        }
    }
}
