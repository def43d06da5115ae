use diesel::prelude::*;
use repodex_metadata::{HeaderRange, Nevra, PackageRecord};

use crate::schema::primary::packages;

/// A row of the primary `packages` table.
///
/// Dependencies and files live in their own tables and are not part of the
/// row; [`PackageRow::into_record`] yields a record with both left empty.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = packages)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PackageRow {
    pub pkg_key: i32,
    pub pkg_id: String,
    pub name: String,
    pub arch: String,
    pub epoch: String,
    pub version: String,
    pub release: String,
    pub checksum_type: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub license: Option<String>,
    pub vendor: Option<String>,
    pub rpm_group: Option<String>,
    pub buildhost: Option<String>,
    pub sourcerpm: Option<String>,
    pub packager: Option<String>,
    pub time_file: i64,
    pub time_build: i64,
    pub size_package: i64,
    pub size_installed: i64,
    pub size_archive: i64,
    pub location_href: String,
    pub location_base: Option<String>,
    pub header_start: i64,
    pub header_end: i64,
}

impl PackageRow {
    pub fn nevra(&self) -> Nevra {
        Nevra::new(
            &self.name,
            Some(&self.epoch),
            &self.version,
            &self.release,
            &self.arch,
        )
    }

    pub fn into_record(self, repo_id: &str) -> PackageRecord {
        let nevra = self.nevra();
        let mut record = PackageRecord::new(repo_id, self.pkg_id, nevra);
        record.checksum_type = self.checksum_type;
        record.summary = self.summary;
        record.description = self.description;
        record.url = self.url;
        record.license = self.license;
        record.vendor = self.vendor;
        record.group = self.rpm_group;
        record.buildhost = self.buildhost;
        record.sourcerpm = self.sourcerpm;
        record.packager = self.packager;
        record.time_file = self.time_file as u64;
        record.time_build = self.time_build as u64;
        record.size_package = self.size_package as u64;
        record.size_installed = self.size_installed as u64;
        record.size_archive = self.size_archive as u64;
        record.location_href = self.location_href;
        record.location_base = self.location_base;
        record.header_range = HeaderRange {
            start: self.header_start as u64,
            end: self.header_end as u64,
        };
        record
    }
}

#[derive(Insertable)]
#[diesel(table_name = packages)]
pub struct NewPackage<'a> {
    pub pkg_id: &'a str,
    pub name: &'a str,
    pub arch: &'a str,
    pub epoch: &'a str,
    pub version: &'a str,
    pub release: &'a str,
    pub checksum_type: &'a str,
    pub summary: Option<&'a str>,
    pub description: Option<&'a str>,
    pub url: Option<&'a str>,
    pub license: Option<&'a str>,
    pub vendor: Option<&'a str>,
    pub rpm_group: Option<&'a str>,
    pub buildhost: Option<&'a str>,
    pub sourcerpm: Option<&'a str>,
    pub packager: Option<&'a str>,
    pub time_file: i64,
    pub time_build: i64,
    pub size_package: i64,
    pub size_installed: i64,
    pub size_archive: i64,
    pub location_href: &'a str,
    pub location_base: Option<&'a str>,
    pub header_start: i64,
    pub header_end: i64,
}

impl<'a> From<&'a PackageRecord> for NewPackage<'a> {
    fn from(record: &'a PackageRecord) -> Self {
        Self {
            pkg_id: &record.pkg_id,
            name: &record.nevra.name,
            arch: &record.nevra.arch,
            epoch: &record.nevra.epoch,
            version: &record.nevra.version,
            release: &record.nevra.release,
            checksum_type: &record.checksum_type,
            summary: record.summary.as_deref(),
            description: record.description.as_deref(),
            url: record.url.as_deref(),
            license: record.license.as_deref(),
            vendor: record.vendor.as_deref(),
            rpm_group: record.group.as_deref(),
            buildhost: record.buildhost.as_deref(),
            sourcerpm: record.sourcerpm.as_deref(),
            packager: record.packager.as_deref(),
            time_file: record.time_file as i64,
            time_build: record.time_build as i64,
            size_package: record.size_package as i64,
            size_installed: record.size_installed as i64,
            size_archive: record.size_archive as i64,
            location_href: &record.location_href,
            location_base: record.location_base.as_deref(),
            header_start: record.header_range.start as i64,
            header_end: record.header_range.end as i64,
        }
    }
}
