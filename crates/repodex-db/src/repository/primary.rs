//! Primary store: packages, their dependencies and the files primary lists.

use diesel::{dsl::sql, prelude::*, sql_types::Text};
use repodex_metadata::{DepKind, Nevra, PackageRecord};

use super::{IncrementalStore, DELETE_CHUNK, INSERT_CHUNK};
use crate::{
    macros::{store_bookkeeping, with_dependency_table},
    models::{
        primary::{NewPackage, PackageRow},
        DependencyRow, FileRow,
    },
    schema::primary::{files, packages},
};

/// Repository for primary package metadata.
pub struct PrimaryRepository;

impl IncrementalStore for PrimaryRepository {
    type Record = PackageRecord;

    fn pkg_id(record: &PackageRecord) -> &str {
        &record.pkg_id
    }

    store_bookkeeping!(primary);

    fn insert(conn: &mut SqliteConnection, record: &PackageRecord) -> QueryResult<i32> {
        let pkg_key: i32 = diesel::insert_into(packages::table)
            .values(NewPackage::from(record))
            .returning(packages::pkg_key)
            .get_result(conn)?;

        for kind in DepKind::ALL {
            let deps = record.dependencies(kind);
            if deps.is_empty() {
                continue;
            }
            with_dependency_table!(kind, t => {
                let rows: Vec<_> = deps
                    .iter()
                    .map(|d| {
                        (
                            t::pkg_key.eq(pkg_key),
                            t::name.eq(d.name.as_str()),
                            t::flags.eq(d.flags.map(|f| f.as_str())),
                            t::epoch.eq(d.epoch.as_deref()),
                            t::version.eq(d.version.as_deref()),
                            t::release.eq(d.release.as_deref()),
                            t::pre.eq(d.pre),
                        )
                    })
                    .collect();
                for chunk in rows.chunks(INSERT_CHUNK) {
                    diesel::insert_into(t::table).values(chunk).execute(conn)?;
                }
            });
        }

        let rows: Vec<_> = record
            .files
            .iter()
            .map(|(path, kind)| {
                (
                    files::pkg_key.eq(pkg_key),
                    files::name.eq(path.as_str()),
                    files::kind.eq(kind.as_str()),
                )
            })
            .collect();
        for chunk in rows.chunks(INSERT_CHUNK) {
            diesel::insert_into(files::table).values(chunk).execute(conn)?;
        }

        Ok(pkg_key)
    }

    fn delete(conn: &mut SqliteConnection, pkg_keys: &[i32]) -> QueryResult<usize> {
        let mut removed = 0;
        for chunk in pkg_keys.chunks(DELETE_CHUNK) {
            for kind in DepKind::ALL {
                with_dependency_table!(kind, t => {
                    diesel::delete(t::table.filter(t::pkg_key.eq_any(chunk))).execute(conn)?;
                });
            }
            diesel::delete(files::table.filter(files::pkg_key.eq_any(chunk))).execute(conn)?;
            removed +=
                diesel::delete(packages::table.filter(packages::pkg_key.eq_any(chunk)))
                    .execute(conn)?;
        }
        Ok(removed)
    }
}

impl PrimaryRepository {
    /// Counts stored packages.
    pub fn count(conn: &mut SqliteConnection) -> QueryResult<i64> {
        packages::table.count().get_result(conn)
    }

    /// Lists all packages ordered by name.
    pub fn list_all(conn: &mut SqliteConnection) -> QueryResult<Vec<PackageRow>> {
        packages::table
            .order((packages::name.asc(), packages::pkg_key.asc()))
            .select(PackageRow::as_select())
            .load(conn)
    }

    pub fn find_by_pkg_id(conn: &mut SqliteConnection, pkg_id: &str) -> QueryResult<Option<PackageRow>> {
        packages::table
            .filter(packages::pkg_id.eq(pkg_id))
            .select(PackageRow::as_select())
            .first(conn)
            .optional()
    }

    /// Finds packages by pkg_id, in chunks to stay under the bind limit.
    pub fn find_by_pkg_ids(
        conn: &mut SqliteConnection,
        pkg_ids: &[String],
    ) -> QueryResult<Vec<PackageRow>> {
        let mut rows = Vec::with_capacity(pkg_ids.len());
        for chunk in pkg_ids.chunks(DELETE_CHUNK) {
            rows.extend(
                packages::table
                    .filter(packages::pkg_id.eq_any(chunk))
                    .select(PackageRow::as_select())
                    .load(conn)?,
            );
        }
        Ok(rows)
    }

    /// Finds packages by exact name, optionally restricted to one arch.
    pub fn find_by_name(
        conn: &mut SqliteConnection,
        name: &str,
        arch: Option<&str>,
    ) -> QueryResult<Vec<PackageRow>> {
        let mut query = packages::table
            .filter(packages::name.eq(name))
            .into_boxed();

        if let Some(arch) = arch {
            query = query.filter(packages::arch.eq(arch));
        }

        query
            .order(packages::pkg_key.asc())
            .select(PackageRow::as_select())
            .load(conn)
    }

    pub fn find_by_nevra(conn: &mut SqliteConnection, nevra: &Nevra) -> QueryResult<Vec<PackageRow>> {
        packages::table
            .filter(packages::name.eq(&nevra.name))
            .filter(packages::epoch.eq(&nevra.epoch))
            .filter(packages::version.eq(&nevra.version))
            .filter(packages::release.eq(&nevra.release))
            .filter(packages::arch.eq(&nevra.arch))
            .select(PackageRow::as_select())
            .load(conn)
    }

    /// Finds packages whose name matches a shell glob, using SQLite `GLOB`.
    pub fn find_by_name_glob(
        conn: &mut SqliteConnection,
        pattern: &str,
    ) -> QueryResult<Vec<PackageRow>> {
        packages::table
            .filter(sql::<diesel::sql_types::Bool>("name GLOB ").bind::<Text, _>(pattern))
            .order((packages::name.asc(), packages::pkg_key.asc()))
            .select(PackageRow::as_select())
            .load(conn)
    }

    /// Finds packages declaring a `kind` dependency on `name`.
    pub fn find_with_dependency(
        conn: &mut SqliteConnection,
        kind: DepKind,
        name: &str,
    ) -> QueryResult<Vec<PackageRow>> {
        with_dependency_table!(kind, t => {
            packages::table
                .filter(
                    packages::pkg_key.eq_any(
                        t::table.filter(t::name.eq(name)).select(t::pkg_key),
                    ),
                )
                .order(packages::pkg_key.asc())
                .select(PackageRow::as_select())
                .load(conn)
        })
    }

    /// Finds packages whose primary file list contains `path`.
    pub fn find_owning_file(conn: &mut SqliteConnection, path: &str) -> QueryResult<Vec<PackageRow>> {
        packages::table
            .filter(
                packages::pkg_key.eq_any(
                    files::table
                        .filter(files::name.eq(path))
                        .select(files::pkg_key),
                ),
            )
            .order(packages::pkg_key.asc())
            .select(PackageRow::as_select())
            .load(conn)
    }

    /// Dependency rows of one package, in document order.
    pub fn dependencies(
        conn: &mut SqliteConnection,
        kind: DepKind,
        pkg_key: i32,
    ) -> QueryResult<Vec<DependencyRow>> {
        with_dependency_table!(kind, t => {
            t::table
                .filter(t::pkg_key.eq(pkg_key))
                .order(t::id.asc())
                .load::<DependencyRow>(conn)
        })
    }

    /// Primary file rows of one package.
    pub fn files(conn: &mut SqliteConnection, pkg_key: i32) -> QueryResult<Vec<FileRow>> {
        files::table
            .filter(files::pkg_key.eq(pkg_key))
            .order(files::id.asc())
            .load::<FileRow>(conn)
    }

    /// Loads a package with every dependency and primary file.
    pub fn load_record(
        conn: &mut SqliteConnection,
        row: PackageRow,
        repo_id: &str,
    ) -> QueryResult<PackageRecord> {
        let pkg_key = row.pkg_key;
        let mut record = row.into_record(repo_id);
        for kind in DepKind::ALL {
            let deps = Self::dependencies(conn, kind, pkg_key)?;
            if !deps.is_empty() {
                record
                    .relations
                    .insert(kind, deps.iter().map(DependencyRow::to_dependency).collect());
            }
        }
        record.files = Self::files(conn, pkg_key)?
            .into_iter()
            .map(|f| {
                let kind = f.file_kind();
                (f.name, kind)
            })
            .collect();
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use repodex_config::MetadataType;
    use repodex_metadata::{DepFlag, Dependency, FileKind};

    use super::*;
    use crate::{connection::DbConnection, error::DbError, repository::SyncStats, DB_VERSION};

    fn record(name: &str, pkg_id: &str) -> PackageRecord {
        PackageRecord::new(
            "base",
            pkg_id,
            Nevra::new(name, None, "1.0", "1", "x86_64"),
        )
        .with_dependency(
            DepKind::Provides,
            Dependency::versioned(name, DepFlag::EQ, Some("0"), "1.0", Some("1")),
        )
        .with_dependency(DepKind::Requires, Dependency::unversioned("libc.so.6"))
        .with_file(format!("/usr/bin/{name}"), FileKind::File)
    }

    fn open() -> (tempfile::TempDir, DbConnection) {
        let dir = tempfile::tempdir().unwrap();
        let db = DbConnection::open(dir.path().join("primary.sqlite"), MetadataType::Primary)
            .unwrap();
        (dir, db)
    }

    fn sync(db: &mut DbConnection, checksum: &str, records: &[PackageRecord]) -> SyncStats {
        PrimaryRepository::sync(
            db.conn(),
            checksum,
            records.iter().cloned().map(Ok::<_, DbError>),
        )
        .unwrap()
    }

    fn provide_row_ids(db: &mut DbConnection, pkg_id: &str) -> (i32, Vec<i32>) {
        let row = PrimaryRepository::find_by_pkg_id(db.conn(), pkg_id)
            .unwrap()
            .unwrap();
        let ids = PrimaryRepository::dependencies(db.conn(), DepKind::Provides, row.pkg_key)
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        (row.pkg_key, ids)
    }

    #[test]
    fn test_incremental_sync_keeps_unchanged_rows() {
        let (_dir, mut db) = open();
        let d1 = [record("a", "id-a"), record("b", "id-b"), record("c", "id-c")];
        let stats = sync(&mut db, "d1", &d1);
        assert_eq!(stats.added, 3);

        let b_before = provide_row_ids(&mut db, "id-b");
        let c_before = provide_row_ids(&mut db, "id-c");

        let d2 = [record("b", "id-b"), record("c", "id-c"), record("d", "id-d")];
        let stats = sync(&mut db, "d2", &d2);
        assert_eq!(stats.added, 1);
        assert_eq!(stats.removed, 1);
        assert_eq!(stats.unchanged, 2);

        let mut ids: Vec<_> = PrimaryRepository::pkg_keys(db.conn())
            .unwrap()
            .into_keys()
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["id-b", "id-c", "id-d"]);

        assert_eq!(provide_row_ids(&mut db, "id-b"), b_before);
        assert_eq!(provide_row_ids(&mut db, "id-c"), c_before);

        let info = PrimaryRepository::info(db.conn()).unwrap().unwrap();
        assert_eq!(info.checksum, "d2");
        assert_eq!(info.dbversion, DB_VERSION);

        // relation rows of the removed package are gone too
        assert!(PrimaryRepository::find_owning_file(db.conn(), "/usr/bin/a")
            .unwrap()
            .is_empty());
        assert!(PrimaryRepository::find_with_dependency(db.conn(), DepKind::Provides, "a")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_failed_stream_rolls_back() {
        let (_dir, mut db) = open();
        sync(&mut db, "d1", &[record("a", "id-a")]);

        let stream = vec![
            Ok(record("b", "id-b")),
            Err(DbError::QueryError("stream broke".into())),
        ];
        let result = PrimaryRepository::sync(db.conn(), "d2", stream);
        assert!(result.is_err());

        let info = PrimaryRepository::info(db.conn()).unwrap().unwrap();
        assert_eq!(info.checksum, "d1");
        let ids: Vec<_> = PrimaryRepository::pkg_keys(db.conn())
            .unwrap()
            .into_keys()
            .collect();
        assert_eq!(ids, vec!["id-a"]);
    }

    #[test]
    fn test_duplicate_pkg_ids_are_skipped() {
        let (_dir, mut db) = open();
        let stats = sync(&mut db, "d1", &[record("a", "id-a"), record("a", "id-a")]);
        assert_eq!(stats.added, 1);
        assert_eq!(stats.duplicates, 1);
    }

    #[test]
    fn test_queries_and_load_record() {
        let (_dir, mut db) = open();
        let foo = record("foo", "id-foo").with_dependency(
            DepKind::Obsoletes,
            Dependency::versioned("oldfoo", DepFlag::LT, None, "1.0", None),
        );
        sync(&mut db, "d1", &[foo.clone(), record("bar", "id-bar")]);

        assert_eq!(PrimaryRepository::count(db.conn()).unwrap(), 2);
        assert_eq!(
            PrimaryRepository::find_by_name(db.conn(), "foo", Some("x86_64"))
                .unwrap()
                .len(),
            1
        );
        assert!(PrimaryRepository::find_by_name(db.conn(), "foo", Some("aarch64"))
            .unwrap()
            .is_empty());
        assert_eq!(
            PrimaryRepository::find_by_nevra(db.conn(), &foo.nevra)
                .unwrap()
                .len(),
            1
        );
        assert_eq!(
            PrimaryRepository::find_by_name_glob(db.conn(), "f*")
                .unwrap()
                .len(),
            1
        );
        let obsoleting =
            PrimaryRepository::find_with_dependency(db.conn(), DepKind::Obsoletes, "oldfoo")
                .unwrap();
        assert_eq!(obsoleting[0].name, "foo");

        let row = PrimaryRepository::find_by_pkg_id(db.conn(), "id-foo")
            .unwrap()
            .unwrap();
        let loaded = PrimaryRepository::load_record(db.conn(), row, "base").unwrap();
        assert_eq!(loaded, foo);
    }
}
