//! Filelists store: the complete file list of every package.

use diesel::prelude::*;
use repodex_metadata::FilelistEntry;

use super::{IncrementalStore, DELETE_CHUNK, INSERT_CHUNK};
use crate::{
    macros::store_bookkeeping,
    models::FileRow,
    schema::filelists::{filelist, packages},
};

/// Repository for full package file lists.
pub struct FilelistsRepository;

impl IncrementalStore for FilelistsRepository {
    type Record = FilelistEntry;

    fn pkg_id(record: &FilelistEntry) -> &str {
        &record.pkg_id
    }

    store_bookkeeping!(filelists);

    fn insert(conn: &mut SqliteConnection, record: &FilelistEntry) -> QueryResult<i32> {
        let nevra = &record.nevra;
        let pkg_key: i32 = diesel::insert_into(packages::table)
            .values((
                packages::pkg_id.eq(&record.pkg_id),
                packages::name.eq(&nevra.name),
                packages::arch.eq(&nevra.arch),
                packages::epoch.eq(&nevra.epoch),
                packages::version.eq(&nevra.version),
                packages::release.eq(&nevra.release),
            ))
            .returning(packages::pkg_key)
            .get_result(conn)?;

        let rows: Vec<_> = record
            .files
            .iter()
            .map(|(path, kind)| {
                (
                    filelist::pkg_key.eq(pkg_key),
                    filelist::name.eq(path.as_str()),
                    filelist::kind.eq(kind.as_str()),
                )
            })
            .collect();
        for chunk in rows.chunks(INSERT_CHUNK) {
            diesel::insert_into(filelist::table)
                .values(chunk)
                .execute(conn)?;
        }

        Ok(pkg_key)
    }

    fn delete(conn: &mut SqliteConnection, pkg_keys: &[i32]) -> QueryResult<usize> {
        let mut removed = 0;
        for chunk in pkg_keys.chunks(DELETE_CHUNK) {
            diesel::delete(filelist::table.filter(filelist::pkg_key.eq_any(chunk))).execute(conn)?;
            removed +=
                diesel::delete(packages::table.filter(packages::pkg_key.eq_any(chunk)))
                    .execute(conn)?;
        }
        Ok(removed)
    }
}

impl FilelistsRepository {
    pub fn count(conn: &mut SqliteConnection) -> QueryResult<i64> {
        packages::table.count().get_result(conn)
    }

    /// Every file of the package with `pkg_id`.
    pub fn files_for(conn: &mut SqliteConnection, pkg_id: &str) -> QueryResult<Vec<FileRow>> {
        filelist::table
            .inner_join(packages::table)
            .filter(packages::pkg_id.eq(pkg_id))
            .order(filelist::id.asc())
            .select(filelist::all_columns)
            .load::<FileRow>(conn)
    }

    /// Package ids of every package listing `path`.
    pub fn owners(conn: &mut SqliteConnection, path: &str) -> QueryResult<Vec<String>> {
        packages::table
            .filter(
                packages::pkg_key.eq_any(
                    filelist::table
                        .filter(filelist::name.eq(path))
                        .select(filelist::pkg_key),
                ),
            )
            .order(packages::pkg_key.asc())
            .select(packages::pkg_id)
            .load(conn)
    }
}
