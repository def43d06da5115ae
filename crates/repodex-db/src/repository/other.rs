//! Other store: package changelogs.

use diesel::prelude::*;
use repodex_metadata::ChangelogRecord;

use super::{IncrementalStore, DELETE_CHUNK, INSERT_CHUNK};
use crate::{
    macros::store_bookkeeping,
    models::ChangelogRow,
    schema::other::{changelog, packages},
};

/// Repository for package changelogs.
pub struct OtherRepository;

impl IncrementalStore for OtherRepository {
    type Record = ChangelogRecord;

    fn pkg_id(record: &ChangelogRecord) -> &str {
        &record.pkg_id
    }

    store_bookkeeping!(other);

    fn insert(conn: &mut SqliteConnection, record: &ChangelogRecord) -> QueryResult<i32> {
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
            .changelog
            .iter()
            .map(|entry| {
                (
                    changelog::pkg_key.eq(pkg_key),
                    changelog::author.eq(entry.author.as_str()),
                    changelog::date.eq(entry.date),
                    changelog::text.eq(entry.text.as_str()),
                )
            })
            .collect();
        for chunk in rows.chunks(INSERT_CHUNK) {
            diesel::insert_into(changelog::table)
                .values(chunk)
                .execute(conn)?;
        }

        Ok(pkg_key)
    }

    fn delete(conn: &mut SqliteConnection, pkg_keys: &[i32]) -> QueryResult<usize> {
        let mut removed = 0;
        for chunk in pkg_keys.chunks(DELETE_CHUNK) {
            diesel::delete(changelog::table.filter(changelog::pkg_key.eq_any(chunk)))
                .execute(conn)?;
            removed +=
                diesel::delete(packages::table.filter(packages::pkg_key.eq_any(chunk)))
                    .execute(conn)?;
        }
        Ok(removed)
    }
}

impl OtherRepository {
    pub fn count(conn: &mut SqliteConnection) -> QueryResult<i64> {
        packages::table.count().get_result(conn)
    }

    /// Changelog of the package with `pkg_id`, in document order.
    pub fn changelog_for(conn: &mut SqliteConnection, pkg_id: &str) -> QueryResult<Vec<ChangelogRow>> {
        changelog::table
            .inner_join(packages::table)
            .filter(packages::pkg_id.eq(pkg_id))
            .order(changelog::id.asc())
            .select(changelog::all_columns)
            .load::<ChangelogRow>(conn)
    }
}
