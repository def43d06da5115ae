//! Macros shared by the store repositories.
//!
//! The four dependency tables and the three `db_info` tables have identical
//! shapes but distinct diesel types, so code over them is generated rather
//! than written once per table.

/// Evaluates `$body` with `$table` bound to the primary-store module of the
/// dependency table for `$kind`.
///
/// ```ignore
/// let rows = with_dependency_table!(kind, t => {
///     t::table.filter(t::name.eq(name)).load::<DependencyRow>(conn)
/// })?;
/// ```
macro_rules! with_dependency_table {
    ($kind:expr, $table:ident => $body:expr) => {
        match $kind {
            ::repodex_metadata::DepKind::Provides => {
                use $crate::schema::primary::provides as $table;
                $body
            }
            ::repodex_metadata::DepKind::Requires => {
                use $crate::schema::primary::requires as $table;
                $body
            }
            ::repodex_metadata::DepKind::Conflicts => {
                use $crate::schema::primary::conflicts as $table;
                $body
            }
            ::repodex_metadata::DepKind::Obsoletes => {
                use $crate::schema::primary::obsoletes as $table;
                $body
            }
        }
    };
}

/// Generates the `db_info` and package-key accessors of
/// [`IncrementalStore`](crate::repository::IncrementalStore) for the store
/// whose schema module is `crate::schema::$store`.
macro_rules! store_bookkeeping {
    ($store:ident) => {
        fn info(
            conn: &mut ::diesel::SqliteConnection,
        ) -> ::diesel::QueryResult<Option<$crate::models::DbInfo>> {
            use ::diesel::prelude::*;
            use $crate::schema::$store::db_info;

            db_info::table
                .select((db_info::dbversion, db_info::checksum))
                .first::<$crate::models::DbInfo>(conn)
                .optional()
        }

        fn set_info(
            conn: &mut ::diesel::SqliteConnection,
            checksum: &str,
        ) -> ::diesel::QueryResult<()> {
            use ::diesel::prelude::*;
            use $crate::schema::$store::db_info;

            ::diesel::delete(db_info::table).execute(conn)?;
            ::diesel::insert_into(db_info::table)
                .values((
                    db_info::dbversion.eq($crate::connection::DB_VERSION),
                    db_info::checksum.eq(checksum),
                ))
                .execute(conn)?;
            Ok(())
        }

        fn pkg_keys(
            conn: &mut ::diesel::SqliteConnection,
        ) -> ::diesel::QueryResult<::std::collections::HashMap<String, i32>> {
            use ::diesel::prelude::*;
            use $crate::schema::$store::packages;

            let rows = packages::table
                .select((packages::pkg_id, packages::pkg_key))
                .load::<(String, i32)>(conn)?;
            Ok(rows.into_iter().collect())
        }
    };
}

pub(crate) use store_bookkeeping;
pub(crate) use with_dependency_table;
