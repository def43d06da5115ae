use std::error::Error;

use diesel::{sql_query, RunQueryDsl, SqliteConnection};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use repodex_config::MetadataType;

pub const PRIMARY_MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations/primary");
pub const FILELISTS_MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations/filelists");
pub const OTHER_MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations/other");

fn get_migrations(kind: MetadataType) -> EmbeddedMigrations {
    match kind {
        MetadataType::Primary => PRIMARY_MIGRATIONS,
        MetadataType::Filelists => FILELISTS_MIGRATIONS,
        MetadataType::Other => OTHER_MIGRATIONS,
    }
}

pub fn apply_migrations(
    conn: &mut SqliteConnection,
    kind: MetadataType,
) -> Result<(), Box<dyn Error + Send + Sync + 'static>> {
    loop {
        match conn.run_pending_migrations(get_migrations(kind)) {
            Ok(_) => break,
            Err(e) if e.to_string().contains("already exists") => {
                mark_first_pending(conn, kind)?;
            }
            Err(e) => return Err(e),
        }
    }

    Ok(())
}

fn mark_first_pending(
    conn: &mut SqliteConnection,
    kind: MetadataType,
) -> Result<(), Box<dyn Error + Send + Sync + 'static>> {
    let pending = conn.pending_migrations(get_migrations(kind))?;
    if let Some(first) = pending.first() {
        sql_query("INSERT INTO __diesel_schema_migrations (version) VALUES (?1)")
            .bind::<diesel::sql_types::Text, _>(first.name().version().to_string())
            .execute(conn)?;
    }

    Ok(())
}
