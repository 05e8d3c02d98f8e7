//! Embedded schema migrations applied through sqlx's migrator.

use std::collections::BTreeSet;

use async_trait::async_trait;
use sqlx::{
    PgPool,
    migrate::{MigrateError, Migrator},
};
use tracing::info;

use crate::application::migrations::{MigrationError, MigrationReport, MigrationRunner};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

#[derive(Clone)]
pub struct PostgresMigrationRunner {
    pool: PgPool,
}

impl PostgresMigrationRunner {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn applied_versions(&self) -> Result<BTreeSet<i64>, MigrationError> {
        let exists: bool =
            sqlx::query_scalar("SELECT to_regclass('_sqlx_migrations') IS NOT NULL")
                .fetch_one(&self.pool)
                .await
                .map_err(|err| MigrationError::Database(err.to_string()))?;
        if !exists {
            return Ok(BTreeSet::new());
        }

        let versions: Vec<i64> =
            sqlx::query_scalar("SELECT version FROM _sqlx_migrations WHERE success")
                .fetch_all(&self.pool)
                .await
                .map_err(|err| MigrationError::Database(err.to_string()))?;
        Ok(versions.into_iter().collect())
    }
}

#[async_trait]
impl MigrationRunner for PostgresMigrationRunner {
    async fn run_migrations(&self) -> Result<MigrationReport, MigrationError> {
        let before = self.applied_versions().await?;

        MIGRATOR.run(&self.pool).await.map_err(map_migrate_error)?;

        let applied: Vec<i64> = MIGRATOR
            .iter()
            .filter(|migration| !migration.migration_type.is_down_migration())
            .map(|migration| migration.version)
            .filter(|version| !before.contains(version))
            .collect();

        info!(
            target = "stampa::migrations",
            applied = applied.len(),
            versions = ?applied,
            "Database migrations complete"
        );

        Ok(MigrationReport { applied })
    }
}

fn map_migrate_error(err: MigrateError) -> MigrationError {
    match err {
        MigrateError::ExecuteMigration(source, version) => MigrationError::Apply {
            version,
            message: source.to_string(),
        },
        MigrateError::Source(source) => MigrationError::Source(source.to_string()),
        other => MigrationError::Database(other.to_string()),
    }
}
