//! Database migration helpers.
//!
//! Migrations are the statements from [`super::schema`], applied once each
//! and recorded in a `_migrations` table.

use sqlx::PgPool;
use thiserror::Error;

use super::schema;

/// Errors that can occur during migration operations.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Database query failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration script failed to execute.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

/// Migration runner for applying schema changes.
pub struct MigrationRunner {
    pool: PgPool,
}

impl MigrationRunner {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs all pending migrations and returns how many were applied.
    ///
    /// Idempotent: applied migrations are skipped, and every statement uses
    /// `IF NOT EXISTS`.
    pub async fn run_migrations(&self) -> Result<usize, MigrationError> {
        self.ensure_migrations_table().await?;

        let mut applied = 0;
        for (idx, statement) in schema::all_schema_statements().iter().enumerate() {
            let migration_name = migration_name(idx);

            if !self.is_migration_applied(&migration_name).await? {
                self.apply_migration(&migration_name, statement).await?;
                tracing::info!(migration = %migration_name, "Applied migration");
                applied += 1;
            }
        }

        Ok(applied)
    }

    async fn ensure_migrations_table(&self) -> Result<(), MigrationError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                id SERIAL PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn is_migration_applied(&self, name: &str) -> Result<bool, MigrationError> {
        let result: Option<(i32,)> = sqlx::query_as("SELECT id FROM _migrations WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(result.is_some())
    }

    async fn apply_migration(&self, name: &str, sql: &str) -> Result<(), MigrationError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(sql)
            .execute(&mut *tx)
            .await
            .map_err(|e| MigrationError::MigrationFailed(format!("{}: {}", name, e)))?;

        sqlx::query("INSERT INTO _migrations (name) VALUES ($1)")
            .bind(name)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(())
    }

    /// Returns a list of applied migrations.
    pub async fn list_applied_migrations(&self) -> Result<Vec<AppliedMigration>, MigrationError> {
        self.ensure_migrations_table().await?;

        let migrations: Vec<AppliedMigration> =
            sqlx::query_as("SELECT name, applied_at FROM _migrations ORDER BY applied_at")
                .fetch_all(&self.pool)
                .await?;

        Ok(migrations)
    }
}

fn migration_name(idx: usize) -> String {
    format!("evalforge_v1_part_{}", idx)
}

/// Record of an applied migration.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AppliedMigration {
    pub name: String,
    pub applied_at: chrono::DateTime<chrono::Utc>,
}
