//! Versioned schema migrations for the PostgreSQL record store
//!
//! Applied versions are tracked in `schema_migrations` so each step runs
//! exactly once. Every step is also written to be a no-op against a database
//! that an older deployment created by hand, since those have the table but no
//! tracking rows.

use lprgate_core::{Error, Result, diagnostics::describe_error};
use sqlx::PgPool;
use tracing::{debug, info};

/// A single schema migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Unique, sequential version number
    pub version: i32,
    pub description: &'static str,
    /// One or more statements separated by `;`
    pub up_sql: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Create lpr_webhook table",
        up_sql: r#"
            CREATE TABLE IF NOT EXISTS lpr_webhook (
                id BIGSERIAL PRIMARY KEY,
                placa VARCHAR NOT NULL,
                cor_placa VARCHAR,
                cor_veiculo VARCHAR,
                caminho_imagem VARCHAR,
                confianca INTEGER,
                timestamp TIMESTAMP NOT NULL
            )
        "#,
    },
    Migration {
        version: 2,
        description: "Add ingest_key column",
        up_sql: r#"
            ALTER TABLE lpr_webhook ADD COLUMN IF NOT EXISTS ingest_key TEXT
        "#,
    },
    Migration {
        version: 3,
        description: "Create lpr_webhook indexes",
        up_sql: r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_lpr_webhook_ingest_key
            ON lpr_webhook(ingest_key);

            CREATE INDEX IF NOT EXISTS idx_lpr_webhook_placa
            ON lpr_webhook(placa);

            CREATE INDEX IF NOT EXISTS idx_lpr_webhook_timestamp
            ON lpr_webhook(timestamp DESC)
        "#,
    },
];

/// Run all pending migrations
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| {
        Error::Database(format!(
            "Failed to create schema_migrations table: {}",
            describe_error(&e)
        ))
    })?;

    let applied_versions: Vec<i32> = sqlx::query_scalar("SELECT version FROM schema_migrations")
        .fetch_all(pool)
        .await
        .map_err(|e| {
            Error::Database(format!(
                "Failed to fetch applied migrations: {}",
                describe_error(&e)
            ))
        })?;

    for migration in MIGRATIONS {
        if applied_versions.contains(&migration.version) {
            debug!(
                "Skipping migration {}: {} (already applied)",
                migration.version, migration.description
            );
            continue;
        }

        info!(
            "Applying migration {}: {}",
            migration.version, migration.description
        );

        sqlx::raw_sql(migration.up_sql)
            .execute(pool)
            .await
            .map_err(|e| {
                Error::Database(format!(
                    "Failed to apply migration {}: {}",
                    migration.version,
                    describe_error(&e)
                ))
            })?;

        sqlx::query(
            "INSERT INTO schema_migrations (version, description) VALUES ($1, $2)
                ON CONFLICT (version) DO NOTHING",
        )
        .bind(migration.version)
        .bind(migration.description)
        .execute(pool)
        .await
        .map_err(|e| {
            Error::Database(format!(
                "Failed to record migration {}: {}",
                migration.version,
                describe_error(&e)
            ))
        })?;
    }

    Ok(())
}

/// Highest applied migration version, or `None` on a fresh database
pub async fn get_current_version(pool: &PgPool) -> Result<Option<i32>> {
    let table_exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT FROM information_schema.tables
            WHERE table_name = 'schema_migrations'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .map_err(|e| {
        Error::Database(format!(
            "Failed to check for schema_migrations table: {}",
            describe_error(&e)
        ))
    })?;

    if !table_exists {
        return Ok(None);
    }

    let version: Option<i32> = sqlx::query_scalar("SELECT MAX(version) FROM schema_migrations")
        .fetch_one(pool)
        .await
        .map_err(|e| {
            Error::Database(format!(
                "Failed to get current schema version: {}",
                describe_error(&e)
            ))
        })?;

    Ok(version)
}
