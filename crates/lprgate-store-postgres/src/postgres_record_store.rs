//! PostgresRecordStore - RecordStore and DurableTarget for PostgreSQL
//!
//! Works against tables created by this crate's migrations (`BIGSERIAL` ids)
//! and against tables an older deployment created with `SERIAL` ids; every
//! identity read back is cast to `BIGINT`.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction};
use std::collections::HashSet;
use std::str::FromStr;
use tracing::debug;

use crate::config::PostgresStoreConfig;
use crate::migrations;
use lprgate_core::{
    ConnectionTarget, DurableTarget, Error, ImportTransaction, NewRecord, Record, RecordFilter,
    RecordId, RecordStore, Result, StoreMode, diagnostics::describe_error,
};

/// Column names follow the table layout deployed cameras already write to
const SELECT_COLUMNS: &str = "id::BIGINT AS id, placa AS plate, cor_placa AS plate_color, \
     cor_veiculo AS vehicle_color, caminho_imagem AS image_path, confianca AS confidence, \
     timestamp, ingest_key";

fn db_error(context: &'static str) -> impl FnOnce(sqlx::Error) -> Error {
    move |e| Error::Database(format!("{}: {}", context, describe_error(&e)))
}

/// PostgreSQL-backed durable record store
#[derive(Clone)]
pub struct PostgresRecordStore {
    pool: PgPool,
    target: ConnectionTarget,
}

impl PostgresRecordStore {
    /// Build a store for `target` without opening a connection
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// - `Error::Config` if the connection string cannot be parsed
    pub fn connect_lazy(target: &ConnectionTarget, config: &PostgresStoreConfig) -> Result<Self> {
        let options = PgConnectOptions::from_str(target.url()).map_err(|e| {
            Error::Config(format!(
                "Invalid PostgreSQL connection string {}: {}",
                target.redacted(),
                e
            ))
        })?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .max_lifetime(Some(config.max_lifetime))
            .connect_lazy_with(options);

        Ok(Self {
            pool,
            target: target.clone(),
        })
    }

    /// Create from an existing pool (useful for testing)
    pub fn from_pool(pool: PgPool, target: ConnectionTarget) -> Self {
        Self { pool, target }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn record_from_row(row: &PgRow) -> Result<Record> {
    let read = |e: sqlx::Error| Error::Database(format!("Failed to read record row: {}", e));
    Ok(Record {
        id: row.try_get("id").map_err(read)?,
        plate: row.try_get("plate").map_err(read)?,
        plate_color: row.try_get("plate_color").map_err(read)?,
        vehicle_color: row.try_get("vehicle_color").map_err(read)?,
        image_path: row.try_get("image_path").map_err(read)?,
        confidence: row.try_get("confidence").map_err(read)?,
        timestamp: row.try_get("timestamp").map_err(read)?,
        ingest_key: row.try_get("ingest_key").map_err(read)?,
    })
}

#[async_trait]
impl RecordStore for PostgresRecordStore {
    fn mode(&self) -> StoreMode {
        StoreMode::Durable
    }

    fn location(&self) -> String {
        self.target.redacted()
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_error("PostgreSQL ping failed"))?;
        Ok(())
    }

    async fn ensure_schema(&self) -> Result<()> {
        migrations::run_migrations(&self.pool).await
    }

    async fn insert(&self, record: &NewRecord) -> Result<Record> {
        let id: RecordId = sqlx::query_scalar(
            r#"
            INSERT INTO lpr_webhook
                (placa, cor_placa, cor_veiculo, caminho_imagem, confianca, timestamp, ingest_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id::BIGINT
            "#,
        )
        .bind(&record.plate)
        .bind(&record.plate_color)
        .bind(&record.vehicle_color)
        .bind(&record.image_path)
        .bind(record.confidence)
        .bind(record.timestamp)
        .bind(&record.ingest_key)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("Failed to insert record"))?;

        Ok(record.clone().into_record(id))
    }

    async fn attach_image(&self, id: RecordId, image_path: &str) -> Result<()> {
        sqlx::query("UPDATE lpr_webhook SET caminho_imagem = $1 WHERE id = $2")
            .bind(image_path)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to attach image"))?;
        Ok(())
    }

    async fn find_recent(&self, plate: &str, since: NaiveDateTime) -> Result<Option<Record>> {
        let sql = format!(
            "SELECT {} FROM lpr_webhook WHERE placa = $1 AND timestamp >= $2 \
             ORDER BY timestamp DESC LIMIT 1",
            SELECT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(plate)
            .bind(since)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to look up recent record"))?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn query(&self, filter: &RecordFilter) -> Result<Vec<Record>> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM lpr_webhook WHERE TRUE", SELECT_COLUMNS));

        if let Some(pattern) = filter.plate_pattern() {
            builder
                .push(" AND REPLACE(REPLACE(UPPER(placa), '-', ''), ' ', '') LIKE ")
                .push_bind(pattern);
        }
        if let Some(start) = filter.start {
            builder.push(" AND timestamp >= ").push_bind(start);
        }
        if let Some(end) = filter.end {
            builder.push(" AND timestamp < ").push_bind(end);
        }
        builder.push(" ORDER BY timestamp DESC, id DESC");

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("Failed to query records"))?;

        rows.iter().map(record_from_row).collect()
    }
}

#[async_trait]
impl DurableTarget for PostgresRecordStore {
    async fn begin_import(&self) -> Result<Box<dyn ImportTransaction>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin import transaction"))?;

        // Concurrent inserts wait until commit so they cannot draw a sequence
        // value that collides with an explicitly imported id. Readers are not
        // blocked.
        sqlx::query("LOCK TABLE lpr_webhook IN SHARE ROW EXCLUSIVE MODE")
            .execute(&mut *tx)
            .await
            .map_err(db_error("Failed to lock lpr_webhook for import"))?;
        debug!("Locked lpr_webhook for import");

        Ok(Box::new(PgImport { tx }))
    }
}

/// Import transaction on a dedicated pooled connection, holding the table lock
struct PgImport {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl ImportTransaction for PgImport {
    async fn occupied_ids(&mut self) -> Result<HashSet<RecordId>> {
        let ids: Vec<RecordId> = sqlx::query_scalar("SELECT id::BIGINT FROM lpr_webhook")
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db_error("Failed to load occupied ids"))?;
        Ok(ids.into_iter().collect())
    }

    async fn existing_keys(&mut self, keys: &[String]) -> Result<HashSet<String>> {
        if keys.is_empty() {
            return Ok(HashSet::new());
        }
        let found: Vec<String> = sqlx::query_scalar(
            "SELECT ingest_key FROM lpr_webhook WHERE ingest_key = ANY($1)",
        )
        .bind(keys)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_error("Failed to load existing ingest keys"))?;
        Ok(found.into_iter().collect())
    }

    async fn insert(&mut self, record: &NewRecord, id: Option<RecordId>) -> Result<RecordId> {
        let query = match id {
            Some(id) => sqlx::query_scalar(
                r#"
                INSERT INTO lpr_webhook
                    (id, placa, cor_placa, cor_veiculo, caminho_imagem, confianca, timestamp, ingest_key)
                VALUES ($8, $1, $2, $3, $4, $5, $6, $7)
                RETURNING id::BIGINT
                "#,
            )
            .bind(&record.plate)
            .bind(&record.plate_color)
            .bind(&record.vehicle_color)
            .bind(&record.image_path)
            .bind(record.confidence)
            .bind(record.timestamp)
            .bind(&record.ingest_key)
            .bind(id),
            None => sqlx::query_scalar(
                r#"
                INSERT INTO lpr_webhook
                    (placa, cor_placa, cor_veiculo, caminho_imagem, confianca, timestamp, ingest_key)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING id::BIGINT
                "#,
            )
            .bind(&record.plate)
            .bind(&record.plate_color)
            .bind(&record.vehicle_color)
            .bind(&record.image_path)
            .bind(record.confidence)
            .bind(record.timestamp)
            .bind(&record.ingest_key),
        };

        let assigned: RecordId = query
            .fetch_one(&mut *self.tx)
            .await
            .map_err(db_error("Failed to import record"))?;
        Ok(assigned)
    }

    async fn reconcile_sequence(&mut self) -> Result<()> {
        // Tables without an owned sequence yield NULL here, which setval ignores
        sqlx::query(
            r#"
            SELECT setval(
                pg_get_serial_sequence('lpr_webhook', 'id'),
                COALESCE((SELECT MAX(id) FROM lpr_webhook), 0) + 1,
                false
            )
            "#,
        )
        .execute(&mut *self.tx)
        .await
        .map_err(db_error("Failed to reconcile id sequence"))?;

        debug!("Reconciled lpr_webhook id sequence");
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx
            .commit()
            .await
            .map_err(db_error("Failed to commit import transaction"))
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx
            .rollback()
            .await
            .map_err(db_error("Failed to roll back import transaction"))
    }
}
