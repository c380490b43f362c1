//! SqliteRecordStore - RecordStore and LocalStore on an embedded SQLite file

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::{QueryBuilder, Row, Sqlite};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use lprgate_core::{
    Error, LocalStore, NewRecord, Record, RecordFilter, RecordId, RecordStore, Result, StoreMode,
    diagnostics::describe_error,
};

/// Upper bound on ids bound into a single `DELETE ... IN (...)`
const DELETE_CHUNK: usize = 500;

/// Column names follow the table layout deployed cameras already write to
const SELECT_COLUMNS: &str = "id, placa AS plate, cor_placa AS plate_color, \
     cor_veiculo AS vehicle_color, caminho_imagem AS image_path, confianca AS confidence, \
     timestamp, ingest_key";

fn db_error(context: &'static str) -> impl FnOnce(sqlx::Error) -> Error {
    move |e| Error::Database(format!("{}: {}", context, describe_error(&e)))
}

/// SQLite-backed local record store
#[derive(Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
    path: PathBuf,
}

impl SqliteRecordStore {
    /// Open (creating if needed) the database file at `path`
    ///
    /// Missing parent directories are created and the schema is brought up to
    /// date before the store is returned.
    ///
    /// # Errors
    /// - `Error::Io` if the parent directory cannot be created
    /// - `Error::Database` if the file cannot be opened or the schema fails
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(
                SqliteConnectOptions::new()
                    .filename(&path)
                    .create_if_missing(true)
                    .journal_mode(SqliteJournalMode::Wal)
                    .synchronous(SqliteSynchronous::Normal),
            )
            .await
            .map_err(db_error("Failed to open SQLite database"))?;

        let store = Self { pool, path };
        store.ensure_schema().await?;

        info!("Local SQLite store ready at {}", store.path.display());
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Underlying connection pool (useful for testing)
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn has_column(&self, column: &str) -> Result<bool> {
        let rows = sqlx::query("SELECT name FROM pragma_table_info('lpr_webhook')")
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("Failed to inspect lpr_webhook columns"))?;

        Ok(rows
            .iter()
            .filter_map(|row| row.try_get::<String, _>("name").ok())
            .any(|name| name == column))
    }
}

fn record_from_row(row: &SqliteRow) -> Result<Record> {
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
impl RecordStore for SqliteRecordStore {
    fn mode(&self) -> StoreMode {
        StoreMode::Local
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_error("SQLite ping failed"))?;
        Ok(())
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS lpr_webhook (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                placa VARCHAR NOT NULL,
                cor_placa VARCHAR,
                cor_veiculo VARCHAR,
                caminho_imagem VARCHAR,
                confianca INTEGER,
                timestamp DATETIME NOT NULL,
                ingest_key TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to create lpr_webhook table"))?;

        // Files created before idempotent migration lack the key column
        if !self.has_column("ingest_key").await? {
            debug!("Adding ingest_key column to local lpr_webhook table");
            sqlx::query("ALTER TABLE lpr_webhook ADD COLUMN ingest_key TEXT")
                .execute(&self.pool)
                .await
                .map_err(db_error("Failed to add ingest_key column"))?;
        }

        // Keys must be stable across migration retries
        sqlx::query(
            "UPDATE lpr_webhook SET ingest_key = lower(hex(randomblob(16))) WHERE ingest_key IS NULL",
        )
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to backfill ingest keys"))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_lpr_webhook_placa ON lpr_webhook(placa)")
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to create plate index"))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_lpr_webhook_timestamp ON lpr_webhook(timestamp DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to create timestamp index"))?;

        Ok(())
    }

    async fn insert(&self, record: &NewRecord) -> Result<Record> {
        let result = sqlx::query(
            r#"
            INSERT INTO lpr_webhook
                (placa, cor_placa, cor_veiculo, caminho_imagem, confianca, timestamp, ingest_key)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.plate)
        .bind(&record.plate_color)
        .bind(&record.vehicle_color)
        .bind(&record.image_path)
        .bind(record.confidence)
        .bind(record.timestamp)
        .bind(&record.ingest_key)
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to insert record"))?;

        Ok(record.clone().into_record(result.last_insert_rowid()))
    }

    async fn attach_image(&self, id: RecordId, image_path: &str) -> Result<()> {
        sqlx::query("UPDATE lpr_webhook SET caminho_imagem = ? WHERE id = ?")
            .bind(image_path)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to attach image"))?;
        Ok(())
    }

    async fn find_recent(&self, plate: &str, since: NaiveDateTime) -> Result<Option<Record>> {
        let sql = format!(
            "SELECT {} FROM lpr_webhook WHERE placa = ? AND timestamp >= ? \
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
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM lpr_webhook WHERE 1 = 1", SELECT_COLUMNS));

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
impl LocalStore for SqliteRecordStore {
    async fn load_buffered(&self) -> Result<Vec<Record>> {
        let sql = format!("SELECT {} FROM lpr_webhook ORDER BY id ASC", SELECT_COLUMNS);
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("Failed to load buffered records"))?;

        rows.iter().map(record_from_row).collect()
    }

    async fn discard(&self, ids: &[RecordId]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin discard transaction"))?;

        let mut deleted = 0;
        for chunk in ids.chunks(DELETE_CHUNK) {
            let mut builder: QueryBuilder<Sqlite> =
                QueryBuilder::new("DELETE FROM lpr_webhook WHERE id IN (");
            let mut separated = builder.separated(", ");
            for id in chunk {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");

            let result = builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(db_error("Failed to delete migrated records"))?;
            deleted += result.rows_affected();
        }

        tx.commit()
            .await
            .map_err(db_error("Failed to commit discard transaction"))?;

        debug!("Discarded {} migrated records from local store", deleted);
        Ok(deleted)
    }
}
