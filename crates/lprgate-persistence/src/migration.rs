//! Migration Engine
//!
//! Moves every buffered local record into the durable store in one durable
//! transaction:
//! 1. Read local rows in ascending id order
//! 2. Skip rows whose ingest key is already durable (left over from a run that
//!    committed but crashed before the local delete)
//! 3. Insert each remaining row, keeping its id when that id is free and
//!    letting the durable store assign one otherwise
//! 4. Reconcile the durable id sequence, then commit
//! 5. Delete exactly the local rows that were read
//!
//! Callers must not run two migrations at once.

use std::collections::HashSet;
use tracing::{debug, error, info};

use lprgate_core::{
    DurableTarget, ImportTransaction, LocalStore, NewRecord, Record, RecordId, Result,
    diagnostics::describe_error,
};

/// What one migration run did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Records inserted into the durable store
    pub migrated: u64,
    /// Records already present in the durable store by ingest key
    pub skipped: u64,
    /// Migrated records that received a new id because theirs was taken
    pub remapped: u64,
    /// The run failed and was rolled back
    pub failed: bool,
}

/// Run one migration
///
/// Never fails: errors roll back the durable transaction, leave the local
/// store untouched, get logged, and yield a report with `migrated == 0`.
pub async fn migrate_buffered(local: &dyn LocalStore, durable: &dyn DurableTarget) -> MigrationReport {
    match try_migrate(local, durable).await {
        Ok(report) => report,
        Err(e) => {
            error!("Migration to the durable store failed: {}", describe_error(&e));
            MigrationReport {
                failed: true,
                ..MigrationReport::default()
            }
        }
    }
}

async fn try_migrate(local: &dyn LocalStore, durable: &dyn DurableTarget) -> Result<MigrationReport> {
    let rows = local.load_buffered().await?;
    if rows.is_empty() {
        return Ok(MigrationReport::default());
    }

    let mut tx = durable.begin_import().await?;
    let report = match import_rows(tx.as_mut(), &rows).await {
        Ok(report) => report,
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                debug!("Rollback after failed import also failed: {}", rollback_err);
            }
            return Err(e);
        }
    };
    tx.commit().await?;

    // Only rows that were read; anything inserted since stays for the next run
    let read_ids: Vec<RecordId> = rows.iter().map(|row| row.id).collect();
    local.discard(&read_ids).await?;

    info!(
        "Migrated {} record(s) to the durable store ({} remapped, {} already present)",
        report.migrated, report.remapped, report.skipped
    );
    Ok(report)
}

async fn import_rows(tx: &mut dyn ImportTransaction, rows: &[Record]) -> Result<MigrationReport> {
    let pending: Vec<NewRecord> = rows.iter().map(Record::to_new_record).collect();
    let keys: Vec<String> = pending.iter().map(|r| r.ingest_key.clone()).collect();

    let already_present = tx.existing_keys(&keys).await?;
    let mut occupied: HashSet<RecordId> = tx.occupied_ids().await?;
    // Store-assigned ids must start past every id already present, including
    // ones written with an explicit id by an earlier run
    tx.reconcile_sequence().await?;
    let mut report = MigrationReport::default();

    for (row, record) in rows.iter().zip(&pending) {
        if already_present.contains(&record.ingest_key) {
            report.skipped += 1;
            continue;
        }

        let preferred = (!occupied.contains(&row.id)).then_some(row.id);
        let assigned = tx.insert(record, preferred).await?;
        if assigned != row.id {
            debug!("Local record {} migrated as durable record {}", row.id, assigned);
            report.remapped += 1;
        }
        occupied.insert(assigned);
        report.migrated += 1;
    }

    tx.reconcile_sequence().await?;
    Ok(report)
}
