//! Plate-event record model
//!
//! A [`Record`] is one plate detection reported by the camera. It is the only
//! entity persisted by lprgate and lives in the `lpr_webhook` table of
//! whichever store is active.

use chrono::{Duration, Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Store-assigned record identity
pub type RecordId = i64;

/// Name of the table holding plate events in both stores
pub const RECORD_TABLE: &str = "lpr_webhook";

/// Which physical store is currently active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreMode {
    /// Embedded file-resident fallback store
    Local,
    /// Network-attached system of record
    Durable,
}

impl StoreMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreMode::Local => "local",
            StoreMode::Durable => "durable",
        }
    }
}

impl fmt::Display for StoreMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted plate event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub plate: String,
    pub plate_color: Option<String>,
    pub vehicle_color: Option<String>,
    pub image_path: Option<String>,
    pub confidence: Option<i32>,
    pub timestamp: NaiveDateTime,
    /// Idempotency key carried unchanged through migration.
    /// Rows written by older deployments have none.
    pub ingest_key: Option<String>,
}

impl Record {
    /// Field values of this record, ready to be inserted into another store
    pub fn to_new_record(&self) -> NewRecord {
        NewRecord {
            plate: self.plate.clone(),
            plate_color: self.plate_color.clone(),
            vehicle_color: self.vehicle_color.clone(),
            image_path: self.image_path.clone(),
            confidence: self.confidence,
            timestamp: self.timestamp,
            ingest_key: self
                .ingest_key
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        }
    }
}

/// A record that has not been assigned an identity yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRecord {
    pub plate: String,
    pub plate_color: Option<String>,
    pub vehicle_color: Option<String>,
    pub image_path: Option<String>,
    pub confidence: Option<i32>,
    pub timestamp: NaiveDateTime,
    pub ingest_key: String,
}

impl NewRecord {
    /// Create a record for `plate` stamped with the current local time
    pub fn new(plate: impl Into<String>) -> Self {
        Self {
            plate: plate.into(),
            plate_color: None,
            vehicle_color: None,
            image_path: None,
            confidence: None,
            timestamp: Local::now().naive_local(),
            ingest_key: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn with_plate_color(mut self, color: impl Into<String>) -> Self {
        self.plate_color = Some(color.into());
        self
    }

    pub fn with_vehicle_color(mut self, color: impl Into<String>) -> Self {
        self.vehicle_color = Some(color.into());
        self
    }

    pub fn with_confidence(mut self, confidence: Option<i32>) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_timestamp(mut self, timestamp: NaiveDateTime) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_image_path(mut self, path: impl Into<String>) -> Self {
        self.image_path = Some(path.into());
        self
    }

    /// Attach the identity the store assigned
    pub fn into_record(self, id: RecordId) -> Record {
        Record {
            id,
            plate: self.plate,
            plate_color: self.plate_color,
            vehicle_color: self.vehicle_color,
            image_path: self.image_path,
            confidence: self.confidence,
            timestamp: self.timestamp,
            ingest_key: Some(self.ingest_key),
        }
    }
}

/// Filters accepted by the records listing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFilter {
    /// Normalized plate fragment (upper-case, no dashes or spaces)
    pub plate: Option<String>,
    /// Inclusive lower bound on the event timestamp
    pub start: Option<NaiveDateTime>,
    /// Exclusive upper bound on the event timestamp
    pub end: Option<NaiveDateTime>,
}

impl RecordFilter {
    /// Build a filter from raw query-string values
    ///
    /// Dates use `YYYY-MM-DD`; the end date is inclusive. Values that fail to
    /// parse are ignored rather than rejected.
    pub fn from_query(plate: Option<&str>, start_date: Option<&str>, end_date: Option<&str>) -> Self {
        let start = start_date
            .and_then(parse_day)
            .and_then(|day| day.and_hms_opt(0, 0, 0));
        let end = end_date
            .and_then(parse_day)
            .and_then(|day| day.and_hms_opt(0, 0, 0))
            .map(|midnight| midnight + Duration::days(1));

        Self {
            plate: plate.and_then(normalize_plate),
            start,
            end,
        }
    }

    /// SQL `LIKE` pattern for the plate fragment
    pub fn plate_pattern(&self) -> Option<String> {
        self.plate.as_ref().map(|p| format!("%{}%", p))
    }
}

fn parse_day(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

/// Strip dashes and spaces and upper-case a plate; `None` when nothing is left
pub fn normalize_plate(raw: &str) -> Option<String> {
    let normalized: String = raw
        .chars()
        .filter(|c| *c != '-' && !c.is_whitespace())
        .collect::<String>()
        .to_uppercase();
    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}
