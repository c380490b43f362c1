//! Capture image storage
//!
//! Camera snapshots arrive base64-encoded inside the webhook payload and are
//! written to the captures directory, which is also served under
//! `/static/captures`.

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Images smaller than this are treated as placeholders and dropped
pub const MIN_IMAGE_BYTES: usize = 1000;

/// Path prefix stored in `image_path`, relative to the static root
pub const CAPTURES_PREFIX: &str = "captures";

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("Invalid base64 image: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("Image too small ({0} bytes)")]
    TooSmall(usize),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A capture written to disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCapture {
    /// Absolute (or working-directory relative) file path
    pub file: PathBuf,
    /// Value for the record's `image_path`
    pub relative: String,
}

#[derive(Debug, Clone)]
pub struct CaptureStore {
    directory: PathBuf,
}

impl CaptureStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub async fn ensure_directory(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.directory).await
    }

    /// Decode and store a snapshot for record `id`
    ///
    /// File name: `<id>-<PLATE>-<YYYYmmdd_HHMMSS>-<8 hex>.jpg`
    pub async fn save(
        &self,
        id: i64,
        plate: &str,
        timestamp: NaiveDateTime,
        content: &str,
    ) -> Result<StoredCapture, CaptureError> {
        let bytes = decode_image(content)?;
        if bytes.len() < MIN_IMAGE_BYTES {
            return Err(CaptureError::TooSmall(bytes.len()));
        }

        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let file_name = format!(
            "{}-{}-{}-{}.jpg",
            id,
            file_name_plate(plate),
            timestamp.format("%Y%m%d_%H%M%S"),
            &suffix[..8]
        );

        self.ensure_directory().await?;
        let file = self.directory.join(&file_name);
        tokio::fs::write(&file, &bytes).await?;
        debug!("Stored capture {} ({} bytes)", file.display(), bytes.len());

        Ok(StoredCapture {
            file,
            relative: format!("{}/{}", CAPTURES_PREFIX, file_name),
        })
    }

    /// Delete regular files last modified more than `retention` ago
    ///
    /// # Returns
    /// Number of files removed
    pub async fn cleanup(&self, retention: Duration) -> std::io::Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.directory).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let cutoff = SystemTime::now()
            .checked_sub(retention)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let mut removed = 0;

        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            if metadata.modified()? < cutoff {
                tokio::fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }

        Ok(removed)
    }

    /// Run [`CaptureStore::cleanup`] now and then every `every`
    pub fn spawn_cleanup(self, retention: Duration, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                match self.cleanup(retention).await {
                    Ok(0) => debug!("Capture cleanup: nothing to remove"),
                    Ok(n) => info!("Capture cleanup removed {} image(s)", n),
                    Err(e) => error!("Capture cleanup failed: {}", e),
                }
            }
        })
    }
}

/// Decode a base64 image, accepting an optional `data:image/...;base64,` prefix
pub fn decode_image(content: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let encoded = if content.starts_with("data:image/") {
        content.split_once(',').map(|(_, data)| data).unwrap_or(content)
    } else {
        content
    };
    let cleaned: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD.decode(cleaned)
}

/// Plate segment of a capture file name: upper-cased, `A-Z`, `0-9` and `-` only
fn file_name_plate(plate: &str) -> String {
    let cleaned: String = plate
        .to_uppercase()
        .chars()
        .filter(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || *c == '-')
        .collect();
    if cleaned.is_empty() {
        "UNKNOWN".to_string()
    } else {
        cleaned
    }
}

/// Log why a capture was not stored
pub fn log_capture_failure(plate: &str, err: &CaptureError) {
    match err {
        CaptureError::TooSmall(size) => {
            warn!("Image for {} too small ({} bytes), ignoring", plate, size)
        }
        other => error!("Failed to store image for {}: {}", plate, other),
    }
}
