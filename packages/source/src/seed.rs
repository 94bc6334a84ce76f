//! Bundled seed dataset reader.
//!
//! The adapter of last resort: reads a JSON array of pre-normalization park
//! records from a file shipped with the deployment, so the system stays
//! usable offline or when every upstream breaks compatibility.

use tokio::sync::mpsc;

use crate::{FetchOptions, RawPage, SourceError};

/// Configuration for a seed file read.
pub struct SeedConfig<'a> {
    /// Path to the bundled dataset file.
    pub path: &'a str,
    /// Label for log messages.
    pub label: &'a str,
}

/// Reads the seed file and sends its records as a single page. Returns the
/// number of records delivered to the receiver.
///
/// # Errors
///
/// Returns [`SourceError::Io`] when the file is missing or unreadable, and
/// [`SourceError::Json`] when its contents are not a JSON array.
pub async fn fetch_seed(
    config: &SeedConfig<'_>,
    options: &FetchOptions,
    tx: &mpsc::Sender<RawPage>,
) -> Result<u64, SourceError> {
    log::info!("{}: reading {}", config.label, config.path);
    let data = std::fs::read_to_string(config.path)?;
    let mut records: Vec<serde_json::Value> = serde_json::from_str(&data)?;

    if let Some(limit) = options.limit {
        records.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
    }

    let count = records.len() as u64;
    if tx.send(records).await.is_err() {
        // Receiver dropped; nothing was delivered.
        return Ok(0);
    }

    log::info!("{}: loaded {count} records", config.label);
    Ok(count)
}
