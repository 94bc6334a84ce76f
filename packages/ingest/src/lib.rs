#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! The ingestion pipeline: tries each park data source in priority order
//! and persists the first usable result.
//!
//! Fallback is strictly single-pass. Every source gets exactly one
//! attempt per run; there are no retries and no mixing of records from
//! different sources. A source that fetches records but normalizes none
//! of them counts as failed, so a schema change upstream degrades to the
//! mirror instead of wiping the park table.

use parks_map_database::DbError;
use parks_map_database::queries::{self, OrphanPolicy, UpsertMode};
use parks_map_database::rusqlite::Connection;
use parks_map_park_models::{Park, SourceTag};
use parks_map_source::{FetchOptions, ParkSource, SourceError};

/// Summary of one completed ingestion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    /// Id of the source whose data was persisted.
    pub source_used: String,
    /// Provenance tag of that source.
    pub source_tag: SourceTag,
    /// Raw records the source returned.
    pub records_fetched: u64,
    /// Records that normalized into parks.
    pub records_normalized: u64,
    /// Records dropped by the normalizer.
    pub records_skipped: u64,
    /// Park rows inserted.
    pub inserted: u64,
    /// Park rows updated.
    pub updated: u64,
}

/// One failed source attempt, in the order attempts were made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceAttempt {
    /// Source id.
    pub source: String,
    /// Why the source was skipped.
    pub reason: String,
}

/// Errors that can occur during an ingestion run.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Every configured source failed; nothing was written.
    #[error("all park data sources failed: {}", format_attempts(.attempts))]
    Exhausted {
        /// Each source tried, with its failure reason.
        attempts: Vec<SourceAttempt>,
    },

    /// Persisting the fetched parks failed.
    #[error(transparent)]
    Db(#[from] DbError),
}

fn format_attempts(attempts: &[SourceAttempt]) -> String {
    attempts
        .iter()
        .map(|a| format!("{}: {}", a.source, a.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result of draining one source: its parks and the fetch/skip counts.
struct FetchedBatch {
    parks: Vec<Park>,
    fetched: u64,
    skipped: u64,
}

/// Fetches and normalizes everything one source has to offer.
///
/// Pages stream in through the channel while the fetch task runs; each
/// page is normalized as it arrives. The task's own result is checked
/// after the channel closes, so a mid-stream failure surfaces as a
/// source error even when earlier pages parsed fine.
async fn fetch_and_normalize(
    source: &dyn ParkSource,
    options: &FetchOptions,
) -> Result<FetchedBatch, SourceError> {
    let (mut rx, handle) = source.fetch_pages(options);

    let mut parks = Vec::new();
    let mut skipped = 0;
    while let Some(page) = rx.recv().await {
        let (mut page_parks, page_skipped) = source.normalize_page(&page);
        parks.append(&mut page_parks);
        skipped += page_skipped;
    }

    let fetched = match handle.await {
        Ok(result) => result?,
        Err(e) => {
            return Err(SourceError::Task {
                message: e.to_string(),
            });
        }
    };

    Ok(FetchedBatch {
        parks,
        fetched,
        skipped,
    })
}

/// Runs one ingestion pass: first usable source wins, its parks are
/// upserted, and a report is returned.
///
/// A source is usable when its fetch succeeds and at least one record
/// normalizes. The database is not touched until a usable source is
/// found, so exhaustion leaves existing parks exactly as they were.
///
/// # Errors
///
/// Returns [`IngestError::Exhausted`] when every source fails, or
/// [`IngestError::Db`] when the winning batch cannot be persisted.
pub async fn ingest(
    conn: &mut Connection,
    sources: &[&dyn ParkSource],
    mode: UpsertMode,
    policy: OrphanPolicy,
    options: &FetchOptions,
) -> Result<IngestReport, IngestError> {
    let mut attempts = Vec::new();

    for source in sources {
        log::info!("Trying source {} ({})", source.id(), source.name());

        let batch = match fetch_and_normalize(*source, options).await {
            Ok(batch) => batch,
            Err(e) => {
                log::warn!("Source {} failed: {e}", source.id());
                attempts.push(SourceAttempt {
                    source: source.id().to_string(),
                    reason: e.to_string(),
                });
                continue;
            }
        };

        if batch.parks.is_empty() {
            let reason = if batch.fetched == 0 {
                "returned no records".to_string()
            } else {
                format!("returned {} records but none normalized", batch.fetched)
            };
            log::warn!("Source {} {reason}", source.id());
            attempts.push(SourceAttempt {
                source: source.id().to_string(),
                reason,
            });
            continue;
        }

        let normalized = batch.parks.len() as u64;
        log::info!(
            "Source {} yielded {normalized} park(s) from {} record(s) ({} skipped)",
            source.id(),
            batch.fetched,
            batch.skipped
        );

        let report = queries::apply(conn, &batch.parks, mode, policy)?;
        return Ok(IngestReport {
            source_used: source.id().to_string(),
            source_tag: source.tag(),
            records_fetched: batch.fetched,
            records_normalized: normalized,
            records_skipped: batch.skipped,
            inserted: report.inserted,
            updated: report.updated,
        });
    }

    Err(IngestError::Exhausted { attempts })
}
