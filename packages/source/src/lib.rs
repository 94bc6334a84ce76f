#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Park data source trait and normalization logic.
//!
//! Each data source is a TOML-configured [`source_def::SourceDefinition`]
//! implementing [`ParkSource`]: it fetches raw records from one upstream
//! (live API, static mirror, or bundled seed file) and normalizes them into
//! canonical [`Park`] records via the shared normalizer.

pub mod arcgis;
pub mod normalize;
pub mod registry;
pub mod seed;
pub mod source_def;
pub mod static_file;

use std::time::Duration;

use parks_map_park_models::{Park, SourceTag};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// One page of raw JSON records as received from an upstream.
pub type RawPage = Vec<serde_json::Value>;

/// Errors that can occur while fetching raw data from a source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP request failed (connection, timeout, TLS).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Upstream answered with a non-success status code.
    #[error("HTTP status {status}")]
    Status {
        /// The status code returned by the upstream.
        status: reqwest::StatusCode,
    },

    /// Response body was not valid JSON.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Response parsed but did not have the expected shape.
    #[error("unexpected response shape: {message}")]
    Format {
        /// Description of what was missing or malformed.
        message: String,
    },

    /// Local file read failed (seed adapter).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The background fetch task failed to complete.
    #[error("fetch task failed: {message}")]
    Task {
        /// Join error description.
        message: String,
    },
}

/// Configuration for a fetch operation.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Maximum number of records to fetch (for testing).
    pub limit: Option<u64>,
    /// Per-request timeout; a stalled upstream fails the source rather than
    /// hanging ingestion.
    pub timeout: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            limit: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Trait that all park data sources implement.
///
/// `fetch_pages` streams pages of raw records through a bounded channel
/// from a background task, so the caller can normalize and count
/// incrementally; the per-source error (if any) arrives via the join
/// handle once the channel closes. Each call re-fetches from scratch.
pub trait ParkSource: Send + Sync {
    /// Returns a unique identifier for this source (e.g., `"seattle_arcgis"`).
    fn id(&self) -> &str;

    /// Returns the human-readable name of this source.
    fn name(&self) -> &str;

    /// Returns the provenance tag stamped on parks from this source.
    fn tag(&self) -> SourceTag;

    /// Starts fetching pages in a background task and returns a receiver
    /// yielding one page of raw JSON records at a time, plus a handle
    /// carrying the total fetched count or the fetch error.
    fn fetch_pages(
        &self,
        options: &FetchOptions,
    ) -> (mpsc::Receiver<RawPage>, JoinHandle<Result<u64, SourceError>>);

    /// Normalizes a page of raw records into canonical parks, returning the
    /// parks plus the number of records skipped due to normalization
    /// failures. Skips are logged, never fatal.
    fn normalize_page(&self, records: &[serde_json::Value]) -> (Vec<Park>, u64);
}
