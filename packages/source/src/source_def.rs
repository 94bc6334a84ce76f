//! Config-driven park data source definition.
//!
//! [`SourceDefinition`] captures everything unique about a data source in a
//! serializable config struct: how to fetch raw records and which property
//! keys map to the canonical fields. A single generic implementation
//! handles all sources, so adding a fourth source is a TOML file, not code.

use parks_map_park_models::{Park, SourceTag};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::arcgis::{ArcGisConfig, fetch_arcgis};
use crate::normalize::normalize;
use crate::seed::{SeedConfig, fetch_seed};
use crate::static_file::{StaticFileConfig, fetch_static_file};
use crate::{FetchOptions, ParkSource, RawPage, SourceError};

/// Channel buffer size — allows the fetcher to stay one page ahead of
/// the consumer (normalizer/inserter).
const PAGE_CHANNEL_BUFFER: usize = 2;

/// Environment variable relocating the bundled seed dataset.
pub const SEED_PATH_ENV: &str = "PARKS_MAP_SEED_PATH";

/// A complete, config-driven park data source definition.
///
/// Loaded from TOML files embedded at compile time.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceDefinition {
    /// Unique identifier (e.g., `"seattle_arcgis"`).
    pub id: String,
    /// Human-readable name (e.g., `"Seattle Parks ArcGIS FeatureServer"`).
    pub name: String,
    /// Provenance tag stamped on every park from this source.
    pub tag: SourceTag,
    /// How to fetch raw records.
    pub fetcher: FetcherConfig,
    /// Property-key mappings for normalization.
    pub fields: FieldMapping,
    /// Optional sanity bounds for normalized centroids; records outside
    /// are skipped. Guards against projected (non-WGS84) coordinates.
    #[serde(default)]
    pub bounds: Option<BoundsConfig>,
}

/// How to fetch raw records from the source.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FetcherConfig {
    /// `ArcGIS` REST API (`resultOffset`/`resultRecordCount`).
    Arcgis {
        /// Layer query URL (ending in `/query`).
        query_url: String,
        /// Records per page.
        page_size: u64,
    },
    /// Single hosted dataset file fetched in one request.
    StaticFile {
        /// URL of the dataset file.
        url: String,
    },
    /// Bundled on-disk JSON dataset.
    SeedFile {
        /// Path to the dataset, relative to the working directory.
        /// Overridden by the `PARKS_MAP_SEED_PATH` environment variable.
        path: String,
    },
}

/// Maps source-specific property keys to canonical park fields.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldMapping {
    /// Property keys for the park name, tried in order (first non-empty
    /// wins).
    pub name: Vec<String>,
    /// Property keys for the stable external id, tried in order.
    pub external_id: Vec<String>,
    /// Latitude keys for point-only sources without a geometry member.
    #[serde(default)]
    pub lat: Vec<String>,
    /// Longitude keys for point-only sources without a geometry member.
    #[serde(default)]
    pub lng: Vec<String>,
    /// Optional square-footage key, converted to an `acres` attribute.
    #[serde(default)]
    pub area_sqft: Option<String>,
}

impl FieldMapping {
    /// Returns `true` if `key` is consumed by normalization and should not
    /// pass through into the park's attribute map.
    #[must_use]
    pub fn consumes(&self, key: &str) -> bool {
        self.name.iter().any(|k| k == key)
            || self.external_id.iter().any(|k| k == key)
            || self.lat.iter().any(|k| k == key)
            || self.lng.iter().any(|k| k == key)
            || self.area_sqft.as_deref() == Some(key)
    }
}

/// Inclusive longitude/latitude window for centroid sanity checks.
#[derive(Debug, Clone, Deserialize)]
pub struct BoundsConfig {
    /// `[min, max]` longitude in decimal degrees.
    pub lon: [f64; 2],
    /// `[min, max]` latitude in decimal degrees.
    pub lat: [f64; 2],
}

impl BoundsConfig {
    /// Returns `true` if the coordinate falls inside the window.
    #[must_use]
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        (self.lon[0]..=self.lon[1]).contains(&lon) && (self.lat[0]..=self.lat[1]).contains(&lat)
    }
}

impl ParkSource for SourceDefinition {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn tag(&self) -> SourceTag {
        self.tag
    }

    fn fetch_pages(
        &self,
        options: &FetchOptions,
    ) -> (mpsc::Receiver<RawPage>, JoinHandle<Result<u64, SourceError>>) {
        let (tx, rx) = mpsc::channel(PAGE_CHANNEL_BUFFER);
        let fetcher = self.fetcher.clone();
        let name = self.name.clone();
        let options = options.clone();

        let handle = tokio::spawn(async move {
            match &fetcher {
                FetcherConfig::Arcgis {
                    query_url,
                    page_size,
                } => {
                    fetch_arcgis(
                        &ArcGisConfig {
                            query_url,
                            label: &name,
                            page_size: *page_size,
                        },
                        &options,
                        &tx,
                    )
                    .await
                }
                FetcherConfig::StaticFile { url } => {
                    fetch_static_file(
                        &StaticFileConfig { url, label: &name },
                        &options,
                        &tx,
                    )
                    .await
                }
                FetcherConfig::SeedFile { path } => {
                    let path = std::env::var(SEED_PATH_ENV).unwrap_or_else(|_| path.clone());
                    fetch_seed(
                        &SeedConfig {
                            path: &path,
                            label: &name,
                        },
                        &options,
                        &tx,
                    )
                    .await
                }
            }
        });

        (rx, handle)
    }

    fn normalize_page(&self, records: &[serde_json::Value]) -> (Vec<Park>, u64) {
        let mut parks = Vec::with_capacity(records.len());
        let mut skipped = 0u64;

        for record in records {
            match normalize(record, &self.fields, self.bounds.as_ref(), self.tag) {
                Ok(park) => parks.push(park),
                Err(e) => {
                    log::warn!("{}: skipping record: {e}", self.name);
                    skipped += 1;
                }
            }
        }

        (parks, skipped)
    }
}

/// Parses a [`SourceDefinition`] from a TOML string.
///
/// # Errors
///
/// Returns an error if the TOML is malformed or missing required fields.
pub fn parse_source_toml(toml_str: &str) -> Result<SourceDefinition, String> {
    toml::de::from_str(toml_str).map_err(|e| e.to_string())
}
