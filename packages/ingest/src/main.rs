#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the park data ingestion tool.

use std::time::{Duration, Instant};

use clap::{Parser, Subcommand, ValueEnum};
use parks_map_database::queries::{self, OrphanPolicy, UpsertMode};
use parks_map_database::{open_from_env, run_migrations};
use parks_map_ingest::ingest;
use parks_map_source::registry::all_sources;
use parks_map_source::{FetchOptions, ParkSource};

#[derive(Parser)]
#[command(name = "parks_map_ingest", about = "Park data ingestion tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// What a clear-and-reload does about existing visit history.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OnVisits {
    /// Refuse to clear while any visit exists (default)
    Reject,
    /// Delete visits along with their parks
    Cascade,
}

impl From<OnVisits> for OrphanPolicy {
    fn from(value: OnVisits) -> Self {
        match value {
            OnVisits::Reject => Self::Reject,
            OnVisits::Cascade => Self::Cascade,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Load park data from the first available source
    Load {
        /// Delete all existing parks before loading, instead of merging
        #[arg(long)]
        clear: bool,
        /// What to do with visit history when clearing
        #[arg(long, value_enum, default_value = "reject")]
        on_visits: OnVisits,
        /// Maximum number of records to fetch (for testing)
        #[arg(long)]
        limit: Option<u64>,
        /// Per-request timeout in seconds
        #[arg(long, default_value = "30")]
        timeout_secs: u64,
    },
    /// List all configured data sources in fallback priority order
    Sources,
    /// List persisted parks
    List,
    /// Show one park by its external id
    Show {
        /// External id (e.g., "17")
        external_id: String,
    },
    /// Print all parks as a GeoJSON FeatureCollection
    Features,
    /// Run database migrations
    Migrate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Migrate => {
            log::info!("Running database migrations...");
            let conn = open_from_env()?;
            run_migrations(&conn)?;
            log::info!("Migrations complete.");
        }
        Commands::Sources => {
            let sources = all_sources();
            println!("{:<24} {:<10} NAME", "ID", "TAG");
            println!("{}", "-".repeat(60));
            for source in &sources {
                println!(
                    "{:<24} {:<10} {}",
                    source.id(),
                    source.tag().as_ref(),
                    source.name()
                );
            }
        }
        Commands::Load {
            clear,
            on_visits,
            limit,
            timeout_secs,
        } => {
            let mut conn = open_from_env()?;
            run_migrations(&conn)?;

            let sources = all_sources();
            let refs: Vec<&dyn ParkSource> =
                sources.iter().map(|s| s as &dyn ParkSource).collect();
            let mode = if clear {
                UpsertMode::ClearAndReload
            } else {
                UpsertMode::Merge
            };
            let options = FetchOptions {
                limit,
                timeout: Duration::from_secs(timeout_secs),
            };

            let start = Instant::now();
            let report = ingest(&mut conn, &refs, mode, on_visits.into(), &options).await?;
            let elapsed = start.elapsed();

            log::info!(
                "Loaded {} park(s) from {} ({}) in {:.1}s: {} fetched, {} skipped, {} inserted, {} updated",
                report.records_normalized,
                report.source_used,
                report.source_tag.as_ref(),
                elapsed.as_secs_f64(),
                report.records_fetched,
                report.records_skipped,
                report.inserted,
                report.updated
            );
        }
        Commands::List => {
            let conn = open_from_env()?;
            run_migrations(&conn)?;
            let parks = queries::all_parks(&conn)?;
            println!("{:<12} {:<34} {:<10} CENTROID", "EXTERNAL_ID", "NAME", "TAG");
            println!("{}", "-".repeat(80));
            for park in &parks {
                println!(
                    "{:<12} {:<34} {:<10} {:.5}, {:.5}",
                    park.external_id,
                    park.name,
                    park.source_tag.as_ref(),
                    park.centroid[1],
                    park.centroid[0]
                );
            }
            println!("{} park(s)", parks.len());
        }
        Commands::Show { external_id } => {
            let conn = open_from_env()?;
            run_migrations(&conn)?;
            let park = queries::park_by_external_id(&conn, &external_id)?
                .ok_or_else(|| format!("No park with external id {external_id}"))?;
            println!("{}", serde_json::to_string_pretty(&park)?);
        }
        Commands::Features => {
            let conn = open_from_env()?;
            run_migrations(&conn)?;
            let collection = queries::feature_collection(&conn)?;
            println!("{}", serde_json::to_string_pretty(&collection)?);
        }
    }

    Ok(())
}
