#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Database connection, queries, and migrations for the parks map.
//!
//! Uses a bundled SQLite database. Migrations are embedded SQL files
//! applied in filename order; the park table is mutated only through the
//! upsert engine in [`queries`].

pub mod queries;

pub use rusqlite;

use include_dir::{Dir, include_dir};
use rusqlite::Connection;

/// Embedded SQL migrations from the `migrations/` directory.
static MIGRATIONS_DIR: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/../../migrations");

/// Environment variable naming the database file.
pub const DB_PATH_ENV: &str = "PARKS_MAP_DB";

/// Default database filename when [`DB_PATH_ENV`] is unset.
pub const DEFAULT_DB_PATH: &str = "parks.db";

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// Database query error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Data conversion error.
    #[error("Data conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },

    /// A clear was rejected because visit history still references parks.
    #[error(
        "{count} visit(s) still reference existing parks; \
         re-run with a cascading orphan policy to delete them"
    )]
    VisitsPresent {
        /// Number of visit rows that would be orphaned.
        count: i64,
    },
}

/// Opens the database file, enabling foreign key enforcement.
///
/// # Errors
///
/// Returns [`DbError`] if the file cannot be opened.
pub fn open(path: &str) -> Result<Connection, DbError> {
    let conn = Connection::open(path)?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(conn)
}

/// Opens the database named by the `PARKS_MAP_DB` environment variable,
/// falling back to `parks.db` in the working directory.
///
/// # Errors
///
/// Returns [`DbError`] if the file cannot be opened.
pub fn open_from_env() -> Result<Connection, DbError> {
    let path = std::env::var(DB_PATH_ENV).unwrap_or_else(|_| DEFAULT_DB_PATH.to_string());
    log::info!("Opening database at {path}");
    open(&path)
}

/// Opens an in-memory database (tests).
///
/// # Errors
///
/// Returns [`DbError`] if the connection cannot be created.
pub fn open_in_memory() -> Result<Connection, DbError> {
    let conn = Connection::open_in_memory()?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(conn)
}

/// Runs all pending database migrations, in filename order.
///
/// # Errors
///
/// Returns [`DbError`] if any migration fails to apply.
pub fn run_migrations(conn: &Connection) -> Result<(), DbError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
             name TEXT PRIMARY KEY,
             applied_at TEXT NOT NULL DEFAULT (datetime('now'))
         )",
        [],
    )?;

    let mut files: Vec<_> = MIGRATIONS_DIR.files().collect();
    files.sort_by(|a, b| a.path().cmp(b.path()));

    for file in files {
        let name = file.path().to_string_lossy().into_owned();
        let already_applied: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM schema_migrations WHERE name = ?1)",
            [&name],
            |row| row.get(0),
        )?;
        if already_applied {
            continue;
        }

        let sql = file.contents_utf8().ok_or_else(|| DbError::Conversion {
            message: format!("migration {name} is not valid UTF-8"),
        })?;
        conn.execute_batch(sql)?;
        conn.execute("INSERT INTO schema_migrations (name) VALUES (?1)", [&name])?;
        log::info!("Applied migration {name}");
    }

    Ok(())
}
