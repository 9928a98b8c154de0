//! # Sharewatch Warehouse
//!
//! DuckDB-backed store for historical percentage-change snapshots.
//!
//! ## Overview
//!
//! The dashboard reads a short history of daily percentage changes per symbol
//! (for sparkline-style trend cells). Snapshots are produced elsewhere; this
//! crate owns the schema, a pooled connection manager, and the read path.
//!
//! ### Features
//!
//! - **Parameterized reads**: symbols never reach SQL text
//! - **Connection pooling**: one database instance, cloned connections per mode
//! - **Versioned schema**: migrations recorded in `schema_migrations`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sharewatch_warehouse::{Warehouse, WarehouseConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let warehouse = Warehouse::open(WarehouseConfig::default())?;
//!     for row in warehouse.recent_changes("AAPL", 10)? {
//!         println!("{} {:.2}", row.snapshot_date, row.percent_change);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Tables
//!
//! | Table | Description |
//! |-------|-------------|
//! | `change_snapshots` | One percentage change per symbol per day |
//! | `schema_migrations` | Applied migration versions |

pub mod duckdb;
pub mod migrations;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use ::duckdb::ToSql;
use serde::Serialize;
use thiserror::Error;

pub use duckdb::{AccessMode, DuckDbConnectionManager, PooledConnection};

/// Environment variable naming the sharewatch data directory.
pub const HOME_ENV: &str = "SHAREWATCH_HOME";

/// Errors that can occur during warehouse operations.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// `DuckDB` database error.
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    /// I/O error (file system operations).
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl WarehouseError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DuckDb(_) => "warehouse.duckdb",
            Self::Io(_) => "warehouse.io",
        }
    }
}

/// Configuration for the warehouse database.
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    /// Root directory for sharewatch data.
    pub home: PathBuf,
    /// Path to the `DuckDB` database file.
    pub db_path: PathBuf,
    /// Maximum number of idle connections kept per access mode.
    pub max_pool_size: usize,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self::with_home(resolve_home())
    }
}

impl WarehouseConfig {
    /// Config rooted at `home`, with the database at `home/warehouse.duckdb`.
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        let db_path = home.join("warehouse.duckdb");
        Self {
            home,
            db_path,
            max_pool_size: 4,
        }
    }

    /// Override the database file location.
    pub fn with_db_path(mut self, db_path: impl Into<PathBuf>) -> Self {
        self.db_path = db_path.into();
        self
    }
}

/// One stored daily change for a symbol.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeSnapshotRow {
    /// Calendar date as `YYYY-MM-DD`.
    pub snapshot_date: String,
    pub percent_change: f64,
}

/// The main warehouse interface.
#[derive(Clone)]
pub struct Warehouse {
    config: WarehouseConfig,
    manager: DuckDbConnectionManager,
}

impl Warehouse {
    /// Open a warehouse with default configuration.
    pub fn open_default() -> Result<Self, WarehouseError> {
        Self::open(WarehouseConfig::default())
    }

    /// Open a warehouse, creating parent directories and applying migrations.
    pub fn open(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        if let Some(parent) = config.db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let manager = DuckDbConnectionManager::new(config.db_path.clone(), config.max_pool_size);
        let warehouse = Self { config, manager };
        warehouse.initialize()?;
        Ok(warehouse)
    }

    /// Apply pending schema migrations.
    pub fn initialize(&self) -> Result<(), WarehouseError> {
        let connection = self.manager.acquire(AccessMode::ReadWrite)?;
        migrations::apply_migrations(&connection)?;
        Ok(())
    }

    pub fn config(&self) -> &WarehouseConfig {
        &self.config
    }

    pub fn db_path(&self) -> &Path {
        self.manager.db_path()
    }

    /// The most recent `limit` snapshots for `symbol`, oldest first.
    ///
    /// `symbol` is bound as a parameter, never interpolated.
    pub fn recent_changes(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<Vec<ChangeSnapshotRow>, WarehouseError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let connection = self.manager.acquire(AccessMode::ReadOnly)?;
        let mut statement = connection.prepare(
            "SELECT CAST(snapshot_date AS VARCHAR), percent_change FROM ( \
                 SELECT snapshot_date, percent_change FROM change_snapshots \
                 WHERE symbol = ? ORDER BY snapshot_date DESC LIMIT ? \
             ) ORDER BY snapshot_date ASC",
        )?;
        let params: [&dyn ToSql; 2] = [&symbol, &limit];
        let rows = statement.query_map(params.as_slice(), |row| {
            Ok(ChangeSnapshotRow {
                snapshot_date: row.get(0)?,
                percent_change: row.get(1)?,
            })
        })?;

        let mut output = Vec::new();
        for row in rows {
            output.push(row?);
        }
        Ok(output)
    }
}

/// `$SHAREWATCH_HOME`, else `$HOME/.sharewatch`, else `./.sharewatch`.
pub fn resolve_home() -> PathBuf {
    if let Some(path) = env::var_os(HOME_ENV) {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".sharewatch");
    }

    PathBuf::from(".sharewatch")
}


#[cfg(test)]
mod tests {
    use super::*;
    use ::duckdb::Connection;
    use tempfile::tempdir;

    fn temp_config() -> (tempfile::TempDir, WarehouseConfig) {
        let temp = tempdir().expect("tempdir");
        let config = WarehouseConfig::with_home(temp.path().join("sharewatch-home"));
        fs::create_dir_all(&config.home).expect("home dir");
        (temp, config)
    }

    /// Writes rows through a standalone connection that is closed before
    /// the warehouse opens the file.
    fn seed(db_path: &Path, values: &str) {
        let connection = Connection::open(db_path).expect("seed connection");
        migrations::apply_migrations(&connection).expect("seed migrations");
        connection
            .execute_batch(&format!(
                "INSERT INTO change_snapshots (symbol, snapshot_date, percent_change) VALUES {values};"
            ))
            .expect("seed rows");
    }

    #[test]
    fn opening_records_every_migration() {
        let (_temp, config) = temp_config();
        {
            let warehouse = Warehouse::open(config.clone()).expect("warehouse open");
            assert!(warehouse.recent_changes("AAPL", 5).expect("empty table").is_empty());
        }

        let connection = Connection::open(&config.db_path).expect("inspect");
        let applied: i64 = connection
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
            .expect("count");
        assert_eq!(applied, i64::try_from(migrations::known_versions().count()).expect("fits"));
    }

    #[test]
    fn recent_changes_returns_latest_rows_oldest_first() {
        let (_temp, config) = temp_config();
        seed(
            &config.db_path,
            "('AAPL', DATE '2024-01-01', 1.5), \
             ('AAPL', DATE '2024-01-03', -0.25), \
             ('AAPL', DATE '2024-01-02', 0.75), \
             ('MSFT', DATE '2024-01-04', 9.0)",
        );
        let warehouse = Warehouse::open(config).expect("warehouse open");

        let rows = warehouse.recent_changes("AAPL", 2).expect("recent");
        assert_eq!(
            rows,
            vec![
                ChangeSnapshotRow {
                    snapshot_date: String::from("2024-01-02"),
                    percent_change: 0.75,
                },
                ChangeSnapshotRow {
                    snapshot_date: String::from("2024-01-03"),
                    percent_change: -0.25,
                },
            ]
        );
    }

    #[test]
    fn recent_changes_binds_symbol_as_parameter() {
        let (_temp, config) = temp_config();
        seed(&config.db_path, "('AAPL', DATE '2024-01-01', 1.0)");
        let warehouse = Warehouse::open(config).expect("warehouse open");

        let rows = warehouse
            .recent_changes("AAPL' OR '1'='1", 10)
            .expect("recent");
        assert!(rows.is_empty());
        assert!(warehouse.recent_changes("AAPL", 0).expect("zero").is_empty());
        assert_eq!(warehouse.recent_changes("AAPL", 10).expect("recent").len(), 1);
    }

    #[test]
    fn reopening_keeps_data_and_migrations() {
        let temp = tempdir().expect("tempdir");
        let config = WarehouseConfig::with_home(temp.path());
        drop(Warehouse::open(config.clone()).expect("open"));
        seed(&config.db_path, "('CBA.AX', DATE '2024-02-01', 2.0)");

        let warehouse = Warehouse::open(config).expect("reopen");
        let rows = warehouse.recent_changes("CBA.AX", 5).expect("recent");
        assert_eq!(rows.len(), 1);
        assert_eq!(warehouse.db_path(), temp.path().join("warehouse.duckdb"));
    }
}
