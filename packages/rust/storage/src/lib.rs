//! libSQL storage layer (local file, offline).
//!
//! The [`Storage`] struct wraps a libSQL database holding the small amount
//! of state merchgen keeps between runs: the last selected base folder, batch
//! run history, and per-artifact delivery outcomes.
//!
//! **Access rules:**
//! - `generate` and `folder set`: read-write via [`Storage::open`]
//! - listing commands: read-only via [`Storage::open_readonly`]

mod migrations;

use std::path::{Path, PathBuf};

use chrono::Utc;
use libsql::{Connection, Database, params};
use merchgen_shared::{BatchResult, MerchGenError, Result, RunId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `app_state` key for the last selected base folder.
const BASE_FOLDER_KEY: &str = "base_folder";

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

/// A row of `batch_runs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRunRecord {
    pub id: String,
    pub league: String,
    pub design_id: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    /// Final counters, once the run finished.
    pub result: Option<BatchResult>,
}

/// A row of `deliveries`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub id: String,
    pub run_id: String,
    pub entity: String,
    pub local_path: String,
    pub remote_key: Option<String>,
    pub remote_url: Option<String>,
    /// `uploaded`, `skipped`, `failed`, or `export_failed`.
    pub status: String,
    pub created_at: String,
}

/// Input for [`Storage::insert_delivery`].
#[derive(Debug, Clone, Copy)]
pub struct NewDelivery<'a> {
    pub entity: &'a str,
    pub local_path: &'a Path,
    pub remote_key: Option<&'a str>,
    pub remote_url: Option<&'a str>,
    pub status: &'a str,
}

fn storage_err(e: impl std::fmt::Display) -> MerchGenError {
    MerchGenError::Storage(e.to_string())
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| MerchGenError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` without writing to it.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        MerchGenError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(MerchGenError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // App state
    // -----------------------------------------------------------------------

    /// Set a state value, replacing any previous one.
    pub async fn set_state(&self, key: &str, value: &str) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO app_state (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                                updated_at = excluded.updated_at",
                params![key, value, now.as_str()],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    pub async fn get_state(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query("SELECT value FROM app_state WHERE key = ?1", params![key])
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row.get::<String>(0).map_err(storage_err)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// Remember the selected base folder.
    pub async fn set_base_folder(&self, path: &Path) -> Result<()> {
        self.set_state(BASE_FOLDER_KEY, &path.to_string_lossy()).await
    }

    /// The remembered base folder, if it still exists on disk.
    pub async fn base_folder(&self) -> Result<Option<PathBuf>> {
        let Some(stored) = self.get_state(BASE_FOLDER_KEY).await? else {
            return Ok(None);
        };
        let path = PathBuf::from(stored);
        if path.is_dir() {
            Ok(Some(path))
        } else {
            tracing::warn!(path = %path.display(), "stored base folder no longer exists");
            Ok(None)
        }
    }

    // -----------------------------------------------------------------------
    // Batch runs
    // -----------------------------------------------------------------------

    /// Record the start of a run.
    pub async fn insert_batch_run(&self, run_id: &RunId, league: &str, design_id: &str) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        let id = run_id.to_string();
        self.conn
            .execute(
                "INSERT INTO batch_runs (id, league, design_id, started_at) VALUES (?1, ?2, ?3, ?4)",
                params![id.as_str(), league, design_id, now.as_str()],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Record a run's final counters.
    pub async fn finish_batch_run(&self, run_id: &RunId, result: &BatchResult) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        let id = run_id.to_string();
        let json = serde_json::to_string(result).map_err(storage_err)?;
        self.conn
            .execute(
                "UPDATE batch_runs SET finished_at = ?1, result_json = ?2, design_id = ?3
                 WHERE id = ?4",
                params![now.as_str(), json.as_str(), result.design_id.as_str(), id.as_str()],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Most recent runs first.
    pub async fn list_batch_runs(&self, limit: usize) -> Result<Vec<BatchRunRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, league, design_id, started_at, finished_at, result_json
                 FROM batch_runs ORDER BY started_at DESC, rowid DESC LIMIT ?1",
                params![limit as i64],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let result = row
                .get::<String>(5)
                .ok()
                .and_then(|json| serde_json::from_str::<BatchResult>(&json).ok());
            results.push(BatchRunRecord {
                id: row.get::<String>(0).map_err(storage_err)?,
                league: row.get::<String>(1).map_err(storage_err)?,
                design_id: row.get::<String>(2).map_err(storage_err)?,
                started_at: row.get::<String>(3).map_err(storage_err)?,
                finished_at: row.get::<String>(4).ok(),
                result,
            });
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Deliveries
    // -----------------------------------------------------------------------

    /// Record one exported artifact. Returns the generated row ID.
    pub async fn insert_delivery(&self, run_id: &RunId, delivery: NewDelivery<'_>) -> Result<String> {
        self.check_writable()?;
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        let run = run_id.to_string();
        let local = delivery.local_path.to_string_lossy().to_string();
        self.conn
            .execute(
                "INSERT INTO deliveries
                 (id, run_id, entity, local_path, remote_key, remote_url, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    id.as_str(),
                    run.as_str(),
                    delivery.entity,
                    local.as_str(),
                    delivery.remote_key,
                    delivery.remote_url,
                    delivery.status,
                    now.as_str()
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(id)
    }

    /// Deliveries of one run, in insertion order.
    pub async fn list_deliveries(&self, run_id: &RunId) -> Result<Vec<DeliveryRecord>> {
        let run = run_id.to_string();
        let mut rows = self
            .conn
            .query(
                "SELECT id, run_id, entity, local_path, remote_key, remote_url, status, created_at
                 FROM deliveries WHERE run_id = ?1 ORDER BY rowid",
                params![run.as_str()],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(DeliveryRecord {
                id: row.get::<String>(0).map_err(storage_err)?,
                run_id: row.get::<String>(1).map_err(storage_err)?,
                entity: row.get::<String>(2).map_err(storage_err)?,
                local_path: row.get::<String>(3).map_err(storage_err)?,
                remote_key: row.get::<String>(4).ok(),
                remote_url: row.get::<String>(5).ok(),
                status: row.get::<String>(6).map_err(storage_err)?,
                created_at: row.get::<String>(7).map_err(storage_err)?,
            });
        }
        Ok(results)
    }
}
