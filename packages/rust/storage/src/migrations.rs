//! SQL migration definitions for the merchgen database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: app_state, batch_runs, deliveries",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Small key/value state (last selected base folder, ...)
CREATE TABLE IF NOT EXISTS app_state (
    key        TEXT PRIMARY KEY,
    value      TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- One row per generate run
CREATE TABLE IF NOT EXISTS batch_runs (
    id          TEXT PRIMARY KEY,
    league      TEXT NOT NULL,
    design_id   TEXT NOT NULL,
    started_at  TEXT NOT NULL,
    finished_at TEXT,
    result_json TEXT
);

CREATE INDEX IF NOT EXISTS idx_batch_runs_started ON batch_runs(started_at);

-- Exported artifacts and their upload outcome
CREATE TABLE IF NOT EXISTS deliveries (
    id          TEXT PRIMARY KEY,
    run_id      TEXT NOT NULL REFERENCES batch_runs(id) ON DELETE CASCADE,
    entity      TEXT NOT NULL,
    local_path  TEXT NOT NULL,
    remote_key  TEXT,
    remote_url  TEXT,
    status      TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_deliveries_run_id ON deliveries(run_id);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
