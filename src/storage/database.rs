//! SQLite database management with migrations
//!
//! Holds projects, their query history, and decisions with the chunks cited
//! in support of them.

use crate::config::StorageConfig;
use crate::error::{KbError, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::path::Path;

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Pooled connection handed to one unit of work
pub type DbConn = r2d2::PooledConnection<SqliteConnectionManager>;

/// Database manager with migration support
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Open (or create) the database at `db_path` and apply pending migrations
    pub fn new(db_path: &Path, config: &StorageConfig) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| KbError::Io {
                    source: e,
                    context: format!("Failed to create database directory: {:?}", parent),
                })?;
            }
        }

        // Foreign keys and busy timeout are per-connection in SQLite
        let busy_timeout = config.busy_timeout();
        let manager = SqliteConnectionManager::file(db_path).with_init(move |conn| {
            conn.busy_timeout(busy_timeout)?;
            conn.execute_batch(
                "
                PRAGMA foreign_keys = ON;
                PRAGMA synchronous = NORMAL;
                ",
            )
        });

        let pool = Pool::builder()
            .max_size(config.pool_size)
            .connection_timeout(config.connection_timeout())
            .build(manager)
            .map_err(|e| {
                KbError::UpstreamUnavailable(format!("Failed to create connection pool: {}", e))
            })?;

        {
            let conn = pool.get()?;
            // WAL is persistent, so setting it once is enough
            conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get::<_, String>(0))?;
        }

        let db = Self { pool };
        db.migrate()?;

        tracing::debug!("Opened project database at {}", db_path.display());
        Ok(db)
    }

    /// Get a connection from the pool
    pub fn get_conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        let mut conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current_version: i64 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM _migrations",
            [],
            |row| row.get(0),
        )?;

        for (version, migration) in MIGRATIONS.iter().enumerate() {
            let version = version as i64 + 1;
            if version <= current_version {
                continue;
            }

            tracing::info!("Applying migration {}", version);
            let tx = conn.transaction()?;
            tx.execute_batch(migration)?;
            tx.execute(
                "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                params![version],
            )?;
            tx.commit()?;
        }

        Ok(())
    }

    /// Row counts per table
    pub fn stats(&self) -> Result<DbStats> {
        let conn = self.get_conn()?;
        let count = |table: &str| -> Result<usize> {
            let n: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                    row.get(0)
                })?;
            Ok(n as usize)
        };

        Ok(DbStats {
            project_count: count("projects")?,
            query_count: count("query_history")?,
            decision_count: count("decisions")?,
            source_count: count("decision_sources")?,
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbStats {
    pub project_count: usize,
    pub query_count: usize,
    pub decision_count: usize,
    pub source_count: usize,
}

/// Database migrations (each string is one migration)
const MIGRATIONS: &[&str] = &[
    // Migration 1: Initial schema
    r#"
    CREATE TABLE projects (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        description TEXT,
        status TEXT NOT NULL DEFAULT 'PLANNING'
            CHECK (status IN ('PLANNING', 'ACTIVE', 'COMPLETED', 'ABANDONED')),
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        completed_at INTEGER
    );

    CREATE INDEX idx_projects_status ON projects(status);

    CREATE TABLE query_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        project_id TEXT NOT NULL,
        query TEXT NOT NULL,
        result_count INTEGER NOT NULL CHECK (result_count >= 0),
        created_at INTEGER NOT NULL,
        FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE
    );

    CREATE INDEX idx_query_history_project ON query_history(project_id);

    CREATE TABLE decisions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        project_id TEXT NOT NULL,
        decision TEXT NOT NULL,
        alternatives TEXT NOT NULL,  -- JSON array
        rationale TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE
    );

    CREATE INDEX idx_decisions_project ON decisions(project_id);

    CREATE TABLE decision_sources (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        decision_id INTEGER NOT NULL,
        chunk_id TEXT NOT NULL,
        relevance REAL NOT NULL CHECK (relevance >= 0.0 AND relevance <= 1.0),
        FOREIGN KEY (decision_id) REFERENCES decisions(id) ON DELETE CASCADE,
        UNIQUE (decision_id, chunk_id)
    );

    CREATE INDEX idx_decision_sources_decision ON decision_sources(decision_id);
    "#,
];

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> Database {
        Database::new(&dir.path().join("projects.sqlite"), &StorageConfig::default()).unwrap()
    }

    #[test]
    fn test_database_creation() {
        let temp_dir = TempDir::new().unwrap();
        let db = open(&temp_dir);

        let stats = db.stats().unwrap();
        assert_eq!(
            stats,
            DbStats {
                project_count: 0,
                query_count: 0,
                decision_count: 0,
                source_count: 0
            }
        );
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        drop(open(&temp_dir));
        let db = open(&temp_dir);

        let conn = db.get_conn().unwrap();
        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM _migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, MIGRATIONS.len() as i64);
    }

    #[test]
    fn test_foreign_keys_enabled_on_every_connection() {
        let temp_dir = TempDir::new().unwrap();
        let db = open(&temp_dir);

        let first = db.get_conn().unwrap();
        let second = db.get_conn().unwrap();
        for conn in [&first, &second] {
            let enabled: i64 = conn
                .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
                .unwrap();
            assert_eq!(enabled, 1);
        }
    }
}
