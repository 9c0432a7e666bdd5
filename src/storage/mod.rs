//! Storage layer for kbflow
//!
//! Relational persistence for project lifecycle and decision provenance

pub mod database;
pub mod repository;

use crate::config::StorageConfig;
use crate::error::Result;
use std::sync::Arc;

pub use database::{Database, DbConn, DbPool, DbStats};
pub use repository::{ProjectRepository, RecordedDecision};

/// Open the configured database and wrap it in a repository
pub fn open_repository(config: &StorageConfig) -> Result<ProjectRepository> {
    let db = Database::new(&config.database_path, config)?;
    Ok(ProjectRepository::new(Arc::new(db)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_repository_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let config = StorageConfig {
            database_path: temp_dir.path().join("nested").join("projects.sqlite"),
            ..StorageConfig::default()
        };

        let repo = open_repository(&config).unwrap();
        assert!(config.database_path.exists());
        assert!(repo.list_all().unwrap().is_empty());
    }
}
