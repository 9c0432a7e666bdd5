//! Project repository
//!
//! Every method checks a connection out of the pool, runs one transaction and
//! commits or rolls back before returning. Nothing is held across calls.

use crate::error::{KbError, Result};
use crate::project::{
    self, Decision, DecisionSource, NewDecision, Project, ProjectStatus, QueryHistory,
};
use crate::storage::Database;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

const PROJECT_COLUMNS: &str =
    "id, name, description, status, created_at, updated_at, completed_at";

/// A stored decision together with its supporting sources
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordedDecision {
    #[serde(flatten)]
    pub decision: Decision,
    pub sources: Vec<DecisionSource>,
}

/// Relational access to projects, query history and decisions
#[derive(Clone)]
pub struct ProjectRepository {
    db: Arc<Database>,
}

impl ProjectRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a new project in `PLANNING`; names are unique
    pub fn create(&self, name: &str, description: Option<&str>) -> Result<Project> {
        let name = name.trim();
        if name.is_empty() {
            return Err(KbError::InvalidInput("project name must not be empty".into()));
        }

        let mut project = Project::new(name);
        project.description = description
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string);

        let mut conn = self.db.get_conn()?;
        let tx = write_transaction(&mut conn)?;
        tx.execute(
            "INSERT INTO projects
                 (id, name, description, status, created_at, updated_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                project.id.to_string(),
                project.name,
                project.description,
                project.status.as_str(),
                to_micros(&project.created_at),
                to_micros(&project.updated_at),
                project.completed_at.as_ref().map(to_micros),
            ],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                KbError::InvalidInput(format!("A project named '{}' already exists", name))
            } else {
                e.into()
            }
        })?;
        tx.commit()?;

        tracing::info!("Created project {} ({})", project.name, project.id);
        Ok(project)
    }

    pub fn get_by_id(&self, id: &Uuid) -> Result<Option<Project>> {
        let conn = self.db.get_conn()?;
        let project = conn
            .query_row(
                &format!("SELECT {} FROM projects WHERE id = ?1", PROJECT_COLUMNS),
                params![id.to_string()],
                project_from_row,
            )
            .optional()?;
        Ok(project)
    }

    pub fn get_by_name(&self, name: &str) -> Result<Option<Project>> {
        let conn = self.db.get_conn()?;
        let project = conn
            .query_row(
                &format!("SELECT {} FROM projects WHERE name = ?1", PROJECT_COLUMNS),
                params![name.trim()],
                project_from_row,
            )
            .optional()?;
        Ok(project)
    }

    /// Projects in `PLANNING` or `ACTIVE`, newest first
    pub fn list_active(&self) -> Result<Vec<Project>> {
        self.list_where("WHERE status IN ('PLANNING', 'ACTIVE')")
    }

    /// Every project, newest first
    pub fn list_all(&self) -> Result<Vec<Project>> {
        self.list_where("")
    }

    fn list_where(&self, clause: &str) -> Result<Vec<Project>> {
        let conn = self.db.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM projects {} ORDER BY created_at DESC, name",
            PROJECT_COLUMNS, clause
        ))?;
        let projects = stmt
            .query_map([], project_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(projects)
    }

    /// Persist name and description changes
    ///
    /// Status only moves through `transition_state`; an update that carries a
    /// different status is rejected.
    pub fn update(&self, project: &Project) -> Result<Project> {
        let name = project.name.trim();
        if name.is_empty() {
            return Err(KbError::InvalidInput("project name must not be empty".into()));
        }

        let mut conn = self.db.get_conn()?;
        let tx = write_transaction(&mut conn)?;
        let stored = load_project(&tx, &project.id)?;
        if stored.status != project.status {
            return Err(KbError::InvalidInput(
                "status cannot be changed by update; use a state transition".into(),
            ));
        }

        let updated_at = project::now();
        tx.execute(
            "UPDATE projects SET name = ?1, description = ?2, updated_at = ?3 WHERE id = ?4",
            params![
                name,
                project.description,
                to_micros(&updated_at),
                project.id.to_string()
            ],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                KbError::InvalidInput(format!("A project named '{}' already exists", name))
            } else {
                e.into()
            }
        })?;
        tx.commit()?;

        Ok(Project {
            name: name.to_string(),
            description: project.description.clone(),
            updated_at,
            ..stored
        })
    }

    /// Validate and apply a lifecycle transition in one transaction
    pub fn transition_state(&self, id: &Uuid, target: ProjectStatus) -> Result<Project> {
        let mut conn = self.db.get_conn()?;
        let tx = write_transaction(&mut conn)?;

        let mut project = load_project(&tx, id)?;
        let from = project.status;
        project.transition_to(target)?;

        tx.execute(
            "UPDATE projects SET status = ?1, updated_at = ?2, completed_at = ?3 WHERE id = ?4",
            params![
                project.status.as_str(),
                to_micros(&project.updated_at),
                project.completed_at.as_ref().map(to_micros),
                project.id.to_string()
            ],
        )?;
        tx.commit()?;

        tracing::info!("Project {} moved {} -> {}", project.name, from, target);
        Ok(project)
    }

    /// Append a query-history row for a search run against the project
    pub fn capture_query(
        &self,
        project_id: &Uuid,
        query: &str,
        result_count: usize,
    ) -> Result<QueryHistory> {
        let mut conn = self.db.get_conn()?;
        let tx = write_transaction(&mut conn)?;
        ensure_project(&tx, project_id)?;

        let created_at = project::now();
        tx.execute(
            "INSERT INTO query_history (project_id, query, result_count, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                project_id.to_string(),
                query,
                result_count as i64,
                to_micros(&created_at)
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        tracing::debug!("Captured query for project {}", project_id);
        Ok(QueryHistory {
            id,
            project_id: *project_id,
            query: query.to_string(),
            result_count,
            created_at,
        })
    }

    /// Insert a decision and all of its sources atomically
    pub fn capture_decision(
        &self,
        project_id: &Uuid,
        decision: &NewDecision,
    ) -> Result<RecordedDecision> {
        decision.validate()?;
        let alternatives = serde_json::to_string(&decision.alternatives).map_err(|e| {
            KbError::Json {
                source: e,
                context: "Failed to encode decision alternatives".to_string(),
            }
        })?;

        let mut conn = self.db.get_conn()?;
        let tx = write_transaction(&mut conn)?;
        ensure_project(&tx, project_id)?;

        let created_at = project::now();
        tx.execute(
            "INSERT INTO decisions (project_id, decision, alternatives, rationale, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                project_id.to_string(),
                decision.decision,
                alternatives,
                decision.rationale,
                to_micros(&created_at)
            ],
        )?;
        let decision_id = tx.last_insert_rowid();

        let mut sources = Vec::with_capacity(decision.sources.len());
        for source in &decision.sources {
            tx.execute(
                "INSERT INTO decision_sources (decision_id, chunk_id, relevance)
                 VALUES (?1, ?2, ?3)",
                params![decision_id, source.chunk_id, source.relevance],
            )
            .map_err(|e| {
                if is_constraint_violation(&e) {
                    KbError::InvalidInput(format!(
                        "chunk {} is cited more than once",
                        source.chunk_id
                    ))
                } else {
                    e.into()
                }
            })?;
            sources.push(DecisionSource {
                id: tx.last_insert_rowid(),
                decision_id,
                chunk_id: source.chunk_id.clone(),
                relevance: source.relevance,
            });
        }

        // Dropping the transaction on any error above rolls everything back
        tx.commit()?;

        tracing::info!(
            "Recorded decision {} for project {} with {} sources",
            decision_id,
            project_id,
            sources.len()
        );
        Ok(RecordedDecision {
            decision: Decision {
                id: decision_id,
                project_id: *project_id,
                decision: decision.decision.clone(),
                alternatives: decision.alternatives.clone(),
                rationale: decision.rationale.clone(),
                created_at,
            },
            sources,
        })
    }

    /// Query history for a project, oldest first
    pub fn query_history(&self, project_id: &Uuid) -> Result<Vec<QueryHistory>> {
        let conn = self.db.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, project_id, query, result_count, created_at
             FROM query_history WHERE project_id = ?1 ORDER BY created_at, id",
        )?;
        let rows = stmt
            .query_map(params![project_id.to_string()], |row| {
                Ok(QueryHistory {
                    id: row.get(0)?,
                    project_id: uuid_column(row, 1)?,
                    query: row.get(2)?,
                    result_count: row.get::<_, i64>(3)? as usize,
                    created_at: timestamp_column(row, 4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Decisions recorded for a project, oldest first
    pub fn decisions(&self, project_id: &Uuid) -> Result<Vec<Decision>> {
        let conn = self.db.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, project_id, decision, alternatives, rationale, created_at
             FROM decisions WHERE project_id = ?1 ORDER BY created_at, id",
        )?;
        let rows = stmt
            .query_map(params![project_id.to_string()], |row| {
                let alternatives: String = row.get(3)?;
                Ok(Decision {
                    id: row.get(0)?,
                    project_id: uuid_column(row, 1)?,
                    decision: row.get(2)?,
                    alternatives: serde_json::from_str(&alternatives).map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e))
                    })?,
                    rationale: row.get(4)?,
                    created_at: timestamp_column(row, 5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Sources cited by one decision, most relevant first
    pub fn decision_sources(&self, decision_id: i64) -> Result<Vec<DecisionSource>> {
        let conn = self.db.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, decision_id, chunk_id, relevance
             FROM decision_sources WHERE decision_id = ?1 ORDER BY relevance DESC, id",
        )?;
        let rows = stmt
            .query_map(params![decision_id], |row| {
                Ok(DecisionSource {
                    id: row.get(0)?,
                    decision_id: row.get(1)?,
                    chunk_id: row.get(2)?,
                    relevance: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Sources cited by any decision of a project
    pub fn project_sources(&self, project_id: &Uuid) -> Result<Vec<DecisionSource>> {
        let conn = self.db.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT s.id, s.decision_id, s.chunk_id, s.relevance
             FROM decision_sources s JOIN decisions d ON d.id = s.decision_id
             WHERE d.project_id = ?1 ORDER BY s.decision_id, s.id",
        )?;
        let rows = stmt
            .query_map(params![project_id.to_string()], |row| {
                Ok(DecisionSource {
                    id: row.get(0)?,
                    decision_id: row.get(1)?,
                    chunk_id: row.get(2)?,
                    relevance: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn decision_count(&self, project_id: &Uuid) -> Result<usize> {
        let conn = self.db.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM decisions WHERE project_id = ?1",
            params![project_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Remove a project and, by cascade, its history and decisions
    ///
    /// Returns false when no such project existed.
    pub fn delete(&self, id: &Uuid) -> Result<bool> {
        let mut conn = self.db.get_conn()?;
        let tx = write_transaction(&mut conn)?;
        let removed = tx.execute("DELETE FROM projects WHERE id = ?1", params![id.to_string()])?;
        tx.commit()?;

        if removed > 0 {
            tracing::info!("Deleted project {}", id);
        }
        Ok(removed > 0)
    }
}

/// Writers take the write lock up front so a concurrent writer waits on
/// `busy_timeout` instead of failing the read-to-write upgrade.
fn write_transaction(conn: &mut Connection) -> Result<Transaction<'_>> {
    Ok(conn.transaction_with_behavior(TransactionBehavior::Immediate)?)
}

fn load_project(tx: &Transaction<'_>, id: &Uuid) -> Result<Project> {
    tx.query_row(
        &format!("SELECT {} FROM projects WHERE id = ?1", PROJECT_COLUMNS),
        params![id.to_string()],
        project_from_row,
    )
    .optional()?
    .ok_or_else(|| KbError::project_not_found(id.to_string()))
}

fn ensure_project(tx: &Transaction<'_>, id: &Uuid) -> Result<()> {
    let exists: bool = tx.query_row(
        "SELECT EXISTS(SELECT 1 FROM projects WHERE id = ?1)",
        params![id.to_string()],
        |row| row.get(0),
    )?;
    if exists {
        Ok(())
    } else {
        Err(KbError::project_not_found(id.to_string()))
    }
}

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    let status: String = row.get(3)?;
    let completed_at: Option<i64> = row.get(6)?;

    Ok(Project {
        id: uuid_column(row, 0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        status: status
            .parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?,
        created_at: timestamp_column(row, 4)?,
        updated_at: timestamp_column(row, 5)?,
        completed_at: completed_at.map(|m| from_micros(m, 6)).transpose()?,
    })
}

fn uuid_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    from_micros(row.get(idx)?, idx)
}

fn to_micros(ts: &DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

fn from_micros(micros: i64, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_micros(micros).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Integer,
            format!("timestamp out of range: {}", micros).into(),
        )
    })
}

fn is_constraint_violation(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
