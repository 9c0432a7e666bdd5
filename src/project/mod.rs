//! Project lifecycle and decision provenance models
//!
//! A project spans many searches. Its status follows a fixed state machine:
//!
//! ```text
//! PLANNING  -> ACTIVE | ABANDONED
//! ACTIVE    -> COMPLETED | ABANDONED
//! COMPLETED -> (terminal)
//! ABANDONED -> (terminal)
//! ```

use crate::error::{KbError, Result};
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Project lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProjectStatus {
    #[default]
    Planning,
    Active,
    Completed,
    Abandoned,
}

impl ProjectStatus {
    pub const ALL: [ProjectStatus; 4] = [
        ProjectStatus::Planning,
        ProjectStatus::Active,
        ProjectStatus::Completed,
        ProjectStatus::Abandoned,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planning => "PLANNING",
            Self::Active => "ACTIVE",
            Self::Completed => "COMPLETED",
            Self::Abandoned => "ABANDONED",
        }
    }

    /// States reachable in one step
    pub fn allowed_transitions(&self) -> &'static [ProjectStatus] {
        match self {
            Self::Planning => &[Self::Active, Self::Abandoned],
            Self::Active => &[Self::Completed, Self::Abandoned],
            Self::Completed | Self::Abandoned => &[],
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Abandoned)
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectStatus {
    type Err = KbError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| KbError::InvalidInput(format!("Unknown project status: {}", s)))
    }
}

/// A unit of user work spanning multiple searches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: ProjectStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set only on entry into a terminal state
    pub completed_at: Option<DateTime<Utc>>,
}

/// Current time at the microsecond precision the store keeps
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

impl Project {
    /// New project in `PLANNING`
    pub fn new(name: impl Into<String>) -> Self {
        let now = now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            status: ProjectStatus::default(),
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn can_transition_to(&self, target: ProjectStatus) -> bool {
        self.status.allowed_transitions().contains(&target)
    }

    /// Move to `target`, stamping `completed_at` when it is terminal
    pub fn transition_to(&mut self, target: ProjectStatus) -> Result<()> {
        if !self.can_transition_to(target) {
            return Err(KbError::InvalidStateTransition {
                from: self.status.to_string(),
                to: target.to_string(),
            });
        }

        let now = now();
        self.status = target;
        self.updated_at = now;
        if target.is_terminal() {
            self.completed_at = Some(now);
        }
        Ok(())
    }
}

/// One search execution attributed to a project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryHistory {
    pub id: i64,
    pub project_id: Uuid,
    pub query: String,
    pub result_count: usize,
    pub created_at: DateTime<Utc>,
}

/// A recorded choice and its rationale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub id: i64,
    pub project_id: Uuid,
    pub decision: String,
    pub alternatives: Vec<String>,
    pub rationale: String,
    pub created_at: DateTime<Utc>,
}

/// A knowledge chunk cited in support of a decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionSource {
    pub id: i64,
    pub decision_id: i64,
    pub chunk_id: String,
    /// Relevance in [0.0, 1.0]
    pub relevance: f64,
}

/// Input to `capture_decision`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewDecision {
    pub decision: String,
    #[serde(default)]
    pub alternatives: Vec<String>,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub sources: Vec<SourceRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub chunk_id: String,
    pub relevance: f64,
}

impl SourceRef {
    pub fn new(chunk_id: impl Into<String>, relevance: f64) -> Self {
        Self {
            chunk_id: chunk_id.into(),
            relevance,
        }
    }
}

impl NewDecision {
    pub fn new(decision: impl Into<String>, rationale: impl Into<String>) -> Self {
        Self {
            decision: decision.into(),
            rationale: rationale.into(),
            ..Self::default()
        }
    }

    pub fn with_alternatives(mut self, alternatives: Vec<String>) -> Self {
        self.alternatives = alternatives;
        self
    }

    pub fn with_source(mut self, chunk_id: impl Into<String>, relevance: f64) -> Self {
        self.sources.push(SourceRef::new(chunk_id, relevance));
        self
    }

    /// Reject empty decisions and out-of-range relevance before any write
    pub fn validate(&self) -> Result<()> {
        if self.decision.trim().is_empty() {
            return Err(KbError::InvalidInput("decision must not be empty".into()));
        }
        for source in &self.sources {
            if source.chunk_id.trim().is_empty() {
                return Err(KbError::InvalidInput(
                    "decision source chunk_id must not be empty".into(),
                ));
            }
            if !(0.0..=1.0).contains(&source.relevance) {
                return Err(KbError::InvalidInput(format!(
                    "relevance for {} must be within [0.0, 1.0], got {}",
                    source.chunk_id, source.relevance
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_project_defaults_to_planning() {
        let project = Project::new("harness-redesign");
        assert_eq!(project.status, ProjectStatus::Planning);
        assert!(project.completed_at.is_none());
    }

    #[test]
    fn test_transition_table() {
        let project = Project::new("p");
        assert!(project.can_transition_to(ProjectStatus::Active));
        assert!(project.can_transition_to(ProjectStatus::Abandoned));
        assert!(!project.can_transition_to(ProjectStatus::Completed));
        assert!(!project.can_transition_to(ProjectStatus::Planning));

        for terminal in [ProjectStatus::Completed, ProjectStatus::Abandoned] {
            assert!(terminal.allowed_transitions().is_empty());
        }
    }

    #[test]
    fn test_completion_sets_timestamp() {
        let mut project = Project::new("p");
        project.transition_to(ProjectStatus::Active).unwrap();
        assert!(project.completed_at.is_none());

        project.transition_to(ProjectStatus::Completed).unwrap();
        assert_eq!(project.status, ProjectStatus::Completed);
        assert!(project.completed_at.is_some());
    }

    #[test]
    fn test_invalid_transition_names_both_states() {
        let mut project = Project::new("p");
        project.transition_to(ProjectStatus::Abandoned).unwrap();

        let err = project.transition_to(ProjectStatus::Active).unwrap_err();
        match err {
            KbError::InvalidStateTransition { from, to } => {
                assert_eq!(from, "ABANDONED");
                assert_eq!(to, "ACTIVE");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(project.status, ProjectStatus::Abandoned);
    }

    #[test]
    fn test_status_round_trip() {
        assert_eq!("active".parse::<ProjectStatus>().unwrap(), ProjectStatus::Active);
        assert!("archived".parse::<ProjectStatus>().is_err());
        assert_eq!(
            serde_json::to_string(&ProjectStatus::Completed).unwrap(),
            "\"COMPLETED\""
        );
    }

    #[test]
    fn test_decision_validation() {
        assert!(NewDecision::new("Use Vendor A", "lighter").validate().is_ok());
        assert!(NewDecision::new("  ", "").validate().is_err());
        assert!(NewDecision::new("Use Vendor A", "")
            .with_source("c1", 1.5)
            .validate()
            .is_err());
    }
}
