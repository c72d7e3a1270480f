//! Shared type definitions for the database layer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors specific to database operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Schema migration failed: {0}")]
    Migration(String),

    #[error("Database is not open")]
    NotOpen,
}

/// A row from the `projects` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbProject {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A row from the `subprojects` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbSubproject {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub created_at: String,
    pub updated_at: String,
}

/// A row from the `stakeholders` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbStakeholder {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub company: Option<String>,
    pub role: String,
    pub contact_info: Option<String>,
    pub identity_type: Option<String>,
    pub is_resigned: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// A row from the `stories` table plus its ordered stakeholder references.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbStory {
    pub id: String,
    pub subproject_id: String,
    pub story_name: String,
    /// Day-granularity date (`YYYY-MM-DD`).
    pub time: String,
    pub stakeholder_ids: Vec<String>,
    pub content: String,
    pub created_at: String,
    pub updated_at: String,
}

/// A row from the `storylines` table plus its ordered stakeholder references.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbStoryline {
    pub id: String,
    pub project_id: String,
    pub title: String,
    pub content: String,
    pub event_time: String,
    pub stakeholder_ids: Vec<String>,
    /// Cached action date of the latest open follow-up record.
    pub next_follow_up: Option<String>,
    pub expected_outcome: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Which kind of entity owns a follow-up record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParentKind {
    Story,
    Storyline,
}

impl ParentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParentKind::Story => "story",
            ParentKind::Storyline => "storyline",
        }
    }

    /// Parse the stored column value. Unknown values are treated as stories.
    pub fn from_str_lossy(value: &str) -> Self {
        match value {
            "storyline" => ParentKind::Storyline,
            _ => ParentKind::Story,
        }
    }
}

/// A row from the `follow_up_records` table plus its ordered contact ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbFollowUp {
    pub id: String,
    pub parent_kind: ParentKind,
    pub parent_id: String,
    pub content: String,
    pub follow_up_type: Option<String>,
    /// Stakeholder ids selected as contact persons, in selection order.
    pub contact_ids: Vec<String>,
    /// Free-text contact person for records without linked stakeholders.
    pub contact_note: Option<String>,
    pub contact_method: Option<String>,
    /// Completion remark.
    pub result: Option<String>,
    pub next_action: Option<String>,
    pub event_date: String,
    pub action_date: Option<String>,
    pub completed_at: Option<String>,
    pub created_at: String,
    /// Unset until the record is first edited or completed.
    pub updated_at: Option<String>,
}

impl DbFollowUp {
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Recency key: `updated_at`, else `event_date`, else `created_at`.
    pub fn recency_key(&self) -> &str {
        self.updated_at
            .as_deref()
            .or(Some(self.event_date.as_str()).filter(|d| !d.is_empty()))
            .unwrap_or(&self.created_at)
    }
}

/// Outcome of collapsing stakeholder rows that share a normalized name.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DedupReport {
    pub normalized_name: String,
    pub kept_id: Option<String>,
    pub removed_ids: Vec<String>,
    pub removed_count: usize,
}
