use serde::{Deserialize, Serialize};

use crate::db::{DbStakeholder, ParentKind};

/// Configuration stored in ~/.storydesk/config.json
///
/// Every field has a default, so a missing or empty file is a valid config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Overrides the default database location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<String>,
    #[serde(default = "default_page_size")]
    pub default_page_size: i64,
    /// Reject a new or renamed stakeholder whose normalized name is already
    /// used in the same project.
    #[serde(default = "default_true")]
    pub enforce_unique_stakeholder_names: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            db_path: None,
            default_page_size: default_page_size(),
            enforce_unique_stakeholder_names: true,
        }
    }
}

fn default_page_size() -> i64 {
    20
}

fn default_true() -> bool {
    true
}

/// Lifecycle state of a follow-up record, derived from `completed_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FollowUpStatus {
    Open,
    Completed,
}

/// A follow-up record as shown to callers, with contact names resolved.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowUpView {
    pub id: String,
    pub parent_kind: ParentKind,
    pub parent_id: String,
    pub content: String,
    pub follow_up_type: Option<String>,
    /// Contact ids that still resolve, in selection order.
    pub contact_ids: Vec<String>,
    /// Comma-joined contact names, or the free-text note for records
    /// without linked stakeholders.
    pub contact_person: String,
    pub contact_method: Option<String>,
    pub result: Option<String>,
    pub next_action: Option<String>,
    pub event_date: String,
    pub action_date: Option<String>,
    pub completed_at: Option<String>,
    pub created_at: String,
    pub updated_at: Option<String>,
    pub status: FollowUpStatus,
    pub is_overdue: bool,
}

/// One page of follow-up records for a parent.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowUpPage {
    pub records: Vec<FollowUpView>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// A stakeholder reference resolved for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StakeholderRef {
    pub id: String,
    pub name: String,
    pub is_resigned: bool,
}

impl From<&DbStakeholder> for StakeholderRef {
    fn from(s: &DbStakeholder) -> Self {
        StakeholderRef {
            id: s.id.clone(),
            name: s.name.clone(),
            is_resigned: s.is_resigned,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryView {
    pub id: String,
    pub subproject_id: String,
    pub story_name: String,
    pub time: String,
    pub content: String,
    pub stakeholders: Vec<StakeholderRef>,
    /// Display names joined with `,`.
    pub stakeholder_names: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorylineView {
    pub id: String,
    pub project_id: String,
    pub title: String,
    pub content: String,
    pub event_time: String,
    pub stakeholders: Vec<StakeholderRef>,
    pub stakeholder_names: String,
    /// Action date of the latest open follow-up record, read from the records.
    pub next_follow_up: Option<String>,
    pub expected_outcome: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_from_empty_object() {
        let config: Config = serde_json::from_str("{}").expect("parse");
        assert_eq!(config.db_path, None);
        assert_eq!(config.default_page_size, 20);
        assert!(config.enforce_unique_stakeholder_names);
    }

    #[test]
    fn test_config_camel_case_fields() {
        let config: Config = serde_json::from_str(
            r#"{
                "dbPath": "/tmp/s.db",
                "defaultPageSize": 50,
                "enforceUniqueStakeholderNames": false
            }"#,
        )
        .expect("parse");
        assert_eq!(config.db_path.as_deref(), Some("/tmp/s.db"));
        assert_eq!(config.default_page_size, 50);
        assert!(!config.enforce_unique_stakeholder_names);

        let json = serde_json::to_value(Config::default()).expect("serialize");
        assert!(json.get("dbPath").is_none());
        assert_eq!(json["defaultPageSize"], 20);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(serde_json::to_value(FollowUpStatus::Completed).unwrap(), "completed");
    }
}
