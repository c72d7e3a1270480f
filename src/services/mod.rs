//! Business rules over the database layer.
//!
//! Services validate input, enforce lifecycle rules and resolve stakeholder
//! references for display. They take a `&StoryDb` and never open their own
//! transactions around db writes, which already run in one.

pub mod follow_ups;
pub mod projects;
pub mod stakeholders;
pub mod stories;

use std::collections::HashMap;

use crate::db::{DbStakeholder, StoryDb};
use crate::error::ServiceError;
use crate::resolve::{dedupe_ids, resolve_names};
use crate::types::StakeholderRef;

/// Validate an incoming id list and drop repeats, keeping selection order.
pub(crate) fn clean_id_list(ids: Vec<String>, field: &str) -> Result<Vec<String>, ServiceError> {
    let trimmed: Vec<String> = ids.into_iter().map(|id| id.trim().to_string()).collect();
    for id in &trimmed {
        crate::util::validate_id(id, field).map_err(ServiceError::Validation)?;
    }
    Ok(dedupe_ids(trimmed))
}

/// Load the stakeholders referenced by `ids` from the global registry.
pub(crate) fn load_pool(db: &StoryDb, ids: &[String]) -> Result<Vec<DbStakeholder>, ServiceError> {
    Ok(db.get_stakeholders_by_ids(&dedupe_ids(ids.iter().cloned()))?)
}

/// Resolve ids into display refs plus the comma-joined name list. Ids that
/// no longer resolve are omitted.
pub(crate) fn resolve_refs(
    ids: &[String],
    pool: &[DbStakeholder],
) -> (Vec<StakeholderRef>, String) {
    let by_id: HashMap<&str, &DbStakeholder> = pool.iter().map(|s| (s.id.as_str(), s)).collect();
    let resolution = resolve_names(ids, pool);
    let refs = resolution
        .ids
        .iter()
        .filter_map(|id| by_id.get(id.as_str()).map(|s| StakeholderRef::from(*s)))
        .collect();
    (refs, resolution.joined())
}
