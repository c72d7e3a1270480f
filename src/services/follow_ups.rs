// Follow-up service.
// Lifecycle rules for follow-up records: creation, edits, completion and
// recency-ordered reads with contact names resolved.

use chrono::{Local, TimeZone};
use serde::Deserialize;

use super::{clean_id_list, load_pool};
use crate::dates::{self, max_day, normalize_day, normalize_optional_day, today_local};
use crate::db::{now_rfc3339, DbFollowUp, DbStakeholder, ParentKind, StoryDb};
use crate::error::ServiceError;
use crate::resolve::resolve_names;
use crate::types::{FollowUpPage, FollowUpStatus, FollowUpView};
use crate::util::{
    clamp_page_size, validate_bounded_string, validate_id, validate_offset, validate_optional_text,
    MAX_CONTENT_LEN, MAX_SHORT_TEXT_LEN,
};

/// Create a follow-up record on a story or storyline.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFollowUpRequest {
    pub parent_id: String,
    pub content: String,
    #[serde(default)]
    pub stakeholder_ids: Vec<String>,
    pub event_date: Option<String>,
    pub action_date: Option<String>,
    pub follow_up_type: Option<String>,
    pub contact_method: Option<String>,
    pub next_action: Option<String>,
}

/// Partial update of a follow-up record. `None` leaves a field unchanged;
/// `clear_*` flags set optional fields back to empty.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFollowUpRequest {
    pub id: String,
    pub content: Option<String>,
    pub follow_up_type: Option<String>,
    pub clear_follow_up_type: Option<bool>,
    pub contact_method: Option<String>,
    pub clear_contact_method: Option<bool>,
    pub next_action: Option<String>,
    pub clear_next_action: Option<bool>,
    pub event_date: Option<String>,
    pub clear_event_date: Option<bool>,
    pub action_date: Option<String>,
    pub clear_action_date: Option<bool>,
    /// Replaces the contact selection. The previous selection is discarded.
    pub stakeholder_ids: Option<Vec<String>>,
    /// Free-text contact, for records without linked stakeholders.
    pub contact_person: Option<String>,
    pub result: Option<String>,
    pub clear_result: Option<bool>,
    pub completed_at: Option<String>,
    pub clear_completed_at: Option<bool>,
}

fn validation(msg: String) -> ServiceError {
    ServiceError::Validation(msg)
}

/// Work out whether `parent_id` names a story or a storyline.
pub fn resolve_parent(db: &StoryDb, parent_id: &str) -> Result<ParentKind, ServiceError> {
    if db.get_story(parent_id)?.is_some() {
        return Ok(ParentKind::Story);
    }
    if db.get_storyline(parent_id)?.is_some() {
        return Ok(ParentKind::Storyline);
    }
    Err(ServiceError::not_found("Story or storyline", parent_id))
}

/// Keep the selected ids that exist in the registry, in selection order.
fn keep_known_contacts(db: &StoryDb, ids: Vec<String>) -> Result<Vec<String>, ServiceError> {
    let ids = clean_id_list(ids, "stakeholder_id")?;
    let pool = load_pool(db, &ids)?;
    Ok(resolve_names(&ids, &pool).ids)
}

fn resolve_today(today: Option<&str>) -> Result<String, ServiceError> {
    match today {
        Some(day) => Ok(normalize_day(day)?),
        None => Ok(today_local()),
    }
}

fn apply_optional_text(
    slot: &mut Option<String>,
    value: Option<String>,
    clear: Option<bool>,
    field: &str,
    max: usize,
) -> Result<(), ServiceError> {
    if clear == Some(true) {
        *slot = None;
    } else if let Some(v) = value {
        *slot = validate_optional_text(Some(v.as_str()), field, max).map_err(validation)?;
    }
    Ok(())
}

/// Earliest day a record may be marked complete: the later of its event
/// date and the local day it was entered.
pub fn completion_floor(record: &DbFollowUp) -> Option<String> {
    completion_floor_in(record, &Local)
}

/// [`completion_floor`] with the entry day read in `tz`.
pub fn completion_floor_in<Tz: TimeZone>(record: &DbFollowUp, tz: &Tz) -> Option<String> {
    let created_day = dates::day_in(&record.created_at, tz).ok();
    let event_day = Some(record.event_date.as_str()).filter(|d| !d.is_empty());
    match (event_day, created_day.as_deref()) {
        (Some(event), Some(created)) => Some(max_day(event, created).to_string()),
        (Some(event), None) => Some(event.to_string()),
        (None, created) => created.map(str::to_string),
    }
}

fn check_completion_date(record: &DbFollowUp, completed_at: &str) -> Result<(), ServiceError> {
    if let Some(floor) = completion_floor(record) {
        if completed_at < floor.as_str() {
            return Err(validation(format!(
                "Completion date {} is earlier than {}, the record's event or entry date",
                completed_at, floor
            )));
        }
    }
    Ok(())
}

pub fn create_follow_up(
    db: &StoryDb,
    request: CreateFollowUpRequest,
) -> Result<FollowUpView, ServiceError> {
    create_follow_up_at(db, request, &now_rfc3339())
}

/// Create with an explicit entry timestamp, used when backfilling records.
pub fn create_follow_up_at(
    db: &StoryDb,
    request: CreateFollowUpRequest,
    created_at: &str,
) -> Result<FollowUpView, ServiceError> {
    let CreateFollowUpRequest {
        parent_id,
        content,
        stakeholder_ids,
        event_date,
        action_date,
        follow_up_type,
        contact_method,
        next_action,
    } = request;

    let content =
        validate_bounded_string(&content, "content", 1, MAX_CONTENT_LEN).map_err(validation)?;
    let event_date = match event_date.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
        Some(d) => normalize_day(d)?,
        None => return Err(validation("event_date is required".to_string())),
    };
    let action_date = normalize_optional_day(action_date.as_deref())?;
    let follow_up_type =
        validate_optional_text(follow_up_type.as_deref(), "follow_up_type", MAX_SHORT_TEXT_LEN)
            .map_err(validation)?;
    let contact_method =
        validate_optional_text(contact_method.as_deref(), "contact_method", MAX_SHORT_TEXT_LEN)
            .map_err(validation)?;
    let next_action =
        validate_optional_text(next_action.as_deref(), "next_action", MAX_SHORT_TEXT_LEN)
            .map_err(validation)?;
    validate_id(&parent_id, "parent_id").map_err(validation)?;

    let parent_kind = resolve_parent(db, &parent_id)?;
    let contact_ids = keep_known_contacts(db, stakeholder_ids)?;

    let record = DbFollowUp {
        id: uuid::Uuid::new_v4().to_string(),
        parent_kind,
        parent_id,
        content,
        follow_up_type,
        contact_ids,
        contact_note: None,
        contact_method,
        result: None,
        next_action,
        event_date,
        action_date,
        completed_at: None,
        created_at: created_at.to_string(),
        updated_at: None,
    };
    db.insert_follow_up(&record)?;
    log::info!(
        "Created follow-up {} on {} {}",
        record.id,
        record.parent_kind.as_str(),
        record.parent_id
    );
    to_view(db, record, &today_local())
}

pub fn update_follow_up(
    db: &StoryDb,
    request: UpdateFollowUpRequest,
) -> Result<FollowUpView, ServiceError> {
    let UpdateFollowUpRequest {
        id,
        content,
        follow_up_type,
        clear_follow_up_type,
        contact_method,
        clear_contact_method,
        next_action,
        clear_next_action,
        event_date,
        clear_event_date,
        action_date,
        clear_action_date,
        stakeholder_ids,
        contact_person,
        result,
        clear_result,
        completed_at,
        clear_completed_at,
    } = request;

    validate_id(&id, "id").map_err(validation)?;
    if clear_event_date == Some(true) {
        return Err(validation("event_date cannot be cleared".to_string()));
    }
    if stakeholder_ids.is_some() && contact_person.is_some() {
        return Err(validation(
            "Supply either stakeholderIds or contactPerson, not both".to_string(),
        ));
    }

    let mut record = db
        .get_follow_up(&id)?
        .ok_or_else(|| ServiceError::not_found("Follow-up record", &id))?;
    let was_completed = record.is_completed();

    if let Some(c) = content {
        record.content =
            validate_bounded_string(&c, "content", 1, MAX_CONTENT_LEN).map_err(validation)?;
    }
    apply_optional_text(
        &mut record.follow_up_type,
        follow_up_type,
        clear_follow_up_type,
        "follow_up_type",
        MAX_SHORT_TEXT_LEN,
    )?;
    apply_optional_text(
        &mut record.contact_method,
        contact_method,
        clear_contact_method,
        "contact_method",
        MAX_SHORT_TEXT_LEN,
    )?;
    apply_optional_text(
        &mut record.next_action,
        next_action,
        clear_next_action,
        "next_action",
        MAX_SHORT_TEXT_LEN,
    )?;
    apply_optional_text(&mut record.result, result, clear_result, "result", MAX_CONTENT_LEN)?;

    let event_changed = event_date.is_some();
    if let Some(d) = event_date {
        record.event_date = normalize_day(&d)?;
    }
    if clear_action_date == Some(true) {
        record.action_date = None;
    } else if let Some(d) = action_date {
        record.action_date = normalize_optional_day(Some(d.as_str()))?;
    }

    if let Some(ids) = stakeholder_ids {
        record.contact_ids = keep_known_contacts(db, ids)?;
        record.contact_note = None;
    } else if let Some(text) = contact_person {
        record.contact_note =
            validate_optional_text(Some(text.as_str()), "contact_person", MAX_SHORT_TEXT_LEN)
                .map_err(validation)?;
        record.contact_ids.clear();
    }

    let completion_supplied = completed_at.is_some();
    if clear_completed_at == Some(true) {
        if was_completed {
            return Err(validation(
                "Reopening a completed follow-up record is not supported".to_string(),
            ));
        }
    } else if let Some(d) = completed_at {
        record.completed_at = Some(normalize_day(&d)?);
    }
    if let Some(done) = record.completed_at.as_deref() {
        if completion_supplied || event_changed {
            check_completion_date(&record, done)?;
        }
    }

    record.updated_at = Some(now_rfc3339());
    if !db.update_follow_up(&record)? {
        return Err(ServiceError::not_found("Follow-up record", &id));
    }
    if !was_completed {
        if let Some(done) = record.completed_at.as_deref() {
            log::info!("Follow-up {} completed on {}", record.id, done);
        }
    }
    to_view(db, record, &today_local())
}

/// Mark a record complete, or revise the completion of an already completed
/// one. `stakeholder_ids` optionally reassigns the contacts.
pub fn complete_follow_up(
    db: &StoryDb,
    id: &str,
    completion_date: &str,
    remark: Option<String>,
    stakeholder_ids: Option<Vec<String>>,
) -> Result<FollowUpView, ServiceError> {
    update_follow_up(
        db,
        UpdateFollowUpRequest {
            id: id.to_string(),
            completed_at: Some(completion_date.to_string()),
            result: remark,
            stakeholder_ids,
            ..Default::default()
        },
    )
}

/// Hard delete. Confirmation happens at the UI boundary.
pub fn delete_follow_up(db: &StoryDb, id: &str) -> Result<(), ServiceError> {
    if !db.delete_follow_up(id)? {
        return Err(ServiceError::not_found("Follow-up record", id));
    }
    log::info!("Deleted follow-up {}", id);
    Ok(())
}

pub fn get_follow_up(
    db: &StoryDb,
    id: &str,
    today: Option<&str>,
) -> Result<FollowUpView, ServiceError> {
    let today = resolve_today(today)?;
    let record = db
        .get_follow_up(id)?
        .ok_or_else(|| ServiceError::not_found("Follow-up record", id))?;
    to_view(db, record, &today)
}

/// One page of a parent's records, most recent first.
pub fn list_follow_ups(
    db: &StoryDb,
    parent_id: &str,
    limit: Option<i64>,
    offset: Option<i64>,
    default_page_size: i64,
    today: Option<&str>,
) -> Result<FollowUpPage, ServiceError> {
    let today = resolve_today(today)?;
    let limit = clamp_page_size(limit, default_page_size);
    let offset = validate_offset(offset).map_err(validation)?;
    resolve_parent(db, parent_id)?;

    let records = db.get_follow_ups_for_parent(parent_id, limit, offset)?;
    let total = db.count_follow_ups_for_parent(parent_id)?;
    Ok(FollowUpPage {
        records: to_views(db, records, &today)?,
        total,
        limit,
        offset,
    })
}

/// The first record in recency order, for "latest follow-up" displays.
pub fn latest_follow_up(
    db: &StoryDb,
    parent_id: &str,
    today: Option<&str>,
) -> Result<Option<FollowUpView>, ServiceError> {
    let page = list_follow_ups(db, parent_id, Some(1), Some(0), 1, today)?;
    Ok(page.records.into_iter().next())
}

/// Open records under a project whose action date has passed, soonest first.
pub fn list_overdue(
    db: &StoryDb,
    project_id: &str,
    today: Option<&str>,
) -> Result<Vec<FollowUpView>, ServiceError> {
    let today = resolve_today(today)?;
    if db.get_project(project_id)?.is_none() {
        return Err(ServiceError::not_found("Project", project_id));
    }
    let records = db.get_overdue_follow_ups_for_project(project_id, &today)?;
    to_views(db, records, &today)
}

/// Next follow-up date of a storyline, read from its records.
pub fn storyline_next_follow_up(
    db: &StoryDb,
    storyline_id: &str,
) -> Result<Option<String>, ServiceError> {
    if db.get_storyline(storyline_id)?.is_none() {
        return Err(ServiceError::not_found("Storyline", storyline_id));
    }
    Ok(db.latest_open_action_date(storyline_id)?)
}

fn to_view(db: &StoryDb, record: DbFollowUp, today: &str) -> Result<FollowUpView, ServiceError> {
    let pool = load_pool(db, &record.contact_ids)?;
    Ok(build_view(record, &pool, today))
}

fn to_views(
    db: &StoryDb,
    records: Vec<DbFollowUp>,
    today: &str,
) -> Result<Vec<FollowUpView>, ServiceError> {
    let ids: Vec<String> = records
        .iter()
        .flat_map(|r| r.contact_ids.iter().cloned())
        .collect();
    let pool = load_pool(db, &ids)?;
    Ok(records
        .into_iter()
        .map(|r| build_view(r, &pool, today))
        .collect())
}

/// Shape a stored record for callers. Contact names are resolved against
/// `pool`; the free-text note is shown only when no ids are linked.
pub fn build_view(record: DbFollowUp, pool: &[DbStakeholder], today: &str) -> FollowUpView {
    let resolution = resolve_names(&record.contact_ids, pool);
    let contact_person = if record.contact_ids.is_empty() {
        record.contact_note.clone().unwrap_or_default()
    } else {
        resolution.joined()
    };
    let status = if record.is_completed() {
        FollowUpStatus::Completed
    } else {
        FollowUpStatus::Open
    };
    let is_overdue = dates::is_overdue(
        record.action_date.as_deref(),
        record.completed_at.as_deref(),
        today,
    );

    FollowUpView {
        id: record.id,
        parent_kind: record.parent_kind,
        parent_id: record.parent_id,
        content: record.content,
        follow_up_type: record.follow_up_type,
        contact_ids: resolution.ids,
        contact_person,
        contact_method: record.contact_method,
        result: record.result,
        next_action: record.next_action,
        event_date: record.event_date,
        action_date: record.action_date,
        completed_at: record.completed_at,
        created_at: record.created_at,
        updated_at: record.updated_at,
        status,
        is_overdue,
    }
}
