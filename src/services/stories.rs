// Stories service.
// Stories (per sub-project) and storylines (per project), their stakeholder
// selections, and the import-then-save flow used by the pickers.

use serde::Deserialize;

use super::stakeholders::import_missing;
use super::{clean_id_list, load_pool, resolve_refs};
use crate::dates::normalize_day;
use crate::db::{now_rfc3339, DbStory, DbStoryline, StoryDb};
use crate::error::ServiceError;
use crate::types::{StoryView, StorylineView};
use crate::util::{
    validate_bounded_string, validate_id, validate_optional_text, MAX_CONTENT_LEN,
    MAX_SHORT_TEXT_LEN,
};

/// Full set of editable story fields.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryInput {
    pub subproject_id: String,
    pub story_name: String,
    pub time: String,
    #[serde(default)]
    pub stakeholder_ids: Vec<String>,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStoryRequest {
    pub id: String,
    pub story_name: Option<String>,
    pub time: Option<String>,
    pub content: Option<String>,
    pub stakeholder_ids: Option<Vec<String>>,
}

/// Full set of editable storyline fields.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorylineInput {
    pub project_id: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    pub event_time: String,
    #[serde(default)]
    pub stakeholder_ids: Vec<String>,
    pub expected_outcome: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStorylineRequest {
    pub id: String,
    pub title: Option<String>,
    pub content: Option<String>,
    pub event_time: Option<String>,
    pub stakeholder_ids: Option<Vec<String>>,
    pub expected_outcome: Option<String>,
    pub clear_expected_outcome: Option<bool>,
}

fn validation(msg: String) -> ServiceError {
    ServiceError::Validation(msg)
}

fn validate_body(content: &str) -> Result<String, ServiceError> {
    validate_bounded_string(content, "content", 0, MAX_CONTENT_LEN).map_err(validation)
}

// =============================================================================
// Stories
// =============================================================================

/// Create a story. Stakeholder ids are stored as given; ids that do not
/// resolve are omitted when the story is read.
pub fn create_story(db: &StoryDb, input: StoryInput) -> Result<StoryView, ServiceError> {
    let StoryInput {
        subproject_id,
        story_name,
        time,
        stakeholder_ids,
        content,
    } = input;

    validate_id(&subproject_id, "subproject_id").map_err(validation)?;
    let story_name = validate_bounded_string(&story_name, "story_name", 1, MAX_SHORT_TEXT_LEN)
        .map_err(validation)?;
    let time = normalize_day(&time)?;
    let content = validate_body(&content)?;
    let stakeholder_ids = clean_id_list(stakeholder_ids, "stakeholder_id")?;

    if db.get_subproject(&subproject_id)?.is_none() {
        return Err(ServiceError::not_found("Sub-project", &subproject_id));
    }

    let now = now_rfc3339();
    let story = DbStory {
        id: uuid::Uuid::new_v4().to_string(),
        subproject_id,
        story_name,
        time,
        stakeholder_ids,
        content,
        created_at: now.clone(),
        updated_at: now,
    };
    db.upsert_story(&story)?;
    log::info!("Created story '{}' ({})", story.story_name, story.id);
    story_view(db, story)
}

pub fn update_story(db: &StoryDb, request: UpdateStoryRequest) -> Result<StoryView, ServiceError> {
    let UpdateStoryRequest {
        id,
        story_name,
        time,
        content,
        stakeholder_ids,
    } = request;

    let mut story = db
        .get_story(&id)?
        .ok_or_else(|| ServiceError::not_found("Story", &id))?;

    if let Some(name) = story_name {
        story.story_name = validate_bounded_string(&name, "story_name", 1, MAX_SHORT_TEXT_LEN)
            .map_err(validation)?;
    }
    if let Some(t) = time {
        story.time = normalize_day(&t)?;
    }
    if let Some(c) = content {
        story.content = validate_body(&c)?;
    }
    if let Some(ids) = stakeholder_ids {
        story.stakeholder_ids = clean_id_list(ids, "stakeholder_id")?;
    }
    story.updated_at = now_rfc3339();
    db.upsert_story(&story)?;
    story_view(db, story)
}

pub fn get_story(db: &StoryDb, id: &str) -> Result<StoryView, ServiceError> {
    let story = db
        .get_story(id)?
        .ok_or_else(|| ServiceError::not_found("Story", id))?;
    story_view(db, story)
}

pub fn list_stories(db: &StoryDb, subproject_id: &str) -> Result<Vec<StoryView>, ServiceError> {
    if db.get_subproject(subproject_id)?.is_none() {
        return Err(ServiceError::not_found("Sub-project", subproject_id));
    }
    db.get_stories_for_subproject(subproject_id)?
        .into_iter()
        .map(|s| story_view(db, s))
        .collect()
}

/// Delete a story and every follow-up record it owns.
pub fn delete_story(db: &StoryDb, id: &str) -> Result<(), ServiceError> {
    if !db.delete_story(id)? {
        return Err(ServiceError::not_found("Story", id));
    }
    log::info!("Deleted story {}", id);
    Ok(())
}

/// Import stakeholders picked from other projects, rewrite the selection to
/// project-local ids, then create (`story_id = None`) or overwrite the story.
///
/// An import failure aborts before the story is written. Copies created
/// before the failure remain and are reused on retry.
pub fn save_story_with_selection(
    db: &StoryDb,
    story_id: Option<&str>,
    mut input: StoryInput,
    enforce_unique: bool,
) -> Result<StoryView, ServiceError> {
    let subproject = db
        .get_subproject(&input.subproject_id)?
        .ok_or_else(|| ServiceError::not_found("Sub-project", &input.subproject_id))?;
    let selected = clean_id_list(std::mem::take(&mut input.stakeholder_ids), "stakeholder_id")?;
    let outcome = import_missing(db, &subproject.project_id, &selected, enforce_unique)?;
    input.stakeholder_ids = outcome.remap_selection(&selected);

    match story_id {
        None => create_story(db, input),
        Some(id) => update_story(
            db,
            UpdateStoryRequest {
                id: id.to_string(),
                story_name: Some(input.story_name),
                time: Some(input.time),
                content: Some(input.content),
                stakeholder_ids: Some(input.stakeholder_ids),
            },
        ),
    }
}

fn story_view(db: &StoryDb, story: DbStory) -> Result<StoryView, ServiceError> {
    let pool = load_pool(db, &story.stakeholder_ids)?;
    let (stakeholders, stakeholder_names) = resolve_refs(&story.stakeholder_ids, &pool);
    Ok(StoryView {
        id: story.id,
        subproject_id: story.subproject_id,
        story_name: story.story_name,
        time: story.time,
        content: story.content,
        stakeholders,
        stakeholder_names,
        created_at: story.created_at,
        updated_at: story.updated_at,
    })
}

// =============================================================================
// Storylines
// =============================================================================

pub fn create_storyline(
    db: &StoryDb,
    input: StorylineInput,
) -> Result<StorylineView, ServiceError> {
    let StorylineInput {
        project_id,
        title,
        content,
        event_time,
        stakeholder_ids,
        expected_outcome,
    } = input;

    validate_id(&project_id, "project_id").map_err(validation)?;
    let title =
        validate_bounded_string(&title, "title", 1, MAX_SHORT_TEXT_LEN).map_err(validation)?;
    let content = validate_body(&content)?;
    let event_time = normalize_day(&event_time)?;
    let expected_outcome =
        validate_optional_text(expected_outcome.as_deref(), "expected_outcome", MAX_CONTENT_LEN)
            .map_err(validation)?;
    let stakeholder_ids = clean_id_list(stakeholder_ids, "stakeholder_id")?;

    if db.get_project(&project_id)?.is_none() {
        return Err(ServiceError::not_found("Project", &project_id));
    }

    let now = now_rfc3339();
    let storyline = DbStoryline {
        id: uuid::Uuid::new_v4().to_string(),
        project_id,
        title,
        content,
        event_time,
        stakeholder_ids,
        next_follow_up: None,
        expected_outcome,
        created_at: now.clone(),
        updated_at: now,
    };
    db.upsert_storyline(&storyline)?;
    log::info!("Created storyline '{}' ({})", storyline.title, storyline.id);
    storyline_view(db, storyline)
}

pub fn update_storyline(
    db: &StoryDb,
    request: UpdateStorylineRequest,
) -> Result<StorylineView, ServiceError> {
    let UpdateStorylineRequest {
        id,
        title,
        content,
        event_time,
        stakeholder_ids,
        expected_outcome,
        clear_expected_outcome,
    } = request;

    let mut storyline = db
        .get_storyline(&id)?
        .ok_or_else(|| ServiceError::not_found("Storyline", &id))?;

    if let Some(t) = title {
        storyline.title =
            validate_bounded_string(&t, "title", 1, MAX_SHORT_TEXT_LEN).map_err(validation)?;
    }
    if let Some(c) = content {
        storyline.content = validate_body(&c)?;
    }
    if let Some(t) = event_time {
        storyline.event_time = normalize_day(&t)?;
    }
    if let Some(ids) = stakeholder_ids {
        storyline.stakeholder_ids = clean_id_list(ids, "stakeholder_id")?;
    }
    if clear_expected_outcome == Some(true) {
        storyline.expected_outcome = None;
    } else if let Some(o) = expected_outcome {
        storyline.expected_outcome =
            validate_optional_text(Some(o.as_str()), "expected_outcome", MAX_CONTENT_LEN)
                .map_err(validation)?;
    }
    storyline.updated_at = now_rfc3339();
    db.upsert_storyline(&storyline)?;
    storyline_view(db, storyline)
}

pub fn get_storyline(db: &StoryDb, id: &str) -> Result<StorylineView, ServiceError> {
    let storyline = db
        .get_storyline(id)?
        .ok_or_else(|| ServiceError::not_found("Storyline", id))?;
    storyline_view(db, storyline)
}

pub fn list_storylines(db: &StoryDb, project_id: &str) -> Result<Vec<StorylineView>, ServiceError> {
    if db.get_project(project_id)?.is_none() {
        return Err(ServiceError::not_found("Project", project_id));
    }
    db.get_storylines_for_project(project_id)?
        .into_iter()
        .map(|s| storyline_view(db, s))
        .collect()
}

/// Delete a storyline and every follow-up record it owns.
pub fn delete_storyline(db: &StoryDb, id: &str) -> Result<(), ServiceError> {
    if !db.delete_storyline(id)? {
        return Err(ServiceError::not_found("Storyline", id));
    }
    log::info!("Deleted storyline {}", id);
    Ok(())
}

/// Storyline counterpart of [`save_story_with_selection`].
pub fn save_storyline_with_selection(
    db: &StoryDb,
    storyline_id: Option<&str>,
    mut input: StorylineInput,
    enforce_unique: bool,
) -> Result<StorylineView, ServiceError> {
    if db.get_project(&input.project_id)?.is_none() {
        return Err(ServiceError::not_found("Project", &input.project_id));
    }
    let selected = clean_id_list(std::mem::take(&mut input.stakeholder_ids), "stakeholder_id")?;
    let outcome = import_missing(db, &input.project_id, &selected, enforce_unique)?;
    input.stakeholder_ids = outcome.remap_selection(&selected);

    match storyline_id {
        None => create_storyline(db, input),
        Some(id) => {
            let clear_expected_outcome = Some(input.expected_outcome.is_none());
            update_storyline(
                db,
                UpdateStorylineRequest {
                    id: id.to_string(),
                    title: Some(input.title),
                    content: Some(input.content),
                    event_time: Some(input.event_time),
                    stakeholder_ids: Some(input.stakeholder_ids),
                    expected_outcome: input.expected_outcome,
                    clear_expected_outcome,
                },
            )
        }
    }
}

fn storyline_view(db: &StoryDb, storyline: DbStoryline) -> Result<StorylineView, ServiceError> {
    let pool = load_pool(db, &storyline.stakeholder_ids)?;
    let (stakeholders, stakeholder_names) = resolve_refs(&storyline.stakeholder_ids, &pool);
    let next_follow_up = db.latest_open_action_date(&storyline.id)?;
    Ok(StorylineView {
        id: storyline.id,
        project_id: storyline.project_id,
        title: storyline.title,
        content: storyline.content,
        event_time: storyline.event_time,
        stakeholders,
        stakeholder_names,
        next_follow_up,
        expected_outcome: storyline.expected_outcome,
        created_at: storyline.created_at,
        updated_at: storyline.updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::{sample_stakeholder, seed_project, test_db};
    use crate::resolve::split_id_list;
    use crate::services::stakeholders::rename_stakeholder;
    use crate::services::follow_ups::{create_follow_up_at, CreateFollowUpRequest};

    fn story_input(subproject_id: &str, ids: Vec<String>) -> StoryInput {
        StoryInput {
            subproject_id: subproject_id.to_string(),
            story_name: "Kickoff".to_string(),
            time: "2024-04-01 10:00".to_string(),
            stakeholder_ids: ids,
            content: "First meeting".to_string(),
        }
    }

    fn storyline_input(project_id: &str, ids: Vec<String>) -> StorylineInput {
        StorylineInput {
            project_id: project_id.to_string(),
            title: "Renewal".to_string(),
            content: String::new(),
            event_time: "2024-04-01T09:00:00Z".to_string(),
            stakeholder_ids: ids,
            expected_outcome: Some("Signed".to_string()),
        }
    }

    #[test]
    fn test_deleted_stakeholder_drops_from_story_names() {
        let db = test_db();
        seed_project(&db, "p1", "sp1");
        db.insert_stakeholder(&sample_stakeholder("7", "p1", "Ada")).unwrap();
        db.insert_stakeholder(&sample_stakeholder("9", "p1", "Grace")).unwrap();

        let created = create_story(&db, story_input("sp1", split_id_list("7,9"))).expect("create");
        assert_eq!(created.stakeholder_names, "Ada,Grace");

        assert!(db.delete_stakeholder("9").unwrap());
        let view = get_story(&db, &created.id).expect("get");
        assert_eq!(view.stakeholder_names, "Ada");
        assert_eq!(view.stakeholders.len(), 1);
        assert_eq!(view.stakeholders[0].id, "7");
        // The reference itself is kept.
        let stored = db.get_story(&created.id).unwrap().unwrap();
        assert_eq!(stored.stakeholder_ids, vec!["7".to_string(), "9".to_string()]);
    }

    #[test]
    fn test_resigned_and_renamed_stakeholders_render() {
        let db = test_db();
        seed_project(&db, "p1", "sp1");
        db.insert_stakeholder(&sample_stakeholder("7", "p1", "Ada")).unwrap();
        let story = create_story(&db, story_input("sp1", vec!["7".to_string()])).unwrap();

        db.set_stakeholder_resigned("7", true).unwrap();
        rename_stakeholder(&db, "7", "Ada King", true).unwrap();
        let view = get_story(&db, &story.id).unwrap();
        assert_eq!(view.stakeholder_names, "Ada King");
        assert!(view.stakeholders[0].is_resigned);
    }

    #[test]
    fn test_story_validation_and_lifecycle() {
        let db = test_db();
        seed_project(&db, "p1", "sp1");
        assert!(matches!(
            create_story(&db, story_input("ghost", Vec::new())),
            Err(ServiceError::NotFound { .. })
        ));
        let mut blank = story_input("sp1", Vec::new());
        blank.story_name = " ".to_string();
        assert!(matches!(create_story(&db, blank), Err(ServiceError::Validation(_))));

        let story = create_story(&db, story_input("sp1", Vec::new())).unwrap();
        assert_eq!(story.time, "2024-04-01");

        let updated = update_story(
            &db,
            UpdateStoryRequest {
                id: story.id.clone(),
                story_name: Some("Pilot".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(updated.story_name, "Pilot");
        assert_eq!(updated.content, "First meeting");
        assert_eq!(list_stories(&db, "sp1").unwrap().len(), 1);

        create_follow_up_at(
            &db,
            CreateFollowUpRequest {
                parent_id: story.id.clone(),
                content: "call".to_string(),
                event_date: Some("2024-04-02".to_string()),
                ..Default::default()
            },
            "2024-04-02T09:00:00Z",
        )
        .unwrap();
        delete_story(&db, &story.id).unwrap();
        assert_eq!(db.count_follow_ups_for_parent(&story.id).unwrap(), 0);
        assert!(matches!(get_story(&db, &story.id), Err(ServiceError::NotFound { .. })));
        assert!(delete_story(&db, &story.id).is_err());
    }

    #[test]
    fn test_storyline_lifecycle_and_next_follow_up() {
        let db = test_db();
        seed_project(&db, "p1", "sp1");
        let line = create_storyline(&db, storyline_input("p1", Vec::new())).unwrap();
        assert_eq!(line.event_time, "2024-04-01");
        assert_eq!(line.next_follow_up, None);

        create_follow_up_at(
            &db,
            CreateFollowUpRequest {
                parent_id: line.id.clone(),
                content: "chase".to_string(),
                event_date: Some("2024-04-02".to_string()),
                action_date: Some("2024-04-09".to_string()),
                ..Default::default()
            },
            "2024-04-02T09:00:00Z",
        )
        .unwrap();
        let view = get_storyline(&db, &line.id).unwrap();
        assert_eq!(view.next_follow_up.as_deref(), Some("2024-04-09"));

        let cleared = update_storyline(
            &db,
            UpdateStorylineRequest {
                id: line.id.clone(),
                clear_expected_outcome: Some(true),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(cleared.expected_outcome, None);
        assert_eq!(list_storylines(&db, "p1").unwrap().len(), 1);

        delete_storyline(&db, &line.id).unwrap();
        assert!(get_storyline(&db, &line.id).is_err());
        assert!(list_storylines(&db, "ghost").is_err());
    }

    #[test]
    fn test_save_with_selection_imports_and_remaps() {
        let db = test_db();
        seed_project(&db, "p1", "sp1");
        db.insert_stakeholder(&sample_stakeholder("g1", "p2", "Linus")).unwrap();
        db.insert_stakeholder(&sample_stakeholder("l1", "p1", "Ada")).unwrap();

        let saved = save_story_with_selection(
            &db,
            None,
            story_input("sp1", vec!["g1".to_string(), "l1".to_string()]),
            true,
        )
        .expect("save");
        assert_eq!(saved.stakeholder_names, "Linus,Ada");
        let copy_id = saved.stakeholders[0].id.clone();
        assert_ne!(copy_id, "g1");
        assert_eq!(db.get_stakeholder(&copy_id).unwrap().unwrap().project_id, "p1");

        // Saving again with the same global selection reuses the copy.
        let resaved = save_story_with_selection(
            &db,
            Some(&saved.id),
            story_input("sp1", vec!["g1".to_string(), "l1".to_string()]),
            true,
        )
        .expect("resave");
        assert_eq!(resaved.stakeholders[0].id, copy_id);
        assert_eq!(db.get_project_stakeholders("p1", true).unwrap().len(), 2);

        let input = storyline_input("p1", vec!["g1".to_string()]);
        let line = save_storyline_with_selection(&db, None, input, true).expect("storyline");
        assert_eq!(line.stakeholders[0].id, copy_id);
    }

    #[test]
    fn test_import_failure_aborts_save() {
        let db = test_db();
        seed_project(&db, "p1", "sp1");
        // A legacy row whose name no longer passes validation cannot be copied.
        db.insert_stakeholder(&sample_stakeholder("g1", "p2", &"x".repeat(MAX_SHORT_TEXT_LEN + 1)))
            .unwrap();

        let input = story_input("sp1", vec!["g1".to_string()]);
        let err = save_story_with_selection(&db, None, input, true).unwrap_err();
        assert!(matches!(err, ServiceError::ImportFailure { .. }));
        assert!(db.get_stories_for_subproject("sp1").unwrap().is_empty());
    }
}
