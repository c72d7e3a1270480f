// Projects service.
// Projects and their sub-projects: the owners of storylines and stories.

use crate::db::{now_rfc3339, DbProject, DbSubproject, StoryDb};
use crate::error::ServiceError;
use crate::util::{
    validate_bounded_string, validate_id, validate_optional_text, MAX_CONTENT_LEN,
    MAX_SHORT_TEXT_LEN,
};

fn validation(msg: String) -> ServiceError {
    ServiceError::Validation(msg)
}

pub fn create_project(
    db: &StoryDb,
    name: &str,
    description: Option<&str>,
) -> Result<DbProject, ServiceError> {
    let name = validate_bounded_string(name, "name", 1, MAX_SHORT_TEXT_LEN).map_err(validation)?;
    let description = validate_optional_text(description, "description", MAX_CONTENT_LEN)
        .map_err(validation)?;

    let now = now_rfc3339();
    let project = DbProject {
        id: uuid::Uuid::new_v4().to_string(),
        name,
        description,
        created_at: now.clone(),
        updated_at: now,
    };
    db.upsert_project(&project)?;
    log::info!("Created project '{}' ({})", project.name, project.id);
    Ok(project)
}

pub fn rename_project(db: &StoryDb, id: &str, name: &str) -> Result<DbProject, ServiceError> {
    let name = validate_bounded_string(name, "name", 1, MAX_SHORT_TEXT_LEN).map_err(validation)?;
    let mut project = get_project(db, id)?;
    project.name = name;
    project.updated_at = now_rfc3339();
    db.upsert_project(&project)?;
    Ok(project)
}

pub fn get_project(db: &StoryDb, id: &str) -> Result<DbProject, ServiceError> {
    db.get_project(id)?
        .ok_or_else(|| ServiceError::not_found("Project", id))
}

pub fn list_projects(db: &StoryDb) -> Result<Vec<DbProject>, ServiceError> {
    Ok(db.get_all_projects()?)
}

/// Create a sub-project under an existing project.
pub fn create_subproject(
    db: &StoryDb,
    project_id: &str,
    name: &str,
) -> Result<DbSubproject, ServiceError> {
    validate_id(project_id, "project_id").map_err(validation)?;
    let name = validate_bounded_string(name, "name", 1, MAX_SHORT_TEXT_LEN).map_err(validation)?;
    get_project(db, project_id)?;

    let now = now_rfc3339();
    let subproject = DbSubproject {
        id: uuid::Uuid::new_v4().to_string(),
        project_id: project_id.to_string(),
        name,
        created_at: now.clone(),
        updated_at: now,
    };
    db.upsert_subproject(&subproject)?;
    Ok(subproject)
}

pub fn list_subprojects(db: &StoryDb, project_id: &str) -> Result<Vec<DbSubproject>, ServiceError> {
    get_project(db, project_id)?;
    Ok(db.get_subprojects_for_project(project_id)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::test_db;

    #[test]
    fn test_project_and_subproject_lifecycle() {
        let db = test_db();
        let project = create_project(&db, "  Apollo ", Some("moonshot")).expect("create");
        assert_eq!(project.name, "Apollo");

        let sub = create_subproject(&db, &project.id, "Guidance").expect("sub");
        assert_eq!(sub.project_id, project.id);
        assert_eq!(list_subprojects(&db, &project.id).unwrap().len(), 1);

        let renamed = rename_project(&db, &project.id, "Artemis").expect("rename");
        assert_eq!(get_project(&db, &project.id).unwrap().name, renamed.name);
        assert_eq!(list_projects(&db).unwrap().len(), 1);
    }

    #[test]
    fn test_subproject_requires_project() {
        let db = test_db();
        assert!(matches!(
            create_subproject(&db, "ghost", "Guidance"),
            Err(ServiceError::NotFound { .. })
        ));
        assert!(matches!(create_project(&db, " ", None), Err(ServiceError::Validation(_))));
    }
}
