// Stakeholder service.
// Registry access, write-time name uniqueness, cross-project import and
// name-based deduplication.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::db::{now_rfc3339, DbStakeholder, DedupReport, StoryDb};
use crate::error::ServiceError;
use crate::resolve::{dedupe_ids, find_by_normalized_name, normalize_name, selectable_stakeholders};
use crate::util::{validate_bounded_string, validate_id, validate_optional_text, MAX_SHORT_TEXT_LEN};

/// The stakeholder pool as the rest of the app sees it.
///
/// Every picker and every import goes through this trait, so the visibility
/// rule lives in [`list_selectable`] and nowhere else.
pub trait StakeholderRegistry {
    fn list_for_project(
        &self,
        project_id: &str,
        include_resigned: bool,
    ) -> Result<Vec<DbStakeholder>, ServiceError>;

    fn list_global(&self, include_resigned: bool) -> Result<Vec<DbStakeholder>, ServiceError>;

    fn get(&self, id: &str) -> Result<Option<DbStakeholder>, ServiceError>;

    fn create(&self, stakeholder: &DbStakeholder) -> Result<(), ServiceError>;

    /// Returns false when no stakeholder has this id.
    fn update(&self, stakeholder: &DbStakeholder) -> Result<bool, ServiceError>;

    /// Soft delete. Returns false when no stakeholder has this id.
    fn set_resigned(&self, id: &str, resigned: bool) -> Result<bool, ServiceError>;
}

impl StakeholderRegistry for StoryDb {
    fn list_for_project(
        &self,
        project_id: &str,
        include_resigned: bool,
    ) -> Result<Vec<DbStakeholder>, ServiceError> {
        Ok(self.get_project_stakeholders(project_id, include_resigned)?)
    }

    fn list_global(&self, include_resigned: bool) -> Result<Vec<DbStakeholder>, ServiceError> {
        Ok(self.get_all_stakeholders(include_resigned)?)
    }

    fn get(&self, id: &str) -> Result<Option<DbStakeholder>, ServiceError> {
        Ok(self.get_stakeholder(id)?)
    }

    fn create(&self, stakeholder: &DbStakeholder) -> Result<(), ServiceError> {
        Ok(self.insert_stakeholder(stakeholder)?)
    }

    fn update(&self, stakeholder: &DbStakeholder) -> Result<bool, ServiceError> {
        Ok(self.update_stakeholder(stakeholder)?)
    }

    fn set_resigned(&self, id: &str, resigned: bool) -> Result<bool, ServiceError> {
        Ok(self.set_stakeholder_resigned(id, resigned)?)
    }
}

/// Fields for a new stakeholder.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStakeholder {
    pub project_id: String,
    pub name: String,
    pub company: Option<String>,
    #[serde(default)]
    pub role: String,
    pub contact_info: Option<String>,
    pub identity_type: Option<String>,
}

fn validation(msg: String) -> ServiceError {
    ServiceError::Validation(msg)
}

/// Fail when another stakeholder of the project already uses this name.
fn ensure_unique_name<R: StakeholderRegistry + ?Sized>(
    registry: &R,
    project_id: &str,
    name: &str,
    except_id: Option<&str>,
) -> Result<(), ServiceError> {
    let pool = registry.list_for_project(project_id, true)?;
    let clash = find_by_normalized_name(&pool, name)
        .into_iter()
        .find(|s| Some(s.id.as_str()) != except_id);
    match clash {
        Some(existing) => Err(validation(format!(
            "A stakeholder named '{}' already exists in this project ({})",
            existing.name, existing.id
        ))),
        None => Ok(()),
    }
}

/// Create a stakeholder scoped to a project.
pub fn create_stakeholder<R: StakeholderRegistry + ?Sized>(
    registry: &R,
    request: NewStakeholder,
    enforce_unique: bool,
) -> Result<DbStakeholder, ServiceError> {
    let NewStakeholder {
        project_id,
        name,
        company,
        role,
        contact_info,
        identity_type,
    } = request;

    validate_id(&project_id, "project_id").map_err(validation)?;
    let name = validate_bounded_string(&name, "name", 1, MAX_SHORT_TEXT_LEN).map_err(validation)?;
    let role = validate_optional_text(Some(role.as_str()), "role", MAX_SHORT_TEXT_LEN)
        .map_err(validation)?
        .unwrap_or_default();
    let company = validate_optional_text(company.as_deref(), "company", MAX_SHORT_TEXT_LEN)
        .map_err(validation)?;
    let contact_info =
        validate_optional_text(contact_info.as_deref(), "contact_info", MAX_SHORT_TEXT_LEN)
            .map_err(validation)?;
    let identity_type =
        validate_optional_text(identity_type.as_deref(), "identity_type", MAX_SHORT_TEXT_LEN)
            .map_err(validation)?;

    if enforce_unique {
        ensure_unique_name(registry, &project_id, &name, None)?;
    }

    let now = now_rfc3339();
    let stakeholder = DbStakeholder {
        id: uuid::Uuid::new_v4().to_string(),
        project_id,
        name,
        company,
        role,
        contact_info,
        identity_type,
        is_resigned: false,
        created_at: now.clone(),
        updated_at: now,
    };
    registry.create(&stakeholder)?;
    log::info!(
        "Created stakeholder '{}' ({}) in project {}",
        stakeholder.name,
        stakeholder.id,
        stakeholder.project_id
    );
    Ok(stakeholder)
}

/// Load a stakeholder, apply `edit`, and write it back.
fn edit_stakeholder<R, F>(registry: &R, id: &str, edit: F) -> Result<DbStakeholder, ServiceError>
where
    R: StakeholderRegistry + ?Sized,
    F: FnOnce(&mut DbStakeholder) -> Result<(), ServiceError>,
{
    let mut stakeholder = registry
        .get(id)?
        .ok_or_else(|| ServiceError::not_found("Stakeholder", id))?;
    edit(&mut stakeholder)?;
    stakeholder.updated_at = now_rfc3339();
    if !registry.update(&stakeholder)? {
        return Err(ServiceError::not_found("Stakeholder", id));
    }
    Ok(stakeholder)
}

/// Rename a stakeholder. Existing records keep resolving by id, so they show
/// the new name on their next read.
pub fn rename_stakeholder<R: StakeholderRegistry + ?Sized>(
    registry: &R,
    id: &str,
    new_name: &str,
    enforce_unique: bool,
) -> Result<DbStakeholder, ServiceError> {
    let name =
        validate_bounded_string(new_name, "name", 1, MAX_SHORT_TEXT_LEN).map_err(validation)?;
    edit_stakeholder(registry, id, |s| {
        if enforce_unique {
            ensure_unique_name(registry, &s.project_id, &name, Some(s.id.as_str()))?;
        }
        s.name = name;
        Ok(())
    })
}

pub fn set_stakeholder_role<R: StakeholderRegistry + ?Sized>(
    registry: &R,
    id: &str,
    role: &str,
) -> Result<DbStakeholder, ServiceError> {
    let role = validate_optional_text(Some(role), "role", MAX_SHORT_TEXT_LEN)
        .map_err(validation)?
        .unwrap_or_default();
    edit_stakeholder(registry, id, |s| {
        s.role = role;
        Ok(())
    })
}

pub fn set_stakeholder_company<R: StakeholderRegistry + ?Sized>(
    registry: &R,
    id: &str,
    company: Option<&str>,
) -> Result<DbStakeholder, ServiceError> {
    let company =
        validate_optional_text(company, "company", MAX_SHORT_TEXT_LEN).map_err(validation)?;
    edit_stakeholder(registry, id, |s| {
        s.company = company;
        Ok(())
    })
}

/// Mark a stakeholder as resigned. Past references keep rendering.
pub fn resign_stakeholder<R: StakeholderRegistry + ?Sized>(
    registry: &R,
    id: &str,
) -> Result<(), ServiceError> {
    if !registry.set_resigned(id, true)? {
        return Err(ServiceError::not_found("Stakeholder", id));
    }
    log::info!("Stakeholder {} marked resigned", id);
    Ok(())
}

pub fn reinstate_stakeholder<R: StakeholderRegistry + ?Sized>(
    registry: &R,
    id: &str,
) -> Result<(), ServiceError> {
    if !registry.set_resigned(id, false)? {
        return Err(ServiceError::not_found("Stakeholder", id));
    }
    Ok(())
}

/// Stakeholders a picker may offer. `project_id = None` lists the global
/// pool. Resigned rows appear only when already part of `keep_ids`.
pub fn list_selectable<R: StakeholderRegistry + ?Sized>(
    registry: &R,
    project_id: Option<&str>,
    keep_ids: &[String],
) -> Result<Vec<DbStakeholder>, ServiceError> {
    let pool = match project_id {
        Some(project_id) => registry.list_for_project(project_id, true)?,
        None => registry.list_global(true)?,
    };
    Ok(selectable_stakeholders(&pool, keep_ids)
        .into_iter()
        .cloned()
        .collect())
}

// =============================================================================
// Cross-project import
// =============================================================================

/// What importing one selected id into a project requires.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ImportEntry {
    /// Already a stakeholder of the project.
    AlreadyLocal { id: String },
    /// A project stakeholder with the same normalized name exists.
    ReuseByName { global_id: String, local_id: String },
    /// A project-local copy of `template` must be created.
    Create { global_id: String, template: DbStakeholder },
    /// Not found in any pool; dropped from the selection.
    Unknown { id: String },
}

/// Side-effect free description of an import, for confirmation before apply.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportPlan {
    pub project_id: String,
    pub entries: Vec<ImportEntry>,
}

impl ImportPlan {
    /// Number of stakeholders applying this plan would create.
    pub fn creations(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, ImportEntry::Create { .. }))
            .count()
    }
}

/// Result of applying an import plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOutcome {
    /// `global id -> project-local id` for every id that was not already local.
    pub remap: BTreeMap<String, String>,
    pub created_ids: Vec<String>,
    pub unknown_ids: Vec<String>,
}

impl ImportOutcome {
    /// Rewrite a selection into project-local ids. Order is preserved;
    /// unknown ids and duplicates produced by the remap are dropped.
    pub fn remap_selection(&self, selected: &[String]) -> Vec<String> {
        let unknown: HashSet<&str> = self.unknown_ids.iter().map(String::as_str).collect();
        dedupe_ids(
            selected
                .iter()
                .filter(|id| !unknown.contains(id.as_str()))
                .map(|id| self.remap.get(id).cloned().unwrap_or_else(|| id.clone())),
        )
    }
}

/// Work out how `selected_ids` map into `project_id` without writing anything.
pub fn plan_import(
    project_id: &str,
    selected_ids: &[String],
    existing_project: &[DbStakeholder],
    global: &[DbStakeholder],
) -> ImportPlan {
    let local: HashSet<&str> = existing_project.iter().map(|s| s.id.as_str()).collect();
    let by_id: HashMap<&str, &DbStakeholder> = global.iter().map(|s| (s.id.as_str(), s)).collect();

    let mut entries = Vec::new();
    for id in dedupe_ids(selected_ids.iter().cloned()) {
        if local.contains(id.as_str()) {
            entries.push(ImportEntry::AlreadyLocal { id });
            continue;
        }
        let Some(source) = by_id.get(id.as_str()) else {
            log::warn!("Selected stakeholder '{}' not found in any pool; dropping it", id);
            entries.push(ImportEntry::Unknown { id });
            continue;
        };
        if source.project_id == project_id {
            entries.push(ImportEntry::AlreadyLocal { id });
            continue;
        }
        match find_by_normalized_name(existing_project, &source.name).first() {
            Some(local_match) => entries.push(ImportEntry::ReuseByName {
                global_id: id,
                local_id: local_match.id.clone(),
            }),
            None => entries.push(ImportEntry::Create {
                global_id: id,
                template: (*source).clone(),
            }),
        }
    }

    ImportPlan {
        project_id: project_id.to_string(),
        entries,
    }
}

/// Perform the creations a plan calls for. Any failure aborts with
/// `ImportFailure`; copies created before the failure stay in place and the
/// next run reuses them by name.
pub fn apply_import<R: StakeholderRegistry + ?Sized>(
    registry: &R,
    plan: &ImportPlan,
    enforce_unique: bool,
) -> Result<ImportOutcome, ServiceError> {
    let mut outcome = ImportOutcome::default();
    // Two selected globals may share a normalized name; create one copy.
    let mut created_by_name: HashMap<String, String> = HashMap::new();

    for entry in &plan.entries {
        match entry {
            ImportEntry::AlreadyLocal { .. } => {}
            ImportEntry::Unknown { id } => outcome.unknown_ids.push(id.clone()),
            ImportEntry::ReuseByName {
                global_id,
                local_id,
            } => {
                outcome.remap.insert(global_id.clone(), local_id.clone());
            }
            ImportEntry::Create {
                global_id,
                template,
            } => {
                let key = normalize_name(&template.name);
                if let Some(local_id) = created_by_name.get(&key) {
                    outcome.remap.insert(global_id.clone(), local_id.clone());
                    continue;
                }
                let copy = NewStakeholder {
                    project_id: plan.project_id.clone(),
                    name: template.name.clone(),
                    company: template.company.clone(),
                    role: template.role.clone(),
                    contact_info: None,
                    identity_type: template.identity_type.clone(),
                };
                let created = create_stakeholder(registry, copy, enforce_unique).map_err(|e| {
                    ServiceError::ImportFailure {
                        stakeholder: template.name.clone(),
                        reason: e.to_string(),
                    }
                })?;
                log::info!(
                    "Imported stakeholder '{}' into project {} ({} -> {})",
                    created.name,
                    plan.project_id,
                    global_id,
                    created.id
                );
                created_by_name.insert(key, created.id.clone());
                outcome.remap.insert(global_id.clone(), created.id.clone());
                outcome.created_ids.push(created.id);
            }
        }
    }
    Ok(outcome)
}

/// Plan against the registry's current state, then apply. Running it again
/// with the same selection creates nothing.
pub fn import_missing<R: StakeholderRegistry + ?Sized>(
    registry: &R,
    project_id: &str,
    selected_ids: &[String],
    enforce_unique: bool,
) -> Result<ImportOutcome, ServiceError> {
    let existing = registry.list_for_project(project_id, true)?;
    let global = registry.list_global(true)?;
    let plan = plan_import(project_id, selected_ids, &existing, &global);
    apply_import(registry, &plan, enforce_unique)
}

/// Plan only, reading the pools from the registry.
pub fn preview_import<R: StakeholderRegistry + ?Sized>(
    registry: &R,
    project_id: &str,
    selected_ids: &[String],
) -> Result<ImportPlan, ServiceError> {
    let existing = registry.list_for_project(project_id, true)?;
    let global = registry.list_global(true)?;
    Ok(plan_import(project_id, selected_ids, &existing, &global))
}

// =============================================================================
// Deduplication
// =============================================================================

/// Collapse every stakeholder whose normalized name matches `name` into the
/// earliest-created one, re-pointing all references first. Scoped to one
/// project when `project_id` is given, platform-wide otherwise.
pub fn deduplicate_by_name(
    db: &StoryDb,
    name: &str,
    project_id: Option<&str>,
) -> Result<DedupReport, ServiceError> {
    let normalized_name = normalize_name(name);
    if normalized_name.is_empty() {
        return Err(validation("name is required".to_string()));
    }

    let pool = match project_id {
        Some(project_id) => db.get_project_stakeholders(project_id, true)?,
        None => db.get_all_stakeholders(true)?,
    };
    let mut matches: Vec<&DbStakeholder> = find_by_normalized_name(&pool, name);
    matches.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

    let Some((kept, rest)) = matches.split_first() else {
        return Ok(DedupReport {
            normalized_name,
            kept_id: None,
            removed_ids: Vec::new(),
            removed_count: 0,
        });
    };

    let removed_ids: Vec<String> = rest.iter().map(|s| s.id.clone()).collect();
    let removed_count = if removed_ids.is_empty() {
        0
    } else {
        db.merge_stakeholders(&kept.id, &removed_ids)?
    };
    if removed_count > 0 {
        log::info!(
            "Deduplicated '{}': kept {}, removed {:?}",
            kept.name,
            kept.id,
            removed_ids
        );
    }

    Ok(DedupReport {
        normalized_name,
        kept_id: Some(kept.id.clone()),
        removed_ids,
        removed_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::{sample_stakeholder, test_db};
    use crate::db::DbError;

    fn new_stakeholder(project_id: &str, name: &str) -> NewStakeholder {
        NewStakeholder {
            project_id: project_id.to_string(),
            name: name.to_string(),
            role: "sponsor".to_string(),
            ..Default::default()
        }
    }

    fn ids(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    fn stakeholder_at(id: &str, project_id: &str, name: &str, created_at: &str) -> DbStakeholder {
        let mut s = sample_stakeholder(id, project_id, name);
        s.created_at = created_at.to_string();
        s
    }

    #[test]
    fn test_create_enforces_unique_name_per_project() {
        let db = test_db();
        create_stakeholder(&db, new_stakeholder("p1", "王纪虎"), true).expect("first");
        let err =
            create_stakeholder(&db, new_stakeholder("p1", "王\u{3000}纪虎"), true).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        // Another project may hold the same person.
        create_stakeholder(&db, new_stakeholder("p2", "王纪虎"), true).expect("other project");
        // Enforcement off allows legacy-style duplicates.
        create_stakeholder(&db, new_stakeholder("p1", "王 纪虎"), false).expect("unenforced");
    }

    #[test]
    fn test_create_validates_fields() {
        let db = test_db();
        assert!(create_stakeholder(&db, new_stakeholder("p1", "   "), true).is_err());
        assert!(create_stakeholder(&db, new_stakeholder("", "Ada"), true).is_err());
        let created = create_stakeholder(&db, new_stakeholder("p1", "  Ada  "), true).expect("ok");
        assert_eq!(created.name, "Ada");
        assert!(!created.is_resigned);
    }

    #[test]
    fn test_rename_rechecks_uniqueness_but_allows_self() {
        let db = test_db();
        let ada = create_stakeholder(&db, new_stakeholder("p1", "Ada"), true).unwrap();
        create_stakeholder(&db, new_stakeholder("p1", "Grace"), true).unwrap();

        assert!(rename_stakeholder(&db, &ada.id, "grace", true).is_err());
        let renamed = rename_stakeholder(&db, &ada.id, "ADA", true).expect("self rename");
        assert_eq!(renamed.name, "ADA");

        let err = rename_stakeholder(&db, "ghost", "Linus", true).unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { .. }));
    }

    #[test]
    fn test_role_and_company_edits() {
        let db = test_db();
        let ada = create_stakeholder(&db, new_stakeholder("p1", "Ada"), true).unwrap();
        set_stakeholder_role(&db, &ada.id, "engineer").unwrap();
        set_stakeholder_company(&db, &ada.id, Some("Analytical Engines")).unwrap();
        let stored = db.get_stakeholder(&ada.id).unwrap().unwrap();
        assert_eq!(stored.role, "engineer");
        assert_eq!(stored.company.as_deref(), Some("Analytical Engines"));

        set_stakeholder_company(&db, &ada.id, None).unwrap();
        assert_eq!(db.get_stakeholder(&ada.id).unwrap().unwrap().company, None);
    }

    #[test]
    fn test_selectable_hides_resigned_unless_kept() {
        let db = test_db();
        let ada = create_stakeholder(&db, new_stakeholder("p1", "Ada"), true).unwrap();
        let grace = create_stakeholder(&db, new_stakeholder("p1", "Grace"), true).unwrap();
        resign_stakeholder(&db, &grace.id).unwrap();

        let fresh = list_selectable(&db, Some("p1"), &[]).unwrap();
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].id, ada.id);

        let editing = list_selectable(&db, Some("p1"), &[grace.id.clone()]).unwrap();
        assert_eq!(editing.len(), 2);

        reinstate_stakeholder(&db, &grace.id).unwrap();
        assert_eq!(list_selectable(&db, None, &[]).unwrap().len(), 2);
        assert!(resign_stakeholder(&db, "ghost").is_err());
    }

    #[test]
    fn test_plan_import_classifies_entries() {
        let existing = vec![
            stakeholder_at("l1", "p1", "Ada", "2024-01-01"),
            stakeholder_at("l2", "p1", "Grace Hopper", "2024-01-01"),
        ];
        let global = vec![
            existing[0].clone(),
            existing[1].clone(),
            stakeholder_at("g1", "p2", "grace  hopper", "2024-01-01"),
            stakeholder_at("g2", "p2", "Linus", "2024-01-01"),
        ];
        let plan = plan_import("p1", &ids(&["l1", "g1", "g2", "zz", "g2"]), &existing, &global);
        assert_eq!(
            plan.entries,
            vec![
                ImportEntry::AlreadyLocal { id: "l1".to_string() },
                ImportEntry::ReuseByName {
                    global_id: "g1".to_string(),
                    local_id: "l2".to_string()
                },
                ImportEntry::Create {
                    global_id: "g2".to_string(),
                    template: global[3].clone()
                },
                ImportEntry::Unknown { id: "zz".to_string() },
            ]
        );
        assert_eq!(plan.creations(), 1);
    }

    #[test]
    fn test_import_missing_is_idempotent() {
        let db = test_db();
        let remote = create_stakeholder(&db, new_stakeholder("p2", "Linus"), true).unwrap();
        let local = create_stakeholder(&db, new_stakeholder("p1", "Ada"), true).unwrap();
        let selected = vec![local.id.clone(), remote.id.clone()];

        let first = import_missing(&db, "p1", &selected, true).expect("first import");
        assert_eq!(first.created_ids.len(), 1);
        let copy_id = first.remap.get(&remote.id).cloned().expect("remapped");
        let copy = db.get_stakeholder(&copy_id).unwrap().unwrap();
        assert_eq!(copy.project_id, "p1");
        assert_eq!(copy.name, "Linus");
        assert_eq!(copy.role, "sponsor");
        assert_eq!(first.remap_selection(&selected), vec![local.id.clone(), copy_id.clone()]);

        let second = import_missing(&db, "p1", &selected, true).expect("second import");
        assert!(second.created_ids.is_empty(), "second run must create nothing");
        assert_eq!(second.remap.get(&remote.id), Some(&copy_id));
        assert_eq!(db.get_project_stakeholders("p1", true).unwrap().len(), 2);
    }

    #[test]
    fn test_apply_creates_one_copy_per_name() {
        let db = test_db();
        db.insert_stakeholder(&stakeholder_at("g1", "p2", "Linus", "2024-01-01")).unwrap();
        db.insert_stakeholder(&stakeholder_at("g2", "p3", "linus", "2024-01-02")).unwrap();

        let outcome = import_missing(&db, "p1", &ids(&["g1", "g2"]), true).expect("import");
        assert_eq!(outcome.created_ids.len(), 1);
        assert_eq!(outcome.remap.get("g1"), outcome.remap.get("g2"));
        assert_eq!(outcome.remap_selection(&ids(&["g1", "g2"])).len(), 1);
    }

    struct FailingRegistry {
        inner: StoryDb,
    }

    impl StakeholderRegistry for FailingRegistry {
        fn list_for_project(
            &self,
            project_id: &str,
            include_resigned: bool,
        ) -> Result<Vec<DbStakeholder>, ServiceError> {
            self.inner.list_for_project(project_id, include_resigned)
        }
        fn list_global(&self, include_resigned: bool) -> Result<Vec<DbStakeholder>, ServiceError> {
            self.inner.list_global(include_resigned)
        }
        fn get(&self, id: &str) -> Result<Option<DbStakeholder>, ServiceError> {
            StakeholderRegistry::get(&self.inner, id)
        }
        fn create(&self, _stakeholder: &DbStakeholder) -> Result<(), ServiceError> {
            Err(ServiceError::Storage(DbError::NotOpen))
        }
        fn update(&self, stakeholder: &DbStakeholder) -> Result<bool, ServiceError> {
            self.inner.update(stakeholder)
        }
        fn set_resigned(&self, id: &str, resigned: bool) -> Result<bool, ServiceError> {
            self.inner.set_resigned(id, resigned)
        }
    }

    #[test]
    fn test_apply_failure_surfaces_import_failure() {
        let db = test_db();
        db.insert_stakeholder(&stakeholder_at("g1", "p2", "Linus", "2024-01-01")).unwrap();
        let registry = FailingRegistry { inner: db };

        let err = import_missing(&registry, "p1", &ids(&["g1"]), true).unwrap_err();
        match &err {
            ServiceError::ImportFailure { stakeholder, .. } => assert_eq!(stakeholder, "Linus"),
            other => panic!("expected ImportFailure, got {other:?}"),
        }
        assert!(err.blocks_save());
    }

    #[test]
    fn test_dedupe_whitespace_variants_merge_same_rows() {
        let db = test_db();
        for (id, name, created_at) in [
            ("a", "王纪虎", "2024-01-01T00:00:00+00:00"),
            ("b", "  王 纪虎", "2024-02-01T00:00:00+00:00"),
            ("c", "王\u{00A0}纪虎", "2024-03-01T00:00:00+00:00"),
            ("d", "王纪", "2024-01-01T00:00:00+00:00"),
        ] {
            db.insert_stakeholder(&stakeholder_at(id, "p1", name, created_at)).unwrap();
        }

        // Both spellings select the same rows.
        let pool = db.get_all_stakeholders(true).unwrap();
        let spaced: Vec<&str> = find_by_normalized_name(&pool, "  王 纪虎")
            .into_iter()
            .map(|s| s.id.as_str())
            .collect();
        let plain: Vec<&str> = find_by_normalized_name(&pool, "王纪虎")
            .into_iter()
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(spaced, plain);

        let report = deduplicate_by_name(&db, "  王 纪虎", None).expect("dedupe");
        assert_eq!(report.kept_id.as_deref(), Some("a"));
        assert_eq!(report.removed_ids, ids(&["b", "c"]));
        assert_eq!(report.removed_count, 2);

        let again = deduplicate_by_name(&db, "王纪虎", None).expect("dedupe again");
        assert_eq!(again.kept_id.as_deref(), Some("a"));
        assert_eq!(again.removed_count, 0);
        assert!(db.get_stakeholder("d").unwrap().is_some());
    }

    #[test]
    fn test_dedupe_repoints_story_references() {
        let db = test_db();
        crate::db::test_utils::seed_project(&db, "p1", "sp1");
        let first = stakeholder_at("a", "p1", "Ada", "2024-01-01T00:00:00+00:00");
        let second = stakeholder_at("b", "p1", "ada", "2024-02-01T00:00:00+00:00");
        db.insert_stakeholder(&first).unwrap();
        db.insert_stakeholder(&second).unwrap();
        let now = now_rfc3339();
        db.upsert_story(&crate::db::DbStory {
            id: "st1".to_string(),
            subproject_id: "sp1".to_string(),
            story_name: "Kickoff".to_string(),
            time: "2024-03-01".to_string(),
            stakeholder_ids: ids(&["b"]),
            content: String::new(),
            created_at: now.clone(),
            updated_at: now,
        })
        .unwrap();

        let report = deduplicate_by_name(&db, "ADA", Some("p1")).expect("dedupe");
        assert_eq!(report.removed_ids, ids(&["b"]));
        assert_eq!(db.get_story("st1").unwrap().unwrap().stakeholder_ids, ids(&["a"]));
    }

    #[test]
    fn test_dedupe_rejects_blank_and_reports_no_match() {
        let db = test_db();
        assert!(matches!(
            deduplicate_by_name(&db, " \u{3000} ", None),
            Err(ServiceError::Validation(_))
        ));
        let report = deduplicate_by_name(&db, "Nobody", None).expect("no match");
        assert_eq!(report.kept_id, None);
        assert_eq!(report.removed_count, 0);
    }
}
