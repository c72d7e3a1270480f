use super::*;

impl StoryDb {
    // =========================================================================
    // Projects and sub-projects
    // =========================================================================

    fn map_project_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbProject> {
        Ok(DbProject {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }

    fn map_subproject_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbSubproject> {
        Ok(DbSubproject {
            id: row.get(0)?,
            project_id: row.get(1)?,
            name: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }

    /// Insert or update a project.
    pub fn upsert_project(&self, project: &DbProject) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO projects (id, name, description, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                updated_at = excluded.updated_at",
            params![
                project.id,
                project.name,
                project.description,
                project.created_at,
                project.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Get a project by ID.
    pub fn get_project(&self, id: &str) -> Result<Option<DbProject>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, description, created_at, updated_at
             FROM projects WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map(params![id], Self::map_project_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Get all projects, ordered by name.
    pub fn get_all_projects(&self) -> Result<Vec<DbProject>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, description, created_at, updated_at
             FROM projects ORDER BY name",
        )?;
        let rows = stmt.query_map([], Self::map_project_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Insert or update a sub-project.
    pub fn upsert_subproject(&self, subproject: &DbSubproject) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO subprojects (id, project_id, name, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                updated_at = excluded.updated_at",
            params![
                subproject.id,
                subproject.project_id,
                subproject.name,
                subproject.created_at,
                subproject.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Get a sub-project by ID.
    pub fn get_subproject(&self, id: &str) -> Result<Option<DbSubproject>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, project_id, name, created_at, updated_at
             FROM subprojects WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map(params![id], Self::map_subproject_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Get the sub-projects of a project, ordered by name.
    pub fn get_subprojects_for_project(
        &self,
        project_id: &str,
    ) -> Result<Vec<DbSubproject>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, project_id, name, created_at, updated_at
             FROM subprojects WHERE project_id = ?1 ORDER BY name",
        )?;
        let rows = stmt.query_map(params![project_id], Self::map_subproject_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}
