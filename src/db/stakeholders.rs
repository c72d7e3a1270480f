use super::*;

/// Junction tables holding stakeholder references.
const REFERENCE_TABLES: &[&str] =
    &["story_stakeholders", "storyline_stakeholders", "follow_up_contacts"];

impl StoryDb {
    // =========================================================================
    // Stakeholders
    // =========================================================================

    /// Insert a new stakeholder row. Fails if the id is already taken.
    pub fn insert_stakeholder(&self, s: &DbStakeholder) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO stakeholders (
                id, project_id, name, company, role, contact_info,
                identity_type, is_resigned, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                s.id,
                s.project_id,
                s.name,
                s.company,
                s.role,
                s.contact_info,
                s.identity_type,
                s.is_resigned as i32,
                s.created_at,
                s.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Overwrite the editable columns of a stakeholder. Returns false when no
    /// row has this id.
    pub fn update_stakeholder(&self, s: &DbStakeholder) -> Result<bool, DbError> {
        let changed = self.conn.execute(
            "UPDATE stakeholders SET
                name = ?2, company = ?3, role = ?4, contact_info = ?5,
                identity_type = ?6, is_resigned = ?7, updated_at = ?8
             WHERE id = ?1",
            params![
                s.id,
                s.name,
                s.company,
                s.role,
                s.contact_info,
                s.identity_type,
                s.is_resigned as i32,
                s.updated_at,
            ],
        )?;
        Ok(changed > 0)
    }

    /// Get a stakeholder by ID, resigned or not.
    pub fn get_stakeholder(&self, id: &str) -> Result<Option<DbStakeholder>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, project_id, name, company, role, contact_info,
                    identity_type, is_resigned, created_at, updated_at
             FROM stakeholders WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map(params![id], Self::map_stakeholder_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Fetch every stakeholder whose id is in `ids`, across all projects.
    /// Missing ids are simply absent from the result.
    pub fn get_stakeholders_by_ids(&self, ids: &[String]) -> Result<Vec<DbStakeholder>, DbError> {
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(s) = self.get_stakeholder(id)? {
                found.push(s);
            }
        }
        Ok(found)
    }

    /// Stakeholders scoped to one project, oldest first.
    pub fn get_project_stakeholders(
        &self,
        project_id: &str,
        include_resigned: bool,
    ) -> Result<Vec<DbStakeholder>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, project_id, name, company, role, contact_info,
                    identity_type, is_resigned, created_at, updated_at
             FROM stakeholders
             WHERE project_id = ?1 AND (?2 = 1 OR is_resigned = 0)
             ORDER BY created_at, id",
        )?;
        let rows = stmt.query_map(
            params![project_id, include_resigned as i32],
            Self::map_stakeholder_row,
        )?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// The platform-wide stakeholder pool, oldest first.
    pub fn get_all_stakeholders(
        &self,
        include_resigned: bool,
    ) -> Result<Vec<DbStakeholder>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, project_id, name, company, role, contact_info,
                    identity_type, is_resigned, created_at, updated_at
             FROM stakeholders
             WHERE ?1 = 1 OR is_resigned = 0
             ORDER BY created_at, id",
        )?;
        let rows = stmt.query_map(params![include_resigned as i32], Self::map_stakeholder_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Flip the soft-delete flag. Returns false when no row has this id.
    pub fn set_stakeholder_resigned(&self, id: &str, resigned: bool) -> Result<bool, DbError> {
        let changed = self.conn.execute(
            "UPDATE stakeholders SET is_resigned = ?1, updated_at = ?2 WHERE id = ?3",
            params![resigned as i32, now_rfc3339(), id],
        )?;
        Ok(changed > 0)
    }

    /// Hard-delete a stakeholder row. References held by stories, storylines
    /// and follow-up records are left in place and stop resolving.
    pub fn delete_stakeholder(&self, id: &str) -> Result<bool, DbError> {
        let changed = self
            .conn
            .execute("DELETE FROM stakeholders WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    /// Collapse `remove_ids` into `keep_id`: every reference is re-pointed to
    /// the kept row, then the removed rows are deleted. One transaction.
    ///
    /// A list that already referenced `keep_id` keeps its original position
    /// for it and drops the duplicate reference.
    pub fn merge_stakeholders(
        &self,
        keep_id: &str,
        remove_ids: &[String],
    ) -> Result<usize, DbError> {
        self.with_transaction(|tx| {
            let mut removed = 0;
            for remove_id in remove_ids.iter().filter(|id| id.as_str() != keep_id) {
                for table in REFERENCE_TABLES {
                    tx.conn.execute(
                        &format!(
                            "UPDATE OR IGNORE {table} SET stakeholder_id = ?1 \
                             WHERE stakeholder_id = ?2"
                        ),
                        params![keep_id, remove_id],
                    )?;
                    tx.conn.execute(
                        &format!("DELETE FROM {table} WHERE stakeholder_id = ?1"),
                        params![remove_id],
                    )?;
                }
                removed += tx
                    .conn
                    .execute("DELETE FROM stakeholders WHERE id = ?1", params![remove_id])?;
            }
            Ok(removed)
        })
    }

    fn map_stakeholder_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbStakeholder> {
        Ok(DbStakeholder {
            id: row.get(0)?,
            project_id: row.get(1)?,
            name: row.get(2)?,
            company: row.get(3)?,
            role: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
            contact_info: row.get(5)?,
            identity_type: row.get(6)?,
            is_resigned: row.get::<_, i32>(7).unwrap_or(0) != 0,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }
}
