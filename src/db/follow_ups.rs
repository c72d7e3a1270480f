use super::*;

const FOLLOW_UP_COLUMNS: &str = "id, parent_kind, parent_id, content, follow_up_type, contact_note,
    contact_method, result, next_action, event_date, action_date, completed_at,
    created_at, updated_at";

/// Recency order shared by every list of follow-up records.
///
/// `updated_at` is written with the local offset, so its date prefix is the
/// same local day `event_date` holds. On a shared day an edited record sorts
/// ahead of one that only carries that event date.
const RECENCY_ORDER: &str =
    "COALESCE(updated_at, NULLIF(event_date, ''), created_at) DESC, created_at DESC, id DESC";

impl StoryDb {
    // =========================================================================
    // Follow-up records
    // =========================================================================

    /// Insert a follow-up record with its contact ids. When the parent is a
    /// storyline, its `next_follow_up` cache is refreshed in the same transaction.
    pub fn insert_follow_up(&self, record: &DbFollowUp) -> Result<(), DbError> {
        self.with_transaction(|tx| {
            tx.conn.execute(
                "INSERT INTO follow_up_records (
                    id, parent_kind, parent_id, content, follow_up_type, contact_note,
                    contact_method, result, next_action, event_date, action_date,
                    completed_at, created_at, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    record.id,
                    record.parent_kind.as_str(),
                    record.parent_id,
                    record.content,
                    record.follow_up_type,
                    record.contact_note,
                    record.contact_method,
                    record.result,
                    record.next_action,
                    record.event_date,
                    record.action_date,
                    record.completed_at,
                    record.created_at,
                    record.updated_at,
                ],
            )?;
            tx.replace_ordered_ids(
                "follow_up_contacts",
                "record_id",
                &record.id,
                &record.contact_ids,
            )?;
            tx.refresh_parent_cache(record.parent_kind, &record.parent_id)
        })
    }

    /// Overwrite a follow-up record in place (last writer wins). Returns false
    /// when no record has this id.
    pub fn update_follow_up(&self, record: &DbFollowUp) -> Result<bool, DbError> {
        self.with_transaction(|tx| {
            let changed = tx.conn.execute(
                "UPDATE follow_up_records SET
                    content = ?2, follow_up_type = ?3, contact_note = ?4, contact_method = ?5,
                    result = ?6, next_action = ?7, event_date = ?8, action_date = ?9,
                    completed_at = ?10, updated_at = ?11
                 WHERE id = ?1",
                params![
                    record.id,
                    record.content,
                    record.follow_up_type,
                    record.contact_note,
                    record.contact_method,
                    record.result,
                    record.next_action,
                    record.event_date,
                    record.action_date,
                    record.completed_at,
                    record.updated_at,
                ],
            )?;
            if changed == 0 {
                return Ok(false);
            }
            tx.replace_ordered_ids(
                "follow_up_contacts",
                "record_id",
                &record.id,
                &record.contact_ids,
            )?;
            tx.refresh_parent_cache(record.parent_kind, &record.parent_id)?;
            Ok(true)
        })
    }

    /// Get a single follow-up record by ID.
    pub fn get_follow_up(&self, id: &str) -> Result<Option<DbFollowUp>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {FOLLOW_UP_COLUMNS} FROM follow_up_records WHERE id = ?1"
        ))?;
        let mut rows = stmt.query_map(params![id], Self::map_follow_up_row)?;
        let record = match rows.next() {
            Some(row) => row?,
            None => return Ok(None),
        };
        Ok(Some(self.with_contacts(record)?))
    }

    /// Follow-up records of one story or storyline, most recent first.
    pub fn get_follow_ups_for_parent(
        &self,
        parent_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<DbFollowUp>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {FOLLOW_UP_COLUMNS} FROM follow_up_records
             WHERE parent_id = ?1
             ORDER BY {RECENCY_ORDER}
             LIMIT ?2 OFFSET ?3"
        ))?;
        let rows = stmt.query_map(params![parent_id, limit, offset], Self::map_follow_up_row)?;
        let records = rows.collect::<Result<Vec<_>, _>>()?;
        records.into_iter().map(|r| self.with_contacts(r)).collect()
    }

    /// Count the follow-up records of a parent.
    pub fn count_follow_ups_for_parent(&self, parent_id: &str) -> Result<i64, DbError> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM follow_up_records WHERE parent_id = ?1",
            params![parent_id],
            |row| row.get(0),
        )?)
    }

    /// Open records anywhere under a project (its storylines and the stories
    /// of its sub-projects) whose action date is before `today`. Soonest first.
    pub fn get_overdue_follow_ups_for_project(
        &self,
        project_id: &str,
        today: &str,
    ) -> Result<Vec<DbFollowUp>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {FOLLOW_UP_COLUMNS} FROM follow_up_records
             WHERE completed_at IS NULL
               AND action_date IS NOT NULL
               AND action_date < ?2
               AND (
                 (parent_kind = 'storyline'
                  AND parent_id IN (SELECT id FROM storylines WHERE project_id = ?1))
                 OR (parent_kind = 'story'
                  AND parent_id IN (
                    SELECT s.id FROM stories s
                    JOIN subprojects sp ON sp.id = s.subproject_id
                    WHERE sp.project_id = ?1))
               )
             ORDER BY action_date ASC, created_at ASC"
        ))?;
        let rows = stmt.query_map(params![project_id, today], Self::map_follow_up_row)?;
        let records = rows.collect::<Result<Vec<_>, _>>()?;
        records.into_iter().map(|r| self.with_contacts(r)).collect()
    }

    /// Action date of the most recent open record of a parent that has one.
    pub fn latest_open_action_date(&self, parent_id: &str) -> Result<Option<String>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT action_date FROM follow_up_records
             WHERE parent_id = ?1 AND completed_at IS NULL AND action_date IS NOT NULL
             ORDER BY {RECENCY_ORDER}
             LIMIT 1"
        ))?;
        let mut rows = stmt.query_map(params![parent_id], |row| row.get::<_, String>(0))?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Hard-delete a follow-up record. Returns false when it did not exist.
    pub fn delete_follow_up(&self, id: &str) -> Result<bool, DbError> {
        let existing = match self.get_follow_up(id)? {
            Some(r) => r,
            None => return Ok(false),
        };
        self.with_transaction(|tx| {
            tx.conn
                .execute("DELETE FROM follow_up_contacts WHERE record_id = ?1", params![id])?;
            tx.conn
                .execute("DELETE FROM follow_up_records WHERE id = ?1", params![id])?;
            tx.refresh_parent_cache(existing.parent_kind, &existing.parent_id)?;
            Ok(true)
        })
    }

    /// Remove every record owned by a parent. Runs inside the caller's transaction.
    pub(crate) fn delete_follow_ups_for_parent(
        &self,
        kind: ParentKind,
        parent_id: &str,
    ) -> Result<usize, DbError> {
        self.conn.execute(
            "DELETE FROM follow_up_contacts WHERE record_id IN (
                SELECT id FROM follow_up_records WHERE parent_kind = ?1 AND parent_id = ?2)",
            params![kind.as_str(), parent_id],
        )?;
        let removed = self.conn.execute(
            "DELETE FROM follow_up_records WHERE parent_kind = ?1 AND parent_id = ?2",
            params![kind.as_str(), parent_id],
        )?;
        Ok(removed)
    }

    /// Recompute a storyline's `next_follow_up` from its records. Stories
    /// carry no cache, so this is a no-op for them.
    pub(crate) fn refresh_parent_cache(
        &self,
        kind: ParentKind,
        parent_id: &str,
    ) -> Result<(), DbError> {
        if kind != ParentKind::Storyline {
            return Ok(());
        }
        let next = self.latest_open_action_date(parent_id)?;
        self.set_storyline_next_follow_up(parent_id, next.as_deref())
    }

    fn with_contacts(&self, mut record: DbFollowUp) -> Result<DbFollowUp, DbError> {
        record.contact_ids = self.load_ordered_ids("follow_up_contacts", "record_id", &record.id)?;
        Ok(record)
    }

    fn map_follow_up_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbFollowUp> {
        let kind: String = row.get(1)?;
        Ok(DbFollowUp {
            id: row.get(0)?,
            parent_kind: ParentKind::from_str_lossy(&kind),
            parent_id: row.get(2)?,
            content: row.get(3)?,
            follow_up_type: row.get(4)?,
            contact_ids: Vec::new(),
            contact_note: row.get(5)?,
            contact_method: row.get(6)?,
            result: row.get(7)?,
            next_action: row.get(8)?,
            event_date: row.get(9)?,
            action_date: row.get(10)?,
            completed_at: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }
}
