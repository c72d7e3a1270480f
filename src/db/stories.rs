use super::*;

impl StoryDb {
    // =========================================================================
    // Stories (per sub-project)
    // =========================================================================

    /// Insert or update a story and replace its stakeholder references.
    pub fn upsert_story(&self, story: &DbStory) -> Result<(), DbError> {
        self.with_transaction(|tx| {
            tx.conn.execute(
                "INSERT INTO stories
                    (id, subproject_id, story_name, time, content, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                    story_name = excluded.story_name,
                    time = excluded.time,
                    content = excluded.content,
                    updated_at = excluded.updated_at",
                params![
                    story.id,
                    story.subproject_id,
                    story.story_name,
                    story.time,
                    story.content,
                    story.created_at,
                    story.updated_at,
                ],
            )?;
            tx.replace_ordered_ids(
                "story_stakeholders",
                "story_id",
                &story.id,
                &story.stakeholder_ids,
            )
        })
    }

    /// Get a story by ID.
    pub fn get_story(&self, id: &str) -> Result<Option<DbStory>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, subproject_id, story_name, time, content, created_at, updated_at
             FROM stories WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map(params![id], Self::map_story_row)?;
        let story = match rows.next() {
            Some(row) => row?,
            None => return Ok(None),
        };
        Ok(Some(self.with_story_stakeholders(story)?))
    }

    /// Stories of a sub-project, newest story date first.
    pub fn get_stories_for_subproject(&self, subproject_id: &str) -> Result<Vec<DbStory>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, subproject_id, story_name, time, content, created_at, updated_at
             FROM stories WHERE subproject_id = ?1
             ORDER BY time DESC, created_at DESC",
        )?;
        let rows = stmt.query_map(params![subproject_id], Self::map_story_row)?;
        let stories = rows.collect::<Result<Vec<_>, _>>()?;
        stories
            .into_iter()
            .map(|s| self.with_story_stakeholders(s))
            .collect()
    }

    /// Delete a story together with its follow-up records. Returns false when
    /// the story does not exist.
    pub fn delete_story(&self, id: &str) -> Result<bool, DbError> {
        self.with_transaction(|tx| {
            tx.delete_follow_ups_for_parent(ParentKind::Story, id)?;
            let changed = tx.conn.execute("DELETE FROM stories WHERE id = ?1", params![id])?;
            Ok(changed > 0)
        })
    }

    fn with_story_stakeholders(&self, mut story: DbStory) -> Result<DbStory, DbError> {
        story.stakeholder_ids = self.load_ordered_ids("story_stakeholders", "story_id", &story.id)?;
        Ok(story)
    }

    fn map_story_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbStory> {
        Ok(DbStory {
            id: row.get(0)?,
            subproject_id: row.get(1)?,
            story_name: row.get(2)?,
            time: row.get(3)?,
            stakeholder_ids: Vec::new(),
            content: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    // =========================================================================
    // Storylines (per project)
    // =========================================================================

    /// Insert or update a storyline and replace its stakeholder references.
    ///
    /// `next_follow_up` is owned by the follow-up writers and is not touched here.
    pub fn upsert_storyline(&self, storyline: &DbStoryline) -> Result<(), DbError> {
        self.with_transaction(|tx| {
            tx.conn.execute(
                "INSERT INTO storylines (
                    id, project_id, title, content, event_time, next_follow_up,
                    expected_outcome, created_at, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    content = excluded.content,
                    event_time = excluded.event_time,
                    expected_outcome = excluded.expected_outcome,
                    updated_at = excluded.updated_at",
                params![
                    storyline.id,
                    storyline.project_id,
                    storyline.title,
                    storyline.content,
                    storyline.event_time,
                    storyline.next_follow_up,
                    storyline.expected_outcome,
                    storyline.created_at,
                    storyline.updated_at,
                ],
            )?;
            tx.replace_ordered_ids(
                "storyline_stakeholders",
                "storyline_id",
                &storyline.id,
                &storyline.stakeholder_ids,
            )
        })
    }

    /// Get a storyline by ID.
    pub fn get_storyline(&self, id: &str) -> Result<Option<DbStoryline>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, project_id, title, content, event_time, next_follow_up,
                    expected_outcome, created_at, updated_at
             FROM storylines WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map(params![id], Self::map_storyline_row)?;
        let storyline = match rows.next() {
            Some(row) => row?,
            None => return Ok(None),
        };
        Ok(Some(self.with_storyline_stakeholders(storyline)?))
    }

    /// Storylines of a project, newest event first.
    pub fn get_storylines_for_project(
        &self,
        project_id: &str,
    ) -> Result<Vec<DbStoryline>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, project_id, title, content, event_time, next_follow_up,
                    expected_outcome, created_at, updated_at
             FROM storylines WHERE project_id = ?1
             ORDER BY event_time DESC, created_at DESC",
        )?;
        let rows = stmt.query_map(params![project_id], Self::map_storyline_row)?;
        let storylines = rows.collect::<Result<Vec<_>, _>>()?;
        storylines
            .into_iter()
            .map(|s| self.with_storyline_stakeholders(s))
            .collect()
    }

    /// Write the cached next follow-up date of a storyline.
    pub fn set_storyline_next_follow_up(
        &self,
        id: &str,
        next_follow_up: Option<&str>,
    ) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE storylines SET next_follow_up = ?1 WHERE id = ?2",
            params![next_follow_up, id],
        )?;
        Ok(())
    }

    /// Delete a storyline together with its follow-up records.
    pub fn delete_storyline(&self, id: &str) -> Result<bool, DbError> {
        self.with_transaction(|tx| {
            tx.delete_follow_ups_for_parent(ParentKind::Storyline, id)?;
            let changed = tx
                .conn
                .execute("DELETE FROM storylines WHERE id = ?1", params![id])?;
            Ok(changed > 0)
        })
    }

    fn with_storyline_stakeholders(
        &self,
        mut storyline: DbStoryline,
    ) -> Result<DbStoryline, DbError> {
        storyline.stakeholder_ids =
            self.load_ordered_ids("storyline_stakeholders", "storyline_id", &storyline.id)?;
        Ok(storyline)
    }

    fn map_storyline_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbStoryline> {
        Ok(DbStoryline {
            id: row.get(0)?,
            project_id: row.get(1)?,
            title: row.get(2)?,
            content: row.get(3)?,
            event_time: row.get(4)?,
            stakeholder_ids: Vec::new(),
            next_follow_up: row.get(5)?,
            expected_outcome: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }
}
