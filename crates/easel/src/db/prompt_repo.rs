//! Prompt repository — CRUD operations for the `prompts` table.

use rusqlite::{params, Row};

use crate::review::status::PromptStatus;

use super::{Database, DatabaseError};

/// A prompt row. Review fields stay `None` until a teacher acts on it;
/// `generated_image_id` is set once generation produced an image.
#[derive(Debug, Clone)]
pub struct PromptRow {
    pub id: String,
    pub content: String,
    pub student_id: String,
    pub status: PromptStatus,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<String>,
    pub rejection_reason: Option<String>,
    pub generated_image_id: Option<String>,
    pub created_at: String,
}

impl PromptRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            content: row.get("content")?,
            student_id: row.get("student_id")?,
            status: row.get("status")?,
            reviewed_by: row.get("reviewed_by")?,
            reviewed_at: row.get("reviewed_at")?,
            rejection_reason: row.get("rejection_reason")?,
            generated_image_id: row.get("generated_image_id")?,
            created_at: row.get("created_at")?,
        })
    }
}

pub fn insert(db: &Database, prompt: &PromptRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO prompts (id, content, student_id, status, reviewed_by, reviewed_at,
             rejection_reason, generated_image_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                prompt.id,
                prompt.content,
                prompt.student_id,
                prompt.status,
                prompt.reviewed_by,
                prompt.reviewed_at,
                prompt.rejection_reason,
                prompt.generated_image_id,
                prompt.created_at,
            ],
        )?;
        Ok(())
    })
}

pub fn find_by_id(db: &Database, id: &str) -> Result<Option<PromptRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM prompts WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], PromptRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// The student's pending prompt, if any. The partial unique index
/// guarantees there is at most one.
pub fn pending_for_student(
    db: &Database,
    student_id: &str,
) -> Result<Option<PromptRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM prompts WHERE student_id = ?1 AND status = 'pending'")?;
        let mut rows = stmt.query_map(params![student_id], PromptRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Pending prompts oldest-first (submission order, the fairness ordering
/// teachers review in). `student_ids` scopes the listing to a teacher's
/// students; `None` lists all (admin view).
pub fn list_pending(
    db: &Database,
    student_ids: Option<&[String]>,
) -> Result<Vec<PromptRow>, DatabaseError> {
    db.with_conn(|conn| {
        let (sql, bound): (String, Vec<&dyn rusqlite::types::ToSql>) = match student_ids {
            Some(ids) => {
                if ids.is_empty() {
                    return Ok(Vec::new());
                }
                let placeholders: Vec<String> =
                    (1..=ids.len()).map(|i| format!("?{}", i)).collect();
                let sql = format!(
                    "SELECT * FROM prompts WHERE status = 'pending' AND student_id IN ({})
                     ORDER BY created_at ASC, rowid ASC",
                    placeholders.join(", ")
                );
                let bound = ids.iter().map(|id| id as &dyn rusqlite::types::ToSql).collect();
                (sql, bound)
            }
            None => (
                "SELECT * FROM prompts WHERE status = 'pending' ORDER BY created_at ASC, rowid ASC"
                    .to_string(),
                Vec::new(),
            ),
        };

        let mut stmt = conn.prepare(&sql)?;
        let rows: Vec<PromptRow> = stmt
            .query_map(bound.as_slice(), PromptRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Fetches the given prompts, submission order preserved.
pub fn find_many(db: &Database, ids: &[String]) -> Result<Vec<PromptRow>, DatabaseError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    db.with_conn(|conn| {
        let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "SELECT * FROM prompts WHERE id IN ({}) ORDER BY created_at ASC, rowid ASC",
            placeholders.join(", ")
        );
        let bound: Vec<&dyn rusqlite::types::ToSql> =
            ids.iter().map(|id| id as &dyn rusqlite::types::ToSql).collect();
        let mut stmt = conn.prepare(&sql)?;
        let rows: Vec<PromptRow> = stmt
            .query_map(bound.as_slice(), PromptRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Records a review outcome: status plus reviewer, timestamp, and the
/// rejection reason when there is one.
pub fn update_review(
    db: &Database,
    id: &str,
    status: PromptStatus,
    reviewed_by: &str,
    reviewed_at: &str,
    rejection_reason: Option<&str>,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE prompts SET status = ?2, reviewed_by = ?3, reviewed_at = ?4,
             rejection_reason = ?5 WHERE id = ?1",
            params![id, status, reviewed_by, reviewed_at, rejection_reason],
        )?;
        Ok(())
    })
}

/// Updates only the status (the generation lifecycle transitions).
pub fn update_status(db: &Database, id: &str, status: PromptStatus) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE prompts SET status = ?2 WHERE id = ?1",
            params![id, status],
        )?;
        Ok(())
    })
}

/// Binds the generated image to its prompt.
pub fn link_generated_image(
    db: &Database,
    prompt_id: &str,
    image_id: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE prompts SET generated_image_id = ?2 WHERE id = ?1",
            params![prompt_id, image_id],
        )?;
        Ok(())
    })
}

pub fn count_by_status(db: &Database, status: PromptStatus) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM prompts WHERE status = ?1",
            params![status],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}
