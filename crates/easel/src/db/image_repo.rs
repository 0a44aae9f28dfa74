//! Image repository — CRUD operations for the `images` table.

use rusqlite::{params, Row};

use crate::review::status::{ImageStatus, SafetyLevel};

use super::{Database, DatabaseError};

/// A generated image awaiting (or past) teacher review.
#[derive(Debug, Clone)]
pub struct ImageRow {
    pub id: String,
    /// URL or storage-relative path, depending on `is_external_url`.
    pub path: String,
    pub is_external_url: bool,
    pub prompt_id: String,
    pub student_id: String,
    pub status: ImageStatus,
    pub safety_level: SafetyLevel,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<String>,
    pub rejection_reason: Option<String>,
    pub created_at: String,
}

impl ImageRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            path: row.get("path")?,
            is_external_url: row.get("is_external_url")?,
            prompt_id: row.get("prompt_id")?,
            student_id: row.get("student_id")?,
            status: row.get("status")?,
            safety_level: row.get("safety_level")?,
            reviewed_by: row.get("reviewed_by")?,
            reviewed_at: row.get("reviewed_at")?,
            rejection_reason: row.get("rejection_reason")?,
            created_at: row.get("created_at")?,
        })
    }

    /// URL the client should load: external URLs verbatim, local paths
    /// under the uploads mount.
    pub fn display_url(&self) -> String {
        if self.is_external_url {
            self.path.clone()
        } else if self.path.starts_with('/') {
            format!("/uploads{}", self.path)
        } else {
            format!("/uploads/{}", self.path)
        }
    }
}

pub fn insert(db: &Database, image: &ImageRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO images (id, path, is_external_url, prompt_id, student_id, status,
             safety_level, reviewed_by, reviewed_at, rejection_reason, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                image.id,
                image.path,
                image.is_external_url,
                image.prompt_id,
                image.student_id,
                image.status,
                image.safety_level,
                image.reviewed_by,
                image.reviewed_at,
                image.rejection_reason,
                image.created_at,
            ],
        )?;
        Ok(())
    })
}

pub fn find_by_id(db: &Database, id: &str) -> Result<Option<ImageRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM images WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], ImageRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Pending images oldest-first. `student_ids` scopes the listing to a
/// teacher's students; `None` lists all (admin view).
pub fn list_pending(
    db: &Database,
    student_ids: Option<&[String]>,
) -> Result<Vec<ImageRow>, DatabaseError> {
    db.with_conn(|conn| {
        let (sql, bound): (String, Vec<&dyn rusqlite::types::ToSql>) = match student_ids {
            Some(ids) => {
                if ids.is_empty() {
                    return Ok(Vec::new());
                }
                let placeholders: Vec<String> =
                    (1..=ids.len()).map(|i| format!("?{}", i)).collect();
                let sql = format!(
                    "SELECT * FROM images WHERE status = 'pending' AND student_id IN ({})
                     ORDER BY created_at ASC, rowid ASC",
                    placeholders.join(", ")
                );
                let bound = ids.iter().map(|id| id as &dyn rusqlite::types::ToSql).collect();
                (sql, bound)
            }
            None => (
                "SELECT * FROM images WHERE status = 'pending' ORDER BY created_at ASC, rowid ASC"
                    .to_string(),
                Vec::new(),
            ),
        };

        let mut stmt = conn.prepare(&sql)?;
        let rows: Vec<ImageRow> = stmt
            .query_map(bound.as_slice(), ImageRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Approved images for a student, newest first (the student gallery).
pub fn approved_for_student(
    db: &Database,
    student_id: &str,
) -> Result<Vec<ImageRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM images WHERE student_id = ?1 AND status = 'approved'
             ORDER BY created_at DESC",
        )?;
        let rows: Vec<ImageRow> = stmt
            .query_map(params![student_id], ImageRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Records a review outcome on an image.
pub fn update_review(
    db: &Database,
    id: &str,
    status: ImageStatus,
    reviewed_by: &str,
    reviewed_at: &str,
    rejection_reason: Option<&str>,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE images SET status = ?2, reviewed_by = ?3, reviewed_at = ?4,
             rejection_reason = ?5 WHERE id = ?1",
            params![id, status, reviewed_by, reviewed_at, rejection_reason],
        )?;
        Ok(())
    })
}

pub fn count_by_status(db: &Database, status: ImageStatus) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM images WHERE status = ?1",
            params![status],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::now_rfc3339;
    use crate::db::prompt_repo::{self, PromptRow};
    use crate::db::user_repo::{self, NewUser, Role};
    use crate::review::status::{PromptStatus, ReviewDecision};

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    fn seed_prompt(db: &Database, student_username: &str, prompt_id: &str) -> String {
        let student = user_repo::create(
            db,
            NewUser {
                username: student_username.to_string(),
                name: student_username.to_string(),
                role: Role::Student,
                classroom: None,
                teacher_id: None,
                initial_credits: 0,
            },
        )
        .unwrap();
        prompt_repo::insert(
            db,
            &PromptRow {
                id: prompt_id.to_string(),
                content: "a red bicycle".to_string(),
                student_id: student.id.clone(),
                status: PromptStatus::Processed,
                reviewed_by: None,
                reviewed_at: None,
                rejection_reason: None,
                generated_image_id: None,
                created_at: now_rfc3339(),
            },
        )
        .unwrap();
        student.id
    }

    /// Inserts a teacher with an explicit id so `reviewed_by` (a FK to
    /// `users`) is satisfied; `user_repo::create` allocates a random id.
    fn seed_reviewer(db: &Database, id: &str) {
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, name, role, credits, created_at)
                 VALUES (?1, ?1, ?1, 'teacher', 0, '2026-01-01T00:00:00Z')",
                [id],
            )?;
            Ok(())
        })
        .unwrap();
    }

    fn sample_image(id: &str, prompt_id: &str, student_id: &str, created_at: &str) -> ImageRow {
        ImageRow {
            id: id.to_string(),
            path: format!("https://example.com/{}.png", id),
            is_external_url: true,
            prompt_id: prompt_id.to_string(),
            student_id: student_id.to_string(),
            status: ImageStatus::Pending,
            safety_level: SafetyLevel::Safe,
            reviewed_by: None,
            reviewed_at: None,
            rejection_reason: None,
            created_at: created_at.to_string(),
        }
    }

    #[test]
    fn test_insert_and_find() {
        let db = test_db();
        let sid = seed_prompt(&db, "kim", "p1");
        insert(&db, &sample_image("img1", "p1", &sid, "2026-02-01T09:00:00Z")).unwrap();

        let found = find_by_id(&db, "img1").unwrap().unwrap();
        assert_eq!(found.status, ImageStatus::Pending);
        assert_eq!(found.safety_level, SafetyLevel::Safe);
        assert!(found.is_external_url);
    }

    #[test]
    fn test_display_url() {
        let db = test_db();
        let sid = seed_prompt(&db, "kim", "p1");

        let mut img = sample_image("img1", "p1", &sid, "2026-02-01T09:00:00Z");
        assert_eq!(img.display_url(), "https://example.com/img1.png");

        img.is_external_url = false;
        img.path = "abc123.png".to_string();
        assert_eq!(img.display_url(), "/uploads/abc123.png");

        img.path = "/abc123.png".to_string();
        assert_eq!(img.display_url(), "/uploads/abc123.png");
    }

    #[test]
    fn test_list_pending_ordering_and_scope() {
        let db = test_db();
        let a = seed_prompt(&db, "kim", "p1");
        let b = seed_prompt(&db, "park", "p2");
        insert(&db, &sample_image("img2", "p2", &b, "2026-02-01T09:05:00Z")).unwrap();
        insert(&db, &sample_image("img1", "p1", &a, "2026-02-01T09:00:00Z")).unwrap();

        let all = list_pending(&db, None).unwrap();
        let ids: Vec<&str> = all.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["img1", "img2"]);

        let scoped = list_pending(&db, Some(&[b.clone()])).unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].id, "img2");
    }

    #[test]
    fn test_update_review_and_gallery() {
        let db = test_db();
        let sid = seed_prompt(&db, "kim", "p1");
        insert(&db, &sample_image("img1", "p1", &sid, "2026-02-01T09:00:00Z")).unwrap();
        seed_reviewer(&db, "t1");

        let status = ImageStatus::Pending.review(ReviewDecision::Approved).unwrap();
        update_review(&db, "img1", status, "t1", &now_rfc3339(), None).unwrap();

        let found = find_by_id(&db, "img1").unwrap().unwrap();
        assert_eq!(found.status, ImageStatus::Approved);
        assert_eq!(found.reviewed_by.as_deref(), Some("t1"));

        let gallery = approved_for_student(&db, &sid).unwrap();
        assert_eq!(gallery.len(), 1);

        assert_eq!(count_by_status(&db, ImageStatus::Approved).unwrap(), 1);
        assert_eq!(count_by_status(&db, ImageStatus::Pending).unwrap(), 0);
    }

    #[test]
    fn test_prompt_deletion_cascades_to_images() {
        let db = test_db();
        let sid = seed_prompt(&db, "kim", "p1");
        insert(&db, &sample_image("img1", "p1", &sid, "2026-02-01T09:00:00Z")).unwrap();

        user_repo::delete(&db, &sid).unwrap();
        assert!(find_by_id(&db, "img1").unwrap().is_none());
    }
}
