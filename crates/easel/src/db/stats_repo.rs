//! Usage statistics repository — the aggregate queries behind the admin
//! dashboard.

use rusqlite::params;
use serde::Serialize;

use super::{Database, DatabaseError};

/// System-wide usage snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    pub students: i64,
    pub teachers: i64,
    pub prompts_total: i64,
    pub prompts_pending: i64,
    pub prompts_processed: i64,
    pub prompts_rejected: i64,
    pub images_total: i64,
    pub images_pending: i64,
    pub images_approved: i64,
    pub images_rejected: i64,
    /// Credits still available across all teachers.
    pub credits_remaining: i64,
    /// Sum of all debits (positive number).
    pub credits_spent: i64,
    /// Sum of all grants.
    pub credits_granted: i64,
}

/// Per-teacher credit consumption, heaviest spender first.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherSpendRow {
    pub teacher_id: String,
    pub username: String,
    pub name: String,
    pub credits: i64,
    pub spent: i64,
}

pub fn usage(db: &Database) -> Result<UsageStats, DatabaseError> {
    db.with_conn(|conn| {
        let count = |sql: &str| -> Result<i64, rusqlite::Error> {
            conn.query_row(sql, [], |r| r.get(0))
        };

        Ok(UsageStats {
            students: count("SELECT COUNT(*) FROM users WHERE role = 'student'")?,
            teachers: count("SELECT COUNT(*) FROM users WHERE role = 'teacher'")?,
            prompts_total: count("SELECT COUNT(*) FROM prompts")?,
            prompts_pending: count("SELECT COUNT(*) FROM prompts WHERE status = 'pending'")?,
            prompts_processed: count("SELECT COUNT(*) FROM prompts WHERE status = 'processed'")?,
            prompts_rejected: count("SELECT COUNT(*) FROM prompts WHERE status = 'rejected'")?,
            images_total: count("SELECT COUNT(*) FROM images")?,
            images_pending: count("SELECT COUNT(*) FROM images WHERE status = 'pending'")?,
            images_approved: count("SELECT COUNT(*) FROM images WHERE status = 'approved'")?,
            images_rejected: count("SELECT COUNT(*) FROM images WHERE status = 'rejected'")?,
            credits_remaining: count(
                "SELECT COALESCE(SUM(credits), 0) FROM users WHERE role = 'teacher'",
            )?,
            credits_spent: count(
                "SELECT COALESCE(SUM(-amount), 0) FROM credit_history WHERE amount < 0",
            )?,
            credits_granted: count(
                "SELECT COALESCE(SUM(amount), 0) FROM credit_history WHERE amount > 0",
            )?,
        })
    })
}

pub fn teacher_spend(db: &Database) -> Result<Vec<TeacherSpendRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT u.id, u.username, u.name, u.credits,
                    COALESCE((SELECT SUM(-h.amount) FROM credit_history h
                              WHERE h.user_id = u.id AND h.amount < 0), 0) AS spent
             FROM users u WHERE u.role = 'teacher'
             ORDER BY spent DESC, u.name ASC",
        )?;
        let rows: Vec<TeacherSpendRow> = stmt
            .query_map(params![], |row| {
                Ok(TeacherSpendRow {
                    teacher_id: row.get(0)?,
                    username: row.get(1)?,
                    name: row.get(2)?,
                    credits: row.get(3)?,
                    spent: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
