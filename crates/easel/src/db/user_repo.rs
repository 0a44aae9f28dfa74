//! User repository — accounts and the per-teacher credit ledger.
//!
//! The ledger invariant lives here: every balance change commits in the
//! same transaction as exactly one matching `credit_history` row, and the
//! debit is a conditional decrement so the balance can never go negative,
//! even under concurrent approvals.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::{params, Row, ToSql};
use uuid::Uuid;

use super::{now_rfc3339, Database, DatabaseError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "student" => Some(Role::Student),
            "teacher" => Some(Role::Teacher),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    /// Admins can act anywhere a teacher can.
    pub fn can_review(self) -> bool {
        matches!(self, Role::Teacher | Role::Admin)
    }
}

impl FromSql for Role {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        Self::parse(s).ok_or_else(|| FromSqlError::Other(format!("invalid role '{}'", s).into()))
    }
}

impl ToSql for Role {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

/// A user row: student, teacher, or admin. Credits and the classroom
/// linkage are only meaningful for teachers and students respectively,
/// mirroring the single-collection layout of the account store.
#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub name: String,
    pub role: Role,
    pub credits: i64,
    pub classroom: Option<String>,
    pub teacher_id: Option<String>,
    pub created_at: String,
}

impl UserRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            username: row.get("username")?,
            name: row.get("name")?,
            role: row.get("role")?,
            credits: row.get("credits")?,
            classroom: row.get("classroom")?,
            teacher_id: row.get("teacher_id")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Parameters for account creation.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub name: String,
    pub role: Role,
    pub classroom: Option<String>,
    pub teacher_id: Option<String>,
    pub initial_credits: i64,
}

/// One credit ledger entry. `amount` is signed: debits are negative.
#[derive(Debug, Clone)]
pub struct CreditHistoryRow {
    pub id: i64,
    pub user_id: String,
    pub amount: i64,
    pub reason: String,
    pub admin_id: Option<String>,
    pub created_at: String,
}

impl CreditHistoryRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            amount: row.get("amount")?,
            reason: row.get("reason")?,
            admin_id: row.get("admin_id")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Creates an account. An initial credit allocation is recorded in the
/// ledger so the balance/history pairing holds from the first row.
pub fn create(db: &Database, new_user: NewUser) -> Result<UserRow, DatabaseError> {
    let user = UserRow {
        id: Uuid::new_v4().to_string(),
        username: new_user.username,
        name: new_user.name,
        role: new_user.role,
        credits: new_user.initial_credits,
        classroom: new_user.classroom,
        teacher_id: new_user.teacher_id,
        created_at: now_rfc3339(),
    };

    db.with_conn_mut(|conn| {
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO users (id, username, name, role, credits, classroom, teacher_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                user.id,
                user.username,
                user.name,
                user.role,
                user.credits,
                user.classroom,
                user.teacher_id,
                user.created_at,
            ],
        )?;
        if user.credits > 0 {
            tx.execute(
                "INSERT INTO credit_history (user_id, amount, reason, admin_id, created_at)
                 VALUES (?1, ?2, 'Initial credit allocation', NULL, ?3)",
                params![user.id, user.credits, user.created_at],
            )?;
        }
        tx.commit()?;
        Ok(())
    })?;

    Ok(user)
}

pub fn find_by_id(db: &Database, id: &str) -> Result<Option<UserRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM users WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], UserRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

pub fn find_by_username(db: &Database, username: &str) -> Result<Option<UserRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM users WHERE username = ?1")?;
        let mut rows = stmt.query_map(params![username], UserRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Students assigned to the given teacher, alphabetically by name.
pub fn students_of_teacher(db: &Database, teacher_id: &str) -> Result<Vec<UserRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM users WHERE role = 'student' AND teacher_id = ?1 ORDER BY name",
        )?;
        let rows: Vec<UserRow> = stmt
            .query_map(params![teacher_id], UserRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

pub fn list_by_role(db: &Database, role: Role) -> Result<Vec<UserRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM users WHERE role = ?1 ORDER BY name")?;
        let rows: Vec<UserRow> = stmt
            .query_map(params![role], UserRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Deletes an account. Prompts and images owned by a student go with it
/// (FK cascade). Returns false when the id does not exist.
pub fn delete(db: &Database, id: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let deleted = conn.execute("DELETE FROM users WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    })
}

pub fn balance(db: &Database, user_id: &str) -> Result<Option<i64>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT credits FROM users WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![user_id], |r| r.get::<_, i64>(0))?;
        match rows.next() {
            Some(Ok(credits)) => Ok(Some(credits)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Debits `amount` credits in one transaction: conditional decrement plus
/// the matching (negative) history entry. Returns the new balance, or
/// `None` when the user is missing or the balance is below `amount` —
/// in which case nothing was written.
pub fn debit(
    db: &Database,
    user_id: &str,
    amount: i64,
    reason: &str,
    admin_id: Option<&str>,
) -> Result<Option<i64>, DatabaseError> {
    debug_assert!(amount > 0);
    db.with_conn_mut(|conn| {
        let tx = conn.transaction()?;
        let updated = tx.execute(
            "UPDATE users SET credits = credits - ?2 WHERE id = ?1 AND credits >= ?2",
            params![user_id, amount],
        )?;
        if updated == 0 {
            return Ok(None);
        }
        tx.execute(
            "INSERT INTO credit_history (user_id, amount, reason, admin_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![user_id, -amount, reason, admin_id, now_rfc3339()],
        )?;
        let balance: i64 = tx.query_row(
            "SELECT credits FROM users WHERE id = ?1",
            params![user_id],
            |r| r.get(0),
        )?;
        tx.commit()?;
        Ok(Some(balance))
    })
}

/// Credits `amount` in one transaction with the matching history entry.
/// `admin_id` records who allocated the credits. Returns the new balance,
/// or `None` when the user does not exist.
pub fn grant(
    db: &Database,
    user_id: &str,
    amount: i64,
    reason: &str,
    admin_id: Option<&str>,
) -> Result<Option<i64>, DatabaseError> {
    debug_assert!(amount > 0);
    db.with_conn_mut(|conn| {
        let tx = conn.transaction()?;
        let updated = tx.execute(
            "UPDATE users SET credits = credits + ?2 WHERE id = ?1",
            params![user_id, amount],
        )?;
        if updated == 0 {
            return Ok(None);
        }
        tx.execute(
            "INSERT INTO credit_history (user_id, amount, reason, admin_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![user_id, amount, reason, admin_id, now_rfc3339()],
        )?;
        let balance: i64 = tx.query_row(
            "SELECT credits FROM users WHERE id = ?1",
            params![user_id],
            |r| r.get(0),
        )?;
        tx.commit()?;
        Ok(Some(balance))
    })
}

/// Ledger entries for a user, newest first.
pub fn history(db: &Database, user_id: &str) -> Result<Vec<CreditHistoryRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM credit_history WHERE user_id = ?1 ORDER BY created_at DESC, id DESC",
        )?;
        let rows: Vec<CreditHistoryRow> = stmt
            .query_map(params![user_id], CreditHistoryRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    fn teacher_with_credits(db: &Database, credits: i64) -> UserRow {
        create(
            db,
            NewUser {
                username: "t-lee".to_string(),
                name: "Lee".to_string(),
                role: Role::Teacher,
                classroom: Some("3-2".to_string()),
                teacher_id: None,
                initial_credits: credits,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_create_and_find() {
        let db = test_db();
        let teacher = teacher_with_credits(&db, 5);

        let found = find_by_id(&db, &teacher.id).unwrap().unwrap();
        assert_eq!(found.username, "t-lee");
        assert_eq!(found.role, Role::Teacher);
        assert_eq!(found.credits, 5);

        let by_name = find_by_username(&db, "t-lee").unwrap().unwrap();
        assert_eq!(by_name.id, teacher.id);
    }

    #[test]
    fn test_initial_credits_are_in_the_ledger() {
        let db = test_db();
        let teacher = teacher_with_credits(&db, 10);

        let history = history(&db, &teacher.id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].amount, 10);
    }

    #[test]
    fn test_zero_initial_credits_no_ledger_entry() {
        let db = test_db();
        let teacher = teacher_with_credits(&db, 0);
        assert!(history(&db, &teacher.id).unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_username_rejected() {
        let db = test_db();
        teacher_with_credits(&db, 0);
        let result = create(
            &db,
            NewUser {
                username: "t-lee".to_string(),
                name: "Other Lee".to_string(),
                role: Role::Teacher,
                classroom: None,
                teacher_id: None,
                initial_credits: 0,
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_debit_and_history_pairing() {
        let db = test_db();
        let teacher = teacher_with_credits(&db, 5);

        let balance = debit(&db, &teacher.id, 1, "Image generation: a red bicycle", None)
            .unwrap()
            .unwrap();
        assert_eq!(balance, 4);

        let entries = history(&db, &teacher.id).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].amount, -1);
        assert_eq!(entries[0].reason, "Image generation: a red bicycle");
    }

    #[test]
    fn test_debit_insufficient_leaves_everything_unchanged() {
        let db = test_db();
        let teacher = teacher_with_credits(&db, 2);

        let result = debit(&db, &teacher.id, 3, "Batch approval: 3 prompts", None).unwrap();
        assert!(result.is_none());

        assert_eq!(balance(&db, &teacher.id).unwrap(), Some(2));
        // No dangling history entry from the refused debit.
        assert_eq!(history(&db, &teacher.id).unwrap().len(), 1);
    }

    #[test]
    fn test_debit_missing_user() {
        let db = test_db();
        let result = debit(&db, "nope", 1, "x", None).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_grant_records_admin() {
        let db = test_db();
        let teacher = teacher_with_credits(&db, 0);
        let admin = create(
            &db,
            NewUser {
                username: "admin".to_string(),
                name: "Admin".to_string(),
                role: Role::Admin,
                classroom: None,
                teacher_id: None,
                initial_credits: 0,
            },
        )
        .unwrap();

        let balance = grant(&db, &teacher.id, 50, "Basic package", Some(&admin.id))
            .unwrap()
            .unwrap();
        assert_eq!(balance, 50);

        let entries = history(&db, &teacher.id).unwrap();
        assert_eq!(entries[0].amount, 50);
        assert_eq!(entries[0].admin_id.as_deref(), Some(admin.id.as_str()));
    }

    #[test]
    fn test_students_of_teacher() {
        let db = test_db();
        let teacher = teacher_with_credits(&db, 0);
        for (username, name) in [("s-kim", "Kim"), ("s-park", "Park")] {
            create(
                &db,
                NewUser {
                    username: username.to_string(),
                    name: name.to_string(),
                    role: Role::Student,
                    classroom: Some("3-2".to_string()),
                    teacher_id: Some(teacher.id.clone()),
                    initial_credits: 0,
                },
            )
            .unwrap();
        }
        // A student of someone else.
        create(
            &db,
            NewUser {
                username: "s-choi".to_string(),
                name: "Choi".to_string(),
                role: Role::Student,
                classroom: None,
                teacher_id: None,
                initial_credits: 0,
            },
        )
        .unwrap();

        let students = students_of_teacher(&db, &teacher.id).unwrap();
        assert_eq!(students.len(), 2);
        assert_eq!(students[0].name, "Kim");
    }

    #[test]
    fn test_list_by_role() {
        let db = test_db();
        teacher_with_credits(&db, 0);
        create(
            &db,
            NewUser {
                username: "admin".to_string(),
                name: "Admin".to_string(),
                role: Role::Admin,
                classroom: None,
                teacher_id: None,
                initial_credits: 0,
            },
        )
        .unwrap();

        assert_eq!(list_by_role(&db, Role::Teacher).unwrap().len(), 1);
        assert_eq!(list_by_role(&db, Role::Admin).unwrap().len(), 1);
        assert!(list_by_role(&db, Role::Student).unwrap().is_empty());
    }

    #[test]
    fn test_delete_user() {
        let db = test_db();
        let teacher = teacher_with_credits(&db, 0);
        assert!(delete(&db, &teacher.id).unwrap());
        assert!(!delete(&db, &teacher.id).unwrap());
        assert!(find_by_id(&db, &teacher.id).unwrap().is_none());
    }

    #[test]
    fn test_role_helpers() {
        assert!(Role::Teacher.can_review());
        assert!(Role::Admin.can_review());
        assert!(!Role::Student.can_review());
        assert_eq!(Role::parse("teacher"), Some(Role::Teacher));
        assert_eq!(Role::parse("wizard"), None);
    }
}
