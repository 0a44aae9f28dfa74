//! Database migration system.
//!
//! Tracks applied migrations in a `_migrations` table and applies
//! pending ones in order. ALTER TABLE ADD COLUMN migrations are handled
//! conditionally to support idempotent execution.

use rusqlite::Connection;

use super::error::DatabaseError;

/// A single migration definition.
struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
    /// Whether this migration needs conditional handling
    /// (e.g. ADD COLUMN that may already exist).
    kind: MigrationKind,
}

enum MigrationKind {
    /// Execute the SQL directly.
    Standard,
    /// ALTER TABLE ADD COLUMN — skip if column already exists.
    AddColumn {
        table: &'static str,
        column: &'static str,
    },
}

/// All migrations in order. Each is applied at most once.
///
/// `prompts.generated_image_id` arrives in v4, after `images` exists,
/// so neither CREATE TABLE has to reference a table created later.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_users_and_credit_history",
        sql: include_str!("sql/001_create_users.sql"),
        kind: MigrationKind::Standard,
    },
    Migration {
        version: 2,
        description: "create_prompts_table",
        sql: include_str!("sql/002_create_prompts.sql"),
        kind: MigrationKind::Standard,
    },
    Migration {
        version: 3,
        description: "create_images_table",
        sql: include_str!("sql/003_create_images.sql"),
        kind: MigrationKind::Standard,
    },
    Migration {
        version: 4,
        description: "add_generated_image_to_prompts",
        sql: include_str!("sql/004_add_generated_image.sql"),
        kind: MigrationKind::AddColumn {
            table: "prompts",
            column: "generated_image_id",
        },
    },
];

/// Runs all pending migrations on the given connection.
pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    // Create the migrations tracking table.
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current_version: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?;

    for migration in MIGRATIONS {
        if migration.version <= current_version {
            continue;
        }

        log::info!(
            "Running migration v{}: {}",
            migration.version,
            migration.description
        );

        let should_run = match &migration.kind {
            MigrationKind::Standard => true,
            MigrationKind::AddColumn { table, column } => !column_exists(conn, table, column)?,
        };

        if should_run {
            conn.execute_batch(migration.sql)
                .map_err(|e| DatabaseError::Migration {
                    version: migration.version,
                    reason: e.to_string(),
                })?;
        } else {
            log::info!(
                "Skipping migration v{} (condition not met)",
                migration.version
            );
        }

        conn.execute(
            "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
            rusqlite::params![migration.version, migration.description],
        )?;
    }

    Ok(())
}

/// Checks whether a column exists on a table using `PRAGMA table_info`.
fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, DatabaseError> {
    // Validate identifier — only alphanumeric and underscores allowed.
    if !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(DatabaseError::Migration {
            version: 0,
            reason: format!("Invalid table name: {}", table),
        });
    }
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let exists = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .any(|r| r.map(|name| name == column).unwrap_or(false));
    Ok(exists)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_run_on_fresh_db() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        run_all(&conn).unwrap();

        let count: u32 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as u32);
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        run_all(&conn).unwrap();
        // Running again should be a no-op.
        run_all(&conn).unwrap();

        let count: u32 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as u32);
    }

    #[test]
    fn test_column_exists_check() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE test_tbl (id TEXT, name TEXT);")
            .unwrap();

        assert!(column_exists(&conn, "test_tbl", "id").unwrap());
        assert!(column_exists(&conn, "test_tbl", "name").unwrap());
        assert!(!column_exists(&conn, "test_tbl", "missing").unwrap());
    }

    #[test]
    fn test_prompts_table_has_generated_image_id() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        run_all(&conn).unwrap();

        assert!(column_exists(&conn, "prompts", "generated_image_id").unwrap());
    }

    #[test]
    fn test_one_pending_prompt_index() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        run_all(&conn).unwrap();

        conn.execute(
            "INSERT INTO users (id, username, name, role, credits, created_at)
             VALUES ('s1', 'kim', 'Kim', 'student', 0, '2026-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO prompts (id, content, student_id, status, created_at)
             VALUES ('p1', 'a cat', 's1', 'pending', '2026-01-01T00:00:00Z')",
            [],
        )
        .unwrap();

        // A second pending prompt for the same student violates the index.
        let result = conn.execute(
            "INSERT INTO prompts (id, content, student_id, status, created_at)
             VALUES ('p2', 'a dog', 's1', 'pending', '2026-01-01T00:01:00Z')",
            [],
        );
        assert!(result.is_err());

        // A non-pending second prompt is fine.
        conn.execute(
            "INSERT INTO prompts (id, content, student_id, status, created_at)
             VALUES ('p3', 'a dog', 's1', 'processed', '2026-01-01T00:02:00Z')",
            [],
        )
        .unwrap();
    }

    #[test]
    fn test_credits_non_negative_check() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        run_all(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO users (id, username, name, role, credits, created_at)
             VALUES ('t1', 'lee', 'Lee', 'teacher', -1, '2026-01-01T00:00:00Z')",
            [],
        );
        assert!(result.is_err());
    }
}
