use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};

use super::Store;
use super::schema::SCHEMA;
use crate::error::{Error, Result};
use crate::types::*;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns a guard to the underlying database connection.
    /// This allows consuming applications to execute custom SQL.
    pub fn connection(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn()
    }
}

pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn parse_role(s: &str) -> Role {
    Role::parse(s).unwrap_or_else(|| {
        tracing::error!("Invalid role in database: '{}'", s);
        Role::Viewer
    })
}

fn parse_payload(s: &str) -> serde_json::Value {
    serde_json::from_str(s).unwrap_or_else(|e| {
        tracing::error!("Invalid payload JSON in database: {}", e);
        serde_json::Value::String(s.to_string())
    })
}

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        display_name: row.get(3)?,
        role: parse_role(&row.get::<_, String>(4)?),
        is_system_user: row.get(5)?,
        created_at: parse_datetime(&row.get::<_, String>(6)?),
        updated_at: parse_datetime(&row.get::<_, String>(7)?),
    })
}

fn record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RegisterRecord> {
    Ok(RegisterRecord {
        id: row.get(0)?,
        payload: parse_payload(&row.get::<_, String>(1)?),
        created_at: parse_datetime(&row.get::<_, String>(2)?),
        updated_at: parse_datetime(&row.get::<_, String>(3)?),
    })
}

/// Reads all rows of a register table through an arbitrary connection.
/// Also used by the restore path against an archived snapshot opened
/// side-by-side with the live store.
pub(crate) fn read_register_records(
    conn: &Connection,
    table: RegisterTable,
) -> Result<Vec<RegisterRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, payload, created_at, updated_at FROM {} ORDER BY created_at, id",
        table.table_name()
    ))?;

    let rows = stmt.query_map([], record_from_row)?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

const USER_COLUMNS: &str =
    "id, username, password_hash, display_name, role, is_system_user, created_at, updated_at";

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    // User operations

    fn create_user(&self, user: &User) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO users (id, username, password_hash, display_name, role, is_system_user, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                user.id,
                user.username,
                user.password_hash,
                user.display_name,
                user.role.as_str(),
                user.is_system_user,
                format_datetime(&user.created_at),
                format_datetime(&user.updated_at),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(Error::DuplicateUsername)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn get_user(&self, id: &str) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id],
            user_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        // The username column carries NOCASE collation, so equality here is
        // case-insensitive.
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
            params![username],
            user_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY username COLLATE NOCASE"
        ))?;

        let rows = stmt.query_map([], user_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn update_user(&self, user: &User) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE users SET password_hash = ?1, display_name = ?2, role = ?3, updated_at = ?4
             WHERE id = ?5",
            params![
                user.password_hash,
                user.display_name,
                user.role.as_str(),
                format_datetime(&user.updated_at),
                user.id,
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    fn delete_user(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM users WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn count_users(&self) -> Result<i64> {
        let count = self
            .conn()
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count)
    }

    fn count_admins(&self) -> Result<i64> {
        let count = self.conn().query_row(
            "SELECT COUNT(*) FROM users WHERE role = 'admin'",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // Auth settings

    fn get_auth_settings(&self) -> Result<Option<AuthSettings>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT auth_enabled, master_password_hash, master_password_changed, updated_at
             FROM auth_settings WHERE id = 1",
            [],
            |row| {
                Ok(AuthSettings {
                    auth_enabled: row.get(0)?,
                    master_password_hash: row.get(1)?,
                    master_password_changed: row.get(2)?,
                    updated_at: parse_datetime(&row.get::<_, String>(3)?),
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }

    fn update_auth_settings(&self, settings: &AuthSettings) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE auth_settings
             SET auth_enabled = ?1, master_password_hash = ?2, master_password_changed = ?3, updated_at = ?4
             WHERE id = 1",
            params![
                settings.auth_enabled,
                settings.master_password_hash,
                settings.master_password_changed,
                format_datetime(&settings.updated_at),
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    fn ensure_auth_settings(&self, default_master_hash: &str) -> Result<AuthSettings> {
        self.conn().execute(
            "INSERT OR IGNORE INTO auth_settings (id, auth_enabled, master_password_hash, master_password_changed, updated_at)
             VALUES (1, 0, ?1, 0, ?2)",
            params![default_master_hash, format_datetime(&Utc::now())],
        )?;

        self.get_auth_settings()?.ok_or(Error::NotFound)
    }

    // Register records

    fn list_records(&self, table: RegisterTable) -> Result<Vec<RegisterRecord>> {
        read_register_records(&self.conn(), table)
    }

    fn get_record(&self, table: RegisterTable, id: &str) -> Result<Option<RegisterRecord>> {
        let conn = self.conn();
        conn.query_row(
            &format!(
                "SELECT id, payload, created_at, updated_at FROM {} WHERE id = ?1",
                table.table_name()
            ),
            params![id],
            record_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn insert_record(&self, table: RegisterTable, record: &RegisterRecord) -> Result<()> {
        self.conn().execute(
            &format!(
                "INSERT INTO {} (id, payload, created_at, updated_at) VALUES (?1, ?2, ?3, ?4)",
                table.table_name()
            ),
            params![
                record.id,
                record.payload.to_string(),
                format_datetime(&record.created_at),
                format_datetime(&record.updated_at),
            ],
        )?;
        Ok(())
    }

    fn update_record(&self, table: RegisterTable, record: &RegisterRecord) -> Result<()> {
        let rows = self.conn().execute(
            &format!(
                "UPDATE {} SET payload = ?1, updated_at = ?2 WHERE id = ?3",
                table.table_name()
            ),
            params![
                record.payload.to_string(),
                format_datetime(&record.updated_at),
                record.id,
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    fn delete_record(&self, table: RegisterTable, id: &str) -> Result<bool> {
        let rows = self.conn().execute(
            &format!("DELETE FROM {} WHERE id = ?1", table.table_name()),
            params![id],
        )?;
        Ok(rows > 0)
    }

    fn delete_all_records(&self, table: RegisterTable) -> Result<usize> {
        let rows = self
            .conn()
            .execute(&format!("DELETE FROM {}", table.table_name()), [])?;
        Ok(rows)
    }

    fn count_records(&self, table: RegisterTable) -> Result<i64> {
        let count = self.conn().query_row(
            &format!("SELECT COUNT(*) FROM {}", table.table_name()),
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn replace_all_records(
        &self,
        table: RegisterTable,
        records: &[RegisterRecord],
    ) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        tx.execute(&format!("DELETE FROM {}", table.table_name()), [])?;

        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} (id, payload, created_at, updated_at) VALUES (?1, ?2, ?3, ?4)",
                table.table_name()
            ))?;
            for record in records {
                stmt.execute(params![
                    record.id,
                    record.payload.to_string(),
                    format_datetime(&record.created_at),
                    format_datetime(&record.updated_at),
                ])?;
            }
        }

        tx.commit()?;
        Ok(records.len())
    }

    // Backup hooks

    fn snapshot_to(&self, destination: &Path) -> Result<()> {
        let dest = destination.to_str().ok_or_else(|| {
            Error::Validation(format!("non-UTF-8 snapshot path: {}", destination.display()))
        })?;

        // VACUUM INTO writes a consistent point-in-time copy while we hold
        // the connection lock; concurrent callers block until it finishes.
        self.conn().execute("VACUUM INTO ?1", params![dest])?;
        Ok(())
    }

    fn restore_from(&self, snapshot: &Path) -> Result<()> {
        let source = Connection::open_with_flags(snapshot, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|e| {
                Error::ArchiveMalformed(format!("cannot open archived store snapshot: {e}"))
            })?;

        let mut conn = self.conn();
        let backup = rusqlite::backup::Backup::new(&source, &mut conn)?;
        backup.run_to_completion(100, Duration::ZERO, None)?;
        Ok(())
    }
}
