mod schema;
mod sqlite;

pub use sqlite::SqliteStore;
pub(crate) use sqlite::{format_datetime, parse_datetime, read_register_records};

use std::path::Path;

use crate::error::Result;
use crate::types::*;

/// Store defines the database interface.
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    // User operations
    fn create_user(&self, user: &User) -> Result<()>;
    fn get_user(&self, id: &str) -> Result<Option<User>>;
    fn get_user_by_username(&self, username: &str) -> Result<Option<User>>;
    fn list_users(&self) -> Result<Vec<User>>;
    fn update_user(&self, user: &User) -> Result<()>;
    fn delete_user(&self, id: &str) -> Result<bool>;
    fn count_users(&self) -> Result<i64>;
    fn count_admins(&self) -> Result<i64>;

    // Auth settings (singleton row)
    fn get_auth_settings(&self) -> Result<Option<AuthSettings>>;
    fn update_auth_settings(&self, settings: &AuthSettings) -> Result<()>;
    /// Creates the singleton row if missing and returns the current settings.
    fn ensure_auth_settings(&self, default_master_hash: &str) -> Result<AuthSettings>;

    // Register record operations (opaque payloads)
    fn list_records(&self, table: RegisterTable) -> Result<Vec<RegisterRecord>>;
    fn get_record(&self, table: RegisterTable, id: &str) -> Result<Option<RegisterRecord>>;
    fn insert_record(&self, table: RegisterTable, record: &RegisterRecord) -> Result<()>;
    fn update_record(&self, table: RegisterTable, record: &RegisterRecord) -> Result<()>;
    fn delete_record(&self, table: RegisterTable, id: &str) -> Result<bool>;
    fn delete_all_records(&self, table: RegisterTable) -> Result<usize>;
    fn count_records(&self, table: RegisterTable) -> Result<i64>;
    /// Replaces the whole table with the given rows inside one transaction.
    /// A failure leaves the table in its previous state.
    fn replace_all_records(&self, table: RegisterTable, records: &[RegisterRecord])
    -> Result<usize>;

    // Backup hooks. Both hold the connection lock for the duration, so
    // concurrent operations queue rather than observe a half-written store.
    fn snapshot_to(&self, destination: &Path) -> Result<()>;
    fn restore_from(&self, snapshot: &Path) -> Result<()>;
}
