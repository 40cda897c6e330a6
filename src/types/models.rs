use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Role;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(skip)]
    pub password_hash: String,
    pub display_name: String,
    pub role: Role,
    pub is_system_user: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    #[must_use]
    pub fn new(
        username: impl Into<String>,
        password_hash: impl Into<String>,
        display_name: impl Into<String>,
        role: Role,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            username: username.into(),
            password_hash: password_hash.into(),
            display_name: display_name.into(),
            role,
            is_system_user: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Singleton settings row. Created once at store initialization and only
/// ever updated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSettings {
    pub auth_enabled: bool,
    #[serde(skip)]
    pub master_password_hash: String,
    pub master_password_changed: bool,
    pub updated_at: DateTime<Utc>,
}

impl AuthSettings {
    /// Open-access settings used when the stored row cannot be loaded.
    #[must_use]
    pub fn open_access() -> Self {
        Self {
            auth_enabled: false,
            master_password_hash: String::new(),
            master_password_changed: false,
            updated_at: Utc::now(),
        }
    }
}

/// An authenticated session. Master-override sessions carry full admin
/// rights and are never persisted across restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveSession {
    pub user: User,
    pub login_time: DateTime<Utc>,
    pub is_master_override: bool,
}

/// One of the four register tables. The core treats their row payloads as
/// opaque; only the UI layer knows the field semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterTable {
    Suppliers,
    Events,
    Issues,
    CriticalMonitor,
}

impl RegisterTable {
    pub const ALL: [RegisterTable; 4] = [
        RegisterTable::Suppliers,
        RegisterTable::Events,
        RegisterTable::Issues,
        RegisterTable::CriticalMonitor,
    ];

    #[must_use]
    pub const fn table_name(self) -> &'static str {
        match self {
            RegisterTable::Suppliers => "suppliers",
            RegisterTable::Events => "events",
            RegisterTable::Issues => "issues",
            RegisterTable::CriticalMonitor => "critical_monitor",
        }
    }

    #[must_use]
    pub const fn export_file_name(self) -> &'static str {
        match self {
            RegisterTable::Suppliers => "suppliers.csv",
            RegisterTable::Events => "events.csv",
            RegisterTable::Issues => "issues.csv",
            RegisterTable::CriticalMonitor => "critical_monitor.csv",
        }
    }
}

impl std::fmt::Display for RegisterTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.table_name())
    }
}

/// An opaque register row: a unique key plus a JSON payload the UI owns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRecord {
    pub id: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RegisterRecord {
    #[must_use]
    pub fn new(payload: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            payload,
            created_at: now,
            updated_at: now,
        }
    }
}
