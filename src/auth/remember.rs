use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::types::ActiveSession;

const SESSION_FILE_NAME: &str = "session.json";

/// Fixed-key local storage for the "remember me" session snapshot. The
/// snapshot is trusted on load; this is a single-user offline tool and the
/// file lives next to the store it mirrors.
pub struct SessionFile {
    path: PathBuf,
}

impl SessionFile {
    #[must_use]
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(SESSION_FILE_NAME),
        }
    }

    /// Loads the persisted snapshot, if any. An unreadable snapshot is
    /// treated as absent.
    pub fn load(&self) -> Option<ActiveSession> {
        let content = fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&content) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::warn!("Discarding unreadable session snapshot: {e}");
                None
            }
        }
    }

    pub fn save(&self, session: &ActiveSession) -> Result<()> {
        let content = serde_json::to_string_pretty(session)
            .map_err(|e| crate::error::Error::Validation(format!("serialize session: {e}")))?;
        fs::write(&self.path, content)?;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    use crate::types::{Role, User};

    fn test_session() -> ActiveSession {
        ActiveSession {
            user: User::new("alice", "$argon2id$secret", "Alice", Role::Editor),
            login_time: Utc::now(),
            is_master_override: false,
        }
    }

    #[test]
    fn test_save_load_clear() {
        let temp = TempDir::new().unwrap();
        let file = SessionFile::new(temp.path());

        assert!(file.load().is_none());

        file.save(&test_session()).unwrap();
        let loaded = file.load().unwrap();
        assert_eq!(loaded.user.username, "alice");

        file.clear().unwrap();
        assert!(file.load().is_none());
        // Clearing an absent snapshot is fine.
        file.clear().unwrap();
    }

    #[test]
    fn test_snapshot_never_contains_password_hash() {
        let temp = TempDir::new().unwrap();
        let file = SessionFile::new(temp.path());

        file.save(&test_session()).unwrap();
        let raw = std::fs::read_to_string(temp.path().join("session.json")).unwrap();
        assert!(!raw.contains("argon2id"));
        assert!(!raw.contains("secret"));
    }

    #[test]
    fn test_corrupt_snapshot_treated_as_absent() {
        let temp = TempDir::new().unwrap();
        let file = SessionFile::new(temp.path());

        std::fs::write(temp.path().join("session.json"), "{not json").unwrap();
        assert!(file.load().is_none());
    }
}
