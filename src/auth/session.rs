use std::path::Path;
use std::sync::Arc;

use chrono::Utc;

use super::{PasswordHasher, SessionFile};
use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::{Action, ActiveSession, AuthSettings, Role, User};

/// Owns the process-wide authentication state: the cached settings row,
/// the active session, and the persisted "remember me" snapshot.
///
/// Constructed once at process start and passed explicitly to whatever
/// needs permission checks; there is no global instance.
pub struct AuthContext {
    store: Arc<dyn Store>,
    hasher: PasswordHasher,
    remember: SessionFile,
    settings: AuthSettings,
    session: Option<ActiveSession>,
}

impl AuthContext {
    /// Loads settings and any persisted session from the store.
    ///
    /// A settings-load failure falls back to open access (auth disabled)
    /// rather than locking the operator out of a local tool; the failure
    /// is logged. This trade-off is only acceptable because the tool is
    /// single-user and offline.
    pub fn init(store: Arc<dyn Store>, data_dir: &Path) -> Self {
        let remember = SessionFile::new(data_dir);

        let settings = match store.get_auth_settings() {
            Ok(Some(settings)) => settings,
            Ok(None) => {
                tracing::warn!("Auth settings row missing; treating authentication as disabled");
                AuthSettings::open_access()
            }
            Err(e) => {
                tracing::error!("Failed to load auth settings, falling back to open access: {e}");
                AuthSettings::open_access()
            }
        };

        let session = remember.load();
        if let Some(restored) = &session {
            tracing::info!("Restored persisted session for '{}'", restored.user.username);
        }

        Self {
            store,
            hasher: PasswordHasher::new(),
            remember,
            settings,
            session,
        }
    }

    /// Drops in-memory session state. The persisted snapshot is left
    /// untouched; `logout` is the explicit way to clear it.
    pub fn teardown(&mut self) {
        self.session = None;
    }

    pub fn login(
        &mut self,
        username: &str,
        password: &str,
        remember_me: bool,
    ) -> Result<ActiveSession> {
        if !self.settings.auth_enabled {
            return Err(Error::AuthDisabled);
        }

        let user = self
            .store
            .get_user_by_username(username)?
            .ok_or(Error::InvalidCredentials)?;

        if !self.hasher.verify(password, &user.password_hash) {
            return Err(Error::InvalidCredentials);
        }

        let session = ActiveSession {
            user,
            login_time: Utc::now(),
            is_master_override: false,
        };

        if remember_me {
            if let Err(e) = self.remember.save(&session) {
                tracing::warn!("Failed to persist session snapshot: {e}");
            }
        }

        tracing::info!("User '{}' logged in", session.user.username);
        self.session = Some(session.clone());
        Ok(session)
    }

    /// Recovery login against the master password. The resulting session
    /// carries full admin rights, is flagged as an override, and is never
    /// persisted; any existing snapshot is cleared so the override cannot
    /// outlive the process.
    pub fn login_with_master(&mut self, password: &str) -> Result<ActiveSession> {
        if !self.settings.auth_enabled {
            return Err(Error::AuthDisabled);
        }

        if !self
            .hasher
            .verify(password, &self.settings.master_password_hash)
        {
            return Err(Error::InvalidCredentials);
        }

        if let Err(e) = self.remember.clear() {
            tracing::warn!("Failed to clear persisted session snapshot: {e}");
        }

        let now = Utc::now();
        let session = ActiveSession {
            user: User {
                id: "master-override".to_string(),
                username: "master".to_string(),
                password_hash: String::new(),
                display_name: "Master override".to_string(),
                role: Role::Admin,
                is_system_user: false,
                created_at: now,
                updated_at: now,
            },
            login_time: now,
            is_master_override: true,
        };

        tracing::warn!("Master override session established");
        self.session = Some(session.clone());
        Ok(session)
    }

    pub fn logout(&mut self) {
        if let Some(session) = self.session.take() {
            tracing::info!("User '{}' logged out", session.user.username);
        }
        if let Err(e) = self.remember.clear() {
            tracing::warn!("Failed to clear persisted session snapshot: {e}");
        }
    }

    /// The capability check the UI gates every command on.
    #[must_use]
    pub fn has_permission(&self, action: Action) -> bool {
        if !self.settings.auth_enabled {
            return true;
        }

        match &self.session {
            None => false,
            Some(session) if session.is_master_override => true,
            Some(session) => session.user.role.allows(action),
        }
    }

    #[must_use]
    pub fn current_user(&self) -> Option<&User> {
        self.session.as_ref().map(|s| &s.user)
    }

    #[must_use]
    pub fn current_session(&self) -> Option<&ActiveSession> {
        self.session.as_ref()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.is_master_override || s.user.role.is_admin())
    }

    #[must_use]
    pub fn is_editor(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.is_master_override || s.user.role.is_editor())
    }

    #[must_use]
    pub fn is_viewer(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| !s.is_master_override && s.user.role.is_viewer())
    }

    /// True unconditionally while authentication is disabled, otherwise
    /// editor-or-admin.
    #[must_use]
    pub fn can_edit(&self) -> bool {
        if !self.settings.auth_enabled {
            return true;
        }
        self.is_editor()
    }

    #[must_use]
    pub fn auth_settings(&self) -> &AuthSettings {
        &self.settings
    }

    pub(crate) fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub(crate) fn hasher(&self) -> &PasswordHasher {
        &self.hasher
    }

    pub(crate) fn remember_file(&self) -> &SessionFile {
        &self.remember
    }

    pub(crate) fn set_settings(&mut self, settings: AuthSettings) {
        self.settings = settings;
    }
}
