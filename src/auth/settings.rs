use chrono::Utc;

use super::session::AuthContext;
use super::{DEFAULT_ADMIN_PASSWORD, DEFAULT_ADMIN_USERNAME};
use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::{Role, User};

/// Result of enabling authentication. When the store held no users, a
/// default admin was provisioned and the operator must be told to rotate
/// its password.
#[derive(Debug, Clone)]
pub struct EnableOutcome {
    pub bootstrapped_admin: Option<User>,
}

impl AuthContext {
    /// Turns authentication on. On a store with zero users this bootstraps
    /// the default admin account first, so enabling can never produce a
    /// lockout.
    pub fn enable_auth(&mut self) -> Result<EnableOutcome> {
        let bootstrapped_admin = if self.store().count_users()? == 0 {
            let hash = self.hasher().hash(DEFAULT_ADMIN_PASSWORD)?;
            let mut admin = User::new(
                DEFAULT_ADMIN_USERNAME,
                hash,
                "Administrator",
                Role::Admin,
            );
            admin.is_system_user = true;
            self.store().create_user(&admin)?;
            tracing::info!("Bootstrapped default admin account '{DEFAULT_ADMIN_USERNAME}'");
            Some(admin)
        } else {
            None
        };

        let mut settings = self.auth_settings().clone();
        settings.auth_enabled = true;
        settings.updated_at = Utc::now();
        self.store().update_auth_settings(&settings)?;
        self.set_settings(settings);

        Ok(EnableOutcome { bootstrapped_admin })
    }

    /// Turns authentication off. Users and the master password survive, so
    /// re-enabling restores the previous accounts. Idempotent.
    pub fn disable_auth(&mut self) -> Result<()> {
        let mut settings = self.auth_settings().clone();
        settings.auth_enabled = false;
        settings.updated_at = Utc::now();
        self.store().update_auth_settings(&settings)?;
        self.set_settings(settings);
        Ok(())
    }

    /// Rotates the master recovery password. Returns `Ok(false)` when the
    /// current password does not verify.
    pub fn change_master_password(&mut self, current: &str, new: &str) -> Result<bool> {
        if !self
            .hasher()
            .verify(current, &self.auth_settings().master_password_hash)
        {
            return Ok(false);
        }

        let mut settings = self.auth_settings().clone();
        settings.master_password_hash = self.hasher().hash(new)?;
        settings.master_password_changed = true;
        settings.updated_at = Utc::now();
        self.store().update_auth_settings(&settings)?;
        self.set_settings(settings);

        tracing::info!("Master password rotated");
        Ok(true)
    }

    /// Changes a user's own password after verifying the current one.
    /// Returns `Ok(false)` on a wrong current password.
    pub fn change_user_password(&self, user_id: &str, current: &str, new: &str) -> Result<bool> {
        let mut user = self.store().get_user(user_id)?.ok_or(Error::NotFound)?;

        if !self.hasher().verify(current, &user.password_hash) {
            return Ok(false);
        }

        user.password_hash = self.hasher().hash(new)?;
        user.updated_at = Utc::now();
        self.store().update_user(&user)?;

        tracing::info!("Password changed for user '{}'", user.username);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::TempDir;

    use super::*;
    use crate::auth::{DEFAULT_MASTER_PASSWORD, PasswordHasher};
    use crate::store::{SqliteStore, Store};

    fn setup(temp: &TempDir) -> AuthContext {
        let store = SqliteStore::new(temp.path().join("register.db")).unwrap();
        store.initialize().unwrap();
        let hasher = PasswordHasher::new();
        store
            .ensure_auth_settings(&hasher.hash(DEFAULT_MASTER_PASSWORD).unwrap())
            .unwrap();
        AuthContext::init(Arc::new(store), temp.path())
    }

    #[test]
    fn test_enable_bootstraps_exactly_one_admin() {
        let temp = TempDir::new().unwrap();
        let mut auth = setup(&temp);

        let outcome = auth.enable_auth().unwrap();
        let admin = outcome.bootstrapped_admin.expect("bootstrap expected");
        assert_eq!(admin.username, DEFAULT_ADMIN_USERNAME);
        assert_eq!(admin.role, Role::Admin);
        assert!(admin.is_system_user);
        assert_eq!(auth.store().count_users().unwrap(), 1);

        // The documented default credentials work.
        assert!(
            auth.login(DEFAULT_ADMIN_USERNAME, DEFAULT_ADMIN_PASSWORD, false)
                .is_ok()
        );
    }

    #[test]
    fn test_enable_skips_bootstrap_when_users_exist() {
        let temp = TempDir::new().unwrap();
        let mut auth = setup(&temp);

        let hasher = PasswordHasher::new();
        let user = User::new("carol", hasher.hash("pw").unwrap(), "Carol", Role::Admin);
        auth.store().create_user(&user).unwrap();

        let outcome = auth.enable_auth().unwrap();
        assert!(outcome.bootstrapped_admin.is_none());
        assert_eq!(auth.store().count_users().unwrap(), 1);
    }

    #[test]
    fn test_disable_is_idempotent_and_preserves_users() {
        let temp = TempDir::new().unwrap();
        let mut auth = setup(&temp);

        auth.enable_auth().unwrap();
        auth.disable_auth().unwrap();
        auth.disable_auth().unwrap();

        assert!(!auth.auth_settings().auth_enabled);
        assert_eq!(auth.store().count_users().unwrap(), 1);

        // Re-enabling restores the previous account instead of
        // bootstrapping a second one.
        let outcome = auth.enable_auth().unwrap();
        assert!(outcome.bootstrapped_admin.is_none());
    }

    #[test]
    fn test_change_master_password() {
        let temp = TempDir::new().unwrap();
        let mut auth = setup(&temp);
        auth.enable_auth().unwrap();

        assert!(!auth.change_master_password("wrong", "next").unwrap());
        assert!(!auth.auth_settings().master_password_changed);

        assert!(
            auth.change_master_password(DEFAULT_MASTER_PASSWORD, "rotated")
                .unwrap()
        );
        assert!(auth.auth_settings().master_password_changed);

        assert!(matches!(
            auth.login_with_master(DEFAULT_MASTER_PASSWORD),
            Err(crate::error::Error::InvalidCredentials)
        ));
        assert!(auth.login_with_master("rotated").is_ok());
    }

    #[test]
    fn test_change_user_password() {
        let temp = TempDir::new().unwrap();
        let mut auth = setup(&temp);
        let outcome = auth.enable_auth().unwrap();
        let admin = outcome.bootstrapped_admin.unwrap();

        assert!(
            !auth
                .change_user_password(&admin.id, "wrong", "next")
                .unwrap()
        );
        assert!(
            auth.change_user_password(&admin.id, DEFAULT_ADMIN_PASSWORD, "next")
                .unwrap()
        );

        assert!(matches!(
            auth.login(DEFAULT_ADMIN_USERNAME, DEFAULT_ADMIN_PASSWORD, false),
            Err(crate::error::Error::InvalidCredentials)
        ));
        assert!(auth.login(DEFAULT_ADMIN_USERNAME, "next", false).is_ok());
    }
}
