use std::sync::Arc;

use chrono::Utc;

use super::PasswordHasher;
use crate::config::DeletionPolicy;
use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::{Role, User};

const MIN_USERNAME_LEN: usize = 3;
const MAX_USERNAME_LEN: usize = 50;
const MAX_DISPLAY_NAME_LEN: usize = 100;

pub struct NewUser {
    pub username: String,
    pub password: String,
    pub display_name: String,
    pub role: Role,
}

/// Partial update. `None` fields keep their current value; a blank
/// password is treated the same as an omitted one.
#[derive(Default)]
pub struct UserUpdate {
    pub display_name: Option<String>,
    pub password: Option<String>,
    pub role: Option<Role>,
}

/// Advisory answer for the pre-deletion confirmation UI. The same check
/// runs again inside `delete_user`; this result must not be trusted across
/// intervening mutations.
#[derive(Debug, Clone)]
pub struct DeletionCheck {
    pub can_delete: bool,
    pub reason: Option<String>,
}

impl DeletionCheck {
    fn allowed() -> Self {
        Self {
            can_delete: true,
            reason: None,
        }
    }

    fn blocked(reason: impl Into<String>) -> Self {
        Self {
            can_delete: false,
            reason: Some(reason.into()),
        }
    }
}

pub struct UserManager {
    store: Arc<dyn Store>,
    hasher: PasswordHasher,
    policy: DeletionPolicy,
}

fn validate_username(username: &str) -> Result<()> {
    if username.len() < MIN_USERNAME_LEN || username.len() > MAX_USERNAME_LEN {
        return Err(Error::Validation(format!(
            "username must be {MIN_USERNAME_LEN}-{MAX_USERNAME_LEN} characters"
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(Error::Validation(
            "username can only contain letters, digits, and underscores".to_string(),
        ));
    }
    Ok(())
}

fn validate_display_name(display_name: &str) -> Result<()> {
    if display_name.trim().is_empty() {
        return Err(Error::Validation("display name cannot be empty".to_string()));
    }
    if display_name.len() > MAX_DISPLAY_NAME_LEN {
        return Err(Error::Validation(format!(
            "display name cannot exceed {MAX_DISPLAY_NAME_LEN} characters"
        )));
    }
    Ok(())
}

impl UserManager {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, policy: DeletionPolicy) -> Self {
        Self {
            store,
            hasher: PasswordHasher::new(),
            policy,
        }
    }

    pub fn create_user(&self, input: NewUser) -> Result<User> {
        validate_username(&input.username)?;
        validate_display_name(&input.display_name)?;

        if self
            .store
            .get_user_by_username(&input.username)?
            .is_some()
        {
            return Err(Error::DuplicateUsername);
        }

        let hash = self.hasher.hash(&input.password)?;
        let user = User::new(input.username, hash, input.display_name, input.role);
        self.store.create_user(&user)?;

        tracing::info!("Created user '{}' with role {}", user.username, user.role);
        Ok(user)
    }

    pub fn update_user(&self, id: &str, update: UserUpdate) -> Result<User> {
        let mut user = self.store.get_user(id)?.ok_or(Error::NotFound)?;

        if let Some(role) = update.role {
            if user.is_system_user && role != user.role {
                return Err(Error::SystemUserProtected);
            }
            user.role = role;
        }

        if let Some(display_name) = update.display_name {
            validate_display_name(&display_name)?;
            user.display_name = display_name;
        }

        match update.password.as_deref() {
            Some(password) if !password.is_empty() => {
                user.password_hash = self.hasher.hash(password)?;
            }
            // Blank or omitted: the existing hash stays.
            _ => {}
        }

        user.updated_at = Utc::now();
        self.store.update_user(&user)?;
        Ok(user)
    }

    /// Advisory check for the confirmation dialog. `current_user_id` is the
    /// id of the authenticated caller, if any.
    pub fn can_delete_user(
        &self,
        id: &str,
        current_user_id: Option<&str>,
    ) -> Result<DeletionCheck> {
        let user = self.store.get_user(id)?.ok_or(Error::NotFound)?;

        if current_user_id == Some(id) {
            return Ok(DeletionCheck::blocked(
                "you cannot delete the account you are logged in with",
            ));
        }

        if user.role.is_admin() && self.store.count_admins()? <= 1 {
            return Ok(DeletionCheck::blocked(
                "the last remaining admin account cannot be deleted",
            ));
        }

        if user.is_system_user && self.policy == DeletionPolicy::ProtectSystemUser {
            return Ok(DeletionCheck::blocked(
                "the system account cannot be deleted under the current policy",
            ));
        }

        Ok(DeletionCheck::allowed())
    }

    /// Deletes a user. The deletion invariants are re-checked here; the
    /// advisory `can_delete_user` result may have gone stale in between.
    pub fn delete_user(&self, id: &str, current_user_id: Option<&str>) -> Result<()> {
        let check = self.can_delete_user(id, current_user_id)?;
        if !check.can_delete {
            return Err(Error::DeletionBlocked(
                check.reason.unwrap_or_else(|| "deletion not allowed".to_string()),
            ));
        }

        if !self.store.delete_user(id)? {
            return Err(Error::NotFound);
        }

        tracing::info!("Deleted user {id}");
        Ok(())
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        self.store.list_users()
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.store.get_user_by_username(username)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    use crate::store::SqliteStore;

    fn setup(temp: &TempDir, policy: DeletionPolicy) -> UserManager {
        let store = SqliteStore::new(temp.path().join("register.db")).unwrap();
        store.initialize().unwrap();
        UserManager::new(Arc::new(store), policy)
    }

    fn new_user(username: &str, role: Role) -> NewUser {
        NewUser {
            username: username.to_string(),
            password: "s3cret".to_string(),
            display_name: username.to_string(),
            role,
        }
    }

    #[test]
    fn test_create_user_validates_shape() {
        let temp = TempDir::new().unwrap();
        let manager = setup(&temp, DeletionPolicy::default());

        assert!(matches!(
            manager.create_user(new_user("ab", Role::Viewer)),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            manager.create_user(new_user("has space", Role::Viewer)),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            manager.create_user(new_user(&"x".repeat(51), Role::Viewer)),
            Err(Error::Validation(_))
        ));

        let user = manager.create_user(new_user("dave_1", Role::Editor)).unwrap();
        assert!(!user.is_system_user);
        assert!(user.password_hash.starts_with("$argon2id$"));
    }

    #[test]
    fn test_duplicate_username_case_insensitive() {
        let temp = TempDir::new().unwrap();
        let manager = setup(&temp, DeletionPolicy::default());

        manager.create_user(new_user("alice", Role::Viewer)).unwrap();
        assert!(matches!(
            manager.create_user(new_user("ALICE", Role::Viewer)),
            Err(Error::DuplicateUsername)
        ));
    }

    #[test]
    fn test_update_partial_and_blank_password() {
        let temp = TempDir::new().unwrap();
        let manager = setup(&temp, DeletionPolicy::default());

        let user = manager.create_user(new_user("alice", Role::Viewer)).unwrap();
        let original_hash = user.password_hash.clone();

        let updated = manager
            .update_user(
                &user.id,
                UserUpdate {
                    display_name: Some("Alice A.".to_string()),
                    password: Some(String::new()),
                    role: Some(Role::Editor),
                },
            )
            .unwrap();

        assert_eq!(updated.display_name, "Alice A.");
        assert_eq!(updated.role, Role::Editor);
        assert_eq!(updated.password_hash, original_hash);
        assert!(updated.updated_at >= user.updated_at);
    }

    fn create_system_admin(manager: &UserManager, username: &str) -> User {
        let hasher = PasswordHasher::new();
        let mut user = User::new(username, hasher.hash("s3cret").unwrap(), username, Role::Admin);
        user.is_system_user = true;
        manager.store.create_user(&user).unwrap();
        user
    }

    #[test]
    fn test_system_user_role_change_rejected() {
        let temp = TempDir::new().unwrap();
        let manager = setup(&temp, DeletionPolicy::default());

        let user = create_system_admin(&manager, "sysadmin");

        let result = manager.update_user(
            &user.id,
            UserUpdate {
                role: Some(Role::Viewer),
                ..UserUpdate::default()
            },
        );
        assert!(matches!(result, Err(Error::SystemUserProtected)));

        // Same-role "change" and other fields are still allowed.
        assert!(
            manager
                .update_user(
                    &user.id,
                    UserUpdate {
                        role: Some(Role::Admin),
                        display_name: Some("Ops".to_string()),
                        ..UserUpdate::default()
                    },
                )
                .is_ok()
        );
    }

    #[test]
    fn test_self_deletion_blocked() {
        let temp = TempDir::new().unwrap();
        let manager = setup(&temp, DeletionPolicy::default());

        let alice = manager.create_user(new_user("alice", Role::Admin)).unwrap();
        manager.create_user(new_user("bob", Role::Admin)).unwrap();

        let check = manager.can_delete_user(&alice.id, Some(&alice.id)).unwrap();
        assert!(!check.can_delete);
        assert!(check.reason.unwrap().contains("logged in"));

        assert!(matches!(
            manager.delete_user(&alice.id, Some(&alice.id)),
            Err(Error::DeletionBlocked(_))
        ));
    }

    #[test]
    fn test_last_admin_deletion_blocked() {
        let temp = TempDir::new().unwrap();
        let manager = setup(&temp, DeletionPolicy::default());

        let admin = manager.create_user(new_user("admin1", Role::Admin)).unwrap();
        let viewer = manager.create_user(new_user("viewer1", Role::Viewer)).unwrap();

        let check = manager.can_delete_user(&admin.id, None).unwrap();
        assert!(!check.can_delete);
        assert!(check.reason.unwrap().contains("admin"));

        // Non-admins are deletable even when only one admin exists.
        manager.delete_user(&viewer.id, None).unwrap();

        // A second admin unblocks deletion of the first.
        manager.create_user(new_user("admin2", Role::Admin)).unwrap();
        manager.delete_user(&admin.id, None).unwrap();
        assert_eq!(manager.store.count_admins().unwrap(), 1);
    }

    #[test]
    fn test_system_user_policy() {
        let temp = TempDir::new().unwrap();
        let manager = setup(&temp, DeletionPolicy::ProtectSystemUser);

        let sys = create_system_admin(&manager, "sysadmin");
        manager.create_user(new_user("admin2", Role::Admin)).unwrap();

        let check = manager.can_delete_user(&sys.id, None).unwrap();
        assert!(!check.can_delete);

        // Under the default policy the same setup allows deletion.
        let relaxed = UserManager::new(manager.store.clone(), DeletionPolicy::AnyAdminRemains);
        assert!(relaxed.can_delete_user(&sys.id, None).unwrap().can_delete);
    }

    #[test]
    fn test_delete_missing_user() {
        let temp = TempDir::new().unwrap();
        let manager = setup(&temp, DeletionPolicy::default());
        assert!(matches!(
            manager.delete_user("no-such-id", None),
            Err(Error::NotFound)
        ));
    }
}
