mod password;
mod remember;
mod session;
mod settings;
mod users;

pub use password::PasswordHasher;
pub use remember::SessionFile;
pub use session::AuthContext;
pub use settings::EnableOutcome;
pub use users::{DeletionCheck, NewUser, UserManager, UserUpdate};

/// Username of the account auto-provisioned when authentication is first
/// enabled on a store with no users.
pub const DEFAULT_ADMIN_USERNAME: &str = "admin";

/// Documented factory default for the bootstrap admin. Operators are told
/// to rotate it immediately after enabling authentication.
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin";

/// Documented factory default for the master recovery password. The
/// `master_password_changed` flag tracks whether it has been rotated.
pub const DEFAULT_MASTER_PASSWORD: &str = "master";
