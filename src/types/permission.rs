use std::fmt;

use serde::{Deserialize, Serialize};

/// Account role. The permission matrix is fixed; roles are closed variants
/// rather than configurable permission strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Editor,
    Viewer,
}

/// An action a caller may be gated on. String forms exist only at the
/// outer interface boundary (CLI flags, serialized settings).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ViewSuppliers,
    EditSuppliers,
    DeleteSuppliers,
    ViewReporting,
    EditIssues,
    ManageUsers,
    ManageAuth,
}

impl Role {
    /// Returns true if this role grants the given action.
    #[must_use]
    pub const fn allows(self, action: Action) -> bool {
        match self {
            Role::Admin => true,
            Role::Editor => matches!(
                action,
                Action::ViewSuppliers
                    | Action::EditSuppliers
                    | Action::DeleteSuppliers
                    | Action::ViewReporting
                    | Action::EditIssues
            ),
            Role::Viewer => matches!(action, Action::ViewSuppliers | Action::ViewReporting),
        }
    }

    #[must_use]
    pub const fn is_admin(self) -> bool {
        matches!(self, Role::Admin)
    }

    /// Editor-or-admin: every role that may modify register content.
    #[must_use]
    pub const fn is_editor(self) -> bool {
        matches!(self, Role::Admin | Role::Editor)
    }

    #[must_use]
    pub const fn is_viewer(self) -> bool {
        matches!(self, Role::Viewer)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Editor => "editor",
            Role::Viewer => "viewer",
        }
    }

    /// Converts a stored role string back to its variant.
    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "admin" => Some(Role::Admin),
            "editor" => Some(Role::Editor),
            "viewer" => Some(Role::Viewer),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_allows_everything() {
        for action in [
            Action::ViewSuppliers,
            Action::EditSuppliers,
            Action::DeleteSuppliers,
            Action::ViewReporting,
            Action::EditIssues,
            Action::ManageUsers,
            Action::ManageAuth,
        ] {
            assert!(Role::Admin.allows(action));
        }
    }

    #[test]
    fn test_editor_matrix() {
        assert!(Role::Editor.allows(Action::ViewSuppliers));
        assert!(Role::Editor.allows(Action::EditSuppliers));
        assert!(Role::Editor.allows(Action::DeleteSuppliers));
        assert!(Role::Editor.allows(Action::ViewReporting));
        assert!(Role::Editor.allows(Action::EditIssues));
        assert!(!Role::Editor.allows(Action::ManageUsers));
        assert!(!Role::Editor.allows(Action::ManageAuth));
    }

    #[test]
    fn test_viewer_matrix() {
        assert!(Role::Viewer.allows(Action::ViewSuppliers));
        assert!(Role::Viewer.allows(Action::ViewReporting));
        assert!(!Role::Viewer.allows(Action::EditSuppliers));
        assert!(!Role::Viewer.allows(Action::DeleteSuppliers));
        assert!(!Role::Viewer.allows(Action::EditIssues));
        assert!(!Role::Viewer.allows(Action::ManageUsers));
        assert!(!Role::Viewer.allows(Action::ManageAuth));
    }

    #[test]
    fn test_parse_round_trip() {
        for role in [Role::Admin, Role::Editor, Role::Viewer] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("superuser"), None);
    }

    #[test]
    fn test_editor_predicate_includes_admin() {
        assert!(Role::Admin.is_editor());
        assert!(Role::Editor.is_editor());
        assert!(!Role::Viewer.is_editor());
    }
}
