//! Role catalog

use serde::{Deserialize, Serialize};

/// Closed set of roles a session can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Platform operator - bypasses tenant scoping entirely
    SuperAdmin,
    /// Tenant administrator
    Admin,
    /// Campaign/audience manager
    Manager,
    /// Read-only analytics user
    Analyst,
    /// Support agent
    Support,
}

impl Role {
    /// Every enumerated role. The permission matrix constructor checks
    /// this list for coverage.
    pub const ALL: [Role; 5] = [
        Role::SuperAdmin,
        Role::Admin,
        Role::Manager,
        Role::Analyst,
        Role::Support,
    ];

    /// Whether this is the platform-superadmin role
    pub fn is_superadmin(&self) -> bool {
        matches!(self, Role::SuperAdmin)
    }
}
