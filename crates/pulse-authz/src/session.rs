//! Session type
//!
//! Produced by an external authentication collaborator; immutable for the
//! duration of one operation. There is no ambient "current session" - every
//! operation takes its session explicitly.

use pulse_common::{TenantId, UserId};
use serde::{Deserialize, Serialize};

use crate::Role;

/// Authenticated caller identity for one operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Authenticated user
    pub user_id: UserId,
    /// Role the user holds
    pub role: Role,
    /// Tenant the session is scoped to. Only superadmin sessions may
    /// legitimately lack one.
    pub tenant_id: Option<TenantId>,
}

impl Session {
    /// Tenant-scoped session
    pub fn new(user_id: UserId, role: Role, tenant_id: TenantId) -> Self {
        Self {
            user_id,
            role,
            tenant_id: Some(tenant_id),
        }
    }

    /// Platform-level session without a tenant scope
    pub fn platform(user_id: UserId, role: Role) -> Self {
        Self {
            user_id,
            role,
            tenant_id: None,
        }
    }
}
