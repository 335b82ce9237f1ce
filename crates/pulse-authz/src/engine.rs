//! Authorization Engine
//!
//! Pure allow/deny decisions over the immutable permission matrix. Tenant
//! scope is checked before the permission lookup, so a caller can never
//! learn whether a permission exists for a tenant it cannot access.

use pulse_common::TenantId;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::{Action, PermissionMatrix, Resource, Session};

/// Why an operation was denied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DenyReason {
    /// Session tenant differs from the target tenant
    #[error("tenant scope mismatch")]
    TenantMismatch,
    /// Role lacks the (resource, action) grant
    #[error("insufficient permission")]
    InsufficientPermission,
    /// Non-superadmin session without a tenant scope
    #[error("missing tenant context")]
    MissingTenantContext,
}

/// Outcome of an authorization check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Operation may proceed
    Allow,
    /// Operation is rejected
    Deny(DenyReason),
}

impl Decision {
    /// True for `Allow`
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    /// Convert into a result, surfacing the deny reason as the error.
    pub fn into_result(self) -> Result<(), DenyReason> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => Err(reason),
        }
    }
}

/// Gate for every resource operation
#[derive(Debug, Clone)]
pub struct AuthzEngine {
    matrix: Arc<PermissionMatrix>,
}

impl AuthzEngine {
    /// Build an engine over a startup-validated matrix
    pub fn new(matrix: Arc<PermissionMatrix>) -> Self {
        Self { matrix }
    }

    /// Decide whether `session` may perform `action` on `resource` within
    /// `target_tenant`.
    ///
    /// Superadmin sessions are allowed unconditionally, including across
    /// tenants. For everyone else tenant scope is enforced first, then the
    /// role's permission set.
    pub fn authorize(
        &self,
        session: &Session,
        resource: Resource,
        action: Action,
        target_tenant: TenantId,
    ) -> Decision {
        if session.role.is_superadmin() {
            return Decision::Allow;
        }

        let decision = match session.tenant_id {
            None => Decision::Deny(DenyReason::MissingTenantContext),
            Some(tenant) if tenant != target_tenant => {
                Decision::Deny(DenyReason::TenantMismatch)
            }
            Some(_) => {
                if self.matrix.allows(session.role, resource, action) {
                    Decision::Allow
                } else {
                    Decision::Deny(DenyReason::InsufficientPermission)
                }
            }
        };

        if let Decision::Deny(reason) = decision {
            debug!(
                user = %session.user_id,
                role = ?session.role,
                ?resource,
                ?action,
                %target_tenant,
                %reason,
                "authorization denied"
            );
        }

        decision
    }
}
