//! Permission Matrix
//!
//! Immutable role → permission-set mapping, built once from a fixed table.
//! A role without an explicit, non-empty entry is a configuration error at
//! startup, never an implicit deny at request time.

use std::collections::{HashMap, HashSet};
use thiserror::Error;

use crate::{Action, Permission, Resource, Role};

/// Matrix construction failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatrixError {
    /// A role is missing from the table
    #[error("no permission entry for role {0:?}")]
    MissingRole(Role),
    /// A role has an explicit but empty entry
    #[error("empty permission entry for role {0:?}")]
    EmptyRole(Role),
    /// A role appears more than once in the table
    #[error("duplicate permission entry for role {0:?}")]
    DuplicateRole(Role),
}

/// Read-only role → permission-set lookup
#[derive(Debug)]
pub struct PermissionMatrix {
    grants: HashMap<Role, HashSet<Permission>>,
}

impl PermissionMatrix {
    /// Build a matrix from an explicit table, failing fast on missing,
    /// empty or duplicate role entries.
    pub fn from_table(
        table: &[(Role, &[Permission])],
    ) -> Result<Self, MatrixError> {
        let mut grants: HashMap<Role, HashSet<Permission>> = HashMap::new();

        for (role, perms) in table {
            if grants.contains_key(role) {
                return Err(MatrixError::DuplicateRole(*role));
            }
            if perms.is_empty() {
                return Err(MatrixError::EmptyRole(*role));
            }
            grants.insert(*role, perms.iter().copied().collect());
        }

        for role in Role::ALL {
            if !grants.contains_key(&role) {
                return Err(MatrixError::MissingRole(role));
            }
        }

        Ok(Self { grants })
    }

    /// The platform's built-in matrix.
    pub fn builtin() -> Result<Self, MatrixError> {
        use Action::*;
        use Resource::*;

        const fn p(resource: Resource, action: Action) -> Permission {
            Permission::new(resource, action)
        }

        // Superadmin carries every grant explicitly even though the engine
        // short-circuits for it; the coverage invariant holds uniformly.
        const FULL: &[Permission] = &[
            p(Subscribers, Read),
            p(Subscribers, Create),
            p(Subscribers, Update),
            p(Subscribers, Delete),
            p(Campaigns, Read),
            p(Campaigns, Create),
            p(Campaigns, Update),
            p(Campaigns, Delete),
            p(Domains, Read),
            p(Domains, Create),
            p(Domains, Update),
            p(Domains, Delete),
            p(Tickets, Read),
            p(Tickets, Create),
            p(Tickets, Update),
            p(Tickets, Delete),
        ];

        const MANAGER: &[Permission] = &[
            p(Subscribers, Read),
            p(Subscribers, Create),
            p(Subscribers, Update),
            p(Subscribers, Delete),
            p(Campaigns, Read),
            p(Campaigns, Create),
            p(Campaigns, Update),
            p(Campaigns, Delete),
            p(Domains, Read),
            p(Tickets, Read),
            p(Tickets, Create),
        ];

        const ANALYST: &[Permission] = &[
            p(Subscribers, Read),
            p(Campaigns, Read),
            p(Domains, Read),
            p(Tickets, Read),
        ];

        const SUPPORT: &[Permission] = &[
            p(Tickets, Read),
            p(Tickets, Create),
            p(Tickets, Update),
            p(Subscribers, Read),
        ];

        Self::from_table(&[
            (Role::SuperAdmin, FULL),
            (Role::Admin, FULL),
            (Role::Manager, MANAGER),
            (Role::Analyst, ANALYST),
            (Role::Support, SUPPORT),
        ])
    }

    /// Permission set for a role.
    pub fn permissions_for(&self, role: Role) -> &HashSet<Permission> {
        // Coverage of every role is validated in from_table.
        self.grants
            .get(&role)
            .expect("role coverage validated at construction")
    }

    /// Whether a role holds a specific (resource, action) grant.
    pub fn allows(&self, role: Role, resource: Resource, action: Action) -> bool {
        self.permissions_for(role)
            .contains(&Permission::new(resource, action))
    }
}
