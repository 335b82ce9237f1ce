//! Permission primitives
//!
//! A permission is the pair of "what" (resource) and "what kind of
//! operation" (action). Both axes are closed enums; permissions are
//! immutable value types with structural equality.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Resource axis of the permission matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    /// Subscriber population, fields and segments
    Subscribers,
    /// Email/SMS campaigns
    Campaigns,
    /// Sending domains
    Domains,
    /// Support tickets
    Tickets,
}

/// Action axis of the permission matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Read / list
    Read,
    /// Create new records
    Create,
    /// Modify existing records
    Update,
    /// Remove records
    Delete,
}

/// A single (resource, action) grant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permission {
    /// What the grant applies to
    pub resource: Resource,
    /// What kind of operation it permits
    pub action: Action,
}

impl Permission {
    /// Create a permission value
    pub const fn new(resource: Resource, action: Action) -> Self {
        Self { resource, action }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}:{:?}", self.resource, self.action)
    }
}
