//! OpenPulse Authorization
//!
//! Role- and tenant-scoped authorization for every resource operation.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     AuthzEngine                          │
//! │                                                          │
//! │  superadmin? ──► Allow (cross-tenant permitted)          │
//! │       │                                                  │
//! │  tenant scope ──► Deny(MissingTenantContext)             │
//! │       │           Deny(TenantMismatch)                   │
//! │       ▼                                                  │
//! │  PermissionMatrix (role → {(resource, action)})          │
//! │       │                                                  │
//! │       ▼                                                  │
//! │  Allow │ Deny(InsufficientPermission)                    │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The matrix is built once at startup and immutable afterwards, so every
//! `authorize` call is a pure, lock-free read.

#![warn(missing_docs)]

pub mod engine;
pub mod matrix;
pub mod permission;
pub mod role;
pub mod session;

pub use engine::{AuthzEngine, Decision, DenyReason};
pub use matrix::{MatrixError, PermissionMatrix};
pub use permission::{Action, Permission, Resource};
pub use role::Role;
pub use session::Session;
