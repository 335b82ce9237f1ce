//! OpenPulse Common - Shared types for the multi-tenant audience platform
//!
//! This crate provides the identifiers and the subscriber data model shared
//! by the authorization and segmentation crates:
//! - Tenant/user/segment/subscriber ids
//! - Typed subscriber attribute values
//! - The subscriber record the segmentation engine evaluates against

#![warn(missing_docs)]

pub mod subscriber;

pub use subscriber::{FieldValue, SubscriberRecord};

use uuid::Uuid;

/// Tenant ID - every resource is scoped to exactly one tenant
pub type TenantId = Uuid;

/// User ID
pub type UserId = Uuid;

/// Segment ID
pub type SegmentId = Uuid;

/// Subscriber ID
pub type SubscriberId = Uuid;
