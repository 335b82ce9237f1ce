//! Service-level error taxonomy

use pulse_authz::DenyReason;
use pulse_common::SegmentId;
use thiserror::Error;

use crate::compiler::ValidationError;
use crate::fields::FieldError;
use crate::store::StoreError;

/// Failure of a segmentation operation.
///
/// `Transient` failures are safe to retry and never clobber cached state;
/// `Internal` marks invariant violations that must not be swallowed.
#[derive(Debug, Clone, Error)]
pub enum SegmentError {
    /// No valid session accompanied the request. Raised by embedding
    /// layers; the core itself always receives a typed session.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Authenticated but denied by the authorization engine
    #[error("forbidden: {0}")]
    Forbidden(#[from] DenyReason),
    /// Malformed filter tree
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Custom-field registration rejected
    #[error("invalid field: {0}")]
    Field(#[from] FieldError),
    /// No such segment within the tenant scope
    #[error("segment {0} not found")]
    NotFound(SegmentId),
    /// Subscriber store unavailable or deadline exceeded; cache untouched
    #[error("transient failure: {0}")]
    Transient(#[from] StoreError),
    /// Unexpected invariant violation
    #[error("internal error: {0}")]
    Internal(String),
}
