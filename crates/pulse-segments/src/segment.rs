//! Segment Model & Persistence
//!
//! A segment is a named, persisted audience definition: a validated filter
//! tree plus derived, recomputable count state. The repository trait is the
//! only path to storage; everything is scoped by tenant.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use pulse_common::{SegmentId, TenantId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::filter::FilterNode;

/// Refresh state of a segment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshStatus {
    /// No recomputation in flight
    #[default]
    Idle,
    /// A count recomputation is running
    Refreshing,
}

/// Named audience definition owned by a tenant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    /// Unique segment ID
    pub id: SegmentId,
    /// Owning tenant
    pub tenant_id: TenantId,
    /// Display name
    pub name: String,
    /// Validated filter definition
    pub filter: FilterNode,
    /// Last computed member count. Derived state - never segment identity.
    pub cached_count: Option<u64>,
    /// When the count was last recomputed
    pub last_refreshed_at: Option<DateTime<Utc>>,
    /// Whether a recomputation is in flight
    pub refresh_status: RefreshStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl Segment {
    /// Fresh segment with no cached count
    pub fn new(tenant_id: TenantId, name: impl Into<String>, filter: FilterNode) -> Self {
        let now = Utc::now();
        Self {
            id: SegmentId::new_v4(),
            tenant_id,
            name: name.into(),
            filter,
            cached_count: None,
            last_refreshed_at: None,
            refresh_status: RefreshStatus::Idle,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Repository failure
#[derive(Debug, Clone, Error)]
pub enum RepoError {
    /// No segment with that id within the tenant scope
    #[error("segment not found")]
    NotFound,
    /// Create collided with an existing id
    #[error("segment already exists")]
    Conflict,
    /// Backend failure
    #[error("storage error: {0}")]
    Storage(String),
}

/// Segment persistence, scoped by tenant
#[async_trait]
pub trait SegmentRepository: Send + Sync {
    /// Persist a new segment
    async fn create(&self, segment: &Segment) -> Result<(), RepoError>;

    /// Load a segment within the tenant scope
    async fn get(&self, tenant_id: TenantId, id: SegmentId) -> Result<Segment, RepoError>;

    /// Replace a stored segment
    async fn update(&self, segment: &Segment) -> Result<(), RepoError>;

    /// Remove a segment within the tenant scope
    async fn delete(&self, tenant_id: TenantId, id: SegmentId) -> Result<(), RepoError>;

    /// All segments of a tenant, oldest first
    async fn list(&self, tenant_id: TenantId) -> Result<Vec<Segment>, RepoError>;
}

/// In-memory repository for development and tests
#[derive(Default)]
pub struct InMemorySegmentRepository {
    segments: RwLock<HashMap<(TenantId, SegmentId), Segment>>,
}

impl InMemorySegmentRepository {
    /// Empty repository
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SegmentRepository for InMemorySegmentRepository {
    async fn create(&self, segment: &Segment) -> Result<(), RepoError> {
        let mut segments = self.segments.write();
        let key = (segment.tenant_id, segment.id);
        if segments.contains_key(&key) {
            return Err(RepoError::Conflict);
        }
        segments.insert(key, segment.clone());
        Ok(())
    }

    async fn get(&self, tenant_id: TenantId, id: SegmentId) -> Result<Segment, RepoError> {
        self.segments
            .read()
            .get(&(tenant_id, id))
            .cloned()
            .ok_or(RepoError::NotFound)
    }

    async fn update(&self, segment: &Segment) -> Result<(), RepoError> {
        let mut segments = self.segments.write();
        let key = (segment.tenant_id, segment.id);
        if !segments.contains_key(&key) {
            return Err(RepoError::NotFound);
        }
        segments.insert(key, segment.clone());
        Ok(())
    }

    async fn delete(&self, tenant_id: TenantId, id: SegmentId) -> Result<(), RepoError> {
        self.segments
            .write()
            .remove(&(tenant_id, id))
            .map(|_| ())
            .ok_or(RepoError::NotFound)
    }

    async fn list(&self, tenant_id: TenantId) -> Result<Vec<Segment>, RepoError> {
        let mut out: Vec<_> = self
            .segments
            .read()
            .values()
            .filter(|s| s.tenant_id == tenant_id)
            .cloned()
            .collect();
        out.sort_by_key(|s| s.created_at);
        Ok(out)
    }
}
