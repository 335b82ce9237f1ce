//! Subscriber Store
//!
//! Narrow interface to the subscriber population. The core only ever asks
//! for a single predicate-driven pass over one tenant's records; the
//! backend behind the trait is a black box.

use async_trait::async_trait;
use dashmap::DashMap;
use pulse_common::{SubscriberId, SubscriberRecord, TenantId};
use std::time::Duration;
use thiserror::Error;

use crate::compiler::CompiledPredicate;

/// Transient store failure - safe for the caller to retry
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Backend unreachable or failing
    #[error("subscriber store unavailable: {0}")]
    Unavailable(String),
    /// The caller-supplied deadline elapsed before the scan finished
    #[error("subscriber scan deadline exceeded")]
    DeadlineExceeded,
}

/// Queryable subscriber population, scoped per tenant
#[async_trait]
pub trait SubscriberStore: Send + Sync {
    /// Count the tenant's records matching the predicate in one pass.
    async fn scan_count(
        &self,
        tenant_id: TenantId,
        predicate: &CompiledPredicate,
        deadline: Duration,
    ) -> Result<u64, StoreError>;

    /// Collect the ids of the tenant's matching records.
    async fn scan_members(
        &self,
        tenant_id: TenantId,
        predicate: &CompiledPredicate,
        deadline: Duration,
    ) -> Result<Vec<SubscriberId>, StoreError>;
}

/// In-memory store for development and tests
#[derive(Default)]
pub struct InMemorySubscriberStore {
    records: DashMap<TenantId, Vec<SubscriberRecord>>,
}

impl InMemorySubscriberStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one record under its tenant
    pub fn insert(&self, record: SubscriberRecord) {
        self.records
            .entry(record.tenant_id)
            .or_default()
            .push(record);
    }

    /// Number of records held for a tenant
    pub fn len(&self, tenant_id: TenantId) -> usize {
        self.records.get(&tenant_id).map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl SubscriberStore for InMemorySubscriberStore {
    // The in-memory scan completes in one synchronous pass; the deadline
    // parameter only matters for remote backends.
    async fn scan_count(
        &self,
        tenant_id: TenantId,
        predicate: &CompiledPredicate,
        _deadline: Duration,
    ) -> Result<u64, StoreError> {
        let count = self
            .records
            .get(&tenant_id)
            .map(|records| records.iter().filter(|r| predicate.matches(r)).count())
            .unwrap_or(0);
        Ok(count as u64)
    }

    async fn scan_members(
        &self,
        tenant_id: TenantId,
        predicate: &CompiledPredicate,
        _deadline: Duration,
    ) -> Result<Vec<SubscriberId>, StoreError> {
        let members = self
            .records
            .get(&tenant_id)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| predicate.matches(r))
                    .map(|r| r.id)
                    .collect()
            })
            .unwrap_or_default();
        Ok(members)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::FilterCompiler;
    use crate::fields::FieldRegistry;
    use crate::filter::{FilterNode, Operator};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_scan_is_tenant_scoped() {
        let store = InMemorySubscriberStore::new();
        let tenant_a = TenantId::new_v4();
        let tenant_b = TenantId::new_v4();

        store.insert(SubscriberRecord::new(tenant_a).with("country", "US"));
        store.insert(SubscriberRecord::new(tenant_b).with("country", "US"));

        let compiler = FilterCompiler::new(Arc::new(FieldRegistry::new()));
        let plan = compiler
            .compile(
                &FilterNode::condition("country", Operator::Eq, "US"),
                tenant_a,
            )
            .unwrap();

        let count = store
            .scan_count(tenant_a, &plan, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_scan_members_returns_matching_ids() {
        let store = InMemorySubscriberStore::new();
        let tenant = TenantId::new_v4();

        let hit = SubscriberRecord::new(tenant).with("active", true);
        let hit_id = hit.id;
        store.insert(hit);
        store.insert(SubscriberRecord::new(tenant).with("active", false));

        let compiler = FilterCompiler::new(Arc::new(FieldRegistry::new()));
        let plan = compiler
            .compile(&FilterNode::condition("active", Operator::Eq, true), tenant)
            .unwrap();

        let members = store
            .scan_members(tenant, &plan, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(members, vec![hit_id]);
    }
}
