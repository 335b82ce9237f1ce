//! Segment Service
//!
//! The authorized façade over the segmentation pipeline. Every operation
//! authorizes first; only then does the request reach the compiler and the
//! evaluator, so a denied caller costs no compilation or scan work and
//! learns nothing about another tenant's resources.

use pulse_authz::{Action, AuthzEngine, Resource, Session};
use pulse_common::{SegmentId, SubscriberId, TenantId};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::compiler::FilterCompiler;
use crate::error::SegmentError;
use crate::evaluator::{EvaluatorConfig, SegmentEvaluator};
use crate::fields::{FieldDefinition, FieldRegistry};
use crate::filter::FilterNode;
use crate::segment::{RepoError, Segment, SegmentRepository};
use crate::store::SubscriberStore;

/// Service tuning
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Deadline applied to subscriber-store scans
    pub scan_deadline: Duration,
    /// Capacity of the compiled-plan cache
    pub plan_cache_capacity: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        let evaluator = EvaluatorConfig::default();
        Self {
            scan_deadline: evaluator.scan_deadline,
            plan_cache_capacity: evaluator.plan_cache_capacity,
        }
    }
}

/// Authorized segmentation operations for one deployment
pub struct SegmentService {
    authz: AuthzEngine,
    registry: Arc<FieldRegistry>,
    compiler: FilterCompiler,
    repo: Arc<dyn SegmentRepository>,
    evaluator: Arc<SegmentEvaluator>,
    config: ServiceConfig,
}

impl SegmentService {
    /// Wire the service over its collaborators
    pub fn new(
        authz: AuthzEngine,
        registry: Arc<FieldRegistry>,
        repo: Arc<dyn SegmentRepository>,
        store: Arc<dyn SubscriberStore>,
        config: ServiceConfig,
    ) -> Self {
        let compiler = FilterCompiler::new(Arc::clone(&registry));
        let evaluator = Arc::new(SegmentEvaluator::new(
            store,
            Arc::clone(&repo),
            compiler.clone(),
            EvaluatorConfig {
                scan_deadline: config.scan_deadline,
                plan_cache_capacity: config.plan_cache_capacity,
            },
        ));
        Self {
            authz,
            registry,
            compiler,
            repo,
            evaluator,
            config,
        }
    }

    fn authorize(
        &self,
        session: &Session,
        action: Action,
        tenant_id: TenantId,
    ) -> Result<(), SegmentError> {
        self.authz
            .authorize(session, Resource::Subscribers, action, tenant_id)
            .into_result()
            .map_err(SegmentError::from)
    }

    /// Merged field catalog for a tenant
    pub fn list_fields(
        &self,
        session: &Session,
        tenant_id: TenantId,
    ) -> Result<Vec<FieldDefinition>, SegmentError> {
        self.authorize(session, Action::Read, tenant_id)?;
        Ok(self.registry.fields_for(tenant_id))
    }

    /// Register a tenant custom field
    pub fn register_field(
        &self,
        session: &Session,
        tenant_id: TenantId,
        definition: FieldDefinition,
    ) -> Result<(), SegmentError> {
        self.authorize(session, Action::Update, tenant_id)?;
        self.registry.register_custom(tenant_id, definition)?;
        Ok(())
    }

    /// Create a segment from a validated filter tree
    pub async fn create_segment(
        &self,
        session: &Session,
        tenant_id: TenantId,
        name: impl Into<String>,
        filter: FilterNode,
    ) -> Result<Segment, SegmentError> {
        self.authorize(session, Action::Update, tenant_id)?;
        // All-or-nothing: nothing is persisted unless the whole tree
        // validates.
        self.compiler.compile(&filter, tenant_id)?;

        let segment = Segment::new(tenant_id, name, filter);
        self.repo
            .create(&segment)
            .await
            .map_err(|e| map_repo(e, segment.id))?;
        info!(%tenant_id, segment = %segment.id, name = %segment.name, "segment created");
        Ok(segment)
    }

    /// Rename a segment and/or replace its filter.
    ///
    /// Replacing the filter clears the derived count state: a cached count
    /// must not describe a filter it was not computed from.
    pub async fn update_segment(
        &self,
        session: &Session,
        tenant_id: TenantId,
        id: SegmentId,
        name: Option<String>,
        filter: Option<FilterNode>,
    ) -> Result<Segment, SegmentError> {
        self.authorize(session, Action::Update, tenant_id)?;

        let mut segment = self
            .repo
            .get(tenant_id, id)
            .await
            .map_err(|e| map_repo(e, id))?;

        if let Some(filter) = filter {
            self.compiler.compile(&filter, tenant_id)?;
            segment.filter = filter;
            segment.cached_count = None;
            segment.last_refreshed_at = None;
            self.evaluator.invalidate_plan(tenant_id, id);
        }
        if let Some(name) = name {
            segment.name = name;
        }
        segment.updated_at = chrono::Utc::now();

        self.repo
            .update(&segment)
            .await
            .map_err(|e| map_repo(e, id))?;
        Ok(segment)
    }

    /// Delete a segment, waiting out any in-flight refresh so a straggling
    /// scan cannot mutate a record that no longer exists.
    pub async fn delete_segment(
        &self,
        session: &Session,
        tenant_id: TenantId,
        id: SegmentId,
    ) -> Result<(), SegmentError> {
        self.authorize(session, Action::Delete, tenant_id)?;

        // Resolve within tenant scope before anything else.
        self.repo
            .get(tenant_id, id)
            .await
            .map_err(|e| map_repo(e, id))?;

        self.evaluator.await_inflight(tenant_id, id).await;
        self.evaluator.invalidate_plan(tenant_id, id);
        self.repo
            .delete(tenant_id, id)
            .await
            .map_err(|e| map_repo(e, id))?;
        info!(%tenant_id, segment = %id, "segment deleted");
        Ok(())
    }

    /// Load one segment
    pub async fn get_segment(
        &self,
        session: &Session,
        tenant_id: TenantId,
        id: SegmentId,
    ) -> Result<Segment, SegmentError> {
        self.authorize(session, Action::Read, tenant_id)?;
        self.repo
            .get(tenant_id, id)
            .await
            .map_err(|e| map_repo(e, id))
    }

    /// All segments of a tenant, oldest first
    pub async fn list_segments(
        &self,
        session: &Session,
        tenant_id: TenantId,
    ) -> Result<Vec<Segment>, SegmentError> {
        self.authorize(session, Action::Read, tenant_id)?;
        self.repo
            .list(tenant_id)
            .await
            .map_err(|e| SegmentError::Internal(e.to_string()))
    }

    /// Recompute a segment's cached count, joining any refresh already in
    /// flight. `deadline` bounds the scan; `None` uses the configured
    /// default.
    pub async fn refresh_segment(
        &self,
        session: &Session,
        tenant_id: TenantId,
        id: SegmentId,
        deadline: Option<Duration>,
    ) -> Result<Segment, SegmentError> {
        self.authorize(session, Action::Update, tenant_id)?;
        let deadline = deadline.unwrap_or(self.config.scan_deadline);
        self.evaluator.refresh(tenant_id, id, deadline).await
    }

    /// Ad-hoc count of the subscribers matching a filter tree; nothing is
    /// persisted.
    pub async fn evaluate_segment(
        &self,
        session: &Session,
        tenant_id: TenantId,
        filter: &FilterNode,
    ) -> Result<u64, SegmentError> {
        self.authorize(session, Action::Read, tenant_id)?;
        let plan = self.compiler.compile(filter, tenant_id)?;
        let count = self
            .evaluator
            .count(&plan, tenant_id, self.config.scan_deadline)
            .await?;
        Ok(count)
    }

    /// Ad-hoc member set of the subscribers matching a filter tree
    pub async fn segment_members(
        &self,
        session: &Session,
        tenant_id: TenantId,
        filter: &FilterNode,
    ) -> Result<Vec<SubscriberId>, SegmentError> {
        self.authorize(session, Action::Read, tenant_id)?;
        let plan = self.compiler.compile(filter, tenant_id)?;
        let members = self
            .evaluator
            .members(&plan, tenant_id, self.config.scan_deadline)
            .await?;
        Ok(members)
    }
}

fn map_repo(err: RepoError, id: SegmentId) -> SegmentError {
    match err {
        RepoError::NotFound => SegmentError::NotFound(id),
        other => SegmentError::Internal(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::CompiledPredicate;
    use crate::fields::FieldKind;
    use crate::filter::Operator;
    use crate::segment::InMemorySegmentRepository;
    use crate::store::{InMemorySubscriberStore, StoreError};
    use async_trait::async_trait;
    use pulse_authz::{DenyReason, PermissionMatrix, Role};
    use pulse_common::{SubscriberRecord, UserId};
    use std::sync::atomic::{AtomicU64, Ordering};
    use tokio::sync::Notify;

    struct Fixture {
        service: Arc<SegmentService>,
        store: Arc<InMemorySubscriberStore>,
        repo: Arc<InMemorySegmentRepository>,
        tenant: TenantId,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemorySubscriberStore::new());
        let repo = Arc::new(InMemorySegmentRepository::new());
        let authz = AuthzEngine::new(Arc::new(PermissionMatrix::builtin().unwrap()));
        let service = Arc::new(SegmentService::new(
            authz,
            Arc::new(FieldRegistry::new()),
            repo.clone(),
            store.clone(),
            ServiceConfig::default(),
        ));
        Fixture {
            service,
            store,
            repo,
            tenant: TenantId::new_v4(),
        }
    }

    fn seed_population(store: &InMemorySubscriberStore, tenant: TenantId) {
        store.insert(
            SubscriberRecord::new(tenant)
                .with("country", "US")
                .with("active", true),
        );
        store.insert(
            SubscriberRecord::new(tenant)
                .with("country", "FR")
                .with("active", false),
        );
        store.insert(
            SubscriberRecord::new(tenant)
                .with("country", "US")
                .with("active", true),
        );
    }

    fn us_actives() -> FilterNode {
        FilterNode::all(vec![
            FilterNode::condition("country", Operator::Eq, "US"),
            FilterNode::condition("active", Operator::Eq, true),
        ])
    }

    fn manager(tenant: TenantId) -> Session {
        Session::new(UserId::new_v4(), Role::Manager, tenant)
    }

    #[tokio::test]
    async fn test_active_us_subscribers_count_two() {
        let fx = fixture();
        seed_population(&fx.store, fx.tenant);
        let session = manager(fx.tenant);

        let count = fx
            .service
            .evaluate_segment(&session, fx.tenant, &us_actives())
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_create_then_refresh_caches_count() {
        let fx = fixture();
        seed_population(&fx.store, fx.tenant);
        let session = manager(fx.tenant);

        let segment = fx
            .service
            .create_segment(&session, fx.tenant, "US actives", us_actives())
            .await
            .unwrap();
        assert_eq!(segment.cached_count, None);

        let refreshed = fx
            .service
            .refresh_segment(&session, fx.tenant, segment.id, None)
            .await
            .unwrap();
        assert_eq!(refreshed.cached_count, Some(2));
        assert!(refreshed.last_refreshed_at.is_some());
    }

    #[tokio::test]
    async fn test_authorization_short_circuits_before_validation() {
        let fx = fixture();
        let analyst = Session::new(UserId::new_v4(), Role::Analyst, fx.tenant);

        // The filter is invalid, but the read-only role is rejected before
        // the compiler ever sees it.
        let invalid = FilterNode::all(vec![]);
        let err = fx
            .service
            .create_segment(&analyst, fx.tenant, "nope", invalid)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SegmentError::Forbidden(DenyReason::InsufficientPermission)
        ));
        assert!(fx.repo.list(fx.tenant).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cross_tenant_evaluation_denied() {
        let fx = fixture();
        let other = TenantId::new_v4();
        seed_population(&fx.store, other);
        let session = manager(fx.tenant);

        let err = fx
            .service
            .evaluate_segment(&session, other, &us_actives())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SegmentError::Forbidden(DenyReason::TenantMismatch)
        ));
    }

    #[tokio::test]
    async fn test_superadmin_operates_cross_tenant() {
        let fx = fixture();
        seed_population(&fx.store, fx.tenant);
        let platform = Session::platform(UserId::new_v4(), Role::SuperAdmin);

        let count = fx
            .service
            .evaluate_segment(&platform, fx.tenant, &us_actives())
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_filter() {
        let fx = fixture();
        let session = manager(fx.tenant);

        let bad = FilterNode::condition("no_such_field", Operator::Eq, "x");
        let err = fx
            .service
            .create_segment(&session, fx.tenant, "bad", bad)
            .await
            .unwrap_err();
        assert!(matches!(err, SegmentError::Validation(_)));
        assert!(fx.repo.list(fx.tenant).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_filter_resets_derived_state() {
        let fx = fixture();
        seed_population(&fx.store, fx.tenant);
        let session = manager(fx.tenant);

        let segment = fx
            .service
            .create_segment(&session, fx.tenant, "US actives", us_actives())
            .await
            .unwrap();
        fx.service
            .refresh_segment(&session, fx.tenant, segment.id, None)
            .await
            .unwrap();

        let updated = fx
            .service
            .update_segment(
                &session,
                fx.tenant,
                segment.id,
                None,
                Some(FilterNode::condition("country", Operator::Eq, "FR")),
            )
            .await
            .unwrap();
        assert_eq!(updated.cached_count, None);
        assert_eq!(updated.last_refreshed_at, None);

        // The next refresh must use the new filter, not a stale plan.
        let refreshed = fx
            .service
            .refresh_segment(&session, fx.tenant, segment.id, None)
            .await
            .unwrap();
        assert_eq!(refreshed.cached_count, Some(1));
    }

    #[tokio::test]
    async fn test_round_trip_filter_evaluates_identically() {
        let fx = fixture();
        seed_population(&fx.store, fx.tenant);
        let session = manager(fx.tenant);

        let filter = us_actives();
        let direct = fx
            .service
            .evaluate_segment(&session, fx.tenant, &filter)
            .await
            .unwrap();

        let json = serde_json::to_string(&filter).unwrap();
        let reparsed: FilterNode = serde_json::from_str(&json).unwrap();
        let round_tripped = fx
            .service
            .evaluate_segment(&session, fx.tenant, &reparsed)
            .await
            .unwrap();

        assert_eq!(direct, round_tripped);
    }

    #[tokio::test]
    async fn test_list_fields_and_custom_registration() {
        let fx = fixture();
        let session = manager(fx.tenant);

        fx.service
            .register_field(
                &session,
                fx.tenant,
                FieldDefinition::custom("plan_tier", FieldKind::String),
            )
            .unwrap();

        let fields = fx.service.list_fields(&session, fx.tenant).unwrap();
        assert!(fields.iter().any(|f| f.name == "plan_tier" && f.custom));

        // Collisions surface as field errors.
        let err = fx
            .service
            .register_field(
                &session,
                fx.tenant,
                FieldDefinition::custom("country", FieldKind::String),
            )
            .unwrap_err();
        assert!(matches!(err, SegmentError::Field(_)));
    }

    #[tokio::test]
    async fn test_members_returns_matching_ids() {
        let fx = fixture();
        let session = manager(fx.tenant);

        let hit = SubscriberRecord::new(fx.tenant)
            .with("country", "US")
            .with("active", true);
        let hit_id = hit.id;
        fx.store.insert(hit);
        fx.store.insert(
            SubscriberRecord::new(fx.tenant)
                .with("country", "FR")
                .with("active", true),
        );

        let members = fx
            .service
            .segment_members(&session, fx.tenant, &us_actives())
            .await
            .unwrap();
        assert_eq!(members, vec![hit_id]);
    }

    #[tokio::test]
    async fn test_get_unknown_segment_is_not_found() {
        let fx = fixture();
        let session = manager(fx.tenant);

        let err = fx
            .service
            .get_segment(&session, fx.tenant, SegmentId::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, SegmentError::NotFound(_)));
    }

    /// Store whose scans block until released, for the deletion contract.
    struct GatedStore {
        scans: AtomicU64,
        gate: Notify,
    }

    #[async_trait]
    impl SubscriberStore for GatedStore {
        async fn scan_count(
            &self,
            _tenant_id: TenantId,
            _predicate: &CompiledPredicate,
            _deadline: Duration,
        ) -> Result<u64, StoreError> {
            self.scans.fetch_add(1, Ordering::SeqCst);
            self.gate.notified().await;
            Ok(3)
        }

        async fn scan_members(
            &self,
            _tenant_id: TenantId,
            _predicate: &CompiledPredicate,
            _deadline: Duration,
        ) -> Result<Vec<SubscriberId>, StoreError> {
            Ok(vec![])
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delete_awaits_in_flight_refresh() {
        let store = Arc::new(GatedStore {
            scans: AtomicU64::new(0),
            gate: Notify::new(),
        });
        let repo = Arc::new(InMemorySegmentRepository::new());
        let authz = AuthzEngine::new(Arc::new(PermissionMatrix::builtin().unwrap()));
        let service = Arc::new(SegmentService::new(
            authz,
            Arc::new(FieldRegistry::new()),
            repo.clone(),
            store.clone(),
            ServiceConfig::default(),
        ));
        let tenant = TenantId::new_v4();
        let session = manager(tenant);

        let segment = service
            .create_segment(&session, tenant, "US actives", us_actives())
            .await
            .unwrap();

        let refresh = {
            let service = service.clone();
            let session = session.clone();
            tokio::spawn(async move {
                service
                    .refresh_segment(&session, tenant, segment.id, None)
                    .await
            })
        };

        // Wait for the scan to be in flight.
        while store.scans.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let delete = {
            let service = service.clone();
            let session = session.clone();
            tokio::spawn(async move {
                service.delete_segment(&session, tenant, segment.id).await
            })
        };

        // The delete must block behind the in-flight refresh.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!delete.is_finished());
        assert!(repo.get(tenant, segment.id).await.is_ok());

        loop {
            store.gate.notify_waiters();
            if refresh.is_finished() && delete.is_finished() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let refreshed = refresh.await.unwrap().unwrap();
        assert_eq!(refreshed.cached_count, Some(3));
        delete.await.unwrap().unwrap();
        assert!(repo.get(tenant, segment.id).await.is_err());
    }
}
