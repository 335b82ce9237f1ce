//! Segment Evaluator
//!
//! Executes compiled predicates against the subscriber population and owns
//! the refresh-coalescing cache. The binding invariant: at most one
//! in-flight count recomputation per (tenant, segment) pair. Concurrent
//! refresh calls for the same key join the outstanding computation;
//! distinct keys never contend.
//!
//! A refresh runs detached: if the requesting caller goes away, the scan
//! still completes and updates the cache for subsequent readers.

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use moka::sync::Cache;
use pulse_common::{SegmentId, SubscriberId, TenantId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::compiler::{CompiledPredicate, FilterCompiler};
use crate::error::SegmentError;
use crate::segment::{RefreshStatus, RepoError, Segment, SegmentRepository};
use crate::store::{StoreError, SubscriberStore};

/// Evaluator tuning
#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    /// Default deadline for one subscriber-store scan
    pub scan_deadline: Duration,
    /// Bounded capacity of the compiled-plan cache
    pub plan_cache_capacity: u64,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            scan_deadline: Duration::from_secs(30),
            plan_cache_capacity: 1024,
        }
    }
}

type RefreshKey = (TenantId, SegmentId);
type RefreshOutcome = Result<Segment, SegmentError>;
type OutcomeRx = watch::Receiver<Option<RefreshOutcome>>;

enum Flight {
    Lead(watch::Sender<Option<RefreshOutcome>>),
    Join(OutcomeRx),
}

/// Predicate execution + refresh coalescing over one subscriber store
pub struct SegmentEvaluator {
    store: Arc<dyn SubscriberStore>,
    repo: Arc<dyn SegmentRepository>,
    compiler: FilterCompiler,
    /// (tenant, segment) → compiled plan of the stored filter
    plans: Cache<RefreshKey, Arc<CompiledPredicate>>,
    /// In-flight refresh markers; insertion/removal is the only critical
    /// section, the scan itself runs outside it
    inflight: Arc<DashMap<RefreshKey, OutcomeRx>>,
}

impl SegmentEvaluator {
    /// Evaluator over a store and repository
    pub fn new(
        store: Arc<dyn SubscriberStore>,
        repo: Arc<dyn SegmentRepository>,
        compiler: FilterCompiler,
        config: EvaluatorConfig,
    ) -> Self {
        Self {
            store,
            repo,
            compiler,
            plans: Cache::builder()
                .max_capacity(config.plan_cache_capacity)
                .build(),
            inflight: Arc::new(DashMap::new()),
        }
    }

    /// Count the tenant's subscribers matching a predicate, bounded by the
    /// caller-supplied deadline.
    pub async fn count(
        &self,
        predicate: &CompiledPredicate,
        tenant_id: TenantId,
        deadline: Duration,
    ) -> Result<u64, StoreError> {
        match tokio::time::timeout(
            deadline,
            self.store.scan_count(tenant_id, predicate, deadline),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(StoreError::DeadlineExceeded),
        }
    }

    /// Collect the tenant's matching subscriber ids, bounded by the
    /// caller-supplied deadline.
    pub async fn members(
        &self,
        predicate: &CompiledPredicate,
        tenant_id: TenantId,
        deadline: Duration,
    ) -> Result<Vec<SubscriberId>, StoreError> {
        match tokio::time::timeout(
            deadline,
            self.store.scan_members(tenant_id, predicate, deadline),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(StoreError::DeadlineExceeded),
        }
    }

    /// Recompute a segment's cached count, joining any refresh already in
    /// flight for the same (tenant, segment).
    ///
    /// On success the segment's `cached_count` / `last_refreshed_at` /
    /// `refresh_status` are updated atomically. On a transient failure the
    /// previous cached values stay untouched and `refresh_status` returns
    /// to idle. A caller joining an in-flight refresh inherits the
    /// leader's deadline.
    pub async fn refresh(
        self: &Arc<Self>,
        tenant_id: TenantId,
        id: SegmentId,
        deadline: Duration,
    ) -> Result<Segment, SegmentError> {
        let key = (tenant_id, id);

        let flight = match self.inflight.entry(key) {
            Entry::Occupied(entry) => Flight::Join(entry.get().clone()),
            Entry::Vacant(entry) => {
                let (tx, rx) = watch::channel(None);
                entry.insert(rx);
                Flight::Lead(tx)
            }
        };

        match flight {
            Flight::Join(mut rx) => await_outcome(&mut rx).await,
            Flight::Lead(tx) => {
                let mut rx = tx.subscribe();
                let evaluator = Arc::clone(self);
                // Detached: the scan finishes even if every caller's
                // request context ends first.
                tokio::spawn(async move {
                    let outcome = evaluator.run_refresh(key, deadline).await;
                    evaluator.inflight.remove(&key);
                    let _ = tx.send(Some(outcome));
                });
                await_outcome(&mut rx).await
            }
        }
    }

    /// Block until any in-flight refresh for the key has completed.
    /// No-op when none is running.
    pub async fn await_inflight(&self, tenant_id: TenantId, id: SegmentId) {
        let rx = self
            .inflight
            .get(&(tenant_id, id))
            .map(|entry| entry.value().clone());
        if let Some(mut rx) = rx {
            let _ = rx.wait_for(|outcome| outcome.is_some()).await;
        }
    }

    /// Drop the cached compiled plan for a segment (filter changed or
    /// segment deleted).
    pub fn invalidate_plan(&self, tenant_id: TenantId, id: SegmentId) {
        self.plans.invalidate(&(tenant_id, id));
    }

    async fn run_refresh(&self, key: RefreshKey, deadline: Duration) -> RefreshOutcome {
        let (tenant_id, id) = key;

        let mut segment = match self.repo.get(tenant_id, id).await {
            Ok(segment) => segment,
            Err(RepoError::NotFound) => return Err(SegmentError::NotFound(id)),
            Err(e) => return Err(SegmentError::Internal(e.to_string())),
        };

        segment.refresh_status = RefreshStatus::Refreshing;
        if let Err(e) = self.repo.update(&segment).await {
            return Err(SegmentError::Internal(e.to_string()));
        }

        let plan = match self.plans.get(&key) {
            Some(plan) => plan,
            None => match self.compiler.compile(&segment.filter, tenant_id) {
                Ok(plan) => {
                    let plan = Arc::new(plan);
                    self.plans.insert(key, Arc::clone(&plan));
                    plan
                }
                Err(e) => {
                    // Stored filters were validated at create/update time.
                    self.settle_idle(tenant_id, id).await;
                    return Err(SegmentError::Internal(format!(
                        "stored filter failed to recompile: {e}"
                    )));
                }
            },
        };

        match self.count(&plan, tenant_id, deadline).await {
            Ok(count) => {
                // Reload so a concurrent rename is not clobbered; the
                // single-flight marker makes this the only writer of the
                // refresh fields.
                let mut current = match self.repo.get(tenant_id, id).await {
                    Ok(segment) => segment,
                    Err(RepoError::NotFound) => {
                        // Deleted mid-scan; do not resurrect the record.
                        return Err(SegmentError::NotFound(id));
                    }
                    Err(e) => return Err(SegmentError::Internal(e.to_string())),
                };
                let now = Utc::now();
                current.cached_count = Some(count);
                current.last_refreshed_at = Some(now);
                current.refresh_status = RefreshStatus::Idle;
                current.updated_at = now;
                match self.repo.update(&current).await {
                    Ok(()) => {
                        info!(%tenant_id, segment = %id, count, "segment refresh complete");
                        Ok(current)
                    }
                    Err(RepoError::NotFound) => Err(SegmentError::NotFound(id)),
                    Err(e) => Err(SegmentError::Internal(e.to_string())),
                }
            }
            Err(store_err) => {
                warn!(
                    %tenant_id,
                    segment = %id,
                    error = %store_err,
                    "segment refresh failed; keeping previous cached count"
                );
                self.settle_idle(tenant_id, id).await;
                Err(SegmentError::Transient(store_err))
            }
        }
    }

    /// Restore `refresh_status = Idle` without touching the cached count.
    async fn settle_idle(&self, tenant_id: TenantId, id: SegmentId) {
        match self.repo.get(tenant_id, id).await {
            Ok(mut segment) => {
                segment.refresh_status = RefreshStatus::Idle;
                if let Err(e) = self.repo.update(&segment).await {
                    warn!(%tenant_id, segment = %id, error = %e, "failed to restore idle status");
                }
            }
            Err(RepoError::NotFound) => {}
            Err(e) => {
                warn!(%tenant_id, segment = %id, error = %e, "failed to restore idle status");
            }
        }
    }
}

async fn await_outcome(rx: &mut OutcomeRx) -> RefreshOutcome {
    let guard = rx
        .wait_for(|outcome| outcome.is_some())
        .await
        .map_err(|_| SegmentError::Internal("refresh task ended without reporting".into()))?;
    match guard.clone() {
        Some(outcome) => outcome,
        None => Err(SegmentError::Internal("refresh outcome missing".into())),
    }
}
