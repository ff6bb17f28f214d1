//! The latest route (§4.6): tries children in an order derived from a
//! per-pool freshness signal; otherwise behaves as `Failover`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::classifier::FailoverErrors;
use crate::context::RequestContext;
use crate::protocol::{OperationType, Reply, Request};

use super::{traverse_children, RouteHandle, Visitor};

/// A freshness signal for one child of a `Latest` route. Higher values
/// sort first. Production implementations would read e.g. a replica's
/// last-applied offset; this crate only defines the seam.
pub trait FreshnessSource: Send + Sync {
    fn freshness(&self) -> u64;
}

/// A freshness source pinned to a fixed value, for tests and for
/// children that never change rank.
pub struct FixedFreshness(std::sync::atomic::AtomicU64);

impl FixedFreshness {
    #[must_use]
    pub fn new(value: u64) -> Arc<Self> {
        Arc::new(Self(std::sync::atomic::AtomicU64::new(value)))
    }

    pub fn set(&self, value: u64) {
        self.0.store(value, std::sync::atomic::Ordering::SeqCst);
    }
}

impl FreshnessSource for FixedFreshness {
    fn freshness(&self) -> u64 {
        self.0.load(std::sync::atomic::Ordering::SeqCst)
    }
}

pub struct Latest {
    children: Vec<(Arc<dyn RouteHandle>, Arc<dyn FreshnessSource>)>,
    errors: FailoverErrors,
}

impl Latest {
    #[must_use]
    pub fn new(
        children: Vec<(Arc<dyn RouteHandle>, Arc<dyn FreshnessSource>)>,
        errors: FailoverErrors,
    ) -> Arc<dyn RouteHandle> {
        Arc::new(Self { children, errors })
    }

    /// Children ordered by descending freshness, recomputed per
    /// request since the signal may change between calls.
    fn ordered(&self) -> Vec<Arc<dyn RouteHandle>> {
        let mut ranked: Vec<_> = self.children.iter().collect();
        ranked.sort_by_key(|(_, freshness)| std::cmp::Reverse(freshness.freshness()));
        ranked.into_iter().map(|(h, _)| Arc::clone(h)).collect()
    }
}

#[async_trait]
impl RouteHandle for Latest {
    async fn route(&self, ctx: &Arc<RequestContext>, request: &Request, op: OperationType) -> Reply {
        let ordered = self.ordered();
        if ordered.is_empty() {
            return Reply::new(op.null_route_result());
        }
        let limit = if ctx.failover_disabled() { 1 } else { ordered.len() };
        let family = op.family();
        let mut last = None;
        for (i, child) in ordered.iter().take(limit).enumerate() {
            let reply = child.route(ctx, request, op).await;
            let is_last = i + 1 == limit;
            if is_last || !self.errors.should_failover(reply.result, family) {
                return reply;
            }
            last = Some(reply);
        }
        last.expect("loop always assigns `last` before falling through when limit > 0")
    }

    fn traverse(&self, request: &Request, op: OperationType, visitor: &mut dyn Visitor) {
        let handles: Vec<_> = self.children.iter().map(|(h, _)| Arc::clone(h)).collect();
        traverse_children(&handles, request, op, visitor);
    }

    fn name(&self) -> &str {
        "Latest"
    }
}
