//! The failover route (§4.3): children tried strictly sequentially
//! until one's reply does not trigger failover, or the last is reached.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::classifier::FailoverErrors;
use crate::context::RequestContext;
use crate::protocol::{OperationType, Reply, Request};

use super::{traverse_children, RouteHandle, Visitor};

/// An ordered list of children and a classifier (§4.3). The factory
/// (§6) collapses `N = 0` to `Null` and `N = 1` to the sole child
/// before this type is ever constructed, so `Failover` itself only
/// needs to handle `N >= 2`; it still behaves correctly at smaller `N`
/// if constructed directly, for tests that want to exercise it without
/// going through the factory.
pub struct Failover {
    children: Vec<Arc<dyn RouteHandle>>,
    errors: FailoverErrors,
}

impl Failover {
    #[must_use]
    pub fn new(children: Vec<Arc<dyn RouteHandle>>, errors: FailoverErrors) -> Arc<dyn RouteHandle> {
        Arc::new(Self { children, errors })
    }
}

#[async_trait]
impl RouteHandle for Failover {
    async fn route(&self, ctx: &Arc<RequestContext>, request: &Request, op: OperationType) -> Reply {
        if self.children.is_empty() {
            return Reply::new(op.null_route_result());
        }
        let limit = if ctx.failover_disabled() { 1 } else { self.children.len() };
        let family = op.family();
        let mut last = None;
        for (i, child) in self.children.iter().take(limit).enumerate() {
            let reply = child.route(ctx, request, op).await;
            let is_last = i + 1 == limit;
            if is_last || !self.errors.should_failover(reply.result, family) {
                if i > 0 {
                    debug!(child = i, result = ?reply.result, "failover resolved");
                }
                return reply;
            }
            warn!(child = i, result = ?reply.result, "child reply triggers failover, trying next");
            last = Some(reply);
        }
        last.expect("loop always assigns `last` before falling through when limit > 0")
    }

    fn traverse(&self, request: &Request, op: OperationType, visitor: &mut dyn Visitor) {
        traverse_children(&self.children, request, op, visitor);
    }

    fn name(&self) -> &str {
        "Failover"
    }
}
