//! The random route (§2): picks one child uniformly at random and
//! performs a single dispatch — no failover, no fan-out.

use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;

use crate::context::RequestContext;
use crate::protocol::{OperationType, Reply, Request};

use super::{traverse_children, RouteHandle, Visitor};

pub struct Random {
    children: Vec<Arc<dyn RouteHandle>>,
}

impl Random {
    #[must_use]
    pub fn new(children: Vec<Arc<dyn RouteHandle>>) -> Arc<dyn RouteHandle> {
        Arc::new(Self { children })
    }
}

#[async_trait]
impl RouteHandle for Random {
    async fn route(&self, ctx: &Arc<RequestContext>, request: &Request, op: OperationType) -> Reply {
        if self.children.is_empty() {
            return Reply::new(op.null_route_result());
        }
        let idx = rand::thread_rng().gen_range(0..self.children.len());
        self.children[idx].route(ctx, request, op).await
    }

    fn traverse(&self, request: &Request, op: OperationType, visitor: &mut dyn Visitor) {
        // Best-effort (§4.1): a real dispatch only reaches one child;
        // traversal over-approximates by visiting all of them.
        traverse_children(&self.children, request, op, visitor);
    }

    fn name(&self) -> &str {
        "Random"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ConfigSnapshot, OwnedContext, Worker};
    use crate::domain_types::{Priority, WorkerId};
    use crate::pool::{StaticPool, UpstreamPool};
    use crate::protocol::ResultCode;
    use crate::route::terminal::{Destination, Null};

    #[tokio::test]
    async fn always_dispatches_to_exactly_one_child() {
        let a = Arc::new(StaticPool::new("a", Reply::new(ResultCode::Found)));
        let b = Arc::new(StaticPool::new("b", Reply::new(ResultCode::Found)));
        let route = Random::new(vec![
            Destination::new("a", Arc::clone(&a) as Arc<dyn UpstreamPool>),
            Destination::new("b", Arc::clone(&b) as Arc<dyn UpstreamPool>),
        ]);
        let (worker, _) = Worker::spawn(WorkerId::from(0));
        let owned = OwnedContext::create(worker, Request::new(OperationType::Get, "k"), |_| {}, || {}, Priority::Normal);
        let ctx = owned
            .process(Arc::new(ConfigSnapshot { version: 1, root: Null::new_handle() }))
            .unwrap()
            .as_arc();
        for _ in 0..10 {
            route.route(&ctx, &Request::new(OperationType::Get, "k"), OperationType::Get).await;
        }
        assert_eq!(a.seen_keys().len() + b.seen_keys().len(), 10);
    }

    #[tokio::test]
    async fn empty_children_behaves_like_null() {
        let route = Random::new(vec![]);
        let (worker, _) = Worker::spawn(WorkerId::from(0));
        let owned = OwnedContext::create(worker, Request::new(OperationType::Get, "k"), |_| {}, || {}, Priority::Normal);
        let ctx = owned
            .process(Arc::new(ConfigSnapshot { version: 1, root: Null::new_handle() }))
            .unwrap()
            .as_arc();
        let reply = route.route(&ctx, &Request::new(OperationType::Get, "k"), OperationType::Get).await;
        assert_eq!(reply.result, ResultCode::NotFound);
    }
}
