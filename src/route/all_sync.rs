//! The all-sync route (§4.6): dispatch to every child in parallel,
//! wait for all, return the worst reply by a fixed priority (hard-error
//! > soft-error > miss > hit).

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;

use crate::context::RequestContext;
use crate::protocol::{OperationType, Reply, Request};

use super::{traverse_children, RouteHandle, Visitor};

pub struct AllSync {
    children: Vec<Arc<dyn RouteHandle>>,
}

impl AllSync {
    #[must_use]
    pub fn new(children: Vec<Arc<dyn RouteHandle>>) -> Arc<dyn RouteHandle> {
        Arc::new(Self { children })
    }
}

#[async_trait]
impl RouteHandle for AllSync {
    async fn route(&self, ctx: &Arc<RequestContext>, request: &Request, op: OperationType) -> Reply {
        if self.children.is_empty() {
            return Reply::new(op.null_route_result());
        }
        let futures = self.children.iter().map(|child| child.route(ctx, request, op));
        let replies = join_all(futures).await;
        replies
            .into_iter()
            .max_by_key(|r| r.result.classify())
            .expect("non-empty children produce at least one reply")
    }

    fn traverse(&self, request: &Request, op: OperationType, visitor: &mut dyn Visitor) {
        traverse_children(&self.children, request, op, visitor);
    }

    fn name(&self) -> &str {
        "AllSync"
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

    async fn ctx() -> Arc<RequestContext> {
        let (worker, _) = Worker::spawn(WorkerId::from(0));
        let owned = OwnedContext::create(worker, Request::new(OperationType::Get, "k"), |_| {}, || {}, Priority::Normal);
        owned
            .process(Arc::new(ConfigSnapshot { version: 1, root: Null::new_handle() }))
            .unwrap()
            .as_arc()
    }

    #[tokio::test]
    async fn worst_reply_wins() {
        let a = Arc::new(StaticPool::new("a", Reply::new(ResultCode::Found)));
        let b = Arc::new(StaticPool::new("b", Reply::new(ResultCode::Timeout)));
        let route = AllSync::new(vec![
            Destination::new("a", a as Arc<dyn UpstreamPool>),
            Destination::new("b", b as Arc<dyn UpstreamPool>),
        ]);
        let reply = route
            .route(&ctx().await, &Request::new(OperationType::Get, "k"), OperationType::Get)
            .await;
        assert_eq!(reply.result, ResultCode::Timeout);
    }
}
