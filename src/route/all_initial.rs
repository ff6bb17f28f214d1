//! The all-initial route (§4.4): child 0 is dispatched synchronously
//! and its reply is the client-visible one; children 1..N-1 run as
//! background fibers held alive by the request context.

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::RequestContext;
use crate::protocol::{OperationType, Reply, Request};

use super::{traverse_children, RouteHandle, Visitor};

/// N >= 0 children (§4.4). `N = 0` collapses to `Null`.
pub struct AllInitial {
    children: Vec<Arc<dyn RouteHandle>>,
}

impl AllInitial {
    #[must_use]
    pub fn new(children: Vec<Arc<dyn RouteHandle>>) -> Arc<dyn RouteHandle> {
        Arc::new(Self { children })
    }
}

#[async_trait]
impl RouteHandle for AllInitial {
    async fn route(&self, ctx: &Arc<RequestContext>, request: &Request, op: OperationType) -> Reply {
        if self.children.is_empty() {
            return Reply::new(op.null_route_result());
        }
        for child in &self.children[1..] {
            let child = Arc::clone(child);
            let ctx_request = request.clone();
            let ctx_for_spawn = Arc::clone(ctx);
            ctx.spawn_background(async move {
                child.route(&ctx_for_spawn, &ctx_request, op).await;
            });
        }
        self.children[0].route(ctx, request, op).await
    }

    fn traverse(&self, request: &Request, op: OperationType, visitor: &mut dyn Visitor) {
        traverse_children(&self.children, request, op, visitor);
    }

    fn name(&self) -> &str {
        "AllInitial"
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
    async fn reply_identity_and_fan_out_reach_every_child() {
        let normal_pool = Arc::new(StaticPool::new("normal", Reply::new(ResultCode::Stored)));
        let mirror_a = Arc::new(StaticPool::new("mirror_a", Reply::new(ResultCode::Stored)));
        let mirror_b = Arc::new(StaticPool::new("mirror_b", Reply::new(ResultCode::Stored)));
        let route = AllInitial::new(vec![
            Destination::new("normal", Arc::clone(&normal_pool) as Arc<dyn UpstreamPool>),
            Destination::new("mirror_a", Arc::clone(&mirror_a) as Arc<dyn UpstreamPool>),
            Destination::new("mirror_b", Arc::clone(&mirror_b) as Arc<dyn UpstreamPool>),
        ]);

        let (tx, rx) = tokio::sync::oneshot::channel();
        let tx = std::sync::Mutex::new(Some(tx));
        let (worker, _loop) = Worker::spawn(WorkerId::from(0));
        let owned = OwnedContext::create(
            worker,
            Request::new(OperationType::Set, "k"),
            |_| {},
            move || {
                if let Some(tx) = tx.lock().unwrap().take() {
                    let _ = tx.send(());
                }
            },
            Priority::Normal,
        );
        let ctx = owned
            .process(Arc::new(ConfigSnapshot { version: 1, root: Null::new_handle() }))
            .unwrap();
        let ctx_arc = ctx.as_arc();

        let request = Request::new(OperationType::Set, "k").with_value("v");
        let reply = route.route(&ctx_arc, &request, OperationType::Set).await;
        assert_eq!(reply.result, ResultCode::Stored);

        ctx.send_reply(reply);
        rx.await.expect("request_complete should fire once background fibers drain");

        assert_eq!(normal_pool.seen_keys(), vec![crate::protocol::Key::from("k")]);
        assert_eq!(mirror_a.seen_keys(), vec![crate::protocol::Key::from("k")]);
        assert_eq!(mirror_b.seen_keys(), vec![crate::protocol::Key::from("k")]);
    }

    #[tokio::test]
    async fn empty_children_behaves_like_null() {
        let route = AllInitial::new(vec![]);
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
